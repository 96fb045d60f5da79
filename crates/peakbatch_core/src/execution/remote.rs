//! Submission through an external batch queue.

use std::process::{Command, Stdio};

use crate::models::StrategyKind;

use super::errors::{ExecutionError, ExecutionResult};
use super::subprocess::{Launcher, SubprocessPool, UnitFiles};

/// Default queue submission program.
pub const DEFAULT_SUBMIT_PROGRAM: &str = "srun";

/// Default job name shown in the queue.
pub const DEFAULT_JOB_NAME: &str = "SCD_Find_Peaks";

/// Wraps the worker in `srun -p <queue> -J <job> -o <log>`.
///
/// The submission client stays in the foreground until the job ends,
/// but completion is observed through the response file; the worker may
/// run on another node.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueLauncher {
    queue: String,
    submit_program: String,
    job_name: String,
}

/// Each unit as a job on a remote batch queue.
pub type RemoteQueuePool = SubprocessPool<QueueLauncher>;

impl QueueLauncher {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            submit_program: DEFAULT_SUBMIT_PROGRAM.to_string(),
            job_name: DEFAULT_JOB_NAME.to_string(),
        }
    }

    /// Use another submission program (builder pattern).
    pub fn with_submit_program(mut self, program: impl Into<String>) -> Self {
        self.submit_program = program.into();
        self
    }

    /// Use another job name (builder pattern).
    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = job_name.into();
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Submission argv for one unit, without the program itself.
    pub fn submit_args(&self, worker_argv: &[String], files: &UnitFiles) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.queue.clone(),
            "-J".to_string(),
            self.job_name.clone(),
            "-o".to_string(),
            files.log.to_string_lossy().into_owned(),
        ];
        args.extend(worker_argv.iter().cloned());
        args
    }
}

impl Launcher for QueueLauncher {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Remote
    }

    fn command(&self, worker_argv: &[String], files: &UnitFiles) -> ExecutionResult<Command> {
        if worker_argv.is_empty() {
            return Err(ExecutionError::spawn(
                &self.submit_program,
                std::io::ErrorKind::InvalidInput.into(),
            ));
        }

        let mut command = Command::new(&self.submit_program);
        command
            .args(self.submit_args(worker_argv, files))
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn files() -> UnitFiles {
        UnitFiles {
            request: PathBuf::from("/shared/tmp/r.json"),
            output: PathBuf::from("/shared/tmp/o.json"),
            log: PathBuf::from("/shared/tmp/8336_2_1.log"),
        }
    }

    #[test]
    fn submit_args_prefix_worker_command() {
        let launcher = QueueLauncher::new("compute");
        let worker = vec!["peakbatch".to_string(), "worker".to_string()];
        let args = launcher.submit_args(&worker, &files());
        assert_eq!(
            args,
            vec![
                "-p",
                "compute",
                "-J",
                "SCD_Find_Peaks",
                "-o",
                "/shared/tmp/8336_2_1.log",
                "peakbatch",
                "worker"
            ]
        );
    }

    #[test]
    fn builder_overrides_program_and_job() {
        let launcher = QueueLauncher::new("q")
            .with_submit_program("sbatch-wrapper")
            .with_job_name("integrate");
        let command = launcher
            .command(&["w".to_string()], &files())
            .unwrap();
        assert_eq!(command.get_program(), "sbatch-wrapper");
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"integrate".to_string()));
        assert_eq!(launcher.kind(), StrategyKind::Remote);
    }
}
