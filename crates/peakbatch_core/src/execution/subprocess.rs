//! One OS process per work unit.
//!
//! `SubprocessPool` owns the process bookkeeping shared by the isolated
//! process and remote queue backends. A `Launcher` decides how the
//! worker command line is turned into a running process.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use crate::models::{StrategyKind, UnitFailure, UnitKey, UnitOutput, WorkUnit};

use super::errors::{ExecutionError, ExecutionResult};
use super::strategy::{ExecutionStrategy, PollStatus, TaskHandle, TaskId};
use super::worker::{read_response, write_request, WorkRequest};

/// Memory budget applied when isolated execution has none configured.
pub const DEFAULT_WORKER_MEMORY_MB: u64 = 2000;

/// How long a worker may take to exit after SIGTERM before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// How to invoke the worker program.
///
/// The pool appends `--request <file> --output <file>` to `args`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Virtual memory limit per worker, in megabytes.
    pub memory_mb: Option<u64>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            memory_mb: Some(DEFAULT_WORKER_MEMORY_MB),
        }
    }

    /// Add arguments placed before `--request` (builder pattern).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the memory budget (builder pattern).
    pub fn with_memory_mb(mut self, memory_mb: Option<u64>) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    /// Full argv for one unit: the program first, memory limit applied.
    pub fn argv(&self, files: &UnitFiles) -> Vec<String> {
        let mut worker = vec![self.program.to_string_lossy().into_owned()];
        worker.extend(self.args.iter().cloned());
        worker.push("--request".to_string());
        worker.push(files.request.to_string_lossy().into_owned());
        worker.push("--output".to_string());
        worker.push(files.output.to_string_lossy().into_owned());

        match self.memory_mb {
            Some(mb) if cfg!(unix) => {
                let mut argv = vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!("ulimit -v {}; exec \"$@\"", mb * 1024),
                    "sh".to_string(),
                ];
                argv.extend(worker);
                argv
            }
            _ => worker,
        }
    }
}

/// Scratch files of one unit, uniquely named inside the batch directory.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitFiles {
    pub request: PathBuf,
    pub output: PathBuf,
    /// Worker stdout/stderr (or the queue's job log).
    pub log: PathBuf,
}

impl UnitFiles {
    fn new(dir: &Path, unit: &WorkUnit, id: TaskId) -> Self {
        let stem = format!("{}_{}", unit.label(), id.0);
        Self {
            request: dir.join(format!("{}.request.json", stem)),
            output: dir.join(format!("{}.response.json", stem)),
            log: dir.join(format!("{}.log", stem)),
        }
    }
}

/// Turns a worker argv into a command ready to spawn.
pub trait Launcher {
    /// Which backend this launcher implements.
    fn kind(&self) -> StrategyKind;

    /// Build the command for one unit.
    fn command(&self, worker_argv: &[String], files: &UnitFiles) -> ExecutionResult<Command>;
}

/// Runs the worker directly on this machine.
#[derive(Debug, Clone, Default)]
pub struct LocalLauncher;

impl Launcher for LocalLauncher {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Process
    }

    fn command(&self, worker_argv: &[String], files: &UnitFiles) -> ExecutionResult<Command> {
        let (program, args) = worker_argv
            .split_first()
            .ok_or_else(|| ExecutionError::spawn("worker", std::io::ErrorKind::InvalidInput.into()))?;

        let log = File::create(&files.log)
            .map_err(|e| ExecutionError::io(format!("creating {}", files.log.display()), e))?;
        let log_err = log
            .try_clone()
            .map_err(|e| ExecutionError::io("duplicating worker log handle", e))?;

        let mut command = Command::new(program);
        command.args(args).stdout(log).stderr(log_err);
        Ok(command)
    }
}

struct ProcessTask {
    key: UnitKey,
    child: Child,
    files: UnitFiles,
}

/// Process-per-unit backend, generic over how processes are launched.
pub struct SubprocessPool<L> {
    launcher: L,
    worker: WorkerCommand,
    batch_id: String,
    scratch: TempDir,
    poll_interval: Duration,
    next_id: u64,
    tasks: HashMap<TaskId, ProcessTask>,
    /// Children whose response arrived before they exited.
    lingering: Vec<Child>,
}

/// Each unit in its own process on this machine.
pub type IsolatedProcessPool = SubprocessPool<LocalLauncher>;

impl<L: Launcher> SubprocessPool<L> {
    /// Create a pool whose scratch directory lives under `temp_root`.
    ///
    /// For remote execution `temp_root` must be on a filesystem the
    /// compute nodes can see.
    pub fn new(
        launcher: L,
        worker: WorkerCommand,
        batch_id: impl Into<String>,
        temp_root: &Path,
        poll_interval: Duration,
    ) -> ExecutionResult<Self> {
        fs::create_dir_all(temp_root)
            .map_err(|e| ExecutionError::io(format!("creating {}", temp_root.display()), e))?;
        let scratch = tempfile::Builder::new()
            .prefix("peakbatch-")
            .tempdir_in(temp_root)
            .map_err(|e| ExecutionError::io("creating scratch directory", e))?;

        Ok(Self {
            launcher,
            worker,
            batch_id: batch_id.into(),
            scratch,
            poll_interval,
            next_id: 0,
            tasks: HashMap::new(),
            lingering: Vec::new(),
        })
    }

    /// Directory holding request, response and log files.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    pub fn active(&self) -> usize {
        self.tasks.len()
    }

    /// Drop lingering children that have exited since the last check.
    fn reap_lingering(&mut self) {
        self.lingering
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }

    fn collect(&mut self, id: TaskId) -> ExecutionResult<PollStatus> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(ExecutionError::UnknownTask(id))?;

        // A complete response wins even if the process has not exited yet.
        if task.files.output.exists() {
            let output = read_output(task);
            if let Some(mut task) = self.tasks.remove(&id) {
                if let Ok(None) = task.child.try_wait() {
                    self.lingering.push(task.child);
                }
            }
            return Ok(PollStatus::Done(output));
        }

        let status = match task.child.try_wait() {
            Ok(None) => return Ok(PollStatus::Running),
            Ok(Some(status)) => status,
            Err(e) => {
                return Err(ExecutionError::io(
                    format!("checking worker for {}", task.key),
                    e,
                ))
            }
        };

        // The response may have landed between the two checks.
        let output = if task.files.output.exists() {
            read_output(task)
        } else {
            tracing::warn!(
                unit = %task.key,
                %status,
                log = %task.files.log.display(),
                "Worker exited without a result"
            );
            UnitOutput::failure(UnitFailure::execution(format!(
                "worker exited ({}) without writing a result; see {}",
                status,
                task.files.log.display()
            )))
        };
        self.tasks.remove(&id);
        Ok(PollStatus::Done(output))
    }
}

fn read_output(task: &ProcessTask) -> UnitOutput {
    match read_response(&task.files.output, task.key) {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(unit = %task.key, "Unusable worker result: {}", e);
            UnitOutput::failure(UnitFailure::execution(e.to_string()))
        }
    }
}

impl<L: Launcher> ExecutionStrategy for SubprocessPool<L> {
    fn kind(&self) -> StrategyKind {
        self.launcher.kind()
    }

    fn submit(&mut self, unit: &WorkUnit) -> ExecutionResult<TaskHandle> {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        let files = UnitFiles::new(self.scratch.path(), unit, id);

        write_request(
            &files.request,
            &WorkRequest {
                batch_id: self.batch_id.clone(),
                unit: unit.clone(),
            },
        )?;

        let argv = self.worker.argv(&files);
        let mut command = self.launcher.command(&argv, &files)?;
        command.stdin(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command
            .spawn()
            .map_err(|e| ExecutionError::spawn(format!("worker for {}", unit.key), e))?;

        tracing::debug!(
            unit = %unit.key,
            task = %id,
            pid = child.id(),
            backend = %self.launcher.kind(),
            "Started worker process"
        );
        self.tasks.insert(
            id,
            ProcessTask {
                key: unit.key,
                child,
                files,
            },
        );

        Ok(TaskHandle { id, key: unit.key })
    }

    fn poll(&mut self, handle: &TaskHandle) -> ExecutionResult<PollStatus> {
        self.reap_lingering();
        self.collect(handle.id)
    }

    fn wait(&mut self, timeout: Duration) {
        self.reap_lingering();
        if self.tasks.is_empty() {
            return;
        }
        thread::sleep(timeout.min(self.poll_interval));
    }

    fn cancel(&mut self, handle: &TaskHandle) {
        if let Some(mut task) = self.tasks.remove(&handle.id) {
            match task.child.try_wait() {
                Ok(None) => {
                    terminate(&mut task.child, TERMINATE_GRACE);
                    tracing::debug!(unit = %task.key, "Stopped worker process");
                }
                Ok(Some(status)) => {
                    tracing::debug!(unit = %task.key, %status, "Worker already gone");
                }
                Err(e) => {
                    tracing::debug!(unit = %task.key, "Worker already gone: {}", e);
                }
            }
        }
    }
}

impl<L> Drop for SubprocessPool<L> {
    fn drop(&mut self) {
        for (_, mut task) in self.tasks.drain() {
            terminate(&mut task.child, TERMINATE_GRACE);
        }
        for mut child in self.lingering.drain(..) {
            terminate(&mut child, TERMINATE_GRACE);
        }
    }
}

/// Stop a worker and reap it.
///
/// On unix the worker leads its own process group. The group gets SIGTERM
/// first, so an `srun` client can pass the signal on to the queued job,
/// and SIGKILL once `grace` runs out.
fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        use std::time::Instant;

        let group = Pid::from_raw(child.id() as i32);
        if killpg(group, Signal::SIGTERM).is_ok() {
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline {
                if let Ok(Some(_)) = child.try_wait() {
                    return;
                }
                thread::sleep(Duration::from_millis(10));
            }
            let _ = killpg(group, Signal::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    let _ = child.kill();
    let _ = child.wait();
}
