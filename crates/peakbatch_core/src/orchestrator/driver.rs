//! Batch driver: partition, execute, supervise, merge, persist.

use std::fs;
use std::path::PathBuf;

use uuid::Uuid;

use crate::algorithm::UnitRunner;
use crate::config::Settings;
use crate::execution::{
    ExecutionStrategy, IsolatedProcessPool, LocalLauncher, LocalWorkerPool, QueueLauncher,
    RemoteQueuePool, WorkerCommand,
};
use crate::jobs::partition;
use crate::logging::{BatchLogger, BatchLoggerBuilder};
use crate::merge::{MergeOptions, ResultMerger};
use crate::models::{BatchResult, BatchSummary, StrategyKind, UnitOutcome, UnitReport};
use crate::peaks_file::{read_peaks, write_peaks};
use crate::supervisor::{Supervisor, SupervisorError, SystemClock};

use super::errors::{BatchError, DriverResult};
use super::types::BatchRequest;

/// Where the execution backend comes from.
enum Backend<'a> {
    /// Built from the execution settings.
    Configured,
    /// Supplied by the caller.
    Provided(&'a mut dyn ExecutionStrategy),
}

/// Runs batches end to end.
///
/// The driver owns the settings and the unit runner. Each call to
/// [`run`](Self::run) creates a fresh backend, diagnostic log and batch
/// id, so one driver can run any number of batches.
pub struct BatchDriver<D> {
    settings: Settings,
    runner: UnitRunner<D>,
    /// Arguments placed before `--request` when launching workers.
    worker_args: Vec<String>,
}

impl<D: 'static> BatchDriver<D> {
    pub fn new(settings: Settings, runner: UnitRunner<D>) -> Self {
        Self {
            settings,
            runner,
            worker_args: vec!["worker".to_string()],
        }
    }

    /// Arguments passed to isolated workers ahead of `--request`
    /// (builder pattern). Defaults to `["worker"]`.
    pub fn with_worker_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.worker_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run a batch on the backend selected by the execution settings.
    pub fn run(&self, request: &BatchRequest) -> DriverResult<BatchResult> {
        self.execute(request, Backend::Configured)
    }

    /// Run a batch on a caller-supplied backend.
    pub fn run_with_strategy(
        &self,
        request: &BatchRequest,
        strategy: &mut dyn ExecutionStrategy,
    ) -> DriverResult<BatchResult> {
        self.execute(request, Backend::Provided(strategy))
    }

    fn execute(&self, request: &BatchRequest, backend: Backend<'_>) -> DriverResult<BatchResult> {
        let batch_id = Uuid::new_v4().to_string();
        let kind = request.kind();
        let artifact = request.artifact_path();

        let logger = BatchLoggerBuilder::new(request.log_name(), request.output_dir())
            .config(self.settings.logging.log_config())
            .build()
            .map_err(|e| BatchError::setup_io("creating diagnostic log", e))?;

        logger.phase(&format!("{} batch {}", kind, batch_id));
        tracing::info!(batch = %batch_id, %kind, experiment = %request.experiment, "Starting batch");

        let units = partition(&request.runs, &request.detectors, &request.params).map_err(|e| {
            logger.error(&e.to_string());
            BatchError::from(e)
        })?;
        logger.info(&format!(
            "{} runs x {} detectors = {} work units",
            distinct(&request.runs),
            distinct(&request.detectors),
            units.len()
        ));

        let prior = if request.appends() && artifact.exists() {
            let prior = read_peaks(&artifact).map_err(|source| {
                logger.error(&format!("Cannot read {}: {}", artifact.display(), source));
                BatchError::PriorPeaks {
                    path: artifact.clone(),
                    source,
                }
            })?;
            logger.info(&format!(
                "Appending to {} ({} existing peaks)",
                artifact.display(),
                prior.len()
            ));
            prior
        } else {
            if artifact.exists() {
                fs::remove_file(&artifact).map_err(|e| {
                    BatchError::setup_io(format!("removing {}", artifact.display()), e)
                })?;
                logger.info(&format!("Removed previous {}", artifact.display()));
            }
            Vec::new()
        };

        let mut configured: Box<dyn ExecutionStrategy>;
        let strategy: &mut dyn ExecutionStrategy = match backend {
            Backend::Provided(strategy) => strategy,
            Backend::Configured => {
                configured = self.build_strategy(&batch_id).map_err(|e| {
                    logger.error(&e.to_string());
                    e
                })?;
                configured.as_mut()
            }
        };

        logger.phase("Execute");
        let exec = &self.settings.execution;
        let supervisor = Supervisor::new(
            exec.escalation_policy(strategy.kind()),
            SystemClock::new(),
            exec.max_concurrent,
        );

        let reports = match supervisor.run(&units, strategy, &logger) {
            Ok(reports) => reports,
            Err(SupervisorError::Aborted {
                key,
                failure,
                reports,
            }) => {
                write_unit_logs(&logger, &reports);
                logger.error(&format!("Batch aborted: {} failed: {}", key, failure));
                let summary = BatchSummary::from_reports(&reports, units.len());
                log_outcomes(&logger, &reports, &summary);
                logger.show_tail("Recent log lines");
                tracing::error!(
                    batch = %batch_id,
                    unit = %key,
                    not_run = summary.not_run,
                    "Batch aborted: {}",
                    failure
                );
                return Err(BatchError::Aborted {
                    key,
                    failure,
                    reports,
                    summary,
                });
            }
        };
        let strategy_kind = strategy.kind();

        write_unit_logs(&logger, &reports);

        logger.phase("Merge");
        let merger = ResultMerger::new(MergeOptions::for_kind(kind));
        let mut result = merger.merge(&batch_id, strategy_kind, reports, prior);
        result.log_path = Some(logger.log_path().to_path_buf());

        log_summary(&logger, &result);

        match write_peaks(&artifact, &result.peaks) {
            Ok(()) => {
                logger.success(&format!(
                    "Wrote {} peaks to {}",
                    result.peaks.len(),
                    artifact.display()
                ));
                result.artifact_path = Some(artifact);
            }
            Err(source) => {
                logger.error(&format!("Could not write {}: {}", artifact.display(), source));
                logger.flush();
                tracing::error!(batch = %batch_id, "Failed to persist peaks: {}", source);
                return Err(BatchError::Persistence {
                    result: Box::new(result),
                    source,
                });
            }
        }

        logger.flush();
        tracing::info!(batch = %batch_id, summary = %result.summary(), "Batch finished");
        Ok(result)
    }

    fn build_strategy(&self, batch_id: &str) -> DriverResult<Box<dyn ExecutionStrategy>> {
        let exec = &self.settings.execution;
        let temp_root = PathBuf::from(&self.settings.paths.temp_root);

        let strategy: Box<dyn ExecutionStrategy> = match exec.strategy_kind() {
            StrategyKind::Local => Box::new(LocalWorkerPool::new(self.runner.clone())),
            StrategyKind::Process => Box::new(
                IsolatedProcessPool::new(
                    LocalLauncher,
                    self.worker_command()?,
                    batch_id,
                    &temp_root,
                    exec.poll_interval(),
                )
                .map_err(|e| BatchError::setup("starting process pool", e.to_string()))?,
            ),
            StrategyKind::Remote => {
                let queue = exec
                    .remote_queue()
                    .ok_or_else(|| BatchError::setup("starting remote pool", "no queue name"))?;
                let launcher = QueueLauncher::new(queue)
                    .with_submit_program(&exec.queue_submit_program)
                    .with_job_name(&exec.queue_job_name);
                Box::new(
                    RemoteQueuePool::new(
                        launcher,
                        self.worker_command()?,
                        batch_id,
                        &temp_root,
                        exec.poll_interval(),
                    )
                    .map_err(|e| BatchError::setup("starting remote pool", e.to_string()))?,
                )
            }
        };
        Ok(strategy)
    }

    fn worker_command(&self) -> DriverResult<WorkerCommand> {
        let exec = &self.settings.execution;
        let program = match exec.worker_program() {
            Some(program) => program,
            None => std::env::current_exe()
                .map_err(|e| BatchError::setup_io("locating worker executable", e))?,
        };
        let memory_mb = (exec.worker_memory_mb > 0).then_some(exec.worker_memory_mb);

        Ok(WorkerCommand::new(program)
            .with_args(self.worker_args.iter().cloned())
            .with_memory_mb(memory_mb))
    }
}

fn distinct(values: &[u32]) -> usize {
    let mut values = values.to_vec();
    values.sort_unstable();
    values.dedup();
    values.len()
}

/// Detector logs in partition order, whatever order units finished in.
fn write_unit_logs(logger: &BatchLogger, reports: &[UnitReport]) {
    logger.section("Detector logs");
    for report in reports {
        logger.unit_log(report.key, &report.log);
    }
}

fn log_summary(logger: &BatchLogger, result: &BatchResult) {
    log_outcomes(logger, &result.units, &result.summary());
    if result.prior_peak_count > 0 {
        logger.info(&format!(
            "{} new peaks appended to {} existing",
            result.peaks.len() - result.prior_peak_count,
            result.prior_peak_count
        ));
    }
}

/// Summary section: per-unit problems, then the counts.
fn log_outcomes(logger: &BatchLogger, reports: &[UnitReport], summary: &BatchSummary) {
    logger.section("Summary");
    for report in reports {
        match &report.outcome {
            UnitOutcome::Failed { failure } => {
                logger.warn(&format!("{} failed: {}", report.key, failure))
            }
            UnitOutcome::Abandoned { reason } => {
                logger.warn(&format!("{} did not finish: {}", report.key, reason))
            }
            _ => {}
        }
    }
    logger.info(&format!("{} peaks found", summary.total_peaks));
    if summary.abandoned > 0 {
        logger.warn(&format!("{} detectors did not finish", summary.abandoned));
    }
    if summary.not_run > 0 {
        logger.warn(&format!("{} detectors not run", summary.not_run));
    }
    logger.info(&format!(
        "{} succeeded, {} failed, {} abandoned",
        summary.succeeded, summary.failed, summary.abandoned
    ));
}
