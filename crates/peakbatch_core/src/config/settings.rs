//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::execution::DEFAULT_WORKER_MEMORY_MB;
use crate::logging::{LogConfig, LogLevel};
use crate::models::{IntegrateParams, PeakSearchParams, StrategyKind};
use crate::supervisor::{
    EscalationPolicy, DEFAULT_INITIAL_WAIT, DEFAULT_REMOTE_WAIT_CEILING, DEFAULT_WAIT_CEILING,
};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Execution strategy and supervision settings.
    #[serde(default)]
    pub execution: ExecutionSettings,

    /// Default peak search parameters.
    #[serde(default)]
    pub search: PeakSearchParams,

    /// Default integration parameters.
    #[serde(default)]
    pub integrate: IntegrateParams,

    /// Output artifact settings.
    #[serde(default)]
    pub output: OutputSettings,
}

/// Input, output and working directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Folder holding the run files.
    #[serde(default = "default_data_folder")]
    pub data_folder: String,

    /// Folder the peaks artifact and diagnostic log are written to.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    /// Root folder for worker scratch files. Must be shared storage
    /// when the remote queue is used.
    #[serde(default = "default_temp_root")]
    pub temp_root: String,

    /// Folder for application log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Run file name prefix (`<prefix><run>.<extension>`).
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Run file extension.
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

fn default_data_folder() -> String {
    "data".to_string()
}

fn default_output_folder() -> String {
    "peaks_output".to_string()
}

fn default_temp_root() -> String {
    ".temp".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

fn default_file_prefix() -> String {
    "SCD_".to_string()
}

fn default_file_extension() -> String {
    "json".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_folder: default_data_folder(),
            output_folder: default_output_folder(),
            temp_root: default_temp_root(),
            logs_folder: default_logs_folder(),
            file_prefix: default_file_prefix(),
            file_extension: default_file_extension(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Application log level (overridden by `RUST_LOG`).
    #[serde(default)]
    pub level: LogLevel,

    /// Only log progress at `progress_step` intervals.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Prefix diagnostic log lines with a timestamp.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,

    /// Number of recent lines kept for error diagnosis.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

fn default_progress_step() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            show_timestamps: true,
            error_tail: default_error_tail(),
            progress_step: default_progress_step(),
        }
    }
}

impl LoggingSettings {
    /// Diagnostic log configuration for these settings.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            compact: self.compact,
            progress_step: self.progress_step,
            error_tail: self.error_tail as usize,
            show_timestamps: self.show_timestamps,
        }
    }
}

/// Execution strategy, concurrency and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Most units running at once. Zero or less runs units one at a
    /// time and stops at the first algorithm failure.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: i32,

    /// Run each unit in its own OS process.
    #[serde(default)]
    pub isolate_workers: bool,

    /// Batch queue to submit workers to. Selects the remote strategy.
    #[serde(default)]
    pub remote_queue_name: Option<String>,

    /// Queue submission program.
    #[serde(default = "default_queue_submit_program")]
    pub queue_submit_program: String,

    /// Job name given to queued workers.
    #[serde(default = "default_queue_job_name")]
    pub queue_job_name: String,

    /// Worker executable. Empty means the running executable.
    #[serde(default)]
    pub worker_program: String,

    /// Per-worker virtual memory budget in MB for isolated workers.
    #[serde(default = "default_worker_memory_mb")]
    pub worker_memory_mb: u64,

    /// First wait budget of the supervisor.
    #[serde(default = "default_initial_wait_ms")]
    pub initial_wait_ms: u64,

    /// Largest wait budget for local and process workers.
    #[serde(default = "default_wait_ceiling_ms")]
    pub wait_ceiling_ms: u64,

    /// Largest wait budget for queued workers.
    #[serde(default = "default_remote_wait_ceiling_ms")]
    pub remote_wait_ceiling_ms: u64,

    /// How often subprocess workers are checked for completion.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_concurrent() -> i32 {
    4
}

fn default_queue_submit_program() -> String {
    crate::execution::DEFAULT_SUBMIT_PROGRAM.to_string()
}

fn default_queue_job_name() -> String {
    crate::execution::DEFAULT_JOB_NAME.to_string()
}

fn default_worker_memory_mb() -> u64 {
    DEFAULT_WORKER_MEMORY_MB
}

fn default_initial_wait_ms() -> u64 {
    DEFAULT_INITIAL_WAIT.as_millis() as u64
}

fn default_wait_ceiling_ms() -> u64 {
    DEFAULT_WAIT_CEILING.as_millis() as u64
}

fn default_remote_wait_ceiling_ms() -> u64 {
    DEFAULT_REMOTE_WAIT_CEILING.as_millis() as u64
}

fn default_poll_interval_ms() -> u64 {
    200
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            isolate_workers: false,
            remote_queue_name: None,
            queue_submit_program: default_queue_submit_program(),
            queue_job_name: default_queue_job_name(),
            worker_program: String::new(),
            worker_memory_mb: default_worker_memory_mb(),
            initial_wait_ms: default_initial_wait_ms(),
            wait_ceiling_ms: default_wait_ceiling_ms(),
            remote_wait_ceiling_ms: default_remote_wait_ceiling_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ExecutionSettings {
    /// Queue name, ignoring blank values.
    pub fn remote_queue(&self) -> Option<&str> {
        self.remote_queue_name
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// Strategy selected by these settings: a queue name selects the
    /// remote strategy, else `isolate_workers` selects processes.
    pub fn strategy_kind(&self) -> StrategyKind {
        if self.remote_queue().is_some() {
            StrategyKind::Remote
        } else if self.isolate_workers {
            StrategyKind::Process
        } else {
            StrategyKind::Local
        }
    }

    /// Escalation policy for the given strategy.
    pub fn escalation_policy(&self, strategy: StrategyKind) -> EscalationPolicy {
        let ceiling = match strategy {
            StrategyKind::Remote => self.remote_wait_ceiling_ms,
            StrategyKind::Local | StrategyKind::Process => self.wait_ceiling_ms,
        };
        EscalationPolicy::new(
            Duration::from_millis(self.initial_wait_ms),
            Duration::from_millis(ceiling),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Worker program override, if configured.
    pub fn worker_program(&self) -> Option<PathBuf> {
        let program = self.worker_program.trim();
        (!program.is_empty()).then(|| PathBuf::from(program))
    }
}

/// Output artifact settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Experiment name used in artifact file names.
    #[serde(default = "default_experiment")]
    pub experiment: String,

    /// Merge new peaks into an existing peaks file instead of replacing it.
    #[serde(default)]
    pub append: bool,
}

fn default_experiment() -> String {
    "experiment".to_string()
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            experiment: default_experiment(),
            append: false,
        }
    }
}

/// Configuration sections for atomic updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Logging,
    Execution,
    Search,
    Integrate,
    Output,
}

impl ConfigSection {
    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Execution => "execution",
            ConfigSection::Search => "search",
            ConfigSection::Integrate => "integrate",
            ConfigSection::Output => "output",
        }
    }

    /// Every section, in file order.
    pub fn all() -> [ConfigSection; 6] {
        [
            ConfigSection::Paths,
            ConfigSection::Logging,
            ConfigSection::Execution,
            ConfigSection::Search,
            ConfigSection::Integrate,
            ConfigSection::Output,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[execution]"));
        assert!(toml.contains("max_concurrent"));
    }

    #[test]
    fn settings_round_trip() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.paths.output_folder, settings.paths.output_folder);
        assert_eq!(parsed.search, settings.search);
        assert_eq!(parsed.integrate, settings.integrate);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[execution]\nmax_concurrent = 0";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.execution.max_concurrent, 0);
        assert_eq!(parsed.execution.worker_memory_mb, DEFAULT_WORKER_MEMORY_MB);
        assert_eq!(parsed.paths.temp_root, ".temp");
        assert!(!parsed.output.append);
    }

    #[test]
    fn strategy_kind_resolution() {
        let mut exec = ExecutionSettings::default();
        assert_eq!(exec.strategy_kind(), StrategyKind::Local);

        exec.isolate_workers = true;
        assert_eq!(exec.strategy_kind(), StrategyKind::Process);

        exec.remote_queue_name = Some("  ".to_string());
        assert_eq!(exec.strategy_kind(), StrategyKind::Process);

        exec.remote_queue_name = Some("long".to_string());
        assert_eq!(exec.strategy_kind(), StrategyKind::Remote);
    }

    #[test]
    fn remote_strategy_gets_longer_ceiling() {
        let exec = ExecutionSettings::default();
        assert_eq!(
            exec.escalation_policy(StrategyKind::Local).ceiling,
            DEFAULT_WAIT_CEILING
        );
        assert_eq!(
            exec.escalation_policy(StrategyKind::Remote).ceiling,
            DEFAULT_REMOTE_WAIT_CEILING
        );
    }

    #[test]
    fn logging_settings_convert_to_log_config() {
        let logging = LoggingSettings {
            compact: false,
            error_tail: 7,
            ..LoggingSettings::default()
        };
        let config = logging.log_config();
        assert!(!config.compact);
        assert_eq!(config.error_tail, 7);
    }
}
