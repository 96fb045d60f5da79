//! peakbatch - command-line driver for batch peak searches.
//!
//! Runs find-peaks and integrate batches from a TOML configuration, and
//! hosts the `worker` subcommand that isolated and queued workers run.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use peakbatch_core::algorithm::reference::{json_runner, JsonDatasetLoader};
use peakbatch_core::config::{ConfigManager, ConfigSection, Settings};
use peakbatch_core::execution::run_worker;
use peakbatch_core::jobs::parse_int_list;
use peakbatch_core::logging::{init_tracing, init_tracing_with_file, LogLevel};
use peakbatch_core::models::{BatchResult, UnitOutcome, UnitReport};
use peakbatch_core::orchestrator::{BatchDriver, BatchError, BatchRequest};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LevelArg {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LevelArg> for LogLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Trace => LogLevel::Trace,
            LevelArg::Debug => LogLevel::Debug,
            LevelArg::Info => LogLevel::Info,
            LevelArg::Warn => LogLevel::Warn,
            LevelArg::Error => LogLevel::Error,
        }
    }
}

#[derive(Parser)]
#[command(name = "peakbatch")]
#[command(version, about = "Batch peak search over runs and detectors", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "peakbatch.toml")]
    config: PathBuf,

    /// Application log level (RUST_LOG takes precedence)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LevelArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct BatchArgs {
    /// Run numbers, e.g. "8336:8339,8342"
    #[arg(long)]
    runs: String,

    /// Detector ids, e.g. "1:14"
    #[arg(long)]
    detectors: String,

    /// Experiment name used for output file names
    #[arg(long)]
    experiment: Option<String>,

    /// Output folder
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Most detectors processed at once (0 = one at a time, stop on failure)
    #[arg(long)]
    max_concurrent: Option<i32>,

    /// Run each detector in its own process
    #[arg(long)]
    isolate: bool,

    /// Submit workers to this batch queue
    #[arg(long)]
    queue: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Find peaks on every run x detector
    Find {
        #[command(flatten)]
        batch: BatchArgs,

        /// Add to an existing peaks file instead of replacing it
        #[arg(long)]
        append: bool,
    },

    /// Integrate peaks on every run x detector
    Integrate {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Configuration file management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run a single work unit (launched by isolated and queued pools)
    Worker {
        /// Request file written by the pool
        #[arg(long)]
        request: PathBuf,

        /// Response file to write
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        config,
        log_level,
        command,
    } = cli;

    match command {
        Command::Config {
            action: ConfigAction::Init { force },
        } => init_config(&config, force),
        Command::Worker { request, output } => {
            let settings = load_settings(&config, false)?;
            init_tracing(level(log_level, &settings));
            worker(&settings, &request, &output)
        }
        Command::Find { batch, append } => {
            let mut settings = load_settings(&config, true)?;
            settings.output.append |= append;
            batch_command(&config, log_level, settings, batch, false)
        }
        Command::Integrate { batch } => {
            let settings = load_settings(&config, true)?;
            batch_command(&config, log_level, settings, batch, true)
        }
    }
}

fn level(arg: Option<LevelArg>, settings: &Settings) -> LogLevel {
    arg.map(LogLevel::from).unwrap_or(settings.logging.level)
}

/// Load settings. Missing files give defaults unless `create` writes them.
fn load_settings(path: &Path, create: bool) -> Result<Settings> {
    let mut manager = ConfigManager::new(path);
    if create {
        manager
            .load_or_create()
            .with_context(|| format!("loading {}", path.display()))?;
        manager.ensure_dirs_exist()?;
    } else if path.exists() {
        manager
            .load()
            .with_context(|| format!("loading {}", path.display()))?;
    }
    Ok(manager.settings().clone())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let manager = ConfigManager::new(path);
    manager.save()?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn worker(settings: &Settings, request: &Path, output: &Path) -> Result<()> {
    let paths = &settings.paths;
    let loader = JsonDatasetLoader::new(&paths.data_folder, &paths.file_prefix, &paths.file_extension);
    run_worker(request, output, &json_runner(loader))
        .with_context(|| format!("running worker for {}", request.display()))?;
    Ok(())
}

fn batch_command(
    config: &Path,
    log_level: Option<LevelArg>,
    mut settings: Settings,
    args: BatchArgs,
    integrate: bool,
) -> Result<()> {
    let runs = parse_int_list(&args.runs).context("--runs")?;
    let detectors = parse_int_list(&args.detectors).context("--detectors")?;

    if let Some(n) = args.max_concurrent {
        settings.execution.max_concurrent = n;
    }
    if args.isolate {
        settings.execution.isolate_workers = true;
    }
    if args.queue.is_some() {
        settings.execution.remote_queue_name = args.queue.clone();
    }

    let _guard = init_tracing_with_file(
        level(log_level, &settings),
        Path::new(&settings.paths.logs_folder),
        "peakbatch.log",
    )
    .context("initializing logging")?;

    let mut request = if integrate {
        BatchRequest::integrate(&settings, runs, detectors, settings.integrate.clone())
    } else {
        BatchRequest::find_peaks(&settings, runs, detectors, settings.search.clone())
    };
    if let Some(experiment) = args.experiment {
        request = request.with_experiment(experiment);
    }
    if let Some(dir) = args.output_dir {
        request = request.with_output_dir(dir);
    }

    // Workers must find the same configuration, possibly on another node.
    let config_path = config.canonicalize().unwrap_or_else(|_| config.to_path_buf());
    let paths = &settings.paths;
    let loader = JsonDatasetLoader::new(&paths.data_folder, &paths.file_prefix, &paths.file_extension);
    let driver = BatchDriver::new(settings.clone(), json_runner(loader)).with_worker_args([
        "--config".to_string(),
        config_path.to_string_lossy().into_owned(),
        "worker".to_string(),
    ]);

    tracing::info!(
        strategy = %settings.execution.strategy_kind(),
        max_concurrent = settings.execution.max_concurrent,
        "Running batch"
    );

    match driver.run(&request) {
        Ok(result) => {
            print_result(&result);
            remember_experiment(config, &request.experiment);
            Ok(())
        }
        Err(BatchError::Persistence { result, source }) => {
            print_result(&result);
            Err(source).context("peaks were found but could not be saved")
        }
        Err(BatchError::Aborted {
            key,
            failure,
            reports,
            summary,
        }) => {
            print_outcomes(&reports);
            println!("{}", summary);
            bail!("batch aborted at {}: {}", key, failure)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_outcomes(reports: &[UnitReport]) {
    for report in reports {
        match &report.outcome {
            UnitOutcome::Failed { failure } => println!("  {}: {}", report.key, failure),
            UnitOutcome::Abandoned { reason } => {
                println!("  {}: did not finish ({})", report.key, reason)
            }
            _ => {}
        }
    }
}

fn print_result(result: &BatchResult) {
    print_outcomes(&result.units);
    println!("{}", result.summary());
    if let Some(path) = &result.artifact_path {
        println!("Peaks: {}", path.display());
    }
    if let Some(path) = &result.log_path {
        println!("Log:   {}", path.display());
    }
}

/// Store the last experiment name in the config's output section.
fn remember_experiment(path: &Path, experiment: &str) {
    let mut manager = ConfigManager::new(path);
    if manager.load().is_err() || manager.settings().output.experiment == experiment {
        return;
    }
    manager.settings_mut().output.experiment = experiment.to_string();
    if let Err(e) = manager.update_section(ConfigSection::Output) {
        tracing::warn!("Could not update {}: {}", path.display(), e);
    }
}
