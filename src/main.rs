//! memfleet - supervisor for a fleet of memory stress-test workers
//!
//! ## Usage
//!
//! ```bash
//! # Test 16 GB with 8 workers in 2 rows, stopping every worker past 400%
//! memfleet run --threads 8 --ram 16000 --rows 2 --stop-at 400
//!
//! # Centre the grid on the screen and save the offsets
//! memfleet run --threads 8 --centre --save
//!
//! # Valid row counts for 12 workers
//! memfleet rows --threads 12
//!
//! # Effective settings
//! memfleet config
//!
//! # With verbose logging and a custom log directory
//! memfleet -v --log-dir /tmp/memfleet-logs run
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use memfleet_config::{Settings, SystemMemory, default_rows, row_choices, system, validate};
use memfleet_core::{FleetError, LogGuard, SystemClock, init_logging, logging};
use memfleet_engine::{Orchestrator, ShutdownReport};
use memfleet_worker::{ProcessConfig, ProcessWorkerProvider, WorkerFleet, centred, xdo};
use tracing::{error, info, warn};

/// Supervisor for a fleet of memory stress-test workers
///
/// Launches one worker process per thread, tiles their windows, aggregates
/// their coverage and stops them on request or when a stop policy fires.
#[derive(Parser, Debug)]
#[command(name = "memfleet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.memfleet/logs/)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Settings file (defaults to ~/.memfleet/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch the fleet and supervise it until it stops
    Run(RunArgs),
    /// List the row counts that evenly tile a thread count
    Rows {
        #[arg(long)]
        threads: usize,
    },
    /// Print the effective settings as YAML
    Config,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Number of workers
    #[arg(long)]
    threads: Option<usize>,

    /// Total RAM to test in MB (defaults to all available RAM)
    #[arg(long)]
    ram: Option<u64>,

    /// Rows of the window grid; must divide the thread count
    #[arg(long)]
    rows: Option<usize>,

    #[arg(long, allow_hyphen_values = true)]
    x_offset: Option<i32>,

    #[arg(long, allow_hyphen_values = true)]
    y_offset: Option<i32>,

    #[arg(long, allow_hyphen_values = true)]
    x_spacing: Option<i32>,

    #[arg(long, allow_hyphen_values = true)]
    y_spacing: Option<i32>,

    /// Stop each worker once its coverage exceeds this percentage
    #[arg(long)]
    stop_at: Option<u32>,

    /// Stop the fleet as soon as any worker reports an error
    #[arg(long)]
    stop_on_error: bool,

    /// Start every worker window minimised
    #[arg(long)]
    start_minimised: bool,

    /// Seconds to wait for workers to finish after a stop
    #[arg(long)]
    timeout: Option<u64>,

    /// Path to the worker executable
    #[arg(long)]
    worker: Option<PathBuf>,

    /// Continue even if more RAM is requested than is available
    #[arg(short, long)]
    yes: bool,

    /// Centre the window grid on the screen, replacing the x/y offsets
    #[arg(long)]
    centre: bool,

    /// Persist the merged settings before running
    #[arg(long)]
    save: bool,

    /// Write the final shutdown report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

impl RunArgs {
    /// Overlay the flags that were given onto the loaded settings.
    fn apply(&self, settings: &mut Settings) {
        if let Some(threads) = self.threads {
            settings.threads = Some(threads);
        }
        if let Some(ram) = self.ram {
            settings.ram = Some(ram);
        }
        if let Some(rows) = self.rows {
            settings.rows = Some(rows);
        }
        if let Some(x_offset) = self.x_offset {
            settings.x_offset = x_offset;
        }
        if let Some(y_offset) = self.y_offset {
            settings.y_offset = y_offset;
        }
        if let Some(x_spacing) = self.x_spacing {
            settings.x_spacing = x_spacing;
        }
        if let Some(y_spacing) = self.y_spacing {
            settings.y_spacing = y_spacing;
        }
        if let Some(percent) = self.stop_at {
            settings.stop_at = true;
            settings.stop_at_value = Some(percent);
        }
        if self.stop_on_error {
            settings.stop_on_error = true;
        }
        if self.start_minimised {
            settings.start_minimised = true;
        }
        if let Some(timeout) = self.timeout {
            settings.timeout = Some(timeout);
        }
        if let Some(worker) = &self.worker {
            settings.worker.executable = worker.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            report_error(&e, Some(&e));
            return ExitCode::from(1);
        }
    };

    let _guard = match setup_logging(&cli, &settings) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let result = match &cli.command {
        Command::Run(args) => run(&cli, args, settings).await,
        Command::Rows { threads } => print_rows(*threads),
        Command::Config => print_config(cli.config.as_deref(), &settings),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("memfleet error: {:#}", e);
            report_error(format!("{:#}", e), e.downcast_ref::<FleetError>());
            ExitCode::from(1)
        }
    }
}

fn load_settings(path: Option<&Path>) -> memfleet_core::Result<Settings> {
    match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}

/// Set up logging; `-v` or the `verbose` setting raises the level.
fn setup_logging(cli: &Cli, settings: &Settings) -> memfleet_core::Result<LogGuard> {
    let verbose = cli.verbose > 0 || settings.verbose;
    init_logging(cli.log_dir.clone(), verbose)
}

fn report_error(message: impl std::fmt::Display, fleet_error: Option<&FleetError>) {
    eprintln!("Error: {}", message);
    if let Some(hint) = fleet_error.and_then(FleetError::guidance) {
        eprintln!("Hint: {}", hint);
    }
}

async fn run(cli: &Cli, args: &RunArgs, mut settings: Settings) -> anyhow::Result<ExitCode> {
    args.apply(&mut settings);

    let memory = SystemMemory::read()?;
    let capacity = system::thread_capacity();
    let mut validated = validate(&settings, &memory, capacity)?;

    if args.centre {
        let work_area = xdo::display_geometry().await?;
        let layout = centred(
            &validated.config.layout,
            validated.config.thread_count,
            work_area,
            settings.worker.window_size(),
        )?;
        info!(x_offset = layout.x_offset, y_offset = layout.y_offset, "Centred window grid");
        settings.x_offset = layout.x_offset;
        settings.y_offset = layout.y_offset;
        validated.config.layout = layout;
    }

    if args.save {
        match &cli.config {
            Some(path) => settings.save_to(path)?,
            None => settings.save()?,
        }
    }
    for warning in &validated.warnings {
        warn!(%warning, "Validation warning");
        eprintln!("warning: {}", warning);
    }
    if validated.needs_confirmation() && !args.yes {
        bail!("refusing to continue without confirmation; pass --yes to proceed");
    }
    let config = validated.config;

    let status_dir = match &settings.worker.status_dir {
        Some(dir) => dir.clone(),
        None => logging::memfleet_home()?.join("status"),
    };
    let process = ProcessConfig::new(&settings.worker.executable, status_dir)
        .with_window(settings.worker.window_size())
        .with_manage_windows(settings.worker.manage_windows)
        .with_startup_grace(Duration::from_millis(settings.worker.startup_grace_ms))
        .with_window_wait(Duration::from_millis(settings.worker.window_wait_ms));
    let provider = Arc::new(ProcessWorkerProvider::new(process)?);
    let fleet = Arc::new(WorkerFleet::new(provider, Arc::new(SystemClock), capacity));
    let orchestrator = Orchestrator::new(fleet);

    println!(
        "Starting {} workers, {:.2} MB each ({} MB total)",
        config.thread_count,
        config.ram_share_mb(),
        config.total_ram_mb
    );
    orchestrator.launch(&config).await?;

    let mut progress = orchestrator.progress();
    let printer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            if let Some(report) = progress.borrow_and_update().clone() {
                println!("{}", report);
            }
        }
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Interrupt received, stopping workers");
            println!("Stopping workers...");
            orchestrator.request_stop().await?;
        }
        reason = orchestrator.stopped() => {
            println!("Stopping: {}", reason?);
        }
    }

    // A second Ctrl-C abandons the drain
    let report = tokio::select! {
        report = orchestrator.await_shutdown(config.timeout()) => report?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            warn!("Interrupted while draining, closing workers");
            println!("Interrupted; closing workers without waiting");
            printer.abort();
            orchestrator.close_all().await;
            return Ok(ExitCode::from(1));
        }
    };
    printer.abort();
    print_report(&report);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    orchestrator.close_all().await;

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn print_report(report: &ShutdownReport) {
    println!();
    for row in &report.rows {
        let marker = if row.errored { "  <- errors" } else { "" };
        println!("{}{}", row, marker);
    }
    if !report.final_snapshot_fresh {
        println!("(some workers could not be read; showing last-known totals)");
    }
    if let Some(estimate) = &report.estimate {
        println!("{} | {}", estimate.describe_speed(), estimate.describe_eta());
    }
    println!(
        "Run finished after {}: {}",
        memfleet_engine::format_hms(report.elapsed),
        report.stop_reason
    );
    if !report.is_clean() {
        println!("Some workers did not finish in time; they will be closed.");
    }
}

fn print_rows(threads: usize) -> anyhow::Result<ExitCode> {
    if threads == 0 {
        bail!("number of threads must be greater than 0");
    }
    let choices: Vec<String> = row_choices(threads).iter().map(ToString::to_string).collect();
    println!("Row counts for {} threads: {}", threads, choices.join(", "));
    println!("Default: {}", default_rows(threads));
    Ok(ExitCode::SUCCESS)
}

fn print_config(path: Option<&Path>, settings: &Settings) -> anyhow::Result<ExitCode> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(memfleet_config::settings::config_path);
    if let Some(path) = path {
        println!("# {}", path.display());
    }
    print!("{}", serde_yaml::to_string(settings)?);
    Ok(ExitCode::SUCCESS)
}
