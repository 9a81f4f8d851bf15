use std::fs::{self, File};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use acquisition_organizer::app::{App, OrganizeRequest, TracingSink};
use acquisition_organizer::config::{ConfigLoader, ConfigOverrides};
use acquisition_organizer::error::OrganizerError;
use acquisition_organizer::output::JsonOutput;

#[derive(Parser)]
#[command(name = "acq-org")]
#[command(about = "Organize acquisition data into category/line/visit/exam folders")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true, help = "Path to a JSON config file")]
    config: Option<String>,

    #[arg(long, global = true, help = "Base directory of the organized tree")]
    base: Option<String>,

    #[arg(long, global = true, help = "Directory for per-run log files")]
    log_dir: Option<String>,

    #[arg(long, global = true, help = "Log to stderr only")]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create the folder layout, copy a source directory and record it")]
    Organize(OrganizeArgs),
    #[command(about = "Print the metadata ledger")]
    Ledger,
}

#[derive(Args)]
struct OrganizeArgs {
    #[arg(long, help = "Top-level folder, e.g. raw or extracted")]
    category: String,

    #[arg(long = "line", help = "Acquisition line")]
    acquisition_line: String,

    #[arg(long, help = "Visit id")]
    visit: String,

    #[arg(long, help = "Exam id (non-negative integer)")]
    exam: String,

    #[arg(long, help = "Directory whose contents replace the exam folder")]
    source: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<OrganizerError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &OrganizerError) -> u8 {
    match error {
        OrganizerError::InvalidCategory(_)
        | OrganizerError::InvalidAcquisitionLine(_)
        | OrganizerError::InvalidVisitId(_)
        | OrganizerError::InvalidExamId(_)
        | OrganizerError::InvalidSource { .. } => 2,
        OrganizerError::Filesystem(_) => 3,
        OrganizerError::Ledger(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    let resolved = ConfigLoader::apply_overrides(
        resolved,
        ConfigOverrides {
            base_path: cli.base,
            log_dir: cli.log_dir,
        },
    );

    let log_dir = (!cli.no_log_file).then_some(resolved.log_dir.as_path());
    init_logging(log_dir)?;

    let app = App::from_config(&resolved, Arc::new(TracingSink));
    match cli.command {
        Commands::Organize(args) => {
            let request = OrganizeRequest::parse(
                &args.category,
                &args.acquisition_line,
                &args.visit,
                &args.exam,
                args.source.as_deref(),
            )?;
            match app.organize(&request) {
                Ok(report) => {
                    tracing::info!("Script completed successfully");
                    JsonOutput::print_organize(&report).into_diagnostic()?;
                    Ok(())
                }
                Err(err) => {
                    tracing::error!("Script failed to complete successfully");
                    Err(err.into())
                }
            }
        }
        Commands::Ledger => {
            let result = app.list()?;
            JsonOutput::print_ledger(&result).into_diagnostic()?;
            Ok(())
        }
    }
}

fn init_logging(log_dir: Option<&Utf8Path>) -> Result<(), OrganizerError> {
    let started = Local::now();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return Ok(());
    };

    fs::create_dir_all(log_dir.as_std_path())
        .map_err(|err| OrganizerError::Filesystem(format!("create log dir {log_dir}: {err}")))?;
    let log_path: Utf8PathBuf =
        log_dir.join(format!("run_{}.log", started.format("%Y-%m-%d_%H-%M-%S")));
    let file = File::create(log_path.as_std_path())
        .map_err(|err| OrganizerError::Filesystem(format!("create log file {log_path}: {err}")))?;
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::info!("Log file created at: {log_path}");
    tracing::info!(
        "Script started at: {}",
        started.format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}
