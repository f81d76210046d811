//! TJSDoc - API documentation generation orchestrator
//!
//! Main entry point for the command line.
//!
//! # Execution Flow
//!
//! 1. Parse arguments (`-h` / `-v` print and exit with 0)
//! 2. Initialize logging (console, optionally a daily rotated file)
//! 3. Locate the config: `-c <path>`, then the conventional `.tjsdocrc*` /
//!    `.tjsdoc.*` files, then the `tjsdoc` field of `package.json`
//! 4. Run the [`Coordinator`] on a current-thread tokio runtime until it
//!    terminates (immediately, or after a shutdown signal when kept alive)
//! 5. Map any error through the [`ErrorHandler`](tjsdoc::ErrorHandler) to exit code 1

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{ArgAction, CommandFactory, Parser};
use std::process::ExitCode;
use tjsdoc::config::ConfigLocator;
use tjsdoc::lifecycle::FATAL_EXIT_CODE;
use tjsdoc::logging::{LoggingOptions, setup_logging_with_console};
use tjsdoc::{APP_NAME, Coordinator, ErrorHandler, VERSION};

#[derive(Debug, Parser)]
#[command(name = "tjsdoc", version, about = "Generate API documentation", disable_version_flag = true)]
struct Cli {
    /// Config file to use instead of the conventional locations
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    /// Also write daily rotated log files into this directory
    #[arg(long, value_name = "DIR", env = "TJSDOC_LOG_DIR")]
    log_dir: Option<Utf8PathBuf>,

    /// Log to the console as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Start at debug log level
    #[arg(long)]
    debug: bool,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = match setup_logging_with_console(&LoggingOptions {
        log_dir: cli.log_dir.clone(),
        debug_mode: cli.debug,
        json: cli.log_json,
        ..LoggingOptions::default()
    }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::from(FATAL_EXIT_CODE);
        }
    };

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    match run(&cli, logging.level_handle()) {
        Ok(code) => code,
        Err(e) => ExitCode::from(ErrorHandler::default().handle(&e)),
    }
}

fn run(cli: &Cli, level: tjsdoc::logging::LogLevelHandle) -> Result<ExitCode> {
    let mut coordinator = Coordinator::builder().log_level_handle(level).build()?;

    let locator = ConfigLocator::new(coordinator.dir_path());
    let Some((raw, source)) = locator.locate(cli.config.as_deref())? else {
        tracing::error!("No config found: pass -c <path> or add a .tjsdocrc file");
        Cli::command().print_help().context("Failed to print help")?;
        return Ok(ExitCode::from(FATAL_EXIT_CODE));
    };
    tracing::info!("Using config: {}", source);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build the tokio runtime")?;

    match runtime.block_on(coordinator.generate(raw)) {
        Ok(()) => {
            tracing::info!("Generation complete");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(ExitCode::from(coordinator.error_handler().handle(&e))),
    }
}
