//! Command line entry point: promote every tagged object in one run.

use clap::Parser;
use log::{LevelFilter, info};
use promote_lib::commands::app::{self, AppError, Plan};
use promote_lib::config::{Config, ConfigError};
use std::io::Write as _;
use thiserror::Error;

/// Top-level error type for the promote CLI binary.
#[derive(Debug, Error)]
enum PromoteError {
    /// The environment does not hold a usable configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Command orchestration failed.
    #[error(transparent)]
    App(#[from] AppError),
}

/// Command line arguments.
#[derive(Parser)]
#[command(name = "promote")]
#[command(
    about = "Promote tagged reports, dashboards and data modules from development to production",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

/// Load the configuration, discover tagged objects and promote them.
#[expect(
    clippy::print_stdout,
    reason = "the object lists are the program's output, logs go to stderr"
)]
fn main() -> Result<(), PromoteError> {
    let cli = Cli::parse();

    init_logging(&cli);

    let config = Config::from_env()?;
    let (source, destination) = app::connect(&config)?;
    let plan = Plan::build(source, destination, &config.migration)?;

    if plan.candidates().is_empty() {
        info!("Nothing tagged with {} in the main folders", config.migration.tag);
    }

    println!("Objects to migrate:");
    for item in plan.candidates() {
        println!("  {}", item.default_name);
    }

    let migrated = plan.execute(&config.migration)?;

    println!("Migrated objects:");
    for name in &migrated {
        println!("  {name}");
    }
    Ok(())
}

/// Initialize logging based on the verbosity level specified in the CLI.
fn init_logging(cli: &Cli) {
    let mut builder = env_logger::builder();
    builder
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format(|buf, record| {
            let level = record.level();
            let style = &buf.default_level_style(level);
            writeln!(buf, "[{style}{level}{style:#}] {}", record.args())
        });

    if !cli.verbose {
        builder.format_timestamp(None);
    }

    builder.init();
}
