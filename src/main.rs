use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tickprobe::commands::{self, Command};
use tickprobe::Settings;

#[derive(Parser, Debug)]
#[command(name = "tickprobe")]
#[command(about = "Provision InfluxDB and drive Kapacitor alert tasks for integration tests")]
struct Args {
    /// TOML configuration file (TICKPROBE_* environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "tickprobe_clients=trace" (defaults to RUST_LOG, then "info")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.log_level.as_deref())?;

    let settings = Settings::load(args.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(commands::run(args.command, &settings))
}

/// Logs go to stderr so stdout stays clean for command output.
fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
