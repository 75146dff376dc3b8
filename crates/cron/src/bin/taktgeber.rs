//! taktgeber: cron-style task dispatcher.
//!
//! Connects to the directory service, registers as `cron`, and runs every
//! namespace's task list against the execution service until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use taktgeber_cron::config::load_dotenv;
use taktgeber_cron::observe::init_logging;
use taktgeber_cron::{CronService, DispatcherConfig};
use taktgeber_wire::ZmqConnector;

// ── CLI ─────────────────────────────────────────────────────────────

/// Cron-style task dispatcher.
#[derive(Parser, Debug)]
#[command(name = "taktgeber", about)]
struct Cli {
    /// Path to a taktgeber.toml config file. Defaults plus environment
    /// overrides are used when absent.
    #[arg(long, env = "TAKTGEBER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory service address, overriding config and environment.
    #[arg(short = 's', long)]
    directory: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Print version information and exit.
    #[arg(short = 'v', long = "print-version")]
    print_version: bool,
}

fn print_version() {
    println!(
        "taktgeber: \tv{} \t build time: {} \t commit hash: {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("TAKTGEBER_BUILD_TIME").unwrap_or("unknown"),
        option_env!("TAKTGEBER_GIT_HASH").unwrap_or("unknown"),
    );
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    if cli.print_version {
        print_version();
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => DispatcherConfig::from_file(path)?,
        None => DispatcherConfig::from_env()?,
    };
    if let Some(directory) = cli.directory {
        config.directory_address = directory;
    }
    if cli.debug {
        config.logging.debug = true;
    }
    config.validate()?;

    init_logging(&config.logging)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        directory = %config.directory_address,
        "taktgeber starting"
    );

    let service = CronService::new(&config, Arc::new(ZmqConnector));
    service.run(None).await;

    info!("taktgeber exited");
    Ok(())
}
