//! minitd - line daemon for minit
//!
//! Listens on loopback TCP (127.0.0.1:6000 by default) for `<verb> <unit>`
//! lines from minitctl, netcat, or anything else that can write a line.

use clap::Parser;
use log::info;
use std::sync::Arc;

use minit::daemon::Daemon;
use minit::{ConfigArgs, Supervisor};

#[derive(Parser)]
#[command(name = "minitd")]
#[command(about = "Minimal service supervisor daemon")]
#[command(
    long_about = "minitd serves minit commands over a loopback TCP socket. \
    Each line `<verb> <unit>` gets exactly one response line."
)]
#[command(version)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = args.config.resolve();
    info!(
        "units in {}, runtime state in {}",
        config.unit_dir.display(),
        config.runtime_dir.display()
    );

    let supervisor = Arc::new(Supervisor::from_config(&config));
    let daemon = Daemon::bind(&config, supervisor).await?;

    tokio::select! {
        result = daemon.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
        }
    }

    Ok(())
}
