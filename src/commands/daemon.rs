//! Run the line daemon in the foreground

use std::process::ExitCode;
use std::sync::Arc;

use minit::daemon::Daemon;
use minit::{Config, Supervisor};

pub async fn daemon(config: &Config) -> ExitCode {
    let supervisor = Arc::new(Supervisor::from_config(config));
    let daemon = match Daemon::bind(config, supervisor).await {
        Ok(daemon) => daemon,
        Err(e) => {
            log::error!("cannot listen on {}: {}", config.listen, e);
            return ExitCode::from(3);
        }
    };

    tokio::select! {
        result = daemon.run() => {
            if let Err(e) = result {
                log::error!("daemon stopped: {}", e);
                return ExitCode::from(3);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received SIGINT, shutting down");
        }
    }
    ExitCode::SUCCESS
}
