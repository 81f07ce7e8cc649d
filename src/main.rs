mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use minit::protocol::Request;
use minit::ConfigArgs;

#[derive(Parser)]
#[command(name = "minit")]
#[command(about = "Minimal userspace service supervisor")]
#[command(version)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a unit definition from a file, or from stdin under a name
    Add {
        /// Path to a .service file, or a unit name when piping content
        target: String,
    },

    /// Delete a stored unit definition
    Remove {
        /// Unit name (e.g., "webapp" or "webapp.service")
        name: String,
    },

    /// Start a unit (no-op if already running)
    Start {
        /// Unit name
        name: String,
    },

    /// Stop a unit and everything it spawned
    Stop {
        /// Unit name
        name: String,
    },

    /// Show whether a unit is running
    Status {
        /// Unit name
        name: String,
    },

    /// List the unit definitions on disk
    DaemonReload,

    /// Write a unit definition from flags
    Create(commands::CreateArgs),

    /// Serve commands over loopback TCP in the foreground
    Daemon,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if matches!(args.command, Command::Daemon) {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = args.config.resolve();

    let request = match args.command {
        Command::Add { target } => match commands::add_request(target).await {
            Ok(request) => request,
            Err(e) => {
                eprintln!("minit: cannot read unit content from stdin: {}", e);
                return ExitCode::from(3);
            }
        },
        Command::Remove { name } => Request::Remove { name },
        Command::Start { name } => Request::Start { name },
        Command::Stop { name } => Request::Stop { name },
        Command::Status { name } => Request::Status { name },
        Command::DaemonReload => Request::Reload,
        Command::Create(create) => return commands::create(&config, create).await,
        Command::Daemon => return commands::daemon(&config).await,
    };

    commands::execute(&config, request).await
}
