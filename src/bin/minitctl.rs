//! minitctl - client for minitd
//!
//! Sends one command line to the daemon and prints the reply.

use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::process::ExitCode;
use std::time::Duration;

use minit::config::DEFAULT_LISTEN;
use minit::protocol::Request;

#[derive(Parser)]
#[command(name = "minitctl")]
#[command(about = "Send a command to a running minitd")]
struct Args {
    /// Daemon address
    #[arg(long, env = "MINIT_LISTEN", default_value = DEFAULT_LISTEN, global = true)]
    addr: SocketAddr,

    /// Seconds to wait for the reply
    #[arg(long, default_value_t = 60, global = true)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a unit file by path (as seen by the daemon)
    Add {
        /// Path to the .service file
        path: String,
    },

    /// Delete a stored unit definition
    Remove {
        /// Unit name
        name: String,
    },

    /// Start a unit
    Start {
        /// Unit name (e.g., "webapp" or "webapp.service")
        name: String,
    },

    /// Stop a unit
    Stop {
        /// Unit name
        name: String,
    },

    /// Show unit status
    Status {
        /// Unit name
        name: String,
    },

    /// List unit definitions on disk
    DaemonReload,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let request = match args.command {
        Command::Add { path } => Request::Add {
            target: path,
            content: None,
        },
        Command::Remove { name } => Request::Remove { name },
        Command::Start { name } => Request::Start { name },
        Command::Stop { name } => Request::Stop { name },
        Command::Status { name } => Request::Status { name },
        Command::DaemonReload => Request::Reload,
    };

    match call(args.addr, &request, Duration::from_secs(args.timeout)) {
        Ok(reply) => {
            print!("{}", reply);
            if !reply.ends_with('\n') {
                println!();
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("minitctl: daemon not running on {}", args.addr);
                eprintln!("  start with: minitd");
            } else {
                eprintln!("minitctl: {}", e);
            }
            ExitCode::from(2)
        }
    }
}

/// One exchange: write the line, half-close, read until the daemon hangs up
fn call(addr: SocketAddr, request: &Request, timeout: Duration) -> std::io::Result<String> {
    let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    writeln!(stream, "{}", request)?;
    stream.shutdown(Shutdown::Write)?;

    let mut reply = String::new();
    stream.read_to_string(&mut reply)?;
    Ok(reply)
}
