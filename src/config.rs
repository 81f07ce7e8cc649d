//! Runtime configuration
//!
//! Every setting can come from a command-line flag or a `MINIT_*` environment
//! variable; flags win. Binaries flatten [`ConfigArgs`] into their own
//! argument parser and call [`ConfigArgs::resolve`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

pub const DEFAULT_UNIT_DIR: &str = "/etc/minit/units";
pub const DEFAULT_APP_BASE: &str = "/app";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:6000";
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Longest request line the daemon accepts
pub const MAX_LINE_LENGTH: usize = 4096;

/// Resolved settings shared by every binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub unit_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub app_base: PathBuf,
    pub default_working_dir: PathBuf,
    pub listen: SocketAddr,
    /// Grace period between SIGTERM and SIGKILL
    pub stop_timeout: Duration,
    /// Upper bound on one daemon request before a timeout reply
    pub command_timeout: Duration,
    /// Idle connections are closed after this long
    pub idle_timeout: Duration,
    /// Where failure diagnostics are written, if anywhere
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            runtime_dir: default_runtime_dir(),
            app_base: PathBuf::from(DEFAULT_APP_BASE),
            default_working_dir: PathBuf::from("/"),
            listen: SocketAddr::from(([127, 0, 0, 1], 6000)),
            stop_timeout: Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(300),
            diagnostics_dir: None,
        }
    }
}

/// `$XDG_RUNTIME_DIR/minit` when there is one, `/run/minit` otherwise
pub fn default_runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .map(|dir| dir.join("minit"))
        .unwrap_or_else(|| PathBuf::from("/run/minit"))
}

/// Command-line and environment overrides
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Directory holding unit definitions
    #[arg(long, env = "MINIT_UNIT_DIR", global = true)]
    pub unit_dir: Option<PathBuf>,

    /// Directory for liveness records, locks and output logs
    #[arg(long, env = "MINIT_RUNTIME_DIR", global = true)]
    pub runtime_dir: Option<PathBuf>,

    /// Base directory for units without ExecStart
    #[arg(long, env = "MINIT_APP_BASE", global = true)]
    pub app_base: Option<PathBuf>,

    /// Working directory for units that do not set one
    #[arg(long, env = "MINIT_DEFAULT_WORKING_DIR", global = true)]
    pub default_working_dir: Option<PathBuf>,

    /// Address the daemon listens on (loopback only)
    #[arg(long, env = "MINIT_LISTEN", global = true)]
    pub listen: Option<SocketAddr>,

    /// Seconds to wait after SIGTERM before SIGKILL
    #[arg(long, env = "MINIT_STOP_TIMEOUT", global = true)]
    pub stop_timeout: Option<u64>,

    /// Seconds before a daemon request is answered with a timeout
    #[arg(long, env = "MINIT_COMMAND_TIMEOUT", global = true)]
    pub command_timeout: Option<u64>,

    /// Directory for failure diagnostics
    #[arg(long, env = "MINIT_DIAGNOSTICS_DIR", global = true)]
    pub diagnostics_dir: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn resolve(&self) -> Config {
        let defaults = Config::default();
        Config {
            unit_dir: self.unit_dir.clone().unwrap_or(defaults.unit_dir),
            runtime_dir: self.runtime_dir.clone().unwrap_or(defaults.runtime_dir),
            app_base: self.app_base.clone().unwrap_or(defaults.app_base),
            default_working_dir: self
                .default_working_dir
                .clone()
                .unwrap_or(defaults.default_working_dir),
            listen: self.listen.unwrap_or(defaults.listen),
            stop_timeout: self
                .stop_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.stop_timeout),
            command_timeout: self
                .command_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.command_timeout),
            idle_timeout: defaults.idle_timeout,
            diagnostics_dir: self.diagnostics_dir.clone(),
        }
    }
}
