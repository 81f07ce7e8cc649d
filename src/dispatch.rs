//! Request dispatch
//!
//! Both front ends (the one-shot CLI and the line daemon) turn their input
//! into a [`Request`] and hand it to [`dispatch`]. The resulting [`Response`]
//! carries the text line shown to the caller and the CLI exit code.

use std::fmt;
use std::time::Duration;

use crate::manager::{ManagerError, StartOutcome, StopOutcome, Supervisor};
use crate::protocol::{ProtocolError, Request};
use crate::resolver::ResolveError;
use crate::units::StoreError;

/// Outcome of one request
#[derive(Debug)]
pub enum Response {
    Added(String),
    Removed(String),
    Started { name: String, pid: u32 },
    AlreadyRunning { name: String, pid: u32 },
    Stopped { name: String, pid: u32 },
    /// `stop` of a unit with no live process
    NothingToStop(String),
    /// `status` of a unit with no live process
    Inactive(String),
    Running { name: String, pid: u32 },
    Reloaded(Vec<String>),
    /// The request line did not get an answer in time
    Timeout { request: String, after: Duration },
    Error(ManagerError),
    Rejected(ProtocolError),
}

impl Response {
    /// Process exit status for the stateless CLI
    ///
    /// 0 success, 1 benign not-found/not-running, 2 bad usage,
    /// 3 operational failure, 4 status check failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Added(_)
            | Self::Removed(_)
            | Self::Started { .. }
            | Self::AlreadyRunning { .. }
            | Self::Stopped { .. }
            | Self::NothingToStop(_)
            | Self::Running { .. }
            | Self::Reloaded(_) => 0,
            Self::Inactive(_) => 1,
            Self::Rejected(_) => 2,
            Self::Timeout { .. } => 3,
            Self::Error(e) => error_exit_code(e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

fn error_exit_code(err: &ManagerError) -> i32 {
    match err {
        ManagerError::Store(StoreError::NotFound(_)) => 1,
        ManagerError::Store(StoreError::InvalidUnitName(_) | StoreError::EmptyContent(_)) => 2,
        ManagerError::Store(StoreError::Io { .. }) => 3,
        ManagerError::Resolve(ResolveError::ExecutableNotFound(_) | ResolveError::InvalidCommand(_)) => 3,
        ManagerError::LaunchFailed { .. } | ManagerError::TerminationFailed { .. } => 3,
        ManagerError::Io(_) => 3,
        ManagerError::StatusCheckFailed { .. } => 4,
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added(name) => write!(f, "{} added", name),
            Self::Removed(name) => write!(f, "{} removed", name),
            Self::Started { name, pid } => write!(f, "{} started (pid {})", name, pid),
            Self::AlreadyRunning { name, pid } => {
                write!(f, "{} already running (pid {})", name, pid)
            }
            Self::Stopped { name, .. } => write!(f, "{} stopped", name),
            Self::NothingToStop(name) | Self::Inactive(name) => write!(f, "{} not running", name),
            Self::Running { name, pid } => write!(f, "{} running (pid {})", name, pid),
            Self::Reloaded(units) if units.is_empty() => f.write_str("reloaded 0 unit(s)"),
            Self::Reloaded(units) => {
                write!(f, "reloaded {} unit(s): {}", units.len(), units.join(" "))
            }
            Self::Timeout { request, after } => write!(
                f,
                "timeout: {} did not complete within {}s",
                request,
                after.as_secs()
            ),
            Self::Error(e) => write!(f, "{}", e),
            Self::Rejected(e) => write!(f, "{}", e),
        }
    }
}

impl From<ProtocolError> for Response {
    fn from(err: ProtocolError) -> Self {
        Self::Rejected(err)
    }
}

/// Run one request against the supervisor
pub async fn dispatch(supervisor: &Supervisor, request: Request) -> Response {
    log::debug!("dispatch: {}", request);
    match request {
        Request::Add { target, content } => {
            match supervisor.add(&target, content.as_deref()).await {
                Ok(definition) => Response::Added(definition.name),
                Err(e) => Response::Error(e),
            }
        }

        Request::Remove { name } => match supervisor.remove(&name).await {
            Ok(()) => Response::Removed(name),
            Err(e) => Response::Error(e),
        },

        Request::Start { name } => match supervisor.start(&name).await {
            Ok(StartOutcome::Started { pid }) => Response::Started { name, pid },
            Ok(StartOutcome::AlreadyRunning { pid }) => Response::AlreadyRunning { name, pid },
            Err(e) => Response::Error(e),
        },

        Request::Stop { name } => match supervisor.stop(&name).await {
            Ok(StopOutcome::Stopped { pid }) => Response::Stopped { name, pid },
            Ok(StopOutcome::NotRunning) => Response::NothingToStop(name),
            Err(e) => Response::Error(e),
        },

        Request::Status { name } => match supervisor.status(&name).await {
            Ok(status) => match status.pid {
                Some(pid) if status.is_active() => Response::Running { name, pid },
                _ => Response::Inactive(name),
            },
            Err(e) => Response::Error(e),
        },

        Request::Reload => match supervisor.list().await {
            Ok(units) => {
                log::info!("Reloaded {} unit files", units.len());
                Response::Reloaded(units)
            }
            Err(e) => Response::Error(e),
        },
    }
}
