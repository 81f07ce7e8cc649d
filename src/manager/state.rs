//! Supervisor state machine
//!
//! ```text
//!                 start (spawned)
//!     ┌──────────┐ ───────────────► ┌──────────┐
//!     │ Inactive │                  │  Active  │
//!     └──────────┘ ◄─────────────── └──────────┘
//!       ▲    │       stop / exit          │
//!       │    │ start (spawn error)        │ pid reused
//!       │    ▼                            ▼
//!     ┌──────────┐                  ┌──────────┐
//!     │  Failed  │                  │ Unknown  │ ── reconciled ──► Inactive
//!     └──────────┘                  └──────────┘
//! ```
//!
//! Nothing here is kept in memory between calls: every state is derived from
//! the liveness record and the OS process table at the time of the call.

use chrono::{DateTime, Utc};

/// High-level unit state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveState {
    /// A record exists but no longer describes a live process
    Unknown,
    Active,
    Inactive,
    /// The last launch attempt errored
    Failed,
}

impl ActiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Failed => "failed",
        }
    }
}

/// Result of a successful `start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    /// Idempotent no-op: the recorded process is still alive
    AlreadyRunning { pid: u32 },
}

impl StartOutcome {
    pub fn pid(&self) -> u32 {
        match self {
            Self::Started { pid } | Self::AlreadyRunning { pid } => *pid,
        }
    }

    pub fn state(&self) -> ActiveState {
        ActiveState::Active
    }
}

/// Result of a successful `stop`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { pid: u32 },
    /// Nothing was running; stopping is a no-op
    NotRunning,
}

impl StopOutcome {
    pub fn state(&self) -> ActiveState {
        ActiveState::Inactive
    }
}

/// Result of a `status` query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub state: ActiveState,
    pub pid: Option<u32>,
    pub since: Option<DateTime<Utc>>,
    pub command: Option<String>,
}

impl UnitStatus {
    pub fn inactive() -> Self {
        Self {
            state: ActiveState::Inactive,
            pid: None,
            since: None,
            command: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ActiveState::Active
    }
}
