//! minit - minimal userspace service supervisor
//!
//! Stores systemd-style `.service` definitions, starts and stops their
//! processes, and reports liveness. Liveness survives restarts of the
//! supervisor itself: each started unit leaves a record holding the PID and
//! the process start time, which is checked against the OS on every query.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │   minit (one-shot CLI)   │  minitd (line daemon)  │
//! ├──────────────────────────────────────────────────┤
//! │          protocol::Request → dispatch            │
//! ├──────────────────────────────────────────────────┤
//! │               manager::Supervisor                │
//! ├────────────────┬─────────────────┬───────────────┤
//! │ units (store)  │    resolver     │ manager::sys  │
//! └────────────────┴─────────────────┴───────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod diagnostics;
pub mod dispatch;
pub mod manager;
pub mod protocol;
pub mod resolver;
pub mod units;

pub use config::{Config, ConfigArgs};
pub use dispatch::{dispatch, Response};
pub use manager::{ManagerError, Supervisor};
pub use protocol::Request;
pub use units::{UnitDefinition, UnitStore};
