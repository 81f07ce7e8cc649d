//! Service supervisor
//!
//! Starts, stops and reports on units. The supervisor keeps no state in
//! memory: every operation takes the unit's lock, reads its liveness record
//! and checks it against the OS process table. The same code therefore
//! serves a one-shot CLI invocation and a long-lived daemon.

mod liveness;
mod process;
mod state;
pub mod sys;

pub use liveness::{LivenessRecord, LivenessStore, UnitLock};
pub use process::{spawn_service, SpawnError};
pub use state::{ActiveState, StartOutcome, StopOutcome, UnitStatus};

use std::path::Path;
use std::time::Duration;

use chrono::Utc;

use crate::config::Config;
use crate::resolver::{ResolveError, Resolver};
use crate::units::{normalize_name, validate_name, StoreError, UnitDefinition, UnitStore};

/// Supervisor over one unit directory and one runtime directory
#[derive(Debug, Clone)]
pub struct Supervisor {
    store: UnitStore,
    resolver: Resolver,
    liveness: LivenessStore,
    stop_timeout: Duration,
}

impl Supervisor {
    pub fn new(
        store: UnitStore,
        resolver: Resolver,
        liveness: LivenessStore,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            liveness,
            stop_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            UnitStore::new(&config.unit_dir),
            Resolver::new(&config.app_base, &config.default_working_dir),
            LivenessStore::new(&config.runtime_dir),
            config.stop_timeout,
        )
    }

    pub fn store(&self) -> &UnitStore {
        &self.store
    }

    pub fn runtime_dir(&self) -> &Path {
        self.liveness.dir()
    }

    /// Path of the captured output log for a unit
    pub fn log_path(&self, name: &str) -> std::path::PathBuf {
        self.liveness.log_path(name)
    }

    pub async fn add(
        &self,
        target: &str,
        content: Option<&str>,
    ) -> Result<UnitDefinition, ManagerError> {
        Ok(self.store.add(target, content).await?)
    }

    /// Write a definition built from structured fields
    pub async fn create_definition(
        &self,
        definition: &UnitDefinition,
    ) -> Result<UnitDefinition, ManagerError> {
        Ok(self.store.create(definition).await?)
    }

    /// Delete a unit's definition, and its lock file unless it still runs
    pub async fn remove(&self, name: &str) -> Result<(), ManagerError> {
        self.store.remove(name).await?;

        let name = normalize_name(name);
        let lock = self.liveness.lock(&name).await?;
        if self.liveness.read(&name).await?.is_none() {
            lock.discard()?;
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<String>, ManagerError> {
        Ok(self.store.list().await?)
    }

    /// Start a unit unless its recorded process is still alive
    pub async fn start(&self, name: &str) -> Result<StartOutcome, ManagerError> {
        validate_name(name)?;
        let name = normalize_name(name);
        let _lock = self.liveness.lock(&name).await?;

        if let Some(record) = self.liveness.read(&name).await? {
            if self.is_live(&name, &record)? {
                log::info!("{} already running (pid {})", name, record.pid);
                return Ok(StartOutcome::AlreadyRunning { pid: record.pid });
            }
            log::info!("Discarding stale record for {} (pid {})", name, record.pid);
            self.stop_orphaned_group(&name, &record).await?;
            self.liveness.remove(&name).await?;
        }

        let definition = self.store.find_definition(&name).await?;
        let command = self.resolver.resolve(&name, definition.as_ref()).map_err(|e| {
            log::warn!("{} -> {}: {}", name, ActiveState::Failed.as_str(), e);
            e
        })?;

        let mut child = process::spawn_service(&name, &command, &self.liveness.log_path(&name))
            .map_err(|e| self.launch_failed(&name, e))?;

        let pid = match child.id() {
            Some(pid) => pid,
            None => return Err(self.launch_failed(&name, SpawnError::Vanished(name.clone()))),
        };

        // Read the token before anything else can reap the child
        let start_time = match sys::process_info(pid) {
            Ok(Some(info)) => info.start_time,
            Ok(None) => {
                return Err(self.launch_failed(&name, SpawnError::Vanished(name.clone())));
            }
            Err(e) => {
                let _ = child.start_kill();
                return Err(self.launch_failed(&name, e));
            }
        };

        let record = LivenessRecord {
            unit: name.clone(),
            pid,
            start_time,
            command: command.display_line(),
            started_at: Utc::now(),
        };
        if let Err(e) = self.liveness.write(&record).await {
            let _ = child.start_kill();
            return Err(self.launch_failed(&name, e));
        }

        // Reap in the background; the record is the source of truth
        let unit = name.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => log::debug!("{} (pid {}) exited: {}", unit, pid, status),
                Err(e) => log::debug!("Cannot wait for {} (pid {}): {}", unit, pid, e),
            }
        });

        let outcome = StartOutcome::Started { pid };
        log::info!(
            "{} -> {} (pid {}): {}",
            name,
            outcome.state().as_str(),
            pid,
            record.command
        );
        Ok(outcome)
    }

    /// Stop a unit's process tree and delete its record
    pub async fn stop(&self, name: &str) -> Result<StopOutcome, ManagerError> {
        validate_name(name)?;
        let name = normalize_name(name);
        let lock = self.liveness.lock(&name).await?;

        let Some(record) = self.liveness.read(&name).await? else {
            log::debug!("{} has no record, nothing to stop", name);
            lock.discard()?;
            return Ok(StopOutcome::NotRunning);
        };

        if !self.is_live(&name, &record)? {
            let stopped = self.stop_orphaned_group(&name, &record).await?;
            log::info!("Discarding stale record for {} (pid {})", name, record.pid);
            self.liveness.remove(&name).await?;
            lock.discard()?;
            return Ok(if stopped {
                StopOutcome::Stopped { pid: record.pid }
            } else {
                StopOutcome::NotRunning
            });
        }

        log::info!("Stopping {} (pid {})", name, record.pid);
        sys::terminate_tree(record.pid, &record.start_time, self.stop_timeout)
            .await
            .map_err(|e| ManagerError::TerminationFailed {
                unit: name.clone(),
                message: e.to_string(),
            })?;
        self.liveness.remove(&name).await?;
        lock.discard()?;

        let outcome = StopOutcome::Stopped { pid: record.pid };
        log::info!("{} -> {}", name, outcome.state().as_str());
        Ok(outcome)
    }

    /// Report whether a unit's recorded process is alive
    ///
    /// A record that no longer matches the process table is deleted.
    pub async fn status(&self, name: &str) -> Result<UnitStatus, ManagerError> {
        validate_name(name)?;
        let name = normalize_name(name);
        let lock = self.liveness.lock(&name).await?;

        let Some(record) = self.liveness.read(&name).await? else {
            lock.discard()?;
            return Ok(UnitStatus::inactive());
        };

        if self.is_live(&name, &record)? {
            return Ok(UnitStatus {
                state: ActiveState::Active,
                pid: Some(record.pid),
                since: Some(record.started_at),
                command: Some(record.command),
            });
        }

        // Keep the record while the group lingers so `stop` can still reach it
        if !self.orphaned_group(&name, &record)?.is_empty() {
            log::info!(
                "{}: pid {} exited but its process group is still running",
                name,
                record.pid
            );
            return Ok(UnitStatus::inactive());
        }

        log::info!(
            "{} -> {}: pid {} is gone or reused, removing record",
            name,
            ActiveState::Unknown.as_str(),
            record.pid
        );
        self.liveness.remove(&name).await?;
        lock.discard()?;
        Ok(UnitStatus::inactive())
    }

    fn is_live(&self, name: &str, record: &LivenessRecord) -> Result<bool, ManagerError> {
        sys::is_alive(record.pid, &record.start_time).map_err(|e| {
            ManagerError::StatusCheckFailed {
                unit: name.to_string(),
                message: e.to_string(),
            }
        })
    }

    fn orphaned_group(
        &self,
        name: &str,
        record: &LivenessRecord,
    ) -> Result<Vec<sys::ProcessInfo>, ManagerError> {
        sys::orphaned_group(record.pid, &record.start_time).map_err(|e| {
            ManagerError::StatusCheckFailed {
                unit: name.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Terminate processes left in the group of an exited main process
    ///
    /// Returns whether anything was left to stop.
    async fn stop_orphaned_group(
        &self,
        name: &str,
        record: &LivenessRecord,
    ) -> Result<bool, ManagerError> {
        let members = self.orphaned_group(name, record)?;
        if members.is_empty() {
            return Ok(false);
        }

        log::info!(
            "Stopping {} leftover process(es) of {} (group {})",
            members.len(),
            name,
            record.pid
        );
        sys::terminate_group(record.pid, &members, self.stop_timeout)
            .await
            .map_err(|e| ManagerError::TerminationFailed {
                unit: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(true)
    }

    fn launch_failed(&self, name: &str, err: impl std::fmt::Display) -> ManagerError {
        log::warn!("{} -> {}: {}", name, ActiveState::Failed.as_str(), err);
        ManagerError::LaunchFailed {
            unit: name.to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Failed to launch {unit}: {message}")]
    LaunchFailed { unit: String, message: String },

    #[error("Failed to stop {unit}: {message}")]
    TerminationFailed { unit: String, message: String },

    #[error("Status check failed for {unit}: {message}")]
    StatusCheckFailed { unit: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
