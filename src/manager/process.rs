//! Process spawning

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};

use crate::resolver::ResolvedCommand;

/// Launch a resolved command as a detached service process
///
/// The child gets its own process group so that stopping it can signal the
/// whole group. stdout and stderr are appended to `log_path`; stdin is
/// `/dev/null`. The child is not killed when the handle is dropped, so it
/// outlives a one-shot CLI invocation.
pub fn spawn_service(
    unit: &str,
    command: &ResolvedCommand,
    log_path: &Path,
) -> Result<Child, SpawnError> {
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|source| SpawnError::Output {
            path: log_path.to_path_buf(),
            source,
        })?;
    let log_err = log.try_clone().map_err(|source| SpawnError::Output {
        path: log_path.to_path_buf(),
        source,
    })?;

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(&command.working_dir)
        .env("MINIT_UNIT", unit)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .process_group(0)
        .kill_on_drop(false);

    log::debug!(
        "Spawning {} in {}: {}",
        unit,
        command.working_dir.display(),
        command.display_line()
    );

    cmd.spawn().map_err(|source| SpawnError::Spawn {
        program: command.program.clone(),
        source,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Failed to spawn {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open output log {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Process for {0} exited before it could be recorded")]
    Vanished(String),
}
