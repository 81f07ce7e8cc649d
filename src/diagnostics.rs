//! Failure diagnostics
//!
//! Operational failures (exit codes 3 and 4) can be dropped as small JSON
//! files for later inspection. Writing them is best effort: an error here is
//! logged and never changes the outcome of the command that failed.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dispatch::Response;
use crate::protocol::Request;
use crate::units::unit_key;

/// One failed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub verb: String,
    pub unit: String,
    pub message: String,
    pub exit_code: i32,
    pub timestamp: DateTime<Utc>,
}

/// JSON documents under one directory, written atomically
#[derive(Debug, Clone)]
pub struct FileDiagnostics {
    dir: PathBuf,
}

impl FileDiagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `data` as `<dir>/<name>.json`, replacing any earlier copy
    pub async fn write<T: Serialize>(&self, name: &str, data: &T) -> io::Result<()> {
        if name.trim().is_empty() || name.contains('/') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid diagnostics name {:?}", name),
            ));
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(format!("{}.json", name));
        let tmp = self
            .dir
            .join(format!(".{}.json.tmp{}", name, std::process::id()));
        let json = serde_json::to_vec_pretty(data).map_err(io::Error::other)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await
    }

    /// Read `<dir>/<name>.json`; `None` if it does not exist
    pub async fn read<T: DeserializeOwned>(&self, name: &str) -> io::Result<Option<T>> {
        let path = self.dir.join(format!("{}.json", name));
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Record a command outcome if it was an operational failure
    pub async fn record(&self, request: &Request, response: &Response) {
        let exit_code = response.exit_code();
        if exit_code < 3 {
            return;
        }

        let unit = report_unit(request);
        let report = FailureReport {
            verb: request.verb().to_string(),
            unit: unit.clone(),
            message: response.to_string(),
            exit_code,
            timestamp: Utc::now(),
        };
        let name = format!("{}-{}", unit, request.verb());
        if let Err(e) = self.write(&name, &report).await {
            log::debug!("Cannot write diagnostics {}: {}", name, e);
        }
    }
}

/// Unit key a report is filed under
///
/// `add` may name a file path; reports for it go under the file name.
fn report_unit(request: &Request) -> String {
    match request.target() {
        Some(target) if target.contains('/') => Path::new(target)
            .file_name()
            .map(|name| unit_key(&name.to_string_lossy()))
            .unwrap_or_else(|| "minit".into()),
        Some(target) => unit_key(target),
        None => "minit".into(),
    }
}

/// Record through an optional sink
pub async fn record(diagnostics: Option<&FileDiagnostics>, request: &Request, response: &Response) {
    if let Some(diagnostics) = diagnostics {
        diagnostics.record(request, response).await;
    }
}
