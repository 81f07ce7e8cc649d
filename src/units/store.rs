//! Unit definition storage
//!
//! One file per unit in a single directory. Names are matched
//! case-insensitively and always carry a `.service` suffix on disk.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use super::parser::parse_file;
use super::service::UnitDefinition;

pub const UNIT_SUFFIX: &str = ".service";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid unit name: {0:?}")]
    InvalidUnitName(String),

    #[error("No unit content supplied for {0}")]
    EmptyContent(String),

    #[error("unit not found: {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Append `.service` unless the name already ends with it (in any case)
pub fn normalize_name(name: &str) -> String {
    let name = name.trim();
    if has_unit_suffix(name) {
        name.to_string()
    } else {
        format!("{}{}", name, UNIT_SUFFIX)
    }
}

/// Unit name without its `.service` suffix
pub fn strip_suffix(name: &str) -> &str {
    if has_unit_suffix(name) {
        &name[..name.len() - UNIT_SUFFIX.len()]
    } else {
        name
    }
}

/// Case-folded key used for runtime files and comparisons
pub fn unit_key(name: &str) -> String {
    normalize_name(name).to_lowercase()
}

fn has_unit_suffix(name: &str) -> bool {
    name.len() > UNIT_SUFFIX.len()
        && name.is_char_boundary(name.len() - UNIT_SUFFIX.len())
        && name[name.len() - UNIT_SUFFIX.len()..].eq_ignore_ascii_case(UNIT_SUFFIX)
}

/// Reject names that cannot be a single file in the units directory
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let trimmed = name.trim();
    let stem = strip_suffix(trimmed);
    if trimmed.is_empty()
        || stem.is_empty()
        || stem == "."
        || stem == ".."
        || trimmed.starts_with('.')
        || trimmed.contains(['/', '\\', '\0'])
        || trimmed.chars().any(char::is_whitespace)
    {
        return Err(StoreError::InvalidUnitName(name.to_string()));
    }
    Ok(())
}

/// Unit definitions persisted under one directory
#[derive(Debug, Clone)]
pub struct UnitStore {
    dir: PathBuf,
}

impl UnitStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store a unit definition
    ///
    /// With no `content` and a `target` that is an existing file, the file is
    /// copied verbatim and keyed by its file name. Otherwise `target` is the
    /// unit name and `content` the INI text.
    pub async fn add(
        &self,
        target: &str,
        content: Option<&str>,
    ) -> Result<UnitDefinition, StoreError> {
        let source = Path::new(target);
        if content.is_none() && tokio::fs::metadata(source).await.is_ok_and(|m| m.is_file()) {
            let file_name = source
                .file_name()
                .and_then(OsStr::to_str)
                .ok_or_else(|| StoreError::InvalidUnitName(target.to_string()))?;
            validate_name(file_name)?;
            let text = tokio::fs::read_to_string(source)
                .await
                .map_err(|e| StoreError::io(source, e))?;
            let name = normalize_name(file_name);
            log::info!("Adding unit {} from {}", name, source.display());
            return self.write(&name, &text).await;
        }

        validate_name(target)?;
        let name = normalize_name(target);
        let text = match content {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Err(StoreError::EmptyContent(name)),
        };
        log::info!("Adding unit {}", name);
        self.write(&name, text).await
    }

    /// Store a definition rendered through the unit template
    pub async fn create(&self, definition: &UnitDefinition) -> Result<UnitDefinition, StoreError> {
        validate_name(&definition.name)?;
        let name = normalize_name(&definition.name);
        log::info!("Creating unit {}", name);
        self.write(&name, &definition.render()).await
    }

    /// Delete a stored definition
    pub async fn remove(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        let path = self
            .find(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(normalize_name(name)))?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        log::info!("Removed unit {}", path.display());
        Ok(())
    }

    /// Load and parse a stored definition
    pub async fn get(&self, name: &str) -> Result<UnitDefinition, StoreError> {
        validate_name(name)?;
        let path = self
            .find(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(normalize_name(name)))?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        let stored_name = path
            .file_name()
            .and_then(OsStr::to_str)
            .map(str::to_string)
            .unwrap_or_else(|| normalize_name(name));
        Ok(UnitDefinition::from_parsed(&stored_name, parse_file(&text)))
    }

    /// Like [`get`](Self::get) but absence is `None` rather than an error
    pub async fn find_definition(&self, name: &str) -> Result<Option<UnitDefinition>, StoreError> {
        match self.get(name).await {
            Ok(def) => Ok(Some(def)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Unit names on disk, in directory enumeration order
    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            // Skip in-flight temp files
            if name.starts_with('.') || !has_unit_suffix(&name) {
                continue;
            }
            if entry.file_type().await.is_ok_and(|t| t.is_file()) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Find the stored file for a unit, ignoring case
    async fn find(&self, name: &str) -> Result<Option<PathBuf>, StoreError> {
        let wanted = normalize_name(name);

        // Exact match first
        let exact = self.dir.join(&wanted);
        if tokio::fs::metadata(&exact).await.is_ok_and(|m| m.is_file()) {
            return Ok(Some(exact));
        }

        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|stored| stored.eq_ignore_ascii_case(&wanted))
            .map(|stored| self.dir.join(stored)))
    }

    /// Atomically write `text` as unit `name`, replacing any case variant
    async fn write(&self, name: &str, text: &str) -> Result<UnitDefinition, StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        if let Some(existing) = self.find(name).await? {
            if existing.file_name().and_then(OsStr::to_str) != Some(name) {
                log::debug!("Replacing {} with {}", existing.display(), name);
                tokio::fs::remove_file(&existing)
                    .await
                    .map_err(|e| StoreError::io(&existing, e))?;
            }
        }

        let path = self.dir.join(name);
        let tmp = self
            .dir
            .join(format!(".{}.tmp{}", name, std::process::id()));
        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        Ok(UnitDefinition::from_parsed(name, parse_file(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("webapp"), "webapp.service");
        assert_eq!(normalize_name("webapp.service"), "webapp.service");
        assert_eq!(normalize_name("WebApp.SERVICE"), "WebApp.SERVICE");
        assert_eq!(normalize_name("Acme.Services.HelloWorld"), "Acme.Services.HelloWorld.service");
    }

    #[test]
    fn test_strip_suffix() {
        assert_eq!(strip_suffix("webapp.service"), "webapp");
        assert_eq!(strip_suffix("webapp.Service"), "webapp");
        assert_eq!(strip_suffix("webapp"), "webapp");
        assert_eq!(strip_suffix(".service"), ".service");
    }

    #[test]
    fn test_unit_key_is_case_insensitive() {
        assert_eq!(unit_key("WebApp"), unit_key("webapp.service"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("webapp").is_ok());
        assert!(validate_name("my-app@1.service").is_ok());
        for bad in ["", "   ", ".", "..", "../etc/passwd", "a/b", ".hidden", "two words", ".service"] {
            assert!(
                matches!(validate_name(bad), Err(StoreError::InvalidUnitName(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
