//! Unit file parsing, typed definitions and on-disk storage

mod parser;
mod service;
mod store;

pub use parser::{last_value, parse_file, ParsedFile, ParsedSection};
pub use service::*;
pub use store::{
    normalize_name, strip_suffix, unit_key, validate_name, StoreError, UnitStore, UNIT_SUFFIX,
};

use std::path::Path;

/// Parse a unit file from disk without storing it
pub async fn load_unit_file(path: &Path) -> std::io::Result<UnitDefinition> {
    let content = tokio::fs::read_to_string(path).await?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(normalize_name)
        .unwrap_or_else(|| "unknown.service".to_string());
    Ok(UnitDefinition::from_parsed(&name, parse_file(&content)))
}
