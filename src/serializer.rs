//! Serialization of the contract document and artifact writing.

use crate::assembler::Document;
use crate::config::OutputFormat;
use crate::error::Result;
use log::debug;
use std::fs;
use std::path::Path;

/// Serializes the document in the requested format.
pub fn render(document: &Document, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => to_yaml(document),
        OutputFormat::Json => to_json(document),
    }
}

pub fn to_yaml(document: &Document) -> Result<String> {
    debug!("serializing document to YAML");
    Ok(serde_yaml::to_string(document)?)
}

/// Pretty-printed JSON, suitable for review and version control.
pub fn to_json(document: &Document) -> Result<String> {
    debug!("serializing document to JSON");
    Ok(serde_json::to_string_pretty(document)?)
}

/// Writes `content` to `path`, creating parent directories as needed.
pub fn write_file(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    debug!("wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}
