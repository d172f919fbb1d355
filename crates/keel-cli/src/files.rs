//! Declared resource files, state files and configuration.
//!
//! A declared file names its resource type and gives attributes by their
//! attribute names:
//!
//! ```json
//! { "type": "model_endpoint", "attributes": { "name": "ranker" } }
//! ```
//!
//! Applying `ranker.json` writes the resulting remote state to
//! `<state-dir>/ranker.state.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use keel_engine::{EngineConfig, RemoteState};
use serde::Deserialize;

/// A declared resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclaredFile {
    /// Resource type name.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Attributes keyed by attribute name.
    #[serde(default = "DeclaredFile::empty_attributes")]
    pub attributes: serde_json::Value,
}

impl DeclaredFile {
    fn empty_attributes() -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }
}

pub fn read_declared(path: &Path) -> Result<DeclaredFile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read declared file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse declared file {}", path.display()))
}

pub fn read_state(path: &Path) -> Result<RemoteState> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse state file {}", path.display()))
}

pub fn read_state_if_exists(path: &Path) -> Result<Option<RemoteState>> {
    if path.exists() {
        read_state(path).map(Some)
    } else {
        Ok(None)
    }
}

/// Write through a temporary file so a crash never leaves a truncated state.
pub fn write_state(path: &Path, state: &RemoteState) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("failed to serialize state")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// `<dir>/<stem>.state.json` for the declared file `<stem>.json`.
pub fn state_path(dir: &Path, declared: &Path) -> Result<PathBuf> {
    let stem = declared
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("declared file {} has no usable name", declared.display()))?;
    Ok(dir.join(format!("{stem}.state.json")))
}

/// Load the engine configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}
