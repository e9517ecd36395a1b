//! `model.json` plugin manifests

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Manifest file name inside each plugin directory
pub const MANIFEST_FILE: &str = "model.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no model.json in {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Contents of `<plugins_dir>/<id>/model.json`
///
/// Only display metadata is required; unknown keys are preserved and echoed
/// back by `/api/models`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PluginManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Compiled-in implementation to instantiate; defaults to the directory name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    /// Free-form plugin settings
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub settings: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginManifest {
    /// Read the manifest of the plugin directory `dir`
    pub fn load(dir: &Path) -> Result<Self, ManifestError> {
        let path = dir.join(MANIFEST_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::Missing(dir.to_path_buf()))
            }
            Err(source) => return Err(ManifestError::Io { path, source }),
        };
        serde_json::from_str(&raw).map_err(|source| ManifestError::Parse { path, source })
    }

    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(id)
    }

    pub fn entry_point<'a>(&'a self, id: &'a str) -> &'a str {
        self.entry.as_deref().unwrap_or(id)
    }

    /// Typed lookup into `settings`
    pub fn setting<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.settings
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// One entry of the plugin listing
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub entry: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginInfo {
    pub fn new(id: &str, manifest: &PluginManifest) -> Self {
        Self {
            id: id.to_string(),
            name: manifest.display_name(id).to_string(),
            description: manifest.description.clone(),
            version: manifest.version.clone(),
            entry: manifest.entry_point(id).to_string(),
            extra: manifest.extra.clone(),
        }
    }
}

/// Plugin ids are directory names: no separators, no dot entries
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.chars().any(char::is_control)
}
