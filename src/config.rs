use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreResult;
use crate::store::fs::write_json_atomic;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "api-docs.config.json";

/// Settings that only take effect at start-up; runtime updates leave them alone.
const STARTUP_KEYS: [&str; 4] = ["path", "dataDir", "port", "staticDir"];
/// Computed per request and never stored.
const COMPUTED_KEYS: [&str; 2] = ["canEdit", "mountPath"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub base_url: String,
    /// Mount point for every route.
    pub path: String,
    pub allow_external_edit: bool,
    pub theme: String,
    pub primary_color: String,
    pub data_dir: PathBuf,
    pub port: u16,
    /// Built UI assets; when unset only the JSON API is served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "API Documentation".to_string(),
            description: "API documentation and testing interface".to_string(),
            version: "1.0.0".to_string(),
            author: "API Team".to_string(),
            base_url: "http://localhost:3000".to_string(),
            path: "/api-docs".to_string(),
            allow_external_edit: false,
            theme: "dark".to_string(),
            primary_color: "#6B7280".to_string(),
            data_dir: PathBuf::from("./api-docs"),
            port: 3000,
            static_dir: None,
        }
    }
}

impl AppConfig {
    /// Load from `explicit`, or from [`DEFAULT_CONFIG_FILE`] if present, or fall back to defaults.
    /// Returns the file the configuration is bound to, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let candidate = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok((Self::default(), None));
                }
                default
            }
        };

        let contents = fs::read_to_string(&candidate)
            .with_context(|| format!("failed to read config file {}", candidate.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", candidate.display()))?;
        Ok((config, Some(candidate)))
    }

    pub fn save(&self, path: &Path) -> StoreResult<()> {
        write_json_atomic(path, self)
    }

    /// Merge a partial update, keeping start-up settings as they are.
    pub fn merged_with(&self, mut update: Map<String, Value>) -> Result<Self, serde_json::Error> {
        for key in STARTUP_KEYS.iter().chain(COMPUTED_KEYS.iter()) {
            update.remove(*key);
        }

        let mut current = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        current.extend(update);

        let mut merged: Self = serde_json::from_value(Value::Object(current))?;
        merged.path = self.path.clone();
        merged.data_dir = self.data_dir.clone();
        merged.port = self.port;
        merged.static_dir = self.static_dir.clone();
        Ok(merged)
    }

    /// `path` with a single leading slash and no trailing slash; empty when mounted at the root.
    pub fn mount_path(&self) -> String {
        let segments = self.mount_segments();
        if segments.is_empty() {
            String::new()
        } else {
            format!("/{}", segments.join("/"))
        }
    }

    pub fn mount_segments(&self) -> Vec<String> {
        self.path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }
}
