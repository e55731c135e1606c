use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::fs::write_json_atomic;
use super::ids::generate_id;
use crate::error::{StoreError, StoreResult};
use crate::models::api_docs::sample_endpoint;

const ENDPOINTS_DIR: &str = "endpoints";
const SOCKETS_DIR: &str = "sockets";
const SAMPLE_FILE: &str = "get-users.json";

/// On-disk layout of a data directory: `endpoints/` holds the documents and `sockets/` is reserved.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub root: PathBuf,
    pub endpoints: PathBuf,
    pub sockets: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            endpoints: root.join(ENDPOINTS_DIR),
            sockets: root.join(SOCKETS_DIR),
            root,
        }
    }

    /// Create the directories and seed the sample endpoint if it is missing.
    /// Returns whether the sample was written.
    pub fn initialize(&self) -> StoreResult<bool> {
        for dir in [&self.endpoints, &self.sockets] {
            fs::create_dir_all(dir).map_err(|err| StoreError::io(dir, err))?;
        }

        let sample = self.endpoints.join(SAMPLE_FILE);
        if sample.exists() {
            return Ok(false);
        }
        write_json_atomic(&sample, &sample_endpoint(&generate_id(), Utc::now()))?;
        info!(path = %sample.display(), "seeded sample endpoint");
        Ok(true)
    }
}
