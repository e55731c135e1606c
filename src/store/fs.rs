use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Component, Path};

use crate::error::{StoreError, StoreResult};
use crate::models::api_docs::{LOCATION_KEYS, document_id};

pub const JSON_EXTENSION: &str = ".json";

/// Normalize a `/`-separated folder path relative to the endpoints root.
///
/// Empty segments and `.` are dropped, so a leading `/` is harmless; `..` is rejected.
pub fn normalize_folder(folder: &str) -> StoreResult<String> {
    if folder.contains('\0') {
        return Err(StoreError::Validation("Folder contains invalid characters".into()));
    }

    let mut segments = Vec::new();
    for segment in folder.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(StoreError::Validation(
                    "Folder must stay inside the endpoints directory".into(),
                ));
            }
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

/// Check a single path segment such as a file or folder name.
pub fn validate_segment(name: &str, what: &str) -> StoreResult<()> {
    if name.trim().is_empty() {
        return Err(StoreError::Validation(format!("{what} is required")));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(StoreError::Validation(format!(
            "{what} contains invalid characters"
        )));
    }
    Ok(())
}

/// `/`-joined directory of `dir` relative to `root`; empty for the root itself.
pub fn relative_folder(root: &Path, dir: &Path) -> String {
    dir.strip_prefix(root)
        .map(|relative| {
            relative
                .components()
                .filter_map(|component| match component {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

/// File name with the JSON extension removed, if it has one.
pub fn document_stem(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(JSON_EXTENSION)
        .filter(|stem| !stem.is_empty())
}

/// Read a document file. Any JSON object with a non-empty string `id` is accepted as stored;
/// stale location keys are dropped.
pub fn load_document(path: &Path) -> StoreResult<Map<String, Value>> {
    let contents = fs::read_to_string(path).map_err(|err| StoreError::io(path, err))?;
    let value: Value =
        serde_json::from_str(&contents).map_err(|err| StoreError::serialize(path, err))?;
    let Value::Object(mut document) = value else {
        return Err(StoreError::Validation(format!(
            "{} is not a JSON object",
            path.display()
        )));
    };
    if document_id(&document).is_none() {
        return Err(StoreError::Validation(format!(
            "{} has no id",
            path.display()
        )));
    }
    for key in LOCATION_KEYS {
        document.remove(key);
    }
    Ok(document)
}

/// Write pretty-printed JSON through a sibling temp file and rename it over `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Validation(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;

    let mut contents = serde_json::to_vec_pretty(value).map_err(|err| StoreError::serialize(path, err))?;
    contents.push(b'\n');

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix: u32 = rand::thread_rng().r#gen();
    let temp = parent.join(format!(".{file_name}.{suffix:08x}.tmp"));

    fs::write(&temp, &contents).map_err(|err| StoreError::io(&temp, err))?;
    if let Err(err) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(StoreError::io(path, err));
    }
    Ok(())
}
