use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::fs::{
    JSON_EXTENSION, document_stem, load_document, normalize_folder, relative_folder,
    validate_segment, write_json_atomic,
};
use super::ids::generate_id;
use super::index::IdIndex;
use super::structure::{self, StructureNode};
use crate::error::{StoreError, StoreResult};
use crate::models::LocatedEndpoint;
use crate::models::api_docs::{default_endpoint_value, timestamp};
use crate::models::patch::{merge_patch, strip_reserved};

/// One JSON document per endpoint under a root directory, with nested folders.
///
/// Lookups by id go through an in-memory index and fall back to a full scan. There is no
/// file locking: concurrent writers to the same document race and the last write wins.
pub struct EndpointStore {
    root: PathBuf,
    index: IdIndex,
}

impl EndpointStore {
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| StoreError::io(&root, err))?;

        let store = Self {
            root,
            index: IdIndex::default(),
        };
        store.list_all();
        info!(
            root = %store.root.display(),
            indexed = store.index.len(),
            "endpoint store opened"
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every readable document in traversal order. Rebuilds the id index as a side effect.
    pub fn list_all(&self) -> Vec<LocatedEndpoint> {
        let scanned = self.scan();
        self.index.replace(
            scanned
                .iter()
                .map(|(path, located)| (located.id().to_string(), path.clone())),
        );
        scanned.into_iter().map(|(_, located)| located).collect()
    }

    pub fn find_by_id(&self, id: &str) -> StoreResult<LocatedEndpoint> {
        self.locate(id).map(|(_, located)| located)
    }

    pub fn create(
        &self,
        folder: &str,
        filename: &str,
        mut fields: Map<String, Value>,
    ) -> StoreResult<LocatedEndpoint> {
        validate_segment(filename, "Filename")?;
        let folder = normalize_folder(folder)?;
        strip_reserved(&mut fields);

        let id = generate_id();
        let Value::Object(mut document) = default_endpoint_value(&id, Utc::now()) else {
            return Err(StoreError::Validation("endpoint template is not an object".into()));
        };
        document.extend(fields);

        let file = self.folder_path(&folder).join(format!("{filename}{JSON_EXTENSION}"));
        if file.exists() {
            return Err(StoreError::Conflict("Endpoint file".into()));
        }

        write_json_atomic(&file, &document)?;
        self.index.insert(id.clone(), file.clone());
        info!(id = %id, path = %file.display(), "endpoint created");

        Ok(LocatedEndpoint {
            document,
            folder,
            filename: filename.to_string(),
        })
    }

    /// Merge `patch` into the stored document. `id` and `createdAt` never change and `updatedAt`
    /// never moves backwards.
    pub fn update_by_id(&self, id: &str, patch: Map<String, Value>) -> StoreResult<LocatedEndpoint> {
        let (path, current) = self.locate(id)?;

        let mut document = current.document;
        let previous_updated_at = document.get("updatedAt").cloned();
        merge_patch(&mut document, patch);
        document.insert(
            "updatedAt".to_string(),
            next_updated_at(previous_updated_at, Utc::now()),
        );

        write_json_atomic(&path, &document)?;
        debug!(id = %id, path = %path.display(), "endpoint updated");

        Ok(LocatedEndpoint {
            document,
            folder: current.folder,
            filename: current.filename,
        })
    }

    pub fn delete_by_id(&self, id: &str) -> StoreResult<bool> {
        let (path, _) = self.locate(id)?;
        fs::remove_file(&path).map_err(|err| StoreError::io(&path, err))?;
        self.index.remove(id);
        info!(id = %id, path = %path.display(), "endpoint deleted");
        Ok(true)
    }

    /// Create `<parent>/<name>` and return its path relative to the root.
    pub fn create_folder(&self, parent: &str, name: &str) -> StoreResult<String> {
        validate_segment(name, "Folder name")?;
        let parent = normalize_folder(parent)?;
        let relative = if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}/{name}")
        };

        let dir = self.folder_path(&relative);
        if dir.exists() {
            return Err(StoreError::Conflict("Folder".into()));
        }
        fs::create_dir_all(&dir).map_err(|err| StoreError::io(&dir, err))?;
        info!(path = %dir.display(), "folder created");
        Ok(relative)
    }

    pub fn structure(&self) -> Vec<StructureNode> {
        structure::build(&self.root)
    }

    fn folder_path(&self, folder: &str) -> PathBuf {
        if folder.is_empty() {
            self.root.clone()
        } else {
            self.root.join(folder)
        }
    }

    /// Resolve an id through the index, rescanning the tree when the hint is missing or stale.
    fn locate(&self, id: &str) -> StoreResult<(PathBuf, LocatedEndpoint)> {
        if let Some(path) = self.index.get(id) {
            match self.load(&path) {
                Ok(located) if located.id() == id => return Ok((path, located)),
                _ => debug!(id = %id, path = %path.display(), "stale index entry, rescanning"),
            }
        }

        let scanned = self.scan();
        self.index.replace(
            scanned
                .iter()
                .map(|(path, located)| (located.id().to_string(), path.clone())),
        );
        scanned
            .into_iter()
            .find(|(_, located)| located.id() == id)
            .ok_or_else(|| StoreError::NotFound("Endpoint".into()))
    }

    fn load(&self, path: &Path) -> StoreResult<LocatedEndpoint> {
        let document = load_document(path)?;
        Ok(self.locate_document(path, document))
    }

    fn locate_document(&self, path: &Path, document: Map<String, Value>) -> LocatedEndpoint {
        let folder = path
            .parent()
            .map(|dir| relative_folder(&self.root, dir))
            .unwrap_or_default();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .and_then(|name| document_stem(&name).map(str::to_string))
            .unwrap_or_default();
        LocatedEndpoint {
            document,
            folder,
            filename,
        }
    }

    /// Walk the whole tree. Unreadable entries and malformed files are logged and skipped.
    fn scan(&self) -> Vec<(PathBuf, LocatedEndpoint)> {
        if !self.root.is_dir() {
            return Vec::new();
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let is_document = entry
                .file_name()
                .to_str()
                .and_then(document_stem)
                .is_some();
            if !is_document {
                continue;
            }

            let path = entry.into_path();
            match load_document(&path) {
                Ok(document) => {
                    let located = self.locate_document(&path, document);
                    found.push((path, located));
                }
                Err(StoreError::Validation(reason)) => warn!(%reason, "skipping placeholder"),
                Err(err) => warn!(error = %err, "skipping unreadable endpoint file"),
            }
        }
        found
    }
}

/// `now`, unless the stored value is a later timestamp (clock skew), which is kept as is.
fn next_updated_at(previous: Option<Value>, now: DateTime<Utc>) -> Value {
    let later = previous.filter(|value| {
        value
            .as_str()
            .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
            .is_some_and(|stored| stored.with_timezone(&Utc) > now)
    });
    later.unwrap_or_else(|| Value::String(timestamp(now)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn updated_at(located: &LocatedEndpoint) -> String {
        located.document["updatedAt"].as_str().unwrap().to_string()
    }

    fn store() -> (TempDir, EndpointStore) {
        let temp = TempDir::new().unwrap();
        let store = EndpointStore::open(temp.path().join("endpoints")).unwrap();
        (temp, store)
    }

    #[test]
    fn create_then_find_round_trips() {
        let (_temp, store) = store();
        let created = store
            .create(
                "users",
                "get-users",
                fields(json!({ "name": "Get Users", "method": "GET", "path": "/users" })),
            )
            .unwrap();

        assert_eq!(created.folder, "users");
        assert_eq!(created.filename, "get-users");
        assert_eq!(created.document["createdAt"], created.document["updatedAt"]);
        assert!(store.root().join("users/get-users.json").is_file());

        let found = store.find_by_id(created.id()).unwrap();
        assert_eq!(found, created);
    }

    #[test]
    fn create_applies_defaults_and_ignores_reserved_fields() {
        let (_temp, store) = store();
        let created = store
            .create(
                "",
                "blank",
                fields(json!({ "id": "chosen", "folder": "x", "x-owner": "team-a" })),
            )
            .unwrap();

        let doc = &created.document;
        assert_ne!(created.id(), "chosen");
        assert_eq!(doc["name"], json!("New Endpoint"));
        assert_eq!(doc["method"], json!("GET"));
        assert_eq!(doc["path"], json!("/endpoint"));
        assert_eq!(doc["responses"]["200"]["description"], json!("Success response"));
        assert_eq!(created.folder, "");
        assert_eq!(doc.get("x-owner"), Some(&json!("team-a")));
        assert!(!doc.contains_key("folder"));

        let on_disk: Value =
            serde_json::from_str(&fs::read_to_string(store.root().join("blank.json")).unwrap())
                .unwrap();
        assert!(on_disk.get("folder").is_none());
        assert!(on_disk.get("filename").is_none());
    }

    #[test]
    fn create_requires_filename() {
        let (_temp, store) = store();
        let err = store.create("", "", Map::new()).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn create_conflict_leaves_existing_file_untouched() {
        let (_temp, store) = store();
        store
            .create("", "orders", fields(json!({ "name": "Orders" })))
            .unwrap();
        let path = store.root().join("orders.json");
        let before = fs::read(&path).unwrap();

        let err = store
            .create("/", "orders", fields(json!({ "name": "Other" })))
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn update_preserves_identity_and_advances_updated_at() {
        let (_temp, store) = store();
        let created = store.create("", "item", Map::new()).unwrap();
        let id = created.id().to_string();

        let updated = store
            .update_by_id(
                &id,
                fields(json!({
                    "id": "other",
                    "createdAt": "2000-01-01T00:00:00Z",
                    "description": "first"
                })),
            )
            .unwrap();
        assert_eq!(updated.id(), id);
        assert_eq!(updated.document["createdAt"], created.document["createdAt"]);
        assert!(updated_at(&updated) >= updated_at(&created));

        let second = store
            .update_by_id(&id, fields(json!({ "description": "second" })))
            .unwrap();
        let found = store.find_by_id(&id).unwrap();
        assert_eq!(found.document["description"], json!("second"));
        assert_eq!(found.document["updatedAt"], second.document["updatedAt"]);
        assert!(updated_at(&second) >= updated_at(&updated));
    }

    #[test]
    fn update_accepts_any_json_values() {
        let (_temp, store) = store();
        let created = store.create("", "item", Map::new()).unwrap();

        let updated = store
            .update_by_id(
                created.id(),
                fields(json!({ "description": null, "tags": "users" })),
            )
            .unwrap();
        assert_eq!(updated.document["description"], Value::Null);

        let found = store.find_by_id(created.id()).unwrap();
        assert_eq!(found.document["tags"], json!("users"));
        assert_eq!(found.document["description"], Value::Null);
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let now = Utc::now();
        let future = json!("2999-01-01T00:00:00.000Z");
        assert_eq!(next_updated_at(Some(future.clone()), now), future);
        assert_eq!(
            next_updated_at(Some(json!("2000-01-01T00:00:00.000Z")), now),
            json!(timestamp(now))
        );
        assert_eq!(next_updated_at(Some(json!("yesterday")), now), json!(timestamp(now)));
        assert_eq!(next_updated_at(None, now), json!(timestamp(now)));
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let (_temp, store) = store();
        assert!(matches!(store.find_by_id("nope"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update_by_id("nope", Map::new()),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.delete_by_id("nope"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn delete_then_find_is_not_found() {
        let (_temp, store) = store();
        let created = store.create("a/b", "gone", Map::new()).unwrap();

        assert!(store.delete_by_id(created.id()).unwrap());
        assert!(!store.root().join("a/b/gone.json").exists());
        assert!(store.root().join("a/b").is_dir());
        assert!(matches!(
            store.find_by_id(created.id()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_all_skips_malformed_and_placeholder_files() {
        let (_temp, store) = store();
        store.create("", "good", Map::new()).unwrap();
        store.create("nested/deeper", "also-good", Map::new()).unwrap();
        fs::write(store.root().join("broken.json"), "{ nope").unwrap();
        fs::write(store.root().join("placeholder.json"), r#"{"name":"x"}"#).unwrap();
        fs::write(store.root().join("notes.txt"), "ignored").unwrap();

        let mut all = store.list_all();
        all.sort_by(|a, b| a.filename.cmp(&b.filename));

        let located: Vec<_> = all
            .iter()
            .map(|e| (e.folder.as_str(), e.filename.as_str()))
            .collect();
        assert_eq!(located, vec![("nested/deeper", "also-good"), ("", "good")]);
    }

    #[test]
    fn lookups_survive_out_of_band_moves() {
        let (_temp, store) = store();
        let created = store.create("", "moved", Map::new()).unwrap();
        fs::create_dir_all(store.root().join("archive")).unwrap();
        fs::rename(
            store.root().join("moved.json"),
            store.root().join("archive/renamed.json"),
        )
        .unwrap();

        let found = store.find_by_id(created.id()).unwrap();
        assert_eq!(found.folder, "archive");
        assert_eq!(found.filename, "renamed");
    }

    #[test]
    fn documents_written_by_hand_are_found() {
        let (_temp, store) = store();
        fs::write(
            store.root().join("manual.json"),
            r#"{"id":"hand-1","name":"Manual","method":"POST","path":"/m"}"#,
        )
        .unwrap();

        let found = store.find_by_id("hand-1").unwrap();
        assert_eq!(found.document["method"], json!("POST"));
        assert_eq!(found.filename, "manual");
        assert!(!found.document.contains_key("createdAt"));
        assert!(!found.document.contains_key("responses"));
    }

    #[test]
    fn loosely_typed_documents_are_listed_found_and_editable() {
        let (_temp, store) = store();
        let stored = [
            ("tags", json!({ "id": "loose-1", "tags": "users" })),
            ("blank", json!({ "id": "loose-2", "description": null })),
            ("dated", json!({ "id": "loose-3", "createdAt": "2024-01-01" })),
            ("params", json!({ "id": "loose-4", "parameters": { "query": [{ "type": "string" }] } })),
        ];
        for (name, value) in &stored {
            fs::write(store.root().join(format!("{name}.json")), value.to_string()).unwrap();
        }

        assert_eq!(store.list_all().len(), stored.len());
        assert_eq!(store.structure().len(), stored.len());
        for (name, value) in &stored {
            let id = value["id"].as_str().unwrap();
            let found = store.find_by_id(id).unwrap();
            assert_eq!(found.filename, *name);
            assert_eq!(found.document, fields(value.clone()));
        }

        let updated = store
            .update_by_id("loose-3", fields(json!({ "description": null })))
            .unwrap();
        assert_eq!(updated.document["createdAt"], json!("2024-01-01"));
        assert!(store.delete_by_id("loose-1").unwrap());
    }

    #[test]
    fn stored_location_keys_do_not_duplicate_derived_ones() {
        let (_temp, store) = store();
        fs::create_dir_all(store.root().join("users")).unwrap();
        fs::write(
            store.root().join("users/x.json"),
            r#"{"id":"dup-1","folder":"old","filename":"stale"}"#,
        )
        .unwrap();

        let found = store.find_by_id("dup-1").unwrap();
        let text = serde_json::to_string(&found).unwrap();
        assert_eq!(text.matches("\"folder\"").count(), 1);
        assert_eq!(text.matches("\"filename\"").count(), 1);

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["folder"], json!("users"));
        assert_eq!(value["filename"], json!("x"));

        store.update_by_id("dup-1", Map::new()).unwrap();
        let on_disk: Value =
            serde_json::from_str(&fs::read_to_string(store.root().join("users/x.json")).unwrap())
                .unwrap();
        assert!(on_disk.get("folder").is_none());
    }

    #[test]
    fn create_folder_rejects_existing() {
        let (_temp, store) = store();
        assert_eq!(store.create_folder("", "users").unwrap(), "users");
        assert_eq!(store.create_folder("users", "admin").unwrap(), "users/admin");
        assert!(store.root().join("users/admin").is_dir());

        assert!(matches!(
            store.create_folder("", "users"),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.create_folder("", ""),
            Err(StoreError::Validation(_))
        ));
    }
}
