use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

use super::fs::{document_stem, load_document};

/// A node of the folder/endpoint tree shown in the sidebar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StructureNode {
    Folder {
        name: String,
        path: String,
        children: Vec<StructureNode>,
    },
    Endpoint {
        name: String,
        path: String,
        data: Map<String, Value>,
    },
}

impl StructureNode {
    pub fn name(&self) -> &str {
        match self {
            Self::Folder { name, .. } | Self::Endpoint { name, .. } => name,
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Folder { .. } => 0,
            Self::Endpoint { .. } => 1,
        }
    }
}

/// Build the tree below `root`. A missing root yields an empty tree.
pub fn build(root: &Path) -> Vec<StructureNode> {
    build_level(root, "")
}

fn build_level(dir: &Path, relative: &str) -> Vec<StructureNode> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %dir.display(), error = %err, "failed to read directory");
            }
            return Vec::new();
        }
    };

    let mut nodes = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "failed to read directory entry");
                continue;
            }
        };
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let item_path = if relative.is_empty() {
            file_name.clone()
        } else {
            format!("{relative}/{file_name}")
        };
        let path = entry.path();

        if path.is_dir() {
            let children = build_level(&path, &item_path);
            nodes.push(StructureNode::Folder {
                name: file_name,
                path: item_path,
                children,
            });
        } else if let Some(stem) = document_stem(&file_name) {
            match load_document(&path) {
                Ok(data) => nodes.push(StructureNode::Endpoint {
                    name: stem.to_string(),
                    path: item_path,
                    data,
                }),
                Err(err) => warn!(error = %err, "leaving endpoint file out of structure"),
            }
        }
    }

    nodes.sort_by(compare_nodes);
    nodes
}

/// Folders before endpoints, then by name ignoring case; on a case-only tie lowercase comes first.
fn compare_nodes(a: &StructureNode, b: &StructureNode) -> Ordering {
    a.rank()
        .cmp(&b.rank())
        .then_with(|| compare_names(a.name(), b.name()))
}

/// Code-point order after lowercasing. Accents are not folded, so `éclair` sorts after `fetch`.
fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_doc(path: &Path, id: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            path,
            json!({ "id": id, "name": id, "method": "GET" }).to_string(),
        )
        .unwrap();
    }

    fn names(nodes: &[StructureNode]) -> Vec<&str> {
        nodes.iter().map(StructureNode::name).collect()
    }

    fn assert_sorted(nodes: &[StructureNode]) {
        for pair in nodes.windows(2) {
            assert_ne!(compare_nodes(&pair[0], &pair[1]), Ordering::Greater);
        }
        for node in nodes {
            if let StructureNode::Folder { children, .. } = node {
                assert_sorted(children);
            }
        }
    }

    #[test]
    fn missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(build(&temp.path().join("absent")).is_empty());
    }

    #[test]
    fn folders_precede_endpoints_at_every_level() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_doc(&root.join("zeta.json"), "z");
        write_doc(&root.join("Alpha.json"), "a");
        write_doc(&root.join("users/list.json"), "l");
        write_doc(&root.join("users/admin/create.json"), "c");
        write_doc(&root.join("users/Beta.json"), "b");
        fs::create_dir_all(root.join("orders")).unwrap();
        fs::write(root.join("README.md"), "skip").unwrap();
        fs::write(root.join("broken.json"), "{").unwrap();

        let tree = build(root);
        assert_eq!(names(&tree), vec!["orders", "users", "Alpha", "zeta"]);
        assert_sorted(&tree);

        let StructureNode::Folder { children, path, .. } = &tree[1] else {
            panic!("users should be a folder");
        };
        assert_eq!(path, "users");
        assert_eq!(names(children), vec!["admin", "Beta", "list"]);

        let StructureNode::Folder { children: admin, .. } = &children[0] else {
            panic!("admin should be a folder");
        };
        let StructureNode::Endpoint { path, data, .. } = &admin[0] else {
            panic!("create should be an endpoint");
        };
        assert_eq!(path, "users/admin/create.json");
        assert_eq!(data["id"], json!("c"));
    }

    #[test]
    fn loosely_typed_documents_are_listed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("tagged.json"), r#"{"id":"loose-1","tags":"users"}"#).unwrap();
        fs::write(root.join("blank.json"), r#"{"id":"loose-2","description":null}"#).unwrap();
        fs::write(
            root.join("params.json"),
            r#"{"id":"loose-4","parameters":{"query":[{"type":"string"}]}}"#,
        )
        .unwrap();

        let tree = build(root);
        assert_eq!(names(&tree), vec!["blank", "params", "tagged"]);
        let StructureNode::Endpoint { data, .. } = &tree[2] else {
            panic!("tagged should be an endpoint");
        };
        assert_eq!(data["tags"], json!("users"));
        assert!(!data.contains_key("name"));
    }

    #[test]
    fn names_compare_case_insensitively() {
        assert_eq!(compare_names("apple", "Banana"), Ordering::Less);
        assert_eq!(compare_names("a", "A"), Ordering::Less);
        assert_eq!(compare_names("b", "b"), Ordering::Equal);
        assert_eq!(compare_names("éclair", "fetch"), Ordering::Greater);
        assert_eq!(compare_names("Éclair", "éclair"), Ordering::Greater);
    }

    #[test]
    fn nodes_serialize_with_type_tag() {
        let node = StructureNode::Folder {
            name: "users".into(),
            path: "users".into(),
            children: vec![],
        };
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({ "type": "folder", "name": "users", "path": "users", "children": [] })
        );
    }
}
