//! Migration record: the on-disk shape of a single migration (C4).
//!
//! Layout (spec §6.1):
//!
//! ```text
//! migrations/
//!   <id>/
//!     migrate.json
//!     __files/
//!       <path>.template
//!       <path>.diff
//!       <path>.bin
//! ```
//!
//! Writing is atomic: a migration is staged into a sibling temp directory
//! and moved into place with a single `rename`, mirroring the teacher's
//! `store_applied_migrations` stage-then-rename pattern.

use crate::core::blob::Blob;
use crate::core::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A single operation against the template's logical state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    New {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        feature: Option<String>,
    },
    Modify {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        feature: Option<String>,
    },
    Rename {
        #[serde(rename = "oldPath")]
        old_path: String,
        #[serde(rename = "newPath")]
        new_path: String,
        #[serde(rename = "hasDiff")]
        has_diff: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        feature: Option<String>,
    },
    Delete { path: String },
}

impl Operation {
    /// The path this operation's feature tag (if any) is evaluated against:
    /// the new-side path for everything but delete/rename-old lookups.
    pub fn primary_path(&self) -> &str {
        match self {
            Operation::New { path, .. } => path,
            Operation::Modify { path, .. } => path,
            Operation::Rename { new_path, .. } => new_path,
            Operation::Delete { path } => path,
        }
    }

    pub fn feature(&self) -> Option<&str> {
        match self {
            Operation::New { feature, .. } => feature.as_deref(),
            Operation::Modify { feature, .. } => feature.as_deref(),
            Operation::Rename { feature, .. } => feature.as_deref(),
            Operation::Delete { .. } => None,
        }
    }
}

/// A fully loaded migration: its identifier, ordered operations, and the
/// file-body store resolving body references.
#[derive(Debug, Clone)]
pub struct Migration {
    pub id: String,
    pub label: Option<String>,
    pub ops: Vec<Operation>,
    pub store: BlobStore,
}

/// Resolves body references (`.template`/`.diff`/`.bin`) for a migration's operations.
#[derive(Debug, Clone, Default)]
pub struct BlobStore {
    /// Keyed by `<path>.template` / `<path>.diff` / `<path>.bin` as it
    /// appears under `__files/`.
    files: BTreeMap<String, Vec<u8>>,
}

impl BlobStore {
    pub fn new() -> BlobStore {
        BlobStore::default()
    }

    pub fn insert(&mut self, rel_name: String, bytes: Vec<u8>) {
        self.files.insert(rel_name, bytes);
    }

    /// New-file body, classified as text or binary.
    pub fn template_body(&self, path: &str) -> Result<Blob> {
        let key = format!("{}.template", path);
        let bytes = self
            .files
            .get(&key)
            .ok_or_else(|| EngineError::NotFound(format!("missing body {}", key)))?;
        Ok(Blob::from_bytes(bytes.clone()))
    }

    /// Unified-diff body for a text modify/rename.
    pub fn diff_body(&self, path: &str) -> Result<String> {
        let key = format!("{}.diff", path);
        let bytes = self
            .files
            .get(&key)
            .ok_or_else(|| EngineError::NotFound(format!("missing body {}", key)))?;
        String::from_utf8(bytes.clone())
            .map_err(|e| EngineError::Validation(format!("non-utf8 diff body {}: {}", key, e)))
    }

    /// Full-replacement binary body for a binary modify.
    pub fn binary_body(&self, path: &str) -> Result<Blob> {
        let key = format!("{}.bin", path);
        let bytes = self
            .files
            .get(&key)
            .ok_or_else(|| EngineError::NotFound(format!("missing body {}", key)))?;
        Ok(Blob {
            kind: crate::core::blob::BlobKind::Binary,
            bytes: bytes.clone(),
        })
    }
}

/// Serialized form of `migrate.json`.
#[derive(Debug, Serialize, Deserialize)]
struct MigrateDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    operations: Vec<Operation>,
}

/// Reads a migration directory (`migrations/<id>/`) into a [`Migration`].
pub fn load_migration(id: &str, dir: &Path) -> Result<Migration> {
    let doc_path = dir.join("migrate.json");
    let raw = fs::read_to_string(&doc_path)?;
    let doc: MigrateDocument = serde_json::from_str(&raw)?;

    let mut store = BlobStore::new();
    let files_dir = dir.join("__files");
    if files_dir.exists() {
        load_files_recursive(&files_dir, &files_dir, &mut store)?;
    }

    Ok(Migration {
        id: id.to_string(),
        label: doc.label,
        ops: doc.operations,
        store,
    })
}

fn load_files_recursive(root: &Path, dir: &Path, store: &mut BlobStore) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            load_files_recursive(root, &path, store)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let bytes = fs::read(&path)?;
            store.insert(rel, bytes);
        }
    }
    Ok(())
}

/// A migration staged for writing: operations plus the raw body bytes each
/// body reference should resolve to, keyed the same way as [`BlobStore`].
pub struct MigrationDraft {
    pub label: Option<String>,
    pub ops: Vec<Operation>,
    pub files: BTreeMap<String, Vec<u8>>,
}

/// Atomically writes a migration draft to `migrations_dir/<id>/`: stage into
/// a sibling temp directory, then rename into place so partial writes are
/// never observable (spec §4.4).
pub fn write_migration(migrations_dir: &Path, id: &str, draft: &MigrationDraft) -> Result<()> {
    fs::create_dir_all(migrations_dir)?;
    let tmp_dir = migrations_dir.join(format!(".tmp-{}", id));
    if tmp_dir.exists() {
        fs::remove_dir_all(&tmp_dir)?;
    }
    fs::create_dir_all(tmp_dir.join("__files"))?;

    let doc = MigrateDocument {
        label: draft.label.clone(),
        operations: draft.ops.clone(),
    };
    let json = serde_json::to_string_pretty(&doc)?;
    fs::write(tmp_dir.join("migrate.json"), json)?;

    for (rel_name, bytes) in &draft.files {
        let target = tmp_dir.join("__files").join(rel_name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, bytes)?;
    }

    let final_dir = migrations_dir.join(id);
    fs::rename(&tmp_dir, &final_dir)?;
    Ok(())
}

/// Lists migration identifiers present under `migrations_dir` (unsorted;
/// callers sort via `core::chain`).
pub fn list_migration_ids(migrations_dir: &Path) -> Result<Vec<String>> {
    if !migrations_dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(migrations_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(".tmp-") {
                ids.push(name);
            }
        }
    }
    Ok(ids)
}

pub fn migration_dir(migrations_dir: &Path, id: &str) -> PathBuf {
    migrations_dir.join(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_draft() -> MigrationDraft {
        let mut files = BTreeMap::new();
        files.insert("README.md.template".to_string(), b"hello\n".to_vec());
        MigrationDraft {
            label: Some("initial".to_string()),
            ops: vec![Operation::New {
                path: "README.md".to_string(),
                feature: None,
            }],
            files,
        }
    }

    #[test]
    fn test_write_then_load_roundtrip() {
        let dir = tempdir().unwrap();
        let migrations_dir = dir.path().join("migrations");
        write_migration(&migrations_dir, "20260101T000000Z", &sample_draft()).unwrap();

        let loaded =
            load_migration("20260101T000000Z", &migration_dir(&migrations_dir, "20260101T000000Z"))
                .unwrap();
        assert_eq!(loaded.id, "20260101T000000Z");
        assert_eq!(loaded.ops.len(), 1);
        let body = loaded.store.template_body("README.md").unwrap();
        assert_eq!(body.as_text(), "hello\n");
    }

    #[test]
    fn test_write_is_atomic_no_temp_dir_left_behind() {
        let dir = tempdir().unwrap();
        let migrations_dir = dir.path().join("migrations");
        write_migration(&migrations_dir, "20260101T000000Z", &sample_draft()).unwrap();
        let ids = list_migration_ids(&migrations_dir).unwrap();
        assert_eq!(ids, vec!["20260101T000000Z".to_string()]);
    }

    #[test]
    fn test_list_migration_ids_empty_dir() {
        let dir = tempdir().unwrap();
        let ids = list_migration_ids(&dir.path().join("migrations")).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_operation_primary_path() {
        let op = Operation::Rename {
            old_path: "old.txt".to_string(),
            new_path: "new.txt".to_string(),
            has_diff: false,
            feature: Some("auth".to_string()),
        };
        assert_eq!(op.primary_path(), "new.txt");
        assert_eq!(op.feature(), Some("auth"));
    }
}
