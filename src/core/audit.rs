//! Append-only JSONL audit log (A3).
//!
//! Mirrors the teacher's `BrokerEvent` shape (schema version, timestamp,
//! actor, correlation id) but scoped down to what this engine actually
//! emits: one line per command invocation and per per-file conflict
//! resolution, appended to `<state_dir>/engine.events.jsonl`.

use crate::core::error::Result;
use crate::core::time::now_iso;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// A single audit-log event.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub schema_version: u32,
    pub ts: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(event: &str) -> AuditEvent {
        AuditEvent {
            schema_version: 1,
            ts: now_iso(),
            event: event.to_string(),
            migration_id: None,
            path: None,
            detail: None,
        }
    }

    pub fn with_migration(mut self, id: &str) -> AuditEvent {
        self.migration_id = Some(id.to_string());
        self
    }

    pub fn with_path(mut self, path: &str) -> AuditEvent {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_detail(mut self, detail: &str) -> AuditEvent {
        self.detail = Some(detail.to_string());
        self
    }
}

/// Append-only event sink backed by a JSONL file.
pub struct AuditLog {
    path: std::path::PathBuf,
}

impl AuditLog {
    pub fn new(state_dir: &Path) -> AuditLog {
        AuditLog {
            path: state_dir.join("engine.events.jsonl"),
        }
    }

    /// Appends `event` as a single JSON line. Best-effort: a caller that
    /// cannot create the state directory should surface that separately,
    /// since the audit log is observability, not correctness machinery.
    pub fn append(&self, event: &AuditEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_creates_file_and_dir() {
        let dir = tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let log = AuditLog::new(&state_dir);
        log.append(&AuditEvent::new("update_started")).unwrap();
        assert!(state_dir.join("engine.events.jsonl").exists());
    }

    #[test]
    fn test_append_is_additive() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path());
        log.append(&AuditEvent::new("a")).unwrap();
        log.append(&AuditEvent::new("b")).unwrap();
        let content = std::fs::read_to_string(dir.path().join("engine.events.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_event_builder_sets_fields() {
        let event = AuditEvent::new("conflict_resolved")
            .with_migration("20260101T000000Z")
            .with_path("README.md")
            .with_detail("keep");
        assert_eq!(event.migration_id.as_deref(), Some("20260101T000000Z"));
        assert_eq!(event.path.as_deref(), Some("README.md"));
    }
}
