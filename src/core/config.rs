//! Engine-wide tunable configuration.
//!
//! The spec fixes several constants (fuzzy-match drift, rename similarity
//! threshold, diff context lines, assisted-merge timeout) for determinism.
//! `EngineConfig` exposes them as overridable settings loaded from an
//! optional `.migrate-engine.toml` in the project or template root, falling
//! back to the spec's documented defaults — the same "optional file,
//! `Default` fallback" pattern the teacher uses for its own proof-gate
//! configuration.

use crate::core::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunable engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Line-drift window (±N) the diff applier retries context matching within
    /// before declaring a conflict. Spec §4.3: `N = 3`.
    pub fuzzy_drift_lines: usize,
    /// Minimum normalized similarity (0.0–1.0) for two candidate paths to be
    /// paired into a rename instead of a delete+new. Spec §4.6 step 6: `0.5`.
    pub rename_similarity_threshold: f64,
    /// Lines of context included on each side of a unified-diff hunk. Spec §4.3: `3`.
    pub diff_context_lines: usize,
    /// Bound (in seconds) on the assisted-merge collaborator's subprocess. Spec §5: 5 minutes.
    pub assisted_merge_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            fuzzy_drift_lines: 3,
            rename_similarity_threshold: 0.5,
            diff_context_lines: 3,
            assisted_merge_timeout_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `path` if it exists, else returns the default.
    pub fn load(path: &Path) -> Result<EngineConfig> {
        if !path.exists() {
            return Ok(EngineConfig::default());
        }
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| EngineError::Toml(e.to_string()))
    }

    /// Loads `.migrate-engine.toml` from `root` if present, else defaults.
    pub fn load_from_root(root: &Path) -> Result<EngineConfig> {
        Self::load(&root.join(".migrate-engine.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_matches_spec_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.fuzzy_drift_lines, 3);
        assert_eq!(cfg.rename_similarity_threshold, 0.5);
        assert_eq!(cfg.diff_context_lines, 3);
        assert_eq!(cfg.assisted_merge_timeout_secs, 300);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempdir().unwrap();
        let cfg = EngineConfig::load_from_root(dir.path()).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_load_overrides_threshold() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(".migrate-engine.toml"),
            "rename_similarity_threshold = 0.75\n",
        )
        .unwrap();
        let cfg = EngineConfig::load_from_root(dir.path()).unwrap();
        assert_eq!(cfg.rename_similarity_threshold, 0.75);
        assert_eq!(cfg.fuzzy_drift_lines, 3);
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".migrate-engine.toml"), "not = [valid").unwrap();
        assert!(EngineConfig::load_from_root(dir.path()).is_err());
    }
}
