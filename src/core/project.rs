//! Project-side state files: `applied-migrations.json` and
//! `project-config.json`. Both are human-readable JSON,
//! atomically rewritten via temp-file + rename, the same pattern
//! `core::record` uses for migration directories.

use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// `project-config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectConfig {
    pub version: u32,
    #[serde(default)]
    #[serde(rename = "enabledFeatures")]
    pub enabled_features: Vec<String>,
    #[serde(default)]
    #[serde(rename = "templateVersion")]
    pub template_version: Option<String>,
}

/// `applied-migrations.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectState {
    pub version: u32,
    pub template: String,
    #[serde(rename = "appliedMigrations")]
    pub applied_migrations: Vec<String>,
    #[serde(default)]
    #[serde(rename = "enabledFeatures")]
    pub enabled_features: Option<Vec<String>>,
    #[serde(default)]
    #[serde(rename = "featureFiles")]
    pub feature_files: BTreeMap<String, Vec<String>>,
}

impl ProjectState {
    pub fn new(template: &str) -> ProjectState {
        ProjectState {
            version: 1,
            template: template.to_string(),
            applied_migrations: Vec::new(),
            enabled_features: None,
            feature_files: BTreeMap::new(),
        }
    }

    pub fn last_applied(&self) -> Option<&str> {
        self.applied_migrations.last().map(|s| s.as_str())
    }

    pub fn has_applied(&self, id: &str) -> bool {
        self.applied_migrations.iter().any(|m| m == id)
    }
}

fn read_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Atomically writes `value` as pretty JSON to `path` (temp-file + rename).
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn load_project_state(project_root: &Path) -> Result<ProjectState> {
    read_json(&project_root.join("applied-migrations.json"))
}

pub fn save_project_state(project_root: &Path, state: &ProjectState) -> Result<()> {
    write_json_atomic(&project_root.join("applied-migrations.json"), state)
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    read_json(&project_root.join("project-config.json"))
}

pub fn save_project_config(project_root: &Path, config: &ProjectConfig) -> Result<()> {
    write_json_atomic(&project_root.join("project-config.json"), config)
}
