//! Loading a `migrations/` directory into an identifier-sorted chain.
//!
//! Ordering is the whole correctness story for C5/C7: migration identifiers
//! are lex-sortable (`core::time`), so sorting the id strings directly
//! yields chronological order with no separate sequence counter.

use crate::core::error::Result;
use crate::core::record::{list_migration_ids, load_migration, migration_dir, Migration};
use std::path::Path;

/// The full, identifier-ordered migration chain for a template root.
pub struct Chain {
    pub migrations: Vec<Migration>,
}

impl Chain {
    /// Loads every migration under `root/migrations/`, sorted by identifier.
    pub fn load(root: &Path) -> Result<Chain> {
        let migrations_dir = root.join("migrations");
        let mut ids = list_migration_ids(&migrations_dir)?;
        ids.sort();
        let mut migrations = Vec::with_capacity(ids.len());
        for id in &ids {
            migrations.push(load_migration(id, &migration_dir(&migrations_dir, id))?);
        }
        Ok(Chain { migrations })
    }

    pub fn ids(&self) -> Vec<String> {
        self.migrations.iter().map(|m| m.id.clone()).collect()
    }

    /// Returns the migrations strictly after `after_id` (or all, if `None`),
    /// in chain order.
    pub fn after(&self, after_id: Option<&str>) -> Vec<&Migration> {
        match after_id {
            None => self.migrations.iter().collect(),
            Some(marker) => self
                .migrations
                .iter()
                .filter(|m| m.id.as_str() > marker)
                .collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.migrations.iter().any(|m| m.id == id)
    }
}
