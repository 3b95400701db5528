//! Pure, deterministic state reconstruction from a migration chain (C5).
//!
//! `reconstruct` is the sole oracle of "what the template thinks this file
//! should be at migration N" (spec §4.5). It never touches the filesystem;
//! it only folds operations already loaded by `core::chain`.

use crate::core::blob::Blob;
use crate::core::chain::Chain;
use crate::core::diff::apply_strict as diff_apply;
use crate::core::error::{EngineError, Result};
use crate::core::record::Operation;
use std::collections::BTreeMap;

/// Template state: path → (content, owning feature tag if any). A
/// `BTreeMap` is used rather than a `HashMap` so iteration order is
/// deterministic, which matters when re-deriving `featureFiles` (spec §4.7).
pub type TemplateState = BTreeMap<String, (Blob, Option<String>)>;

/// Folds `chain` up to and including `up_to_id` (or the whole chain, if
/// `None`) into a `TemplateState`.
pub fn reconstruct(chain: &Chain, up_to_id: Option<&str>) -> Result<TemplateState> {
    let mut state: TemplateState = BTreeMap::new();
    for migration in &chain.migrations {
        if let Some(marker) = up_to_id {
            if migration.id.as_str() > marker {
                break;
            }
        }
        for op in &migration.ops {
            apply_operation(&mut state, migration.id.as_str(), op, migration)?;
        }
    }
    Ok(state)
}

fn apply_operation(
    state: &mut TemplateState,
    migration_id: &str,
    op: &Operation,
    migration: &crate::core::record::Migration,
) -> Result<()> {
    match op {
        Operation::New { path, feature } => {
            if state.contains_key(path) {
                return Err(EngineError::ChainCorrupt {
                    id: migration_id.to_string(),
                    path: path.clone(),
                });
            }
            let body = migration.store.template_body(path)?;
            state.insert(path.clone(), (body, feature.clone()));
        }
        Operation::Modify { path, feature } => {
            let (existing, existing_feature) =
                state.get(path).cloned().ok_or_else(|| EngineError::ChainCorrupt {
                    id: migration_id.to_string(),
                    path: path.clone(),
                })?;
            let next_feature = feature.clone().or(existing_feature);
            let updated = if existing.is_text() {
                let diff_text = migration.store.diff_body(path)?;
                let new_text = diff_apply(existing.as_text(), &diff_text).map_err(|_| {
                    EngineError::ChainCorrupt {
                        id: migration_id.to_string(),
                        path: path.clone(),
                    }
                })?;
                Blob::from_bytes(new_text.into_bytes())
            } else {
                migration.store.binary_body(path)?
            };
            state.insert(path.clone(), (updated, next_feature));
        }
        Operation::Rename {
            old_path,
            new_path,
            has_diff,
            feature,
        } => {
            let (body, existing_feature) =
                state
                    .remove(old_path)
                    .ok_or_else(|| EngineError::ChainCorrupt {
                        id: migration_id.to_string(),
                        path: old_path.clone(),
                    })?;
            let next_feature = feature.clone().or(existing_feature);
            let body = if *has_diff {
                if body.is_text() {
                    let diff_text = migration.store.diff_body(new_path)?;
                    let new_text = diff_apply(body.as_text(), &diff_text).map_err(|_| {
                        EngineError::ChainCorrupt {
                            id: migration_id.to_string(),
                            path: new_path.clone(),
                        }
                    })?;
                    Blob::from_bytes(new_text.into_bytes())
                } else {
                    migration.store.binary_body(new_path)?
                }
            } else {
                body
            };
            state.insert(new_path.clone(), (body, next_feature));
        }
        Operation::Delete { path } => {
            if state.remove(path).is_none() {
                return Err(EngineError::ChainCorrupt {
                    id: migration_id.to_string(),
                    path: path.clone(),
                });
            }
        }
    }
    Ok(())
}
