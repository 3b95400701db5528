//! Diff-based migration generation (C6).
//!
//! Computes the delta between reconstructed template state and a scanned
//! working tree, including rename detection via greedy highest-similarity
//! pairing, and writes the result as a new migration via `core::record`.

use crate::core::blob::{Blob, BlobKind};
use crate::core::chain::Chain;
use crate::core::config::EngineConfig;
use crate::core::diff::produce as diff_produce;
use crate::core::error::{EngineError, Result};
use crate::core::feature::FeatureManifest;
use crate::core::ignore::IgnoreSet;
use crate::core::record::{write_migration, MigrationDraft, Operation};
use crate::core::scan::scan_tree;
use crate::core::state::{reconstruct, TemplateState};
use crate::core::time::next_migration_id;
use std::collections::BTreeMap;
use std::path::Path;

/// Outcome of a generation attempt.
pub enum GenerateOutcome {
    /// A new migration was written with this identifier.
    Written(String),
    /// The working tree matched the reconstructed baseline exactly.
    NoChanges,
}

/// Generates a new migration from `root`'s current working tree against
/// `chain`'s reconstructed baseline, tagging feature-owned paths per
/// `manifest` (spec §4.6).
pub fn generate(
    root: &Path,
    chain: &Chain,
    label: Option<&str>,
    manifest: Option<&FeatureManifest>,
    config: &EngineConfig,
) -> Result<GenerateOutcome> {
    let baseline = reconstruct(chain, None)?;

    let mut ignores = IgnoreSet::new();
    ignores.push_literal("migrations/");
    ignores.push_literal(".git/");
    ignores.push_literal("node_modules/");
    ignores.push_literal(".gitignore");
    ignores.push_literal(".migrateignore");
    ignores.push_literal("applied-migrations.json");
    ignores.push_literal("project-config.json");
    // engine.events.jsonl (A3 audit log), features.json (C8 manifest), and
    // .migrate-engine.toml (A2 config) are also written into the template
    // root by the engine itself and would be self-captured by the next
    // generate the same way .gitignore was; they're left untagged here
    // because, unlike .gitignore, a maintainer may legitimately want them
    // versioned as template content.
    let gitignore = IgnoreSet::load(&root.join(".gitignore"))?;
    let migrateignore = IgnoreSet::load(&root.join(".migrateignore"))?;
    ignores.extend(gitignore);
    ignores.extend(migrateignore);

    let current = scan_tree(root, &ignores)?;

    let mut ops = Vec::new();
    let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    let baseline_paths: Vec<&String> = baseline.keys().collect();
    let current_paths: Vec<&String> = current.keys().collect();

    let mut handled_old: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut handled_new: std::collections::HashSet<String> = std::collections::HashSet::new();

    // Step 4: paths present in both.
    for path in &baseline_paths {
        if let Some(new_blob) = current.get(path.as_str()) {
            let (old_blob, _feature) = &baseline[path.as_str()];
            if old_blob.bytes != new_blob.bytes {
                emit_modify(&mut ops, &mut files, path, old_blob, new_blob, manifest, config)?;
            }
            handled_old.insert((*path).clone());
            handled_new.insert((*path).clone());
        }
    }

    // Step 5: new paths.
    let added: Vec<&String> = current_paths
        .iter()
        .filter(|p| !handled_new.contains(p.as_str()))
        .copied()
        .collect();

    // Step 6: removed paths, with rename detection against `added`.
    let removed: Vec<&String> = baseline_paths
        .iter()
        .filter(|p| !handled_old.contains(p.as_str()))
        .copied()
        .collect();

    let renames = detect_renames(&removed, &added, &baseline, &current, config.rename_similarity_threshold);

    let mut renamed_old: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut renamed_new: std::collections::HashSet<String> = std::collections::HashSet::new();
    for (old_path, new_path, similarity) in &renames {
        let (old_blob, old_feature) = &baseline[old_path.as_str()];
        let new_blob = &current[new_path.as_str()];
        let has_diff = old_blob.bytes != new_blob.bytes;
        if has_diff && old_blob.is_text() && new_blob.is_text() {
            let diff = diff_produce(
                old_blob.as_text(),
                new_blob.as_text(),
                old_path,
                new_path,
                config.diff_context_lines,
            );
            files.insert(format!("{}.diff", new_path), diff.into_bytes());
        } else if has_diff {
            files.insert(format!("{}.bin", new_path), new_blob.bytes.clone());
        }
        let feature = resolve_feature(new_path, old_feature.clone(), manifest)?;
        ops.push(Operation::Rename {
            old_path: old_path.clone(),
            new_path: new_path.clone(),
            has_diff,
            feature,
        });
        renamed_old.insert(old_path.clone());
        renamed_new.insert(new_path.clone());
        let _ = similarity;
    }

    for path in &added {
        if renamed_new.contains(path.as_str()) {
            continue;
        }
        let blob = &current[path.as_str()];
        let feature = resolve_feature(path, None, manifest)?;
        files.insert(format!("{}.template", path), blob.bytes.clone());
        ops.push(Operation::New {
            path: (*path).clone(),
            feature,
        });
    }

    for path in &removed {
        if renamed_old.contains(path.as_str()) {
            continue;
        }
        ops.push(Operation::Delete {
            path: (*path).clone(),
        });
    }

    if ops.is_empty() {
        return Ok(GenerateOutcome::NoChanges);
    }

    let existing_ids = chain.ids();
    let id = next_migration_id(&existing_ids);
    let draft = MigrationDraft {
        label: label.map(|s| s.to_string()),
        ops,
        files,
    };
    write_migration(&root.join("migrations"), &id, &draft)?;
    Ok(GenerateOutcome::Written(id))
}

fn emit_modify(
    ops: &mut Vec<Operation>,
    files: &mut BTreeMap<String, Vec<u8>>,
    path: &str,
    old_blob: &Blob,
    new_blob: &Blob,
    manifest: Option<&FeatureManifest>,
    config: &EngineConfig,
) -> Result<()> {
    if old_blob.is_text() && new_blob.is_text() {
        let diff = diff_produce(old_blob.as_text(), new_blob.as_text(), path, path, config.diff_context_lines);
        files.insert(format!("{}.diff", path), diff.into_bytes());
    } else {
        files.insert(format!("{}.bin", path), new_blob.bytes.clone());
    }
    let feature = resolve_feature(path, None, manifest)?;
    ops.push(Operation::Modify {
        path: path.to_string(),
        feature,
    });
    Ok(())
}

/// Resolves the feature tag for `path`: an explicit carried-over tag wins;
/// otherwise a path is tagged iff it matches exactly one feature's
/// `exclusivePatterns`, and it is an error to match more than one.
fn resolve_feature(
    path: &str,
    carried: Option<String>,
    manifest: Option<&FeatureManifest>,
) -> Result<Option<String>> {
    if carried.is_some() {
        return Ok(carried);
    }
    let Some(manifest) = manifest else {
        return Ok(None);
    };
    let matches = manifest.features_matching(path);
    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches[0].clone())),
        _ => Err(EngineError::AmbiguousFeature {
            path: path.to_string(),
            features: matches,
        }),
    }
}

/// Normalized similarity between two blobs: exact hash match for binary
/// (1.0 or 0.0), normalized Levenshtein distance for text.
fn similarity(a: &Blob, b: &Blob) -> f64 {
    match (a.kind, b.kind) {
        (BlobKind::Binary, BlobKind::Binary) => {
            if a.hash() == b.hash() {
                1.0
            } else {
                0.0
            }
        }
        (BlobKind::Text, BlobKind::Text) => normalized_text_similarity(a.as_text(), b.as_text()),
        _ => 0.0,
    }
}

fn normalized_text_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(a, b);
    1.0 - (distance as f64 / max_len as f64)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];
    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m]
}

/// Greedily pairs candidate deletes with candidate news by descending
/// similarity, each participating in at most one pairing, above `threshold`.
fn detect_renames(
    removed: &[&String],
    added: &[&String],
    baseline: &TemplateState,
    current: &BTreeMap<String, Blob>,
    threshold: f64,
) -> Vec<(String, String, f64)> {
    let mut candidates: Vec<(String, String, f64)> = Vec::new();
    for d in removed {
        let (old_blob, _) = &baseline[d.as_str()];
        for n in added {
            let new_blob = &current[n.as_str()];
            if old_blob.kind != new_blob.kind {
                continue;
            }
            let sim = similarity(old_blob, new_blob);
            if sim >= threshold {
                candidates.push(((*d).clone(), (*n).clone(), sim));
            }
        }
    }
    candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut used_old: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut used_new: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut result = Vec::new();
    for (old_path, new_path, sim) in candidates {
        if used_old.contains(&old_path) || used_new.contains(&new_path) {
            continue;
        }
        used_old.insert(old_path.clone());
        used_new.insert(new_path.clone());
        result.push((old_path, new_path, sim));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_generate_no_changes_on_empty_tree() {
        let dir = tempdir().unwrap();
        let chain = Chain::load(dir.path()).unwrap();
        let outcome = generate(dir.path(), &chain, None, None, &EngineConfig::default()).unwrap();
        assert!(matches!(outcome, GenerateOutcome::NoChanges));
    }

    #[test]
    fn test_generate_emits_new_for_added_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
        let chain = Chain::load(dir.path()).unwrap();
        let outcome = generate(dir.path(), &chain, Some("first"), None, &EngineConfig::default()).unwrap();
        assert!(matches!(outcome, GenerateOutcome::Written(_)));

        let chain2 = Chain::load(dir.path()).unwrap();
        let state = reconstruct(&chain2, None).unwrap();
        assert_eq!(state["a.txt"].0.as_text(), "hello\n");
    }

    #[test]
    fn test_generate_detects_rename_above_threshold() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("old_name.txt"), "the quick brown fox\n").unwrap();
        let chain = Chain::load(dir.path()).unwrap();
        generate(dir.path(), &chain, None, None, &EngineConfig::default()).unwrap();

        fs::remove_file(dir.path().join("old_name.txt")).unwrap();
        fs::write(dir.path().join("new_name.txt"), "the quick brown fox\n").unwrap();
        let chain2 = Chain::load(dir.path()).unwrap();
        generate(dir.path(), &chain2, None, None, &EngineConfig::default()).unwrap();

        let chain3 = Chain::load(dir.path()).unwrap();
        let state = reconstruct(&chain3, None).unwrap();
        assert!(!state.contains_key("old_name.txt"));
        assert!(state.contains_key("new_name.txt"));
    }

    #[test]
    fn test_levenshtein_identical_strings_is_zero() {
        assert_eq!(levenshtein("abc", "abc"), 0);
    }

    #[test]
    fn test_normalized_similarity_of_empty_strings_is_one() {
        assert_eq!(normalized_text_similarity("", ""), 1.0);
    }
}
