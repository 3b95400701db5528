//! Three-way apply with conflict resolution and provenance tracking (C7).

use crate::core::audit::{AuditEvent, AuditLog};
use crate::core::blob::Blob;
use crate::core::chain::Chain;
use crate::core::diff::force_apply;
use crate::core::error::{EngineError, Result};
use crate::core::feature::FeatureManifest;
use crate::core::project::{save_project_state, ProjectState};
use crate::core::record::Operation;
use crate::core::state::reconstruct;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// How a per-file conflict was resolved.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Keep the project's current content unchanged.
    Keep,
    /// Overwrite with the template's target content.
    TemplateStrict,
    /// Apply the lossy C3 force-apply reconstruction.
    TemplateForce,
    /// Write caller-supplied content from an external merge tool.
    Assisted(Vec<u8>),
}

/// The three-way inputs presented to a conflict resolver for one path.
pub struct ConflictContext<'a> {
    pub path: &'a str,
    pub current: Option<&'a [u8]>,
    pub baseline: Option<&'a Blob>,
    pub target: Option<&'a Blob>,
    pub template_diff: Option<&'a str>,
}

/// Pluggable interaction hook. The default CLI resolver always
/// returns `Keep`; interactive prompting, TUI spinners, and the assisted
/// merge subprocess launcher live outside this crate.
pub trait ConflictResolver {
    fn resolve(&mut self, ctx: &ConflictContext) -> Resolution;
}

/// Always-`Keep` resolver: the safe default when no interactive collaborator is wired up.
pub struct KeepResolver;

impl ConflictResolver for KeepResolver {
    fn resolve(&mut self, _ctx: &ConflictContext) -> Resolution {
        Resolution::Keep
    }
}

/// Outcome of applying a single pending migration.
pub struct ApplyReport {
    pub migration_id: String,
    pub fast_forwarded: Vec<String>,
    pub already_converged: Vec<String>,
    pub conflicts_resolved: Vec<(String, String)>,
}

/// Applies every migration in `chain` newer than `state.last_applied()` to
/// `project_root`'s working tree, using `resolver` to mediate conflicts.
/// Stops and returns on the first hard error so a rerun can
/// retry the same migration (idempotent by construction: nothing in
/// `state.applied_migrations` is flushed until the whole migration succeeds).
pub fn update(
    project_root: &Path,
    chain: &Chain,
    manifest: Option<&FeatureManifest>,
    state: &mut ProjectState,
    resolver: &mut dyn ConflictResolver,
    audit: &AuditLog,
) -> Result<Vec<ApplyReport>> {
    let mut reports = Vec::new();
    let pending = chain.after(state.last_applied());

    for migration in pending {
        let baseline = reconstruct(chain, state.last_applied())?;
        let target = reconstruct(chain, Some(migration.id.as_str()))?;

        let mut report = ApplyReport {
            migration_id: migration.id.clone(),
            fast_forwarded: Vec::new(),
            already_converged: Vec::new(),
            conflicts_resolved: Vec::new(),
        };

        let enabled: BTreeSet<String> = state
            .enabled_features
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        for op in &migration.ops {
            let feature_ok = match op.feature() {
                Some(f) => manifest.map(|_| enabled.contains(f)).unwrap_or(true),
                None => true,
            };
            if !feature_ok {
                continue;
            }

            apply_single_op(
                project_root,
                op,
                &baseline,
                &target,
                migration.store.diff_body(op.primary_path()).ok().as_deref(),
                resolver,
                &mut report,
                state,
                audit,
            )?;
        }

        state.applied_migrations.push(migration.id.clone());
        save_project_state(project_root, state)?;
        audit.append(&AuditEvent::new("migration_applied").with_migration(&migration.id))?;
        reports.push(report);
    }
    Ok(reports)
}

/// Materializes a feature's owned files once it is enabled after some of
/// its migrations were already applied: an operation gated on a disabled
/// feature is skipped at apply time, so enabling the feature later must
/// replay it rather than wait for the next pending migration.
/// Walks the fully reconstructed template state rather than individual
/// migrations, since by the time a feature is enabled its owned paths may
/// have been created, modified, and renamed across many migrations — the
/// reconstructed state already folds all of that into one target blob per path.
pub fn replay_feature(
    project_root: &Path,
    chain: &Chain,
    feature: &str,
    state: &mut ProjectState,
    resolver: &mut dyn ConflictResolver,
    audit: &AuditLog,
) -> Result<ApplyReport> {
    let target = reconstruct(chain, None)?;
    let mut report = ApplyReport {
        migration_id: format!("replay:{}", feature),
        fast_forwarded: Vec::new(),
        already_converged: Vec::new(),
        conflicts_resolved: Vec::new(),
    };

    for (path, (blob, tag)) in target.iter() {
        if tag.as_deref() != Some(feature) {
            continue;
        }
        let abs_path = project_root.join(path);
        let current = fs::read(&abs_path).ok();
        match &current {
            None => {
                write_file(&abs_path, &blob.bytes)?;
                report.fast_forwarded.push(path.clone());
            }
            Some(bytes) if bytes == &blob.bytes => {
                report.already_converged.push(path.clone());
            }
            Some(_) => {
                resolve_conflict(
                    &abs_path,
                    path,
                    current.as_deref(),
                    None,
                    Some(blob),
                    None,
                    resolver,
                    &mut report,
                    audit,
                )?;
            }
        }
        let owned = state.feature_files.entry(feature.to_string()).or_default();
        if !owned.contains(path) {
            owned.push(path.clone());
        }
    }

    audit.append(&AuditEvent::new("feature_replayed").with_detail(feature))?;
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn apply_single_op(
    project_root: &Path,
    op: &Operation,
    baseline: &crate::core::state::TemplateState,
    target: &crate::core::state::TemplateState,
    template_diff: Option<&str>,
    resolver: &mut dyn ConflictResolver,
    report: &mut ApplyReport,
    state: &mut ProjectState,
    audit: &AuditLog,
) -> Result<()> {
    let path = op.primary_path();
    let abs_path = project_root.join(path);
    let baseline_blob = baseline.get(path).map(|(b, _)| b);
    let target_blob = target.get(path).map(|(b, _)| b);
    let current_bytes = fs::read(&abs_path).ok();

    match op {
        Operation::Delete { .. } => {
            if current_bytes.is_none() {
                report.already_converged.push(path.to_string());
                return Ok(());
            }
            if baseline_blob.map(|b| &b.bytes) == current_bytes.as_ref() {
                fs::remove_file(&abs_path)?;
                report.fast_forwarded.push(path.to_string());
            } else {
                resolve_conflict(
                    &abs_path,
                    path,
                    current_bytes.as_deref(),
                    baseline_blob,
                    target_blob,
                    template_diff,
                    resolver,
                    report,
                    audit,
                )?;
            }
        }
        _ => {
            let Some(target_blob) = target_blob else {
                return Ok(());
            };
            match &current_bytes {
                None => {
                    write_file(&abs_path, &target_blob.bytes)?;
                    report.fast_forwarded.push(path.to_string());
                }
                Some(current) if Some(current) == baseline_blob.map(|b| &b.bytes) => {
                    write_file(&abs_path, &target_blob.bytes)?;
                    report.fast_forwarded.push(path.to_string());
                }
                Some(current) if current == &target_blob.bytes => {
                    report.already_converged.push(path.to_string());
                }
                _ => {
                    resolve_conflict(
                        &abs_path,
                        path,
                        current_bytes.as_deref(),
                        baseline_blob,
                        Some(target_blob),
                        template_diff,
                        resolver,
                        report,
                        audit,
                    )?;
                }
            }
        }
    }

    if let Operation::Rename { old_path, .. } = op {
        let old_abs = project_root.join(old_path);
        let old_baseline = baseline.get(old_path.as_str()).map(|(b, _)| b);
        if let (Ok(old_current), Some(old_baseline)) = (fs::read(&old_abs), old_baseline) {
            if old_current == old_baseline.bytes {
                fs::remove_file(&old_abs).ok();
            }
        }
    }

    update_feature_files(state, op);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn resolve_conflict(
    abs_path: &Path,
    path: &str,
    current: Option<&[u8]>,
    baseline: Option<&Blob>,
    target: Option<&Blob>,
    template_diff: Option<&str>,
    resolver: &mut dyn ConflictResolver,
    report: &mut ApplyReport,
    audit: &AuditLog,
) -> Result<()> {
    let ctx = ConflictContext {
        path,
        current,
        baseline,
        target,
        template_diff,
    };
    let resolution = resolver.resolve(&ctx);
    let label = match &resolution {
        Resolution::Keep => "keep",
        Resolution::TemplateStrict => "template_strict",
        Resolution::TemplateForce => "template_force",
        Resolution::Assisted(_) => "assisted",
    };
    match resolution {
        Resolution::Keep => {}
        Resolution::TemplateStrict => {
            if let Some(target) = target {
                write_file(abs_path, &target.bytes)?;
            } else {
                fs::remove_file(abs_path).ok();
            }
        }
        Resolution::TemplateForce => {
            if let Some(diff) = template_diff {
                let forced = force_apply(diff);
                write_file(abs_path, forced.as_bytes())?;
            } else if let Some(target) = target {
                write_file(abs_path, &target.bytes)?;
            }
        }
        Resolution::Assisted(content) => {
            write_file(abs_path, &content)?;
        }
    }
    report.conflicts_resolved.push((path.to_string(), label.to_string()));
    audit.append(
        &AuditEvent::new("conflict_resolved")
            .with_path(path)
            .with_detail(label),
    )?;
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

/// Updates `featureFiles` provenance for a feature-tagged operation.
fn update_feature_files(state: &mut ProjectState, op: &Operation) {
    let Some(feature) = op.feature() else { return };
    let path = op.primary_path().to_string();
    match op {
        Operation::Delete { .. } => {
            if let Some(owned) = state.feature_files.get_mut(feature) {
                owned.retain(|p| p != &path);
            }
        }
        _ => {
            let owned = state.feature_files.entry(feature.to_string()).or_default();
            if !owned.contains(&path) {
                owned.push(path);
            }
        }
    }
}
