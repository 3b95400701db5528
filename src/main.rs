//! Thin CLI binary over the `tmplchain` library (spec §6.4, A5).
//!
//! This binary only wires `clap` parsing to the library's public API and
//! prints human-readable status; it does not implement the prompting,
//! spinner, or assisted-merge subprocess collaborators described in §1 as
//! out of scope. The default conflict resolver is [`tmplchain::core::applier::KeepResolver`],
//! the safe choice when no interactive collaborator is wired up.

use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tmplchain::cli::{Cli, Command, FeatureCommand};
use tmplchain::core::applier::{replay_feature, update as apply_update, KeepResolver};
use tmplchain::core::audit::{AuditEvent, AuditLog};
use tmplchain::core::chain::Chain;
use tmplchain::core::config::EngineConfig;
use tmplchain::core::error::EngineError;
use tmplchain::core::feature::{FeatureManifest, FeatureState};
use tmplchain::core::generator::{generate, GenerateOutcome};
use tmplchain::core::project::{
    load_project_config, load_project_state, save_project_config, save_project_state,
    ProjectConfig, ProjectState,
};
use tmplchain::core::state::reconstruct;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Maps the engine's error taxonomy to the exit codes §6.4 promises: `1`
/// for a handled user error (bad input, invalid manifest, policy
/// violation), `2` for an internal invariant violation (a corrupt chain or
/// unexpected I/O failure the caller cannot reasonably fix by editing
/// their command line).
fn exit_code_for(err: &EngineError) -> u8 {
    match err {
        EngineError::ManifestInvalid(_)
        | EngineError::CircularDependency { .. }
        | EngineError::UnknownFeature(_)
        | EngineError::DependencyUnsatisfied { .. }
        | EngineError::AmbiguousFeature { .. }
        | EngineError::IgnoreParse { .. }
        | EngineError::Toml(_)
        | EngineError::NotFound(_) => 1,
        _ => 2,
    }
}

fn run(cli: &Cli) -> tmplchain::core::error::Result<()> {
    match &cli.command {
        Command::Init(args) => run_init(args),
        Command::Generate(args) => run_generate(args),
        Command::Check(args) => run_check(args),
        Command::Update(args) => run_update(args),
        Command::Feature(args) => run_feature(args),
    }
}

fn resolve_dir(dir: &Option<PathBuf>) -> std::io::Result<PathBuf> {
    match dir {
        Some(p) => Ok(p.clone()),
        None => std::env::current_dir(),
    }
}

fn run_init(args: &tmplchain::cli::InitArgs) -> tmplchain::core::error::Result<()> {
    let dir = resolve_dir(&args.dir)?;
    let config = ProjectConfig {
        version: 1,
        enabled_features: args.features.clone(),
        template_version: None,
    };
    save_project_config(&dir, &config)?;

    let mut state = ProjectState::new(&args.template);
    if !args.features.is_empty() {
        state.enabled_features = Some(args.features.clone());
    }
    save_project_state(&dir, &state)?;

    let audit = AuditLog::new(&dir);
    audit.append(&AuditEvent::new("project_initialized").with_detail(&args.template))?;

    println!(
        "{} project initialized, tracking template {}",
        "ok:".green().bold(),
        args.template
    );
    Ok(())
}

fn run_generate(args: &tmplchain::cli::GenerateArgs) -> tmplchain::core::error::Result<()> {
    let dir = resolve_dir(&args.dir)?;
    let chain = Chain::load(&dir)?;
    let manifest = load_manifest(&dir)?;
    let config = EngineConfig::load_from_root(&dir)?;
    let audit = AuditLog::new(&dir);

    match generate(&dir, &chain, args.label.as_deref(), manifest.as_ref(), &config)? {
        GenerateOutcome::Written(id) => {
            audit.append(&AuditEvent::new("migration_generated").with_migration(&id))?;
            println!("{} wrote migration {}", "ok:".green().bold(), id);
        }
        GenerateOutcome::NoChanges => {
            println!("{} no changes since last migration", "ok:".green().bold());
        }
    }
    Ok(())
}

fn run_check(args: &tmplchain::cli::CheckArgs) -> tmplchain::core::error::Result<()> {
    let dir = resolve_dir(&args.dir)?;
    let chain = Chain::load(&args.template_dir)?;
    let state = load_project_state(&dir)?;

    let pending = chain.after(state.last_applied());
    if pending.is_empty() {
        println!("{} up to date with {}", "ok:".green().bold(), chain.ids().last().cloned().unwrap_or_default());
        return Ok(());
    }

    println!(
        "{} {} pending migration(s):",
        "pending:".yellow().bold(),
        pending.len()
    );
    for migration in &pending {
        println!("  {} ({} ops)", migration.id, migration.ops.len());
    }

    let target = reconstruct(&chain, None)?;
    let mut conflicts = 0usize;
    for (path, (blob, _feature)) in target.iter() {
        let abs = dir.join(path);
        if let Ok(current) = std::fs::read(&abs) {
            if current != blob.bytes {
                conflicts += 1;
            }
        }
    }
    if conflicts > 0 {
        println!(
            "{} {} file(s) differ from the template target and may conflict on update",
            "warn:".yellow().bold(),
            conflicts
        );
    }
    Ok(())
}

fn run_update(args: &tmplchain::cli::UpdateArgs) -> tmplchain::core::error::Result<()> {
    let dir = resolve_dir(&args.dir)?;
    let chain = Chain::load(&args.template_dir)?;
    let manifest = load_manifest(&args.template_dir)?;
    let mut state = load_project_state(&dir)?;
    let audit = AuditLog::new(&dir);
    let mut resolver = KeepResolver;

    audit.append(&AuditEvent::new("update_started"))?;
    let reports = apply_update(&dir, &chain, manifest.as_ref(), &mut state, &mut resolver, &audit)?;

    if reports.is_empty() {
        println!("{} nothing to apply", "ok:".green().bold());
        return Ok(());
    }

    for report in &reports {
        println!("{} migration {}", "applied:".green().bold(), report.migration_id);
        for path in &report.fast_forwarded {
            println!("  {} {}", "ff".blue(), path);
        }
        for (path, resolution) in &report.conflicts_resolved {
            println!("  {} {} ({})", "conflict".red(), path, resolution);
        }
    }
    Ok(())
}

fn run_feature(args: &tmplchain::cli::FeatureArgs) -> tmplchain::core::error::Result<()> {
    match &args.command {
        FeatureCommand::List { dir, template_dir } => {
            let dir = resolve_dir(dir)?;
            let manifest = load_manifest(template_dir)?.ok_or_else(|| {
                EngineError::ManifestInvalid("no feature manifest found".to_string())
            })?;
            let state = load_project_state(&dir)?;
            let enabled: std::collections::BTreeSet<String> =
                state.enabled_features.unwrap_or_default().into_iter().collect();
            for name in manifest.features.keys() {
                let marker = if enabled.contains(name) { "on".green() } else { "off".dimmed() };
                println!("  {} [{}]", name, marker);
            }
            Ok(())
        }
        FeatureCommand::Enable { dir, template_dir, name } => {
            let dir = resolve_dir(dir)?;
            let manifest = load_manifest(template_dir)?.ok_or_else(|| {
                EngineError::ManifestInvalid("no feature manifest found".to_string())
            })?;
            let mut state = load_project_state(&dir)?;
            let enabled: std::collections::BTreeSet<String> =
                state.enabled_features.clone().unwrap_or_default().into_iter().collect();
            let mut feature_state = FeatureState::new(&manifest, enabled);
            let added = feature_state.enable(name)?;
            state.enabled_features = Some(feature_state.enabled.into_iter().collect());

            let chain = Chain::load(template_dir)?;
            let audit = AuditLog::new(&dir);
            let mut resolver = KeepResolver;
            for newly_enabled in &added {
                replay_feature(&dir, &chain, newly_enabled, &mut state, &mut resolver, &audit)?;
            }
            save_project_state(&dir, &state)?;

            audit.append(&AuditEvent::new("feature_enabled").with_detail(name))?;
            println!("{} enabled {} (+{:?})", "ok:".green().bold(), name, added);
            Ok(())
        }
        FeatureCommand::Disable { dir, template_dir, name } => {
            let dir = resolve_dir(dir)?;
            let manifest = load_manifest(template_dir)?.ok_or_else(|| {
                EngineError::ManifestInvalid("no feature manifest found".to_string())
            })?;
            let mut state = load_project_state(&dir)?;
            let enabled: std::collections::BTreeSet<String> =
                state.enabled_features.clone().unwrap_or_default().into_iter().collect();
            let mut feature_state = FeatureState::new(&manifest, enabled);
            feature_state.disable(name)?;
            state.enabled_features = Some(feature_state.enabled.into_iter().collect());

            if let Some(owned) = state.feature_files.remove(name) {
                for path in &owned {
                    std::fs::remove_file(dir.join(path)).ok();
                }
            }
            save_project_state(&dir, &state)?;

            let audit = AuditLog::new(&dir);
            audit.append(&AuditEvent::new("feature_disabled").with_detail(name))?;
            println!("{} disabled {}", "ok:".green().bold(), name);
            Ok(())
        }
    }
}

fn load_manifest(dir: &Path) -> tmplchain::core::error::Result<Option<FeatureManifest>> {
    FeatureManifest::load(&dir.join("features.json"))
}
