//! CLI struct definitions for the `tmplchain` command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `src/main.rs`.
//! This crate's library (`crate::core`) never depends on anything in this
//! module: the CLI is a thin, swappable front end over the engine.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "tmplchain",
    version = env!("CARGO_PKG_VERSION"),
    about = "Deterministic migration engine for template repositories."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize project state files in a directory that tracks a template.
    Init(InitArgs),
    /// Snapshot changes since the last migration into a new migration (run in the template repo).
    Generate(GenerateArgs),
    /// Report pending migrations and likely conflicts without writing anything.
    Check(CheckArgs),
    /// Apply pending migrations to the project's working tree.
    Update(UpdateArgs),
    /// List, enable, or disable template features.
    Feature(FeatureArgs),
}

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to the current working directory).
    #[clap(short, long)]
    pub dir: Option<PathBuf>,
    /// Template identifier this project tracks.
    #[clap(long)]
    pub template: String,
    /// Features to enable at init time (repeatable, or comma-separated).
    #[clap(long = "feature", value_delimiter = ',')]
    pub features: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    /// Template root directory (defaults to the current working directory).
    #[clap(short, long)]
    pub dir: Option<PathBuf>,
    /// Human-readable label recorded alongside the new migration.
    pub label: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Project root directory (defaults to the current working directory).
    #[clap(short, long)]
    pub dir: Option<PathBuf>,
    /// Path to the template's migration chain root.
    #[clap(long)]
    pub template_dir: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    /// Project root directory (defaults to the current working directory).
    #[clap(short, long)]
    pub dir: Option<PathBuf>,
    /// Path to the template's migration chain root.
    #[clap(long)]
    pub template_dir: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct FeatureArgs {
    #[clap(subcommand)]
    pub command: FeatureCommand,
}

#[derive(Subcommand, Debug)]
pub enum FeatureCommand {
    /// List every feature the manifest defines and whether it's enabled.
    List {
        #[clap(short, long)]
        dir: Option<PathBuf>,
        #[clap(long)]
        template_dir: PathBuf,
    },
    /// Enable a feature (and its dependency closure).
    Enable {
        #[clap(short, long)]
        dir: Option<PathBuf>,
        #[clap(long)]
        template_dir: PathBuf,
        name: String,
    },
    /// Disable a feature, rejecting if another enabled feature still depends on it.
    Disable {
        #[clap(short, long)]
        dir: Option<PathBuf>,
        #[clap(long)]
        template_dir: PathBuf,
        name: String,
    },
}
