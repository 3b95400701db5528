//! Error types for the migration engine.
//!
//! This module defines the canonical error type used throughout the crate.
//! All subsystems return `Result<T, EngineError>` for error handling.

use std::io;
use thiserror::Error;

/// Canonical error type for all engine operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
/// Variants auto-convert from standard library / serde errors via `#[from]`.
///
/// `Conflict` (spec §7) is deliberately *not* a variant here: a per-file
/// conflict is recoverable via the `ConflictResolver` hook and is modeled as
/// an `Ok` outcome of the applier, not an `Err` of this type. Every variant
/// below is fatal for the command that raised it.
#[derive(Error, Debug)]
pub enum EngineError {
    /// I/O error (auto-converts from `std::io::Error`)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error (auto-converts from `serde_json::Error`)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML (de)serialization error for `EngineConfig`
    #[error("TOML error: {0}")]
    Toml(String),

    /// Malformed ignore-pattern line; the offending pattern is skipped, not fatal.
    #[error("ignore pattern parse error at line {line}: {reason}")]
    IgnoreParse { line: usize, reason: String },

    /// A file could not be read during a scan; the file is treated as binary.
    #[error("scan I/O error reading {path}: {reason}")]
    ScanIo { path: String, reason: String },

    /// Bug in diff production (should never surface to a caller).
    #[error("diff production failed for {path}: {reason}")]
    DiffProduce { path: String, reason: String },

    /// The migration chain could not be reconstructed; the chain is corrupt.
    #[error("chain corrupt: migration {id} cannot apply operation on {path}")]
    ChainCorrupt { id: String, path: String },

    /// The feature manifest failed validation.
    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    /// The feature dependency graph has a cycle rooted at `feature`.
    #[error("circular dependency detected at feature {feature}")]
    CircularDependency { feature: String },

    /// A feature name referenced by a manifest or project is not defined.
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    /// Disabling a feature would leave a dependent feature unsatisfied.
    #[error("cannot disable {feature}: still required by {blockers:?}")]
    DependencyUnsatisfied {
        feature: String,
        blockers: Vec<String>,
    },

    /// A path matches more than one feature's `exclusivePatterns`.
    #[error("{path} matches exclusive patterns of more than one feature: {features:?}")]
    AmbiguousFeature { path: String, features: Vec<String> },

    /// The assisted-merge collaborator failed or timed out; caller should fall back to `Keep`.
    #[error("assisted merge failed for {path}: {reason}")]
    AssistedMergeFailed { path: String, reason: String },

    /// Generic validation failure with a human-readable cause.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found (missing migration, missing path, etc.)
    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
