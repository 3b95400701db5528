//! Feature-flag overlay: manifest parsing, dependency resolution, and
//! apply-time scoping of files/ops by enabled features (C8).

use crate::core::error::{EngineError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// A single feature's definition in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDef {
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    #[serde(rename = "exclusivePatterns")]
    pub exclusive_patterns: Vec<String>,
    /// Paths this feature shares with other features rather than owning
    /// exclusively (spec §3.1). Not consulted by apply-time scoping: a
    /// shared file is never tagged to a single feature via `exclusivePatterns`,
    /// so it is always applied regardless of `enabledFeatures`. Carried
    /// through the manifest for downstream tooling (e.g. scaffolders that
    /// want to know which features touch a shared file) to consult.
    #[serde(default)]
    #[serde(rename = "sharedFiles")]
    pub shared_files: BTreeMap<String, String>,
    /// Named insertion markers this feature contributes content at, keyed by
    /// marker name to the snippet/path it injects (spec §3.1). The core
    /// apply/generate algorithms do not interpret these; weaving injected
    /// content into a shared file is a collaborator concern outside §1's scope.
    #[serde(default)]
    #[serde(rename = "injectionPoints")]
    pub injection_points: BTreeMap<String, String>,
}

/// The parsed, validated feature manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureManifest {
    pub version: u32,
    pub features: BTreeMap<String, FeatureDef>,
}

impl FeatureManifest {
    /// Parses and validates a manifest from its JSON text.
    pub fn parse(raw: &str) -> Result<FeatureManifest> {
        let manifest: FeatureManifest = serde_json::from_str(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Option<FeatureManifest>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        Ok(Some(FeatureManifest::parse(&raw)?))
    }

    fn validate(&self) -> Result<()> {
        for (name, def) in &self.features {
            if def.description.trim().is_empty() {
                return Err(EngineError::ManifestInvalid(format!(
                    "feature {} has an empty description",
                    name
                )));
            }
            for dep in &def.dependencies {
                if !self.features.contains_key(dep) {
                    return Err(EngineError::ManifestInvalid(format!(
                        "feature {} depends on unknown feature {}",
                        name, dep
                    )));
                }
            }
        }
        self.check_cycles()?;
        Ok(())
    }

    /// DFS cycle detection over the dependency graph: a "visiting" set
    /// catches re-entry into a node still on the DFS stack.
    fn check_cycles(&self) -> Result<()> {
        #[derive(PartialEq, Clone, Copy)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();

        fn visit<'a>(
            name: &'a str,
            features: &'a BTreeMap<String, FeatureDef>,
            marks: &mut BTreeMap<&'a str, Mark>,
        ) -> Result<()> {
            match marks.get(name) {
                Some(Mark::Visiting) => {
                    return Err(EngineError::CircularDependency {
                        feature: name.to_string(),
                    });
                }
                Some(Mark::Done) => return Ok(()),
                None => {}
            }
            marks.insert(name, Mark::Visiting);
            if let Some(def) = features.get(name) {
                for dep in &def.dependencies {
                    visit(dep, features, marks)?;
                }
            }
            marks.insert(name, Mark::Done);
            Ok(())
        }

        for name in self.features.keys() {
            visit(name, &self.features, &mut marks)?;
        }
        Ok(())
    }

    /// Dependency closure of `requested`, returned sorted for determinism.
    pub fn resolve(&self, requested: &[String]) -> Result<Vec<String>> {
        let mut closure: BTreeSet<String> = BTreeSet::new();
        for f in requested {
            self.collect_closure(f, &mut closure)?;
        }
        Ok(closure.into_iter().collect())
    }

    fn collect_closure(&self, name: &str, closure: &mut BTreeSet<String>) -> Result<()> {
        if closure.contains(name) {
            return Ok(());
        }
        let def = self
            .features
            .get(name)
            .ok_or_else(|| EngineError::UnknownFeature(name.to_string()))?;
        closure.insert(name.to_string());
        for dep in &def.dependencies {
            self.collect_closure(dep, closure)?;
        }
        Ok(())
    }

    /// Names of every feature whose `exclusivePatterns` matches `path`.
    pub fn features_matching(&self, path: &str) -> Vec<String> {
        let mut matches = Vec::new();
        for (name, def) in &self.features {
            if def.exclusive_patterns.iter().any(|p| glob_matches(p, path)) {
                matches.push(name.clone());
            }
        }
        matches
    }
}

/// Compiles a simple glob (`*` → any run of non-`/` chars, `**` → any run
/// including `/`) into an anchored regex and matches `path` against it.
fn glob_matches(pattern: &str, path: &str) -> bool {
    let mut regex_str = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    regex_str.push_str(".*");
                } else {
                    regex_str.push_str("[^/]*");
                }
            }
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                regex_str.push('\\');
                regex_str.push(c);
            }
            other => regex_str.push(other),
        }
    }
    regex_str.push('$');
    Regex::new(&regex_str).map(|re| re.is_match(path)).unwrap_or(false)
}

/// Tracks a project's enabled-feature state and per-feature owned-file
/// provenance, independent of the manifest (that lives in `core::project`).
pub struct FeatureState<'a> {
    manifest: &'a FeatureManifest,
    pub enabled: BTreeSet<String>,
}

impl<'a> FeatureState<'a> {
    pub fn new(manifest: &'a FeatureManifest, enabled: BTreeSet<String>) -> FeatureState<'a> {
        FeatureState { manifest, enabled }
    }

    /// Enables `f` and its dependency closure. Errors if `f` is already
    /// directly enabled (distinct from silent dependency pull-in).
    pub fn enable(&mut self, f: &str) -> Result<Vec<String>> {
        if self.enabled.contains(f) {
            return Err(EngineError::ManifestInvalid(format!(
                "feature {} is already enabled",
                f
            )));
        }
        let closure = self.manifest.resolve(&[f.to_string()])?;
        for name in &closure {
            self.enabled.insert(name.clone());
        }
        Ok(closure)
    }

    /// Disables `f`, rejecting if another enabled feature still depends on
    /// it. Returns the list of blockers on rejection.
    pub fn disable(&mut self, f: &str) -> Result<()> {
        let blockers: Vec<String> = self
            .enabled
            .iter()
            .filter(|name| name.as_str() != f)
            .filter(|name| {
                self.manifest
                    .features
                    .get(name.as_str())
                    .map(|def| def.dependencies.iter().any(|d| d == f))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if !blockers.is_empty() {
            return Err(EngineError::DependencyUnsatisfied {
                feature: f.to_string(),
                blockers,
            });
        }
        self.enabled.remove(f);
        Ok(())
    }

    pub fn is_enabled(&self, f: &str) -> bool {
        self.enabled.contains(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> FeatureManifest {
        let raw = r#"{
            "version": 1,
            "features": {
                "auth": { "description": "Authentication", "dependencies": [], "exclusivePatterns": ["src/auth/**"] },
                "sso": { "description": "Single sign-on", "dependencies": ["auth"], "exclusivePatterns": ["src/sso/**"] }
            }
        }"#;
        FeatureManifest::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_valid_manifest() {
        let m = sample_manifest();
        assert_eq!(m.features.len(), 2);
    }

    #[test]
    fn test_parse_rejects_empty_description() {
        let raw = r#"{"version":1,"features":{"x":{"description":"","dependencies":[],"exclusivePatterns":[]}}}"#;
        assert!(FeatureManifest::parse(raw).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_dependency() {
        let raw = r#"{"version":1,"features":{"x":{"description":"X","dependencies":["missing"],"exclusivePatterns":[]}}}"#;
        assert!(FeatureManifest::parse(raw).is_err());
    }

    #[test]
    fn test_parse_rejects_cycle() {
        let raw = r#"{"version":1,"features":{
            "a":{"description":"A","dependencies":["b"],"exclusivePatterns":[]},
            "b":{"description":"B","dependencies":["a"],"exclusivePatterns":[]}
        }}"#;
        let result = FeatureManifest::parse(raw);
        assert!(matches!(result, Err(EngineError::CircularDependency { .. })));
    }

    #[test]
    fn test_resolve_pulls_in_dependency_closure() {
        let m = sample_manifest();
        let closure = m.resolve(&["sso".to_string()]).unwrap();
        assert_eq!(closure, vec!["auth".to_string(), "sso".to_string()]);
    }

    #[test]
    fn test_features_matching_exclusive_pattern() {
        let m = sample_manifest();
        let matches = m.features_matching("src/auth/login.rs");
        assert_eq!(matches, vec!["auth".to_string()]);
    }

    #[test]
    fn test_enable_pulls_in_dependencies_silently() {
        let m = sample_manifest();
        let mut state = FeatureState::new(&m, BTreeSet::new());
        let added = state.enable("sso").unwrap();
        assert!(added.contains(&"auth".to_string()));
        assert!(state.is_enabled("auth"));
    }

    #[test]
    fn test_enable_twice_is_an_error() {
        let m = sample_manifest();
        let mut state = FeatureState::new(&m, BTreeSet::new());
        state.enable("auth").unwrap();
        assert!(state.enable("auth").is_err());
    }

    #[test]
    fn test_disable_blocked_by_dependent() {
        let m = sample_manifest();
        let mut enabled = BTreeSet::new();
        enabled.insert("auth".to_string());
        enabled.insert("sso".to_string());
        let mut state = FeatureState::new(&m, enabled);
        let result = state.disable("auth");
        assert!(matches!(
            result,
            Err(EngineError::DependencyUnsatisfied { .. })
        ));
    }

    #[test]
    fn test_disable_unblocked_succeeds() {
        let m = sample_manifest();
        let mut enabled = BTreeSet::new();
        enabled.insert("auth".to_string());
        let mut state = FeatureState::new(&m, enabled);
        state.disable("auth").unwrap();
        assert!(!state.is_enabled("auth"));
    }
}
