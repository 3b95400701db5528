//! Gitignore-style ignore-pattern matching (C1).
//!
//! Supports negation (`!pattern`), directory anchoring (`/pattern` matches
//! only from the root being scanned), trailing-slash directory-only
//! patterns, and `**` for arbitrary-depth segments. Patterns are matched
//! against a path relative to the scan root using `/`-separated components
//! regardless of host OS.

use crate::core::error::{EngineError, Result};
use std::fs;
use std::path::Path;

/// A single compiled ignore rule.
#[derive(Debug, Clone)]
struct Rule {
    negated: bool,
    /// True if the pattern is anchored to the root (contained a `/` before
    /// the final segment, other than a trailing one).
    anchored: bool,
    /// True if the pattern ends in `/`, matching directories only.
    dir_only: bool,
    /// Pattern split on `/`, with the anchoring/dir-only slashes already
    /// stripped, each segment possibly containing `*`/`?`/`**`.
    segments: Vec<String>,
}

/// A set of compiled ignore rules, evaluated in order with later rules
/// overriding earlier ones (matching `.gitignore` semantics).
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    rules: Vec<Rule>,
}

impl IgnoreSet {
    pub fn new() -> IgnoreSet {
        IgnoreSet { rules: Vec::new() }
    }

    /// Parses ignore rules from a `.gitignore`-style text blob. Blank lines
    /// and `#`-comment lines are skipped; malformed lines are skipped with
    /// an `IgnoreParse` error collected rather than aborting the whole file.
    pub fn parse(content: &str) -> (IgnoreSet, Vec<EngineError>) {
        let mut set = IgnoreSet::new();
        let mut errors = Vec::new();
        for (idx, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim_end();
            if line.is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            match Rule::parse(line) {
                Ok(rule) => set.rules.push(rule),
                Err(reason) => errors.push(EngineError::IgnoreParse {
                    line: idx + 1,
                    reason,
                }),
            }
        }
        (set, errors)
    }

    /// Loads and parses an ignore file at `path`, treating a missing file as
    /// an empty rule set.
    pub fn load(path: &Path) -> Result<IgnoreSet> {
        if !path.exists() {
            return Ok(IgnoreSet::new());
        }
        let content = fs::read_to_string(path)?;
        let (set, _errors) = IgnoreSet::parse(&content);
        Ok(set)
    }

    /// Merges rules from `other` onto the end of `self` (later rules win).
    pub fn extend(&mut self, other: IgnoreSet) {
        self.rules.extend(other.rules);
    }

    /// Appends a single literal rule line (used for hardcoded always-ignore
    /// prefixes such as `.git/`).
    pub fn push_literal(&mut self, pattern: &str) {
        if let Ok(rule) = Rule::parse(pattern) {
            self.rules.push(rule);
        }
    }

    /// Returns whether `rel_path` (relative to the scan root, `/`-separated,
    /// no leading `/`) should be ignored. `is_dir` affects `dir_only` rules.
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        let components: Vec<&str> = rel_path.split('/').filter(|s| !s.is_empty()).collect();
        let mut ignored = false;
        for rule in &self.rules {
            if rule.dir_only && !is_dir {
                // A dir-only rule can still match an ancestor directory of a file;
                // handled by matching any prefix of components below.
            }
            if rule.matches(&components, is_dir) {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}

impl Rule {
    fn parse(line: &str) -> std::result::Result<Rule, String> {
        let mut pattern = line;
        let negated = if let Some(stripped) = pattern.strip_prefix('!') {
            pattern = stripped;
            true
        } else {
            false
        };
        if pattern.is_empty() {
            return Err("empty pattern after negation".to_string());
        }
        let dir_only = pattern.ends_with('/');
        if dir_only {
            pattern = &pattern[..pattern.len() - 1];
        }
        // A leading `/` anchors to the root; a `/` anywhere but the end also
        // anchors per gitignore semantics (only a single bare segment like
        // `*.log` is unanchored).
        let anchored =
            pattern.starts_with('/') || (pattern.contains('/') && !pattern.starts_with("**/"));
        let pattern = pattern.strip_prefix('/').unwrap_or(pattern);
        if pattern.is_empty() {
            return Err("pattern reduced to empty string".to_string());
        }
        let segments = pattern.split('/').map(|s| s.to_string()).collect();
        Ok(Rule {
            negated,
            anchored,
            dir_only,
            segments,
        })
    }

    /// Matches a single glob segment (`*`, `?`, literal chars) against a path component.
    fn segment_matches(pattern: &str, value: &str) -> bool {
        fn helper(p: &[u8], v: &[u8]) -> bool {
            match (p.first(), v.first()) {
                (None, None) => true,
                (Some(b'*'), _) => {
                    helper(&p[1..], v) || (!v.is_empty() && helper(p, &v[1..]))
                }
                (Some(b'?'), Some(_)) => helper(&p[1..], &v[1..]),
                (Some(pc), Some(vc)) if pc == vc => helper(&p[1..], &v[1..]),
                _ => false,
            }
        }
        helper(pattern.as_bytes(), value.as_bytes())
    }

    /// Checks whether `segments` (the pattern's components) match `components`
    /// starting anywhere (if unanchored) or only at position 0 (if anchored),
    /// honoring `**` as a wildcard for zero or more path components.
    fn matches(&self, components: &[&str], is_dir: bool) -> bool {
        if self.dir_only && !is_dir && !self.matches_as_prefix(components) {
            return false;
        }
        if self.anchored {
            Self::match_from(&self.segments, components)
        } else {
            for start in 0..components.len() {
                if Self::match_from(&self.segments, &components[start..]) {
                    return true;
                }
            }
            false
        }
    }

    /// For dir-only patterns applied to a file, check if any ancestor
    /// directory component matches the pattern.
    fn matches_as_prefix(&self, components: &[&str]) -> bool {
        if components.is_empty() {
            return false;
        }
        for end in 1..components.len() {
            if self.anchored {
                if Self::match_from(&self.segments, &components[..end]) {
                    return true;
                }
            } else {
                for start in 0..end {
                    if Self::match_from(&self.segments, &components[start..end]) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn match_from(pattern: &[String], components: &[&str]) -> bool {
        Self::match_from_at(pattern, components, true)
    }

    /// `at_pattern_start` is true only while no literal segment has yet been
    /// consumed from the original pattern. A `**` reached while still at the
    /// start (the leading `**` in `**/generated/**`) may match zero
    /// components; once a literal segment has matched, an interior `**` must
    /// consume at least one component, so `a/**/b` does not match `a/b`.
    fn match_from_at(pattern: &[String], components: &[&str], at_pattern_start: bool) -> bool {
        match (pattern.first(), components.first()) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(p), _) if p == "**" => {
                if pattern.len() == 1 {
                    return true;
                }
                let min_skip = if at_pattern_start { 0 } else { 1 };
                for skip in min_skip..=components.len() {
                    if Self::match_from_at(&pattern[1..], &components[skip..], false) {
                        return true;
                    }
                }
                false
            }
            (Some(_), None) => false,
            (Some(p), Some(c)) => {
                Self::segment_matches(p, c) && Self::match_from_at(&pattern[1..], &components[1..], false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_literal_match() {
        let (set, errs) = IgnoreSet::parse("node_modules\n");
        assert!(errs.is_empty());
        assert!(set.is_ignored("node_modules", true));
        assert!(set.is_ignored("src/node_modules", true));
    }

    #[test]
    fn test_anchored_pattern_only_matches_root() {
        let (set, _) = IgnoreSet::parse("/build\n");
        assert!(set.is_ignored("build", true));
        assert!(!set.is_ignored("src/build", true));
    }

    #[test]
    fn test_wildcard_extension() {
        let (set, _) = IgnoreSet::parse("*.log\n");
        assert!(set.is_ignored("debug.log", false));
        assert!(set.is_ignored("logs/debug.log", false));
        assert!(!set.is_ignored("debug.txt", false));
    }

    #[test]
    fn test_double_star_matches_any_depth() {
        let (set, _) = IgnoreSet::parse("**/generated/**\n");
        assert!(set.is_ignored("a/b/generated/file.rs", false));
        assert!(set.is_ignored("generated/file.rs", false));
    }

    #[test]
    fn test_negation_overrides_earlier_rule() {
        let (set, _) = IgnoreSet::parse("*.log\n!important.log\n");
        assert!(set.is_ignored("debug.log", false));
        assert!(!set.is_ignored("important.log", false));
    }

    #[test]
    fn test_dir_only_pattern_does_not_match_file_of_same_name() {
        let (set, _) = IgnoreSet::parse("build/\n");
        assert!(set.is_ignored("build", true));
        assert!(!set.is_ignored("build", false));
    }

    #[test]
    fn test_malformed_line_collected_not_fatal() {
        let (_set, errs) = IgnoreSet::parse("!\n");
        assert_eq!(errs.len(), 1);
    }
}
