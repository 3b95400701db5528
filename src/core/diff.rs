//! Unified-diff engine: produce, apply, and force-apply (C3).
//!
//! Hand-rolled rather than delegated to a diff crate: the spec requires an
//! exact hunk-header and fuzzy-retry contract (§4.3) that a general-purpose
//! diff library does not expose as a guaranteed wire format, and migration
//! records must be byte-stable across engine versions.

use std::fmt;

/// A single contiguous diff hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    /// Lines tagged `' '` (context), `'-'` (removed), `'+'` (added).
    pub lines: Vec<(char, String)>,
}

/// Describes where and why an `apply` failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub hunk_index: usize,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conflict in hunk {}: expected context {:?}, found {:?}",
            self.hunk_index, self.expected, self.actual
        )
    }
}

/// Splits text into lines without terminators, remembering whether the
/// original text ended with a trailing newline.
fn split_lines(text: &str) -> (Vec<&str>, bool) {
    if text.is_empty() {
        return (Vec::new(), true);
    }
    let trailing_newline = text.ends_with('\n');
    let body = if trailing_newline { &text[..text.len() - 1] } else { text };
    (body.split('\n').collect(), trailing_newline)
}

/// Produces a unified diff between `old_text` and `new_text`. Returns the
/// empty string when the inputs are identical. Uses a classic
/// longest-common-subsequence myers-style backtrace restricted to
/// line granularity, which is sufficient at the sizes this engine targets.
/// `context_lines` is `EngineConfig::diff_context_lines` (spec §4.3).
pub fn produce(old_text: &str, new_text: &str, old_label: &str, new_label: &str, context_lines: usize) -> String {
    if old_text == new_text {
        return String::new();
    }
    let (old_lines, old_trailing_nl) = split_lines(old_text);
    let (new_lines, new_trailing_nl) = split_lines(new_text);
    let ops = diff_ops(&old_lines, &new_lines);
    let mut hunks = group_into_hunks(&ops, &old_lines, &new_lines, context_lines);

    if hunks.is_empty() {
        // `old_text != new_text` but every line is identical: the only
        // difference is the trailing newline. Represent it as an explicit
        // remove+add of the final line so the `\ No newline` markers below
        // have an unambiguous line to attach to on each side.
        if let Some(&last) = old_lines.last() {
            hunks.push(Hunk {
                old_start: old_lines.len(),
                old_len: 1,
                new_start: new_lines.len(),
                new_len: 1,
                lines: vec![(' ', last.to_string())],
            });
        }
    }
    ensure_eof_hunk(&mut hunks, &old_lines, &new_lines, old_trailing_nl, new_trailing_nl);
    if old_trailing_nl != new_trailing_nl {
        split_final_context_line(&mut hunks, &old_lines, &new_lines);
    }

    let mut out = String::new();
    out.push_str(&format!("--- {}\n", old_label));
    out.push_str(&format!("+++ {}\n", new_label));
    let last_hunk_idx = hunks.len().saturating_sub(1);
    for (hunk_pos, hunk) in hunks.iter().enumerate() {
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            hunk.old_start, hunk.old_len, hunk.new_start, hunk.new_len
        ));
        let is_last_hunk = hunk_pos == last_hunk_idx;
        // Old/new line counters consumed so far within this hunk, used to
        // detect the line that corresponds to each file's final line.
        let mut old_seen = 0usize;
        let mut new_seen = 0usize;
        for (tag, line) in &hunk.lines {
            out.push_str(&format!("{}{}\n", tag, line));
            if *tag != '+' {
                old_seen += 1;
            }
            if *tag != '-' {
                new_seen += 1;
            }
            if is_last_hunk {
                let at_old_eof = *tag != '+' && old_seen == hunk.old_len && hunk.old_start + hunk.old_len - 1 == old_lines.len();
                let at_new_eof = *tag != '-' && new_seen == hunk.new_len && hunk.new_start + hunk.new_len - 1 == new_lines.len();
                if at_old_eof && !old_trailing_nl {
                    out.push_str("\\ No newline at end of file\n");
                }
                if at_new_eof && !new_trailing_nl {
                    out.push_str("\\ No newline at end of file\n");
                }
            }
        }
    }
    out
}

/// Appends a trailing context hunk covering each file's final line when
/// either side lacks a trailing newline and the existing hunks don't
/// already reach end-of-file. Without this, an edit far from the end of a
/// file with no trailing newline produces hunks that never mention the
/// final line at all, leaving no line for a `\ No newline` marker to
/// attach to (see [`produce`]); the hunk this appends is a no-op context
/// line whose sole purpose is carrying that marker.
fn ensure_eof_hunk(hunks: &mut Vec<Hunk>, old_lines: &[&str], new_lines: &[&str], old_trailing_nl: bool, new_trailing_nl: bool) {
    if old_trailing_nl && new_trailing_nl {
        return;
    }
    let reaches_old_eof = hunks
        .last()
        .map(|h| h.old_len > 0 && h.old_start + h.old_len == old_lines.len() + 1)
        .unwrap_or(false);
    let reaches_new_eof = hunks
        .last()
        .map(|h| h.new_len > 0 && h.new_start + h.new_len == new_lines.len() + 1)
        .unwrap_or(false);
    let needs_old = !old_trailing_nl && !reaches_old_eof;
    let needs_new = !new_trailing_nl && !reaches_new_eof;
    if !needs_old && !needs_new {
        return;
    }
    // Both sides lacking a trailing newline without the edit reaching EOF
    // implies the final line is unchanged between old and new: a real
    // content change at that position would already appear in a hunk
    // reaching EOF via the ordinary diff-op grouping above.
    if let Some(&last) = old_lines.last() {
        hunks.push(Hunk {
            old_start: old_lines.len(),
            old_len: 1,
            new_start: new_lines.len(),
            new_len: 1,
            lines: vec![(' ', last.to_string())],
        });
    }
}

/// If the last hunk's final line is an unchanged context line that sits at
/// the end of both the old and new files, splits it into an explicit
/// remove+add pair so a trailing-newline-only change has a line on each
/// side to attach its `\ No newline` marker to (see [`produce`]).
fn split_final_context_line(hunks: &mut [Hunk], old_lines: &[&str], new_lines: &[&str]) {
    let Some(last_hunk) = hunks.last_mut() else {
        return;
    };
    let at_old_eof = last_hunk.old_start + last_hunk.old_len == old_lines.len() + 1;
    let at_new_eof = last_hunk.new_start + last_hunk.new_len == new_lines.len() + 1;
    if !at_old_eof || !at_new_eof {
        return;
    }
    if let Some(&(tag, ref text)) = last_hunk.lines.last() {
        if tag == ' ' {
            let text = text.clone();
            last_hunk.lines.pop();
            last_hunk.lines.push(('-', text.clone()));
            last_hunk.lines.push(('+', text));
        }
    }
}

/// A single diff-op before grouping into hunks: context/delete/insert over
/// line indices in the old and new sequences.
enum Op {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

/// Computes a line-level edit script via dynamic-programming LCS. O(n*m);
/// adequate for the per-file sizes this engine operates on.
fn diff_ops(old: &[&str], new: &[&str]) -> Vec<Op> {
    let n = old.len();
    let m = new.len();
    let mut dp = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if old[i] == new[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }
    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(Op::Equal(i, j));
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            ops.push(Op::Delete(i));
            i += 1;
        } else {
            ops.push(Op::Insert(j));
            j += 1;
        }
    }
    while i < n {
        ops.push(Op::Delete(i));
        i += 1;
    }
    while j < m {
        ops.push(Op::Insert(j));
        j += 1;
    }
    ops
}

/// Groups an edit script into hunks, merging changes that are within
/// `2 * context_lines` of each other, each padded with up to `context_lines`
/// lines of context on either side.
fn group_into_hunks(ops: &[Op], old: &[&str], new: &[&str], context_lines: usize) -> Vec<Hunk> {
    // Find indices (into `ops`) of change clusters.
    let mut change_positions = Vec::new();
    for (idx, op) in ops.iter().enumerate() {
        if !matches!(op, Op::Equal(_, _)) {
            change_positions.push(idx);
        }
    }
    if change_positions.is_empty() {
        return Vec::new();
    }

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let mut start = change_positions[0];
    let mut end = change_positions[0];
    for &pos in &change_positions[1..] {
        // Count equal-ops between `end` and `pos`.
        let gap = ops[end + 1..pos]
            .iter()
            .filter(|o| matches!(o, Op::Equal(_, _)))
            .count();
        if gap <= 2 * context_lines {
            end = pos;
        } else {
            ranges.push((start, end));
            start = pos;
            end = pos;
        }
    }
    ranges.push((start, end));

    let mut hunks = Vec::new();
    for (r_start, r_end) in ranges {
        let lo = r_start.saturating_sub(context_lines);
        let hi = (r_end + context_lines + 1).min(ops.len());
        let slice = &ops[lo..hi];

        let mut lines = Vec::new();
        let mut old_start_idx = None;
        let mut new_start_idx = None;
        let mut old_count = 0usize;
        let mut new_count = 0usize;
        for op in slice {
            match *op {
                Op::Equal(oi, ni) => {
                    if old_start_idx.is_none() {
                        old_start_idx = Some(oi);
                    }
                    if new_start_idx.is_none() {
                        new_start_idx = Some(ni);
                    }
                    lines.push((' ', old[oi].to_string()));
                    old_count += 1;
                    new_count += 1;
                }
                Op::Delete(oi) => {
                    if old_start_idx.is_none() {
                        old_start_idx = Some(oi);
                    }
                    lines.push(('-', old[oi].to_string()));
                    old_count += 1;
                }
                Op::Insert(ni) => {
                    if new_start_idx.is_none() {
                        new_start_idx = Some(ni);
                    }
                    lines.push(('+', new[ni].to_string()));
                    new_count += 1;
                }
            }
        }
        let old_start = old_start_idx.map(|i| i + 1).unwrap_or(0);
        let new_start = new_start_idx.map(|i| i + 1).unwrap_or(0);
        hunks.push(Hunk {
            old_start,
            old_len: old_count,
            new_start,
            new_len: new_count,
            lines,
        });
    }
    hunks
}

/// A parsed diff: its hunks plus whether either side's final line lacked a
/// trailing newline, per the `\ No newline at end of file` markers.
struct ParsedDiff {
    hunks: Vec<Hunk>,
    old_no_newline: bool,
    new_no_newline: bool,
}

/// Parses a unified diff (as produced by [`produce`]), ignoring the
/// `---`/`+++` header lines. A `\ No newline at end of file` marker is
/// attributed to whichever side(s) the immediately preceding content line
/// belongs to: a `-` line attributes to the old side, a `+` line to the new
/// side, and a context line queues both (old first, matching the order
/// `produce` emits them in), so at most one marker per side is ever
/// attributed per context line.
fn parse_diff(diff: &str) -> ParsedDiff {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;
    let mut pending_sides: Vec<char> = Vec::new();
    let mut old_no_newline = false;
    let mut new_no_newline = false;
    for line in diff.lines() {
        if line.starts_with("--- ") || line.starts_with("+++ ") {
            continue;
        }
        if let Some(rest) = line.strip_prefix("@@ ") {
            if let Some(h) = current.take() {
                hunks.push(h);
            }
            let (old_start, old_len, new_start, new_len) = parse_hunk_header(rest);
            current = Some(Hunk {
                old_start,
                old_len,
                new_start,
                new_len,
                lines: Vec::new(),
            });
            pending_sides.clear();
            continue;
        }
        if line == "\\ No newline at end of file" {
            if !pending_sides.is_empty() {
                match pending_sides.remove(0) {
                    '-' => old_no_newline = true,
                    '+' => new_no_newline = true,
                    _ => {}
                }
            }
            continue;
        }
        if let Some(hunk) = current.as_mut() {
            let mut chars = line.chars();
            let tag = chars.next().unwrap_or(' ');
            let content: String = chars.collect();
            hunk.lines.push((tag, content));
            pending_sides = if tag == ' ' { vec!['-', '+'] } else { vec![tag] };
        }
    }
    if let Some(h) = current.take() {
        hunks.push(h);
    }
    ParsedDiff {
        hunks,
        old_no_newline,
        new_no_newline,
    }
}

fn parse_hunk_header(rest: &str) -> (usize, usize, usize, usize) {
    let rest = rest.trim_end_matches(" @@");
    let mut parts = rest.split(' ');
    let old_part = parts.next().unwrap_or("-1,0").trim_start_matches('-');
    let new_part = parts.next().unwrap_or("+1,0").trim_start_matches('+');
    let (old_start, old_len) = parse_range(old_part);
    let (new_start, new_len) = parse_range(new_part);
    (old_start, old_len, new_start, new_len)
}

fn parse_range(part: &str) -> (usize, usize) {
    let mut split = part.split(',');
    let start = split.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let len = split.next().and_then(|s| s.parse().ok()).unwrap_or(1);
    (start, len)
}

/// Applies `diff` to `current_text`. Tries an exact context match at each
/// hunk's declared position, falling back to a ±`drift`-line search
/// (`EngineConfig::fuzzy_drift_lines`). The new file's trailing-newline
/// state is taken from the diff's own `\ No newline` markers, not from
/// `current_text` (spec §4.3).
pub fn apply(current_text: &str, diff: &str, drift: usize) -> Result<String, Conflict> {
    if diff.is_empty() {
        return Ok(current_text.to_string());
    }
    let (lines, _) = split_lines(current_text);
    let mut lines: Vec<String> = lines.into_iter().map(|s| s.to_string()).collect();
    let parsed = parse_diff(diff);
    let mut line_shift: isize = 0;

    for (hunk_index, hunk) in parsed.hunks.iter().enumerate() {
        let declared_start = (hunk.old_start as isize - 1 + line_shift).max(0) as usize;
        let context_before: Vec<&str> = hunk
            .lines
            .iter()
            .filter(|(tag, _)| *tag != '+')
            .map(|(_, s)| s.as_str())
            .collect();

        let found_at = find_match(&lines, declared_start, &context_before, drift as isize);
        let Some(pos) = found_at else {
            let expected = context_before.join("\n");
            let actual = lines
                .iter()
                .skip(declared_start)
                .take(context_before.len())
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Conflict {
                hunk_index,
                expected,
                actual,
            });
        };

        let new_segment: Vec<String> = hunk
            .lines
            .iter()
            .filter(|(tag, _)| *tag != '-')
            .map(|(_, s)| s.clone())
            .collect();
        lines.splice(pos..pos + context_before.len(), new_segment.clone());
        line_shift += new_segment.len() as isize - context_before.len() as isize;
    }

    let mut out = lines.join("\n");
    if !parsed.new_no_newline {
        out.push('\n');
    }
    Ok(out)
}

/// Applies `diff` to `current_text` strictly: no drift tolerance, no force.
/// Used by chain reconstruction (spec §4.5), where a diff that fails to
/// apply at its exact declared position means the chain is corrupt rather
/// than merely drifted.
pub fn apply_strict(current_text: &str, diff: &str) -> Result<String, Conflict> {
    apply(current_text, diff, 0)
}

/// Searches for `context` in `lines` starting at `declared_start`, trying
/// offsets `0, -1, +1, -2, +2, ...` up to `±drift`.
fn find_match(lines: &[String], declared_start: usize, context: &[&str], drift: isize) -> Option<usize> {
    if context.is_empty() {
        return Some(declared_start.min(lines.len()));
    }
    for offset in 0..=drift {
        for sign in [1, -1] {
            if offset == 0 && sign == -1 {
                continue;
            }
            let candidate = declared_start as isize + offset * sign;
            if candidate < 0 {
                continue;
            }
            let candidate = candidate as usize;
            if candidate + context.len() > lines.len() {
                continue;
            }
            if (0..context.len()).all(|i| lines[candidate + i] == context[i]) {
                return Some(candidate);
            }
        }
    }
    None
}

/// Lossy fallback: reconstructs a file body from a diff by emitting only
/// context and `+` lines, discarding `-` lines and the base text entirely.
/// Used when upstream policy selects the "use template" conflict
/// resolution (spec §4.3).
pub fn force_apply(diff: &str) -> String {
    let parsed = parse_diff(diff);
    let mut out_lines = Vec::new();
    for hunk in &parsed.hunks {
        for (tag, line) in &hunk.lines {
            if *tag != '-' {
                out_lines.push(line.clone());
            }
        }
    }
    out_lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_inputs_yield_empty_diff() {
        let d = produce("a\nb\nc\n", "a\nb\nc\n", "old", "new", 3);
        assert_eq!(d, "");
    }

    #[test]
    fn test_produce_then_apply_roundtrip() {
        let old = "line1\nline2\nline3\nline4\nline5\n";
        let new = "line1\nline2\nCHANGED\nline4\nline5\n";
        let d = produce(old, new, "a", "b", 3);
        assert!(d.contains("@@"));
        let applied = apply(old, &d, 3).unwrap();
        assert_eq!(applied, new);
    }

    #[test]
    fn test_apply_tolerates_small_line_drift() {
        let old = "a\nb\nc\nd\ne\nf\ng\n";
        let new = "a\nb\nc\nCHANGED\ne\nf\ng\n";
        let d = produce(old, new, "a", "b", 3);
        // Shift the file content down by inserting two unrelated lines
        // before the hunk's declared position drifts it within ±3.
        let drifted = "x\ny\na\nb\nc\nd\ne\nf\ng\n";
        let result = apply(drifted, &d, 3);
        assert!(result.is_ok());
        assert!(result.unwrap().contains("CHANGED"));
    }

    #[test]
    fn test_apply_strict_rejects_drift_fuzzy_would_tolerate() {
        let old = "a\nb\nc\nd\ne\nf\ng\n";
        let new = "a\nb\nc\nCHANGED\ne\nf\ng\n";
        let d = produce(old, new, "a", "b", 3);
        let drifted = "x\ny\na\nb\nc\nd\ne\nf\ng\n";
        assert!(apply_strict(drifted, &d).is_err());
        assert!(apply(drifted, &d, 3).is_ok());
    }

    #[test]
    fn test_apply_conflict_on_mismatched_context() {
        let old = "a\nb\nc\n";
        let new = "a\nX\nc\n";
        let d = produce(old, new, "a", "b", 3);
        let unrelated = "totally\ndifferent\ncontent\n";
        let result = apply(unrelated, &d, 3);
        assert!(result.is_err());
    }

    #[test]
    fn test_force_apply_discards_minus_lines() {
        let old = "keep\nold_line\nkeep2\n";
        let new = "keep\nnew_line\nkeep2\n";
        let d = produce(old, new, "a", "b", 3);
        let forced = force_apply(&d);
        assert!(forced.contains("new_line"));
        assert!(!forced.contains("old_line"));
    }

    #[test]
    fn test_no_trailing_newline_marker_roundtrips() {
        let old = "a\nb";
        let new = "a\nc";
        let d = produce(old, new, "a", "b", 3);
        assert!(d.contains("No newline at end of file"));
        let applied = apply(old, &d, 3).unwrap();
        assert_eq!(applied, new);
        assert!(!applied.ends_with('\n'));
    }

    #[test]
    fn test_trailing_newline_only_change_roundtrips() {
        let old = "a\nb\n";
        let new = "a\nb";
        let d = produce(old, new, "a", "b", 3);
        assert!(!d.is_empty());
        assert!(d.contains("No newline at end of file"));
        let applied = apply(old, &d, 3).unwrap();
        assert_eq!(applied, new);
        assert!(!applied.ends_with('\n'));
    }

    #[test]
    fn test_adding_trailing_newline_roundtrips() {
        let old = "a\nb";
        let new = "a\nb\n";
        let d = produce(old, new, "a", "b", 3);
        assert!(!d.is_empty());
        let applied = apply(old, &d, 3).unwrap();
        assert_eq!(applied, new);
        assert!(applied.ends_with('\n'));
    }

    #[test]
    fn test_no_trailing_newline_roundtrips_when_edit_is_far_from_eof() {
        let mut old_lines: Vec<String> = (1..=20).map(|i| format!("l{i}")).collect();
        let old = old_lines.join("\n");
        old_lines[2] = "CHANGED".to_string();
        let new = old_lines.join("\n");
        assert!(!old.ends_with('\n'));
        assert!(!new.ends_with('\n'));

        let d = produce(&old, &new, "a", "b", 3);
        assert!(d.contains("No newline at end of file"));
        let applied = apply(&old, &d, 3).unwrap();
        assert_eq!(applied, new);
        assert!(!applied.ends_with('\n'));
    }
}
