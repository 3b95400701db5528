//! Migration identifier and timestamp helpers.
//!
//! Migration identifiers must be lex-sortable identical to chronological
//! order, so they are derived from an ISO-8601 timestamp with
//! filesystem-unsafe characters stripped, not from a ULID or a counter.

use std::time::{SystemTime, UNIX_EPOCH};

const DAYS_IN_MONTH: [u64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Formats a unix timestamp (seconds) as a filesystem-safe, lex-sortable
/// identifier, e.g. seconds for 2026-02-25T00:00:00Z becomes `20260225T000000Z`.
fn format_migration_id(unix_secs: u64) -> String {
    let days_total = unix_secs / 86_400;
    let secs_of_day = unix_secs % 86_400;
    let hour = secs_of_day / 3_600;
    let minute = (secs_of_day % 3_600) / 60;
    let second = secs_of_day % 60;

    let mut year = 1970u64;
    let mut remaining_days = days_total;
    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < days_in_year {
            break;
        }
        remaining_days -= days_in_year;
        year += 1;
    }

    let leap = is_leap_year(year);
    let mut month = 1u64;
    for (idx, &len) in DAYS_IN_MONTH.iter().enumerate() {
        let len = if idx == 1 && leap { len + 1 } else { len };
        if remaining_days < len {
            break;
        }
        remaining_days -= len;
        month += 1;
    }
    let day = remaining_days + 1;

    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        year, month, day, hour, minute, second
    )
}

fn is_leap_year(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Returns the current time as a migration identifier.
pub fn migration_id_now() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_migration_id(secs)
}

/// Returns a migration identifier guaranteed strictly greater than every
/// id in `existing`, by disambiguating with a monotonic `-N` suffix if the
/// current timestamp collides with (or sorts at or below) the latest
/// existing identifier.
pub fn next_migration_id(existing: &[String]) -> String {
    let base = migration_id_now();
    match existing.iter().max() {
        Some(latest) if latest.as_str() >= base.as_str() => {
            let stripped_latest = latest.split('-').next().unwrap_or(latest.as_str());
            let mut attempt = 1u32;
            loop {
                let candidate = format!("{}-{}", stripped_latest, attempt);
                if existing.iter().all(|e| e.as_str() < candidate.as_str()) {
                    return candidate;
                }
                attempt += 1;
            }
        }
        _ => base,
    }
}

/// Returns the current time as the same ISO-8601-derived string used for
/// migration ids; audit log entries reuse this for `ts` fields.
pub fn now_iso() -> String {
    migration_id_now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_migration_id_epoch() {
        assert_eq!(format_migration_id(0), "19700101T000000Z");
    }

    #[test]
    fn test_format_migration_id_leap_day() {
        let secs = 1_709_164_800; // 2024-02-29T00:00:00Z
        assert_eq!(format_migration_id(secs), "20240229T000000Z");
    }

    #[test]
    fn test_migration_id_now_is_lex_sortable_format() {
        let id = migration_id_now();
        assert_eq!(id.len(), 16);
        assert!(id.ends_with('Z'));
        assert!(id.contains('T'));
    }

    #[test]
    fn test_next_migration_id_disambiguates_on_collision() {
        let id = migration_id_now();
        let existing = vec![id.clone()];
        let next = next_migration_id(&existing);
        assert!(next.as_str() > id.as_str());
        assert!(next.starts_with(&id));
    }

    #[test]
    fn test_next_migration_id_no_collision_returns_base() {
        let existing = vec!["19700101T000000Z".to_string()];
        let next = next_migration_id(&existing);
        assert!(next.as_str() > "19700101T000000Z");
    }
}
