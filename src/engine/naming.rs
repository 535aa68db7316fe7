//! Backup entry naming
//!
//! Entries are named `<prefix>_<timestamp>[_<label>].json` where the
//! timestamp is ISO-8601 at second precision with `:` and `.` replaced by
//! `-`, e.g. `shop_backup_2025-11-27T14-30-22Z_pre_restore.json`.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// File extension of every entry
pub const ENTRY_EXTENSION: &str = ".json";

/// Build the entry name for a backup taken at `timestamp`
pub fn entry_name(prefix: &str, timestamp: DateTime<Utc>, label: Option<&str>) -> String {
    let stamp = timestamp
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
        .replace([':', '.'], "-");

    match label.map(sanitize_label).filter(|l| !l.is_empty()) {
        Some(label) => format!("{}_{}_{}{}", prefix, stamp, label, ENTRY_EXTENSION),
        None => format!("{}_{}{}", prefix, stamp, ENTRY_EXTENSION),
    }
}

/// Replace every character that is not an ASCII letter or digit with `_`
pub fn sanitize_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Check if `name` follows the entry naming convention for `prefix`
pub fn is_backup_entry(prefix: &str, name: &str) -> bool {
    name.len() > prefix.len() + 1
        && name.starts_with(prefix)
        && name[prefix.len()..].starts_with('_')
        && name.ends_with(ENTRY_EXTENSION)
}

/// Recover the creation time encoded in an entry name
///
/// Accepts both the second-precision form and names carrying milliseconds
/// (`2025-11-27T14-30-22-456Z`).
pub fn parse_entry_timestamp(prefix: &str, name: &str) -> Option<DateTime<Utc>> {
    if !is_backup_entry(prefix, name) {
        return None;
    }
    parse_stamp(&name[prefix.len() + 1..])
}

/// Like `parse_entry_timestamp`, for when the prefix is not known
///
/// Tries the text after each `_` in turn.
pub fn entry_timestamp(name: &str) -> Option<DateTime<Utc>> {
    name.match_indices('_')
        .find_map(|(i, _)| parse_stamp(&name[i + 1..]))
}

fn parse_stamp(rest: &str) -> Option<DateTime<Utc>> {
    let end = rest.find('Z')?;
    let stamp = &rest[..end];
    if !stamp.is_ascii() {
        return None;
    }

    // YYYY-MM-DDTHH-MM-SS is 19 characters
    let (base, millis) = match stamp.len() {
        19 => (stamp, 0),
        23 if stamp.as_bytes()[19] == b'-' => (&stamp[..19], stamp[20..].parse::<i64>().ok()?),
        _ => return None,
    };

    let naive = NaiveDateTime::parse_from_str(base, "%Y-%m-%dT%H-%M-%S").ok()?;
    Some(naive.and_utc() + Duration::milliseconds(millis))
}

/// Sharpen a name stamp with a finer reading of the same moment
///
/// Names only carry whole seconds. `precise` replaces the stamp when it
/// falls inside that second, so entries written in the same second keep
/// their real order.
pub fn refine_stamp(stamp: DateTime<Utc>, precise: DateTime<Utc>) -> DateTime<Utc> {
    if precise >= stamp && precise < stamp + Duration::seconds(1) {
        precise
    } else {
        stamp
    }
}

/// Strip the extension for display
pub fn display_name(name: &str) -> &str {
    name.strip_suffix(ENTRY_EXTENSION).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 27, 14, 30, 22).unwrap() + Duration::milliseconds(456)
    }

    #[test]
    fn test_entry_name_without_label() {
        assert_eq!(
            entry_name("shop_backup", at(), None),
            "shop_backup_2025-11-27T14-30-22Z.json"
        );
    }

    #[test]
    fn test_entry_name_with_sanitized_label() {
        assert_eq!(
            entry_name("shop_backup", at(), Some("antes da promoção!")),
            "shop_backup_2025-11-27T14-30-22Z_antes_da_promo__o_.json"
        );
        assert_eq!(
            entry_name("shop_backup", at(), Some("pre_restore")),
            "shop_backup_2025-11-27T14-30-22Z_pre_restore.json"
        );
    }

    #[test]
    fn test_blank_label_is_omitted() {
        assert_eq!(
            entry_name("shop_backup", at(), Some("   ")),
            "shop_backup_2025-11-27T14-30-22Z.json"
        );
    }

    #[test]
    fn test_parse_entry_timestamp() {
        let name = entry_name("shop_backup", at(), Some("auto"));
        let ts = parse_entry_timestamp("shop_backup", &name).unwrap();
        assert_eq!(ts.year(), 2025);
        assert_eq!(ts.month(), 11);
        assert_eq!(ts.day(), 27);
        assert_eq!(ts.second(), 22);
        assert_eq!(ts.timestamp_subsec_millis(), 0);
    }

    #[test]
    fn test_parse_entry_timestamp_with_millis() {
        let ts = parse_entry_timestamp(
            "camarim_backup",
            "camarim_backup_2025-11-27T14-30-22-456Z_auto_auto.json",
        )
        .unwrap();
        assert_eq!(ts, at());
    }

    #[test]
    fn test_entry_timestamp_without_prefix() {
        assert_eq!(
            entry_timestamp("any_prefix_2025-11-27T14-30-22-456Z_x.json"),
            Some(at())
        );
        assert!(entry_timestamp("notes_about_things.json").is_none());
    }

    #[test]
    fn test_foreign_names_rejected() {
        assert!(!is_backup_entry("shop_backup", "README.md"));
        assert!(!is_backup_entry("shop_backup", "shop_backup.json"));
        assert!(!is_backup_entry("shop_backup", "shop_backupX_2025.json"));
        assert!(parse_entry_timestamp("shop_backup", "shop_backup_garbage.json").is_none());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("shop_backup_x.json"), "shop_backup_x");
        assert_eq!(display_name("other"), "other");
    }

    #[test]
    fn test_refine_stamp_stays_inside_the_second() {
        let stamp = Utc.with_ymd_and_hms(2025, 11, 27, 14, 30, 22).unwrap();

        assert_eq!(refine_stamp(stamp, at()), at());
        assert_eq!(refine_stamp(stamp, stamp + Duration::seconds(1)), stamp);
        assert_eq!(refine_stamp(stamp, stamp - Duration::milliseconds(1)), stamp);
    }
}
