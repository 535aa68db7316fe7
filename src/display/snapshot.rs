//! Snapshot display formatting
//!
//! Formats snapshot listings, backup contents and provider status.

use chrono::{DateTime, Utc};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::{format_duration, format_size};
use crate::engine::naming::display_name;
use crate::models::{BackupDetails, SnapshotSummary};
use crate::services::StatusReport;

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Created (UTC)")]
    created: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Size")]
    size: String,
}

/// Format a snapshot listing, newest first as given
pub fn format_snapshot_list(
    snapshots: &[SnapshotSummary],
    now: DateTime<Utc>,
    verbose: bool,
) -> String {
    if snapshots.is_empty() {
        return "No backups found.\nCreate one with: cloudstash backup create".to_string();
    }

    let mut output = if verbose {
        snapshots
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mut block = format!(
                    "{}. {}\n   Id: {}\n   Created: {}\n   Size: {}\n   Age: {}\n",
                    i + 1,
                    s.name,
                    s.id,
                    s.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    format_size(s.size_bytes),
                    format_duration(now - s.created_at),
                );
                if let Some(description) = &s.description {
                    block.push_str(&format!("   Description: {}\n", description));
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        let rows = snapshots.iter().enumerate().map(|(i, s)| SnapshotRow {
            index: i + 1,
            name: display_name(&s.name).to_string(),
            created: s.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            age: format_duration(now - s.created_at),
            size: format_size(s.size_bytes),
        });
        let mut table = Table::new(rows);
        table.with(Style::psql());
        format!("{}\n", table)
    };

    output.push_str(&format!("\nTotal: {} backup(s)", snapshots.len()));
    output
}

/// Format the contents of one backup
pub fn format_details(summary: &SnapshotSummary, details: &BackupDetails) -> String {
    let mut output = String::new();
    output.push_str("Backup Details\n");
    output.push_str("==============\n");
    output.push_str(&format!("Name: {}\n", summary.name));
    output.push_str(&format!("Id: {}\n", summary.id));
    output.push_str(&format!("Size: {}\n", format_size(summary.size_bytes)));
    output.push_str(&format!(
        "Created: {}\n",
        summary.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(info) = &details.info {
        if let Some(version) = &info.version {
            output.push_str(&format!("Format version: {}\n", version));
        }
    }
    output.push('\n');
    output.push_str("Contents:\n");
    output.push_str(&format!("  Products: {}\n", details.total_products));
    output.push_str(&format!("  Sales:    {}\n", details.total_sales));
    output.push_str(&format!(
        "  Settings: {}\n",
        if details.has_settings { "Yes" } else { "No" }
    ));
    output
}

/// Format the provider status report
pub fn format_status(report: &StatusReport, now: DateTime<Utc>) -> String {
    let mut output = format!("Provider: {}\n", report.backend);

    if !report.signed_in {
        output.push_str("Signed in: No\n");
        output.push_str("Sign in with: cloudstash auth login\n");
        return output;
    }

    output.push_str("Signed in: Yes\n");
    if let Some(account) = &report.account {
        output.push_str(&format!("Account: {}\n", account));
    }
    if let Some(container) = &report.container {
        output.push_str(&format!("Container: {}\n", container));
    }
    output.push_str(&format!("Retention: {}\n", report.retention.describe()));
    output.push_str(&format!("Backups: {}\n", report.snapshot_count));
    if let Some(latest) = &report.latest {
        output.push_str(&format!(
            "Latest: {} ({} ago)\n",
            latest.name,
            format_duration(now - latest.created_at)
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RetentionPolicy, SnapshotId};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    fn summary(name: &str, age: Duration) -> SnapshotSummary {
        SnapshotSummary {
            id: SnapshotId::new(format!("id-{}", name)),
            name: format!("{}.json", name),
            created_at: now() - age,
            size_bytes: 2048,
            description: Some("Shop backup".into()),
        }
    }

    #[test]
    fn test_empty_list() {
        assert!(format_snapshot_list(&[], now(), false).starts_with("No backups found."));
    }

    #[test]
    fn test_table_list() {
        let out = format_snapshot_list(
            &[
                summary("shop_backup_b", Duration::hours(2)),
                summary("shop_backup_a", Duration::days(3)),
            ],
            now(),
            false,
        );
        assert!(out.contains("shop_backup_b"));
        assert!(out.contains("2h"));
        assert!(out.contains("3d"));
        assert!(out.contains("2.0 KB"));
        assert!(out.ends_with("Total: 2 backup(s)"));
    }

    #[test]
    fn test_verbose_list_shows_ids() {
        let out = format_snapshot_list(&[summary("x", Duration::minutes(1))], now(), true);
        assert!(out.contains("Id: id-x"));
        assert!(out.contains("Description: Shop backup"));
    }

    #[test]
    fn test_status_signed_out() {
        let report = StatusReport {
            backend: "gist",
            signed_in: false,
            account: None,
            container: None,
            snapshot_count: 0,
            latest: None,
            retention: RetentionPolicy::keep_last(10),
        };
        let out = format_status(&report, now());
        assert!(out.contains("Signed in: No"));
        assert!(!out.contains("Retention"));
    }
}
