//! Retention policy evaluation
//!
//! Pure functions over a snapshot listing, kept apart from the engine so
//! the policy can be tested without a backend.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};

use crate::models::{RetentionPolicy, SnapshotId, SnapshotSummary};

/// Newest first; equal timestamps fall back to the id so order is stable
///
/// Ids compare with digit runs read as numbers, so a collision suffix
/// `_10` ranks above `_9`.
pub fn newest_first(a: &SnapshotSummary, b: &SnapshotSummary) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| natural_cmp(b.id.as_str(), a.id.as_str()))
}

/// Compare strings treating runs of ASCII digits as numbers
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = take_digits(&mut a);
                let right = take_digits(&mut b);
                let left_trimmed = left.trim_start_matches('0');
                let right_trimmed = right.trim_start_matches('0');
                let order = left_trimmed
                    .len()
                    .cmp(&right_trimmed.len())
                    .then_with(|| left_trimmed.cmp(right_trimmed))
                    .then_with(|| left.len().cmp(&right.len()));
                if order != Ordering::Equal {
                    return order;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    digits
}

/// Sort a listing newest first
pub fn sort_newest_first(snapshots: &mut [SnapshotSummary]) {
    snapshots.sort_by(newest_first);
}

/// Pick the snapshots the policy says must go, oldest first
///
/// A snapshot survives only if it is among the newest `max_count` and no
/// older than `max_age_days`.
pub fn select_expired(
    snapshots: &[SnapshotSummary],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<SnapshotSummary> {
    select_expired_keeping(snapshots, policy, now, None)
}

/// Like `select_expired`, with `fresh` ranked newest and never expired
///
/// `fresh` is the snapshot a backup has just written. Its name stamp can
/// tie with older snapshots from the same second, so the tie is settled
/// in its favour.
pub fn select_expired_keeping(
    snapshots: &[SnapshotSummary],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
    fresh: Option<&SnapshotId>,
) -> Vec<SnapshotSummary> {
    if policy.is_unbounded() {
        return Vec::new();
    }

    let mut sorted = snapshots.to_vec();
    sort_newest_first(&mut sorted);
    if let Some(index) = fresh.and_then(|id| sorted.iter().position(|s| &s.id == id)) {
        let newest = sorted.remove(index);
        sorted.insert(0, newest);
    }

    let cutoff = policy
        .max_age_days
        .map(|days| now - Duration::days(i64::from(days)));

    let mut expired: Vec<SnapshotSummary> = sorted
        .into_iter()
        .enumerate()
        .filter(|(index, snapshot)| {
            let over_count = policy
                .max_count
                .map_or(false, |max| *index >= max as usize);
            let too_old = cutoff.map_or(false, |cutoff| snapshot.created_at < cutoff);
            let is_fresh = fresh.map_or(false, |id| &snapshot.id == id);
            (over_count || too_old) && !is_fresh
        })
        .map(|(_, snapshot)| snapshot)
        .collect();

    expired.reverse();
    expired
}
