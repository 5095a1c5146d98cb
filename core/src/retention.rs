use crate::catalog::find_relevant_since;
use crate::{BackupRecord, BackupType, RetentionPolicy};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Chooses between a full and an incremental backup.
///
/// An incremental is only possible when xtrabackup left an LSN behind and the
/// remote history still resolves to a restorable chain. The chain's full
/// backup must also be younger than `hours_between_full_backups`; the
/// boundary itself asks for a fresh full.
pub fn decide_backup_type(
    last_lsn: Option<&str>,
    all_backups: &[BackupRecord],
    now: DateTime<Utc>,
    policy: &RetentionPolicy,
) -> BackupType {
    if last_lsn.is_none_or(|lsn| lsn.is_empty()) {
        return BackupType::Full;
    }

    let chain = find_relevant_since(now, all_backups);
    let Some(last_full) = chain.last() else {
        return BackupType::Full;
    };

    // An interval past the representable range never comes due.
    let next_full_due = Duration::try_hours(policy.hours_between_full_backups)
        .and_then(|interval| last_full.created_at.checked_add_signed(interval));
    let due = match next_full_due {
        Some(next_full_due) => next_full_due <= now,
        None => policy.hours_between_full_backups <= 0,
    };

    if due { BackupType::Full } else { BackupType::Incremental }
}

/// Every backup that may be removed at `now`, newest first.
///
/// Whole lineages only: a full backup is kept as long as any incremental
/// built on top of it is inside the retention window.
pub fn find_deletable(
    all_backups: &[BackupRecord],
    now: DateTime<Utc>,
    policy: &RetentionPolicy,
) -> Vec<BackupRecord> {
    // A window reaching before the representable range keeps everything.
    let Some(cutoff) = policy.window().and_then(|window| now.checked_sub_signed(window)) else {
        return Vec::new();
    };

    let mut lineages: BTreeMap<u64, Vec<&BackupRecord>> = BTreeMap::new();
    for backup in all_backups {
        lineages.entry(backup.lineage_id).or_default().push(backup);
    }

    let mut deletable: Vec<BackupRecord> = lineages
        .into_values()
        .filter(|members| members.iter().all(|b| b.created_at <= cutoff))
        .flatten()
        .cloned()
        .collect();

    deletable.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    deletable
}
