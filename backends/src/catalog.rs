//! Backup catalog operations that need the object store.

use crate::backend::Backend;
use thiserror::Error;
use tracing::{info, warn};
use xtrasnap_core::catalog::{assign_lineages, record_from_object, sort_by_created_at};
use xtrasnap_core::{BackupRecord, Error, Result};

/// Parsed backups of one host, oldest first with lineages assigned.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub records: Vec<BackupRecord>,
    /// Keys below the host prefix that are not backup names.
    pub discarded: Vec<String>,
}

pub async fn list_all(backend: &dyn Backend, hostname: &str) -> Result<Listing> {
    let prefix = format!("{}/", hostname.trim_end_matches('/'));
    let objects = backend.list(&prefix).await?;

    let mut listing = Listing::default();
    for object in objects {
        match record_from_object(&object.path, object.size) {
            Ok(record) => listing.records.push(record),
            Err(e) => {
                warn!(key = %object.path, error = %e, "Ignoring object that is not a backup");
                listing.discarded.push(object.path);
            }
        }
    }

    if !listing.discarded.is_empty() {
        warn!(
            discarded = listing.discarded.len(),
            prefix = %prefix,
            "Some objects were left out of the backup listing"
        );
    }

    sort_by_created_at(&mut listing.records);
    assign_lineages(&mut listing.records);
    Ok(listing)
}

/// A prune that stopped part way.
#[derive(Debug, Error)]
#[error("Pruning stopped after deleting {} backup(s): {error}", .deleted.len())]
pub struct PruneFailure {
    pub deleted: Vec<BackupRecord>,
    #[source]
    pub error: Error,
}

/// Deletes `records` in order, stopping at the first failure.
pub async fn prune(
    records: &[BackupRecord],
    backend: &dyn Backend,
) -> std::result::Result<Vec<BackupRecord>, PruneFailure> {
    let mut deleted = Vec::with_capacity(records.len());

    for record in records {
        if let Err(error) = backend.delete(&record.path).await {
            return Err(PruneFailure { deleted, error });
        }
        info!(path = %record.path, size = record.size, "Deleted backup");
        deleted.push(record.clone());
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ObjectInfo;
    use crate::local::LocalBackend;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    /// Fails every delete after the first `allowed`.
    struct FlakyBackend {
        inner: LocalBackend,
        allowed: usize,
        deletes: Mutex<usize>,
    }

    impl FlakyBackend {
        fn new(base: &Path, allowed: usize) -> Self {
            Self {
                inner: LocalBackend::new(base),
                allowed,
                deletes: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Backend for FlakyBackend {
        async fn put_file(&self, path: &str, source: &Path) -> Result<u64> {
            self.inner.put_file(path, source).await
        }

        async fn get_file(&self, path: &str, destination: &Path) -> Result<u64> {
            self.inner.get_file(path, destination).await
        }

        async fn delete(&self, path: &str) -> Result<()> {
            {
                let mut deletes = self.deletes.lock().unwrap();
                if *deletes >= self.allowed {
                    return Err(Error::Backend(format!("Failed to delete {}: access denied", path)));
                }
                *deletes += 1;
            }
            self.inner.delete(path).await
        }

        async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
            self.inner.list(prefix).await
        }

        async fn stat(&self, path: &str) -> Result<ObjectInfo> {
            self.inner.stat(path).await
        }
    }

    async fn seed(backend: &dyn Backend, work: &Path, objects: &[(&str, usize)]) {
        for (i, (key, size)) in objects.iter().enumerate() {
            let source = work.join(format!("seed-{}", i));
            tokio::fs::write(&source, vec![0u8; *size]).await.unwrap();
            backend.put_file(key, &source).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_list_all_assigns_lineages_and_discards_junk() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(store.path());

        seed(
            &backend,
            work.path(),
            &[
                ("db1/mysql-backup-201901031000.incremental.xbstream", 3),
                ("db1/mysql-backup-201901011000.full.xbstream", 1),
                ("db1/mysql-backup-201901021000.incremental.xbstream", 2),
                ("db1/mysql-backup-201901041000.full.xbstream", 4),
                ("db1/notes.txt", 5),
                ("db1/mysql-backup-201901051000.weekly.xbstream", 6),
                ("db2/mysql-backup-201901011000.full.xbstream", 7),
            ],
        )
        .await;

        let listing = list_all(&backend, "db1").await.unwrap();
        let summary: Vec<(u64, u64)> = listing.records.iter().map(|r| (r.size, r.lineage_id)).collect();
        assert_eq!(summary, vec![(1, 1), (2, 1), (3, 1), (4, 2)]);
        assert_eq!(listing.discarded.len(), 2);
        assert!(listing.discarded.contains(&"db1/notes.txt".to_string()));
    }

    #[tokio::test]
    async fn test_prune_deletes_in_order() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(store.path());
        seed(
            &backend,
            work.path(),
            &[
                ("db1/mysql-backup-201901011000.full.xbstream", 1),
                ("db1/mysql-backup-201901021000.incremental.xbstream", 2),
                ("db1/mysql-backup-201901031000.full.xbstream", 3),
            ],
        )
        .await;

        let listing = list_all(&backend, "db1").await.unwrap();
        let mut doomed: Vec<_> = listing.records[..2].to_vec();
        doomed.reverse();

        let deleted = prune(&doomed, &backend).await.unwrap();
        assert_eq!(deleted, doomed);

        let remaining = list_all(&backend, "db1").await.unwrap();
        assert_eq!(remaining.records.len(), 1);
        assert_eq!(remaining.records[0].size, 3);
    }

    #[tokio::test]
    async fn test_prune_reports_partial_failure() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let backend = FlakyBackend::new(store.path(), 1);
        seed(
            &backend,
            work.path(),
            &[
                ("db1/mysql-backup-201901011000.full.xbstream", 1),
                ("db1/mysql-backup-201901021000.incremental.xbstream", 2),
                ("db1/mysql-backup-201901031000.incremental.xbstream", 3),
            ],
        )
        .await;

        let mut doomed = list_all(&backend, "db1").await.unwrap().records;
        doomed.reverse();

        let failure = prune(&doomed, &backend).await.unwrap_err();
        assert_eq!(failure.deleted.len(), 1);
        assert_eq!(failure.deleted[0].size, 3);
        assert!(matches!(failure.error, Error::Backend(_)));
        assert!(failure.to_string().starts_with("Pruning stopped after deleting 1 backup(s)"));
    }

    #[tokio::test]
    async fn test_prune_nothing() {
        let store = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(store.path());
        assert!(prune(&[], &backend).await.unwrap().is_empty());
    }
}
