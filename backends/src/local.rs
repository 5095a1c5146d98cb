use crate::backend::{Backend, ObjectInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use xtrasnap_core::{Error, Result};

/// Stores objects as plain files below a base directory.
pub struct LocalBackend {
    base_path: PathBuf,
}

impl LocalBackend {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    async fn object_info(&self, path: &str, full_path: &Path) -> Result<ObjectInfo> {
        let metadata = fs::metadata(full_path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to stat {}: {}", path, e)))?;

        let modified = metadata
            .modified()
            .map_err(|e| Error::Backend(format!("Failed to get modified time: {}", e)))?;
        let modified: DateTime<Utc> = modified.into();

        Ok(ObjectInfo {
            path: path.to_string(),
            size: metadata.len(),
            modified,
        })
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn put_file(&self, path: &str, source: &Path) -> Result<u64> {
        let full_path = self.full_path(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(source, &full_path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to write {}: {}", path, e)))
    }

    async fn get_file(&self, path: &str, destination: &Path) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(self.full_path(path), destination)
            .await
            .map_err(|e| Error::Backend(format!("Failed to read {}: {}", path, e)))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        if full_path.is_file() {
            fs::remove_file(&full_path)
                .await
                .map_err(|e| Error::Backend(format!("Failed to delete {}: {}", path, e)))?;
        }
        Ok(())
    }

    /// Keys are `<dir>/<name>`; the prefix is matched against the file name
    /// part below its directory.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let (dir, name_prefix) = prefix.rsplit_once('/').unwrap_or(("", prefix));
        let full_path = self.full_path(dir);
        let mut results = Vec::new();

        if full_path.is_dir() {
            let mut entries = fs::read_dir(&full_path).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_file() {
                    continue;
                }
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if !name.starts_with(name_prefix) {
                    continue;
                }
                let key = if dir.is_empty() {
                    name
                } else {
                    format!("{}/{}", dir, name)
                };
                results.push(self.object_info(&key, &entry.path()).await?);
            }
        }

        results.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(results)
    }

    async fn stat(&self, path: &str) -> Result<ObjectInfo> {
        self.object_info(path, &self.full_path(path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_list_get_delete() {
        let store_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(store_dir.path().join("bucket"));

        let source = work_dir.path().join("stream");
        fs::write(&source, b"0123456789").await.unwrap();

        let sent = backend
            .put_file("db1/mysql-backup-201901011000.full.xbstream", &source)
            .await
            .unwrap();
        assert_eq!(sent, 10);
        backend.put_file("db2/other", &source).await.unwrap();

        let listed = backend.list("db1/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "db1/mysql-backup-201901011000.full.xbstream");
        assert_eq!(listed[0].size, 10);

        let destination = work_dir.path().join("restore/0/backup.xbstream");
        backend
            .get_file("db1/mysql-backup-201901011000.full.xbstream", &destination)
            .await
            .unwrap();
        assert_eq!(fs::read(&destination).await.unwrap(), b"0123456789");

        backend
            .delete("db1/mysql-backup-201901011000.full.xbstream")
            .await
            .unwrap();
        assert!(backend.list("db1/").await.unwrap().is_empty());
        assert!(backend.stat("db1/mysql-backup-201901011000.full.xbstream").await.is_err());
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let store_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(store_dir.path());
        assert!(backend.list("nobody/").await.unwrap().is_empty());
    }
}
