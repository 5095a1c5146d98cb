use async_trait::async_trait;
use std::path::Path;
use xtrasnap_core::Result;

/// Object store holding the uploaded backup streams.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Uploads a local file and returns the number of bytes sent.
    async fn put_file(&self, path: &str, source: &Path) -> Result<u64>;

    /// Downloads an object into `destination`, replacing any existing file.
    async fn get_file(&self, path: &str, destination: &Path) -> Result<u64>;

    async fn delete(&self, path: &str) -> Result<()>;

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    async fn stat(&self, path: &str) -> Result<ObjectInfo>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub path: String,
    pub size: u64,
    pub modified: chrono::DateTime<chrono::Utc>,
}
