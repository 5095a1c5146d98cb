pub mod backend;
pub mod catalog;
pub mod local;
pub mod retry;
pub mod s3;

pub use backend::{Backend, ObjectInfo};
pub use catalog::{Listing, PruneFailure, list_all, prune};
pub use local::LocalBackend;
pub use retry::{Backoff, RetryConfig, Retryable, retry_with_backoff, wait_until};
pub use s3::{S3Backend, S3Config};
