use crate::backend::{Backend, ObjectInfo};
use crate::retry::{RetryConfig, retry_with_backoff};
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Builder as S3ConfigBuilder, Credentials},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use xtrasnap_core::{Error, Result};

/// Connection settings for an S3-compatible store such as Spaces.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub prefix: String,
    pub multipart_threshold: u64,
    pub part_size: usize,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            region: "us-east-1".to_string(),
            prefix: String::new(),
            multipart_threshold: 64 * 1024 * 1024,
            part_size: 16 * 1024 * 1024,
        }
    }
}

/// Spaces endpoints are usually configured as a bare host name.
pub fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}

pub struct S3Backend {
    client: Client,
    config: S3Config,
    retry: RetryConfig,
}

impl S3Backend {
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "xtrasnap-static",
        );

        let s3_config = S3ConfigBuilder::new()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .endpoint_url(normalize_endpoint(&config.endpoint))
            .build();

        Self {
            client: Client::from_conf(s3_config),
            config,
            retry: RetryConfig::default(),
        }
    }

    fn full_key(&self, path: &str) -> String {
        if self.config.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.config.prefix, path)
        }
    }

    fn strip_prefix(&self, key: String) -> String {
        if self.config.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&format!("{}/", self.config.prefix))
                .map(str::to_string)
                .unwrap_or(key)
        }
    }

    async fn simple_upload(&self, key: &str, source: &Path) -> Result<()> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| Error::Backend(format!("Failed to open {}: {}", source.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to write {}: {}", key, e)))?;
        Ok(())
    }

    async fn multipart_upload(&self, key: &str, source: &Path) -> Result<()> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to start upload of {}: {}", key, e)))?;

        let upload_id = create_response
            .upload_id()
            .ok_or_else(|| Error::Backend("No upload ID returned".to_string()))?
            .to_string();

        match self.upload_parts(key, &upload_id, source).await {
            Ok(completed_parts) => {
                let completed_upload = CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build();

                self.client
                    .complete_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed_upload)
                    .send()
                    .await
                    .map_err(|e| Error::Backend(format!("Failed to complete upload of {}: {}", key, e)))?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort_error) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key, error = %abort_error, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(&self, key: &str, upload_id: &str, source: &Path) -> Result<Vec<CompletedPart>> {
        let mut file = File::open(source).await?;
        let mut completed_parts = Vec::new();
        let mut part_number: i32 = 1;

        loop {
            let mut buffer = Vec::with_capacity(self.config.part_size);
            (&mut file)
                .take(self.config.part_size as u64)
                .read_to_end(&mut buffer)
                .await?;
            if buffer.is_empty() {
                break;
            }

            let chunk = Bytes::from(buffer);
            let checksum = BASE64.encode(md5::compute(&chunk).as_ref());

            let part_response = retry_with_backoff(&self.retry, "upload_part", || async {
                self.client
                    .upload_part()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .content_md5(&checksum)
                    .body(ByteStream::from(chunk.clone()))
                    .send()
                    .await
                    .map_err(|e| Error::Backend(format!("Failed to upload part {} of {}: {}", part_number, key, e)))
            })
            .await?;

            debug!(key, part_number, bytes = chunk.len(), "Uploaded part");
            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(part_response.e_tag().unwrap_or_default())
                    .build(),
            );
            part_number += 1;
        }

        Ok(completed_parts)
    }
}

#[async_trait]
impl Backend for S3Backend {
    async fn put_file(&self, path: &str, source: &Path) -> Result<u64> {
        let size = fs::metadata(source).await?.len();
        let key = self.full_key(path);

        if size > self.config.multipart_threshold {
            info!(key = %key, size, "Uploading with multipart upload");
            self.multipart_upload(&key, source).await?;
        } else {
            self.simple_upload(&key, source).await?;
        }

        Ok(size)
    }

    async fn get_file(&self, path: &str, destination: &Path) -> Result<u64> {
        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(self.full_key(path))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to read {}: {}", path, e)))?;

        let mut file = File::create(destination).await?;
        let mut body = response.body.into_async_read();
        let written = tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| Error::Backend(format!("Failed to download {}: {}", path, e)))?;
        Ok(written)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(self.full_key(path))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to delete {}: {}", path, e)))?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let full_prefix = self.full_key(prefix);
        let mut results = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .prefix(&full_prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Backend(format!("Failed to list: {}", e)))?;

            for object in response.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                let modified = object
                    .last_modified()
                    .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), 0))
                    .unwrap_or_else(chrono::Utc::now);

                results.push(ObjectInfo {
                    path: self.strip_prefix(key.to_string()),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    modified,
                });
            }

            if response.is_truncated().unwrap_or(false) {
                continuation_token = response.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(results)
    }

    async fn stat(&self, path: &str) -> Result<ObjectInfo> {
        let response = self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(self.full_key(path))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to stat {}: {}", path, e)))?;

        let size = response.content_length.unwrap_or(0).max(0) as u64;
        let modified = response
            .last_modified
            .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), 0))
            .unwrap_or_else(chrono::Utc::now);

        Ok(ObjectInfo {
            path: path.to_string(),
            size,
            modified,
        })
    }
}
