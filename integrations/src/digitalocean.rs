//! DigitalOcean API v2 and droplet metadata client.

use crate::cloud::{Action, ActionStatus, CloudProvider, HostInfo, Volume, VolumeCreateRequest};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use xtrasnap_backends::{RetryConfig, retry_with_backoff};
use xtrasnap_core::{Error, Result};

pub const DEFAULT_API_BASE: &str = "https://api.digitalocean.com/v2";
pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254/metadata/v1.json";

#[derive(Debug, Clone)]
pub struct DigitalOceanSettings {
    pub token: String,
    pub api_base: String,
    pub metadata_url: String,
    pub timeout: Duration,
    pub retry: RetryConfig,
    /// Metadata lookups use their own short fixed schedule.
    pub metadata_retry: RetryConfig,
}

impl DigitalOceanSettings {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::quadratic(),
            metadata_retry: RetryConfig::fixed(5, Duration::from_millis(100)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiRegion {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct ApiVolume {
    id: String,
    name: String,
    size_gigabytes: u64,
    #[serde(default)]
    droplet_ids: Option<Vec<u64>>,
    region: ApiRegion,
}

impl From<ApiVolume> for Volume {
    fn from(volume: ApiVolume) -> Self {
        Volume {
            id: volume.id,
            name: volume.name,
            size_gigabytes: volume.size_gigabytes,
            droplet_ids: volume.droplet_ids.unwrap_or_default(),
            region: volume.region.slug,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VolumeEnvelope {
    volume: ApiVolume,
}

#[derive(Debug, Deserialize)]
struct ApiAction {
    id: u64,
    status: String,
}

impl From<ApiAction> for Action {
    fn from(action: ApiAction) -> Self {
        Action {
            id: action.id,
            status: ActionStatus::from_api(&action.status),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActionEnvelope {
    action: ApiAction,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    droplet_id: u64,
    hostname: String,
    region: String,
}

#[derive(Debug, Serialize)]
struct CreateVolumeBody<'a> {
    size_gigabytes: u64,
    name: &'a str,
    description: &'a str,
    region: &'a str,
    filesystem_type: &'a str,
}

#[derive(Debug, Serialize)]
struct VolumeActionBody<'a> {
    #[serde(rename = "type")]
    action_type: &'a str,
    droplet_id: u64,
    region: &'a str,
}

pub struct DigitalOceanClient {
    client: Client,
    settings: DigitalOceanSettings,
}

impl DigitalOceanClient {
    pub fn new(settings: DigitalOceanSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Cloud(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.api_base.trim_end_matches('/'), path)
    }

    /// Retry schedule for `method`. POSTs create volumes or start actions and
    /// are sent exactly once; a resend after a lost response would create a
    /// second volume or a conflicting action.
    fn retry_for(&self, method: &Method) -> RetryConfig {
        if *method == Method::POST {
            RetryConfig::fixed(1, Duration::ZERO)
        } else {
            self.settings.retry.clone()
        }
    }

    /// Sends one API request. Idempotent methods are retried on transient
    /// failures. `None` bodies are returned for `204 No Content`.
    async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Option<T>>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let url = self.url(path);
        let operation = format!("{} {}", method, path);
        let retry = self.retry_for(&method);

        retry_with_backoff(&retry, &operation, || async {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&self.settings.token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Cloud(format!("{} failed: connection error: {}", operation, e)))?;

            let status = response.status();
            if status == StatusCode::NO_CONTENT {
                return Ok(None);
            }

            let text = response
                .text()
                .await
                .map_err(|e| Error::Cloud(format!("{} failed: connection error: {}", operation, e)))?;

            if !status.is_success() {
                return Err(Error::Cloud(format!("{} returned status {}: {}", operation, status, text)));
            }

            debug!(operation = %operation, status = %status, "DigitalOcean API call succeeded");
            serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| Error::Cloud(format!("{} returned an unexpected body: {}", operation, e)))
        })
        .await
    }

    async fn expect_body<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        self.request(method, path, body)
            .await?
            .ok_or_else(|| Error::Cloud(format!("{} returned no body", path)))
    }

    async fn volume_action(&self, volume_id: &str, action_type: &str, droplet_id: u64, region: &str) -> Result<Action> {
        let body = VolumeActionBody {
            action_type,
            droplet_id,
            region,
        };
        let envelope: ActionEnvelope = self
            .expect_body(Method::POST, &format!("/volumes/{}/actions", volume_id), Some(&body))
            .await?;
        Ok(envelope.action.into())
    }
}

#[async_trait]
impl CloudProvider for DigitalOceanClient {
    async fn host_info(&self) -> Result<HostInfo> {
        let metadata: Metadata = retry_with_backoff(&self.settings.metadata_retry, "droplet metadata", || async {
            let response = self
                .client
                .get(&self.settings.metadata_url)
                .send()
                .await
                .map_err(|e| Error::Cloud(format!("Droplet metadata unavailable: connection error: {}", e)))?;

            if !response.status().is_success() {
                return Err(Error::Cloud(format!(
                    "Droplet metadata returned status {}",
                    response.status()
                )));
            }

            response
                .json::<Metadata>()
                .await
                .map_err(|e| Error::Cloud(format!("Droplet metadata unreadable: {}", e)))
        })
        .await?;

        Ok(HostInfo {
            droplet_id: metadata.droplet_id,
            hostname: metadata.hostname,
            region: metadata.region,
        })
    }

    async fn create_volume(&self, request: &VolumeCreateRequest) -> Result<Volume> {
        let body = CreateVolumeBody {
            size_gigabytes: request.size_gigabytes,
            name: &request.name,
            description: &request.description,
            region: &request.region,
            filesystem_type: &request.filesystem_type,
        };
        let envelope: VolumeEnvelope = self.expect_body(Method::POST, "/volumes", Some(&body)).await?;
        Ok(envelope.volume.into())
    }

    async fn get_volume(&self, volume_id: &str) -> Result<Volume> {
        let envelope: VolumeEnvelope = self
            .expect_body::<(), _>(Method::GET, &format!("/volumes/{}", volume_id), None)
            .await?;
        Ok(envelope.volume.into())
    }

    async fn attach_volume(&self, volume_id: &str, droplet_id: u64, region: &str) -> Result<Action> {
        self.volume_action(volume_id, "attach", droplet_id, region).await
    }

    async fn detach_volume(&self, volume_id: &str, droplet_id: u64, region: &str) -> Result<Action> {
        self.volume_action(volume_id, "detach", droplet_id, region).await
    }

    async fn get_action(&self, action_id: u64) -> Result<Action> {
        let envelope: ActionEnvelope = self
            .expect_body::<(), _>(Method::GET, &format!("/actions/{}", action_id), None)
            .await?;
        Ok(envelope.action.into())
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        self.request::<(), serde_json::Value>(Method::DELETE, &format!("/volumes/{}", volume_id), None)
            .await?;
        Ok(())
    }
}
