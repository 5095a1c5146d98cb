use async_trait::async_trait;
use xtrasnap_core::Result;

/// Block-storage volume as reported by the cloud API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub size_gigabytes: u64,
    pub droplet_ids: Vec<u64>,
    pub region: String,
}

impl Volume {
    pub fn is_attached_to(&self, droplet_id: u64) -> bool {
        self.droplet_ids.contains(&droplet_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeCreateRequest {
    pub name: String,
    pub description: String,
    pub size_gigabytes: u64,
    pub region: String,
    pub filesystem_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    InProgress,
    Completed,
    Errored,
}

impl ActionStatus {
    pub fn from_api(status: &str) -> Self {
        match status {
            "completed" => ActionStatus::Completed,
            "errored" => ActionStatus::Errored,
            _ => ActionStatus::InProgress,
        }
    }
}

/// Asynchronous operation started by attach or detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub id: u64,
    pub status: ActionStatus,
}

/// Identity of the droplet this process runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub droplet_id: u64,
    pub hostname: String,
    pub region: String,
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn host_info(&self) -> Result<HostInfo>;

    async fn create_volume(&self, request: &VolumeCreateRequest) -> Result<Volume>;

    async fn get_volume(&self, volume_id: &str) -> Result<Volume>;

    async fn attach_volume(&self, volume_id: &str, droplet_id: u64, region: &str) -> Result<Action>;

    async fn detach_volume(&self, volume_id: &str, droplet_id: u64, region: &str) -> Result<Action>;

    async fn get_action(&self, action_id: u64) -> Result<Action>;

    async fn delete_volume(&self, volume_id: &str) -> Result<()>;
}
