//! In-memory stand-ins for the cloud, process, alert, storage and volume ports.

use crate::cloud::{Action, ActionStatus, CloudProvider, HostInfo, Volume, VolumeCreateRequest};
use crate::volume::{VolumeLease, VolumeLifecycle, VolumeRequest};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use xtrasnap_backends::{Backend, LocalBackend, ObjectInfo};
use xtrasnap_core::{Alerter, CommandRunner, CommandSpec, Error, Result};

pub(crate) fn host() -> HostInfo {
    HostInfo {
        droplet_id: 42,
        hostname: "db1".to_string(),
        region: "nyc3".to_string(),
    }
}

#[derive(Default)]
pub(crate) struct FakeCloud {
    pub calls: Mutex<Vec<String>>,
    pub failing: Mutex<HashSet<&'static str>>,
    pub action_statuses: Mutex<VecDeque<ActionStatus>>,
    pub existing: Mutex<Option<Volume>>,
}

impl FakeCloud {
    pub fn failing_on(operation: &'static str) -> Self {
        let cloud = Self::default();
        cloud.failing.lock().unwrap().insert(operation);
        cloud
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str, detail: String) -> Result<()> {
        self.calls.lock().unwrap().push(format!("{} {}", operation, detail).trim_end().to_string());
        if self.failing.lock().unwrap().contains(operation) {
            return Err(Error::Cloud(format!("{} returned status 422 Unprocessable Entity", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    async fn host_info(&self) -> Result<HostInfo> {
        self.record("host_info", String::new())?;
        Ok(host())
    }

    async fn create_volume(&self, request: &VolumeCreateRequest) -> Result<Volume> {
        self.record("create_volume", format!("{} {}", request.name, request.size_gigabytes))?;
        Ok(Volume {
            id: "vol-new".to_string(),
            name: request.name.clone(),
            size_gigabytes: request.size_gigabytes,
            droplet_ids: Vec::new(),
            region: request.region.clone(),
        })
    }

    async fn get_volume(&self, volume_id: &str) -> Result<Volume> {
        self.record("get_volume", volume_id.to_string())?;
        self.existing
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Cloud("get_volume returned status 404 Not Found".to_string()))
    }

    async fn attach_volume(&self, volume_id: &str, droplet_id: u64, _region: &str) -> Result<Action> {
        self.record("attach_volume", format!("{} {}", volume_id, droplet_id))?;
        Ok(Action {
            id: 1,
            status: ActionStatus::InProgress,
        })
    }

    async fn detach_volume(&self, volume_id: &str, droplet_id: u64, _region: &str) -> Result<Action> {
        self.record("detach_volume", format!("{} {}", volume_id, droplet_id))?;
        Ok(Action {
            id: 2,
            status: ActionStatus::InProgress,
        })
    }

    async fn get_action(&self, action_id: u64) -> Result<Action> {
        self.record("get_action", action_id.to_string())?;
        let status = self
            .action_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ActionStatus::Completed);
        Ok(Action { id: action_id, status })
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        self.record("delete_volume", volume_id.to_string())
    }
}

/// Records every command. Programs in `failing` exit non-zero; commands
/// with a stdout file get `stream_contents` written to it when set.
#[derive(Default)]
pub(crate) struct FakeRunner {
    pub commands: Mutex<Vec<String>>,
    pub failing: Mutex<HashSet<String>>,
    pub outputs: Mutex<HashMap<String, String>>,
    /// Files written when a program runs, whether or not it fails.
    pub writes: Mutex<HashMap<String, (PathBuf, String)>>,
    pub stream_contents: Option<Vec<u8>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            stream_contents: Some(b"xbstream-bytes".to_vec()),
            ..Default::default()
        }
    }

    /// Commands succeed without producing their stdout file.
    pub fn without_stream(self) -> Self {
        Self {
            stream_contents: None,
            ..self
        }
    }

    pub fn fail(self, program: &str) -> Self {
        self.failing.lock().unwrap().insert(program.to_string());
        self
    }

    pub fn respond(self, program: &str, output: &str) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .insert(program.to_string(), output.to_string());
        self
    }

    pub fn writes_on(self, program: &str, path: PathBuf, contents: String) -> Self {
        self.writes
            .lock()
            .unwrap()
            .insert(program.to_string(), (path, contents));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|c| c.split_whitespace().next().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &CommandSpec) -> Result<String> {
        self.commands.lock().unwrap().push(command.to_string());

        let write = self.writes.lock().unwrap().get(&command.program).cloned();
        if let Some((path, contents)) = write {
            tokio::fs::write(path, contents).await?;
        }

        if self.failing.lock().unwrap().contains(&command.program) {
            return Err(Error::Command {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
                stderr_tail: format!("{} failed", command.program),
            });
        }

        if let (Some(stdout_file), Some(contents)) = (&command.stdout_file, &self.stream_contents) {
            tokio::fs::write(stdout_file, contents).await?;
        }

        let output = self.outputs.lock().unwrap().get(&command.program).cloned();
        Ok(output.unwrap_or_default())
    }
}

/// A local bucket that can refuse uploads, or refuse deletes after a budget.
pub(crate) struct FakeStore {
    pub inner: LocalBackend,
    pub fail_uploads: bool,
    pub deletes_allowed: Option<usize>,
    pub deletes: Mutex<usize>,
}

impl FakeStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            inner: LocalBackend::new(base_path),
            fail_uploads: false,
            deletes_allowed: None,
            deletes: Mutex::new(0),
        }
    }

    pub fn refusing_uploads(self) -> Self {
        Self {
            fail_uploads: true,
            ..self
        }
    }

    pub fn deleting_at_most(self, count: usize) -> Self {
        Self {
            deletes_allowed: Some(count),
            ..self
        }
    }
}

#[async_trait]
impl Backend for FakeStore {
    async fn put_file(&self, path: &str, source: &Path) -> Result<u64> {
        if self.fail_uploads {
            return Err(Error::Backend(format!("Failed to write {}: access denied", path)));
        }
        self.inner.put_file(path, source).await
    }

    async fn get_file(&self, path: &str, destination: &Path) -> Result<u64> {
        self.inner.get_file(path, destination).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        {
            let mut deletes = self.deletes.lock().unwrap();
            if self.deletes_allowed.is_some_and(|allowed| *deletes >= allowed) {
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

#[derive(Default)]
pub(crate) struct RecordingAlerter {
    pub errors: Mutex<Vec<String>>,
    pub notifications: Mutex<Vec<String>>,
}

impl RecordingAlerter {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl Alerter for RecordingAlerter {
    async fn alert_error(&self, message: &str, error: &(dyn std::error::Error + Send + Sync)) {
        self.errors.lock().unwrap().push(format!("{}: {}", message, error));
    }

    async fn notify(&self, message: &str) {
        self.notifications.lock().unwrap().push(message.to_string());
    }
}

/// Hands out a fixed directory as the mounted volume and counts teardowns.
pub(crate) struct FakeVolumes {
    pub mount_dir: PathBuf,
    pub fail_provision: bool,
    pub requests: Mutex<Vec<VolumeRequest>>,
    pub teardowns: Mutex<usize>,
}

impl FakeVolumes {
    pub fn new(mount_dir: PathBuf) -> Self {
        Self {
            mount_dir,
            fail_provision: false,
            requests: Mutex::new(Vec::new()),
            teardowns: Mutex::new(0),
        }
    }

    pub fn failing(mount_dir: PathBuf) -> Self {
        Self {
            fail_provision: true,
            ..Self::new(mount_dir)
        }
    }

    pub fn teardowns(&self) -> usize {
        *self.teardowns.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<VolumeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VolumeLifecycle for FakeVolumes {
    async fn provision_and_mount(&self, request: &VolumeRequest, lease: &mut VolumeLease) -> Result<PathBuf> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_provision {
            return Err(Error::Cloud("create_volume returned status 422 Unprocessable Entity".to_string()));
        }
        tokio::fs::create_dir_all(&self.mount_dir).await?;
        lease.mount_path = Some(self.mount_dir.clone());
        lease.owned = true;
        Ok(self.mount_dir.clone())
    }

    async fn teardown(&self, _lease: &VolumeLease) -> Result<()> {
        *self.teardowns.lock().unwrap() += 1;
        Ok(())
    }
}
