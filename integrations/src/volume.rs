//! Block-storage volumes that hold backup streams and restore workspaces.
//!
//! A volume goes through create (or lookup), attach, mount, use, unmount,
//! detach and destroy. Everything obtained on the way is recorded in a
//! [`VolumeLease`] right away, so `teardown` can undo a half-finished
//! provisioning.

use crate::cloud::{Action, ActionStatus, CloudProvider, HostInfo, Volume, VolumeCreateRequest};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};
use xtrasnap_backends::wait_until;
use xtrasnap_core::catalog::format_timestamp;
use xtrasnap_core::{Alerter, CommandRunner, CommandSpec, Error, Result};

pub const BACKUP_VOLUME_PREFIX: &str = "mysql-backup-";
pub const RESTORE_VOLUME_PREFIX: &str = "mysql-restore-";

const GIB: u64 = 1 << 30;

/// Whole GiB needed to hold `bytes`, never less than one.
pub fn gigabytes_for(bytes: u64) -> u64 {
    bytes.div_ceil(GIB).max(1)
}

#[derive(Debug, Clone)]
pub struct VolumeSettings {
    pub mount_root: PathBuf,
    pub device_prefix: String,
    pub filesystem_type: String,
    pub mount_options: String,
    pub action_poll_interval: Duration,
    pub action_deadline: Duration,
    /// Pause after attaching before the device is mounted.
    pub settle_time: Duration,
    pub mount_table: PathBuf,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from("/mnt"),
            device_prefix: "/dev/disk/by-id/scsi-0DO_Volume_".to_string(),
            filesystem_type: "ext4".to_string(),
            mount_options: "discard,defaults,noatime".to_string(),
            action_poll_interval: Duration::from_secs(15),
            action_deadline: Duration::from_secs(150),
            settle_time: Duration::from_secs(30),
            mount_table: PathBuf::from("/proc/mounts"),
        }
    }
}

impl VolumeSettings {
    pub fn mount_path(&self, volume_name: &str) -> PathBuf {
        self.mount_root.join(volume_name.replace('-', "_"))
    }

    pub fn device_path(&self, volume_name: &str) -> String {
        format!("{}{}", self.device_prefix, volume_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRequest {
    /// Name prefix for a new volume, followed by a `YYYYMMDDHHMM` stamp.
    pub name_prefix: String,
    pub size_gigabytes: u64,
    /// What the volume is for, used in its description.
    pub purpose: String,
    pub existing_volume_id: Option<String>,
    pub existing_directory: Option<PathBuf>,
}

/// What a provisioning run obtained and therefore has to give back.
#[derive(Debug, Clone, Default)]
pub struct VolumeLease {
    pub host: Option<HostInfo>,
    pub volume: Option<Volume>,
    /// The volume was created by this run and is destroyed on teardown.
    pub owned: bool,
    pub attached: bool,
    pub mount_path: Option<PathBuf>,
    pub mounted: bool,
    /// A caller-supplied directory is used instead of a volume.
    pub external_directory: bool,
}

#[async_trait]
pub trait VolumeLifecycle: Send + Sync {
    /// Makes storage of the requested size available and returns its path.
    /// `lease` is filled in as resources are obtained, also on failure.
    async fn provision_and_mount(&self, request: &VolumeRequest, lease: &mut VolumeLease) -> Result<PathBuf>;

    /// Releases what `lease` holds. Call exactly once per provisioning.
    async fn teardown(&self, lease: &VolumeLease) -> Result<()>;
}

pub struct VolumeManager {
    cloud: Arc<dyn CloudProvider>,
    runner: Arc<dyn CommandRunner>,
    alerter: Arc<dyn Alerter>,
    settings: VolumeSettings,
}

impl VolumeManager {
    pub fn new(
        cloud: Arc<dyn CloudProvider>,
        runner: Arc<dyn CommandRunner>,
        alerter: Arc<dyn Alerter>,
        settings: VolumeSettings,
    ) -> Self {
        Self {
            cloud,
            runner,
            alerter,
            settings,
        }
    }

    async fn obtain_volume(&self, request: &VolumeRequest, host: &HostInfo, lease: &mut VolumeLease) -> Result<Volume> {
        if let Some(volume_id) = &request.existing_volume_id {
            let volume = self.cloud.get_volume(volume_id).await?;
            info!(volume = %volume.id, name = %volume.name, "Volume details retrieved");
            return Ok(volume);
        }

        let stamp = format_timestamp(&Utc::now());
        let create = VolumeCreateRequest {
            name: format!("{}{}", request.name_prefix, stamp),
            description: format!(
                "Volume created for {} on {}.{} at {}",
                request.purpose, host.region, host.hostname, stamp
            ),
            size_gigabytes: request.size_gigabytes.max(1),
            region: host.region.clone(),
            filesystem_type: self.settings.filesystem_type.clone(),
        };

        info!(name = %create.name, size_gb = create.size_gigabytes, "Creating volume");
        let volume = self.cloud.create_volume(&create).await?;
        lease.owned = true;
        info!(volume = %volume.id, "Volume created");
        Ok(volume)
    }

    /// Waits until `action` completes. An errored action or the deadline
    /// passing is a failure.
    async fn wait_for_action(&self, action: Action, operation: &str) -> Result<()> {
        let check = |status: ActionStatus| match status {
            ActionStatus::Completed => Ok(Some(())),
            ActionStatus::Errored => Err(Error::Volume(format!("{} action had a status of errored", operation))),
            ActionStatus::InProgress => Ok(None),
        };

        if check(action.status)?.is_some() {
            return Ok(());
        }

        wait_until(
            operation,
            self.settings.action_poll_interval,
            self.settings.action_deadline,
            || async { check(self.cloud.get_action(action.id).await?.status) },
        )
        .await
    }

    async fn is_mounted(&self, mount_path: &Path) -> bool {
        match fs::read_to_string(&self.settings.mount_table).await {
            Ok(table) => mount_table_contains(&table, mount_path),
            Err(e) => {
                warn!(table = %self.settings.mount_table.display(), error = %e, "Could not read mount table");
                false
            }
        }
    }

    async fn mount(&self, volume_name: &str, mount_path: &Path) -> Result<()> {
        let command = CommandSpec::new("mount")
            .arg("-o")
            .arg(&self.settings.mount_options)
            .arg(self.settings.device_path(volume_name))
            .arg(mount_path.display().to_string());

        match self.runner.run(&command).await {
            Ok(_) => Ok(()),
            Err(e) => {
                // mount has been seen to exit non-zero after mounting fine
                warn!(error = %e, "mount reported failure, checking the mount table");
                if self.is_mounted(mount_path).await {
                    info!(path = %mount_path.display(), "Mount point is listed, continuing");
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn alerted<T>(&self, message: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.alerter.alert_error(message, e).await;
        }
        result
    }
}

/// Whether `mount_path` is the mount point of any entry in a
/// `/proc/mounts` style table.
pub fn mount_table_contains(table: &str, mount_path: &Path) -> bool {
    let wanted = mount_path.display().to_string();
    let wanted = wanted.trim_end_matches('/');
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|point| point.replace("\\040", " ").trim_end_matches('/') == wanted)
}

#[async_trait]
impl VolumeLifecycle for VolumeManager {
    async fn provision_and_mount(&self, request: &VolumeRequest, lease: &mut VolumeLease) -> Result<PathBuf> {
        if let Some(directory) = &request.existing_directory {
            info!(path = %directory.display(), "Using existing directory instead of a volume");
            fs::create_dir_all(directory).await?;
            lease.external_directory = true;
            lease.mount_path = Some(directory.clone());
            return Ok(directory.clone());
        }

        let host = self.cloud.host_info().await?;
        lease.host = Some(host.clone());

        let volume = self.obtain_volume(request, &host, lease).await?;
        lease.volume = Some(volume.clone());

        if !volume.is_attached_to(host.droplet_id) {
            info!(volume = %volume.id, droplet = host.droplet_id, "Attaching volume");
            let action = self
                .cloud
                .attach_volume(&volume.id, host.droplet_id, &host.region)
                .await?;
            lease.attached = true;
            self.wait_for_action(action, "attach volume").await?;

            info!("Attached volume to host. Waiting for system to settle down");
            tokio::time::sleep(self.settings.settle_time).await;
        }

        let mount_path = self.settings.mount_path(&volume.name);
        fs::create_dir_all(&mount_path).await?;
        lease.mount_path = Some(mount_path.clone());

        if self.is_mounted(&mount_path).await {
            debug!(path = %mount_path.display(), "Volume is already mounted");
        } else {
            self.mount(&volume.name, &mount_path).await?;
        }
        lease.mounted = true;

        info!(volume = %volume.id, path = %mount_path.display(), "Volume mounted");
        Ok(mount_path)
    }

    async fn teardown(&self, lease: &VolumeLease) -> Result<()> {
        if lease.external_directory {
            debug!("External directory in use, nothing to tear down");
            return Ok(());
        }

        let Some(volume) = &lease.volume else {
            return Ok(());
        };

        if !lease.owned {
            info!(volume = %volume.id, "Leaving pre-existing volume in place");
            return Ok(());
        }

        if let Some(mount_path) = &lease.mount_path {
            if lease.mounted {
                let umount = CommandSpec::new("umount").arg(mount_path.display().to_string());
                let result = self.runner.run(&umount).await.map(|_| ());
                self.alerted(&format!("Could not unmount volume {}", volume.id), result)
                    .await?;
            }

            if let Err(e) = fs::remove_dir(mount_path).await {
                warn!(path = %mount_path.display(), error = %e, "Could not remove mount directory. Continuing anyway");
            }
        }

        if lease.attached {
            if let Some(host) = &lease.host {
                let detached = async {
                    let action = self
                        .cloud
                        .detach_volume(&volume.id, host.droplet_id, &host.region)
                        .await?;
                    self.wait_for_action(action, "detach volume").await
                }
                .await;
                self.alerted(&format!("Could not detach volume {}", volume.id), detached)
                    .await?;
            }
        }

        let destroyed = self.cloud.delete_volume(&volume.id).await;
        self.alerted(&format!("Could not destroy volume {}", volume.id), destroyed)
            .await?;

        info!(volume = %volume.id, "Volume destroyed");
        Ok(())
    }
}
