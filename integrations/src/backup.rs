use crate::progress::directory_size;
use crate::volume::{BACKUP_VOLUME_PREFIX, VolumeLease, VolumeLifecycle, VolumeRequest, gigabytes_for};
use crate::xtrabackup;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};
use xtrasnap_backends::{Backend, list_all, prune};
use xtrasnap_core::catalog::{INCOMPLETE_SUFFIX, backup_file_name, object_key, record_from_object};
use xtrasnap_core::checkpoint::{checkpoint_path, read_last_lsn};
use xtrasnap_core::retention::{decide_backup_type, find_deletable};
use xtrasnap_core::{
    Alerter, BackupRecord, BackupRequest, BackupType, CommandRunner, Result, RetentionPolicy,
};

#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub hostname: String,
    pub data_dir: PathBuf,
    /// Holds the checkpoint file between runs.
    pub persistent_storage: PathBuf,
    pub retention: RetentionPolicy,
    pub existing_volume_id: Option<String>,
    pub existing_directory: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub record: BackupRecord,
    pub pruned: Vec<BackupRecord>,
}

pub struct BackupPipeline {
    backend: Arc<dyn Backend>,
    volumes: Arc<dyn VolumeLifecycle>,
    runner: Arc<dyn CommandRunner>,
    alerter: Arc<dyn Alerter>,
    settings: BackupSettings,
}

fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    format!("{} {}", count, if count == 1 { singular } else { plural })
}

impl BackupPipeline {
    pub fn new(
        backend: Arc<dyn Backend>,
        volumes: Arc<dyn VolumeLifecycle>,
        runner: Arc<dyn CommandRunner>,
        alerter: Arc<dyn Alerter>,
        settings: BackupSettings,
    ) -> Self {
        Self {
            backend,
            volumes,
            runner,
            alerter,
            settings,
        }
    }

    /// Takes one backup, uploads it and prunes old lineages after a full
    /// backup. The volume is torn down exactly once whatever happens after
    /// provisioning starts.
    pub async fn run(&self, request: BackupRequest) -> Result<BackupOutcome> {
        let now = Utc::now();
        let backup_type = self.resolve_type(request, now).await;
        info!(backup_type = %backup_type, "Starting backup");

        let data_size = self
            .alerted(
                "Could not calculate size of MySQL data directory.",
                directory_size(&self.settings.data_dir).await,
            )
            .await?;

        let volume_request = VolumeRequest {
            name_prefix: BACKUP_VOLUME_PREFIX.to_string(),
            size_gigabytes: gigabytes_for(data_size),
            purpose: format!("a {} MySQL backup", backup_type),
            existing_volume_id: self.settings.existing_volume_id.clone(),
            existing_directory: self.settings.existing_directory.clone(),
        };

        let mut lease = VolumeLease::default();
        let result = self
            .run_on_volume(&volume_request, &mut lease, backup_type, now)
            .await;
        let teardown = self.volumes.teardown(&lease).await;

        match (result, teardown) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown_error)) => {
                warn!(error = %teardown_error, "Teardown failed after an earlier error");
                Err(e)
            }
        }
    }

    async fn resolve_type(&self, request: BackupRequest, now: DateTime<Utc>) -> BackupType {
        match request {
            BackupRequest::Full => BackupType::Full,
            BackupRequest::Incremental => BackupType::Incremental,
            BackupRequest::Decide => {
                let last_lsn = match read_last_lsn(&checkpoint_path(&self.settings.persistent_storage)).await {
                    Ok(lsn) => lsn,
                    Err(e) => {
                        self.alerter
                            .alert_error("Could not read checkpoint file. Doing full backup.", &e)
                            .await;
                        return BackupType::Full;
                    }
                };

                match list_all(self.backend.as_ref(), &self.settings.hostname).await {
                    Ok(listing) => {
                        decide_backup_type(last_lsn.as_deref(), &listing.records, now, &self.settings.retention)
                    }
                    Err(e) => {
                        self.alerter
                            .alert_error("Could not list backups to decide backup type. Doing full backup.", &e)
                            .await;
                        BackupType::Full
                    }
                }
            }
        }
    }

    async fn run_on_volume(
        &self,
        volume_request: &VolumeRequest,
        lease: &mut VolumeLease,
        backup_type: BackupType,
        now: DateTime<Utc>,
    ) -> Result<BackupOutcome> {
        let mount_dir = self
            .alerted(
                "Could not create and mount volume for backup.",
                self.volumes.provision_and_mount(volume_request, lease).await,
            )
            .await?;

        let backup_file = self
            .alerted(
                "Could not create backup. Leaving it as is!",
                self.stream_backup(&mount_dir, backup_type, now).await,
            )
            .await?;

        let file_name = backup_file_name(&now, backup_type);
        let key = object_key(&self.settings.hostname, &file_name);
        let size = self
            .alerted(
                "Could not upload backup. Leaving it as is!",
                self.backend.put_file(&key, &backup_file).await,
            )
            .await?;
        info!(key = %key, size, "Backup uploaded");

        let record = record_from_object(&key, size)?;
        let pruned = if backup_type.is_full() && self.settings.retention.automatically_remove_old {
            self.prune_old_backups(now).await
        } else {
            Vec::new()
        };

        Ok(BackupOutcome { record, pruned })
    }

    /// Streams xtrabackup output into the mounted directory and returns the
    /// finished file.
    async fn stream_backup(&self, mount_dir: &Path, backup_type: BackupType, now: DateTime<Utc>) -> Result<PathBuf> {
        let backup_dir = mount_dir.join(format!("{}{}", BACKUP_VOLUME_PREFIX, backup_type));
        fs::create_dir_all(&backup_dir).await?;

        let file_name = backup_file_name(&now, backup_type);
        let final_path = backup_dir.join(&file_name);
        let temporary_path = backup_dir.join(format!("{}{}", file_name, INCOMPLETE_SUFFIX));

        let last_lsn = match backup_type {
            BackupType::Full => None,
            BackupType::Incremental => {
                let lsn = read_last_lsn(&checkpoint_path(&self.settings.persistent_storage)).await?;
                if lsn.is_none() {
                    warn!("No last LSN found, doing full backup instead");
                }
                lsn
            }
        };

        let command = xtrabackup::backup(
            &backup_dir,
            &self.settings.persistent_storage,
            last_lsn.as_deref(),
            &temporary_path,
        );
        info!(file = %temporary_path.display(), "Backups running");
        self.runner.run(&command).await?;

        fs::rename(&temporary_path, &final_path).await.map_err(|e| {
            xtrasnap_core::Error::Other(format!(
                "Backup was completed but couldn't rename the file to reflect this: {}",
                e
            ))
        })?;

        Ok(final_path)
    }

    /// Failures here are alerted and never fail the backup.
    async fn prune_old_backups(&self, now: DateTime<Utc>) -> Vec<BackupRecord> {
        let listing = match list_all(self.backend.as_ref(), &self.settings.hostname).await {
            Ok(listing) => listing,
            Err(e) => {
                self.alerter
                    .alert_error(
                        "Backup completed, but could not perform pruning. Failed on listing backups.",
                        &e,
                    )
                    .await;
                return Vec::new();
            }
        };

        let deletable = find_deletable(&listing.records, now, &self.settings.retention);
        if deletable.is_empty() {
            info!("No backups old enough to prune");
            return Vec::new();
        }

        match prune(&deletable, self.backend.as_ref()).await {
            Ok(deleted) => {
                info!(deleted = deleted.len(), "Pruned old backups");
                deleted
            }
            Err(failure) => {
                let message = format!(
                    "Backup completed, but could not delete backups pruning. Failed on deleting. Was able to delete {} before failure.",
                    pluralize(failure.deleted.len(), "backup", "backups")
                );
                self.alerter.alert_error(&message, &failure.error).await;
                failure.deleted
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
