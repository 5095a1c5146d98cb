use crate::progress::{ProgressReporter, directory_size};
use crate::volume::{RESTORE_VOLUME_PREFIX, VolumeLease, VolumeLifecycle, VolumeRequest, gigabytes_for};
use crate::xtrabackup;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};
use xtrasnap_backends::{Backend, list_all};
use xtrasnap_core::catalog::{find_relevant_since, format_timestamp};
use xtrasnap_core::{Alerter, BackupRecord, CommandRunner, CommandSpec, Error, Result};

#[derive(Debug, Clone)]
pub struct RestoreSettings {
    pub hostname: String,
    pub data_dir: PathBuf,
    /// Owner of the restored data directory.
    pub service_user: String,
    pub size_multiplier: u64,
    pub decompress_parallelism: u32,
    pub existing_volume_id: Option<String>,
    pub existing_directory: Option<PathBuf>,
    pub progress_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    /// Restored backups, oldest first.
    pub chain: Vec<BackupRecord>,
    /// Where the data directory that was replaced now lives.
    pub previous_data_dir: PathBuf,
}

pub struct RestorePipeline {
    backend: Arc<dyn Backend>,
    volumes: Arc<dyn VolumeLifecycle>,
    runner: Arc<dyn CommandRunner>,
    alerter: Arc<dyn Alerter>,
    settings: RestoreSettings,
}

impl RestorePipeline {
    pub fn new(
        backend: Arc<dyn Backend>,
        volumes: Arc<dyn VolumeLifecycle>,
        runner: Arc<dyn CommandRunner>,
        alerter: Arc<dyn Alerter>,
        settings: RestoreSettings,
    ) -> Self {
        Self {
            backend,
            volumes,
            runner,
            alerter,
            settings,
        }
    }

    /// Restores the newest point at or before `cutoff` (now when `None`)
    /// into the MySQL data directory.
    pub async fn run(&self, cutoff: Option<DateTime<Utc>>) -> Result<RestoreOutcome> {
        let cutoff = cutoff.unwrap_or_else(Utc::now);

        let listing = self
            .alerted(
                "Could not list backups to restore.",
                list_all(self.backend.as_ref(), &self.settings.hostname).await,
            )
            .await?;

        let mut chain = find_relevant_since(cutoff, &listing.records);
        if chain.is_empty() {
            let err = Error::NoBackupToRestore {
                cutoff: format_timestamp(&cutoff),
            };
            self.alerter.alert_error("Nothing to restore.", &err).await;
            return Err(err);
        }
        chain.reverse();

        let total: u64 = chain.iter().map(|record| record.size).sum();
        let volume_request = VolumeRequest {
            name_prefix: RESTORE_VOLUME_PREFIX.to_string(),
            size_gigabytes: gigabytes_for(total.saturating_mul(self.settings.size_multiplier.max(1))),
            purpose: "a MySQL restore".to_string(),
            existing_volume_id: self.settings.existing_volume_id.clone(),
            existing_directory: self.settings.existing_directory.clone(),
        };
        info!(
            backups = chain.len(),
            newest = %chain[chain.len() - 1].path,
            "Restoring backup chain"
        );

        let mut lease = VolumeLease::default();
        let result = self.run_on_volume(&volume_request, &mut lease, &chain).await;
        let teardown = self.volumes.teardown(&lease).await;

        match (result, teardown) {
            (Ok(previous_data_dir), Ok(())) => Ok(RestoreOutcome {
                chain,
                previous_data_dir,
            }),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown_error)) => {
                warn!(error = %teardown_error, "Teardown failed after an earlier error");
                Err(e)
            }
        }
    }

    async fn run_on_volume(
        &self,
        volume_request: &VolumeRequest,
        lease: &mut VolumeLease,
        chain: &[BackupRecord],
    ) -> Result<PathBuf> {
        let workspace = self
            .alerted(
                "Could not create and mount volume for restore.",
                self.volumes.provision_and_mount(volume_request, lease).await,
            )
            .await?;

        let mut directories = Vec::with_capacity(chain.len());
        for (i, record) in chain.iter().enumerate() {
            let directory = workspace.join(i.to_string());
            self.alerted(
                &format!("Could not download and unpack {}.", record.path),
                self.fetch(record, &directory).await,
            )
            .await?;
            directories.push(directory);
        }

        for command in xtrabackup::prepare_chain(&directories) {
            info!(command = %command, "Preparing backup");
            self.alerted("Could not prepare backup.", self.runner.run(&command).await.map(|_| ()))
                .await?;
        }

        let full_dir = &directories[0];
        let previous_data_dir = self
            .alerted("Could not restore data directory.", self.replace_data_dir(full_dir).await)
            .await?;

        let data_dir = self.settings.data_dir.display().to_string();
        let owner = format!("{}:{}", self.settings.service_user, self.settings.service_user);
        let chown = CommandSpec::new("chown").args(["-R", owner.as_str(), data_dir.as_str()]);
        self.alerted("Could not set data directory ownership.", self.runner.run(&chown).await.map(|_| ()))
            .await?;

        let newest = &chain[chain.len() - 1];
        self.alerter
            .notify(&format!(
                "Restore of {} completed from {} backup(s). Previous data directory kept at {}.",
                newest.file_name(),
                chain.len(),
                previous_data_dir.display()
            ))
            .await;

        Ok(previous_data_dir)
    }

    /// Downloads one backup into `directory` and leaves it decompressed.
    async fn fetch(&self, record: &BackupRecord, directory: &Path) -> Result<()> {
        fs::create_dir_all(directory).await?;
        let stream = directory.join(record.file_name());

        let size = self.backend.get_file(&record.path, &stream).await?;
        info!(key = %record.path, size, "Backup downloaded");

        self.runner.run(&xtrabackup::extract(&stream, directory)).await?;
        fs::remove_file(&stream).await?;
        self.runner
            .run(&xtrabackup::decompress(directory, self.settings.decompress_parallelism))
            .await?;
        Ok(())
    }

    /// Moves the live data directory aside and copies the prepared backup
    /// in its place.
    async fn replace_data_dir(&self, full_dir: &Path) -> Result<PathBuf> {
        let data_dir = &self.settings.data_dir;
        let previous = PathBuf::from(format!(
            "{}.before-restore-{}",
            data_dir.display(),
            format_timestamp(&Utc::now())
        ));

        let mv = CommandSpec::new("mv")
            .arg(data_dir.display().to_string())
            .arg(previous.display().to_string());
        self.runner.run(&mv).await?;
        info!(from = %data_dir.display(), to = %previous.display(), "Moved data directory aside");

        let expected = directory_size(full_dir).await?;
        let reporter = ProgressReporter::start(data_dir.clone(), expected, self.settings.progress_interval);
        let copied = self.runner.run(&xtrabackup::copy_back(full_dir, data_dir)).await;
        let observed = reporter.finish().await;
        copied?;
        info!(copied = observed, expected, "Copy back finished");

        Ok(previous)
    }

    async fn alerted<T>(&self, message: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.alerter.alert_error(message, e).await;
        }
        result
    }
}
