use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use walkdir::WalkDir;
use xtrasnap_core::{Error, Result};

/// Total size of the regular files below `path`. Entries that vanish or
/// cannot be read while walking are skipped.
pub fn directory_size_blocking(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

pub async fn directory_size(path: &Path) -> Result<u64> {
    if !tokio::fs::try_exists(path).await? {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || directory_size_blocking(&path))
        .await
        .map_err(|e| Error::Other(format!("Size calculation failed: {}", e)))
}

/// Shows how much of `expected_bytes` has arrived in a directory while a
/// long copy runs. Stopped with `finish`.
pub struct ProgressReporter {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<u64>,
}

impl ProgressReporter {
    pub fn start(target: PathBuf, expected_bytes: u64, interval: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let bar = ProgressBar::new(expected_bytes);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{bar:40.cyan/blue} {bytes:>10}/{total_bytes:10} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_message(format!("Copying into {}", target.display()));

            let mut ticker = tokio::time::interval(interval);
            let mut observed = 0;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let target = target.clone();
                        observed = tokio::task::spawn_blocking(move || directory_size_blocking(&target))
                            .await
                            .unwrap_or(observed);
                        bar.set_position(observed);
                        debug!(copied = observed, expected = expected_bytes, "Copy progress");
                    }
                }
            }

            bar.finish_and_clear();
            observed
        });

        Self { stop, handle }
    }

    /// Stops reporting and returns the last observed size.
    pub async fn finish(self) -> u64 {
        // The task may already have ended; nothing is waiting then.
        let _ = self.stop.send(());
        let observed = self.handle.await.unwrap_or(0);
        info!(copied = observed, "Progress reporting stopped");
        observed
    }
}
