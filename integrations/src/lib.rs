pub mod backup;
pub mod cloud;
pub mod digitalocean;
pub mod prerequisites;
pub mod process;
pub mod progress;
pub mod restore;
pub mod slack;
pub mod volume;
pub mod xtrabackup;

#[cfg(test)]
pub(crate) mod testing;

pub use backup::{BackupOutcome, BackupPipeline, BackupSettings};
pub use cloud::{CloudProvider, HostInfo, Volume};
pub use digitalocean::{DigitalOceanClient, DigitalOceanSettings};
pub use process::SystemRunner;
pub use restore::{RestoreOutcome, RestorePipeline, RestoreSettings};
pub use slack::SlackAlerter;
pub use volume::{VolumeLifecycle, VolumeManager, VolumeSettings};
