//! Host checks run before any backup or restore work starts.

use crate::cloud::{CloudProvider, HostInfo};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tokio::fs;
use tracing::{info, warn};
use xtrasnap_core::{CommandRunner, CommandSpec, Error, Result};

pub const REQUIRED_MYSQL_MAJOR_VERSION: u32 = 8;
pub const XTRABACKUP_PACKAGE: &str = "percona-xtrabackup-80";

const PERCONA_RELEASE_PACKAGE: &str = "/tmp/percona.deb";

static MYSQLD_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Ver\s+(\d+)\.").expect("mysqld version pattern is valid"));

/// Creates the persistent storage directory when it is missing.
pub async fn ensure_persistent_storage(path: &Path) -> Result<()> {
    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(Error::Prerequisite(format!(
            "Persistent storage {} exists but is not a directory",
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "Creating persistent storage directory");
            fs::create_dir_all(path).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// The metadata service only answers on a droplet.
pub async fn check_on_droplet(cloud: &dyn CloudProvider) -> Result<HostInfo> {
    cloud
        .host_info()
        .await
        .map_err(|e| Error::Prerequisite(format!("Not running on a droplet: {}", e)))
}

/// Major version from `mysqld --version` output.
pub fn parse_mysqld_major_version(output: &str) -> Option<u32> {
    MYSQLD_VERSION.captures(output)?.get(1)?.as_str().parse().ok()
}

/// Unreadable version output is logged and accepted.
pub async fn check_mysql_version(runner: &dyn CommandRunner) -> Result<()> {
    let output = runner.run(&CommandSpec::new("mysqld").arg("--version")).await?;

    match parse_mysqld_major_version(&output) {
        Some(REQUIRED_MYSQL_MAJOR_VERSION) => Ok(()),
        Some(found) => Err(Error::Prerequisite(format!(
            "Incorrect MySQL version installed. {} found, {} required",
            found, REQUIRED_MYSQL_MAJOR_VERSION
        ))),
        None => {
            warn!(output = %output.trim(), "Could not determine MySQL version, continuing");
            Ok(())
        }
    }
}

/// Installs XtraBackup from the Percona apt repository when it is missing.
pub async fn ensure_xtrabackup(runner: &dyn CommandRunner) -> Result<()> {
    if runner.run(&CommandSpec::new("which").arg("xtrabackup")).await.is_ok() {
        return Ok(());
    }

    info!("xtrabackup not found, installing");
    let codename = runner.run(&CommandSpec::new("lsb_release").arg("-sc")).await?;
    let codename = codename.trim();

    let steps = [
        CommandSpec::new("wget").args([
            "-O".to_string(),
            PERCONA_RELEASE_PACKAGE.to_string(),
            format!(
                "https://repo.percona.com/apt/percona-release_latest.{}_all.deb",
                codename
            ),
        ]),
        CommandSpec::new("dpkg").args(["-i", PERCONA_RELEASE_PACKAGE]),
        CommandSpec::new("percona-release").args(["enable-only", "tools", "release"]),
        CommandSpec::new("apt-get").arg("update"),
        CommandSpec::new("apt-get").args(["install", XTRABACKUP_PACKAGE, "-y"]),
    ];

    for step in &steps {
        runner
            .run(step)
            .await
            .map_err(|e| Error::Prerequisite(format!("Could not install xtrabackup: {}", e)))?;
    }

    info!(package = XTRABACKUP_PACKAGE, "xtrabackup installed");
    Ok(())
}

pub async fn check_root(runner: &dyn CommandRunner) -> Result<()> {
    let uid = runner.run(&CommandSpec::new("id").arg("-u")).await?;
    if uid.trim() == "0" {
        Ok(())
    } else {
        Err(Error::Prerequisite("Must be run as root".to_string()))
    }
}

/// Every check needed before a backup or restore, in order.
pub async fn check_all(persistent_storage: &Path, cloud: &dyn CloudProvider, runner: &dyn CommandRunner) -> Result<HostInfo> {
    ensure_persistent_storage(persistent_storage).await?;
    let host = check_on_droplet(cloud).await?;
    check_mysql_version(runner).await?;
    ensure_xtrabackup(runner).await?;
    check_root(runner).await?;
    Ok(host)
}
