//! Command lines for the Percona XtraBackup tools.

use std::path::Path;
use xtrasnap_core::CommandSpec;

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Streams a compressed backup of the running server into `output`.
/// Without `incremental_lsn` the stream is a full backup.
pub fn backup(
    target_dir: &Path,
    extra_lsndir: &Path,
    incremental_lsn: Option<&str>,
    output: &Path,
) -> CommandSpec {
    let command = CommandSpec::new("xtrabackup")
        .arg("--backup")
        .arg("--extra-lsndir")
        .arg(path_arg(extra_lsndir))
        .arg("--target-dir")
        .arg(format!("{}/", target_dir.display()))
        .arg("--compress")
        .arg("--stream=xbstream")
        .arg("--slave-info");

    let command = match incremental_lsn {
        Some(lsn) => command.arg("--incremental-lsn").arg(lsn),
        None => command,
    };

    command.stdout_to(output)
}

pub fn extract(stream: &Path, target_dir: &Path) -> CommandSpec {
    CommandSpec::new("xbstream")
        .arg("-x")
        .arg("-C")
        .arg(path_arg(target_dir))
        .stdin_from(stream)
}

pub fn decompress(target_dir: &Path, parallel: u32) -> CommandSpec {
    CommandSpec::new("xtrabackup")
        .arg("--decompress")
        .arg("--parallel")
        .arg(parallel.max(1).to_string())
        .arg("--remove-original")
        .arg("--target-dir")
        .arg(path_arg(target_dir))
}

/// Prepares the full backup, optionally merging one incremental into it.
pub fn prepare(full_dir: &Path, incremental_dir: Option<&Path>, apply_log_only: bool) -> CommandSpec {
    let mut command = CommandSpec::new("xtrabackup").arg("--prepare");
    if apply_log_only {
        command = command.arg("--apply-log-only");
    }
    command = command.arg("--target-dir").arg(path_arg(full_dir));
    if let Some(incremental_dir) = incremental_dir {
        command = command.arg("--incremental-dir").arg(path_arg(incremental_dir));
    }
    command
}

/// The prepare commands for a chain, oldest first. `chain[0]` is the full
/// backup directory; every other entry is an incremental on top of it.
pub fn prepare_chain<P: AsRef<Path>>(chain: &[P]) -> Vec<CommandSpec> {
    let Some((full, incrementals)) = chain.split_first() else {
        return Vec::new();
    };
    let full = full.as_ref();

    let mut commands = vec![prepare(full, None, !incrementals.is_empty())];
    for (i, incremental) in incrementals.iter().enumerate() {
        let is_last = i + 1 == incrementals.len();
        commands.push(prepare(full, Some(incremental.as_ref()), !is_last));
    }
    commands
}

pub fn copy_back(full_dir: &Path, data_dir: &Path) -> CommandSpec {
    CommandSpec::new("xtrabackup")
        .arg("--copy-back")
        .arg("--target-dir")
        .arg(path_arg(full_dir))
        .arg("--datadir")
        .arg(path_arg(data_dir))
}
