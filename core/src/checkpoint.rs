use crate::Result;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Name of the file xtrabackup writes into `--extra-lsndir`.
pub const CHECKPOINT_FILE_NAME: &str = "xtrabackup_checkpoints";

pub fn checkpoint_path(persistent_storage: &Path) -> PathBuf {
    persistent_storage.join(CHECKPOINT_FILE_NAME)
}

/// Extracts `to_lsn` from checkpoint file contents. Only the first line
/// mentioning `to_lsn` is considered.
pub fn parse_last_lsn(contents: &str) -> Option<String> {
    let line = contents.lines().find(|line| line.contains("to_lsn"))?;
    let (_, value) = line.split_once('=')?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Last LSN recorded by a previous backup. A missing file is not an error.
pub async fn read_last_lsn(checkpoint_file: &Path) -> Result<Option<String>> {
    match fs::read_to_string(checkpoint_file).await {
        Ok(contents) => Ok(parse_last_lsn(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
