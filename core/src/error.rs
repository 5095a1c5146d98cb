use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Format(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Cloud API error: {0}")]
    Cloud(String),

    #[error("Timed out waiting for {operation} after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Command `{command}` failed ({status}): {stderr_tail}")]
    Command {
        command: String,
        status: String,
        stderr_tail: String,
    },

    #[error("Volume error: {0}")]
    Volume(String),

    #[error("No backup to restore from at or before {cutoff}")]
    NoBackupToRestore { cutoff: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prerequisite not met: {0}")]
    Prerequisite(String),

    #[error("Alert error: {0}")]
    Alert(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
