pub mod alert;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod process;
pub mod retention;
pub mod types;

pub use alert::{Alerter, LogAlerter};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use process::{CommandRunner, CommandSpec};
pub use types::*;
