pub mod context;
pub mod list_backups;
pub mod perform;
pub mod prune;
pub mod restore;
pub mod test_alert;
pub mod upload;
