//! JSON configuration with command-line overrides.
//!
//! Two layouts are accepted: the nested one (`digitalocean`, `mysql` blocks)
//! and the older flat one (`do_key`, `mysql_data_path`, ...). When both are
//! present in the same file the nested values win.

use crate::{Error, Result, RetentionPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/xtrasnap.json";
pub const DEFAULT_MYSQL_DATA_PATH: &str = "/var/lib/mysql";
pub const DEFAULT_PERSISTENT_STORAGE: &str = "/var/lib/backup-mysql";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitalOceanConfig {
    pub key: String,
    pub space_endpoint: String,
    pub space_name: String,
    pub space_key: String,
    pub space_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MysqlConfig {
    pub data_path: PathBuf,
    /// Owner applied to the data directory after a restore.
    pub service_user: String,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_MYSQL_DATA_PATH),
            service_user: "mysql".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub channel: String,
    pub username: String,
    pub icon_emoji: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    pub slack: Option<SlackConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Restore volume size as a multiple of the compressed chain size.
    pub size_multiplier: u64,
    /// `--parallel` for xtrabackup decompression.
    pub decompress_parallelism: u32,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            size_multiplier: 8,
            decompress_parallelism: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub digitalocean: DigitalOceanConfig,
    pub mysql: MysqlConfig,
    pub persistent_storage: PathBuf,
    pub alerting: Option<AlertingConfig>,
    pub retention: Option<RetentionPolicy>,
    pub restore: RestoreConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            digitalocean: DigitalOceanConfig::default(),
            mysql: MysqlConfig::default(),
            persistent_storage: PathBuf::from(DEFAULT_PERSISTENT_STORAGE),
            alerting: None,
            retention: None,
            restore: RestoreConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    digitalocean: Option<DigitalOceanConfig>,
    mysql: Option<MysqlConfig>,
    persistent_storage: Option<PathBuf>,
    alerting: Option<AlertingConfig>,
    retention: Option<RetentionPolicy>,
    restore: Option<RestoreConfig>,

    do_key: Option<String>,
    do_space_endpoint: Option<String>,
    do_space_name: Option<String>,
    do_space_key: Option<String>,
    do_space_secret: Option<String>,
    mysql_data_path: Option<PathBuf>,
}

impl RawConfig {
    fn into_config(self) -> AppConfig {
        let mut config = AppConfig::default();

        let legacy = DigitalOceanConfig {
            key: self.do_key.unwrap_or_default(),
            space_endpoint: self.do_space_endpoint.unwrap_or_default(),
            space_name: self.do_space_name.unwrap_or_default(),
            space_key: self.do_space_key.unwrap_or_default(),
            space_secret: self.do_space_secret.unwrap_or_default(),
        };
        let nested = self.digitalocean.unwrap_or_default();
        let pick = |nested: String, legacy: String| if nested.is_empty() { legacy } else { nested };
        config.digitalocean = DigitalOceanConfig {
            key: pick(nested.key, legacy.key),
            space_endpoint: pick(nested.space_endpoint, legacy.space_endpoint),
            space_name: pick(nested.space_name, legacy.space_name),
            space_key: pick(nested.space_key, legacy.space_key),
            space_secret: pick(nested.space_secret, legacy.space_secret),
        };

        if let Some(mysql) = self.mysql {
            config.mysql = mysql;
        } else if let Some(data_path) = self.mysql_data_path {
            config.mysql.data_path = data_path;
        }
        if config.mysql.data_path.as_os_str().is_empty() {
            config.mysql.data_path = PathBuf::from(DEFAULT_MYSQL_DATA_PATH);
        }

        if let Some(persistent_storage) = self.persistent_storage.filter(|p| !p.as_os_str().is_empty()) {
            config.persistent_storage = persistent_storage;
        }
        config.alerting = self.alerting;
        config.retention = self.retention;
        config.restore = self.restore.unwrap_or_default();
        config
    }
}

/// Values supplied on the command line; `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub do_key: Option<String>,
    pub space_endpoint: Option<String>,
    pub space_name: Option<String>,
    pub space_key: Option<String>,
    pub space_secret: Option<String>,
    pub mysql_data_path: Option<PathBuf>,
    pub persistent_storage: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_json(contents: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(contents)
            .map_err(|e| Error::Config(format!("Could not load config file. JSON decode failed: {}", e)))?;
        Ok(raw.into_config())
    }

    /// Reads `path`, or the default location when `path` is `None`. Only a
    /// missing default file falls back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(Self::default()),
            Err(e) => Err(Error::Config(format!(
                "Could not load config file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        let set = |target: &mut String, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                *target = value;
            }
        };
        set(&mut self.digitalocean.key, overrides.do_key);
        set(&mut self.digitalocean.space_endpoint, overrides.space_endpoint);
        set(&mut self.digitalocean.space_name, overrides.space_name);
        set(&mut self.digitalocean.space_key, overrides.space_key);
        set(&mut self.digitalocean.space_secret, overrides.space_secret);

        if let Some(path) = overrides.mysql_data_path {
            self.mysql.data_path = path;
        }
        if let Some(path) = overrides.persistent_storage {
            self.persistent_storage = path;
        }
    }

    /// Object storage settings are needed by every command.
    pub fn validate(&self) -> Result<()> {
        let required = [
            (&self.digitalocean.space_name, "--do-space-name"),
            (&self.digitalocean.space_endpoint, "--do-space-endpoint"),
            (&self.digitalocean.space_key, "--do-space-key"),
            (&self.digitalocean.space_secret, "--do-space-secret"),
        ];
        for (value, flag) in required {
            if value.is_empty() {
                return Err(Error::Config(format!("{} parameter required", flag)));
            }
        }
        if let Some(retention) = &self.retention {
            retention.validate()?;
        }
        Ok(())
    }

    pub fn slack(&self) -> Option<&SlackConfig> {
        self.alerting.as_ref().and_then(|a| a.slack.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED_JSON: &str = r#"
{
    "digitalocean": {
        "key": "do.key",
        "space_endpoint": "do.space_endpoint",
        "space_name": "do.space_name",
        "space_key": "do.space_key",
        "space_secret": "do.space_secret"
    },
    "mysql": {
        "data_path": "mysql.data_path"
    },
    "persistent_storage": "hi: persistent_storage",
    "retention": {
        "automatically_remove_old": true,
        "retention_in_days": 14,
        "hours_between_full_backups": 168
    }
}
"#;

    const LEGACY_JSON: &str = r#"
{
    "do_key": "hi: do_key",
    "do_space_endpoint": "hi: do_space_endpoint",
    "do_space_name": "hi: do_space_name",
    "do_space_key": "hi: do_space_key",
    "do_space_secret": "hi: do_space_secret",
    "mysql_data_path": "hi: mysql_data_path",
    "persistent_storage": "hi: persistent_storage"
}
"#;

    fn all_overrides() -> ConfigOverrides {
        ConfigOverrides {
            do_key: Some("do_key".into()),
            space_endpoint: Some("do_space_endpoint".into()),
            space_name: Some("do_space_name".into()),
            space_key: Some("do_space_key".into()),
            space_secret: Some("do_space_secret".into()),
            mysql_data_path: Some("mysql_data_path".into()),
            persistent_storage: Some("persistent_storage".into()),
        }
    }

    #[test]
    fn test_load_config_from_command_line() {
        let mut config = AppConfig::default();
        config.apply_overrides(all_overrides());

        assert_eq!(config.digitalocean.key, "do_key");
        assert_eq!(config.digitalocean.space_endpoint, "do_space_endpoint");
        assert_eq!(config.digitalocean.space_name, "do_space_name");
        assert_eq!(config.digitalocean.space_key, "do_space_key");
        assert_eq!(config.digitalocean.space_secret, "do_space_secret");
        assert_eq!(config.mysql.data_path, PathBuf::from("mysql_data_path"));
        assert_eq!(config.persistent_storage, PathBuf::from("persistent_storage"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, NESTED_JSON).unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.digitalocean.key, "do.key");
        assert_eq!(config.digitalocean.space_endpoint, "do.space_endpoint");
        assert_eq!(config.digitalocean.space_name, "do.space_name");
        assert_eq!(config.digitalocean.space_key, "do.space_key");
        assert_eq!(config.digitalocean.space_secret, "do.space_secret");
        assert_eq!(config.mysql.data_path, PathBuf::from("mysql.data_path"));
        assert_eq!(config.mysql.service_user, "mysql");
        assert_eq!(config.persistent_storage, PathBuf::from("hi: persistent_storage"));

        let retention = config.retention.unwrap();
        assert!(retention.automatically_remove_old);
        assert_eq!(retention.retention_in_days, 14);
        assert_eq!(retention.retention_in_hours, 0);
        assert_eq!(retention.hours_between_full_backups, 168);
    }

    #[test]
    fn test_load_legacy_config_from_config_file() {
        let config = AppConfig::from_json(LEGACY_JSON).unwrap();
        assert_eq!(config.digitalocean.key, "hi: do_key");
        assert_eq!(config.digitalocean.space_endpoint, "hi: do_space_endpoint");
        assert_eq!(config.digitalocean.space_name, "hi: do_space_name");
        assert_eq!(config.digitalocean.space_key, "hi: do_space_key");
        assert_eq!(config.digitalocean.space_secret, "hi: do_space_secret");
        assert_eq!(config.mysql.data_path, PathBuf::from("hi: mysql_data_path"));
        assert_eq!(config.persistent_storage, PathBuf::from("hi: persistent_storage"));
        assert!(config.retention.is_none());
    }

    #[test]
    fn test_load_config_override_from_command_line() {
        let mut config = AppConfig::from_json(LEGACY_JSON).unwrap();
        config.apply_overrides(all_overrides());

        assert_eq!(config.digitalocean.key, "do_key");
        assert_eq!(config.digitalocean.space_name, "do_space_name");
        assert_eq!(config.mysql.data_path, PathBuf::from("mysql_data_path"));
        assert_eq!(config.persistent_storage, PathBuf::from("persistent_storage"));
    }

    #[test]
    fn test_defaults_and_missing_files() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.mysql.data_path, PathBuf::from(DEFAULT_MYSQL_DATA_PATH));
        assert_eq!(config.persistent_storage, PathBuf::from(DEFAULT_PERSISTENT_STORAGE));
        assert_eq!(config.restore, RestoreConfig::default());

        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: --do-space-name parameter required");

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(AppConfig::load(Some(&missing)), Err(Error::Config(_))));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        match AppConfig::load(Some(&broken)) {
            Err(Error::Config(message)) => {
                assert!(message.starts_with("Could not load config file. JSON decode failed:"))
            }
            other => panic!("expected a config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_retention() {
        let mut config = AppConfig::from_json(r#"{"retention": {"retention_in_hours": 9223372036854775807}}"#).unwrap();
        config.apply_overrides(all_overrides());

        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: retention.retention_in_hours is out of range"
        );
    }
}
