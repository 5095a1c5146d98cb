use anyhow::{Context as _, Result, anyhow};
use std::sync::Arc;
use tracing::debug;
use xtrasnap_backends::{Backend, S3Backend, S3Config};
use xtrasnap_core::alert::local_hostname;
use xtrasnap_core::config::ConfigOverrides;
use xtrasnap_core::{Alerter, AppConfig, CommandRunner, LogAlerter};
use xtrasnap_integrations::{
    CloudProvider, DigitalOceanClient, DigitalOceanSettings, SlackAlerter, SystemRunner, VolumeLifecycle,
    VolumeManager, VolumeSettings,
};

/// Everything a command needs, built from the config file and flags.
pub struct Context {
    pub config: AppConfig,
    pub hostname: String,
    pub backend: Arc<dyn Backend>,
    pub alerter: Arc<dyn Alerter>,
    pub runner: Arc<dyn CommandRunner>,
}

impl Context {
    pub fn load(cli: &crate::Cli) -> Result<Self> {
        let mut config = AppConfig::load(cli.config.as_deref()).context("Could not load configuration")?;
        config.apply_overrides(ConfigOverrides {
            do_key: cli.do_key.clone(),
            space_endpoint: cli.do_space_endpoint.clone(),
            space_name: cli.do_space_name.clone(),
            space_key: cli.do_space_key.clone(),
            space_secret: cli.do_space_secret.clone(),
            mysql_data_path: cli.mysql_data_path.clone(),
            persistent_storage: cli.persistent_storage.clone(),
        });
        config.validate()?;

        let hostname = cli.hostname.clone().unwrap_or_else(local_hostname);
        debug!(hostname = %hostname, bucket = %config.digitalocean.space_name, "Configuration loaded");

        let backend: Arc<dyn Backend> = Arc::new(S3Backend::new(S3Config {
            endpoint: config.digitalocean.space_endpoint.clone(),
            bucket: config.digitalocean.space_name.clone(),
            access_key: config.digitalocean.space_key.clone(),
            secret_key: config.digitalocean.space_secret.clone(),
            ..Default::default()
        }));

        let alerter: Arc<dyn Alerter> = match config.slack() {
            Some(slack) if !slack.webhook_url.is_empty() => Arc::new(SlackAlerter::new(slack.clone())?),
            _ => Arc::new(LogAlerter),
        };

        Ok(Self {
            config,
            hostname,
            backend,
            alerter,
            runner: Arc::new(SystemRunner),
        })
    }

    /// The DigitalOcean API client. Only commands that touch volumes need a token.
    pub fn cloud(&self) -> Result<Arc<dyn CloudProvider>> {
        if self.config.digitalocean.key.is_empty() {
            return Err(anyhow!("--do-key parameter required"));
        }
        let client = DigitalOceanClient::new(DigitalOceanSettings::new(self.config.digitalocean.key.clone()))?;
        Ok(Arc::new(client))
    }

    pub fn volumes(&self, cloud: Arc<dyn CloudProvider>) -> Arc<dyn VolumeLifecycle> {
        Arc::new(VolumeManager::new(
            cloud,
            self.runner.clone(),
            self.alerter.clone(),
            VolumeSettings::default(),
        ))
    }
}
