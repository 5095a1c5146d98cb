use super::context::Context;
use anyhow::{Result, anyhow};
use clap::Args;
use std::time::Duration;
use xtrasnap_core::catalog::parse_timestamp;
use xtrasnap_integrations::prerequisites::check_all;
use xtrasnap_integrations::{RestorePipeline, RestoreSettings};

#[derive(Args)]
pub struct RestoreCommand {
    #[arg(long, help = "Restore the newest point at or before this time (YYYYMMDDHHMM)")]
    timestamp: Option<String>,
}

impl RestoreCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let cutoff = self
            .timestamp
            .as_deref()
            .map(|value| parse_timestamp(value).ok_or_else(|| anyhow!("Invalid timestamp {}, expected YYYYMMDDHHMM", value)))
            .transpose()?;

        let ctx = Context::load(cli)?;
        let cloud = ctx.cloud()?;

        check_all(&ctx.config.persistent_storage, cloud.as_ref(), ctx.runner.as_ref()).await?;

        let pipeline = RestorePipeline::new(
            ctx.backend.clone(),
            ctx.volumes(cloud),
            ctx.runner.clone(),
            ctx.alerter.clone(),
            RestoreSettings {
                hostname: ctx.hostname.clone(),
                data_dir: ctx.config.mysql.data_path.clone(),
                service_user: ctx.config.mysql.service_user.clone(),
                size_multiplier: ctx.config.restore.size_multiplier,
                decompress_parallelism: ctx.config.restore.decompress_parallelism,
                existing_volume_id: cli.existing_volume_id.clone(),
                existing_directory: cli.existing_directory.clone(),
                progress_interval: Duration::from_secs(10),
            },
        );

        let outcome = pipeline.run(cutoff).await?;

        println!("Restored {} backup(s):", outcome.chain.len());
        for record in &outcome.chain {
            println!("  {}", record.path);
        }
        println!("Previous data directory: {}", outcome.previous_data_dir.display());
        println!("Start MySQL to use the restored data");

        Ok(())
    }
}
