use super::context::Context;
use anyhow::Result;
use tracing::info;
use xtrasnap_core::BackupRequest;
use xtrasnap_integrations::prerequisites::check_all;
use xtrasnap_integrations::{BackupPipeline, BackupSettings};

pub async fn run(cli: &crate::Cli, request: BackupRequest) -> Result<()> {
    let ctx = Context::load(cli)?;
    let cloud = ctx.cloud()?;

    check_all(&ctx.config.persistent_storage, cloud.as_ref(), ctx.runner.as_ref()).await?;

    let pipeline = BackupPipeline::new(
        ctx.backend.clone(),
        ctx.volumes(cloud),
        ctx.runner.clone(),
        ctx.alerter.clone(),
        BackupSettings {
            hostname: ctx.hostname.clone(),
            data_dir: ctx.config.mysql.data_path.clone(),
            persistent_storage: ctx.config.persistent_storage.clone(),
            retention: ctx.config.retention.clone().unwrap_or_default(),
            existing_volume_id: cli.existing_volume_id.clone(),
            existing_directory: cli.existing_directory.clone(),
        },
    );

    let outcome = pipeline.run(request).await?;

    info!(
        key = %outcome.record.path,
        size = outcome.record.size,
        pruned = outcome.pruned.len(),
        "Backup finished"
    );
    println!(
        "Uploaded {} ({:.2} GB)",
        outcome.record.path,
        outcome.record.size_in_gb()
    );
    for record in &outcome.pruned {
        println!("Pruned {}", record.path);
    }

    Ok(())
}
