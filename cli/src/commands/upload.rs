use super::context::Context;
use anyhow::{Result, anyhow};
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use xtrasnap_core::catalog::object_key;

#[derive(Args)]
pub struct UploadCommand {
    #[arg(help = "File to upload")]
    file: PathBuf,
}

impl UploadCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = Context::load(cli)?;

        let file_name = self
            .file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("Cannot upload {}: no file name", self.file.display()))?;
        let key = object_key(&ctx.hostname, file_name);

        info!(file = %self.file.display(), key = %key, "Uploading file");
        let size = match ctx.backend.put_file(&key, &self.file).await {
            Ok(size) => size,
            Err(e) => {
                ctx.alerter.alert_error("Could not upload file.", &e).await;
                return Err(e.into());
            }
        };

        println!("Uploaded {} ({} bytes)", key, size);
        Ok(())
    }
}
