use super::context::Context;
use anyhow::{Result, anyhow};
use chrono::Utc;
use clap::Args;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use xtrasnap_backends::{list_all, prune};
use xtrasnap_core::retention::find_deletable;

#[derive(Args)]
pub struct PruneCommand {
    #[arg(long, help = "Delete without asking for confirmation")]
    yes: bool,
}

/// Accepts `yes` or `y` in any case.
fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "yes" | "y")
}

async fn confirm(prompt: &str) -> Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut answer).await?;
    Ok(is_confirmation(&answer))
}

impl PruneCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = Context::load(cli)?;
        let policy = ctx.config.retention.clone().unwrap_or_default();
        if policy.window().is_none() {
            println!("No retention window configured, nothing to prune");
            return Ok(());
        }

        let listing = list_all(ctx.backend.as_ref(), &ctx.hostname).await?;
        let now = Utc::now();
        let deletable = find_deletable(&listing.records, now, &policy);

        if deletable.is_empty() {
            println!("No backups to prune");
            return Ok(());
        }

        println!("{:<60} {:>10} {:>10}", "Backup", "Size (GB)", "Age (days)");
        println!("{:-<82}", "");
        for record in &deletable {
            println!(
                "{:<60} {:>10.2} {:>10}",
                record.path,
                record.size_in_gb(),
                (now - record.created_at).num_days()
            );
        }

        if !self.yes && !confirm(&format!("Delete {} backup(s)? [yes/no] ", deletable.len())).await? {
            println!("Nothing deleted");
            return Ok(());
        }

        match prune(&deletable, ctx.backend.as_ref()).await {
            Ok(deleted) => {
                println!("Deleted {} backup(s)", deleted.len());
                Ok(())
            }
            Err(failure) => {
                ctx.alerter.alert_error("Could not prune backups.", &failure).await;
                Err(anyhow!(failure))
            }
        }
    }
}
