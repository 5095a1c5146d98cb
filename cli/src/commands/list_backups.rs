use super::context::Context;
use anyhow::{Result, anyhow};
use clap::Args;
use xtrasnap_backends::list_all;
use xtrasnap_core::catalog::{find_relevant_since, parse_timestamp};

#[derive(Args)]
pub struct ListBackupsCommand {
    #[arg(long, help = "Only show the restore chain for this time (YYYYMMDDHHMM)")]
    timestamp: Option<String>,

    #[arg(long, help = "Output format (table, json)")]
    format: Option<String>,
}

impl ListBackupsCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = Context::load(cli)?;
        let listing = list_all(ctx.backend.as_ref(), &ctx.hostname).await?;

        let records = match self.timestamp.as_deref() {
            Some(value) => {
                let cutoff = parse_timestamp(value)
                    .ok_or_else(|| anyhow!("Invalid timestamp {}, expected YYYYMMDDHHMM", value))?;
                let mut chain = find_relevant_since(cutoff, &listing.records);
                chain.reverse();
                chain
            }
            None => listing.records,
        };

        match self.format.as_deref().unwrap_or("table") {
            "table" => {
                if records.is_empty() {
                    println!("No backups found");
                } else {
                    println!("{:<8} {:<18} {:<12} {:>10} {}", "Lineage", "Created", "Type", "Size (GB)", "Key");
                    println!("{:-<100}", "");
                    for record in &records {
                        println!(
                            "{:<8} {:<18} {:<12} {:>10.2} {}",
                            record.lineage_id,
                            record.created_at.format("%Y-%m-%d %H:%M"),
                            record.backup_type,
                            record.size_in_gb(),
                            record.path
                        );
                    }
                }
                if !listing.discarded.is_empty() {
                    println!("{} object(s) skipped: not backups", listing.discarded.len());
                }
            }
            "json" => {
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
            format => return Err(anyhow!("Unsupported format: {}", format)),
        }

        Ok(())
    }
}
