use super::context::Context;
use anyhow::Result;
use xtrasnap_core::Error;

pub async fn run(cli: &crate::Cli) -> Result<()> {
    let ctx = Context::load(cli)?;
    let err = Error::Other("This is only a test".to_string());
    ctx.alerter.alert_error("Testing alerting", &err).await;
    println!("Test alert sent");
    Ok(())
}
