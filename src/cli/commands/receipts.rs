//! Receipt listing command.

use console::style;

use crate::config::Settings;

/// Print stored receipts as a JSON array.
pub async fn cmd_receipts(settings: &Settings, owner: Option<&str>) -> anyhow::Result<()> {
    let ctx = settings.create_db_context();
    let receipts = ctx.receipts().get_all().await?;

    let receipts: Vec<_> = receipts
        .into_iter()
        .filter(|r| owner.map_or(true, |o| r.owner == o))
        .collect();

    if receipts.is_empty() {
        eprintln!("{} No receipts stored", style("!").yellow());
    }

    println!("{}", serde_json::to_string_pretty(&receipts)?);
    Ok(())
}
