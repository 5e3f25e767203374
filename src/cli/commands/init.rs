//! Initialize command.

use console::style;

use crate::config::{ScriptConfig, Settings};
use crate::services::{JobPool, ScriptRunner};

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let ctx = settings.create_db_context();
    ctx.init_schema().await?;
    println!(
        "  {} Database ready: {}",
        style("✓").green(),
        settings.database_url()
    );

    check_script("OCR", &settings.ocr);
    check_script("Analysis", &settings.analysis);

    println!(
        "{} Initialized receiptd in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}

fn check_script(label: &str, config: &ScriptConfig) {
    let runner = ScriptRunner::new(label, config.clone(), JobPool::new(1));
    let command_line = std::iter::once(config.command.as_str())
        .chain(config.args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    if runner.is_available() {
        println!(
            "  {} {} script: {}",
            style("✓").green(),
            label,
            command_line
        );
    } else {
        println!(
            "  {} {} script not found: {}",
            style("!").yellow(),
            label,
            command_line
        );
        println!("    {}", runner.availability_hint());
    }
}
