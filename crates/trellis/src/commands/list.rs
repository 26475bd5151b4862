//! List command.

use anyhow::{Context, Result};
use clap::Args;
use trellis_plugin_manager::Reporter;

use super::Session;

/// Arguments for the `list` command.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,
}

/// Runs the list command.
pub fn run(session: &Session, args: &ListArgs) -> Result<()> {
    let plugins = session
        .manager
        .list(&Reporter::silent())
        .context("failed to list installed plugins")?;

    if args.json {
        let json = serde_json::to_string_pretty(&plugins).context("failed to serialize listing")?;
        println!("{json}");
        return Ok(());
    }

    if plugins.is_empty() {
        println!("No plugins installed.");
        return Ok(());
    }

    println!("Installed plugins:\n");

    for plugin in &plugins {
        let version = plugin.version.as_deref().unwrap_or("?");
        println!("  {} v{version}", plugin.name);
        if let Some(title) = &plugin.title {
            println!("    {title}");
        }
        if !plugin.provenance.url.is_empty() {
            println!("    {}", plugin.provenance.url);
        }
    }

    Ok(())
}
