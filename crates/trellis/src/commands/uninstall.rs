//! Uninstall command.

use anyhow::{Context, Result};
use clap::Args;
use trellis_plugin_manager::Operation;

use super::Session;

/// Arguments for the `uninstall` command.
#[derive(Debug, Args)]
pub struct UninstallArgs {
    /// Plugin name
    pub name: String,
}

/// Runs the uninstall command.
pub async fn run(session: &Session, args: UninstallArgs) -> Result<()> {
    let outcome = session
        .drive(Operation::Uninstall {
            name: args.name.clone(),
        })
        .await
        .with_context(|| format!("failed to uninstall {}", args.name))?;

    println!("{}", outcome.message());

    Ok(())
}
