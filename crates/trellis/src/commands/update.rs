//! Update command.

use anyhow::{Context, Result};
use clap::Args;
use semver::Version;
use trellis_plugin_manager::{Operation, PluginManagerError, Reporter};

use super::Session;

/// Arguments for the `update` command.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Plugin name (updates all if not specified)
    pub name: Option<String>,

    /// Host version to check compatibility against (overrides the configuration file)
    #[arg(long)]
    pub host_version: Option<Version>,
}

/// Result of updating a single plugin.
enum Updated {
    Yes(String),
    UpToDate(String),
}

impl Updated {
    fn message(&self) -> &str {
        match self {
            Self::Yes(message) | Self::UpToDate(message) => message,
        }
    }
}

/// Runs the update command.
pub async fn run(session: &Session, args: UpdateArgs) -> Result<()> {
    let host_version = args.host_version.or_else(|| session.host_version.clone());

    if let Some(name) = args.name {
        let status = update_one(session, &name, host_version)
            .await
            .with_context(|| format!("failed to update {name}"))?;
        println!("{}", status.message());
        return Ok(());
    }

    let plugins = session
        .manager
        .list(&Reporter::silent())
        .context("failed to list installed plugins")?;

    if plugins.is_empty() {
        println!("No plugins installed.");
        return Ok(());
    }

    let mut updated = 0;
    let mut up_to_date = 0;
    let mut errors = 0;

    for plugin in &plugins {
        println!("Checking {}...", plugin.name);

        match update_one(session, &plugin.name, host_version.clone()).await {
            Ok(status) => {
                println!("  {}", status.message());
                match status {
                    Updated::Yes(_) => updated += 1,
                    Updated::UpToDate(_) => up_to_date += 1,
                }
            }
            Err(err) => {
                println!("  error: {err}");
                errors += 1;
            }
        }
    }

    println!();
    if updated > 0 {
        println!("Updated {updated} plugin(s)");
    }
    if up_to_date > 0 {
        println!("{up_to_date} plugin(s) already up to date");
    }
    if errors > 0 {
        anyhow::bail!("{errors} plugin(s) failed to update");
    }

    Ok(())
}

/// Updates `name`, treating "no newer version" as success.
async fn update_one(
    session: &Session,
    name: &str,
    host_version: Option<Version>,
) -> Result<Updated, PluginManagerError> {
    let result = session
        .drive(Operation::Update {
            name: name.to_string(),
            host_version,
        })
        .await;

    match result {
        Ok(outcome) => Ok(Updated::Yes(outcome.message())),
        Err(PluginManagerError::NoUpdateAvailable { installed, .. }) => Ok(Updated::UpToDate(
            format!("{name} is up to date ({installed})"),
        )),
        Err(err) => Err(err),
    }
}
