//! Install command.

use anyhow::{Context, Result};
use clap::Args;
use semver::Version;
use trellis_plugin_manager::{InstallSource, Operation, OperationOutcome};

use super::Session;

/// Arguments for the `install` command.
#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Registry package page URL
    pub url: String,

    /// Host version to check compatibility against (overrides the configuration file)
    #[arg(long)]
    pub host_version: Option<Version>,
}

/// Runs the install command.
pub async fn run(session: &Session, args: InstallArgs) -> Result<()> {
    let host_version = args.host_version.or_else(|| session.host_version.clone());

    let outcome = session
        .drive(Operation::Install {
            source: InstallSource::Reference(args.url.clone()),
            host_version,
        })
        .await
        .with_context(|| format!("failed to install {}", args.url))?;

    println!("{}", outcome.message());
    if let OperationOutcome::Installed(plugin) = &outcome {
        println!("  -> {}", plugin.path.display());
    }

    Ok(())
}
