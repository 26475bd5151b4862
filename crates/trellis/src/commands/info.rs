//! Info command.

use anyhow::{Context, Result};
use clap::Args;
use trellis_plugin_manager::{Operation, OperationOutcome};

use super::Session;

/// Arguments for the `info` command.
#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Registry package page URL
    pub url: String,
}

/// Runs the info command.
pub async fn run(session: &Session, args: InfoArgs) -> Result<()> {
    let outcome = session
        .drive(Operation::Resolve {
            reference: args.url.clone(),
        })
        .await
        .with_context(|| format!("failed to fetch info for {}", args.url))?;

    let metadata = match outcome {
        OperationOutcome::Resolved(metadata) => metadata,
        other => anyhow::bail!("unexpected result: {}", other.message()),
    };

    println!("Name:        {}", metadata.name);
    println!("Title:       {}", metadata.display_title);
    println!("Version:     {}", metadata.version);
    println!("Repository:  {}", metadata.repository_name);
    println!("Author:      {}", metadata.author_alias);
    if let Some(range) = &metadata.compatible_version_range {
        println!("Compatible:  {range}");
    }
    if let Some(distros) = &metadata.distro_compat {
        println!("Distros:     {distros}");
    }
    println!(
        "Archive:     {}",
        metadata.archive_url.as_deref().unwrap_or("(none)")
    );
    println!(
        "Checksum:    {}",
        metadata.archive_checksum.as_deref().unwrap_or("(none)")
    );

    let installed = session
        .manager
        .storage()
        .find(&metadata.name)
        .context("failed to read plugins directory")?;

    if let Some(installed) = installed {
        println!(
            "\nInstalled:   v{}",
            installed.version.as_deref().unwrap_or("?")
        );
    }

    Ok(())
}
