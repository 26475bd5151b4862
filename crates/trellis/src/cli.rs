//! CLI definition.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use trellis_plugin_manager::PluginManager;

use crate::commands::{self, Session};

/// Install, update and remove verified registry plugins.
#[derive(Debug, Parser)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress progress output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Plugins directory (overrides the configuration file)
    #[arg(long, global = true, env = "TRELLIS_PLUGINS_DIR")]
    pub dir: Option<PathBuf>,

    /// Configuration file (defaults to <config dir>/trellis/trellis.toml)
    #[arg(long, global = true, env = "TRELLIS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install a plugin from its registry package URL
    Install(commands::install::InstallArgs),

    /// Update one installed plugin, or all of them
    Update(commands::update::UpdateArgs),

    /// Remove an installed plugin
    Uninstall(commands::uninstall::UninstallArgs),

    /// List installed plugins
    List(commands::list::ListArgs),

    /// Show registry metadata for a package without installing it
    Info(commands::info::InfoArgs),
}

impl Cli {
    /// Runs the CLI command.
    pub fn run(self) -> Result<()> {
        let config = trellis_config::load_or_default(self.config.as_deref())
            .context("failed to load configuration")?;

        let plugins_dir = match self.dir {
            Some(dir) => dir,
            None => config
                .plugins_dir()
                .context("failed to resolve plugins directory")?,
        };
        tracing::debug!(path = %plugins_dir.display(), "using plugins directory");

        let session = Session {
            manager: PluginManager::new(config.to_manager_config(plugins_dir)),
            host_version: config.host_version()?,
            quiet: self.quiet,
        };

        let rt = tokio::runtime::Runtime::new().context("failed to create async runtime")?;

        rt.block_on(async {
            match self.command {
                Commands::Install(args) => commands::install::run(&session, args).await,
                Commands::Update(args) => commands::update::run(&session, args).await,
                Commands::Uninstall(args) => commands::uninstall::run(&session, args).await,
                Commands::List(ref args) => commands::list::run(&session, args),
                Commands::Info(args) => commands::info::run(&session, args).await,
            }
        })
    }
}
