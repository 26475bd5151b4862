//! CLI commands.

pub mod info;
pub mod install;
pub mod list;
pub mod uninstall;
pub mod update;

use semver::Version;
use trellis_plugin_manager::{
    Operation, OperationEvent, OperationOutcome, PluginManager, PluginManagerError,
};

/// State shared by every command.
#[derive(Debug)]
pub struct Session {
    pub manager: PluginManager,
    /// Host version from the configuration file, used unless overridden.
    pub host_version: Option<Version>,
    pub quiet: bool,
}

impl Session {
    /// Runs `operation` in the background, printing its progress until it finishes.
    ///
    /// Ctrl-C cancels the operation; it then fails at its next checkpoint.
    pub async fn drive(
        &self,
        operation: Operation,
    ) -> Result<OperationOutcome, PluginManagerError> {
        let mut handle = self.manager.spawn(operation);
        let cancel = handle.cancellation_token().clone();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;

        loop {
            let event = tokio::select! {
                event = handle.next_event() => event,
                _ = &mut ctrl_c, if !interrupted => {
                    interrupted = true;
                    eprintln!("Cancelling...");
                    cancel.cancel();
                    continue;
                }
            };

            match event {
                Some(OperationEvent::Progress(progress)) => self.progress(&progress.message),
                Some(OperationEvent::Success(outcome)) => return Ok(outcome),
                Some(OperationEvent::Failure(err)) => return Err(err),
                None => return handle.wait().await,
            }
        }
    }

    /// Prints a progress line to stderr unless quiet.
    pub fn progress(&self, message: &str) {
        if !self.quiet {
            eprintln!("  {message}");
        }
    }
}
