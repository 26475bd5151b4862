//! Progress reporting for plugin operations.
//!
//! Operations report progress through a [`Reporter`]. Called directly, an
//! operation returns its result and the reporter only carries `info`
//! milestones. Run through [`crate::PluginManager::spawn`], the same
//! operation streams [`OperationEvent`]s ending in exactly one
//! [`OperationEvent::Success`] or [`OperationEvent::Failure`].

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cancel::CancellationToken;
use crate::registry::PackageMetadata;
use crate::storage::InstalledPlugin;
use crate::{PluginManagerError, PluginManagerResult};

/// Tag of a [`ProgressEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Info,
    Success,
    Error,
}

/// A flat, serializable view of an operation event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub kind: EventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProgressEvent {
    /// Creates an `info` event.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Info,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured data to the event.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Successful result of an operation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum OperationOutcome {
    Installed(InstalledPlugin),
    Updated(InstalledPlugin),
    Uninstalled(String),
    Listed(Vec<InstalledPlugin>),
    Resolved(PackageMetadata),
}

impl OperationOutcome {
    /// Human-readable summary.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Installed(plugin) => format!("Installed {}", describe(plugin)),
            Self::Updated(plugin) => format!("Updated {}", describe(plugin)),
            Self::Uninstalled(name) => format!("Uninstalled {name}"),
            Self::Listed(plugins) => format!("Found {} plugin(s)", plugins.len()),
            Self::Resolved(metadata) => {
                format!("Resolved {} v{}", metadata.name, metadata.version)
            }
        }
    }
}

fn describe(plugin: &InstalledPlugin) -> String {
    match &plugin.version {
        Some(version) => format!("{} v{version}", plugin.name),
        None => plugin.name.clone(),
    }
}

/// An event emitted by a spawned operation.
#[derive(Debug)]
pub enum OperationEvent {
    /// An intermediate milestone.
    Progress(ProgressEvent),
    /// The operation completed. Always the last event.
    Success(OperationOutcome),
    /// The operation failed. Always the last event.
    Failure(PluginManagerError),
}

impl OperationEvent {
    /// Returns the tag of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Progress(event) => event.kind,
            Self::Success(_) => EventKind::Success,
            Self::Failure(_) => EventKind::Error,
        }
    }

    /// Returns true for `Success` and `Failure`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }

    /// Flattens the event into a tagged `{kind, message, data}` record.
    #[must_use]
    pub fn to_progress_event(&self) -> ProgressEvent {
        match self {
            Self::Progress(event) => event.clone(),
            Self::Success(outcome) => ProgressEvent {
                kind: EventKind::Success,
                message: outcome.message(),
                data: serde_json::to_value(outcome).ok(),
            },
            Self::Failure(err) => ProgressEvent {
                kind: EventKind::Error,
                message: err.to_string(),
                data: None,
            },
        }
    }
}

/// Sink for operation progress.
///
/// A silent reporter drops everything; a channel reporter forwards events to
/// an [`OperationHandle`].
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    sender: Option<mpsc::UnboundedSender<OperationEvent>>,
}

impl Reporter {
    /// A reporter that discards events.
    #[must_use]
    pub fn silent() -> Self {
        Self::default()
    }

    /// A reporter paired with the receiving end of its event stream.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OperationEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Reports an `info` milestone.
    pub fn info(&self, message: impl Into<String>) {
        self.progress(ProgressEvent::info(message));
    }

    /// Reports a progress event.
    pub fn progress(&self, event: ProgressEvent) {
        tracing::debug!(message = %event.message, "progress");
        self.send(OperationEvent::Progress(event));
    }

    /// Sends the terminal event for `result`.
    pub(crate) fn finish(&self, result: PluginManagerResult<OperationOutcome>) {
        match result {
            Ok(outcome) => self.send(OperationEvent::Success(outcome)),
            Err(err) => self.send(OperationEvent::Failure(err)),
        }
    }

    fn send(&self, event: OperationEvent) {
        if let Some(sender) = &self.sender {
            // The receiver may have been dropped; the operation still runs to completion.
            let _ = sender.send(event);
        }
    }
}

/// Handle to an operation running in the background.
#[derive(Debug)]
pub struct OperationHandle {
    events: mpsc::UnboundedReceiver<OperationEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl OperationHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<OperationEvent>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            cancel,
            task,
        }
    }

    /// Receives the next event, or `None` once the operation has finished.
    pub async fn next_event(&mut self) -> Option<OperationEvent> {
        self.events.recv().await
    }

    /// Requests cancellation. Takes effect at the operation's next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the operation's cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Skips progress events and waits for the outcome.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or a task error if it panicked.
    pub async fn wait(mut self) -> PluginManagerResult<OperationOutcome> {
        while let Some(event) = self.events.recv().await {
            match event {
                OperationEvent::Progress(_) => {}
                OperationEvent::Success(outcome) => return Ok(outcome),
                OperationEvent::Failure(err) => return Err(err),
            }
        }

        // The stream only ends without a terminal event if the task died.
        self.task.await?;
        Err(PluginManagerError::Cancelled { stage: "operation" })
    }
}
