//! Cooperative cancellation checkpoints.

use std::future::Future;

pub use tokio_util::sync::CancellationToken;

use crate::{PluginManagerError, PluginManagerResult};

/// Fails with [`PluginManagerError::Cancelled`] if `cancel` has fired.
///
/// # Errors
///
/// Returns an error if the token is cancelled.
pub fn checkpoint(cancel: &CancellationToken, stage: &'static str) -> PluginManagerResult<()> {
    if cancel.is_cancelled() {
        tracing::debug!(stage, "operation cancelled");
        return Err(PluginManagerError::Cancelled { stage });
    }
    Ok(())
}

/// Awaits `operation` unless `cancel` fires first.
///
/// The token is checked before `operation` is first polled, so an already
/// cancelled token never starts the work.
///
/// # Errors
///
/// Returns an error if the token is cancelled before `operation` completes.
pub async fn run_cancellable<F, T>(
    cancel: &CancellationToken,
    stage: &'static str,
    operation: F,
) -> PluginManagerResult<T>
where
    F: Future<Output = T>,
{
    checkpoint(cancel, stage)?;

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(PluginManagerError::Cancelled { stage }),
        result = operation => Ok(result),
    }
}
