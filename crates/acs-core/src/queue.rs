//! Bounded queue helpers.
//!
//! Producers never block indefinitely: a send that cannot complete within
//! [`QUEUE_SEND_TIMEOUT_MS`] drops the item and reports a soft error.

use crate::constants::QUEUE_SEND_TIMEOUT_MS;
use crate::{Error, Result};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::warn;

/// Send `item`, dropping it if the queue stays full for the send timeout.
///
/// # Errors
/// Returns `Error::QueueFull` when the item was dropped, either because the
/// queue stayed full or because the receiver is gone.
pub async fn send_or_drop<T>(tx: &mpsc::Sender<T>, item: T, queue: &'static str) -> Result<()> {
    match tx
        .send_timeout(item, Duration::from_millis(QUEUE_SEND_TIMEOUT_MS))
        .await
    {
        Ok(()) => Ok(()),
        Err(SendTimeoutError::Timeout(_)) => {
            warn!(queue, "queue full, dropping event");
            Err(Error::QueueFull(queue.to_string()))
        }
        Err(SendTimeoutError::Closed(_)) => {
            warn!(queue, "queue closed, dropping event");
            Err(Error::QueueFull(queue.to_string()))
        }
    }
}
