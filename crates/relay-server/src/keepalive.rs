use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use relay_core::{ClientId, Frame};

use crate::registry::FrameSender;

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn the per-connection keepalive supervisor: every `interval` it
/// enqueues a `ping` frame for the client. A closed queue means the
/// connection is gone, so the supervisor cancels the connection token,
/// which drives the same teardown path as a read error. The task itself
/// exits on that token, so it never outlives its connection.
pub fn spawn(
    client: ClientId,
    tx: FrameSender,
    cancel: CancellationToken,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match tx.try_send(Frame::Ping) {
                        Ok(()) => {
                            tracing::trace!(client_id = %client, "Sent keepalive ping");
                        }
                        Err(TrySendError::Full(_)) => {
                            // A stuffed queue is slowness, not death.
                            tracing::warn!(client_id = %client, "Send queue full, skipping keepalive ping");
                        }
                        Err(TrySendError::Closed(_)) => {
                            tracing::info!(client_id = %client, "Keepalive send failed, closing connection");
                            cancel.cancel();
                            break;
                        }
                    }
                }
            }
        }
    })
}
