use std::sync::Arc;

use relay_core::{ClientId, Frame};

use crate::proxy::RequestProxy;
use crate::registry::FrameSender;
use crate::sessions::SessionStore;

/// Parses inbound payloads and routes them to the chat session, the
/// request proxy, or the keepalive protocol. Replies are queued on the
/// connection's outbound sender in receipt order; the caller awaits each
/// dispatch before reading the next frame, so one request is in flight
/// per connection at a time.
pub struct Dispatcher {
    sessions: Arc<SessionStore>,
    proxy: Arc<RequestProxy>,
}

impl Dispatcher {
    pub fn new(sessions: Arc<SessionStore>, proxy: Arc<RequestProxy>) -> Self {
        Self { sessions, proxy }
    }

    /// Handle one inbound text payload. Never fails the connection:
    /// every error is reported in-band as a frame.
    pub async fn dispatch(&self, client: &ClientId, raw: &str, tx: &FrameSender) {
        let frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(client_id = %client, error = %e, "Received invalid JSON");
                self.reply(client, tx, Frame::error("Invalid JSON message"))
                    .await;
                return;
            }
        };

        match frame {
            Frame::Message { content } => self.handle_message(client, &content, tx).await,
            Frame::Ping => {
                tracing::debug!(client_id = %client, "Received ping, sending pong");
                self.reply(client, tx, Frame::Pong).await;
            }
            Frame::ApiRequest(request) => {
                tracing::info!(client_id = %client, "Processing API request");
                let response = self.proxy.forward(&request).await;
                self.reply(client, tx, response).await;
            }
            // No acknowledgment is defined for other frame types.
            other => {
                tracing::debug!(
                    client_id = %client,
                    frame_type = other.frame_type(),
                    "Ignoring unhandled frame"
                );
            }
        }
    }

    async fn handle_message(&self, client: &ClientId, content: &str, tx: &FrameSender) {
        self.reply(client, tx, Frame::status("processing")).await;

        let Some(session) = self.sessions.get(client) else {
            // The pairing invariant makes this unreachable while the
            // connection is open; reply in-band rather than trust it.
            self.reply(
                client,
                tx,
                Frame::error("Error processing message: no active session"),
            )
            .await;
            return;
        };

        tracing::info!(client_id = %client, "Processing message");
        match session.send(content).await {
            Ok(text) => {
                self.reply(client, tx, Frame::response(text)).await;
                tracing::info!(client_id = %client, "Sent response");
            }
            Err(e) => {
                tracing::error!(client_id = %client, kind = e.error_kind(), error = %e, "Message failed");
                self.reply(client, tx, Frame::error(format!("Error processing message: {e}")))
                    .await;
            }
        }
    }

    async fn reply(&self, client: &ClientId, tx: &FrameSender, frame: Frame) {
        if tx.send(frame).await.is_err() {
            tracing::debug!(client_id = %client, "Connection closed while replying");
        }
    }
}
