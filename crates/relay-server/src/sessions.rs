use std::sync::Arc;

use dashmap::DashMap;

use relay_core::backend::{ChatBackend, ChatSession};
use relay_core::{ClientId, RelayError};

struct SessionEntry {
    serial: u64,
    session: Arc<dyn ChatSession>,
}

/// Maps each connected client to its backend conversation. Entries pair
/// one-to-one with registry entries: the connection's serve task opens a
/// session right after registering and closes it right after
/// unregistering, using the same connection serial as the guard.
pub struct SessionStore {
    backend: Arc<dyn ChatBackend>,
    sessions: DashMap<ClientId, SessionEntry>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            sessions: DashMap::new(),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Create a fresh backend conversation for `id` and install it,
    /// dropping any session it replaces. Failure is fatal for the
    /// calling connection only.
    pub async fn open(
        &self,
        id: &ClientId,
        serial: u64,
    ) -> Result<Arc<dyn ChatSession>, RelayError> {
        let session = self
            .backend
            .open_session(id)
            .await
            .map_err(|e| match e {
                RelayError::BackendUnavailable(_) => e,
                other => RelayError::BackendUnavailable(other.to_string()),
            })?;

        let replaced = self.sessions.insert(
            id.clone(),
            SessionEntry {
                serial,
                session: Arc::clone(&session),
            },
        );
        if replaced.is_some() {
            tracing::debug!(client_id = %id, "Replaced existing chat session");
        }
        tracing::info!(client_id = %id, backend = self.backend.name(), "Created chat session");

        Ok(session)
    }

    /// Discard the session for `id` if it still belongs to `serial`.
    /// Returns whether an entry was removed.
    pub fn close(&self, id: &ClientId, serial: u64) -> bool {
        self.sessions
            .remove_if(id, |_, entry| entry.serial == serial)
            .is_some()
    }

    pub fn get(&self, id: &ClientId) -> Option<Arc<dyn ChatSession>> {
        self.sessions.get(id).map(|entry| Arc::clone(&entry.session))
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
