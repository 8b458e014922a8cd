use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use relay_core::{ClientId, Frame};

/// Outbound frame queue for one connection. The writer task drains it
/// onto the socket; the dispatcher and keepalive supervisor feed it.
pub type FrameSender = mpsc::Sender<Frame>;

/// One live connection as the registry sees it. The socket itself is
/// owned by the connection's serve task; the registry holds only the
/// handles needed to reach and to close it.
struct Registration {
    serial: u64,
    tx: FrameSender,
    cancel: CancellationToken,
}

/// Registry of all connected clients, one entry per ClientId. A new
/// registration for an id that is already present supersedes the old
/// connection and closes it.
pub struct ConnectionRegistry {
    connections: DashMap<ClientId, Registration>,
    next_serial: AtomicU64,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            next_serial: AtomicU64::new(0),
            max_send_queue,
        }
    }

    /// Install a connection for `id`, cancelling any superseded one.
    /// Returns the connection serial, its outbound queue ends, and the
    /// teardown token. The serial guards `unregister` so a stale teardown
    /// cannot remove a successor's entry.
    pub fn register(
        &self,
        id: &ClientId,
    ) -> (u64, FrameSender, mpsc::Receiver<Frame>, CancellationToken) {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let cancel = CancellationToken::new();

        let superseded = self.connections.insert(
            id.clone(),
            Registration {
                serial,
                tx: tx.clone(),
                cancel: cancel.clone(),
            },
        );
        if let Some(old) = superseded {
            tracing::info!(client_id = %id, old_serial = old.serial, "Superseding existing connection");
            old.cancel.cancel();
        }

        (serial, tx, rx, cancel)
    }

    /// Remove the entry for `id` if it still belongs to `serial`.
    /// Returns whether an entry was removed.
    pub fn unregister(&self, id: &ClientId, serial: u64) -> bool {
        let removed = self
            .connections
            .remove_if(id, |_, reg| reg.serial == serial);
        if let Some((_, reg)) = removed {
            reg.cancel.cancel();
            true
        } else {
            false
        }
    }

    pub fn lookup(&self, id: &ClientId) -> Option<FrameSender> {
        self.connections.get(id).map(|reg| reg.tx.clone())
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Best-effort enqueue of a frame for `id`. A full queue drops the
    /// frame; a closed or missing connection reports false.
    pub fn send_to(&self, id: &ClientId, frame: Frame) -> bool {
        let Some(tx) = self.lookup(id) else {
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                tracing::warn!(
                    client_id = %id,
                    frame_type = frame.frame_type(),
                    "Send queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister() {
        let registry = ConnectionRegistry::new(32);
        assert_eq!(registry.count(), 0);

        let id1 = ClientId::from_raw("c1");
        let id2 = ClientId::from_raw("c2");
        let (s1, _tx1, _rx1, _t1) = registry.register(&id1);
        let (s2, _tx2, _rx2, _t2) = registry.register(&id2);
        assert_eq!(registry.count(), 2);
        assert!(registry.contains(&id1));

        assert!(registry.unregister(&id1, s1));
        assert_eq!(registry.count(), 1);
        assert!(!registry.contains(&id1));

        assert!(registry.unregister(&id2, s2));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn second_unregister_is_a_noop() {
        let registry = ConnectionRegistry::new(32);
        let id = ClientId::from_raw("c1");
        let (serial, _tx, _rx, _token) = registry.register(&id);

        assert!(registry.unregister(&id, serial));
        assert!(!registry.unregister(&id, serial));
    }

    #[test]
    fn replacement_cancels_superseded_connection() {
        let registry = ConnectionRegistry::new(32);
        let id = ClientId::from_raw("c1");

        let (old_serial, _tx1, _rx1, old_token) = registry.register(&id);
        assert!(!old_token.is_cancelled());

        let (new_serial, _tx2, _rx2, new_token) = registry.register(&id);
        assert_ne!(old_serial, new_serial);
        assert_eq!(registry.count(), 1);
        assert!(old_token.is_cancelled());
        assert!(!new_token.is_cancelled());
    }

    #[test]
    fn stale_unregister_does_not_remove_successor() {
        let registry = ConnectionRegistry::new(32);
        let id = ClientId::from_raw("c1");

        let (old_serial, _tx1, _rx1, _t1) = registry.register(&id);
        let (_new_serial, _tx2, _rx2, new_token) = registry.register(&id);

        // The superseded connection's teardown must leave the new entry alone.
        assert!(!registry.unregister(&id, old_serial));
        assert!(registry.contains(&id));
        assert!(!new_token.is_cancelled());
    }

    #[test]
    fn lookup_absent() {
        let registry = ConnectionRegistry::new(32);
        assert!(registry.lookup(&ClientId::from_raw("ghost")).is_none());
    }

    #[tokio::test]
    async fn send_to_delivers_in_order() {
        let registry = ConnectionRegistry::new(32);
        let id = ClientId::from_raw("c1");
        let (_serial, _tx, mut rx, _token) = registry.register(&id);

        assert!(registry.send_to(&id, Frame::status("processing")));
        assert!(registry.send_to(&id, Frame::response("done")));

        assert_eq!(rx.recv().await.unwrap(), Frame::status("processing"));
        assert_eq!(rx.recv().await.unwrap(), Frame::response("done"));
    }

    #[tokio::test]
    async fn send_to_full_queue_drops() {
        let registry = ConnectionRegistry::new(2);
        let id = ClientId::from_raw("c1");
        let (_serial, _tx, _rx, _token) = registry.register(&id);

        assert!(registry.send_to(&id, Frame::Ping));
        assert!(registry.send_to(&id, Frame::Ping));
        assert!(!registry.send_to(&id, Frame::Ping));
    }

    #[test]
    fn send_to_missing_client() {
        let registry = ConnectionRegistry::new(32);
        assert!(!registry.send_to(&ClientId::from_raw("ghost"), Frame::Ping));
    }
}
