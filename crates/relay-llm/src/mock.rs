use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use relay_core::backend::{ChatBackend, ChatSession};
use relay_core::error::RelayError;
use relay_core::ids::ClientId;

/// Pre-programmed replies for deterministic testing without API calls.
#[derive(Clone)]
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Fail the send with this error.
    Error(RelayError),
    /// Wait a duration, then resolve the inner reply.
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn text(s: &str) -> Self {
        Self::Text(s.to_owned())
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delayed(delay, Box::new(inner))
    }
}

enum Mode {
    /// Every send answers `echo: <input>`, indefinitely.
    Echo,
    /// Replies consumed in order across all sessions; exhaustion is an error.
    Scripted(Mutex<VecDeque<MockReply>>),
}

struct MockState {
    mode: Mode,
    open_failure: Option<String>,
    opens: AtomicUsize,
    sends: AtomicUsize,
}

/// Mock chat backend. Sessions opened from one backend share its script
/// and counters, so a test can assert on traffic across many connections.
pub struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    /// Backend whose sessions echo their input forever.
    pub fn echo() -> Self {
        Self::with_mode(Mode::Echo, None)
    }

    /// Backend whose sessions consume `replies` in order.
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self::with_mode(Mode::Scripted(Mutex::new(replies.into())), None)
    }

    /// Backend that refuses to open sessions.
    pub fn unavailable(reason: &str) -> Self {
        Self::with_mode(Mode::Echo, Some(reason.to_owned()))
    }

    fn with_mode(mode: Mode, open_failure: Option<String>) -> Self {
        Self {
            state: Arc::new(MockState {
                mode,
                open_failure,
                opens: AtomicUsize::new(0),
                sends: AtomicUsize::new(0),
            }),
        }
    }

    /// Sessions opened so far.
    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::Relaxed)
    }

    /// Messages sent across all sessions so far.
    pub fn send_count(&self) -> usize {
        self.state.sends.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open_session(&self, _client: &ClientId) -> Result<Arc<dyn ChatSession>, RelayError> {
        if let Some(reason) = &self.state.open_failure {
            return Err(RelayError::BackendUnavailable(reason.clone()));
        }
        self.state.opens.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockSession {
    state: Arc<MockState>,
}

#[async_trait]
impl ChatSession for MockSession {
    async fn send(&self, text: &str) -> Result<String, RelayError> {
        self.state.sends.fetch_add(1, Ordering::Relaxed);

        let reply = match &self.state.mode {
            Mode::Echo => return Ok(format!("echo: {text}")),
            Mode::Scripted(script) => script.lock().pop_front(),
        };

        let Some(reply) = reply else {
            return Err(RelayError::Backend("mock script exhausted".into()));
        };

        let mut current = reply;
        loop {
            match current {
                MockReply::Text(s) => return Ok(s),
                MockReply::Error(e) => return Err(e),
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    current = *inner;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_replies_indefinitely() {
        let backend = MockBackend::echo();
        let session = backend
            .open_session(&ClientId::from_raw("c1"))
            .await
            .unwrap();
        assert_eq!(session.send("hi").await.unwrap(), "echo: hi");
        assert_eq!(session.send("again").await.unwrap(), "echo: again");
        assert_eq!(backend.send_count(), 2);
        assert_eq!(backend.open_count(), 1);
    }

    #[tokio::test]
    async fn scripted_replies_in_order() {
        let backend = MockBackend::scripted(vec![
            MockReply::text("first"),
            MockReply::Error(RelayError::Backend("boom".into())),
            MockReply::text("third"),
        ]);
        let session = backend
            .open_session(&ClientId::from_raw("c1"))
            .await
            .unwrap();

        assert_eq!(session.send("a").await.unwrap(), "first");
        assert!(session.send("b").await.is_err());
        assert_eq!(session.send("c").await.unwrap(), "third");
    }

    #[tokio::test]
    async fn script_exhaustion_is_an_error() {
        let backend = MockBackend::scripted(vec![MockReply::text("only")]);
        let session = backend
            .open_session(&ClientId::from_raw("c1"))
            .await
            .unwrap();
        let _ = session.send("a").await;
        let err = session.send("b").await.unwrap_err();
        assert!(err.to_string().contains("exhausted"));
    }

    #[tokio::test]
    async fn unavailable_backend_refuses_sessions() {
        let backend = MockBackend::unavailable("no capacity");
        let err = backend
            .open_session(&ClientId::from_raw("c1"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::BackendUnavailable(_)));
        assert_eq!(backend.open_count(), 0);
    }

    #[tokio::test]
    async fn delayed_reply_waits() {
        tokio::time::pause();
        let backend = MockBackend::scripted(vec![MockReply::delayed(
            Duration::from_secs(5),
            MockReply::text("late"),
        )]);
        let session = backend
            .open_session(&ClientId::from_raw("c1"))
            .await
            .unwrap();

        let start = tokio::time::Instant::now();
        assert_eq!(session.send("a").await.unwrap(), "late");
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn sessions_share_one_script() {
        let backend = MockBackend::scripted(vec![MockReply::text("one"), MockReply::text("two")]);
        let s1 = backend
            .open_session(&ClientId::from_raw("c1"))
            .await
            .unwrap();
        let s2 = backend
            .open_session(&ClientId::from_raw("c2"))
            .await
            .unwrap();

        assert_eq!(s1.send("a").await.unwrap(), "one");
        assert_eq!(s2.send("b").await.unwrap(), "two");
        assert_eq!(backend.open_count(), 2);
    }
}
