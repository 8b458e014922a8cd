use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RelayError;
use crate::ids::ClientId;

/// The conversational collaborator behind the gateway. The gateway never
/// inspects conversation content; it forwards text in and text out.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Allocate a fresh stateful conversation for one client. Failure maps
    /// to `RelayError::BackendUnavailable` and is fatal for that
    /// connection only.
    async fn open_session(&self, client: &ClientId) -> Result<Arc<dyn ChatSession>, RelayError>;
}

/// Opaque handle to one stateful conversation. Dropped on disconnect;
/// history does not survive the connection.
#[async_trait]
pub trait ChatSession: Send + Sync {
    async fn send(&self, text: &str) -> Result<String, RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ChatSession for Echo {
        async fn send(&self, text: &str) -> Result<String, RelayError> {
            Ok(text.to_owned())
        }
    }

    struct EchoBackend;

    #[async_trait]
    impl ChatBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn open_session(
            &self,
            _client: &ClientId,
        ) -> Result<Arc<dyn ChatSession>, RelayError> {
            Ok(Arc::new(Echo))
        }
    }

    #[tokio::test]
    async fn traits_are_object_safe() {
        let backend: Arc<dyn ChatBackend> = Arc::new(EchoBackend);
        let session = backend
            .open_session(&ClientId::from_raw("c1"))
            .await
            .unwrap();
        assert_eq!(session.send("hi").await.unwrap(), "hi");
        assert_eq!(backend.name(), "echo");
    }
}
