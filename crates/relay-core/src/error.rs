/// Typed error hierarchy for gateway operations.
///
/// Errors are classified by blast radius: most are recovered per-frame and
/// reported to the client in-band; only session-creation failure and a dead
/// transport end the connection. Nothing here may cross a connection
/// boundary or take down the process.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RelayError {
    // Recovered per-frame
    #[error("Invalid JSON message")]
    Protocol,
    #[error("{0}")]
    Backend(String),
    #[error("proxy request to {endpoint} timed out after {seconds}s")]
    ProxyTimeout { endpoint: String, seconds: u64 },
    #[error("{0}")]
    ProxyTransport(String),

    // Fatal for the connection
    #[error("Failed to create chat session: {0}")]
    BackendUnavailable(String),
    #[error("transport closed")]
    TransportClosed,
}

impl RelayError {
    /// True when the error ends the connection instead of being reported
    /// in-band and recovered.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::TransportClosed)
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Backend(_) => "backend",
            Self::ProxyTimeout { .. } => "proxy_timeout",
            Self::ProxyTransport(_) => "proxy_transport",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::TransportClosed => "transport_closed",
        }
    }
}
