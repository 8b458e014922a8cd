use serde::{Deserialize, Serialize};

/// One self-contained protocol message. Frames are the only unit of
/// communication on a connection, in both directions; there is no partial
/// or streamed framing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "connected")]
    Connected { content: String },

    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        content: String,
    },

    #[serde(rename = "status")]
    Status { content: String },

    #[serde(rename = "response")]
    Response { content: String },

    #[serde(rename = "error")]
    Error { content: String },

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "api_request")]
    ApiRequest(ProxyRequest),

    #[serde(rename = "api_response")]
    ApiResponse {
        status: u16,
        data: serde_json::Value,
        #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
        headers: serde_json::Map<String, serde_json::Value>,
    },

    /// Well-formed frame with an unrecognized `type`. Parsed but never
    /// acted on, and never serialized onto the wire.
    #[serde(other, rename = "unknown")]
    Unknown,
}

impl Frame {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }

    pub fn status(content: impl Into<String>) -> Self {
        Self::Status {
            content: content.into(),
        }
    }

    pub fn response(content: impl Into<String>) -> Self {
        Self::Response {
            content: content.into(),
        }
    }

    /// The 500-class `api_response` shape used for every proxy failure.
    pub fn api_error(message: impl Into<String>) -> Self {
        Self::ApiResponse {
            status: 500,
            data: serde_json::json!({ "error": message.into() }),
            headers: serde_json::Map::new(),
        }
    }

    /// Frame type discriminator as it appears on the wire.
    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Message { .. } => "message",
            Self::Status { .. } => "status",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::ApiRequest(_) => "api_request",
            Self::ApiResponse { .. } => "api_response",
            Self::Unknown => "unknown",
        }
    }
}

/// A single outbound HTTP call requested by a client over its connection.
/// Transient; nothing is retained past the forwarded call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub method: ProxyMethod,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub headers: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// HTTP verbs the proxy will forward. A body is attached only for the
/// verbs that carry one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyMethod {
    #[default]
    #[serde(rename = "GET", alias = "get")]
    Get,
    #[serde(rename = "POST", alias = "post")]
    Post,
    #[serde(rename = "PUT", alias = "put")]
    Put,
    #[serde(rename = "PATCH", alias = "patch")]
    Patch,
    #[serde(rename = "DELETE", alias = "delete")]
    Delete,
}

impl ProxyMethod {
    pub fn carries_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}
