use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::instrument;

use relay_core::backend::{ChatBackend, ChatSession};
use relay_core::error::RelayError;
use relay_core::ids::ClientId;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Chat backend over the Gemini `generateContent` API. One HTTP client is
/// shared by every session the backend opens.
pub struct GeminiBackend {
    client: Client,
    api_key: SecretString,
    model: String,
}

impl GeminiBackend {
    pub fn new(api_key: SecretString, model: Option<&str>) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            api_key,
            model: model.unwrap_or(DEFAULT_MODEL).to_owned(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_url(&self) -> String {
        format!("{API_BASE}/{}:generateContent", self.model)
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn open_session(&self, client: &ClientId) -> Result<Arc<dyn ChatSession>, RelayError> {
        tracing::debug!(client_id = %client, model = %self.model, "Opened chat session");
        Ok(Arc::new(GeminiSession {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            url: self.generate_url(),
            history: Mutex::new(Vec::new()),
        }))
    }
}

/// One rolling conversation. The turn history lives only in memory and is
/// dropped with the session on disconnect.
struct GeminiSession {
    client: Client,
    api_key: SecretString,
    url: String,
    history: Mutex<Vec<Content>>,
}

#[async_trait]
impl ChatSession for GeminiSession {
    #[instrument(skip(self, text))]
    async fn send(&self, text: &str) -> Result<String, RelayError> {
        let mut history = self.history.lock().await;
        let body = build_request_body(&history, text);

        let resp = self
            .client
            .post(&self.url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Backend(format!("Error generating text: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(RelayError::Backend(format!(
                "Error generating text: status {status}: {detail}"
            )));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Backend(format!("Error generating text: {e}")))?;
        let reply = extract_text(&parsed)
            .ok_or_else(|| RelayError::Backend("Error generating text: empty response".into()))?;

        // Record the exchange only once it succeeded.
        history.push(Content::user(text));
        history.push(Content::model(&reply));

        Ok(reply)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

impl Content {
    fn user(text: &str) -> Self {
        Self {
            role: "user".into(),
            parts: vec![Part { text: text.into() }],
        }
    }

    fn model(text: &str) -> Self {
        Self {
            role: "model".into(),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<&'a Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

fn build_request_body<'a>(history: &'a [Content], prompt: &str) -> serde_json::Value {
    let turn = Content::user(prompt);
    let mut contents: Vec<&Content> = history.iter().collect();
    contents.push(&turn);
    serde_json::to_value(GenerateRequest { contents }).unwrap_or_default()
}

fn extract_text(resp: &GenerateResponse) -> Option<String> {
    let candidate = resp.candidates.first()?;
    let text: String = candidate
        .content
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
