use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tokio::sync::OnceCell;

use relay_core::{Frame, ProxyMethod, ProxyRequest, RelayError};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Forwards arbitrary outbound HTTP calls requested by clients and shapes
/// the result as an `api_response` frame. Every code path yields a
/// well-formed frame, so the dispatcher's single-reply invariant holds.
///
/// All connections share one HTTP client, created on the first forwarded
/// call and reused for the process lifetime.
pub struct RequestProxy {
    client: OnceCell<Client>,
    timeout: Duration,
}

impl RequestProxy {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: OnceCell::new(),
            timeout,
        }
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async { Client::new() })
            .await
    }

    /// Forward one request. Failures of any kind come back as the
    /// 500-class `api_response` shape rather than an error.
    pub async fn forward(&self, request: &ProxyRequest) -> Frame {
        match self.try_forward(request).await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(
                    endpoint = request.endpoint.as_deref().unwrap_or("<missing>"),
                    kind = e.error_kind(),
                    error = %e,
                    "Proxy request failed"
                );
                Frame::api_error(format!("Error forwarding API request: {e}"))
            }
        }
    }

    async fn try_forward(&self, request: &ProxyRequest) -> Result<Frame, RelayError> {
        let endpoint = request
            .endpoint
            .as_deref()
            .ok_or_else(|| RelayError::ProxyTransport("missing endpoint".into()))?;

        tracing::info!(endpoint, method = request.method.as_str(), "Forwarding API request");

        let mut builder = self
            .client()
            .await
            .request(to_reqwest_method(request.method), endpoint)
            .query(&query_pairs(&request.params))
            .headers(build_headers(&request.headers)?)
            .timeout(self.timeout);

        if request.method.carries_body() {
            if let Some(body) = &request.body {
                builder = match body {
                    serde_json::Value::String(raw) => builder.body(raw.clone()),
                    structured => builder.json(structured),
                };
            }
        }

        let map_send_err = |e: reqwest::Error| {
            if e.is_timeout() {
                RelayError::ProxyTimeout {
                    endpoint: endpoint.to_owned(),
                    seconds: self.timeout.as_secs(),
                }
            } else {
                RelayError::ProxyTransport(e.to_string())
            }
        };

        let resp = builder.send().await.map_err(map_send_err)?;

        let status = resp.status().as_u16();
        let headers = response_headers(resp.headers());
        let text = resp.text().await.map_err(map_send_err)?;
        let data = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        tracing::debug!(endpoint, status, "Proxy response received");

        Ok(Frame::ApiResponse {
            status,
            data,
            headers,
        })
    }
}

impl Default for RequestProxy {
    fn default() -> Self {
        Self::new()
    }
}

fn to_reqwest_method(method: ProxyMethod) -> reqwest::Method {
    match method {
        ProxyMethod::Get => reqwest::Method::GET,
        ProxyMethod::Post => reqwest::Method::POST,
        ProxyMethod::Put => reqwest::Method::PUT,
        ProxyMethod::Patch => reqwest::Method::PATCH,
        ProxyMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Query values pass through unmodified; non-string scalars are rendered
/// the way they appeared in the frame.
fn query_pairs(params: &serde_json::Map<String, serde_json::Value>) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), scalar_string(v)))
        .collect()
}

fn build_headers(
    headers: &serde_json::Map<String, serde_json::Value>,
) -> Result<HeaderMap, RelayError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RelayError::ProxyTransport(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(&scalar_string(value))
            .map_err(|e| RelayError::ProxyTransport(format!("invalid header value: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn response_headers(headers: &HeaderMap) -> serde_json::Map<String, serde_json::Value> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), serde_json::Value::from(v)))
        })
        .collect()
}

fn scalar_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
