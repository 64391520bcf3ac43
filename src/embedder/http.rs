/// HTTP transport used by the remote embedding backend.
///
/// The backend only needs `post`/`get` returning status, body and headers,
/// so the transport sits behind a trait and tests can swap in a recorder.
use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use super::EmbedderError;

/// A completed HTTP exchange, whatever its status code.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    /// Convenience constructor used by transports and test doubles.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: HashMap::new(),
        }
    }
}

/// Blocking HTTP client consumed by [`super::remote::RemoteEmbedder`].
///
/// Implementations return `Ok` for every response that arrived, including
/// non-2xx ones; `Err` is reserved for failures to complete the exchange.
pub trait HttpTransport: Send + Sync {
    fn post(
        &self,
        url: &str,
        body: String,
        headers: &[(&str, String)],
    ) -> Result<HttpResponse, EmbedderError>;

    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, EmbedderError>;
}

/// Default transport backed by `reqwest::blocking`.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Build a client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, EmbedderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("textembed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EmbedderError::Transport(format!("HTTP client build failed: {e}")))?;

        Ok(Self { client })
    }

    fn send(
        &self,
        request: reqwest::blocking::RequestBuilder,
        url: &str,
    ) -> Result<HttpResponse, EmbedderError> {
        let resp = request
            .send()
            .map_err(|e| EmbedderError::Transport(format!("request to {url} failed: {e}")))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp
            .text()
            .map_err(|e| EmbedderError::Transport(format!("failed to read body from {url}: {e}")))?;

        debug!(url, status, body_len = body.len(), "HTTP response received");

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn post(
        &self,
        url: &str,
        body: String,
        headers: &[(&str, String)],
    ) -> Result<HttpResponse, EmbedderError> {
        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        self.send(request, url)
    }

    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, EmbedderError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        self.send(request, url)
    }
}
