/// Remote embedding backend for OpenAI-compatible providers.
///
/// Sends `POST {api_base}/embeddings` for single and batched input and
/// `GET {api_base}/models` for credential/model validation. The provider
/// does not report output dimensionality, so it is inferred from the
/// model family name.
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::http::{HttpResponse, HttpTransport};
use super::{Embedder, EmbedderError};

/// Prefix that marks a model identifier as remote, e.g. `openai/text-embedding-ada-002`.
pub const PROVIDER_PREFIX: &str = "openai/";

/// Length of [`PROVIDER_PREFIX`]; stripped before the name is sent upstream.
pub const PROVIDER_PREFIX_LEN: usize = 7;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Dimensionality assumed for model families the heuristic does not know.
pub const FALLBACK_DIMENSIONS: usize = 768;

/// Provider model identifier plus credential. Immutable once built.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    model_id: String,
    api_key: String,
    api_base: String,
}

impl ProviderConfig {
    /// Build a config against the default OpenAI API base.
    ///
    /// Performs no I/O. Fails with `InvalidArgument` when either value is
    /// empty or the identifier is too short to carry the provider prefix.
    pub fn new(model_id: &str, api_key: &str) -> Result<Self, EmbedderError> {
        Self::with_api_base(model_id, api_key, DEFAULT_API_BASE)
    }

    pub fn with_api_base(
        model_id: &str,
        api_key: &str,
        api_base: &str,
    ) -> Result<Self, EmbedderError> {
        check_arguments(model_id, api_key)?;

        Ok(Self {
            model_id: model_id.to_string(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Full identifier, including the provider prefix.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Identifier with the provider prefix removed, as the API expects it.
    #[must_use]
    pub fn model_name(&self) -> &str {
        // check_arguments guarantees the prefix boundary is valid
        self.model_id.get(PROVIDER_PREFIX_LEN..).unwrap_or_default()
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.api_base)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.api_base)
    }

    fn auth_header(&self) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", self.api_key))
    }
}

/// Reject identifiers and credentials that can never be valid.
fn check_arguments(model_id: &str, api_key: &str) -> Result<(), EmbedderError> {
    if model_id.is_empty()
        || api_key.is_empty()
        || model_id.len() < PROVIDER_PREFIX_LEN
        || !model_id.is_char_boundary(PROVIDER_PREFIX_LEN)
    {
        return Err(EmbedderError::InvalidArgument(
            "invalid OpenAI model path or API key".to_string(),
        ));
    }
    Ok(())
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    Single(&'a str),
    Batch(&'a [&'a str]),
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: EmbeddingInput<'a>,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

// ── Backend ──────────────────────────────────────────────────────────

/// Embedder that delegates to a remote provider over HTTP.
pub struct RemoteEmbedder {
    provider: ProviderConfig,
    transport: Box<dyn HttpTransport>,
}

impl RemoteEmbedder {
    #[must_use]
    pub fn new(provider: ProviderConfig, transport: Box<dyn HttpTransport>) -> Self {
        Self {
            provider,
            transport,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Check that the model exists for this credential and infer its dimensionality.
    pub fn validate(&self) -> Result<usize, EmbedderError> {
        validate_with(&self.provider, self.transport.as_ref())
    }

    fn create_embeddings(
        &self,
        input: EmbeddingInput<'_>,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let request = EmbeddingRequest {
            input,
            model: self.provider.model_name(),
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| EmbedderError::InvalidArgument(format!("failed to encode request: {e}")))?;

        let headers = [
            self.provider.auth_header(),
            ("Content-Type", "application/json".to_string()),
        ];
        let resp = self
            .transport
            .post(&self.provider.embeddings_url(), body, &headers)?;
        let resp = ensure_ok(resp)?;

        let parsed: EmbeddingResponse = serde_json::from_str(&resp.body).map_err(|e| {
            EmbedderError::MalformedResponse(format!("invalid embeddings response: {e}"))
        })?;

        order_embeddings(parsed.data, expected)
    }
}

impl Embedder for RemoteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut embeddings = self.create_embeddings(EmbeddingInput::Single(text), 1)?;
        embeddings
            .pop()
            .ok_or_else(|| EmbedderError::MalformedResponse("no embedding in response".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.create_embeddings(EmbeddingInput::Batch(texts), texts.len())?;
        info!(
            model = self.provider.model_name(),
            count = embeddings.len(),
            "remote batch embedded"
        );
        Ok(embeddings)
    }
}

/// Validate a remote model identifier and credential.
///
/// Lists the provider's models, confirms the stripped name is present and
/// returns the dimensionality inferred by [`infer_dimensions`].
pub fn validate_remote(
    model_id: &str,
    api_key: &str,
    transport: &dyn HttpTransport,
) -> Result<usize, EmbedderError> {
    let provider = ProviderConfig::new(model_id, api_key)?;
    validate_with(&provider, transport)
}

pub(crate) fn validate_with(
    provider: &ProviderConfig,
    transport: &dyn HttpTransport,
) -> Result<usize, EmbedderError> {
    let resp = transport.get(&provider.models_url(), &[provider.auth_header()])?;
    let resp = ensure_ok(resp)?;

    let models: ModelList = serde_json::from_str(&resp.body)
        .map_err(|e| EmbedderError::MalformedResponse(format!("invalid model listing: {e}")))?;

    let name = provider.model_name();
    if !models.data.iter().any(|m| m.id == name) {
        warn!(model = name, "model not offered by provider");
        return Err(EmbedderError::NotFound(format!(
            "OpenAI model not found: {name}"
        )));
    }

    let dims = infer_dimensions(name);
    info!(model = name, dims, "remote model validated");
    Ok(dims)
}

/// Guess output dimensionality from the model family name.
///
/// The provider's listing carries no dimension field, so known families
/// are matched by name fragment and anything else falls back to 768.
#[must_use]
pub fn infer_dimensions(model_name: &str) -> usize {
    if model_name.contains("-ada-") {
        if model_name.ends_with("002") { 1536 } else { 1024 }
    } else if model_name.contains("-davinci-") {
        12288
    } else if model_name.contains("-curie-") {
        4096
    } else if model_name.contains("-babbage-") {
        2048
    } else {
        FALLBACK_DIMENSIONS
    }
}

fn ensure_ok(resp: HttpResponse) -> Result<HttpResponse, EmbedderError> {
    if resp.status != 200 {
        error!(status = resp.status, body = %resp.body, "OpenAI API error");
        return Err(EmbedderError::Provider(resp.body));
    }
    Ok(resp)
}

/// Put response items back in request order.
///
/// Items are placed by their `index` field when every item has one;
/// when none do, listed order is trusted.
fn order_embeddings(
    data: Vec<EmbeddingData>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbedderError> {
    if data.len() != expected {
        return Err(EmbedderError::MalformedResponse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    let indexed = data.iter().filter(|d| d.index.is_some()).count();
    if indexed == 0 {
        return Ok(data.into_iter().map(|d| d.embedding).collect());
    }
    if indexed != data.len() {
        return Err(EmbedderError::MalformedResponse(
            "response mixes indexed and unindexed embeddings".to_string(),
        ));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in data {
        let idx = item.index.unwrap_or_default();
        let slot = slots.get_mut(idx).ok_or_else(|| {
            EmbedderError::MalformedResponse(format!("embedding index {idx} out of range"))
        })?;
        if slot.replace(item.embedding).is_some() {
            return Err(EmbedderError::MalformedResponse(format!(
                "duplicate embedding index {idx}"
            )));
        }
    }

    // Length and uniqueness checks above leave every slot filled.
    Ok(slots.into_iter().flatten().collect())
}
