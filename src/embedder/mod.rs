/// Embedder trait, error type and the local/remote facade.
///
/// A `TextEmbedder` is bound at construction to either a local ONNX
/// encoder or a remote provider and stays in that mode for its lifetime.
pub mod http;
pub mod onnx;
pub mod pooling;
pub mod remote;
pub mod tokenizer;

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::config::Config;
use http::{HttpTransport, ReqwestTransport};
use onnx::{InferenceEnvironment, OnnxEmbedder};
use remote::{ProviderConfig, RemoteEmbedder};

/// Errors that can occur during embedding and validation.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("model load failed: {0}")]
    GraphLoad(String),

    #[error("invalid model: {0}")]
    InvalidModelShape(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("OpenAI API error: {0}")]
    Provider(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl EmbedderError {
    /// HTTP-style status code for callers that surface errors over an API.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) | Self::InvalidModelShape(_) | Self::Provider(_) => 400,
            Self::FileNotFound(_) | Self::NotFound(_) => 404,
            Self::Transport(_) | Self::MalformedResponse(_) => 502,
            Self::GraphLoad(_) | Self::Tokenizer(_) | Self::Inference(_) => 500,
        }
    }
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow sharing behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;
}

/// The public embedding facade.
///
/// Local mode runs tokenize → infer → mean-pool per text; remote mode
/// makes one HTTP request per call, batched or not.
pub enum TextEmbedder {
    Local(Box<OnnxEmbedder>),
    Remote(RemoteEmbedder),
}

impl TextEmbedder {
    /// Load a local encoder and its vocabulary.
    pub fn local(
        env: &InferenceEnvironment,
        model_path: &Path,
        vocab_path: &Path,
    ) -> Result<Self, EmbedderError> {
        OnnxEmbedder::new(env, model_path, vocab_path).map(|e| Self::Local(Box::new(e)))
    }

    /// Bind to a remote provider using the default HTTP transport. No I/O.
    pub fn remote(model_id: &str, api_key: &str) -> Result<Self, EmbedderError> {
        let provider = ProviderConfig::new(model_id, api_key)?;
        let transport = ReqwestTransport::new(Duration::from_secs(
            crate::config::DEFAULT_TIMEOUT_SECS,
        ))?;
        Ok(Self::remote_with_transport(provider, Box::new(transport)))
    }

    /// Bind to a remote provider through a caller-supplied transport.
    #[must_use]
    pub fn remote_with_transport(
        provider: ProviderConfig,
        transport: Box<dyn HttpTransport>,
    ) -> Self {
        Self::Remote(RemoteEmbedder::new(provider, transport))
    }

    /// Build from configuration: remote for `openai/…` models, local otherwise.
    ///
    /// `env` is only consulted in local mode.
    pub fn from_config(
        config: &Config,
        env: Option<&InferenceEnvironment>,
    ) -> Result<Self, EmbedderError> {
        if config.is_remote() {
            let api_key = config.resolved_api_key().unwrap_or_default();
            let provider = ProviderConfig::with_api_base(&config.model, &api_key, &config.api_base)?;
            let transport = ReqwestTransport::new(Duration::from_secs(config.timeout_secs))?;
            return Ok(Self::remote_with_transport(provider, Box::new(transport)));
        }

        let env = env.ok_or_else(|| {
            EmbedderError::InvalidArgument(
                "local model requires an inference environment".to_string(),
            )
        })?;
        Self::local(env, Path::new(&config.model), Path::new(&config.vocab_path))
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Embed one text.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        match self {
            Self::Local(e) => e.embed(text),
            Self::Remote(e) => e.embed(text),
        }
    }

    /// Embed many texts, results in input order.
    ///
    /// Remote mode sends a single request. Local mode is not truly batched:
    /// it embeds each text in turn.
    pub fn batch_embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        match self {
            Self::Local(e) => e.embed_batch(texts),
            Self::Remote(e) => e.embed_batch(texts),
        }
    }

    /// Validate the bound model and return its output dimensionality.
    pub fn validate(&self) -> Result<usize, EmbedderError> {
        match self {
            Self::Local(e) => e.validate(),
            Self::Remote(e) => e.validate(),
        }
    }

    /// Validate a model file without constructing an embedder.
    pub fn validate_local(
        env: &InferenceEnvironment,
        model_path: &Path,
    ) -> Result<usize, EmbedderError> {
        onnx::validate_local(env, model_path)
    }

    /// Validate a remote model id and credential without constructing an embedder.
    pub fn validate_remote(
        model_id: &str,
        api_key: &str,
        transport: &dyn HttpTransport,
    ) -> Result<usize, EmbedderError> {
        remote::validate_remote(model_id, api_key, transport)
    }
}

impl Embedder for TextEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        TextEmbedder::embed(self, text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        self.batch_embed(texts)
    }
}
