/// ONNX Runtime embedder using the `ort` crate.
///
/// Loads a BERT-style encoder graph, discovers its token-embedding output
/// by shape, runs single-sequence inference and mean-pools the per-token
/// vectors into one sentence vector.
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use ort::session::Session;
use ort::value::Tensor;
use tracing::{info, warn};

use super::pooling::mean_pool;
use super::tokenizer::{BertTokenizer, EncodedInput};
use super::{Embedder, EmbedderError};

/// Graph inputs every supported model must declare, in this positional order.
pub const INPUT_NAMES: [&str; 3] = ["input_ids", "attention_mask", "token_type_ids"];

/// Dimension value ONNX reports for a symbolic (variable) axis.
const DYNAMIC_DIM: i64 = -1;

// ── Environment ──────────────────────────────────────────────────────

/// Environment variable naming the ONNX Runtime shared library.
pub const RUNTIME_LIBRARY_ENV: &str = "ORT_DYLIB_PATH";

#[cfg(target_os = "windows")]
const DEFAULT_RUNTIME_LIBRARY: &str = "onnxruntime.dll";
#[cfg(target_os = "macos")]
const DEFAULT_RUNTIME_LIBRARY: &str = "libonnxruntime.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DEFAULT_RUNTIME_LIBRARY: &str = "libonnxruntime.so";

/// Process-wide ONNX Runtime environment.
///
/// Create one at startup and pass it to every local load; sessions are
/// only opened through it. The runtime library is loaded through
/// `ort::init_from`, so a missing or incompatible library surfaces as
/// `GraphLoad` instead of a panic.
#[derive(Debug)]
pub struct InferenceEnvironment {
    name: String,
    library: PathBuf,
    committed: AtomicBool,
}

impl InferenceEnvironment {
    /// Load the runtime library (`ORT_DYLIB_PATH` or the platform default)
    /// and commit the environment.
    pub fn init(name: &str) -> Result<Self, EmbedderError> {
        let env = Self::new(name);
        env.load_runtime()?;
        Ok(env)
    }

    /// Describe an environment without loading anything yet.
    ///
    /// The runtime is loaded on the first session open.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let library = std::env::var(RUNTIME_LIBRARY_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_RUNTIME_LIBRARY.to_string());
        Self::with_library(name, library)
    }

    #[must_use]
    pub fn with_library(name: &str, library: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            library: library.into(),
            committed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn library(&self) -> &Path {
        &self.library
    }

    /// Load the runtime library and commit the environment once.
    pub fn load_runtime(&self) -> Result<(), EmbedderError> {
        if self.committed.load(Ordering::Acquire) {
            return Ok(());
        }

        let builder = ort::init_from(&self.library).map_err(|e| {
            EmbedderError::GraphLoad(format!(
                "failed to load ONNX Runtime from {}: {e}",
                self.library.display()
            ))
        })?;
        let committed = builder.with_name(self.name.as_str()).commit();
        self.committed.store(true, Ordering::Release);

        info!(
            name = %self.name,
            library = %self.library.display(),
            committed,
            "ONNX Runtime environment initialized"
        );
        Ok(())
    }

    fn open_session(&self, model_path: &Path) -> Result<Session, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::FileNotFound(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        self.load_runtime()?;
        info!("Loading model from: {}", model_path.display());

        Session::builder()
            .map_err(|e| EmbedderError::GraphLoad(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::GraphLoad(format!("thread config error: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| EmbedderError::GraphLoad(format!("model load error: {e}")))
    }
}

// ── Graph signature ──────────────────────────────────────────────────

/// Name and declared shape of one graph input or output.
///
/// Symbolic dimensions are `-1`; non-tensor values have an empty shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<i64>,
}

impl TensorSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, shape: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// Hidden size if this looks like a `[batch, sequence, hidden]` token-embedding output.
    #[must_use]
    pub fn token_embedding_dim(&self) -> Option<usize> {
        match self.shape.as_slice() {
            &[DYNAMIC_DIM, DYNAMIC_DIM, hidden] if hidden > 0 => usize::try_from(hidden).ok(),
            _ => None,
        }
    }
}

/// Declared inputs and outputs of a loaded graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSignature {
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}

impl GraphSignature {
    fn read(session: &Session) -> Self {
        let inputs = session
            .inputs()
            .iter()
            .map(|i| TensorSpec::new(i.name(), shape_of(i.dtype())))
            .collect();
        let outputs = session
            .outputs()
            .iter()
            .map(|o| TensorSpec::new(o.name(), shape_of(o.dtype())))
            .collect();

        Self { inputs, outputs }
    }
}

fn shape_of(value_type: &ort::value::ValueType) -> Vec<i64> {
    value_type
        .tensor_shape()
        .map(|shape| shape.iter().copied().collect())
        .unwrap_or_default()
}

/// Pick the token-embedding output: the first rank-3 tensor whose batch and
/// sequence axes are dynamic and whose hidden axis is a fixed positive size.
#[must_use]
pub fn select_output_tensor(outputs: &[TensorSpec]) -> Option<&TensorSpec> {
    outputs.iter().find(|o| o.token_embedding_dim().is_some())
}

/// Check a graph against the encoder contract and return its embedding size.
pub fn check_signature(signature: &GraphSignature) -> Result<usize, EmbedderError> {
    if signature.inputs.len() != INPUT_NAMES.len() {
        return Err(EmbedderError::InvalidModelShape(format!(
            "input count is {}, expected {}",
            signature.inputs.len(),
            INPUT_NAMES.len()
        )));
    }

    for (position, (input, expected)) in signature.inputs.iter().zip(INPUT_NAMES).enumerate() {
        if input.name != expected {
            return Err(EmbedderError::InvalidModelShape(format!(
                "{expected} tensor not found at input {position} (found {})",
                input.name
            )));
        }
    }

    select_output_tensor(&signature.outputs)
        .and_then(TensorSpec::token_embedding_dim)
        .ok_or_else(|| {
            EmbedderError::InvalidModelShape(
                "no output shaped [dynamic, dynamic, hidden]".to_string(),
            )
        })
}

/// Validate a model file without keeping it loaded.
pub fn validate_local(
    env: &InferenceEnvironment,
    model_path: &Path,
) -> Result<usize, EmbedderError> {
    let result = env
        .open_session(model_path)
        .and_then(|session| check_signature(&GraphSignature::read(&session)));

    match &result {
        Ok(dims) => info!(model = %model_path.display(), dims, "local model validated"),
        Err(e) => warn!(model = %model_path.display(), "Invalid model: {e}"),
    }
    result
}

// ── Model handle ─────────────────────────────────────────────────────

/// An opened encoder session plus its discovered token-embedding output.
pub struct OnnxModel {
    session: Mutex<Session>,
    signature: GraphSignature,
    output: Option<TensorSpec>,
    path: PathBuf,
}

impl OnnxModel {
    /// Open the graph and locate the token-embedding output.
    ///
    /// A graph with no matching output still loads; [`OnnxModel::run`]
    /// then fails with `InvalidModelShape`.
    pub fn load(env: &InferenceEnvironment, model_path: &Path) -> Result<Self, EmbedderError> {
        let session = env.open_session(model_path)?;
        let signature = GraphSignature::read(&session);
        let output = select_output_tensor(&signature.outputs).cloned();

        match &output {
            Some(o) => info!(output = %o.name, shape = ?o.shape, "ONNX model loaded"),
            None => warn!(
                outputs = ?signature.outputs,
                "no token-embedding output found; inference will fail"
            ),
        }

        Ok(Self {
            session: Mutex::new(session),
            signature,
            output,
            path: model_path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn signature(&self) -> &GraphSignature {
        &self.signature
    }

    #[must_use]
    pub fn output_name(&self) -> Option<&str> {
        self.output.as_ref().map(|o| o.name.as_str())
    }

    #[must_use]
    pub fn hidden_size(&self) -> Option<usize> {
        self.output.as_ref().and_then(TensorSpec::token_embedding_dim)
    }

    /// One forward pass over a single sequence.
    ///
    /// Returns the selected output as `[sequence_length][hidden_size]`,
    /// with the batch axis of 1 dropped.
    pub fn run(&self, encoded: &EncodedInput) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let output = self.output.as_ref().ok_or_else(|| {
            EmbedderError::InvalidModelShape(format!(
                "no token-embedding output in {}",
                self.path.display()
            ))
        })?;

        let seq_len = encoded.len();

        // Create input tensors using (shape, data) tuple form
        let input_ids = Tensor::from_array(([1usize, seq_len], encoded.input_ids.clone()))
            .map_err(|e| EmbedderError::Inference(format!("input_ids error: {e}")))?;
        let attention_mask =
            Tensor::from_array(([1usize, seq_len], encoded.attention_mask.clone()))
                .map_err(|e| EmbedderError::Inference(format!("attention_mask error: {e}")))?;
        let token_type_ids =
            Tensor::from_array(([1usize, seq_len], encoded.token_type_ids.clone()))
                .map_err(|e| EmbedderError::Inference(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::Inference(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
            .map_err(|e| EmbedderError::Inference(format!("inference failed: {e}")))?;

        let value = outputs.get(output.name.as_str()).ok_or_else(|| {
            EmbedderError::Inference(format!("output {} missing from results", output.name))
        })?;
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::Inference(format!("output extraction: {e}")))?;

        let dims: &[i64] = shape;
        to_token_matrix(dims, data)
    }
}

/// Reshape a flat `[1, tokens, hidden]` buffer into per-token rows.
fn to_token_matrix(dims: &[i64], data: &[f32]) -> Result<Vec<Vec<f32>>, EmbedderError> {
    let unexpected =
        || EmbedderError::Inference(format!("unexpected output shape {dims:?}, expected [1, seq, hidden]"));

    let &[1, tokens, hidden] = dims else {
        return Err(unexpected());
    };
    let tokens = usize::try_from(tokens).map_err(|_| unexpected())?;
    let hidden = usize::try_from(hidden).map_err(|_| unexpected())?;
    if hidden == 0 || data.len() != tokens * hidden {
        return Err(unexpected());
    }

    Ok(data.chunks_exact(hidden).map(<[f32]>::to_vec).collect())
}

// ── Embedder ─────────────────────────────────────────────────────────

/// Local embedder: tokenize, run the encoder, mean-pool.
pub struct OnnxEmbedder {
    model: OnnxModel,
    tokenizer: BertTokenizer,
}

impl OnnxEmbedder {
    /// Load the model graph and its vocabulary.
    pub fn new(
        env: &InferenceEnvironment,
        model_path: &Path,
        vocab_path: &Path,
    ) -> Result<Self, EmbedderError> {
        let model = OnnxModel::load(env, model_path)?;
        let tokenizer = BertTokenizer::from_vocab_file(vocab_path)?;

        info!("Tokenizer loaded (vocab size: {})", tokenizer.vocab_size());

        Ok(Self { model, tokenizer })
    }

    #[must_use]
    pub fn model(&self) -> &OnnxModel {
        &self.model
    }

    #[must_use]
    pub fn tokenizer(&self) -> &BertTokenizer {
        &self.tokenizer
    }

    /// Re-check the already loaded graph; no file access.
    pub fn validate(&self) -> Result<usize, EmbedderError> {
        check_signature(self.model.signature())
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let encoded = self.tokenizer.tokenize_and_encode(text)?;
        let token_vectors = self.model.run(&encoded)?;
        Ok(mean_pool(&token_vectors))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        // No multi-sequence inference yet: one forward pass per text.
        texts.iter().map(|t| self.embed(t)).collect()
    }
}
