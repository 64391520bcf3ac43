/// End-to-end tests for the textembed facade.
///
/// Remote flows run against a recording in-memory transport:
///   TextEmbedder → RemoteEmbedder → HttpTransport
/// Local flows that need a real ONNX model are `#[ignore]`d.
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use textembed::config::Config;
use textembed::embedder::http::{HttpResponse, HttpTransport};
use textembed::embedder::remote::ProviderConfig;
use textembed::embedder::tokenizer::{BertTokenizer, MAX_SEQ_LEN};
use textembed::embedder::{Embedder, EmbedderError, TextEmbedder};

#[derive(Debug, Clone)]
struct Recorded {
    method: &'static str,
    url: String,
    body: Option<String>,
    headers: Vec<(String, String)>,
}

/// Transport that replays one canned response and records every request.
#[derive(Clone)]
struct MockTransport {
    response: HttpResponse,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockTransport {
    fn new(status: u16, body: Value) -> Self {
        Self {
            response: HttpResponse::new(status, body.to_string()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str, url: &str, body: Option<String>, headers: &[(&str, String)]) {
        self.requests.lock().unwrap().push(Recorded {
            method,
            url: url.to_string(),
            body,
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        });
    }
}

impl HttpTransport for MockTransport {
    fn post(
        &self,
        url: &str,
        body: String,
        headers: &[(&str, String)],
    ) -> Result<HttpResponse, EmbedderError> {
        self.record("POST", url, Some(body), headers);
        Ok(self.response.clone())
    }

    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, EmbedderError> {
        self.record("GET", url, None, headers);
        Ok(self.response.clone())
    }
}

fn remote_embedder(transport: &MockTransport) -> TextEmbedder {
    let provider = ProviderConfig::new("openai/text-embedding-ada-002", "sk-test").unwrap();
    TextEmbedder::remote_with_transport(provider, Box::new(transport.clone()))
}

fn header<'a>(req: &'a Recorded, name: &str) -> Option<&'a str> {
    req.headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

#[test]
fn test_remote_embed_single() {
    let transport = MockTransport::new(200, json!({"data": [{"embedding": [0.1, 0.2, 0.3]}]}));
    let embedder = remote_embedder(&transport);

    let vector = embedder.embed("hello world").unwrap();
    assert_eq!(vector, vec![0.1, 0.2, 0.3]);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, "POST");
    assert_eq!(req.url, "https://api.openai.com/v1/embeddings");
    assert_eq!(header(req, "Authorization"), Some("Bearer sk-test"));
    assert_eq!(header(req, "Content-Type"), Some("application/json"));

    let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({"input": "hello world", "model": "text-embedding-ada-002"}));
}

#[test]
fn test_remote_batch_single_request_in_order() {
    let transport = MockTransport::new(
        200,
        json!({"data": [
            {"embedding": [1.0], "index": 0},
            {"embedding": [2.0], "index": 1},
            {"embedding": [3.0], "index": 2}
        ]}),
    );
    let embedder = remote_embedder(&transport);

    let vectors = embedder.batch_embed(&["a", "b", "c"]).unwrap();
    assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1, "batch must be one request");
    let body: Value = serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(body["input"], json!(["a", "b", "c"]));
}

#[test]
fn test_remote_batch_reorders_by_index() {
    let transport = MockTransport::new(
        200,
        json!({"data": [
            {"embedding": [3.0], "index": 2},
            {"embedding": [1.0], "index": 0},
            {"embedding": [2.0], "index": 1}
        ]}),
    );
    let embedder = remote_embedder(&transport);

    let vectors = embedder.batch_embed(&["a", "b", "c"]).unwrap();
    assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
}

#[test]
fn test_remote_batch_count_mismatch() {
    let transport = MockTransport::new(200, json!({"data": [{"embedding": [1.0]}]}));
    let embedder = remote_embedder(&transport);

    let err = embedder.batch_embed(&["a", "b"]).unwrap_err();
    assert!(matches!(err, EmbedderError::MalformedResponse(_)), "got {err:?}");
}

#[test]
fn test_remote_empty_batch_makes_no_request() {
    let transport = MockTransport::new(200, json!({"data": []}));
    let embedder = remote_embedder(&transport);

    assert!(embedder.batch_embed(&[]).unwrap().is_empty());
    assert!(transport.requests().is_empty());
}

#[test]
fn test_remote_provider_error_carries_body() {
    let body = json!({"error": {"message": "Incorrect API key provided"}});
    let transport = MockTransport::new(401, body.clone());
    let embedder = remote_embedder(&transport);

    match embedder.embed("hello").unwrap_err() {
        EmbedderError::Provider(detail) => assert_eq!(detail, body.to_string()),
        other => panic!("expected Provider error, got {other:?}"),
    }
}

#[test]
fn test_remote_malformed_success_body() {
    let transport = MockTransport::new(200, json!({"object": "list"}));
    let embedder = remote_embedder(&transport);

    let err = embedder.embed("hello").unwrap_err();
    assert!(matches!(err, EmbedderError::MalformedResponse(_)));
}

#[test]
fn test_embedder_trait_object() {
    let transport = MockTransport::new(200, json!({"data": [{"embedding": [0.5]}]}));
    let embedder: Arc<dyn Embedder> = Arc::new(remote_embedder(&transport));

    assert_eq!(embedder.embed("x").unwrap(), vec![0.5]);
}

// ── Validation ───────────────────────────────────────────────────────

fn model_listing() -> Value {
    json!({"data": [
        {"id": "text-embedding-ada-002"},
        {"id": "text-davinci-003"},
        {"id": "gpt-4"}
    ]})
}

#[test]
fn test_validate_remote_known_model() {
    let transport = MockTransport::new(200, model_listing());

    let dims = TextEmbedder::validate_remote("openai/text-embedding-ada-002", "sk-test", &transport)
        .unwrap();
    assert_eq!(dims, 1536);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].url, "https://api.openai.com/v1/models");
    assert_eq!(header(&requests[0], "Authorization"), Some("Bearer sk-test"));
}

#[test]
fn test_validate_remote_heuristic_through_listing() {
    let transport = MockTransport::new(200, model_listing());
    assert_eq!(
        TextEmbedder::validate_remote("openai/text-davinci-003", "k", &transport).unwrap(),
        12288
    );
    assert_eq!(
        TextEmbedder::validate_remote("openai/gpt-4", "k", &transport).unwrap(),
        768
    );
}

#[test]
fn test_validate_remote_not_found() {
    let transport = MockTransport::new(200, model_listing());
    let err = TextEmbedder::validate_remote("openai/text-curie-001", "sk-test", &transport)
        .unwrap_err();
    assert!(matches!(err, EmbedderError::NotFound(_)));
    assert_eq!(err.status_code(), 404);
}

#[test]
fn test_validate_remote_invalid_arguments_skip_network() {
    let transport = MockTransport::new(200, model_listing());

    for (model, key) in [
        ("openai/text-embedding-ada-002", ""),
        ("", ""),
        ("", "sk-test"),
        ("openai", "sk-test"),
    ] {
        let err = TextEmbedder::validate_remote(model, key, &transport).unwrap_err();
        assert!(
            matches!(err, EmbedderError::InvalidArgument(_)),
            "({model:?}, {key:?}) gave {err:?}"
        );
    }
    assert!(transport.requests().is_empty());
}

#[test]
fn test_validate_remote_provider_error() {
    let transport = MockTransport::new(500, json!({"error": "server"}));
    let err = TextEmbedder::validate_remote("openai/text-embedding-ada-002", "sk-test", &transport)
        .unwrap_err();
    assert!(matches!(err, EmbedderError::Provider(_)));
}

#[test]
fn test_instance_validate_remote() {
    let transport = MockTransport::new(200, model_listing());
    let embedder = remote_embedder(&transport);
    assert_eq!(embedder.validate().unwrap(), 1536);
}

// ── Config → facade ──────────────────────────────────────────────────

#[test]
fn test_from_config_remote() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("textembed.json");
    std::fs::write(
        &path,
        r#"{"model": "openai/text-embedding-ada-002", "api_key": "sk-test", "api_base": "http://127.0.0.1:9/v1"}"#,
    )
    .unwrap();

    let config = Config::load(&path.to_string_lossy()).unwrap();
    config.validate().unwrap();

    let embedder = TextEmbedder::from_config(&config, None).unwrap();
    match &embedder {
        TextEmbedder::Remote(remote) => {
            assert_eq!(remote.provider().model_name(), "text-embedding-ada-002");
            assert_eq!(remote.provider().api_base(), "http://127.0.0.1:9/v1");
        }
        TextEmbedder::Local(_) => panic!("expected remote embedder"),
    }
}

// ── Tokenizer ────────────────────────────────────────────────────────

fn vocab_tokenizer() -> (tempfile::TempDir, BertTokenizer) {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("vocab.txt");
    let vocab = [
        "[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]", "the", "quick", "brown", "fox", "jump",
        "##s", ".",
    ];
    std::fs::write(&path, vocab.join("\n")).unwrap();
    let tokenizer = BertTokenizer::from_vocab_file(&path).unwrap();
    (temp, tokenizer)
}

#[test]
fn test_encoded_lengths_equal_token_count_plus_two() {
    let (_temp, tokenizer) = vocab_tokenizer();

    for (text, tokens) in [
        ("the", 1),
        ("The quick brown fox jumps.", 7),
        ("fox fox fox", 3),
    ] {
        let enc = tokenizer.tokenize_and_encode(text).unwrap();
        assert_eq!(enc.input_ids.len(), tokens + 2, "{text:?}");
        assert_eq!(enc.token_type_ids.len(), enc.input_ids.len());
        assert_eq!(enc.attention_mask.len(), enc.input_ids.len());
    }
}

#[test]
fn test_long_text_left_anchored_truncation() {
    let (_temp, tokenizer) = vocab_tokenizer();
    let text = "the quick brown fox ".repeat(200);

    let enc = tokenizer.tokenize_and_encode(&text).unwrap();
    assert_eq!(enc.input_ids.len(), MAX_SEQ_LEN);
    assert_eq!(enc.token_type_ids.len(), MAX_SEQ_LEN);
    assert_eq!(enc.attention_mask.len(), MAX_SEQ_LEN);

    // [CLS] the quick brown fox the ...
    assert_eq!(&enc.input_ids[..6], &[2, 5, 6, 7, 8, 5]);
    // 511 content tokens follow [CLS]; position 511 is the 511th word, "brown"
    assert_eq!(enc.input_ids[MAX_SEQ_LEN - 1], 7);
    assert!(!enc.input_ids[1..].contains(&3), "no [SEP] after truncation");
}

// ── Local ────────────────────────────────────────────────────────────

#[test]
fn test_local_missing_model_file() {
    use std::path::Path;
    use textembed::embedder::onnx::InferenceEnvironment;

    // The file check runs before the runtime library is touched.
    let env = InferenceEnvironment::with_library("textembed-it", "/nonexistent/libonnxruntime.so");
    let model = Path::new("/nonexistent/model.onnx");

    let err = TextEmbedder::validate_local(&env, model).unwrap_err();
    assert!(matches!(err, EmbedderError::FileNotFound(_)), "{err:?}");
    assert_eq!(err.status_code(), 404);

    let err = match TextEmbedder::local(&env, model, Path::new("/nonexistent/vocab.txt")) {
        Err(e) => e,
        Ok(_) => panic!("missing model must not load"),
    };
    assert!(matches!(err, EmbedderError::FileNotFound(_)), "{err:?}");
    assert_eq!(err.status_code(), 404);
}

#[test]
fn test_local_unloadable_runtime_returns_error() {
    use textembed::embedder::onnx::InferenceEnvironment;

    let temp = tempfile::tempdir().unwrap();
    let model = temp.path().join("model.onnx");
    std::fs::write(&model, b"garbage").unwrap();

    let env = InferenceEnvironment::with_library("textembed-it", "/nonexistent/libonnxruntime.so");
    let result = std::panic::catch_unwind(|| TextEmbedder::validate_local(&env, &model));

    let err = result.expect("validate_local must not panic").unwrap_err();
    assert!(matches!(err, EmbedderError::GraphLoad(_)), "{err:?}");
}

/// Requires `models/model.onnx` and `models/vocab.txt`.
/// Run with: cargo test -- --ignored
#[test]
#[ignore]
fn test_local_embed_roundtrip_deterministic() {
    use std::path::Path;
    use textembed::embedder::onnx::InferenceEnvironment;

    let model = Path::new("models/model.onnx");
    let vocab = Path::new("models/vocab.txt");
    if !model.exists() || !vocab.exists() {
        eprintln!("Skipping: model files not present");
        return;
    }

    let env = InferenceEnvironment::init("textembed-it").unwrap();
    let dims = TextEmbedder::validate_local(&env, model).unwrap();
    let embedder = TextEmbedder::local(&env, model, vocab).unwrap();

    let a = embedder.embed("deterministic inference").unwrap();
    let b = embedder.embed("deterministic inference").unwrap();
    assert_eq!(a.len(), dims);
    assert_eq!(a, b);

    let batch = embedder.batch_embed(&["deterministic inference", "other"]).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0], a);
}
