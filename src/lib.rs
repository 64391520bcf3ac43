//! # textembed: sentence embeddings, local or remote
//!
//! Computes a fixed-dimension embedding vector for a text, either with a
//! local BERT-style ONNX encoder (WordPiece tokenization + mean pooling) or
//! through an OpenAI-compatible embeddings API, behind one facade.
//!
//! ## Architecture
//!
//! - **[`config`]**: JSON configuration loading, defaults and validation
//! - **[`embedder`]**: [`embedder::TextEmbedder`] facade, error type and backends:
//!   - `tokenizer`: vocab.txt WordPiece encoding with 512-token truncation
//!   - `onnx`: ONNX Runtime session, output discovery, local validation
//!   - `pooling`: unweighted mean pooling
//!   - `remote`: provider requests, response reconciliation, dimension heuristic
//!   - `http`: blocking HTTP transport trait and `reqwest` implementation

pub mod config;
pub mod embedder;
