/// Configuration module for textembed.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::embedder::remote::{DEFAULT_API_BASE, PROVIDER_PREFIX};

/// Environment variable consulted when no `api_key` is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ── Default value functions ──────────────────────────────────────────

fn default_model() -> String {
    "models/model.onnx".to_string()
}

fn default_vocab_path() -> String {
    "models/vocab.txt".to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

// ── Config struct ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Path to an ONNX model, or `openai/<model>` for the remote provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// WordPiece vocabulary for local models.
    #[serde(default = "default_vocab_path")]
    pub vocab_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            vocab_path: default_vocab_path(),
            api_key: None,
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"textembed.json"`.
    /// A missing file or invalid JSON yields the default configuration.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "textembed.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Whether `model` names a remote provider model.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.model.starts_with(PROVIDER_PREFIX)
    }

    /// Configured API key, falling back to `OPENAI_API_KEY`.
    #[must_use]
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.is_empty())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.model.is_empty(), "model must be specified");
        anyhow::ensure!(self.timeout_secs > 0, "timeout_secs must be positive");

        if self.is_remote() {
            anyhow::ensure!(!self.api_base.is_empty(), "api_base must be specified");
            anyhow::ensure!(
                self.resolved_api_key().is_some(),
                "remote model {} needs api_key or {API_KEY_ENV}",
                self.model
            );
        } else {
            anyhow::ensure!(
                !self.vocab_path.is_empty(),
                "vocab_path must be specified for local models"
            );
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
