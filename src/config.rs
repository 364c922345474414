use crate::processing::TokenBudget;
use serde::Serialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_LOCAL_MODEL: &str = "mistral:7b-instruct-v0.2-q4_K_M";
const DEFAULT_HF_INFERENCE_URL: &str = "https://api-inference.huggingface.co";
const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Runtime configuration for the summarizer.
#[derive(Debug, Clone)]
pub struct Config {
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Base URL of the Ollama runtime hosting the local quantized model.
    pub ollama_url: String,
    /// Ollama model tag used by the `mistral` backend.
    pub local_model: String,
    /// Base URL of the inference endpoint serving the seq2seq models.
    pub hf_inference_url: String,
    /// Optional bearer token for the inference endpoint.
    pub hf_api_token: Option<String>,
    /// Base URL of the Gemini API.
    pub gemini_url: String,
    /// API key for the `api` backend; that backend fails to load without it.
    pub gemini_api_key: Option<String>,
    /// Gemini model used for the map phase.
    pub gemini_map_model: String,
    /// Gemini model used for the reduce phase.
    pub gemini_reduce_model: String,
    /// Maximum output length, in tokens, for seq2seq summaries.
    pub summary_max_length: usize,
    /// Minimum output length, in tokens, for seq2seq summaries.
    pub summary_min_length: usize,
    /// Per-request timeout for every generation call.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: None,
            ollama_url: DEFAULT_OLLAMA_URL.into(),
            local_model: DEFAULT_LOCAL_MODEL.into(),
            hf_inference_url: DEFAULT_HF_INFERENCE_URL.into(),
            hf_api_token: None,
            gemini_url: DEFAULT_GEMINI_URL.into(),
            gemini_api_key: None,
            gemini_map_model: "gemini-2.5-flash".into(),
            gemini_reduce_model: "gemini-2.5-pro".into(),
            summary_max_length: 300,
            summary_min_length: 100,
            request_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            server_port: parse_optional("SERVER_PORT")?,
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            local_model: load_env_optional("LOCAL_MODEL").unwrap_or(defaults.local_model),
            hf_inference_url: load_env_optional("HF_INFERENCE_URL")
                .unwrap_or(defaults.hf_inference_url),
            hf_api_token: load_env_optional("HF_API_TOKEN"),
            gemini_url: load_env_optional("GEMINI_URL").unwrap_or(defaults.gemini_url),
            gemini_api_key: load_env_optional("GEMINI_API_KEY"),
            gemini_map_model: load_env_optional("GEMINI_MAP_MODEL")
                .unwrap_or(defaults.gemini_map_model),
            gemini_reduce_model: load_env_optional("GEMINI_REDUCE_MODEL")
                .unwrap_or(defaults.gemini_reduce_model),
            summary_max_length: parse_optional("SUMMARY_MAX_LENGTH")?
                .unwrap_or(defaults.summary_max_length),
            summary_min_length: parse_optional("SUMMARY_MIN_LENGTH")?
                .unwrap_or(defaults.summary_min_length),
            request_timeout_secs: parse_optional("GENERATION_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout_secs),
        };

        if config.summary_min_length > config.summary_max_length {
            return Err(ConfigError::InvalidValue("SUMMARY_MIN_LENGTH".into()));
        }
        Ok(config)
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Engine families the pipeline can drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Small seq2seq model; fast, strict input limit.
    FastSeq2Seq,
    /// Large seq2seq model tuned for news-style abstractive summaries.
    QualitySeq2Seq,
    /// Quantized instruction-tuned causal model served locally.
    LocalCausal,
    /// Hosted generative API.
    RemoteApi,
}

/// Static description of one selectable backend.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BackendProfile {
    /// Identifier callers pass as the model choice.
    pub id: &'static str,
    /// Engine family.
    pub kind: BackendKind,
    /// Chunk window for this backend.
    pub budget: TokenBudget,
    /// BPE encoding for exact counting; `None` selects the heuristic codec.
    pub tokenizer: Option<&'static str>,
}

const fn budget(max_tokens: usize, overlap_tokens: usize) -> TokenBudget {
    match TokenBudget::new(max_tokens, overlap_tokens) {
        Ok(budget) => budget,
        Err(_) => panic!("backend profile budget violates overlap < max"),
    }
}

static BACKEND_PROFILES: [BackendProfile; 4] = [
    BackendProfile {
        id: "t5-small",
        kind: BackendKind::FastSeq2Seq,
        budget: budget(350, 50),
        tokenizer: Some("r50k_base"),
    },
    BackendProfile {
        id: "bart-large-cnn",
        kind: BackendKind::QualitySeq2Seq,
        budget: budget(800, 100),
        tokenizer: Some("r50k_base"),
    },
    BackendProfile {
        id: "mistral",
        kind: BackendKind::LocalCausal,
        budget: budget(256, 32),
        tokenizer: None,
    },
    BackendProfile {
        id: "api",
        kind: BackendKind::RemoteApi,
        budget: budget(2000, 0),
        tokenizer: None,
    },
];

/// Every selectable backend, in display order.
pub fn backend_profiles() -> &'static [BackendProfile] {
    &BACKEND_PROFILES
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        ollama_url = %config.ollama_url,
        local_model = %config.local_model,
        hf_inference_url = %config.hf_inference_url,
        gemini_configured = config.gemini_api_key.is_some(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
