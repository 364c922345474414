//! Process-owned table of summarization backends.
//!
//! Each backend id maps to a loader and a `OnceCell`. The first caller to ask for a backend
//! runs its loader on a blocking worker (tokenizer tables and HTTP clients are built there);
//! concurrent callers wait on the same cell and every later caller reuses the result. A
//! failed load leaves the cell empty so the next request retries it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::codec::{HeuristicCodec, TiktokenCodec, TokenCodec};
use super::strategy::{
    InstructStrategy, InstructTuning, RemoteApiStrategy, Seq2SeqSettings, Seq2SeqStrategy,
    SummaryStrategy,
};
use super::types::{BackendLoadError, TokenBudget};
use crate::config::{BackendKind, BackendProfile, Config, backend_profiles};
use crate::generation::{GeminiGenerator, HuggingFaceGenerator, OllamaGenerator, build_http_client};

/// A loaded backend: its chunk window, its codec, and its map/reduce strategy.
pub struct Backend {
    id: String,
    budget: TokenBudget,
    codec: Arc<dyn TokenCodec>,
    strategy: Arc<dyn SummaryStrategy>,
}

impl Backend {
    /// Assemble a backend from its parts.
    pub fn new(
        id: impl Into<String>,
        budget: TokenBudget,
        codec: Arc<dyn TokenCodec>,
        strategy: Arc<dyn SummaryStrategy>,
    ) -> Self {
        Self {
            id: id.into(),
            budget,
            codec,
            strategy,
        }
    }

    /// Identifier the backend was registered under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Chunk window.
    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    /// Token codec chosen for this backend.
    pub fn codec(&self) -> Arc<dyn TokenCodec> {
        Arc::clone(&self.codec)
    }

    /// Map/reduce implementation.
    pub fn strategy(&self) -> Arc<dyn SummaryStrategy> {
        Arc::clone(&self.strategy)
    }
}

type Loader = Arc<dyn Fn() -> Result<Backend, BackendLoadError> + Send + Sync>;

struct RegistryEntry {
    loader: Loader,
    cell: OnceCell<Arc<Backend>>,
}

/// Lookup table from backend id to a lazily loaded [`Backend`].
#[derive(Default)]
pub struct BackendRegistry {
    entries: HashMap<String, RegistryEntry>,
    order: Vec<String>,
}

impl BackendRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one entry per profile in [`backend_profiles`], wired to the engines
    /// described by `config`.
    pub fn from_config(config: Arc<Config>) -> Self {
        let mut registry = Self::new();
        for profile in backend_profiles() {
            let config = Arc::clone(&config);
            registry.register(profile.id, move || load_backend(profile, &config));
        }
        registry
    }

    /// Add (or replace) a backend loader under `id`.
    pub fn register(
        &mut self,
        id: &str,
        loader: impl Fn() -> Result<Backend, BackendLoadError> + Send + Sync + 'static,
    ) {
        let key = normalize(id);
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.insert(
            key,
            RegistryEntry {
                loader: Arc::new(loader),
                cell: OnceCell::new(),
            },
        );
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Whether `id` names a registered backend.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(&normalize(id))
    }

    /// Fetch a backend, loading it on first use.
    pub async fn get(&self, id: &str) -> Result<Arc<Backend>, BackendLoadError> {
        let key = normalize(id);
        let entry = self
            .entries
            .get(&key)
            .ok_or_else(|| BackendLoadError::UnknownBackend(id.trim().to_string()))?;

        let backend = entry
            .cell
            .get_or_try_init(|| async {
                let loader = Arc::clone(&entry.loader);
                tracing::info!(backend = %key, "Loading backend");
                let loaded = tokio::task::spawn_blocking(move || loader())
                    .await
                    .map_err(|error| BackendLoadError::Aborted(error.to_string()))??;
                tracing::info!(
                    backend = %key,
                    max_tokens = loaded.budget().max_tokens(),
                    overlap_tokens = loaded.budget().overlap_tokens(),
                    codec = loaded.codec().name(),
                    "Backend ready"
                );
                Ok::<_, BackendLoadError>(Arc::new(loaded))
            })
            .await?;
        Ok(Arc::clone(backend))
    }
}

fn normalize(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

fn load_backend(profile: &BackendProfile, config: &Config) -> Result<Backend, BackendLoadError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let codec: Arc<dyn TokenCodec> = match profile.tokenizer {
        Some(encoding) => Arc::new(TiktokenCodec::from_encoding(encoding)?),
        None => Arc::new(HeuristicCodec),
    };

    let strategy: Arc<dyn SummaryStrategy> = match profile.kind {
        BackendKind::FastSeq2Seq | BackendKind::QualitySeq2Seq => {
            let generator = Arc::new(HuggingFaceGenerator::new(
                build_http_client(profile.id, timeout)?,
                config.hf_inference_url.clone(),
                config.hf_api_token.clone(),
            ));
            let settings = if profile.kind == BackendKind::FastSeq2Seq {
                Seq2SeqSettings::t5_small(config)
            } else {
                Seq2SeqSettings::bart_large_cnn(config)
            };
            Arc::new(Seq2SeqStrategy::new(generator, Arc::clone(&codec), settings))
        }
        BackendKind::LocalCausal => {
            let generator = Arc::new(OllamaGenerator::new(
                build_http_client(profile.id, timeout)?,
                config.ollama_url.clone(),
            ));
            Arc::new(InstructStrategy::new(
                generator,
                config.local_model.clone(),
                InstructTuning::default(),
            ))
        }
        BackendKind::RemoteApi => {
            let api_key =
                config
                    .gemini_api_key
                    .clone()
                    .ok_or_else(|| BackendLoadError::MissingSetting {
                        backend: profile.id.to_string(),
                        setting: "GEMINI_API_KEY",
                    })?;
            let generator = Arc::new(GeminiGenerator::new(
                build_http_client(profile.id, timeout)?,
                config.gemini_url.clone(),
                api_key,
            ));
            Arc::new(RemoteApiStrategy::new(
                generator,
                config.gemini_map_model.clone(),
                config.gemini_reduce_model.clone(),
            ))
        }
    };

    Ok(Backend::new(profile.id, profile.budget, codec, strategy))
}
