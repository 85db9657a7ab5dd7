use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::error::Error;
use crate::types::SourceType;

pub struct Config {
    figment: Figment,
}

impl Config {
    /// `config.toml`, then `config.<env>.toml` picked by `RUST_ENV`, then `APP_*` variables.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same layering as [`Config::load`] with the TOML files looked up in `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The full typed settings tree, validated.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let settings = self.settings()?;
        if matches!(env, "prod" | "production") && settings.embedding.provider == "hash" {
            tracing::warn!(provider = %settings.embedding.provider, "hash embedder configured in production");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub chunking: ChunkingConfig,
    pub cache: CacheSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub data: DataSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub bm25_k1: f32,
    pub bm25_b: f32,
    /// RRF damping constant added to every rank.
    pub rrf_k: f32,
    /// Each retriever is asked for `top_k * pool_multiplier` candidates.
    pub pool_multiplier: usize,
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub max_query_chars: usize,
    pub lexical_budget_ms: u64,
    pub vector_budget_ms: u64,
    pub snippet_window_words: usize,
    pub snippet_max_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            bm25_k1: 1.5,
            bm25_b: 0.75,
            rrf_k: 60.0,
            pool_multiplier: 4,
            default_top_k: 10,
            max_top_k: 50,
            max_query_chars: 500,
            lexical_budget_ms: 250,
            vector_budget_ms: 750,
            snippet_window_words: 50,
            snippet_max_chars: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub capacity: usize,
    /// 0 disables expiry; entries then live until evicted or invalidated.
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { capacity: 1000, ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: String,
    pub dim: usize,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            dim: 384,
            batch_size: 32,
            max_concurrency: 4,
            retry_attempts: 3,
            retry_backoff_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// When false, rebuilds publish lexical-only snapshots.
    pub build_vectors: bool,
    /// Larger change sets fall back to a full rebuild.
    pub incremental_max_documents: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { build_vectors: true, incremental_max_documents: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub docs_dir: String,
    pub project: String,
    pub source_type: SourceType,
    pub base_url: Option<String>,
    /// Globs relative to `docs_dir`, e.g. `**/node_modules/**`.
    pub exclude_patterns: Vec<String>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            docs_dir: "./docs".to_string(),
            project: "runbooks".to_string(),
            source_type: SourceType::Docs,
            base_url: None,
            exclude_patterns: Vec::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> crate::error::Result<()> {
        let r = &self.retrieval;
        if !(r.bm25_k1 > 0.0) {
            return Err(invalid("retrieval.bm25_k1 must be > 0"));
        }
        if !(0.0..=1.0).contains(&r.bm25_b) {
            return Err(invalid("retrieval.bm25_b must be within [0, 1]"));
        }
        if !(r.rrf_k > 0.0) {
            return Err(invalid("retrieval.rrf_k must be > 0"));
        }
        if r.pool_multiplier < 1 {
            return Err(invalid("retrieval.pool_multiplier must be >= 1"));
        }
        if r.default_top_k == 0 || r.default_top_k > r.max_top_k {
            return Err(invalid("retrieval.default_top_k must be within [1, max_top_k]"));
        }
        if r.max_query_chars == 0 {
            return Err(invalid("retrieval.max_query_chars must be > 0"));
        }
        if r.snippet_window_words == 0 || r.snippet_max_chars == 0 {
            return Err(invalid("retrieval snippet sizes must be > 0"));
        }

        let c = &self.chunking;
        if c.max_tokens == 0 || c.overlap_tokens >= c.max_tokens {
            return Err(invalid("chunking.overlap_tokens must be smaller than chunking.max_tokens"));
        }
        if c.min_tokens > c.max_tokens {
            return Err(invalid("chunking.min_tokens must not exceed chunking.max_tokens"));
        }

        if self.cache.capacity == 0 {
            return Err(invalid("cache.capacity must be >= 1"));
        }

        for pattern in &self.data.exclude_patterns {
            glob::Pattern::new(pattern)
                .map_err(|e| Error::InvalidConfig(format!("data.exclude_patterns {pattern:?}: {e}")))?;
        }

        let e = &self.embedding;
        if e.dim == 0 {
            return Err(invalid("embedding.dim must be > 0"));
        }
        if e.batch_size == 0 || e.max_concurrency == 0 {
            return Err(invalid("embedding.batch_size and embedding.max_concurrency must be > 0"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> Error {
    Error::InvalidConfig(msg.to_string())
}

/// `~` and `$VAR`/`${VAR}` expanded. Unset variables are left as written.
pub fn expand_path(input: impl AsRef<str>) -> PathBuf {
    let raw = input.as_ref();
    let with_env = shellexpand::env(raw).unwrap_or(Cow::Borrowed(raw));
    PathBuf::from(shellexpand::tilde(&with_env).into_owned())
}

/// Config paths are relative to `base` unless they expand to an absolute path.
pub fn resolve_with_base(base: &Path, path: impl AsRef<str>) -> PathBuf {
    let expanded = expand_path(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}
