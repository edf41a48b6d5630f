use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::store::DEFAULT_SCAN_CAP;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    pub uri: String,
    pub dimension: usize,
    pub scan_cap: usize,
    /// Write `[0]` instead of `[]` for empty ID arrays.
    pub empty_array_sentinel: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            uri: "~/.concept_rag".to_string(),
            dimension: 384,
            scan_cap: DEFAULT_SCAN_CAP,
            empty_array_sentinel: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeightSettings {
    pub vector: f32,
    pub lexical: f32,
    pub title: f32,
    pub expansion: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoostSettings {
    pub single_term_no_concept: f32,
    pub single_term_concept: f32,
    pub multi_term_no_concept: f32,
    pub multi_term_weak_concept: f32,
    pub multi_term_strong_concept: f32,
}

impl Default for BoostSettings {
    fn default() -> Self {
        Self {
            single_term_no_concept: 1.6,
            single_term_concept: 1.2,
            multi_term_no_concept: 1.3,
            multi_term_weak_concept: 1.0,
            multi_term_strong_concept: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingSettings {
    pub document_weights: WeightSettings,
    pub chunk_weights: WeightSettings,
    pub boosts: BoostSettings,
    /// Vector candidates fetched per requested result.
    pub candidate_multiplier: usize,
    /// Share of query terms that must hit the concept vocabulary for "strong" overlap.
    pub strong_overlap: f32,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            document_weights: WeightSettings { vector: 0.30, lexical: 0.30, title: 0.25, expansion: 0.15 },
            chunk_weights: WeightSettings { vector: 0.40, lexical: 0.40, title: 0.0, expansion: 0.20 },
            boosts: BoostSettings::default(),
            candidate_multiplier: 5,
            strong_overlap: 0.5,
        }
    }
}

/// Sense selection strategy named by `expansion.strategy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    First,
    Context,
}

impl StrategyKind {
    pub const NAMES: &'static [&'static str] = &["context", "context-aware", "first", "first-synset"];

    /// Case-insensitive; accepts the short and the long spelling.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "first" | "first-synset" => Some(Self::First),
            "context" | "context-aware" => Some(Self::Context),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpansionSettings {
    /// One of [`StrategyKind::NAMES`].
    pub strategy: String,
    pub max_synonyms_per_term: usize,
    pub max_depth: usize,
    pub depth_decay: f32,
    pub lexicon_path: Option<String>,
}

impl Default for ExpansionSettings {
    fn default() -> Self {
        Self {
            strategy: "context".to_string(),
            max_synonyms_per_term: 5,
            max_depth: 2,
            depth_decay: 0.6,
            lexicon_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSettings {
    pub min_interval_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub checkpoint_every: usize,
    pub checkpoint_path: String,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: 1500,
            max_attempts: 3,
            backoff_ms: 1000,
            checkpoint_every: 10,
            checkpoint_path: "~/.concept_rag/checkpoints/attribution.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub ranking: RankingSettings,
    #[serde(default)]
    pub expansion: ExpansionSettings,
    #[serde(default)]
    pub batch: BatchSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.store.dimension == 0 {
            return Err(Error::InvalidConfig("store.dimension must be > 0".into()));
        }
        if self.store.scan_cap == 0 {
            return Err(Error::InvalidConfig("store.scan_cap must be > 0".into()));
        }
        for (label, w) in [
            ("ranking.document_weights", self.ranking.document_weights),
            ("ranking.chunk_weights", self.ranking.chunk_weights),
        ] {
            let parts = [w.vector, w.lexical, w.title, w.expansion];
            if parts.iter().any(|v| !v.is_finite() || *v < 0.0) || parts.iter().sum::<f32>() <= 0.0 {
                return Err(Error::InvalidConfig(format!("{label} must be non-negative with a positive sum")));
            }
        }
        let b = self.ranking.boosts;
        if [
            b.single_term_no_concept,
            b.single_term_concept,
            b.multi_term_no_concept,
            b.multi_term_weak_concept,
            b.multi_term_strong_concept,
        ]
        .iter()
        .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(Error::InvalidConfig("ranking.boosts must be non-negative".into()));
        }
        if !(0.0..=1.0).contains(&self.ranking.strong_overlap) {
            return Err(Error::InvalidConfig("ranking.strong_overlap must be within [0, 1]".into()));
        }
        if StrategyKind::parse(&self.expansion.strategy).is_none() {
            return Err(Error::InvalidConfig(format!(
                "expansion.strategy '{}' is not one of: {}",
                self.expansion.strategy,
                StrategyKind::NAMES.join(", ")
            )));
        }
        if !(0.0..=1.0).contains(&self.expansion.depth_decay) {
            return Err(Error::InvalidConfig("expansion.depth_decay must be within [0, 1]".into()));
        }
        if self.batch.max_attempts == 0 {
            return Err(Error::InvalidConfig("batch.max_attempts must be >= 1".into()));
        }
        if self.batch.checkpoint_every == 0 {
            return Err(Error::InvalidConfig("batch.checkpoint_every must be >= 1".into()));
        }
        Ok(())
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    /// `config.toml`, then `config.<env>.toml` (from `RUST_ENV`), then `CONCEPTDB_*` variables.
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    pub fn load_from(dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("CONCEPTDB_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
