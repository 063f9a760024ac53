use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STRATA_DIR_NAME: &str = ".strata";
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_MAX_CARDS: u32 = 30;
pub const DEFAULT_MAX_TOKENS: u32 = 5_000;
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.05;
pub const DEFAULT_MAX_FRONTIER: u32 = 256;
pub const DEFAULT_MAX_CARDS_CAP: u32 = 200;
pub const DEFAULT_MAX_TOKENS_CAP: u32 = 100_000;
pub const DEFAULT_SLICE_TIMEOUT_MS: u64 = 400;
pub const DEFAULT_CACHE_MAX_ENTRIES: u32 = 128;
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;

pub const DEFAULT_CALL_WEIGHT: f64 = 1.0;
pub const DEFAULT_IMPORT_WEIGHT: f64 = 0.6;
pub const DEFAULT_CONFIG_WEIGHT: f64 = 0.8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StrataConfig {
    #[serde(default)]
    pub slice: SliceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceConfig {
    #[serde(default = "default_max_cards")]
    pub default_max_cards: u32,
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    #[serde(default = "default_max_frontier")]
    pub max_frontier: u32,
    #[serde(default = "default_max_cards_cap")]
    pub max_cards_cap: u32,
    #[serde(default = "default_max_tokens_cap")]
    pub max_tokens_cap: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_edge_weights")]
    pub edge_weights: BTreeMap<String, f64>,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            default_max_cards: DEFAULT_MAX_CARDS,
            default_max_tokens: DEFAULT_MAX_TOKENS,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            max_frontier: DEFAULT_MAX_FRONTIER,
            max_cards_cap: DEFAULT_MAX_CARDS_CAP,
            max_tokens_cap: DEFAULT_MAX_TOKENS_CAP,
            timeout_ms: DEFAULT_SLICE_TIMEOUT_MS,
            edge_weights: default_edge_weights(),
        }
    }
}

impl SliceConfig {
    pub fn edge_weight(&self, edge_type: &str) -> f64 {
        self.edge_weights
            .get(edge_type)
            .copied()
            .unwrap_or(DEFAULT_CALL_WEIGHT)
            .clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u32,
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            ttl_ms: DEFAULT_CACHE_TTL_MS,
        }
    }
}

fn default_max_cards() -> u32 {
    DEFAULT_MAX_CARDS
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_score_threshold() -> f64 {
    DEFAULT_SCORE_THRESHOLD
}

fn default_max_frontier() -> u32 {
    DEFAULT_MAX_FRONTIER
}

fn default_max_cards_cap() -> u32 {
    DEFAULT_MAX_CARDS_CAP
}

fn default_max_tokens_cap() -> u32 {
    DEFAULT_MAX_TOKENS_CAP
}

fn default_timeout_ms() -> u64 {
    DEFAULT_SLICE_TIMEOUT_MS
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_max_entries() -> u32 {
    DEFAULT_CACHE_MAX_ENTRIES
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS
}

fn default_edge_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("call".to_owned(), DEFAULT_CALL_WEIGHT),
        ("import".to_owned(), DEFAULT_IMPORT_WEIGHT),
        ("config".to_owned(), DEFAULT_CONFIG_WEIGHT),
    ])
}

pub fn strata_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(STRATA_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    strata_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<StrataConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(StrataConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: StrataConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<StrataConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(strata_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = StrataConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

fn normalize_config(mut config: StrataConfig) -> StrataConfig {
    let slice = &mut config.slice;
    slice.default_max_cards = slice.default_max_cards.clamp(1, slice.max_cards_cap.max(1));
    slice.default_max_tokens = slice
        .default_max_tokens
        .clamp(1, slice.max_tokens_cap.max(1));
    slice.score_threshold = slice.score_threshold.clamp(0.0, 1.0);
    slice.max_frontier = slice.max_frontier.max(1);
    slice.timeout_ms = slice.timeout_ms.max(1);
    for weight in slice.edge_weights.values_mut() {
        *weight = weight.clamp(0.0, 1.0);
    }
    for (key, weight) in default_edge_weights() {
        slice.edge_weights.entry(key).or_insert(weight);
    }

    config.cache.max_entries = config.cache.max_entries.max(1);
    config.cache.ttl_ms = config.cache.ttl_ms.max(1);

    config
}
