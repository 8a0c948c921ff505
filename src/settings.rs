use crate::block_locator::{DEFAULT_BLOCK_INTERVAL_SECS, DEFAULT_SAFETY_FACTOR};
use crate::graph_builder::{DEFAULT_EDGE_PROBABILITY, DEFAULT_GAS_CUTOFF};
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::env;

/// Config file read when `CONTRACT_GRAPH_CONFIG` is not set. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "Config.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_fetch_concurrency() -> usize {
    4
}
fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            url: None,
            fetch_concurrency: default_fetch_concurrency(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Locator {
    #[serde(default = "default_block_interval_secs")]
    pub block_interval_secs: u64,
    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,
}

fn default_block_interval_secs() -> u64 {
    DEFAULT_BLOCK_INTERVAL_SECS
}
fn default_safety_factor() -> f64 {
    DEFAULT_SAFETY_FACTOR
}

impl Default for Locator {
    fn default() -> Self {
        Self {
            block_interval_secs: default_block_interval_secs(),
            safety_factor: default_safety_factor(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_edge_probability")]
    pub edge_probability: f64,
    #[serde(default = "default_gas_cutoff")]
    pub gas_cutoff: f64,
    /// Seed for the sampling policy; unseeded runs draw from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_edge_probability() -> f64 {
    DEFAULT_EDGE_PROBABILITY
}
fn default_gas_cutoff() -> f64 {
    DEFAULT_GAS_CUTOFF
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            edge_probability: default_edge_probability(),
            gas_cutoff: default_gas_cutoff(),
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub locator: Locator,
    #[serde(default)]
    pub graph: GraphConfig,
}

impl Settings {
    /// Load `Config.toml` (or `$CONTRACT_GRAPH_CONFIG`) if present, then
    /// apply environment overrides. Call `dotenv` before this to pick up a
    /// `.env` file.
    pub fn new() -> Result<Self, ConfigError> {
        let path = env::var("CONTRACT_GRAPH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut settings = Self::from_file(&path)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .build()?;
        s.try_deserialize()
    }

    fn apply_env_overrides(&mut self) {
        // Same variable the node tooling uses
        if let Ok(url) = env::var("ETH_RPC_URL") {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                self.rpc.url = Some(trimmed.to_string());
            }
        }
    }
}
