//! Configuration file types and loading

mod loader;

pub use loader::{RegsearchConfig, CONFIG_FILE_NAMES, TOKEN_ENV_VAR};

use serde::{Deserialize, Serialize};

use crate::crawler::{CrawlOptions, DEFAULT_CONCURRENCY};
use crate::hooks::HookConfig;
use crate::search::DEFAULT_MAX_RESULTS;

/// Parsed `regsearch.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegsearchConfigFile {
    pub registry: RegistryConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hooks: Vec<HookConfig>,
}

/// Registry connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Base URL, e.g. `https://registry.example.com`
    pub url: String,

    /// Bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Catalog page size
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Crawl settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrawlConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub prune_stale: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            prune_stale: false,
        }
    }
}

impl CrawlConfig {
    pub fn options(&self) -> CrawlOptions {
        CrawlOptions {
            concurrency: self.concurrency,
            prune_stale: self.prune_stale,
        }
    }
}

/// Search settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Index snapshot file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            snapshot: None,
        }
    }
}

fn default_page_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}
