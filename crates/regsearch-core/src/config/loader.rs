//! Configuration file loading and validation

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::Arc;
use tracing::debug;

use super::RegsearchConfigFile;
use crate::error::{Error, Result};
use crate::hooks::{HookActions, HookEngine};

/// Configuration file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &["regsearch.yaml", "regsearch.yml"];

/// Environment variable that overrides `registry.token`
pub const TOKEN_ENV_VAR: &str = "REGSEARCH_REGISTRY_TOKEN";

/// Loaded and validated regsearch configuration
#[derive(Debug, Clone)]
pub struct RegsearchConfig {
    /// The parsed configuration
    pub config: RegsearchConfigFile,

    /// Path to the configuration file
    pub config_path: Utf8PathBuf,
}

impl RegsearchConfig {
    /// Load configuration from the specified path or search the working directory
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let (config_path, content) = match path {
            Some(p) => (p.to_owned(), read(p)?),
            None => Self::find_config()?,
        };

        let mut config = Self::parse(&content)?;
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.is_empty() {
                config.config.registry.token = Some(token);
            }
        }

        debug!("Loaded configuration from {}", config_path);
        Ok(Self {
            config_path,
            ..config
        })
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: RegsearchConfigFile = serde_yaml_ng::from_str(content)?;
        let loaded = Self {
            config,
            config_path: Utf8PathBuf::new(),
        };
        loaded.validate()?;
        Ok(loaded)
    }

    fn find_config() -> Result<(Utf8PathBuf, String)> {
        for name in CONFIG_FILE_NAMES {
            let path = Utf8PathBuf::from(*name);
            if path.exists() {
                let content = read(&path)?;
                return Ok((path, content));
            }
        }
        Err(Error::config_not_found(CONFIG_FILE_NAMES.join(" or ")))
    }

    fn validate(&self) -> Result<()> {
        let cfg = &self.config;

        let url = url::Url::parse(&cfg.registry.url).map_err(|e| {
            Error::invalid_config(format!("registry.url '{}': {}", cfg.registry.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_config(format!(
                "registry.url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if cfg.registry.page_size == 0 {
            return Err(Error::invalid_config("registry.page_size must be greater than 0"));
        }
        if cfg.crawl.concurrency == 0 {
            return Err(Error::invalid_config("crawl.concurrency must be greater than 0"));
        }
        if cfg.search.default_max_results == 0 {
            return Err(Error::invalid_config(
                "search.default_max_results must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Compile the configured hooks; any template error is fatal
    pub fn hook_engine(&self, actions: Arc<dyn HookActions>) -> Result<HookEngine> {
        HookEngine::new(&self.config.hooks, actions)
    }

    /// Snapshot path, if one is configured
    pub fn snapshot_path(&self) -> Option<Utf8PathBuf> {
        self.config.server.snapshot.as_deref().map(Utf8PathBuf::from)
    }
}

fn read(path: &Utf8Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::config_not_found(path.as_str())
        } else {
            Error::Io(e)
        }
    })
}
