//! Command implementations

pub mod crawl;
pub mod search;
pub mod serve;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regsearch_core::{MemoryIndex, RegsearchConfig};
use regsearch_registry::RegistryClient;
use tracing::info;

/// Load regsearch.yaml from the given path or the working directory
pub fn load_config(path: Option<&Utf8Path>) -> Result<RegsearchConfig> {
    RegsearchConfig::load(path).context("Failed to load regsearch configuration")
}

/// Build a registry client from the loaded configuration
pub fn registry_client(config: &RegsearchConfig) -> Result<RegistryClient> {
    let registry = &config.config.registry;
    let mut client = RegistryClient::new(&registry.url)?.with_page_size(registry.page_size);
    if let Some(token) = &registry.token {
        client = client.with_token(token);
    }
    Ok(client)
}

/// Snapshot path from the command line, falling back to the configuration
pub fn snapshot_path(
    flag: Option<Utf8PathBuf>,
    config: &RegsearchConfig,
) -> Option<Utf8PathBuf> {
    flag.or_else(|| config.snapshot_path())
}

/// Open the in-memory index, seeded from a snapshot when one is configured
pub fn open_index(snapshot: Option<&Utf8Path>) -> Result<MemoryIndex> {
    match snapshot {
        Some(path) => {
            let index = MemoryIndex::load(path)
                .with_context(|| format!("Failed to load index snapshot {}", path))?;
            info!("Loaded index snapshot from {}", path);
            Ok(index)
        }
        None => Ok(MemoryIndex::new()),
    }
}
