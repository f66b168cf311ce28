//! Image metadata and indexed document types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Raw image metadata as resolved from the registry
///
/// Labels and environment entries keep their raw `key=value` form; the
/// document mapper is responsible for splitting them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Content digest of the image configuration blob
    pub digest: String,
    /// Digest of the manifest that referenced the configuration
    #[serde(default)]
    pub manifest_digest: Option<String>,
    /// Image comment
    #[serde(default)]
    pub comment: Option<String>,
    /// Image author
    #[serde(default)]
    pub author: Option<String>,
    /// Creation timestamp
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Raw label tokens (`key=value` or bare `key`)
    #[serde(default)]
    pub labels: Vec<String>,
    /// Raw environment tokens (`NAME=value`)
    #[serde(default)]
    pub env: Vec<String>,
    /// Declared volume paths
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Exposed ports in registry notation (e.g. `80/tcp`)
    #[serde(default)]
    pub exposed_ports: Vec<String>,
    /// Total image size in bytes (config plus layers)
    #[serde(default)]
    pub size: u64,
}

/// The indexed unit: one image configuration, identified by its digest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Document {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_digest: Option<String>,
    pub name: String,
    pub tag: String,
    pub full_name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub label: BTreeMap<String, String>,
    #[serde(default)]
    pub label_keys: BTreeSet<String>,
    #[serde(default)]
    pub volumes: BTreeSet<String>,
    #[serde(default)]
    pub exposed_ports: BTreeSet<u32>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub env_keys: BTreeSet<String>,
    #[serde(default)]
    pub size_bytes: u64,
}

impl Document {
    /// Repository name joined with the tag
    pub fn full_name_of(name: &str, tag: &str) -> String {
        format!("{}:{}", name, tag)
    }
}
