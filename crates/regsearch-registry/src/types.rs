//! Registry API wire types

use chrono::{DateTime, Utc};
use regsearch_core::ImageMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Docker v2 single-image manifest
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// OCI single-image manifest
pub const OCI_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";

/// `GET /v2/_catalog` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub repositories: Vec<String>,
}

/// `GET /v2/<name>/tags/list` response
///
/// Registries report `"tags": null` for a repository whose tags were all
/// deleted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Image manifest from the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: i32,
    #[serde(default)]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

impl ImageManifest {
    /// Config blob plus every layer
    pub fn total_size(&self) -> u64 {
        self.config.size + self.layers.iter().map(|l| l.size).sum::<u64>()
    }
}

/// Content descriptor for a config blob or layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    pub digest: String,
}

/// Image config blob
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub config: Option<ContainerConfig>,
}

/// Runtime settings recorded in the config blob
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    #[serde(default, rename = "Labels")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, rename = "Env")]
    pub env: Option<Vec<String>>,
    /// Keys are the volume paths; values are always `{}`
    #[serde(default, rename = "Volumes")]
    pub volumes: Option<BTreeMap<String, serde_json::Value>>,
    /// Keys are `port/proto`; values are always `{}`
    #[serde(default, rename = "ExposedPorts")]
    pub exposed_ports: Option<BTreeMap<String, serde_json::Value>>,
}

impl ImageConfig {
    /// Flatten the config blob into raw metadata for the document mapper
    pub fn into_metadata(
        self,
        digest: String,
        manifest_digest: Option<String>,
        size: u64,
    ) -> ImageMetadata {
        let container = self.config.unwrap_or_default();
        let labels = container
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| if v.is_empty() { k } else { format!("{}={}", k, v) })
            .collect();

        ImageMetadata {
            digest,
            manifest_digest,
            comment: self.comment.filter(|c| !c.is_empty()),
            author: self.author.filter(|a| !a.is_empty()),
            created: self.created.as_deref().and_then(parse_created),
            labels,
            env: container.env.unwrap_or_default(),
            volumes: container.volumes.unwrap_or_default().into_keys().collect(),
            exposed_ports: container
                .exposed_ports
                .unwrap_or_default()
                .into_keys()
                .collect(),
            size,
        }
    }
}

fn parse_created(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
