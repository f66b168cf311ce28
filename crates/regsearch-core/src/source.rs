//! Registry collaborator interface
//!
//! This abstracts the registry so that regsearch-core does not depend on
//! the concrete HTTP client. The implementation lives in
//! regsearch-registry; tests provide an in-memory mock.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ImageMetadata;

/// One page of the registry catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryPage {
    /// Repository names in catalog order
    pub repositories: Vec<String>,
    /// Whether another page follows this one
    pub has_more: bool,
}

/// Read access to a container image registry
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// List one page of repositories, resuming after `cursor` when given
    async fn list_repositories(&self, cursor: Option<&str>) -> Result<RepositoryPage>;

    /// List every tag of a repository
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>>;

    /// Resolve a tag (or a specific manifest digest) to image metadata
    async fn resolve_image(
        &self,
        repository: &str,
        tag: &str,
        digest: Option<&str>,
    ) -> Result<ImageMetadata>;
}
