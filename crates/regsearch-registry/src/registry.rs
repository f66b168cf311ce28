use crate::types::{
    CatalogResponse, ImageConfig, ImageManifest, TagsResponse, DOCKER_MANIFEST_V2,
    OCI_MANIFEST_V1,
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use regsearch_core::source::{RegistrySource, RepositoryPage};
use regsearch_core::ImageMetadata;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK};
use reqwest::Response;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Header carrying the canonical digest of a fetched manifest
const CONTENT_DIGEST: &str = "docker-content-digest";

/// Default number of repositories requested per catalog page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Client for a Docker Registry HTTP API v2 endpoint
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: Url,
    /// Bearer token sent with every request
    auth_token: Option<String>,
    page_size: usize,
}

impl RegistryClient {
    /// Create a new registry client for a base URL such as
    /// `https://registry.example.com`
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid registry URL '{}'", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("regsearch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            auth_token: None,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Set a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the catalog page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Registry base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid registry path '{}'", path))
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .context("Registry token is not a valid header value")?,
            );
        }
        Ok(headers)
    }

    /// Headers for a URL; credentials only go to the registry's own origin
    fn headers_for(&self, url: &Url) -> Result<HeaderMap> {
        if url.origin() == self.base_url.origin() {
            self.headers()
        } else {
            debug!("Not sending registry credentials to {}", url.origin().ascii_serialization());
            Ok(HeaderMap::new())
        }
    }

    async fn get(&self, url: &Url, headers: HeaderMap) -> Result<Response> {
        let response = self
            .client
            .get(url.clone())
            .headers(headers)
            .send()
            .await
            .with_context(|| format!("Failed to connect to registry at {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Registry returned {} for {}: {}",
                status,
                url,
                if body.is_empty() {
                    "(no response body)".to_string()
                } else {
                    body
                }
            ));
        }
        Ok(response)
    }

    /// Fetch one catalog page, resuming after `last` when given
    pub async fn catalog_page(&self, last: Option<&str>) -> Result<RepositoryPage> {
        let mut url = self.endpoint("v2/_catalog")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("n", &self.page_size.to_string());
            if let Some(last) = last {
                query.append_pair("last", last);
            }
        }
        debug!("Listing repositories from: {}", url);

        let response = self.get(&url, self.headers()?).await?;
        let has_more = next_link(&response, &self.base_url).is_some();
        let catalog: CatalogResponse = response
            .json()
            .await
            .context("Failed to parse catalog response")?;

        trace!(
            "Catalog page has {} repositories (more: {})",
            catalog.repositories.len(),
            has_more
        );
        Ok(RepositoryPage {
            repositories: catalog.repositories,
            has_more,
        })
    }

    /// List all tags for a repository (handles pagination)
    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let mut all_tags = Vec::new();
        let mut url = self.endpoint(&format!("v2/{}/tags/list", repository))?;

        loop {
            debug!("Listing tags from: {}", url);

            let response = self.get(&url, self.headers_for(&url)?).await?;
            let next_url = next_link(&response, &self.base_url);

            let tags_response: TagsResponse = response
                .json()
                .await
                .context("Failed to parse tags response")?;
            all_tags.extend(tags_response.tags.unwrap_or_default());

            match next_url {
                Some(next) => url = next,
                None => break,
            }
        }

        trace!("Found {} tags for {}", all_tags.len(), repository);
        Ok(all_tags)
    }

    /// Get the manifest for a tag or digest, along with its content digest
    pub async fn get_manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<(ImageManifest, Option<String>)> {
        let url = self.endpoint(&format!("v2/{}/manifests/{}", repository, reference))?;
        debug!("Fetching manifest from: {}", url);

        let mut headers = self.headers()?;
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/vnd.oci.image.manifest.v1+json,application/vnd.docker.distribution.manifest.v2+json",
            ),
        );

        let response = self.get(&url, headers).await?;
        let content_digest = header(&response, CONTENT_DIGEST);
        let content_type = header(&response, CONTENT_TYPE.as_str());

        let manifest: ImageManifest = response
            .json()
            .await
            .with_context(|| format!("Failed to parse manifest for {}:{}", repository, reference))?;

        // OCI manifests may omit mediaType; plain JSON content types say nothing
        let header_type = content_type
            .as_deref()
            .filter(|ct| ct.starts_with("application/vnd."));
        let media_type = manifest.media_type.as_deref().or(header_type);
        if let Some(media_type) = media_type {
            let media_type = media_type.split(';').next().unwrap_or_default().trim();
            if media_type != DOCKER_MANIFEST_V2 && media_type != OCI_MANIFEST_V1 {
                bail!(
                    "Unsupported manifest type '{}' for {}:{}",
                    media_type,
                    repository,
                    reference
                );
            }
        }

        Ok((manifest, content_digest))
    }

    /// Get the config blob a manifest points at
    pub async fn get_config(&self, repository: &str, digest: &str) -> Result<ImageConfig> {
        let url = self.endpoint(&format!("v2/{}/blobs/{}", repository, digest))?;
        debug!("Fetching config blob from: {}", url);

        let response = self.get(&url, self.headers()?).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse config blob {}", digest))
    }

    /// Resolve a tag, or a specific manifest digest, into raw image metadata
    pub async fn image_metadata(
        &self,
        repository: &str,
        tag: &str,
        digest: Option<&str>,
    ) -> Result<ImageMetadata> {
        let reference = digest.unwrap_or(tag);
        let (manifest, content_digest) = self.get_manifest(repository, reference).await?;
        let config = self.get_config(repository, &manifest.config.digest).await?;

        let manifest_digest = content_digest.or_else(|| digest.map(str::to_string));
        let size = manifest.total_size();
        Ok(config.into_metadata(manifest.config.digest, manifest_digest, size))
    }
}

#[async_trait]
impl RegistrySource for RegistryClient {
    async fn list_repositories(
        &self,
        cursor: Option<&str>,
    ) -> regsearch_core::Result<RepositoryPage> {
        Ok(self.catalog_page(cursor).await?)
    }

    async fn list_tags(&self, repository: &str) -> regsearch_core::Result<Vec<String>> {
        Ok(RegistryClient::list_tags(self, repository).await?)
    }

    async fn resolve_image(
        &self,
        repository: &str,
        tag: &str,
        digest: Option<&str>,
    ) -> regsearch_core::Result<ImageMetadata> {
        Ok(self.image_metadata(repository, tag, digest).await?)
    }
}

fn header(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

fn next_link(response: &Response, base_url: &Url) -> Option<Url> {
    response
        .headers()
        .get(LINK)
        .and_then(|h| h.to_str().ok())
        .and_then(|link| parse_link_header(link, base_url))
}

/// Parse Link header for pagination
/// Format: </v2/_catalog?last=b&n=100>; rel="next"
fn parse_link_header(link: &str, base_url: &Url) -> Option<Url> {
    for part in link.split(',') {
        let part = part.trim();
        if part.contains("rel=\"next\"") {
            let start = part.find('<')?;
            let end = part.find('>')?;
            // Relative links resolve against the registry root
            return base_url.join(&part[start + 1..end]).ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RegistryClient::new("http://localhost:5000").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:5000/");
        assert!(client.auth_token.is_none());
        assert_eq!(client.page_size, DEFAULT_PAGE_SIZE);

        let client = client.with_token("test-token").with_page_size(0);
        assert_eq!(client.auth_token.as_deref(), Some("test-token"));
        assert_eq!(client.page_size, 1);
    }

    #[test]
    fn test_base_url_with_path_keeps_prefix() {
        let client = RegistryClient::new("https://example.com/registry").unwrap();
        assert_eq!(
            client.endpoint("v2/_catalog").unwrap().as_str(),
            "https://example.com/registry/v2/_catalog"
        );
    }

    #[test]
    fn test_credentials_stay_on_registry_origin() {
        let client = RegistryClient::new("https://registry.example.com")
            .unwrap()
            .with_token("s3cret");

        let own = Url::parse("https://registry.example.com/v2/app/tags/list?last=1").unwrap();
        assert!(client.headers_for(&own).unwrap().contains_key(AUTHORIZATION));

        for foreign in [
            "https://mirror.example.com/v2/app/tags/list",
            "http://registry.example.com/v2/app/tags/list",
            "https://registry.example.com:8443/v2/app/tags/list",
        ] {
            let url = Url::parse(foreign).unwrap();
            assert!(client.headers_for(&url).unwrap().is_empty(), "{}", foreign);
        }
    }

    #[test]
    fn test_invalid_url() {
        assert!(RegistryClient::new("not a url").is_err());
    }

    #[test]
    fn test_parse_link_header() {
        let base = Url::parse("http://localhost:5000/").unwrap();
        let next = parse_link_header(r#"</v2/_catalog?last=b&n=2>; rel="next""#, &base).unwrap();
        assert_eq!(next.as_str(), "http://localhost:5000/v2/_catalog?last=b&n=2");

        let absolute = parse_link_header(
            r#"<https://mirror.example.com/v2/app/tags/list?last=9>; rel="next""#,
            &base,
        )
        .unwrap();
        assert_eq!(absolute.host_str(), Some("mirror.example.com"));

        assert!(parse_link_header(r#"</v2/_catalog?last=b>; rel="prev""#, &base).is_none());
    }
}
