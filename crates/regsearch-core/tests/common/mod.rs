//! Shared test fixtures
//!
//! Provides an in-memory registry, a recording hook action sink and corpus
//! builders so integration tests run without network access.

#![allow(dead_code)]

use async_trait::async_trait;
use regsearch_core::hooks::{HookActions, LogLevel};
use regsearch_core::source::{RegistrySource, RepositoryPage};
use regsearch_core::{Error, ImageMetadata, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Media type of a Docker v2 image manifest
pub const DOCKER_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Build raw metadata with the given digest and label tokens
pub fn metadata(digest: &str, labels: &[&str]) -> ImageMetadata {
    ImageMetadata {
        digest: digest.to_string(),
        manifest_digest: Some(format!("{}-manifest", digest)),
        comment: Some("test image".to_string()),
        author: Some("tests".to_string()),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        env: vec!["PATH=/usr/bin".to_string()],
        exposed_ports: vec!["80/tcp".to_string()],
        size: 1024,
        ..Default::default()
    }
}

/// In-memory registry with injectable failures
#[derive(Default)]
pub struct MockRegistry {
    repositories: BTreeMap<String, Vec<String>>,
    images: HashMap<(String, String), ImageMetadata>,
    failing_tags: HashSet<(String, String)>,
    failing_repositories: HashSet<String>,
    fail_catalog: bool,
    page_size: usize,
    delay: Option<Duration>,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
    /// (repository, resolutions completed so far) per `list_tags` call
    pub tag_listings: Mutex<Vec<(String, usize)>>,
    /// Cursors passed to `list_repositories`
    pub cursors: Mutex<Vec<Option<String>>>,
    /// (repository, tag, digest) passed to `resolve_image`
    pub resolved: Mutex<Vec<(String, String, Option<String>)>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            page_size: 100,
            ..Default::default()
        }
    }

    /// Register a resolvable tag
    pub fn with_image(mut self, repository: &str, tag: &str, meta: ImageMetadata) -> Self {
        self.repositories
            .entry(repository.to_string())
            .or_default()
            .push(tag.to_string());
        self.images
            .insert((repository.to_string(), tag.to_string()), meta);
        self
    }

    /// Register a repository with no tags
    pub fn with_empty_repository(mut self, repository: &str) -> Self {
        self.repositories.entry(repository.to_string()).or_default();
        self
    }

    /// Listed tag whose resolution fails
    pub fn with_failing_tag(mut self, repository: &str, tag: &str) -> Self {
        self.repositories
            .entry(repository.to_string())
            .or_default()
            .push(tag.to_string());
        self.failing_tags
            .insert((repository.to_string(), tag.to_string()));
        self
    }

    /// Listed repository whose tag listing fails
    pub fn with_failing_repository(mut self, repository: &str) -> Self {
        self.repositories.entry(repository.to_string()).or_default();
        self.failing_repositories.insert(repository.to_string());
        self
    }

    pub fn with_failing_catalog(mut self) -> Self {
        self.fail_catalog = true;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Make every resolution take this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Highest number of concurrent resolutions observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrySource for MockRegistry {
    async fn list_repositories(&self, cursor: Option<&str>) -> Result<RepositoryPage> {
        self.cursors
            .lock()
            .unwrap()
            .push(cursor.map(str::to_string));
        if self.fail_catalog {
            return Err(Error::registry("catalog unavailable"));
        }

        let remaining: Vec<String> = self
            .repositories
            .keys()
            .filter(|name| cursor.is_none_or(|c| name.as_str() > c))
            .cloned()
            .collect();
        let has_more = remaining.len() > self.page_size;
        Ok(RepositoryPage {
            repositories: remaining.into_iter().take(self.page_size).collect(),
            has_more,
        })
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        self.tag_listings.lock().unwrap().push((
            repository.to_string(),
            self.completed.load(Ordering::SeqCst),
        ));
        if self.failing_repositories.contains(repository) {
            return Err(Error::registry(format!("tags for {} unavailable", repository)));
        }
        Ok(self
            .repositories
            .get(repository)
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve_image(
        &self,
        repository: &str,
        tag: &str,
        digest: Option<&str>,
    ) -> Result<ImageMetadata> {
        self.resolved.lock().unwrap().push((
            repository.to_string(),
            tag.to_string(),
            digest.map(str::to_string),
        ));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        let key = (repository.to_string(), tag.to_string());
        if self.failing_tags.contains(&key) {
            return Err(Error::registry(format!(
                "manifest for {}:{} unavailable",
                repository, tag
            )));
        }
        self.images
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::registry(format!("{}:{} not found", repository, tag)))
    }
}

/// A call made to [`RecordingActions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Log(LogLevel, String),
    Notify(String, String),
}

/// Hook actions that record every call
#[derive(Default)]
pub struct RecordingActions {
    pub calls: Mutex<Vec<Action>>,
    /// URLs whose notification fails
    pub failing_urls: HashSet<String>,
}

impl RecordingActions {
    pub fn calls(&self) -> Vec<Action> {
        self.calls.lock().unwrap().clone()
    }
}

impl HookActions for RecordingActions {
    fn log(&self, level: LogLevel, message: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Action::Log(level, message.to_string()));
        Ok(())
    }

    fn notify(&self, url: &str, body: &str) -> anyhow::Result<()> {
        if self.failing_urls.contains(url) {
            anyhow::bail!("endpoint {} unreachable", url);
        }
        self.calls
            .lock()
            .unwrap()
            .push(Action::Notify(url.to_string(), body.to_string()));
        Ok(())
    }
}
