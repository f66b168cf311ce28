//! Full registry crawl
//!
//! Walks the registry catalog page by page, lists each repository's tags and
//! resolves every tag on a bounded pool of tasks. Per-tag and per-repository
//! failures are recorded and skipped. [`Crawler::build`] returns only after
//! every dispatched resolution has finished.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::mapping;
use crate::source::RegistrySource;
use crate::store::IndexStore;

/// Default number of tag resolutions in flight
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Crawl tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Maximum tag resolutions in flight
    pub concurrency: usize,
    /// Delete indexed documents whose digest no tag referenced
    pub prune_stale: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            prune_stale: false,
        }
    }
}

/// A tag that was resolved and indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedImage {
    pub repository: String,
    pub tag: String,
    pub digest: String,
}

/// A repository or tag that could not be indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlFailure {
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub error: String,
}

/// Outcome of a full crawl
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    /// Repositories discovered in the catalog
    pub repositories: usize,
    pub indexed: Vec<IndexedImage>,
    /// Repositories whose tag list could not be fetched
    pub skipped_repositories: Vec<CrawlFailure>,
    /// Tags that failed to resolve or index
    pub failed_tags: Vec<CrawlFailure>,
    /// Stale document IDs removed by reconciliation
    pub pruned: Vec<String>,
}

impl CrawlReport {
    /// True when every repository and tag was indexed
    pub fn is_complete(&self) -> bool {
        self.skipped_repositories.is_empty() && self.failed_tags.is_empty()
    }
}

/// Builds the index from the full registry contents
pub struct Crawler {
    registry: Arc<dyn RegistrySource>,
    store: Arc<dyn IndexStore>,
    options: CrawlOptions,
}

type TagTask = (String, String, Result<String>);

impl Crawler {
    /// Create a crawler with default options
    pub fn new(registry: Arc<dyn RegistrySource>, store: Arc<dyn IndexStore>) -> Self {
        Self {
            registry,
            store,
            options: CrawlOptions::default(),
        }
    }

    /// Override crawl options
    pub fn with_options(mut self, options: CrawlOptions) -> Self {
        self.options = options;
        self
    }

    /// Run a full crawl
    ///
    /// A failed catalog page fetch ends the walk and is returned as an error
    /// once the tasks already dispatched have completed. No page is retried.
    pub async fn build(&self) -> Result<CrawlReport> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks: JoinSet<TagTask> = JoinSet::new();
        let mut pending: HashMap<Id, (String, String)> = HashMap::new();
        let mut report = CrawlReport::default();

        // Only documents present before the walk are pruning candidates
        let baseline = if self.options.prune_stale {
            Some(Baseline {
                ids: self.store.ids().await?,
                revision: self.store.revision().await?,
            })
        } else {
            None
        };

        let walked = self
            .walk(&semaphore, &mut tasks, &mut pending, &mut report)
            .await;

        // Completion barrier: every dispatched resolution reports back
        while let Some(joined) = tasks.join_next_with_id().await {
            reap(&mut report, &mut pending, joined);
        }

        walked?;

        if let Some(baseline) = baseline {
            self.reconcile(baseline, &mut report).await?;
        }

        info!(
            "Crawl finished: {} repositories, {} images indexed, {} tags failed, {} repositories skipped",
            report.repositories,
            report.indexed.len(),
            report.failed_tags.len(),
            report.skipped_repositories.len()
        );
        Ok(report)
    }

    async fn walk(
        &self,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<TagTask>,
        pending: &mut HashMap<Id, (String, String)>,
        report: &mut CrawlReport,
    ) -> Result<()> {
        let mut cursor: Option<String> = None;

        loop {
            let page = self.registry.list_repositories(cursor.as_deref()).await?;
            debug!(
                "Catalog page after {:?}: {} repositories",
                cursor,
                page.repositories.len()
            );

            for repository in &page.repositories {
                report.repositories += 1;

                let tags = match self.registry.list_tags(repository).await {
                    Ok(tags) => tags,
                    Err(e) => {
                        warn!("Skipping repository {}: {}", repository, e);
                        report.skipped_repositories.push(CrawlFailure {
                            repository: repository.clone(),
                            tag: None,
                            error: e.to_string(),
                        });
                        continue;
                    }
                };

                if tags.is_empty() {
                    debug!("Repository {} has no tags", repository);
                }

                for tag in tags {
                    // Bound live tasks, not only fetches
                    let permit = Arc::clone(semaphore)
                        .acquire_owned()
                        .await
                        .map_err(|e| Error::crawl(format!("worker pool closed: {}", e)))?;
                    while let Some(joined) = tasks.try_join_next_with_id() {
                        reap(report, pending, joined);
                    }

                    let registry = Arc::clone(&self.registry);
                    let store = Arc::clone(&self.store);
                    let repo = repository.clone();
                    let label = (repo.clone(), tag.clone());

                    let handle = tasks.spawn(async move {
                        let _permit = permit;
                        let outcome = index_tag(registry.as_ref(), store.as_ref(), &repo, &tag).await;
                        (repo, tag, outcome)
                    });
                    pending.insert(handle.id(), label);
                }
            }

            let next = match (page.has_more, page.repositories.last()) {
                (true, Some(last)) if cursor.as_deref() != Some(last.as_str()) => last.clone(),
                (true, _) => {
                    warn!("Catalog reported more pages without advancing; stopping walk");
                    return Ok(());
                }
                (false, _) => return Ok(()),
            };
            cursor = Some(next);
        }
    }

    /// Remove pre-crawl documents whose digest no crawled tag referenced
    ///
    /// Documents written while the crawl ran (webhook pushes) are kept.
    async fn reconcile(&self, baseline: Baseline, report: &mut CrawlReport) -> Result<()> {
        if !report.is_complete() {
            warn!("Skipping stale document pruning: crawl was incomplete");
            return Ok(());
        }

        let changed: HashSet<String> = self
            .store
            .changed_since(baseline.revision)
            .await?
            .into_iter()
            .collect();
        let seen: HashSet<&str> = report.indexed.iter().map(|i| i.digest.as_str()).collect();

        let mut pruned = Vec::new();
        for id in baseline.ids {
            if seen.contains(id.as_str()) || changed.contains(&id) {
                continue;
            }
            match self.store.delete(&id).await {
                Ok(()) => {
                    debug!("Pruned stale document {}", id);
                    pruned.push(id);
                }
                Err(e) => warn!("Failed to prune {}: {}", id, e),
            }
        }
        if !pruned.is_empty() {
            info!("Pruned {} stale documents", pruned.len());
        }
        report.pruned = pruned;
        Ok(())
    }
}

/// Index contents captured before a pruning crawl
struct Baseline {
    ids: Vec<String>,
    revision: u64,
}

async fn index_tag(
    registry: &dyn RegistrySource,
    store: &dyn IndexStore,
    repository: &str,
    tag: &str,
) -> Result<String> {
    let raw = registry.resolve_image(repository, tag, None).await?;
    let doc = mapping::parse(repository, tag, &raw);
    let id = doc.id.clone();
    store.upsert(doc).await?;
    Ok(id)
}

fn reap(
    report: &mut CrawlReport,
    pending: &mut HashMap<Id, (String, String)>,
    joined: std::result::Result<(Id, TagTask), JoinError>,
) {
    match joined {
        Ok((id, (repository, tag, outcome))) => {
            pending.remove(&id);
            record(report, repository, tag, outcome);
        }
        Err(e) => {
            let (repository, tag) = pending
                .remove(&e.id())
                .unwrap_or_else(|| ("<unknown>".to_string(), "<unknown>".to_string()));
            warn!("Indexing task for {}:{} aborted: {}", repository, tag, e);
            report.failed_tags.push(CrawlFailure {
                repository,
                tag: Some(tag),
                error: e.to_string(),
            });
        }
    }
}

fn record(report: &mut CrawlReport, repository: String, tag: String, outcome: Result<String>) {
    match outcome {
        Ok(digest) => {
            debug!("Indexed {}:{} as {}", repository, tag, digest);
            report.indexed.push(IndexedImage {
                repository,
                tag,
                digest,
            });
        }
        Err(e) => {
            warn!("Skipping {}:{}: {}", repository, tag, e);
            report.failed_tags.push(CrawlFailure {
                repository,
                tag: Some(tag),
                error: e.to_string(),
            });
        }
    }
}
