//! Full registry crawl command

use anyhow::{bail, Result};
use camino::Utf8Path;
use regsearch_core::{CrawlReport, Crawler};
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};
use tracing::{info, warn};

use super::{load_config, open_index, registry_client, snapshot_path};
use crate::cli::CrawlArgs;
use crate::output;

#[derive(Tabled)]
struct FailureRow {
    repository: String,
    tag: String,
    error: String,
}

/// Crawl the registry into the index and save the snapshot
pub async fn run(args: CrawlArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;

    let mut options = config.config.crawl.options();
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 {
            bail!("--concurrency must be greater than 0");
        }
        options.concurrency = concurrency;
    }
    options.prune_stale |= args.prune;

    let snapshot = snapshot_path(args.snapshot, &config);
    if snapshot.is_none() {
        warn!("No snapshot configured; the crawled index will not be kept");
    }

    let registry = Arc::new(registry_client(&config)?);
    let store = Arc::new(open_index(snapshot.as_deref())?);

    info!("Crawling {}", config.config.registry.url);
    let report = Crawler::new(registry, store.clone())
        .with_options(options)
        .build()
        .await?;

    if let Some(path) = &snapshot {
        store.save(path)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &CrawlReport) {
    if report.is_complete() {
        output::success("Crawl complete");
    } else {
        output::warning("Crawl finished with failures");
    }
    output::kv("Repositories", &report.repositories.to_string());
    output::kv("Indexed", &report.indexed.len().to_string());
    output::kv("Pruned", &report.pruned.len().to_string());

    let failures: Vec<FailureRow> = report
        .skipped_repositories
        .iter()
        .chain(report.failed_tags.iter())
        .map(|f| FailureRow {
            repository: f.repository.clone(),
            tag: f.tag.clone().unwrap_or_else(|| "-".to_string()),
            error: f.error.clone(),
        })
        .collect();

    if !failures.is_empty() {
        println!();
        let mut table = Table::new(failures);
        table.with(Style::sharp());
        println!("{}", table);
    }
}
