//! Long-running service: webhook receiver, search API and optional crawl

use anyhow::{Context, Result};
use camino::Utf8Path;
use regsearch_core::hooks::HttpActions;
use regsearch_core::{Crawler, IndexStore, MemoryIndex, NotificationProcessor, RegistrySource};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use super::{load_config, open_index, registry_client, snapshot_path};
use crate::cli::ServeArgs;
use crate::server::{self, AppState};

/// Serve until Ctrl-C, then save the snapshot
pub async fn run(args: ServeArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let snapshot = snapshot_path(args.snapshot, &config);
    let listen = args
        .listen
        .unwrap_or_else(|| config.config.server.listen.clone());

    let registry: Arc<dyn RegistrySource> = Arc::new(registry_client(&config)?);
    let store: Arc<MemoryIndex> = Arc::new(open_index(snapshot.as_deref())?);

    let actions = Arc::new(HttpActions::new(Handle::current())?);
    let hooks = Arc::new(
        config
            .hook_engine(actions)
            .context("Failed to compile hooks")?,
    );
    info!("Compiled {} hooks", hooks.hooks().len());

    let processor = Arc::new(NotificationProcessor::new(
        registry.clone(),
        store.clone(),
        hooks,
    ));

    if args.crawl {
        let crawler =
            Crawler::new(registry, store.clone()).with_options(config.config.crawl.options());
        tokio::spawn(async move {
            match crawler.build().await {
                Ok(report) if report.is_complete() => {
                    info!("Background crawl indexed {} images", report.indexed.len())
                }
                Ok(report) => warn!(
                    "Background crawl indexed {} images; {} repositories and {} tags failed",
                    report.indexed.len(),
                    report.skipped_repositories.len(),
                    report.failed_tags.len()
                ),
                Err(e) => error!("Background crawl failed: {}", e),
            }
        });
    }

    let app = server::router(AppState {
        store: store.clone(),
        processor,
        default_max_results: config.config.search.default_max_results,
    });

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to listen on {}", listen))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(path) = &snapshot {
        store.save(path)?;
    }
    info!("Shut down with {} documents indexed", store.len().await?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
