//! Registry webhook notification processing
//!
//! Each event in a batch is classified as a push, a delete or ignored, then
//! applied to the index in the order received. A failure on one event is
//! logged and the rest of the batch still runs. After a successful index
//! mutation the hooks bound to that event type are fired.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::hooks::{HookContext, HookEngine, HookEvent};
use crate::mapping;
use crate::source::RegistrySource;
use crate::store::IndexStore;
use crate::types::Document;

/// Manifest media types that describe a single indexable image
pub const IMAGE_MANIFEST_TYPES: &[&str] = &[
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.oci.image.manifest.v1+json",
];

/// Webhook body: a batch of registry events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub events: Vec<Event>,
}

/// One registry event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub target: Target,
}

/// What the event acted on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub digest: String,
}

/// How an event will be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Push,
    Delete,
    Ignored(String),
}

/// Decode a webhook body; anything that is not a JSON envelope is malformed
pub fn parse_envelope(body: &[u8]) -> Result<Envelope> {
    serde_json::from_slice(body).map_err(|e| Error::malformed_envelope(e.to_string()))
}

/// Classify an event by action and media type
pub fn classify(event: &Event) -> EventKind {
    let target = &event.target;
    match event.action.as_str() {
        "push" => {
            if !IMAGE_MANIFEST_TYPES.contains(&target.media_type.as_str()) {
                EventKind::Ignored(format!("unrecognized media type '{}'", target.media_type))
            } else if target.tag.as_deref().unwrap_or_default().is_empty() {
                EventKind::Ignored("push without a tag".to_string())
            } else if target.repository.is_empty() {
                EventKind::Ignored("push without a repository".to_string())
            } else {
                EventKind::Push
            }
        }
        "delete" if target.digest.is_empty() => {
            EventKind::Ignored("delete without a digest".to_string())
        }
        "delete" => EventKind::Delete,
        other => EventKind::Ignored(format!("unknown action '{}'", other)),
    }
}

/// Per-batch tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub received: usize,
    pub pushed: usize,
    pub deleted: usize,
    pub ignored: usize,
    /// Events whose fetch or index mutation failed
    pub failed: Vec<String>,
    /// Hooks that failed to run
    pub hook_failures: Vec<String>,
}

/// Applies webhook events to the index and fires hooks
pub struct NotificationProcessor {
    registry: Arc<dyn RegistrySource>,
    store: Arc<dyn IndexStore>,
    hooks: Arc<HookEngine>,
}

impl NotificationProcessor {
    pub fn new(
        registry: Arc<dyn RegistrySource>,
        store: Arc<dyn IndexStore>,
        hooks: Arc<HookEngine>,
    ) -> Self {
        Self {
            registry,
            store,
            hooks,
        }
    }

    /// Decode and process a raw webhook body
    ///
    /// Only an undecodable body is an error; everything else is reported in
    /// the returned batch report.
    pub async fn handle(&self, body: &[u8]) -> Result<BatchReport> {
        let envelope = parse_envelope(body)?;
        Ok(self.process(envelope).await)
    }

    /// Apply a batch of events in order
    pub async fn process(&self, envelope: Envelope) -> BatchReport {
        let mut report = BatchReport {
            received: envelope.events.len(),
            ..Default::default()
        };

        for event in envelope.events {
            let target = &event.target;
            let context = match classify(&event) {
                EventKind::Ignored(reason) => {
                    debug!("Ignoring event {} ({}): {}", event.id, event.action, reason);
                    report.ignored += 1;
                    continue;
                }
                EventKind::Delete => match self.apply_delete(target).await {
                    Ok(()) => {
                        report.deleted += 1;
                        HookContext {
                            event: HookEvent::Delete,
                            repository: target.repository.clone(),
                            tag: target.tag.clone(),
                            digest: target.digest.clone(),
                            document: None,
                        }
                    }
                    Err(e) => {
                        warn!("Delete of {} failed: {}", target.digest, e);
                        report.failed.push(format!("{}: {}", target.digest, e));
                        continue;
                    }
                },
                EventKind::Push => match self.apply_push(target).await {
                    Ok(doc) => {
                        report.pushed += 1;
                        HookContext {
                            event: HookEvent::Push,
                            repository: target.repository.clone(),
                            tag: target.tag.clone(),
                            digest: doc.id.clone(),
                            document: Some(doc),
                        }
                    }
                    Err(e) => {
                        let name = format!(
                            "{}:{}",
                            target.repository,
                            target.tag.as_deref().unwrap_or_default()
                        );
                        warn!("Push of {} failed: {}", name, e);
                        report.failed.push(format!("{}: {}", name, e));
                        continue;
                    }
                },
            };

            report.hook_failures.extend(self.fire_hooks(context).await);
        }

        info!(
            "Processed {} events: {} pushed, {} deleted, {} ignored, {} failed",
            report.received,
            report.pushed,
            report.deleted,
            report.ignored,
            report.failed.len()
        );
        report
    }

    async fn apply_push(&self, target: &Target) -> Result<Document> {
        let tag = target.tag.as_deref().unwrap_or_default();
        let digest = (!target.digest.is_empty()).then_some(target.digest.as_str());

        let raw = self
            .registry
            .resolve_image(&target.repository, tag, digest)
            .await?;
        let doc = mapping::parse(&target.repository, tag, &raw);
        self.store.upsert(doc.clone()).await?;
        debug!("Indexed {} as {}", doc.full_name, doc.id);
        Ok(doc)
    }

    /// Registry deletes name manifest digests, so remove by either identity
    async fn apply_delete(&self, target: &Target) -> Result<()> {
        self.store.delete(&target.digest).await?;
        let removed = self.store.delete_manifest(&target.digest).await?;
        debug!(
            "Deleted {} ({} documents by manifest digest)",
            target.digest,
            removed.len()
        );
        Ok(())
    }

    async fn fire_hooks(&self, context: HookContext) -> Vec<String> {
        if self.hooks.hooks_for(context.event).next().is_none() {
            return Vec::new();
        }

        let hooks = Arc::clone(&self.hooks);
        match tokio::task::spawn_blocking(move || hooks.fire(&context)).await {
            Ok(failures) => failures.iter().map(ToString::to_string).collect(),
            Err(e) => {
                warn!("Hook evaluation task failed: {}", e);
                vec![e.to_string()]
            }
        }
    }
}
