//! In-memory index engine with JSON snapshot persistence

use async_trait::async_trait;
use camino::Utf8Path;
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use super::{IndexStore, ProjectedDocument, SearchPage};
use crate::error::{Error, Result};
use crate::mapping;
use crate::query::Query;
use crate::types::Document;

/// Document map guarded by a single reader/writer lock
///
/// Documents are held behind `Arc` so a replace swaps the whole value in one
/// step; readers never observe a half-written document. Each upsert stamps
/// its entry with the next write revision.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    inner: RwLock<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    docs: HashMap<String, Entry>,
    revision: u64,
}

#[derive(Debug)]
struct Entry {
    revision: u64,
    doc: Arc<Document>,
}

type ReadGuard<'a> = std::sync::RwLockReadGuard<'a, Entries>;
type WriteGuard<'a> = std::sync::RwLockWriteGuard<'a, Entries>;

impl MemoryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore an index from a snapshot file; a missing file yields an empty index
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {}, starting with an empty index", path);
                return Ok(Self::new());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let documents: Vec<Document> = serde_json::from_str(&content)?;
        info!("Loaded {} documents from {}", documents.len(), path);

        let docs = documents
            .into_iter()
            .map(|doc| {
                let entry = Entry {
                    revision: 0,
                    doc: Arc::new(doc),
                };
                (entry.doc.id.clone(), entry)
            })
            .collect();
        Ok(Self {
            inner: RwLock::new(Entries { docs, revision: 0 }),
        })
    }

    /// Write every document to a snapshot file
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        let mut documents: Vec<Arc<Document>> = self
            .read()?
            .docs
            .values()
            .map(|e| Arc::clone(&e.doc))
            .collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));

        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let snapshot: Vec<&Document> = documents.iter().map(|d| d.as_ref()).collect();
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        fs::rename(&tmp, path)?;

        info!("Saved {} documents to {}", documents.len(), path);
        Ok(())
    }

    fn read(&self) -> Result<ReadGuard<'_>> {
        self.inner
            .read()
            .map_err(|_| Error::store("index lock poisoned"))
    }

    fn write(&self) -> Result<WriteGuard<'_>> {
        self.inner
            .write()
            .map_err(|_| Error::store("index lock poisoned"))
    }
}

#[async_trait]
impl IndexStore for MemoryIndex {
    async fn upsert(&self, doc: Document) -> Result<()> {
        debug!("Indexing {} ({})", doc.full_name, doc.id);
        let mut entries = self.write()?;
        entries.revision += 1;
        let entry = Entry {
            revision: entries.revision,
            doc: Arc::new(doc),
        };
        entries.docs.insert(entry.doc.id.clone(), entry);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if self.write()?.docs.remove(id).is_some() {
            debug!("Removed document {}", id);
        }
        Ok(())
    }

    async fn delete_manifest(&self, manifest_digest: &str) -> Result<Vec<String>> {
        let mut entries = self.write()?;
        let ids: Vec<String> = entries
            .docs
            .values()
            .filter(|e| e.doc.manifest_digest.as_deref() == Some(manifest_digest))
            .map(|e| e.doc.id.clone())
            .collect();
        for id in &ids {
            entries.docs.remove(id);
        }
        Ok(ids)
    }

    async fn search(
        &self,
        query: &Query,
        fields: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage> {
        let mut matches: Vec<(f64, Arc<Document>)> = self
            .read()?
            .docs
            .values()
            .filter_map(|e| query.score(&e.doc).map(|score| (score, Arc::clone(&e.doc))))
            .collect();

        matches.sort_by(|(sa, a), (sb, b)| {
            sb.total_cmp(sa)
                .then_with(|| a.full_name.cmp(&b.full_name))
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = matches.len() as u64;
        let hits = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(score, doc)| {
                Ok(ProjectedDocument {
                    id: doc.id.clone(),
                    score,
                    fields: mapping::project(&doc, fields)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SearchPage { total, hits })
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.docs.get(id).map(|e| Document::clone(&e.doc)))
    }

    async fn ids(&self) -> Result<Vec<String>> {
        Ok(self.read()?.docs.keys().cloned().collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.read()?.docs.len())
    }

    async fn revision(&self) -> Result<u64> {
        Ok(self.read()?.revision)
    }

    async fn changed_since(&self, revision: u64) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .docs
            .values()
            .filter(|e| e.revision > revision)
            .map(|e| e.doc.id.clone())
            .collect())
    }
}
