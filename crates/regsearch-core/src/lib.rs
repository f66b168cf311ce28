//! # regsearch-core
//!
//! Core library for regsearch, a searchable index of container images held
//! in a remote registry:
//! - Document model and field mapping rules for image metadata
//! - Index store contract with an in-memory engine
//! - Query builder for simple and advanced search strings
//! - Full registry crawler with a bounded worker pool
//! - Webhook notification processor for incremental index maintenance
//! - Hook engine evaluating operator templates on push/delete events
//! - Configuration file loading

pub mod config;
pub mod crawler;
pub mod error;
pub mod hooks;
pub mod mapping;
pub mod notify;
pub mod query;
pub mod search;
pub mod source;
pub mod store;
pub mod types;

pub use config::RegsearchConfig;
pub use crawler::{CrawlOptions, CrawlReport, Crawler};
pub use error::{Error, Result};
pub use hooks::{HookActions, HookContext, HookEngine, HookEvent};
pub use notify::{BatchReport, NotificationProcessor};
pub use search::{SearchRequest, SearchResponse};
pub use source::{RegistrySource, RepositoryPage};
pub use store::{IndexStore, MemoryIndex};
pub use types::{Document, ImageMetadata};
