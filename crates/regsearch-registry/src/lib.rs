//! Registry HTTP client for regsearch
//!
//! This crate provides functionality for:
//! - Paging through the catalog of a Docker Registry HTTP API v2 endpoint
//! - Listing repository tags with Link-header pagination
//! - Resolving tags or manifest digests to image config metadata
//!
//! [`RegistryClient`] implements [`regsearch_core::RegistrySource`], so it
//! plugs straight into the crawler and the notification processor.

pub mod registry;
pub mod types;

pub use registry::{RegistryClient, DEFAULT_PAGE_SIZE};
pub use types::{ImageConfig, ImageManifest};
