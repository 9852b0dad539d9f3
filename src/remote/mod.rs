//! Remote source abstractions.
//!
//! The sync engine only sees two seams:
//! - [`ArtifactSource`] - per-thing detail lookup and content fetches
//! - [`RemoteCatalog`] - one page of a grouping's listing
//!
//! [`ApiClient`] implements both against the REST API; tests substitute
//! in-memory fakes.

mod client;

pub use client::ApiClient;

use crate::error::FetchError;
use crate::types::{ArtifactDetails, ArtifactId, ArtifactReference, FileDescriptor, ImageDescriptor};
use crate::utils::slugify;
use std::path::{Path, PathBuf};

/// Per-thing lookups
#[async_trait::async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Fetch metadata, file descriptors and image descriptors for a thing
    async fn fetch_details(&self, id: &ArtifactId) -> Result<ArtifactDetails, FetchError>;

    /// Fetch the content of one file
    async fn fetch_file(&self, file: &FileDescriptor) -> Result<Vec<u8>, FetchError>;

    /// Fetch the content of one image
    async fn fetch_image(&self, image: &ImageDescriptor) -> Result<Vec<u8>, FetchError>;
}

/// Paged listing of a grouping
#[async_trait::async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Fetch page `page` (1-based) of `grouping`; an empty page means there is no more
    async fn list_page(
        &self,
        grouping: &Grouping,
        page: u32,
    ) -> Result<Vec<ArtifactReference>, FetchError>;
}

/// How a grouping finds its things
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListingStrategy {
    /// A named collection of the user (matched case-insensitively)
    Collection {
        /// Collection name
        name: String,
    },
    /// Everything the user designed
    Designs,
    /// Everything the user liked
    Likes,
}

impl ListingStrategy {
    /// Whether the listing spans several pages
    pub fn is_paginated(&self) -> bool {
        !matches!(self, ListingStrategy::Collection { .. })
    }
}

/// A named set of things mirrored into one directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grouping {
    /// Owning user
    pub user: String,
    /// How the things are listed
    pub strategy: ListingStrategy,
    /// Directory the grouping's snapshots live in
    pub root: PathBuf,
}

impl Grouping {
    /// A user's named collection, mirrored into `<base>/<user>-<name>`
    pub fn collection(user: &str, name: &str, base_dir: &Path) -> Self {
        Self {
            user: user.to_string(),
            strategy: ListingStrategy::Collection {
                name: name.to_string(),
            },
            root: base_dir.join(format!("{}-{}", slugify(user), slugify(name))),
        }
    }

    /// A user's designs, mirrored into `<base>/<user> designs`
    pub fn designs(user: &str, base_dir: &Path) -> Self {
        Self {
            user: user.to_string(),
            strategy: ListingStrategy::Designs,
            root: base_dir.join(format!("{} designs", slugify(user))),
        }
    }

    /// A user's likes, mirrored into `<base>/<user> likes`
    pub fn likes(user: &str, base_dir: &Path) -> Self {
        Self {
            user: user.to_string(),
            strategy: ListingStrategy::Likes,
            root: base_dir.join(format!("{} likes", slugify(user))),
        }
    }

    /// Human-readable label for logs and events
    pub fn label(&self) -> String {
        match &self.strategy {
            ListingStrategy::Collection { name } => format!("collection '{}' of {}", name, self.user),
            ListingStrategy::Designs => format!("designs of {}", self.user),
            ListingStrategy::Likes => format!("likes of {}", self.user),
        }
    }
}

/// Walk a grouping's pages and collect its references in listing order
///
/// Stops at the first empty page. A failing page is logged and ends the
/// walk; references from earlier pages are still returned.
pub async fn collect_references(
    catalog: &dyn RemoteCatalog,
    grouping: &Grouping,
) -> Vec<ArtifactReference> {
    let mut references = Vec::new();
    let mut page = 1;

    loop {
        match catalog.list_page(grouping, page).await {
            Ok(items) if items.is_empty() => break,
            Ok(items) => {
                tracing::debug!(
                    grouping = %grouping.label(),
                    page,
                    count = items.len(),
                    "received listing page"
                );
                references.extend(items);
            }
            Err(e) => {
                tracing::error!(
                    grouping = %grouping.label(),
                    page,
                    error = %e,
                    "listing failed, keeping references collected so far"
                );
                break;
            }
        }

        if !grouping.strategy.is_paginated() {
            break;
        }
        page += 1;
    }

    tracing::info!(
        grouping = %grouping.label(),
        count = references.len(),
        "found things"
    );
    references
}
