//! # thingmirror
//!
//! Incremental mirror for things (3D-printable designs) published on a
//! Thingiverse-style REST API.
//!
//! ## Design Philosophy
//!
//! thingmirror is designed to be:
//! - **Incremental** - A thing is only downloaded again when its remote files changed
//! - **Non-destructive** - Superseded and failed snapshots are renamed aside, never deleted
//! - **Library-first** - The CLI is a thin shell over [`Mirror`]
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use thingmirror::{ApiClient, Config, Grouping, Mirror};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let api_key = config.resolve_api_key()?;
//!     let client = Arc::new(ApiClient::new(&config.api, api_key, config.retry.clone())?);
//!     let mirror = Mirror::with_client(config, client)?;
//!
//!     // Subscribe to events
//!     let mut events = mirror.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let grouping = Grouping::designs("some_user", mirror.target_dir());
//!     let report = mirror.sync_grouping(&grouping).await?;
//!     println!("{} new, {} current", report.ok, report.already_downloaded);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Mirror facade, worker pool, grouping traversal and batch files
pub mod mirror;
/// Remote API seams and client
pub mod remote;
/// Retry logic with exponential backoff
pub mod retry;
/// On-disk snapshot layout
pub mod snapshot;
/// Sync engine
pub mod sync;
/// Core types
pub mod types;
/// Name, path and log helpers
pub mod utils;

pub use config::{ApiConfig, Config, MirrorConfig, RetryConfig};
pub use error::{Error, FetchError, Result, SnapshotError};
pub use mirror::{
    BatchError, GroupingReport, Instruction, Mirror, QueueItem, WorkerPool, parse_instruction,
};
pub use remote::{
    ApiClient, ArtifactSource, Grouping, ListingStrategy, RemoteCatalog, collect_references,
};
pub use snapshot::SnapshotStore;
pub use sync::{Artifact, ParseFailure, ParsedArtifact, SyncEngine};
pub use types::{
    ArtifactDetails, ArtifactId, ArtifactReference, ArtifactRequest, Event, FileDescriptor,
    FileDescriptorSet, ImageDescriptor, SyncOutcome, Watermark,
};
