//! The [`Mirror`] facade split into focused submodules.
//!
//! - [`pool`] - fixed-size worker pool draining a shared queue of things
//! - [`grouping`] - collection, designs and likes traversal with quick mode
//! - [`batch`] - line-oriented instruction files

pub mod batch;
pub mod grouping;
pub mod pool;

pub use batch::{BatchError, Instruction, parse_instruction};
pub use grouping::GroupingReport;
pub use pool::{QueueItem, WorkerPool};

use crate::config::Config;
use crate::error::Result;
use crate::remote::{ApiClient, ArtifactSource, RemoteCatalog};
use crate::snapshot::SnapshotStore;
use crate::sync::SyncEngine;
use crate::types::{ArtifactId, Event, SyncOutcome};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow subscribers lag rather than block syncing
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Main entry point for mirroring things
///
/// Cheap to clone: every field is shared. One `Mirror` owns the sync engine,
/// the remote catalog and the event channel for a whole run.
#[derive(Clone)]
pub struct Mirror {
    config: Arc<Config>,
    engine: Arc<SyncEngine>,
    catalog: Arc<dyn RemoteCatalog>,
    event_tx: broadcast::Sender<Event>,
}

impl Mirror {
    /// Create a mirror over explicit collaborators
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration is invalid.
    pub fn new(
        config: Config,
        source: Arc<dyn ArtifactSource>,
        catalog: Arc<dyn RemoteCatalog>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let store = SnapshotStore::new(config.mirror.max_path_length);
        let engine = SyncEngine::new(source, store, config.mirror.compress)
            .with_events(event_tx.clone());

        tracing::debug!(
            target_dir = ?config.mirror.target_dir,
            workers = config.mirror.workers,
            quick = config.mirror.quick,
            compress = config.mirror.compress,
            "mirror created"
        );

        Ok(Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            catalog,
            event_tx,
        })
    }

    /// Create a mirror backed by one API client for both lookups and listings
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration is invalid.
    pub fn with_client(config: Config, client: Arc<ApiClient>) -> Result<Self> {
        Self::new(config, client.clone(), client)
    }

    /// Subscribe to mirror events
    ///
    /// Events emitted before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this mirror runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mirror root directory
    pub fn target_dir(&self) -> &Path {
        &self.config.mirror.target_dir
    }

    /// The sync engine shared by every worker
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }

    /// Sync one thing by ID into the mirror root, inline
    pub async fn sync_thing(&self, id: impl Into<ArtifactId>) -> SyncOutcome {
        self.engine.sync(id.into(), self.target_dir()).await
    }

    /// Start a worker pool sized from `mirror.workers` writing into the mirror root
    pub fn start_pool(&self) -> WorkerPool {
        WorkerPool::start(
            self.engine.clone(),
            self.target_dir().to_path_buf(),
            self.config.mirror.workers,
            self.event_tx.clone(),
        )
    }
}
