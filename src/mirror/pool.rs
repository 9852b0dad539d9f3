//! Fixed-size worker pool for directly requested things.
//!
//! Workers share one FIFO queue. Each pulls one item at a time and runs a
//! full sync for it; results are only logged. [`QueueItem::Shutdown`] is the
//! sentinel that ends one worker's loop.

use crate::error::{Error, Result};
use crate::sync::SyncEngine;
use crate::types::{ArtifactRequest, Event};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;

/// One unit of work on the shared queue
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueItem {
    /// Sync this thing
    Sync(ArtifactRequest),
    /// Stop the worker that receives this
    Shutdown,
}

/// Workers draining a shared queue of things
pub struct WorkerPool {
    sender: mpsc::UnboundedSender<QueueItem>,
    workers: Vec<JoinHandle<()>>,
    event_tx: broadcast::Sender<Event>,
}

impl WorkerPool {
    /// Spawn `workers` workers syncing into `base_dir`
    pub fn start(
        engine: Arc<SyncEngine>,
        base_dir: PathBuf,
        workers: usize,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|index| {
                let engine = engine.clone();
                let receiver = receiver.clone();
                let base_dir = base_dir.clone();
                tokio::spawn(async move { run_worker(index, engine, receiver, base_dir).await })
            })
            .collect::<Vec<_>>();

        tracing::info!(workers = handles.len(), "worker pool started");

        Self {
            sender,
            workers: handles,
            event_tx,
        }
    }

    /// Number of workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Push a thing onto the queue
    ///
    /// # Errors
    ///
    /// Fails only if every worker has already exited.
    pub fn enqueue(&self, request: impl Into<ArtifactRequest>) -> Result<()> {
        let request = request.into();
        let id = request.id().clone();
        self.sender
            .send(QueueItem::Sync(request))
            .map_err(|_| Error::Other("worker pool is no longer running".to_string()))?;
        tracing::debug!(artifact_id = %id, "queued thing");
        self.event_tx.send(Event::Queued { id }).ok();
        Ok(())
    }

    /// Let the workers finish the queue, then stop them
    ///
    /// Pushes one sentinel per worker behind everything already queued and
    /// waits for every worker. A worker that panicked is logged.
    pub async fn shutdown(self) {
        for _ in &self.workers {
            self.sender.send(QueueItem::Shutdown).ok();
        }

        for (index, handle) in self.workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                tracing::error!(worker = index, error = %e, "worker terminated abnormally");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

async fn run_worker(
    index: usize,
    engine: Arc<SyncEngine>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<QueueItem>>>,
    base_dir: PathBuf,
) {
    tracing::debug!(worker = index, "worker started");
    loop {
        // Lock only for the pull so other workers can take the next item
        let item = { receiver.lock().await.recv().await };
        match item {
            Some(QueueItem::Sync(request)) => {
                let id = request.id().clone();
                tracing::info!(worker = index, artifact_id = %id, "processing queued thing");
                let outcome = engine.sync(request, &base_dir).await;
                tracing::debug!(worker = index, artifact_id = %id, %outcome, "queued thing finished");
            }
            Some(QueueItem::Shutdown) | None => break,
        }
    }
    tracing::debug!(worker = index, "worker exiting");
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::snapshot::SnapshotStore;
    use crate::sync::test_helpers::{FakeSource, details, file};
    use crate::types::ArtifactId;
    use tempfile::TempDir;

    fn pool(source: &Arc<FakeSource>, base: &std::path::Path, workers: usize) -> WorkerPool {
        let engine = Arc::new(SyncEngine::new(
            source.clone(),
            SnapshotStore::new(4096),
            false,
        ));
        let (event_tx, _) = broadcast::channel(64);
        WorkerPool::start(engine, base.to_path_buf(), workers, event_tx)
    }

    #[tokio::test]
    async fn test_pool_drains_queue_before_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::new());
        for id in ["1", "2", "3", "4"] {
            source.set_thing(
                id,
                details(&format!("Part {}", id), vec![file("p.stl", "2021-01-01 00:00:00")]),
            );
        }

        let pool = pool(&source, temp_dir.path(), 2);
        assert_eq!(pool.worker_count(), 2);
        for id in ["1", "2", "3", "4"] {
            pool.enqueue(ArtifactId::from(id)).unwrap();
        }
        pool.shutdown().await;

        for id in ["1", "2", "3", "4"] {
            assert!(temp_dir.path().join(format!("{} - part {}", id, id)).is_dir());
        }
        assert_eq!(source.detail_calls().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_thing_does_not_stop_the_pool() {
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::new());
        source.fail_details(
            "1",
            FetchError::NotFound {
                address: "fake://things/1".to_string(),
            },
        );
        source.set_thing(
            "2",
            details("Bolt", vec![file("bolt.stl", "2021-01-01 00:00:00")]),
        );

        let pool = pool(&source, temp_dir.path(), 1);
        pool.enqueue(ArtifactId::from("1")).unwrap();
        pool.enqueue(ArtifactId::from("2")).unwrap();
        pool.shutdown().await;

        assert!(temp_dir.path().join("2 - bolt").is_dir());
    }

    #[tokio::test]
    async fn test_enqueue_emits_queued_event() {
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::new());
        let engine = Arc::new(SyncEngine::new(
            source.clone(),
            SnapshotStore::new(4096),
            false,
        ));
        let (event_tx, mut events) = broadcast::channel(64);
        let pool = WorkerPool::start(engine, temp_dir.path().to_path_buf(), 1, event_tx);

        pool.enqueue(ArtifactId::from("5")).unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            Event::Queued {
                id: ArtifactId::from("5")
            }
        );
        pool.shutdown().await;
    }
}
