//! The sync engine.
//!
//! One sync cycle per thing runs through two steps:
//! - [`SyncEngine::parse`] - fetch details, upgrade legacy layout, find the
//!   latest prior snapshot and decide whether an update is needed
//! - [`SyncEngine::download`] - rotate the old snapshot aside, reuse unchanged
//!   files, fetch the rest, write the marker and optionally compress
//!
//! Nothing that goes wrong here escapes the thing being processed: every
//! failure ends as a logged [`SyncOutcome::Failed`].

mod reconcile;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use crate::error::{Error, FetchError, Result};
use crate::remote::ArtifactSource;
use crate::snapshot::archive;
use crate::snapshot::{
    ARCHIVE_EXTENSION, CopyOutcome, IMAGES_DIR, LICENSE_FILE, MigrationOutcome, PreviousSnapshot,
    README_FILE, SnapshotLocation, SnapshotStore,
};
use crate::types::{
    ArtifactDetails, ArtifactId, ArtifactRequest, Event, SyncOutcome, Watermark,
};
use crate::utils::{slugify, unique_target};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// A thing whose details could not be fetched
///
/// Logged and reported as [`SyncOutcome::Failed`]; no local state is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not process thing {id}: {error}")]
pub struct ParseFailure {
    /// Thing ID
    pub id: ArtifactId,
    /// What the remote answered
    pub error: FetchError,
}

/// A thing with fetched details and a made update decision
#[derive(Clone, Debug)]
pub struct ParsedArtifact {
    /// Thing ID
    pub id: ArtifactId,
    /// Title, falling back to the listing name
    pub name: String,
    /// Stable file-name form of `name`
    pub slug: String,
    /// Everything the detail lookup returned
    pub details: ArtifactDetails,
    /// Where the current snapshot lives
    pub snapshot_dir: PathBuf,
    /// The most recent prior snapshot, directory or archive
    pub previous: Option<PreviousSnapshot>,
    /// Whether a new snapshot will be written
    pub needs_download: bool,
}

impl ParsedArtifact {
    /// Watermark of the prior snapshot, if it has a usable one
    pub fn previous_watermark(&self) -> Option<Watermark> {
        self.previous.as_ref().and_then(|p| p.watermark)
    }
}

/// One sync unit
///
/// Constructed fresh for every run; never reused across cycles.
#[derive(Clone, Debug)]
pub enum Artifact {
    /// Only the request is known
    Unparsed(ArtifactRequest),
    /// Details fetched, update decision made
    Parsed(ParsedArtifact),
    /// The detail lookup failed
    ParseFailed(ParseFailure),
}

impl Artifact {
    /// Start a sync unit for `request`
    pub fn new(request: impl Into<ArtifactRequest>) -> Self {
        Artifact::Unparsed(request.into())
    }

    /// The thing ID
    pub fn id(&self) -> &ArtifactId {
        match self {
            Artifact::Unparsed(request) => request.id(),
            Artifact::Parsed(parsed) => &parsed.id,
            Artifact::ParseFailed(failure) => &failure.id,
        }
    }

    /// Update decision, once parsed
    pub fn needs_download(&self) -> Option<bool> {
        match self {
            Artifact::Parsed(parsed) => Some(parsed.needs_download),
            Artifact::Unparsed(_) | Artifact::ParseFailed(_) => None,
        }
    }
}

/// Source of files for reuse during one download
#[derive(Debug, Default)]
struct ReuseSource {
    /// Directory holding the prior snapshot's files
    dir: Option<PathBuf>,
    /// Scratch directory to remove once the download is over
    staging: Option<PathBuf>,
}

/// Per-thing sync orchestration
#[derive(Clone)]
pub struct SyncEngine {
    source: Arc<dyn ArtifactSource>,
    store: SnapshotStore,
    compress: bool,
    event_tx: Option<broadcast::Sender<Event>>,
}

impl SyncEngine {
    /// Create an engine fetching from `source` and writing through `store`
    pub fn new(source: Arc<dyn ArtifactSource>, store: SnapshotStore, compress: bool) -> Self {
        Self {
            source,
            store,
            compress,
            event_tx: None,
        }
    }

    /// Publish progress events on `event_tx`
    #[must_use]
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.event_tx {
            // No subscribers is fine
            tx.send(event).ok();
        }
    }

    /// Fetch a thing's details and decide whether it needs a new snapshot
    ///
    /// Runs the legacy directory upgrade before looking for prior snapshots.
    /// A failed detail lookup is logged and returned as [`ParseFailure`]; in
    /// that case nothing on disk is touched.
    pub async fn parse(
        &self,
        request: &ArtifactRequest,
        base_dir: &Path,
    ) -> std::result::Result<ParsedArtifact, ParseFailure> {
        let id = request.id().clone();
        let details = match self.source.fetch_details(&id).await {
            Ok(details) => details,
            Err(e) => {
                error!(artifact_id = %id, error = %e, "failed to fetch thing details");
                return Err(ParseFailure { id, error: e });
            }
        };

        let name = details
            .title
            .clone()
            .or_else(|| request.display_name().map(str::to_string))
            .unwrap_or_default();
        let slug = slugify(&name);
        let snapshot_dir = SnapshotStore::snapshot_dir(base_dir, &id, &slug);

        if !slug.is_empty() {
            match self.store.migrate_legacy(&base_dir.join(&slug), &snapshot_dir) {
                Ok(MigrationOutcome::Migrated(path)) => {
                    info!(artifact_id = %id, ?path, "upgraded old style snapshot directory");
                }
                Ok(MigrationOutcome::NotApplicable) => {}
                Err(e) => {
                    warn!(artifact_id = %id, error = %e, "could not upgrade old style snapshot directory");
                }
            }
        }

        let previous = self.store.locate_latest(&id, &slug, base_dir);
        let previous_watermark = previous.as_ref().and_then(|p| p.watermark);
        let needs_download = reconcile::needs_download(&details.files, previous_watermark);

        debug!(
            artifact_id = %id,
            name = %name,
            files = details.files.len(),
            images = details.images.len(),
            remote = ?details.files.max_last_modified(),
            local = ?previous_watermark,
            needs_download,
            "parsed thing"
        );

        self.emit(Event::Parsed {
            id: id.clone(),
            name: name.clone(),
            needs_download,
        });

        Ok(ParsedArtifact {
            id,
            name,
            slug,
            details,
            snapshot_dir,
            previous,
            needs_download,
        })
    }

    /// Bring a thing's local snapshot up to date
    ///
    /// Parses first if `artifact` has not been parsed yet.
    pub async fn download(&self, artifact: &mut Artifact, base_dir: &Path) -> SyncOutcome {
        let parsed = match artifact {
            Artifact::Parsed(parsed) => parsed.clone(),
            Artifact::ParseFailed(failure) => return self.report_parse_failure(failure),
            Artifact::Unparsed(request) => {
                let request = request.clone();
                match self.parse(&request, base_dir).await {
                    Ok(parsed) => {
                        *artifact = Artifact::Parsed(parsed.clone());
                        parsed
                    }
                    Err(failure) => {
                        let outcome = self.report_parse_failure(&failure);
                        *artifact = Artifact::ParseFailed(failure);
                        return outcome;
                    }
                }
            }
        };

        self.download_parsed(&parsed, base_dir).await
    }

    /// Parse and download a single request
    pub async fn sync(&self, request: impl Into<ArtifactRequest>, base_dir: &Path) -> SyncOutcome {
        let mut artifact = Artifact::new(request);
        self.download(&mut artifact, base_dir).await
    }

    fn report_parse_failure(&self, failure: &ParseFailure) -> SyncOutcome {
        error!(artifact_id = %failure.id, error = %failure.error, "could not download thing");
        self.emit(Event::Failed {
            id: failure.id.clone(),
            error: failure.to_string(),
        });
        SyncOutcome::Failed
    }

    fn report_failure(&self, parsed: &ParsedArtifact, reason: String) -> SyncOutcome {
        error!(artifact_id = %parsed.id, name = %parsed.name, error = %reason, "download failed");
        self.emit(Event::Failed {
            id: parsed.id.clone(),
            error: reason,
        });
        SyncOutcome::Failed
    }

    async fn download_parsed(&self, parsed: &ParsedArtifact, base_dir: &Path) -> SyncOutcome {
        if !parsed.needs_download {
            info!(artifact_id = %parsed.id, name = %parsed.name, "already downloaded");
            self.emit(Event::AlreadyDownloaded {
                id: parsed.id.clone(),
            });
            return SyncOutcome::AlreadyDownloaded;
        }

        if parsed.details.files.is_empty() {
            return self.report_failure(parsed, "remote lists no files".to_string());
        }

        info!(artifact_id = %parsed.id, name = %parsed.name, "downloading");

        let reuse = match self.prepare_reuse(parsed, base_dir).await {
            Ok(reuse) => reuse,
            Err(e) => return self.report_failure(parsed, e.to_string()),
        };

        let written = self.write_snapshot(parsed, reuse.dir.as_deref()).await;

        if let Some(staging) = &reuse.staging
            && let Err(e) = tokio::fs::remove_dir_all(staging).await
        {
            warn!(?staging, error = %e, "could not remove reuse staging directory");
        }

        match written {
            Ok(watermark) => self.finish(parsed, base_dir, watermark).await,
            Err(e) => {
                if parsed.snapshot_dir.exists()
                    && let Err(qe) = self.store.quarantine_failed(&parsed.snapshot_dir)
                {
                    error!(
                        artifact_id = %parsed.id,
                        error = %qe,
                        "could not quarantine failed snapshot"
                    );
                }
                self.report_failure(parsed, e.to_string())
            }
        }
    }

    /// Move the current directory aside and pick the reuse source
    async fn prepare_reuse(&self, parsed: &ParsedArtifact, base_dir: &Path) -> Result<ReuseSource> {
        let rotated = self.store.rotate(&parsed.snapshot_dir)?;

        let source = match parsed.previous.as_ref().map(|p| &p.location) {
            Some(SnapshotLocation::Archive(archive_path)) => {
                self.extract_for_reuse(archive_path, base_dir).await
            }
            Some(SnapshotLocation::Directory(_)) => ReuseSource {
                dir: rotated,
                staging: None,
            },
            None => ReuseSource::default(),
        };
        Ok(source)
    }

    /// Unpack a prior archive into a scratch directory
    ///
    /// Extraction problems leave `dir` empty so every file is fetched again.
    async fn extract_for_reuse(&self, archive_path: &Path, base_dir: &Path) -> ReuseSource {
        let Some(stem) = archive_path.file_stem().map(|s| s.to_os_string()) else {
            return ReuseSource::default();
        };
        let mut staging_name = stem.clone();
        staging_name.push(".reuse");
        let staging = match unique_target(&base_dir.join(staging_name)) {
            Ok(path) => path,
            Err(e) => {
                warn!(?archive_path, error = %e, "no room for reuse staging directory");
                return ReuseSource::default();
            }
        };

        let source = archive_path.to_path_buf();
        let dest = staging.clone();
        let extracted =
            tokio::task::spawn_blocking(move || archive::extract_snapshot(&source, &dest)).await;

        match extracted {
            Ok(Ok(count)) => {
                debug!(?archive_path, count, "extracted previous snapshot for reuse");
                ReuseSource {
                    dir: Some(staging.join(stem)),
                    staging: Some(staging),
                }
            }
            Ok(Err(e)) => {
                warn!(?archive_path, error = %e, "could not extract previous snapshot, fetching all files");
                ReuseSource {
                    dir: None,
                    staging: Some(staging),
                }
            }
            Err(e) => {
                warn!(?archive_path, error = %e, "extraction task failed, fetching all files");
                ReuseSource {
                    dir: None,
                    staging: Some(staging),
                }
            }
        }
    }

    /// Write a complete snapshot into `parsed.snapshot_dir`
    ///
    /// The marker is written last; returns the recorded watermark.
    async fn write_snapshot(
        &self,
        parsed: &ParsedArtifact,
        reuse_dir: Option<&Path>,
    ) -> Result<Watermark> {
        let dir = &parsed.snapshot_dir;
        let files = &parsed.details.files;
        let previous = parsed.previous_watermark();

        tokio::fs::create_dir_all(dir).await?;
        let dests = self.store.plan_file_paths(dir, files)?;
        self.store
            .write_manifest(dir, files.iter().zip(dests.iter().map(PathBuf::as_path)))?;

        let cached = reuse_dir
            .map(|from| self.store.read_manifest(from))
            .unwrap_or_default();
        let mut to_fetch = Vec::new();
        let mut reused = 0usize;

        for (file, dest) in files.iter().zip(&dests) {
            let from = match reuse_dir {
                Some(from) if reconcile::is_unchanged(file, previous) => from,
                _ => {
                    to_fetch.push((file, dest));
                    continue;
                }
            };
            let cached_path = self.store.cached_file(from, &cached, file);
            match self.store.copy_cached(&cached_path, dest) {
                CopyOutcome::Copied => reused += 1,
                CopyOutcome::NotFound => {
                    debug!(artifact_id = %parsed.id, file = %file.name, "not in previous snapshot, fetching");
                    to_fetch.push((file, dest));
                }
                CopyOutcome::Failed(e) => return Err(Error::Io(e)),
            }
        }

        for (file, dest) in &to_fetch {
            let content = self.source.fetch_file(file).await?;
            tokio::fs::write(dest, content).await?;
        }

        let images_dir = dir.join(IMAGES_DIR);
        tokio::fs::create_dir_all(&images_dir).await?;
        for image in &parsed.details.images {
            let dest = self.store.file_path(&images_dir, &image.name)?;
            let content = self.source.fetch_image(image).await?;
            tokio::fs::write(&dest, content).await?;
        }

        if let Some(license) = &parsed.details.license {
            tokio::fs::write(dir.join(LICENSE_FILE), license).await?;
        }
        if let Some(description) = &parsed.details.description {
            tokio::fs::write(dir.join(README_FILE), description).await?;
        }

        let watermark = reconcile::next_watermark(files, previous).unwrap_or_else(Watermark::now);
        self.store.write_watermark(dir, &watermark)?;

        info!(
            artifact_id = %parsed.id,
            reused,
            fetched = to_fetch.len(),
            images = parsed.details.images.len(),
            %watermark,
            "snapshot written"
        );
        Ok(watermark)
    }

    async fn finish(
        &self,
        parsed: &ParsedArtifact,
        base_dir: &Path,
        watermark: Watermark,
    ) -> SyncOutcome {
        let mut path = parsed.snapshot_dir.clone();

        if self.compress {
            match self.archive_snapshot(parsed, base_dir, &watermark).await {
                Ok(archive_path) => path = archive_path,
                Err(e) => {
                    warn!(
                        artifact_id = %parsed.id,
                        error = %e,
                        "compression failed, keeping snapshot directory"
                    );
                }
            }
        }

        info!(artifact_id = %parsed.id, name = %parsed.name, ?path, "download complete");
        self.emit(Event::Downloaded {
            id: parsed.id.clone(),
            watermark,
            path,
        });
        SyncOutcome::Ok
    }

    /// Archive the finished snapshot and delete the loose directory
    async fn archive_snapshot(
        &self,
        parsed: &ParsedArtifact,
        base_dir: &Path,
        watermark: &Watermark,
    ) -> Result<PathBuf> {
        let root_name = SnapshotStore::archive_name(&parsed.id, &parsed.slug, watermark);
        let archive_path = base_dir.join(format!("{}.{}", root_name, ARCHIVE_EXTENSION));

        let dir = parsed.snapshot_dir.clone();
        let target = archive_path.clone();
        let compressed = tokio::task::spawn_blocking(move || {
            archive::compress_snapshot(&dir, &target, &root_name)
        })
        .await
        .map_err(|e| Error::Archive(format!("compression task failed: {}", e)))
        .and_then(|result| result);

        if let Err(e) = compressed {
            tokio::fs::remove_file(&archive_path).await.ok();
            return Err(e);
        }

        if let Err(e) = tokio::fs::remove_dir_all(&parsed.snapshot_dir).await {
            warn!(dir = ?parsed.snapshot_dir, error = %e, "could not remove compressed snapshot directory");
        }
        Ok(archive_path)
    }
}
