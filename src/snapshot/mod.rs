//! On-disk snapshots: naming, discovery, rotation and quarantine.
//!
//! Layout of one thing under the mirror root:
//!
//! ```text
//! <base>/<id> - <slug>/                      current snapshot
//!     filelist.txt                           address,name,timestamp,local name per file
//!     timestamp.txt                          watermark (completion marker)
//!     images/<name>
//!     license.txt, readme.txt                when the remote has them
//! <base>/<id> - <slug> - <watermark>/        superseded snapshot
//! <base>/<id> - <slug> - old[_N]/            superseded snapshot without marker
//! <base>/<id> - <slug>_failed[_N]/           quarantined failed download
//! <base>/<id> - <slug> - <watermark>.zip     compressed snapshot
//! ```
//!
//! The presence of `timestamp.txt` is the only signal that a snapshot is
//! complete.

pub mod archive;

use crate::error::Result;
use crate::types::{ArtifactId, FileDescriptor, Watermark};
use crate::utils::{
    safe_file_name, truncate_path, truncate_path_avoiding, unique_target, with_suffix,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Completion marker holding the snapshot watermark
pub const TIMESTAMP_FILE: &str = "timestamp.txt";
/// Audit manifest of the remote file set
pub const MANIFEST_FILE: &str = "filelist.txt";
/// Subdirectory holding images
pub const IMAGES_DIR: &str = "images";
/// License text
pub const LICENSE_FILE: &str = "license.txt";
/// Description text
pub const README_FILE: &str = "readme.txt";
/// Extension of compressed snapshots
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Where a prior snapshot lives
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotLocation {
    /// A live snapshot directory
    Directory(PathBuf),
    /// A compressed snapshot
    Archive(PathBuf),
}

/// The most recent prior snapshot of a thing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviousSnapshot {
    /// Where it lives
    pub location: SnapshotLocation,
    /// Its watermark; `None` for an interrupted or pre-marker directory
    pub watermark: Option<Watermark>,
}

/// Result of the one-time legacy directory upgrade
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// A title-only directory was moved to the given path
    Migrated(PathBuf),
    /// No legacy directory existed
    NotApplicable,
}

/// Result of reusing one file from a prior snapshot
#[derive(Debug)]
pub enum CopyOutcome {
    /// The file was copied
    Copied,
    /// The prior snapshot does not have the file
    NotFound,
    /// Copying failed for another reason
    Failed(std::io::Error),
}

/// Owns naming and versioning of snapshots under a mirror root
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    max_path_length: usize,
}

impl SnapshotStore {
    /// Create a store that caps constructed file paths at `max_path_length` bytes
    pub fn new(max_path_length: usize) -> Self {
        Self { max_path_length }
    }

    /// Directory name of a thing's current snapshot
    pub fn snapshot_name(id: &ArtifactId, slug: &str) -> String {
        format!("{} - {}", id, slug)
    }

    /// Full path of a thing's current snapshot
    pub fn snapshot_dir(base_dir: &Path, id: &ArtifactId, slug: &str) -> PathBuf {
        base_dir.join(Self::snapshot_name(id, slug))
    }

    /// Archive stem (and root folder inside the archive) for a snapshot
    pub fn archive_name(id: &ArtifactId, slug: &str, watermark: &Watermark) -> String {
        format!("{} - {} - {}", id, slug, watermark.to_safe_string())
    }

    /// Read a snapshot directory's watermark
    ///
    /// Returns `None` if the marker is missing or unreadable; an unreadable
    /// marker is logged.
    pub fn read_watermark(&self, dir: &Path) -> Option<Watermark> {
        let marker = dir.join(TIMESTAMP_FILE);
        let text = match std::fs::read_to_string(&marker) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(?marker, error = %e, "could not read timestamp marker");
                return None;
            }
        };
        let watermark = Watermark::parse_marker(&text);
        if watermark.is_none() {
            warn!(?marker, content = text.trim(), "invalid timestamp marker");
        }
        watermark
    }

    /// Find the most recent prior snapshot of a thing
    ///
    /// Considers the live snapshot directory and every archive named
    /// `<id> - ... - <watermark>.zip` in `base_dir`; the one with the newest
    /// watermark wins. A live directory without a usable marker is only
    /// returned when nothing with a watermark exists. Archives whose names do
    /// not carry a parsable watermark are logged and skipped.
    pub fn locate_latest(
        &self,
        id: &ArtifactId,
        slug: &str,
        base_dir: &Path,
    ) -> Option<PreviousSnapshot> {
        let snapshot_dir = Self::snapshot_dir(base_dir, id, slug);
        let mut latest: Option<PreviousSnapshot> = None;

        if snapshot_dir.is_dir() {
            let watermark = self.read_watermark(&snapshot_dir);
            debug!(?snapshot_dir, ?watermark, "found live snapshot directory");
            latest = Some(PreviousSnapshot {
                location: SnapshotLocation::Directory(snapshot_dir),
                watermark,
            });
        }

        for (path, watermark) in self.find_archives(id, base_dir) {
            let newer = match latest.as_ref().and_then(|p| p.watermark) {
                Some(current) => watermark > current,
                None => true,
            };
            if newer {
                latest = Some(PreviousSnapshot {
                    location: SnapshotLocation::Archive(path),
                    watermark: Some(watermark),
                });
            }
        }

        debug!(artifact_id = %id, ?latest, "located latest snapshot");
        latest
    }

    fn find_archives(&self, id: &ArtifactId, base_dir: &Path) -> Vec<(PathBuf, Watermark)> {
        let prefix = format!("{} - ", id);
        let suffix = format!(".{}", ARCHIVE_EXTENSION);

        let entries = match std::fs::read_dir(base_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(?base_dir, error = %e, "cannot scan for archives");
                return Vec::new();
            }
        };

        let mut archives = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.ends_with(&suffix) {
                continue;
            }
            let stem = &name[..name.len() - suffix.len()];
            let stamp = stem.rsplit(" - ").next().unwrap_or("");
            match Watermark::parse_safe(stamp) {
                Some(watermark) => archives.push((entry.path(), watermark)),
                None => warn!(archive = name, "no watermark in archive name, ignoring"),
            }
        }
        archives
    }

    /// Move a title-only directory from an older naming scheme to the current one
    ///
    /// Idempotent: once moved, later calls return
    /// [`MigrationOutcome::NotApplicable`].
    pub fn migrate_legacy(
        &self,
        legacy_dir: &Path,
        current_dir: &Path,
    ) -> Result<MigrationOutcome> {
        if legacy_dir == current_dir || !legacy_dir.is_dir() {
            return Ok(MigrationOutcome::NotApplicable);
        }
        warn!(?legacy_dir, ?current_dir, "found old style snapshot directory, moving");
        let moved = self.rename_unique(legacy_dir, current_dir)?;
        Ok(MigrationOutcome::Migrated(moved))
    }

    /// Move the current snapshot directory aside
    ///
    /// The new name carries the directory's own watermark, or `old` when it
    /// has no marker, plus a counter if that name is taken. Returns the new
    /// path, or `None` when there was no directory.
    pub fn rotate(&self, current_dir: &Path) -> Result<Option<PathBuf>> {
        if !current_dir.is_dir() {
            return Ok(None);
        }
        let tag = match self.read_watermark(current_dir) {
            Some(watermark) => watermark.to_safe_string(),
            None => "old".to_string(),
        };
        let desired = with_suffix(current_dir, &format!(" - {}", tag));
        let rotated = self.rename_unique(current_dir, &desired)?;
        info!(from = ?current_dir, to = ?rotated, "rotated previous snapshot");
        Ok(Some(rotated))
    }

    /// Rename `path` to `desired`, or to `desired_N` if that is taken
    pub fn rename_unique(&self, path: &Path, desired: &Path) -> Result<PathBuf> {
        let target = unique_target(desired)?;
        std::fs::rename(path, &target)?;
        Ok(target)
    }

    /// Move a failed download aside as `<dir>_failed[_N]` for inspection
    pub fn quarantine_failed(&self, dir: &Path) -> Result<PathBuf> {
        let desired = with_suffix(dir, "_failed");
        let quarantined = self.rename_unique(dir, &desired)?;
        warn!(?quarantined, "quarantined failed snapshot");
        Ok(quarantined)
    }

    /// Destination path for a remote file name inside `dir`
    ///
    /// The name is reduced to one safe component and the full path capped at
    /// the configured maximum length.
    pub fn file_path(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let path = dir.join(safe_file_name(name));
        Ok(truncate_path(&path, self.max_path_length)?)
    }

    /// Destination paths for every member of `files` inside `dir`
    ///
    /// Like [`file_path`](Self::file_path), but names handed out earlier in
    /// the same plan count as taken, so two long names never shorten to the
    /// same file.
    pub fn plan_file_paths<'a, I>(&self, dir: &Path, files: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = &'a FileDescriptor>,
    {
        let mut planned: Vec<PathBuf> = Vec::new();
        for file in files {
            let path = dir.join(safe_file_name(&file.name));
            let dest = truncate_path_avoiding(&path, self.max_path_length, |candidate| {
                candidate.exists() || planned.iter().any(|p| p == candidate)
            })?;
            planned.push(dest);
        }
        Ok(planned)
    }

    /// Write `filelist.txt` for the complete remote file set
    ///
    /// Each line holds the fetch address, the remote name, the timestamp and
    /// the local file name the content is stored under.
    pub fn write_manifest<'a, I>(&self, dir: &Path, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a FileDescriptor, &'a Path)>,
    {
        let mut manifest = std::fs::File::create(dir.join(MANIFEST_FILE))?;
        for (file, dest) in entries {
            let stamp = file
                .last_modified
                .map(|ts| ts.to_marker_string())
                .unwrap_or_default();
            let local = dest
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            writeln!(
                manifest,
                "{},{},{},{}",
                file.fetch_address, file.name, stamp, local
            )?;
        }
        Ok(())
    }

    /// Read the manifest of a prior snapshot
    ///
    /// A missing or unreadable manifest yields an empty index.
    pub fn read_manifest(&self, dir: &Path) -> ManifestIndex {
        let path = dir.join(MANIFEST_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => ManifestIndex {
                lines: text.lines().map(str::to_string).collect(),
            },
            Err(e) => {
                debug!(manifest = ?path, error = %e, "no manifest in previous snapshot");
                ManifestIndex::default()
            }
        }
    }

    /// Where a prior snapshot in `from_dir` keeps the content of `file`
    ///
    /// Uses the local name recorded in `index`; snapshots whose manifest has
    /// no local names stored files under their remote name.
    pub fn cached_file(
        &self,
        from_dir: &Path,
        index: &ManifestIndex,
        file: &FileDescriptor,
    ) -> PathBuf {
        let name = index.local_name(&file.name).unwrap_or(&file.name);
        from_dir.join(safe_file_name(name))
    }

    /// Write the completion marker
    pub fn write_watermark(&self, dir: &Path, watermark: &Watermark) -> Result<()> {
        std::fs::write(dir.join(TIMESTAMP_FILE), watermark.to_marker_string())?;
        Ok(())
    }

    /// Copy one file from a prior snapshot
    ///
    /// Any problem with `from` is a cache miss; only errors writing `to`
    /// are reported as [`CopyOutcome::Failed`].
    pub fn copy_cached(&self, from: &Path, to: &Path) -> CopyOutcome {
        let mut source = match std::fs::File::open(from) {
            Ok(file) if from.is_file() => file,
            Ok(_) => return CopyOutcome::NotFound,
            Err(e) => {
                debug!(?from, error = %e, "cached file unavailable");
                return CopyOutcome::NotFound;
            }
        };
        let copied =
            std::fs::File::create(to).and_then(|mut dest| std::io::copy(&mut source, &mut dest));
        match copied {
            Ok(_) => CopyOutcome::Copied,
            Err(e) => CopyOutcome::Failed(e),
        }
    }
}

/// Local file names recorded in a snapshot's `filelist.txt`
#[derive(Clone, Debug, Default)]
pub struct ManifestIndex {
    lines: Vec<String>,
}

impl ManifestIndex {
    /// Local name stored for the remote file `name`
    ///
    /// `None` when the manifest does not list the file or predates local
    /// names.
    pub fn local_name(&self, name: &str) -> Option<&str> {
        let prefix = format!("{},", name);
        self.lines.iter().find_map(|line| {
            let (_address, rest) = line.split_once(',')?;
            let (_stamp, local) = rest.strip_prefix(&prefix)?.split_once(',')?;
            (!local.is_empty()).then_some(local)
        })
    }
}
