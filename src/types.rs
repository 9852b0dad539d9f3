//! Core types for thingmirror

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque identifier of a thing on the remote source
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    /// Create a new ArtifactId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ArtifactId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ArtifactId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A thing as listed by a grouping (collection, designs, likes)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    /// Thing ID
    pub id: ArtifactId,
    /// Name shown in the listing
    pub display_name: String,
    /// Address of the thing's detail record
    pub detail_address: String,
}

/// What a worker or traversal asks the engine to sync
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactRequest {
    /// A bare ID; the name comes from the detail lookup
    Id(ArtifactId),
    /// A reference already resolved by a grouping listing
    Reference(ArtifactReference),
}

impl ArtifactRequest {
    /// The thing ID this request is for
    pub fn id(&self) -> &ArtifactId {
        match self {
            ArtifactRequest::Id(id) => id,
            ArtifactRequest::Reference(reference) => &reference.id,
        }
    }

    /// Listing name, when the request came from a grouping
    pub fn display_name(&self) -> Option<&str> {
        match self {
            ArtifactRequest::Id(_) => None,
            ArtifactRequest::Reference(reference) => Some(&reference.display_name),
        }
    }
}

impl From<ArtifactId> for ArtifactRequest {
    fn from(id: ArtifactId) -> Self {
        ArtifactRequest::Id(id)
    }
}

impl From<ArtifactReference> for ArtifactRequest {
    fn from(reference: ArtifactReference) -> Self {
        ArtifactRequest::Reference(reference)
    }
}

/// Point in time used to detect remote changes
///
/// A watermark is the newest last-modified time across a snapshot's files.
/// Markers written before second-level timestamps were recorded hold only a
/// date; such watermarks remember that (see [`Watermark::is_date_only`]) so a
/// full marker that happens to fall on midnight is not mistaken for one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Watermark {
    at: NaiveDateTime,
    date_only: bool,
}

impl Watermark {
    /// Format of `timestamp.txt`, `filelist.txt` and remote file dates
    pub const MARKER_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    /// Filesystem-safe format used in rotated directory and archive names
    pub const SAFE_FORMAT: &'static str = "%Y-%m-%d %H.%M.%S";

    const DATE_FORMAT: &'static str = "%Y-%m-%d";

    /// Wrap a date-time
    pub fn new(at: NaiveDateTime) -> Self {
        Self {
            at,
            date_only: false,
        }
    }

    /// The current local time, to whole seconds
    pub fn now() -> Self {
        Self::new(Local::now().naive_local().trunc_subsecs(0))
    }

    /// Parse a marker or remote timestamp
    ///
    /// Accepts the full `YYYY-MM-DD HH:MM:SS` form and the legacy date-only
    /// `YYYY-MM-DD` form (read as midnight, flagged date-only).
    pub fn parse_marker(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(at) = NaiveDateTime::parse_from_str(text, Self::MARKER_FORMAT) {
            return Some(Self::new(at));
        }
        NaiveDate::parse_from_str(text, Self::DATE_FORMAT)
            .ok()
            .map(|date| Self {
                at: date.and_time(NaiveTime::default()),
                date_only: true,
            })
    }

    /// Parse the filesystem-safe form found in archive names
    pub fn parse_safe(text: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(text.trim(), Self::SAFE_FORMAT)
            .ok()
            .map(Self::new)
    }

    /// Marker representation; date-only watermarks keep their short form
    pub fn to_marker_string(&self) -> String {
        let format = if self.date_only {
            Self::DATE_FORMAT
        } else {
            Self::MARKER_FORMAT
        };
        self.at.format(format).to_string()
    }

    /// Filesystem-safe representation
    pub fn to_safe_string(&self) -> String {
        self.at.format(Self::SAFE_FORMAT).to_string()
    }

    /// True for watermarks read from a legacy date-only marker
    pub fn is_date_only(&self) -> bool {
        self.date_only
    }

    /// The wrapped date-time
    pub fn as_datetime(&self) -> NaiveDateTime {
        self.at
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_marker_string())
    }
}

impl From<Watermark> for String {
    fn from(watermark: Watermark) -> Self {
        watermark.to_marker_string()
    }
}

impl TryFrom<String> for Watermark {
    type Error = String;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse_marker(&text).ok_or_else(|| format!("invalid watermark '{}'", text))
    }
}

/// One downloadable file of a thing, as currently known to the remote
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// File name
    pub name: String,
    /// Remote last-modified time; `None` when the remote date was unreadable
    pub last_modified: Option<Watermark>,
    /// Address the content is fetched from
    pub fetch_address: String,
}

/// Ordered set of file descriptors with a running maximum timestamp
///
/// `max_last_modified` is updated on every push so it can never go stale.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileDescriptorSet {
    files: Vec<FileDescriptor>,
    max_last_modified: Option<Watermark>,
}

impl FileDescriptorSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor, folding its timestamp into the maximum
    pub fn push(&mut self, file: FileDescriptor) {
        if let Some(ts) = file.last_modified {
            self.max_last_modified = Some(match self.max_last_modified {
                Some(current) => current.max(ts),
                None => ts,
            });
        }
        self.files.push(file);
    }

    /// Newest timestamp across all members, `None` if unknown
    pub fn max_last_modified(&self) -> Option<Watermark> {
        self.max_last_modified
    }

    /// Iterate members in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, FileDescriptor> {
        self.files.iter()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when the set has no members
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<FileDescriptor> for FileDescriptorSet {
    fn from_iter<I: IntoIterator<Item = FileDescriptor>>(iter: I) -> Self {
        let mut set = Self::new();
        for file in iter {
            set.push(file);
        }
        set
    }
}

impl<'a> IntoIterator for &'a FileDescriptorSet {
    type Item = &'a FileDescriptor;
    type IntoIter = std::slice::Iter<'a, FileDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// One image of a thing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// File name (already slugified)
    pub name: String,
    /// Address the image is fetched from
    pub fetch_address: String,
}

/// Everything the detail lookup knows about a thing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArtifactDetails {
    /// Title; `None` if the remote record had no name
    pub title: Option<String>,
    /// License text
    pub license: Option<String>,
    /// Description text
    pub description: Option<String>,
    /// Downloadable files
    pub files: FileDescriptorSet,
    /// Images
    pub images: Vec<ImageDescriptor>,
}

/// Terminal result of syncing one thing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// A new snapshot was written
    Ok,
    /// The local snapshot is current; nothing was written
    AlreadyDownloaded,
    /// The thing could not be synced; any partial snapshot was quarantined
    Failed,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncOutcome::Ok => "ok",
            SyncOutcome::AlreadyDownloaded => "already downloaded",
            SyncOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Events emitted by the mirror
///
/// Subscribe via [`Mirror::subscribe`](crate::Mirror::subscribe).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A thing was pushed onto the worker queue
    Queued {
        /// Thing ID
        id: ArtifactId,
    },

    /// Details were fetched and the update decision made
    Parsed {
        /// Thing ID
        id: ArtifactId,
        /// Thing title
        name: String,
        /// Whether a new snapshot will be written
        needs_download: bool,
    },

    /// The local snapshot was already current
    AlreadyDownloaded {
        /// Thing ID
        id: ArtifactId,
    },

    /// A new snapshot was written
    Downloaded {
        /// Thing ID
        id: ArtifactId,
        /// Watermark recorded for the new snapshot
        watermark: Watermark,
        /// Where the snapshot ended up (directory or archive)
        path: PathBuf,
    },

    /// The thing failed
    Failed {
        /// Thing ID
        id: ArtifactId,
        /// Error message
        error: String,
    },

    /// A grouping traversal started
    GroupingStarted {
        /// Grouping label
        name: String,
        /// Number of things listed
        total: usize,
    },

    /// A grouping traversal finished
    GroupingFinished {
        /// Grouping label
        name: String,
        /// Whether quick mode stopped the traversal early
        stopped_early: bool,
    },
}
