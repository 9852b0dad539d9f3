//! Utility functions for names, paths and log redaction

use crate::error::SnapshotError;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Maximum number of suffixes tried when looking for a free name
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Characters that are not allowed in file names on at least one supported platform
const ILLEGAL_NAME_CHARS: &[char] = &['\\', '/', '<', '>', ':', '?', '*', '|', '"'];

static ACCESS_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"access_token=\w*").expect("static regex is valid")
});

/// Normalise a free-text title into a file-name fragment
///
/// NFKC-normalises, lower-cases and trims the title, removes characters that
/// are illegal in paths and strips trailing dots. The result is stable: the
/// same title always yields the same slug, which is what lets later runs find
/// earlier snapshots.
///
/// # Examples
///
/// ```
/// use thingmirror::utils::slugify;
///
/// assert_eq!(slugify("  Gear: Box?  "), "gear box");
/// assert_eq!(slugify("Model v2..."), "model v2");
/// ```
#[must_use]
pub fn slugify(value: &str) -> String {
    let normalized: String = value.nfkc().collect::<String>().to_lowercase();
    let cleaned: String = normalized
        .trim()
        .chars()
        .filter(|c| !ILLEGAL_NAME_CHARS.contains(c))
        .collect();
    cleaned.trim_end_matches('.').to_string()
}

/// Replace the value of any `access_token` query parameter with `***`
///
/// Every address that reaches a log line goes through this first.
#[must_use]
pub fn sanitise_address(address: &str) -> String {
    ACCESS_TOKEN_RE
        .replace_all(address, "access_token=***")
        .into_owned()
}

/// Reduce a remote file name to a single safe path component
///
/// Directory separators and parent references are dropped so the name
/// cannot point outside the snapshot directory.
#[must_use]
pub fn safe_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
        .unwrap_or("");
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    if cleaned.trim().is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Append `suffix` to the final component of `path`
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// Find a name derived from `desired` that does not exist yet
///
/// Returns `desired` itself when it is free, otherwise `desired_0`,
/// `desired_1`, ... until an unused name is found.
pub fn unique_target(desired: &Path) -> Result<PathBuf, SnapshotError> {
    if !desired.exists() {
        return Ok(desired.to_path_buf());
    }

    for i in 0..MAX_RENAME_ATTEMPTS {
        let candidate = with_suffix(desired, &format!("_{}", i));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(SnapshotError::RenameExhausted {
        path: desired.to_path_buf(),
        attempts: MAX_RENAME_ATTEMPTS,
    })
}

/// Cap the length of a file path
///
/// Paths whose absolute form is at most `max_len` bytes are returned
/// unchanged. Longer paths keep their directory and extension; the file stem
/// is shortened and given a `_N` suffix, with `N` chosen so the result does
/// not collide with an existing file.
pub fn truncate_path(path: &Path, max_len: usize) -> Result<PathBuf, SnapshotError> {
    truncate_path_avoiding(path, max_len, |candidate| candidate.exists())
}

/// [`truncate_path`] with a caller-supplied notion of which names are taken
pub fn truncate_path_avoiding<F>(
    path: &Path,
    max_len: usize,
    is_taken: F,
) -> Result<PathBuf, SnapshotError>
where
    F: Fn(&Path) -> bool,
{
    let measured = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let len = measured.as_os_str().len();
    if len <= max_len {
        return Ok(path.to_path_buf());
    }

    let invalid = |reason: &str| SnapshotError::InvalidPath {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let parent = path.parent().ok_or_else(|| invalid("no parent directory"))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid("file stem is not valid UTF-8"))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let excess = len - max_len;
    let stem_chars = stem.chars().count();

    for i in 0..MAX_RENAME_ATTEMPTS {
        let suffix = format!("_{}", i);
        // Every char is at least one byte, so dropping `excess + suffix` chars
        // removes at least that many bytes.
        let keep = stem_chars.saturating_sub(excess + suffix.len()).max(1);
        let short_stem: String = stem.chars().take(keep).collect();
        let candidate = parent.join(format!("{}{}{}", short_stem, suffix, extension));
        if !is_taken(&candidate) {
            return Ok(candidate);
        }
    }

    Err(SnapshotError::RenameExhausted {
        path: path.to_path_buf(),
        attempts: MAX_RENAME_ATTEMPTS,
    })
}
