//! Update decision and old/new file partitioning.

use crate::types::{FileDescriptor, FileDescriptorSet, Watermark};

/// Whether `remote` is strictly newer than a local watermark
///
/// Legacy watermarks carry no time of day, so against those the remote
/// time is compared by date only.
pub(crate) fn is_newer(remote: Watermark, local: Watermark) -> bool {
    if local.is_date_only() {
        remote.as_datetime().date() > local.as_datetime().date()
    } else {
        remote.as_datetime() > local.as_datetime()
    }
}

/// Decide whether the remote file set warrants a new snapshot
///
/// `local` is the watermark of the latest prior snapshot, or `None` when
/// there is no snapshot or it has no usable marker.
pub(crate) fn needs_download(files: &FileDescriptorSet, local: Option<Watermark>) -> bool {
    let Some(local) = local else {
        return true;
    };
    match files.max_last_modified() {
        Some(remote) => is_newer(remote, local),
        // Only undated files: nothing to compare against
        None => !files.is_empty(),
    }
}

/// Watermark to record for a finished snapshot
///
/// Never older than the previous watermark.
pub(crate) fn next_watermark(
    files: &FileDescriptorSet,
    previous: Option<Watermark>,
) -> Option<Watermark> {
    match (files.max_last_modified(), previous) {
        (Some(remote), Some(prev)) => Some(remote.max(prev)),
        (remote, prev) => remote.or(prev),
    }
}

/// Whether `file` is unchanged since the previous snapshot
///
/// Without a previous watermark nothing is unchanged. Files whose remote
/// date is unknown always count as changed.
pub(crate) fn is_unchanged(file: &FileDescriptor, previous: Option<Watermark>) -> bool {
    match (file.last_modified, previous) {
        (Some(ts), Some(prev)) => !is_newer(ts, prev),
        _ => false,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn wm(text: &str) -> Watermark {
        Watermark::parse_marker(text).unwrap()
    }

    fn set(entries: &[(&str, Option<&str>)]) -> FileDescriptorSet {
        entries
            .iter()
            .map(|(name, at)| FileDescriptor {
                name: name.to_string(),
                last_modified: at.map(wm),
                fetch_address: format!("https://files.example.com/{}", name),
            })
            .collect()
    }

    fn names(files: &[&FileDescriptor]) -> Vec<String> {
        files.iter().map(|f| f.name.clone()).collect()
    }

    #[test]
    fn test_needs_download_without_local_watermark() {
        let files = set(&[("a.stl", Some("2020-01-01 00:00:00"))]);
        assert!(needs_download(&files, None));
    }

    #[test]
    fn test_needs_download_compares_max() {
        let files = set(&[
            ("a.stl", Some("2020-01-01 00:00:00")),
            ("b.stl", Some("2020-06-01 12:00:00")),
        ]);
        assert!(!needs_download(&files, Some(wm("2020-06-01 12:00:00"))));
        assert!(needs_download(&files, Some(wm("2020-06-01 11:59:59"))));
    }

    #[test]
    fn test_legacy_watermark_compares_by_date() {
        let files = set(&[("a.stl", Some("2020-06-01 12:00:00"))]);
        // Same day as a date-only marker is not an update
        assert!(!needs_download(&files, Some(wm("2020-06-01"))));
        assert!(needs_download(&files, Some(wm("2020-05-31"))));
    }

    #[test]
    fn test_full_watermark_at_midnight_compares_by_time() {
        let files = set(&[("a.stl", Some("2020-06-01 12:00:00"))]);
        assert!(needs_download(&files, Some(wm("2020-06-01 00:00:00"))));
    }

    #[test]
    fn test_empty_set_with_watermark_is_current() {
        let files = FileDescriptorSet::new();
        assert!(!needs_download(&files, Some(wm("2020-01-01 00:00:00"))));
    }

    #[test]
    fn test_undated_files_always_need_download() {
        let files = set(&[("a.stl", None)]);
        assert!(needs_download(&files, Some(wm("2020-01-01 00:00:00"))));
    }

    #[test]
    fn test_next_watermark_never_goes_back() {
        let files = set(&[("a.stl", Some("2019-01-01 00:00:00"))]);
        assert_eq!(
            next_watermark(&files, Some(wm("2020-01-01 00:00:00"))),
            Some(wm("2020-01-01 00:00:00"))
        );
        assert_eq!(
            next_watermark(&files, None),
            Some(wm("2019-01-01 00:00:00"))
        );
        assert_eq!(next_watermark(&set(&[("a.stl", None)]), None), None);
    }

    #[test]
    fn test_unchanged_splits_on_previous_watermark() {
        let files = set(&[
            ("a.stl", Some("2020-01-01 00:00:00")),
            ("b.stl", Some("2020-02-01 00:00:00")),
            ("c.stl", Some("2020-03-01 00:00:00")),
            ("d.stl", None),
        ]);
        let previous = Some(wm("2020-02-01 00:00:00"));

        let unchanged: Vec<&FileDescriptor> =
            files.iter().filter(|f| is_unchanged(f, previous)).collect();

        assert_eq!(names(&unchanged), vec!["a.stl", "b.stl"]);
    }

    #[test]
    fn test_nothing_unchanged_without_previous() {
        let files = set(&[
            ("a.stl", Some("2020-01-01 00:00:00")),
            ("b.stl", Some("2020-02-01 00:00:00")),
        ]);
        assert!(files.iter().all(|f| !is_unchanged(f, None)));
    }
}
