//! Assertions on mirrored snapshots

use std::path::Path;

/// Assert a snapshot directory is complete and carries `watermark`
pub fn assert_snapshot(dir: &Path, watermark: &str) {
    assert!(dir.is_dir(), "missing snapshot directory {:?}", dir);
    let marker = std::fs::read_to_string(dir.join("timestamp.txt"))
        .unwrap_or_else(|e| panic!("no marker in {:?}: {}", dir, e));
    assert_eq!(marker, watermark, "unexpected watermark in {:?}", dir);
    assert!(dir.join("filelist.txt").is_file());
}

/// Sorted names of the entries in `dir`
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("cannot list {:?}: {}", dir, e))
        .map(|entry| {
            entry
                .expect("readable entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}
