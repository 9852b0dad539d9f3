//! ZIP archives of finished snapshots

use crate::error::{Error, Result};
use std::fs::File;
use std::path::{Component, Path};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Archive a snapshot directory into `archive_path`
///
/// Every entry is stored under a single root folder named `root_name`, so
/// extracting the archive recreates the snapshot directory by that name.
pub fn compress_snapshot(dir: &Path, archive_path: &Path, root_name: &str) -> Result<()> {
    debug!(?dir, ?archive_path, "compressing snapshot");

    let file = File::create(archive_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut file_count = 0usize;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(dir).map_err(|e| {
            Error::Archive(format!(
                "entry {} is outside {}: {}",
                entry.path().display(),
                dir.display(),
                e
            ))
        })?;
        let name = entry_name(root_name, relative);

        if entry.file_type().is_dir() {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
            let mut source = File::open(entry.path())?;
            std::io::copy(&mut source, &mut writer)?;
            file_count += 1;
        }
    }

    writer.finish()?;
    info!(?archive_path, file_count, "snapshot compressed");
    Ok(())
}

/// Extract an archive produced by [`compress_snapshot`] into `dest`
///
/// Entries whose names would escape `dest` are skipped.
pub fn extract_snapshot(archive_path: &Path, dest: &Path) -> Result<usize> {
    debug!(?archive_path, ?dest, "extracting snapshot archive");

    std::fs::create_dir_all(dest)?;
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut extracted = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let out_path = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => {
                warn!(entry = entry.name(), "skipping archive entry with unsafe path");
                continue;
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut outfile)?;
        extracted += 1;
    }

    debug!(?archive_path, extracted, "snapshot archive extracted");
    Ok(extracted)
}

fn entry_name(root_name: &str, relative: &Path) -> String {
    let mut parts = vec![root_name.to_string()];
    parts.extend(relative.components().filter_map(|c| match c {
        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
        _ => None,
    }));
    parts.join("/")
}
