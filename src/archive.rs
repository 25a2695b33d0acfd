//! Zip extraction for downloaded schedule bundles.

use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;
use zip::ZipArchive;

/// Unpacks a zip payload into `dest`, creating the directory if needed and
/// overwriting files that already exist. Entries with names that escape the
/// destination are skipped.
pub fn extract_zip(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).context("downloaded bundle is not a valid zip")?;

    fs::create_dir_all(dest)
        .with_context(|| format!("failed to create snapshot directory {}", dest.display()))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name().map(|name| name.to_owned()) else {
            warn!(entry = %entry.name(), "Skipping zip entry with unsafe path");
            continue;
        };

        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&target)
            .with_context(|| format!("failed to create {}", target.display()))?;
        io::copy(&mut entry, &mut file)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn extracts_all_entries() {
        let bytes = zip_with(&[
            ("stops.txt", "stop_id,stop_name\n1,Main St\n"),
            ("agency.txt", "agency_name,agency_timezone\nOC,America/Toronto\n"),
        ]);

        let dest = tempfile::tempdir().unwrap();
        extract_zip(&bytes, dest.path()).unwrap();

        let stops = fs::read_to_string(dest.path().join("stops.txt")).unwrap();
        assert!(stops.contains("Main St"));
        assert!(dest.path().join("agency.txt").exists());
    }

    #[test]
    fn overwrites_existing_files() {
        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("stops.txt"), "old").unwrap();

        let bytes = zip_with(&[("stops.txt", "new")]);
        extract_zip(&bytes, dest.path()).unwrap();

        assert_eq!(fs::read_to_string(dest.path().join("stops.txt")).unwrap(), "new");
    }

    #[test]
    fn rejects_non_zip_payloads() {
        let dest = tempfile::tempdir().unwrap();
        assert!(extract_zip(b"definitely not a zip", dest.path()).is_err());
    }
}
