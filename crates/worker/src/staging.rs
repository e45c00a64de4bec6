// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scratch-space handling for downloaded agent sources.
//!
//! Tarballs from the backend are extracted into short-lived temp
//! directories; nothing here persists past the command that needed it.
//! The archive work is synchronous, so it runs on the blocking pool.

use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

/// Extract a gzipped tarball into `dest`.
pub async fn extract_tarball(bytes: Vec<u8>, dest: &Path) -> std::io::Result<()> {
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let decoder = GzDecoder::new(std::io::Cursor::new(bytes));
        let mut archive = Archive::new(decoder);
        archive.unpack(&dest)
    })
    .await
    .map_err(|e| std::io::Error::other(format!("extraction task failed: {e}")))?
}

/// Collect every file under `root` as `(relative_path, contents)` pairs.
///
/// Paths use `/` separators regardless of platform so downstream key
/// encoding is stable.
pub async fn collect_files(root: &Path) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        collect_into(&root, &root, &mut files)?;
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    })
    .await
    .map_err(|e| std::io::Error::other(format!("collection task failed: {e}")))?
}

fn collect_into(
    root: &PathBuf,
    dir: &Path,
    files: &mut Vec<(String, Vec<u8>)>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_into(root, &path, files)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .map_err(|e| std::io::Error::other(e.to_string()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((rel, std::fs::read(&path)?));
        }
    }
    Ok(())
}

/// Build a gzipped tarball from `(relative_path, contents)` pairs.
///
/// The inverse of [`extract_tarball`]; used by tests to fabricate backend
/// downloads without a live backend.
#[cfg(any(test, feature = "test-support"))]
pub fn make_tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        #[allow(clippy::unwrap_used)]
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    #[allow(clippy::unwrap_used)]
    builder.into_inner().and_then(|gz| gz.finish()).unwrap()
}

#[cfg(test)]
#[path = "staging_tests.rs"]
mod tests;
