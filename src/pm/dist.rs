//! Dist packing: file selection and `.tar.gz` archives
//!
//! File selection starts from everything under the package root, drops the
//! default and manifest excludes, and lets `include_files` patterns rescue
//! anything back in. Archives list entries in sorted order so identical
//! inputs produce identical file sets.

use crate::context::MODULES_DIR;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Always excluded from dist archives, before manifest excludes apply.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".svn/*",
    ".git",
    ".git/*",
    ".DS_Store",
    "*.pyc",
    "*.pyo",
    "dist/*",
    "nodus_modules/",
];

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        // A trailing slash means "the whole directory".
        let normalized = match pattern.strip_suffix('/') {
            Some(prefix) => format!("{}/**", prefix),
            None => pattern.clone(),
        };
        let glob = Glob::new(&normalized).map_err(|e| Error::InvalidManifest {
            origin: None,
            reason: format!("bad dist pattern '{}': {}", pattern, e),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| Error::InvalidManifest {
        origin: None,
        reason: format!("bad dist patterns: {}", e),
    })
}

/// The files a dist archive of `root` would contain, as sorted
/// root-relative paths. Include patterns override excludes.
pub fn collect_files(root: &Path, manifest: &Manifest) -> Result<Vec<PathBuf>> {
    let dist = manifest.dist.clone().unwrap_or_default();
    let includes = build_globset(&dist.include_files)?;
    let mut exclude_patterns: Vec<String> =
        DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    exclude_patterns.extend(dist.exclude_files.iter().cloned());
    let excludes = build_globset(&exclude_patterns)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir yields children of root")
            .to_path_buf();
        if includes.is_match(&rel) || !excludes.is_match(&rel) {
            files.push(rel);
        }
    }
    files.sort();
    Ok(files)
}

/// Pack the package into `dist/<name>-<version>.tar.gz` under `root` and
/// return the archive path.
pub fn pack(root: &Path, manifest: &Manifest) -> Result<PathBuf> {
    let files = collect_files(root, manifest)?;
    let dist_dir = root.join("dist");
    fs::create_dir_all(&dist_dir)?;
    let archive_path = dist_dir.join(format!("{}-{}.tar.gz", manifest.name, manifest.version));

    let file = fs::File::create(&archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for rel in &files {
        builder.append_path_with_name(root.join(rel), rel)?;
    }
    builder.into_inner().and_then(|enc| enc.finish())?;

    tracing::info!(archive = %archive_path.display(), files = files.len(), "dist packed");
    Ok(archive_path)
}

/// Unpack a dist archive into `dest`, refusing entries that escape it.
pub fn unpack(bytes: &[u8], dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
    for entry in archive.entries()? {
        let mut entry = entry?;
        entry.unpack_in(dest)?;
    }
    Ok(())
}

/// Subresource-integrity digest of an archive.
pub fn integrity(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("sha256-{:x}", digest)
}
