//! The package-manager core: installer, registry surface, dist packer,
//! lifecycle hooks, shims and the INI config.

pub mod config;
pub mod dist;
pub mod hooks;
pub mod installer;
pub mod registry;
pub mod shims;

use crate::error::Result;
use std::fs;
use std::path::Path;

/// Write `contents` only when the file differs, so repeated installs leave
/// mtimes of unchanged files alone.
pub(crate) fn write_file_if_changed(path: &Path, contents: &[u8]) -> Result<bool> {
    if let Ok(existing) = fs::read(path) {
        if existing == contents {
            return Ok(false);
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_file_if_changed_skips_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/f.txt");
        assert!(write_file_if_changed(&path, b"one").unwrap());
        let mtime = fs::metadata(&path).unwrap().modified().unwrap();
        assert!(!write_file_if_changed(&path, b"one").unwrap());
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), mtime);
        assert!(write_file_if_changed(&path, b"two").unwrap());
    }
}
