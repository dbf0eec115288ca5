//! Binary shims under `<modules-dir>/.bin/`
//!
//! Each manifest `bin` entry becomes a small launcher that re-enters the
//! runtime with a fixed request. Shims written by the host-language
//! installer get wrapped with a proxy that prepends the right search path.

use crate::error::Result;
use crate::pm::write_file_if_changed;
use std::path::{Path, PathBuf};

/// The request a shim re-invokes: `<package>/<bin-request>` so resolution
/// goes through the modules directory (and through `.nodepy-link` files for
/// develop installs).
fn shim_request(package: &str, request: &str) -> String {
    let trimmed = request.trim_start_matches("./");
    format!("{}/{}", package, trimmed)
}

fn shim_contents(request: &str) -> String {
    if cfg!(windows) {
        format!("@echo off\r\nnodus \"{}\" %*\r\n", request)
    } else {
        format!("#!/bin/sh\nexec nodus \"{}\" \"$@\"\n", request)
    }
}

fn shim_path(bin_dir: &Path, name: &str) -> PathBuf {
    if cfg!(windows) {
        bin_dir.join(format!("{}.cmd", name))
    } else {
        bin_dir.join(name)
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Write launchers for every `bin` entry; returns the shim paths.
pub fn write_shims(
    bin: &indexmap::IndexMap<String, String>,
    package: &str,
    bin_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (name, request) in bin {
        let path = shim_path(bin_dir, name);
        let contents = shim_contents(&shim_request(package, request));
        write_file_if_changed(&path, contents.as_bytes())?;
        mark_executable(&path)?;
        tracing::debug!(shim = %path.display(), "shim written");
        written.push(path);
    }
    Ok(written)
}

/// Remove the shims a package's `bin` table created.
pub fn remove_shims(
    bin: &indexmap::IndexMap<String, String>,
    bin_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for name in bin.keys() {
        let path = shim_path(bin_dir, name);
        if path.is_file() {
            std::fs::remove_file(&path)?;
            removed.push(path);
        }
    }
    Ok(removed)
}

/// Wrap executables the host installer dropped under its own `bin/` with
/// proxies that put the host target directory on the module search path.
pub fn wrap_host_shims(host_bin: &Path, bin_dir: &Path, host_target: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if !host_bin.is_dir() {
        return Ok(written);
    }
    for entry in std::fs::read_dir(host_bin)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let original = entry.path();
        let contents = if cfg!(windows) {
            format!(
                "@echo off\r\nset PYTHONPATH={};%PYTHONPATH%\r\n\"{}\" %*\r\n",
                host_target.display(),
                original.display()
            )
        } else {
            format!(
                "#!/bin/sh\nPYTHONPATH=\"{}:${{PYTHONPATH}}\" exec \"{}\" \"$@\"\n",
                host_target.display(),
                original.display()
            )
        };
        let path = shim_path(bin_dir, &name);
        write_file_if_changed(&path, contents.as_bytes())?;
        mark_executable(&path)?;
        written.push(path);
    }
    Ok(written)
}
