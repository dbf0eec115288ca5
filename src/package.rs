//! Discovered packages: a manifest plus its root directory
//!
//! Packages are discovered lazily when module resolution walks into their
//! root, cached per canonical root directory on the Context, and retained
//! for the Context's lifetime.

use crate::error::{Error, Result};
use crate::manifest::{Manifest, MANIFEST_FILENAME};
use crate::vpath::VPath;
use std::cell::Cell;
use std::rc::Rc;

/// A package: one manifest rooted at one directory.
pub struct Package {
    root: VPath,
    manifest: Manifest,
    extensions_loaded: Cell<bool>,
}

impl Package {
    /// Read and validate the manifest under `root`. `root` should already be
    /// canonical; the Context's package cache keys on it.
    pub fn load(root: &VPath) -> Result<Rc<Package>> {
        let manifest_path = root.join(MANIFEST_FILENAME);
        let bytes = manifest_path.read_bytes()?;
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::manifest(&manifest_path, e))?;
        let manifest = Manifest::parse(&text)
            .map_err(|e| match e {
                Error::InvalidManifest { reason, .. } => Error::InvalidManifest {
                    origin: Some(manifest_path.to_string()),
                    reason,
                },
                other => other,
            })?;
        Ok(Rc::new(Package {
            root: root.clone(),
            manifest,
            extensions_loaded: Cell::new(false),
        }))
    }

    /// Whether `dir` holds a manifest.
    pub fn exists_at(dir: &VPath) -> bool {
        dir.join(MANIFEST_FILENAME).is_file()
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    pub fn identifier(&self) -> String {
        self.manifest.identifier()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn root(&self) -> &VPath {
        &self.root
    }

    /// The effective root for in-package requests: `resolve_root` under the
    /// package root when declared, the root itself otherwise.
    pub fn resolve_root(&self) -> VPath {
        match self.manifest.resolve_root.as_deref() {
            Some(sub) if !sub.is_empty() => self.root.join(sub),
            _ => self.root.clone(),
        }
    }

    /// The request string for the package entry point, relative to the root.
    pub fn main_request(&self) -> &str {
        self.manifest.main_request()
    }

    pub fn vendor_directories(&self) -> Vec<VPath> {
        self.manifest
            .vendor_directories
            .iter()
            .map(|d| self.root.join(d))
            .collect()
    }

    /// Extension bookkeeping: manifest extensions are resolved once per
    /// package, on first use.
    pub fn extensions_loaded(&self) -> bool {
        self.extensions_loaded.get()
    }

    pub fn mark_extensions_loaded(&self) {
        self.extensions_loaded.set(true);
    }
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Package({} at {})", self.identifier(), self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_package() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILENAME),
            r#"{"name":"p","version":"1.0.0","main":"lib/m","resolve_root":"lib"}"#,
        )
        .unwrap();

        let root = VPath::local(dir.path());
        assert!(Package::exists_at(&root));
        let pkg = Package::load(&root).unwrap();
        assert_eq!(pkg.name(), "p");
        assert_eq!(pkg.main_request(), "lib/m");
        assert_eq!(pkg.resolve_root(), root.join("lib"));
    }

    #[test]
    fn test_resolve_root_defaults_to_root() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILENAME),
            r#"{"name":"p","version":"1.0.0"}"#,
        )
        .unwrap();

        let root = VPath::local(dir.path());
        let pkg = Package::load(&root).unwrap();
        assert_eq!(pkg.resolve_root(), root);
    }

    #[test]
    fn test_invalid_manifest_carries_origin() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILENAME), "{not json").unwrap();

        let err = Package::load(&VPath::local(dir.path())).unwrap_err();
        assert!(err.to_string().contains(MANIFEST_FILENAME));
    }
}
