//! The remote registry request surface
//!
//! The installer only needs five operations; they are a trait so tests (and
//! offline work) can run against an in-memory registry while the CLI talks
//! HTTP.

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::pm::config::RegistryConfig;
use crate::semver::{MatchOptions, Selector, Version};
use indexmap::IndexMap;
use serde::Deserialize;
use std::cell::RefCell;

/// What the installer asks of a registry.
pub trait Registry {
    fn url(&self) -> &str;

    /// All advertised versions of a package.
    fn package_versions(&self, name: &str) -> Result<Vec<Version>>;

    /// The manifest of one advertised version.
    fn package_manifest(&self, name: &str, version: &Version) -> Result<Manifest>;

    /// The `.tar.gz` dist archive of one version.
    fn download(&self, name: &str, version: &Version) -> Result<Vec<u8>>;

    fn upload(&self, name: &str, version: &Version, archive: &[u8]) -> Result<()>;

    fn register(&self, username: &str, password: &str, email: &str) -> Result<()>;
}

/// Pick the highest advertised version matching `selector`, or a
/// `VersionMismatch` carrying what was available.
pub fn resolve_selector(
    registry: &dyn Registry,
    name: &str,
    selector: &Selector,
    opts: MatchOptions,
) -> Result<Version> {
    let versions = registry.package_versions(name)?;
    match selector.best_with(versions.iter(), opts) {
        Some(best) => Ok(best.clone()),
        None => Err(Error::VersionMismatch {
            name: name.to_string(),
            selector: selector.raw().to_string(),
            available: versions.iter().map(|v| v.to_string()).collect(),
        }),
    }
}

// ── HTTP client ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PackageIndex {
    #[allow(dead_code)]
    name: String,
    versions: IndexMap<String, Manifest>,
}

/// Blocking HTTP implementation of the request surface.
pub struct HttpRegistry {
    base: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpRegistry {
    pub fn new(config: &RegistryConfig) -> HttpRegistry {
        HttpRegistry {
            base: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            client: reqwest::blocking::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("registry HTTP client"),
        }
    }

    fn get(&self, path: &str) -> Result<reqwest::blocking::Response> {
        let url = format!("{}/{}", self.base, path);
        self.client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Registry(format!("GET {}: {}", url, e)))
    }

    fn authed(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }
}

impl Registry for HttpRegistry {
    fn url(&self) -> &str {
        &self.base
    }

    fn package_versions(&self, name: &str) -> Result<Vec<Version>> {
        let index: PackageIndex = self
            .get(&format!("packages/{}", name))?
            .json()
            .map_err(|e| Error::Registry(format!("bad package index for '{}': {}", name, e)))?;
        let mut versions = Vec::new();
        for raw in index.versions.keys() {
            versions.push(raw.parse::<Version>().map_err(|_| {
                Error::Registry(format!("registry advertises bad version '{}'", raw))
            })?);
        }
        Ok(versions)
    }

    fn package_manifest(&self, name: &str, version: &Version) -> Result<Manifest> {
        let manifest: Manifest = self
            .get(&format!("packages/{}/{}", name, version))?
            .json()
            .map_err(|e| {
                Error::Registry(format!("bad manifest for '{}@{}': {}", name, version, e))
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn download(&self, name: &str, version: &Version) -> Result<Vec<u8>> {
        let bytes = self
            .get(&format!("packages/{}/{}/dist", name, version))?
            .bytes()
            .map_err(|e| Error::Registry(format!("download of {}@{}: {}", name, version, e)))?;
        Ok(bytes.to_vec())
    }

    fn upload(&self, name: &str, version: &Version, archive: &[u8]) -> Result<()> {
        let url = format!("{}/packages/{}/{}/dist", self.base, name, version);
        let req = self
            .client
            .post(&url)
            .header("content-type", "application/gzip")
            .body(archive.to_vec());
        self.authed(req)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Registry(format!("upload to {}: {}", url, e)))?;
        Ok(())
    }

    fn register(&self, username: &str, password: &str, email: &str) -> Result<()> {
        let url = format!("{}/register", self.base);
        self.client
            .post(&url)
            .json(&serde_json::json!({
                "username": username,
                "password": password,
                "email": email,
            }))
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Registry(format!("register at {}: {}", url, e)))?;
        Ok(())
    }
}

// ── in-memory registry ──────────────────────────────────────────────

/// Offline registry for tests and embedding: metadata and archives live in
/// memory, uploads are recorded.
#[derive(Default)]
pub struct MemoryRegistry {
    packages: RefCell<IndexMap<String, Vec<(Version, Manifest, Vec<u8>)>>>,
    uploads: RefCell<Vec<(String, Version)>>,
}

impl MemoryRegistry {
    pub fn new() -> MemoryRegistry {
        MemoryRegistry::default()
    }

    pub fn add_package(&self, manifest: Manifest, archive: Vec<u8>) {
        let version = manifest.parsed_version();
        self.packages
            .borrow_mut()
            .entry(manifest.name.clone())
            .or_default()
            .push((version, manifest, archive));
    }

    pub fn uploads(&self) -> Vec<(String, Version)> {
        self.uploads.borrow().clone()
    }

    fn entry<T>(
        &self,
        name: &str,
        version: &Version,
        pick: impl Fn(&(Version, Manifest, Vec<u8>)) -> T,
    ) -> Result<T> {
        self.packages
            .borrow()
            .get(name)
            .and_then(|versions| versions.iter().find(|(v, _, _)| v == version))
            .map(pick)
            .ok_or_else(|| {
                Error::Registry(format!("no such package '{}@{}'", name, version))
            })
    }
}

impl Registry for MemoryRegistry {
    fn url(&self) -> &str {
        "memory:"
    }

    fn package_versions(&self, name: &str) -> Result<Vec<Version>> {
        self.packages
            .borrow()
            .get(name)
            .map(|versions| versions.iter().map(|(v, _, _)| v.clone()).collect())
            .ok_or_else(|| Error::Registry(format!("no such package '{}'", name)))
    }

    fn package_manifest(&self, name: &str, version: &Version) -> Result<Manifest> {
        self.entry(name, version, |(_, m, _)| m.clone())
    }

    fn download(&self, name: &str, version: &Version) -> Result<Vec<u8>> {
        self.entry(name, version, |(_, _, a)| a.clone())
    }

    fn upload(&self, name: &str, version: &Version, _archive: &[u8]) -> Result<()> {
        self.uploads
            .borrow_mut()
            .push((name.to_string(), version.clone()));
        Ok(())
    }

    fn register(&self, _username: &str, _password: &str, _email: &str) -> Result<()> {
        Ok(())
    }
}
