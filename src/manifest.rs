//! Package manifest parsing, validation and ordered serialization
//!
//! The manifest is the `nodus.json` at a package root. All maps preserve
//! insertion order across a parse → serialize round-trip, and `--save`
//! rewrites emit 2-space indentation.

use crate::error::{Error, Result};
use crate::semver::{Selector, Version};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the package manifest.
pub const MANIFEST_FILENAME: &str = "nodus.json";

/// The typed view of a package manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub engines: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub bin: IndexMap<String, String>,

    /// Lifecycle event → module request, or `!shell` command.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub scripts: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, String>,

    #[serde(
        rename = "dev-dependencies",
        default,
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub dev_dependencies: IndexMap<String, String>,

    #[serde(
        rename = "python-dependencies",
        default,
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub python_dependencies: IndexMap<String, String>,

    #[serde(
        rename = "dev-python-dependencies",
        default,
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub dev_python_dependencies: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,

    /// Subdirectory acting as the effective root for in-package requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_root: Option<String>,

    #[serde(
        rename = "vendor-directories",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub vendor_directories: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<DistConfig>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub private: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

/// File selection for `dist` archives. Include patterns override excludes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_files: Vec<String>,
}

impl Manifest {
    /// Parse and validate manifest JSON.
    pub fn parse(text: &str) -> Result<Manifest> {
        let manifest: Manifest =
            serde_json::from_str(text).map_err(|e| Error::InvalidManifest {
                origin: None,
                reason: e.to_string(),
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load and validate a manifest file.
    pub fn load(path: &Path) -> Result<Manifest> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::manifest(path.display(), e))?;
        let manifest: Manifest =
            serde_json::from_str(&text).map_err(|e| Error::manifest(path.display(), e))?;
        manifest
            .validate()
            .map_err(|e| Error::manifest(path.display(), e))?;
        Ok(manifest)
    }

    /// Serialize with 2-space indentation, preserving key order.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("manifest serialization")
    }

    /// Write the manifest to `path` with a trailing newline.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = self.to_json();
        text.push('\n');
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Schema validation beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidManifest {
            origin: None,
            reason,
        };
        if self.name.is_empty() {
            return Err(invalid("missing package name".to_string()));
        }
        if !is_valid_name(&self.name) {
            return Err(invalid(format!("invalid package name '{}'", self.name)));
        }
        if self.version.is_empty() {
            return Err(invalid("missing package version".to_string()));
        }
        self.version.parse::<Version>().map_err(|_| {
            invalid(format!("invalid package version '{}'", self.version))
        })?;
        if let Some(root) = &self.resolve_root {
            if Path::new(root).is_absolute() {
                return Err(invalid("resolve_root must be relative".to_string()));
            }
        }
        Ok(())
    }

    /// `name@version` as used in logs and registry paths.
    pub fn identifier(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    pub fn parsed_version(&self) -> Version {
        self.version
            .parse()
            .expect("validated manifests carry a parseable version")
    }

    /// The request string for the package's entry point.
    pub fn main_request(&self) -> &str {
        self.main.as_deref().unwrap_or("index")
    }

    /// Parse one dependency table into selectors, surfacing the offending
    /// name on error.
    pub fn selectors(table: &IndexMap<String, String>) -> Result<Vec<(String, Selector)>> {
        table
            .iter()
            .map(|(name, raw)| Ok((name.clone(), Selector::parse(raw)?)))
            .collect()
    }
}

/// Package names: ASCII letters, digits, `.-_`, with an optional
/// `@scope/` prefix following the same rules.
pub fn is_valid_name(name: &str) -> bool {
    fn plain(part: &str) -> bool {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    }

    match name.strip_prefix('@') {
        Some(rest) => match rest.split_once('/') {
            Some((scope, base)) => plain(scope) && plain(base),
            None => false,
        },
        None => plain(name) && !name.contains('/'),
    }
}
