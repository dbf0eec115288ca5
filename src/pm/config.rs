//! INI configuration for the package manager
//!
//! `[default]` carries author/license defaults for `init`; each
//! `[registry:<name>]` section names a registry with optional credentials.
//! Registries keep their file order; the first one is the default choice.

use crate::error::{Error, Result};
use configparser::ini::Ini;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Environment variable overriding the config file location.
pub const ENV_CONFIG: &str = "NODUS_CONFIG";

/// Registry used when the config file names none.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.nodus.dev";

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    pub name: String,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PmConfig {
    pub author: Option<String>,
    pub license: Option<String>,
    pub registries: Vec<RegistryConfig>,
}

impl PmConfig {
    /// Default config file location (`~/.nodus/config`).
    pub fn default_path() -> Option<PathBuf> {
        crate::context::global_prefix().map(|p| p.join("config"))
    }

    /// Load from `NODUS_CONFIG`, the default path, or fall back to built-in
    /// defaults when no file exists.
    pub fn load_default() -> Result<PmConfig> {
        let path = std::env::var_os(ENV_CONFIG)
            .map(PathBuf::from)
            .or_else(Self::default_path);
        match path {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::fallback()),
        }
    }

    pub fn load(path: &Path) -> Result<PmConfig> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<PmConfig> {
        let mut ini = Ini::new();
        ini.read(text.to_string())
            .map_err(|e| Error::Registry(format!("bad config file: {}", e)))?;

        let author = ini.get("default", "author");
        let license = ini.get("default", "license");

        // The parser's section map does not promise file order, so take the
        // registry order from the raw text.
        static SECTION: OnceLock<Regex> = OnceLock::new();
        let re = SECTION
            .get_or_init(|| Regex::new(r"^\s*\[registry:([^\]]+)\]").expect("section regex"));

        let mut registries = Vec::new();
        for line in text.lines() {
            if let Some(caps) = re.captures(line) {
                let name = caps[1].trim().to_string();
                let section = format!("registry:{}", name.to_lowercase());
                let Some(url) = ini.get(&section, "url") else {
                    return Err(Error::Registry(format!(
                        "registry '{}' has no url",
                        name
                    )));
                };
                registries.push(RegistryConfig {
                    name,
                    url,
                    username: ini.get(&section, "username"),
                    password: ini.get(&section, "password"),
                });
            }
        }

        let mut config = PmConfig {
            author,
            license,
            registries,
        };
        if config.registries.is_empty() {
            config.registries = Self::fallback().registries;
        }
        Ok(config)
    }

    fn fallback() -> PmConfig {
        PmConfig {
            author: None,
            license: None,
            registries: vec![RegistryConfig {
                name: "default".to_string(),
                url: DEFAULT_REGISTRY_URL.to_string(),
                username: None,
                password: None,
            }],
        }
    }

    /// Look a registry up by name, or take the first (file-order default).
    pub fn registry(&self, name: Option<&str>) -> Option<&RegistryConfig> {
        match name {
            Some(name) => self.registries.iter().find(|r| r.name == name),
            None => self.registries.first(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[default]
author = Ada Lovelace <ada@example.com>
license = MIT

[registry:internal]
url = https://pkg.internal.example.com
username = ada
password = hunter2

[registry:public]
url = https://registry.nodus.dev
";

    #[test]
    fn test_parse_defaults_and_registries() {
        let cfg = PmConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.author.as_deref(), Some("Ada Lovelace <ada@example.com>"));
        assert_eq!(cfg.license.as_deref(), Some("MIT"));
        assert_eq!(cfg.registries.len(), 2);
        assert_eq!(cfg.registries[0].name, "internal");
        assert_eq!(cfg.registries[1].name, "public");
    }

    #[test]
    fn test_first_registry_is_default() {
        let cfg = PmConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.registry(None).unwrap().name, "internal");
        assert_eq!(cfg.registry(Some("public")).unwrap().name, "public");
        assert!(cfg.registry(Some("missing")).is_none());
    }

    #[test]
    fn test_empty_config_falls_back() {
        let cfg = PmConfig::parse("").unwrap();
        assert_eq!(cfg.registries.len(), 1);
        assert_eq!(cfg.registries[0].url, DEFAULT_REGISTRY_URL);
    }

    #[test]
    fn test_registry_without_url_rejected() {
        assert!(PmConfig::parse("[registry:broken]\nusername = x\n").is_err());
    }
}
