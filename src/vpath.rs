//! Uniform path abstraction over local files, URLs and archive members
//!
//! Every downstream component (resolvers, loaders, the installer) refers to
//! artifacts exclusively through [`VPath`], so a module can live on disk,
//! behind an HTTP URL, or inside a `.tar.gz` without the resolver caring.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

/// A path to an artifact in one of the three supported locations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VPath {
    /// Ordinary filesystem path.
    Local(PathBuf),
    /// URL-backed artifact, fetched on open.
    Url(String),
    /// A member inside a `.tar.gz` archive.
    Archive { archive: PathBuf, member: PathBuf },
}

fn http_client() -> &'static reqwest::blocking::Client {
    static CLIENT: OnceLock<reqwest::blocking::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("default HTTP client")
    })
}

impl VPath {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        VPath::Local(path.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        VPath::Url(url.into())
    }

    pub fn archive(archive: impl Into<PathBuf>, member: impl Into<PathBuf>) -> Self {
        VPath::Archive {
            archive: archive.into(),
            member: member.into(),
        }
    }

    /// The local filesystem path, if this is a `Local` variant.
    pub fn as_local(&self) -> Option<&Path> {
        match self {
            VPath::Local(p) => Some(p),
            _ => None,
        }
    }

    /// Join a relative part onto this path. An absolute `part` replaces a
    /// local path entirely, matching `PathBuf::push`.
    pub fn join(&self, part: &str) -> VPath {
        match self {
            VPath::Local(p) => VPath::Local(p.join(part)),
            VPath::Url(u) => {
                if let Ok(base) = url::Url::parse(u) {
                    if let Ok(joined) = base.join(part) {
                        return VPath::Url(joined.to_string());
                    }
                }
                VPath::Url(format!("{}/{}", u.trim_end_matches('/'), part))
            }
            VPath::Archive { archive, member } => VPath::Archive {
                archive: archive.clone(),
                member: member.join(part),
            },
        }
    }

    /// Append raw text to the final component (`lib/util` + `.ns` →
    /// `lib/util.ns`). Used for suffix and link-file probing.
    pub fn append(&self, text: &str) -> VPath {
        match self {
            VPath::Local(p) => {
                let mut s = p.as_os_str().to_os_string();
                s.push(text);
                VPath::Local(PathBuf::from(s))
            }
            VPath::Url(u) => VPath::Url(format!("{}{}", u, text)),
            VPath::Archive { archive, member } => {
                let mut s = member.as_os_str().to_os_string();
                s.push(text);
                VPath::Archive {
                    archive: archive.clone(),
                    member: PathBuf::from(s),
                }
            }
        }
    }

    pub fn parent(&self) -> Option<VPath> {
        match self {
            VPath::Local(p) => p.parent().map(|p| VPath::Local(p.to_path_buf())),
            VPath::Url(u) => {
                let base = url::Url::parse(u).ok()?;
                let joined = base.join("./").ok()?;
                Some(VPath::Url(joined.to_string().trim_end_matches('/').to_string()))
            }
            VPath::Archive { archive, member } => match member.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => Some(VPath::Archive {
                    archive: archive.clone(),
                    member: parent.to_path_buf(),
                }),
                _ => Some(VPath::Local(archive.clone())),
            },
        }
    }

    /// Final component name.
    pub fn name(&self) -> Option<String> {
        match self {
            VPath::Local(p) => p.file_name().map(|n| n.to_string_lossy().to_string()),
            VPath::Url(u) => u.rsplit('/').next().map(str::to_string),
            VPath::Archive { member, .. } => {
                member.file_name().map(|n| n.to_string_lossy().to_string())
            }
        }
    }

    /// Final component without its suffix.
    pub fn stem(&self) -> Option<String> {
        let name = self.name()?;
        match name.rfind('.') {
            Some(0) | None => Some(name),
            Some(idx) => Some(name[..idx].to_string()),
        }
    }

    /// The suffix including its leading dot (`.ns`), or `None`.
    pub fn suffix(&self) -> Option<String> {
        let name = self.name()?;
        match name.rfind('.') {
            Some(idx) if idx > 0 => Some(name[idx..].to_string()),
            _ => None,
        }
    }

    pub fn is_absolute(&self) -> bool {
        match self {
            VPath::Local(p) => p.is_absolute(),
            VPath::Url(_) => true,
            VPath::Archive { archive, .. } => archive.is_absolute(),
        }
    }

    /// Absolute, lexically-normalized form without consulting the
    /// filesystem: the canonical-filename shape used as a cache key.
    pub fn lexical(&self) -> VPath {
        match self {
            VPath::Local(p) => {
                let abs = if p.is_absolute() {
                    p.clone()
                } else {
                    std::env::current_dir()
                        .map(|cwd| cwd.join(p))
                        .unwrap_or_else(|_| p.clone())
                };
                VPath::Local(lexical_normalize(&abs))
            }
            VPath::Url(u) => VPath::Url(normalize_url(u)),
            VPath::Archive { archive, member } => VPath::Archive {
                archive: lexical_normalize(archive),
                member: lexical_normalize(member),
            },
        }
    }

    /// Normalize `.`/`..` and follow symlinks. Parent-directory elements are
    /// eliminated lexically *before* the filesystem is consulted, so
    /// `pkg/sub/..` and `pkg` canonicalize identically even when `sub` is a
    /// symlink or does not exist. With `strict = false` a nonexistent tail is
    /// tolerated: the deepest existing ancestor is canonicalized and the
    /// remainder re-joined.
    pub fn resolve(&self, strict: bool) -> Result<VPath> {
        match self {
            VPath::Local(p) => resolve_local(p, strict).map(VPath::Local),
            VPath::Url(u) => Ok(VPath::Url(normalize_url(u))),
            VPath::Archive { archive, member } => {
                let archive = resolve_local(archive, strict)?;
                Ok(VPath::Archive {
                    archive,
                    member: lexical_normalize(member),
                })
            }
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            VPath::Local(p) => p.exists(),
            VPath::Url(u) => http_client()
                .head(u.as_str())
                .send()
                .map(|r| r.status().is_success())
                .unwrap_or(false),
            VPath::Archive { archive, member } => {
                archive_find(archive, member).map(|m| m.is_some()).unwrap_or(false)
            }
        }
    }

    pub fn is_file(&self) -> bool {
        match self {
            VPath::Local(p) => p.is_file(),
            VPath::Url(_) => self.exists(),
            VPath::Archive { archive, member } => matches!(
                archive_find(archive, member),
                Ok(Some(ArchiveEntryKind::File))
            ),
        }
    }

    pub fn is_dir(&self) -> bool {
        match self {
            VPath::Local(p) => p.is_dir(),
            VPath::Url(_) => false,
            VPath::Archive { archive, member } => matches!(
                archive_find(archive, member),
                Ok(Some(ArchiveEntryKind::Dir))
            ),
        }
    }

    /// Modification time, when the backing store exposes one.
    pub fn mtime(&self) -> Option<SystemTime> {
        match self {
            VPath::Local(p) => fs::metadata(p).and_then(|m| m.modified()).ok(),
            VPath::Url(_) => None,
            VPath::Archive { archive, .. } => {
                fs::metadata(archive).and_then(|m| m.modified()).ok()
            }
        }
    }

    /// Open the artifact for binary reading.
    pub fn open(&self) -> Result<Box<dyn Read>> {
        match self {
            VPath::Local(p) => Ok(Box::new(fs::File::open(p)?)),
            VPath::Url(u) => {
                let bytes = http_client()
                    .get(u.as_str())
                    .send()
                    .and_then(|r| r.error_for_status())
                    .and_then(|r| r.bytes())
                    .map_err(|e| Error::load(u, e))?;
                Ok(Box::new(Cursor::new(bytes.to_vec())))
            }
            VPath::Archive { archive, member } => {
                let data = archive_read(archive, member)?
                    .ok_or_else(|| Error::load(self, "no such archive member"))?;
                Ok(Box::new(Cursor::new(data)))
            }
        }
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open()?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// List directory entries, sorted for determinism.
    pub fn iterdir(&self) -> Result<Vec<VPath>> {
        match self {
            VPath::Local(p) => {
                let mut out = Vec::new();
                for entry in fs::read_dir(p)? {
                    out.push(VPath::Local(entry?.path()));
                }
                out.sort();
                Ok(out)
            }
            VPath::Url(u) => Err(Error::load(u, "URL paths cannot be listed")),
            VPath::Archive { archive, member } => {
                let mut out = archive_list(archive, member)?
                    .into_iter()
                    .map(|m| VPath::Archive {
                        archive: archive.clone(),
                        member: m,
                    })
                    .collect::<Vec<_>>();
                out.sort();
                Ok(out)
            }
        }
    }
}

impl fmt::Display for VPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VPath::Local(p) => write!(f, "{}", p.display()),
            VPath::Url(u) => write!(f, "{}", u),
            VPath::Archive { archive, member } => {
                write!(f, "{}!/{}", archive.display(), member.display())
            }
        }
    }
}

impl From<PathBuf> for VPath {
    fn from(p: PathBuf) -> Self {
        VPath::Local(p)
    }
}

impl From<&Path> for VPath {
    fn from(p: &Path) -> Self {
        VPath::Local(p.to_path_buf())
    }
}

// ── lexical normalization ───────────────────────────────────────────

/// Eliminate `.` and `..` components without touching the filesystem.
/// Leading `..` on relative paths is preserved; `..` at a root is dropped.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if last_is_normal {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

fn resolve_local(path: &Path, strict: bool) -> Result<PathBuf> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let lex = lexical_normalize(&abs);

    match fs::canonicalize(&lex) {
        Ok(real) => Ok(real),
        Err(err) if strict => Err(err.into()),
        Err(_) => {
            // Canonicalize the deepest existing ancestor, re-join the rest.
            let mut existing = lex.clone();
            let mut tail = Vec::new();
            while !existing.exists() {
                match existing.file_name() {
                    Some(name) => {
                        tail.push(name.to_os_string());
                        existing.pop();
                    }
                    None => break,
                }
            }
            let mut out = if existing.as_os_str().is_empty() {
                lex.clone()
            } else {
                fs::canonicalize(&existing).unwrap_or(existing)
            };
            for part in tail.into_iter().rev() {
                out.push(part);
            }
            Ok(out)
        }
    }
}

fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            let normalized = lexical_normalize(Path::new(parsed.path()));
            parsed.set_path(&normalized.to_string_lossy());
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

// ── archive access ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveEntryKind {
    File,
    Dir,
}

fn archive_entries(archive: &Path) -> Result<tar::Archive<GzDecoder<fs::File>>> {
    let file = fs::File::open(archive)?;
    Ok(tar::Archive::new(GzDecoder::new(file)))
}

fn archive_find(archive: &Path, member: &Path) -> Result<Option<ArchiveEntryKind>> {
    let member = lexical_normalize(member);
    let mut ar = archive_entries(archive)?;
    for entry in ar.entries()? {
        let entry = entry?;
        let path = lexical_normalize(&entry.path()?);
        if path == member {
            let kind = if entry.header().entry_type().is_dir() {
                ArchiveEntryKind::Dir
            } else {
                ArchiveEntryKind::File
            };
            return Ok(Some(kind));
        }
        if path.starts_with(&member) {
            return Ok(Some(ArchiveEntryKind::Dir));
        }
    }
    Ok(None)
}

fn archive_read(archive: &Path, member: &Path) -> Result<Option<Vec<u8>>> {
    let member = lexical_normalize(member);
    let mut ar = archive_entries(archive)?;
    for entry in ar.entries()? {
        let mut entry = entry?;
        if lexical_normalize(&entry.path()?) == member {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            return Ok(Some(buf));
        }
    }
    Ok(None)
}

fn archive_list(archive: &Path, member: &Path) -> Result<Vec<PathBuf>> {
    let member = lexical_normalize(member);
    let mut out = Vec::new();
    let mut ar = archive_entries(archive)?;
    for entry in ar.entries()? {
        let entry = entry?;
        let path = lexical_normalize(&entry.path()?);
        if path.parent() == Some(member.as_path()) {
            out.push(path);
        }
    }
    Ok(out)
}
