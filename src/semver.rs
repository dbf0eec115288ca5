//! Version and selector parsing for the reduced SemVer dialect
//!
//! Versions are `MAJOR.MINOR.PATCH[-PRERELEASE]`. Selectors cover exact
//! matches, inequalities, tilde/caret ranges, `||` disjunction, whitespace
//! conjunction, and the two provenance forms (`git+<url>` and local paths)
//! that match by origin rather than by number.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A parsed version triple with optional pre-release identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<PreIdent>,
}

/// One dotted pre-release identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PreIdent {
    Num(u64),
    Alpha(String),
}

impl Ord for PreIdent {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PreIdent::Num(a), PreIdent::Num(b)) => a.cmp(b),
            // Numeric identifiers sort below alphanumeric ones.
            (PreIdent::Num(_), PreIdent::Alpha(_)) => Ordering::Less,
            (PreIdent::Alpha(_), PreIdent::Num(_)) => Ordering::Greater,
            (PreIdent::Alpha(a), PreIdent::Alpha(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for PreIdent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            pre: Vec::new(),
        }
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.triple().cmp(&other.triple()) {
            Ordering::Equal => match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A pre-release sorts below the release of the same triple.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            },
            ord => ord,
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-")?;
            for (i, ident) in self.pre.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                match ident {
                    PreIdent::Num(n) => write!(f, "{}", n)?,
                    PreIdent::Alpha(s) => write!(f, "{}", s)?,
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let bad = |reason: &str| Error::SelectorParse {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (numbers, pre) = match input.split_once('-') {
            Some((n, p)) => (n, Some(p)),
            None => (input, None),
        };

        let mut parts = numbers.split('.');
        let mut next_number = |name: &str| -> Result<Option<u64>> {
            match parts.next() {
                None => Ok(None),
                Some(raw) => raw
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| bad(&format!("bad {} component '{}'", name, raw))),
            }
        };

        let major = next_number("major")?.ok_or_else(|| bad("empty version"))?;
        let minor = next_number("minor")?.unwrap_or(0);
        let patch = next_number("patch")?.unwrap_or(0);
        if parts.next().is_some() {
            return Err(bad("too many version components"));
        }

        let pre = match pre {
            None => Vec::new(),
            Some("") => return Err(bad("empty pre-release")),
            Some(p) => p
                .split('.')
                .map(|ident| {
                    if ident.is_empty() {
                        return Err(bad("empty pre-release identifier"));
                    }
                    if !ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                        return Err(bad(&format!("bad pre-release identifier '{}'", ident)));
                    }
                    Ok(match ident.parse::<u64>() {
                        Ok(n) => PreIdent::Num(n),
                        Err(_) => PreIdent::Alpha(ident.to_string()),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(Version {
            major,
            minor,
            patch,
            pre,
        })
    }
}

// ── selectors ───────────────────────────────────────────────────────

/// Inequality operators supported by the dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
}

/// The structural form of a selector.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorKind {
    Any,
    Exact(Version),
    Cmp(CmpOp, Version),
    Tilde(Version),
    Caret(Version),
    /// Whitespace conjunction: every term must match.
    All(Vec<SelectorKind>),
    /// `||` disjunction: any alternative may match.
    AnyOf(Vec<SelectorKind>),
    /// Matches by provenance only.
    Git {
        url: String,
        reference: Option<String>,
    },
    /// Matches by provenance only. `develop` marks `-e` link installs.
    Path { path: PathBuf, develop: bool },
}

/// A parsed version constraint, keeping the original text.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    raw: String,
    kind: SelectorKind,
}

/// Options for selector matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    /// Let every selector match pre-release versions, not only selectors
    /// that name one.
    pub include_prereleases: bool,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Selector> {
        let trimmed = input.trim();
        let kind = parse_selector(input, trimmed)?;
        Ok(Selector {
            raw: input.to_string(),
            kind,
        })
    }

    /// The text this selector was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> &SelectorKind {
        &self.kind
    }

    /// Whether the selector identifies its target by provenance (git URL or
    /// local path) rather than by version number.
    pub fn is_provenance(&self) -> bool {
        matches!(
            self.kind,
            SelectorKind::Git { .. } | SelectorKind::Path { .. }
        )
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.matches_with(version, MatchOptions::default())
    }

    pub fn matches_with(&self, version: &Version, opts: MatchOptions) -> bool {
        if version.is_prerelease()
            && !opts.include_prereleases
            && !self.kind.names_prerelease()
        {
            return false;
        }
        self.kind.accepts(version)
    }

    /// The maximum matching version under the numeric order.
    pub fn best<'a, I>(&self, versions: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        self.best_with(versions, MatchOptions::default())
    }

    pub fn best_with<'a, I>(&self, versions: I, opts: MatchOptions) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        versions
            .into_iter()
            .filter(|v| self.matches_with(v, opts))
            .max()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        Selector::parse(input)
    }
}

impl SelectorKind {
    fn accepts(&self, v: &Version) -> bool {
        match self {
            SelectorKind::Any => true,
            SelectorKind::Exact(b) => v == b,
            SelectorKind::Cmp(op, b) => match op {
                CmpOp::Gt => v > b,
                CmpOp::Ge => v >= b,
                CmpOp::Lt => v < b,
                CmpOp::Le => v <= b,
            },
            SelectorKind::Tilde(b) => {
                v.major == b.major && v.minor == b.minor && v >= b
            }
            SelectorKind::Caret(b) => v.major == b.major && v >= b,
            SelectorKind::All(terms) => terms.iter().all(|t| t.accepts(v)),
            SelectorKind::AnyOf(alts) => alts.iter().any(|a| a.accepts(v)),
            SelectorKind::Git { .. } | SelectorKind::Path { .. } => false,
        }
    }

    fn names_prerelease(&self) -> bool {
        match self {
            SelectorKind::Exact(v)
            | SelectorKind::Cmp(_, v)
            | SelectorKind::Tilde(v)
            | SelectorKind::Caret(v) => v.is_prerelease(),
            SelectorKind::All(terms) => terms.iter().any(|t| t.names_prerelease()),
            SelectorKind::AnyOf(alts) => alts.iter().any(|a| a.names_prerelease()),
            _ => false,
        }
    }
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorKind::Any => write!(f, "*"),
            SelectorKind::Exact(v) => write!(f, "={}", v),
            SelectorKind::Cmp(op, v) => {
                let sym = match op {
                    CmpOp::Gt => ">",
                    CmpOp::Ge => ">=",
                    CmpOp::Lt => "<",
                    CmpOp::Le => "<=",
                };
                write!(f, "{}{}", sym, v)
            }
            SelectorKind::Tilde(v) => write!(f, "~{}", v),
            SelectorKind::Caret(v) => write!(f, "^{}", v),
            SelectorKind::All(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", term)?;
                }
                Ok(())
            }
            SelectorKind::AnyOf(alts) => {
                for (i, alt) in alts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " || ")?;
                    }
                    write!(f, "{}", alt)?;
                }
                Ok(())
            }
            SelectorKind::Git { url, reference } => {
                write!(f, "git+{}", url)?;
                if let Some(r) = reference {
                    write!(f, "@{}", r)?;
                }
                Ok(())
            }
            SelectorKind::Path { path, develop } => {
                if *develop {
                    write!(f, "-e {}", path.display())
                } else {
                    write!(f, "{}", path.display())
                }
            }
        }
    }
}

fn parse_selector(original: &str, trimmed: &str) -> Result<SelectorKind> {
    if trimmed.is_empty() || trimmed == "*" {
        return Ok(SelectorKind::Any);
    }

    if let Some(rest) = trimmed.strip_prefix("git+") {
        return parse_git(original, rest);
    }

    if let Some(rest) = trimmed.strip_prefix("-e ") {
        return Ok(SelectorKind::Path {
            path: PathBuf::from(rest.trim()),
            develop: true,
        });
    }

    if trimmed.starts_with("./")
        || trimmed.starts_with("../")
        || std::path::Path::new(trimmed).is_absolute()
    {
        return Ok(SelectorKind::Path {
            path: PathBuf::from(trimmed),
            develop: false,
        });
    }

    let mut alternatives = Vec::new();
    for alt in trimmed.split("||") {
        let alt = alt.trim();
        if alt.is_empty() {
            return Err(Error::SelectorParse {
                input: original.to_string(),
                reason: "empty '||' alternative".to_string(),
            });
        }
        alternatives.push(parse_conjunction(original, alt)?);
    }
    if alternatives.len() == 1 {
        Ok(alternatives.pop().expect("one alternative"))
    } else {
        Ok(SelectorKind::AnyOf(alternatives))
    }
}

fn parse_conjunction(original: &str, text: &str) -> Result<SelectorKind> {
    let mut terms = Vec::new();
    for term in text.split_whitespace() {
        terms.push(parse_term(original, term)?);
    }
    if terms.len() == 1 {
        Ok(terms.pop().expect("one term"))
    } else {
        Ok(SelectorKind::All(terms))
    }
}

fn parse_term(original: &str, term: &str) -> Result<SelectorKind> {
    let version = |rest: &str| -> Result<Version> {
        rest.parse::<Version>().map_err(|e| match e {
            Error::SelectorParse { reason, .. } => Error::SelectorParse {
                input: original.to_string(),
                reason,
            },
            other => other,
        })
    };

    if term == "*" {
        Ok(SelectorKind::Any)
    } else if let Some(rest) = term.strip_prefix("==") {
        Ok(SelectorKind::Exact(version(rest)?))
    } else if let Some(rest) = term.strip_prefix(">=") {
        Ok(SelectorKind::Cmp(CmpOp::Ge, version(rest)?))
    } else if let Some(rest) = term.strip_prefix("<=") {
        Ok(SelectorKind::Cmp(CmpOp::Le, version(rest)?))
    } else if let Some(rest) = term.strip_prefix('=') {
        Ok(SelectorKind::Exact(version(rest)?))
    } else if let Some(rest) = term.strip_prefix('>') {
        Ok(SelectorKind::Cmp(CmpOp::Gt, version(rest)?))
    } else if let Some(rest) = term.strip_prefix('<') {
        Ok(SelectorKind::Cmp(CmpOp::Lt, version(rest)?))
    } else if let Some(rest) = term.strip_prefix('~') {
        Ok(SelectorKind::Tilde(version(rest)?))
    } else if let Some(rest) = term.strip_prefix('^') {
        Ok(SelectorKind::Caret(version(rest)?))
    } else {
        Ok(SelectorKind::Exact(version(term)?))
    }
}

fn parse_git(original: &str, rest: &str) -> Result<SelectorKind> {
    if rest.is_empty() {
        return Err(Error::SelectorParse {
            input: original.to_string(),
            reason: "empty git URL".to_string(),
        });
    }
    // The ref separator is an '@' after the last path slash, so user@host
    // authority parts are left alone.
    let split_at = rest
        .rfind('/')
        .and_then(|slash| rest[slash..].find('@').map(|at| slash + at));
    match split_at {
        Some(at) => Ok(SelectorKind::Git {
            url: rest[..at].to_string(),
            reference: Some(rest[at + 1..].to_string()),
        }),
        None => Ok(SelectorKind::Git {
            url: rest.to_string(),
            reference: None,
        }),
    }
}
