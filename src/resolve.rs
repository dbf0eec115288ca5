//! Request records and the resolver chain
//!
//! A [`Request`] captures everything resolution needs at construction time
//! and is immutable afterwards; `copy()` derives a new request with
//! overrides. Resolvers are asked in insertion order and the first non-null
//! result wins.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::module::Module;
use crate::package::Package;
use crate::vpath::VPath;
use std::path::Path;
use std::rc::Rc;

/// Suffix of package-link files written by develop installs.
pub const LINK_SUFFIX: &str = ".nodepy-link";

/// An in-flight resolution record.
#[derive(Debug, Clone)]
pub struct Request {
    /// The raw request string.
    pub string: String,
    /// The module issuing the request; `None` for the entry module.
    pub parent: Option<Rc<Module>>,
    /// Base directory for relative requests.
    pub current_dir: VPath,
    /// Entry-module resolution: permits non-relative requests against
    /// `current_dir` and claims the Context's main slot.
    pub is_main: bool,
    /// Explicit loader id overriding suffix detection.
    pub loader_hint: Option<String>,
    /// Where a `.nodepy-link` was followed from, when resolution crossed one.
    pub link_origin: Option<VPath>,
    /// Ordered search path captured when the request was built.
    pub search_path: Vec<VPath>,
}

impl Request {
    pub fn new(string: impl Into<String>, current_dir: VPath, search_path: Vec<VPath>) -> Self {
        Request {
            string: string.into(),
            parent: None,
            current_dir,
            is_main: false,
            loader_hint: None,
            link_origin: None,
            search_path,
        }
    }

    /// Derive a new request; callers override fields on the copy.
    pub fn copy(&self) -> Request {
        self.clone()
    }

    /// `./`, `../`, `.` and `..` resolve against `current_dir` only.
    pub fn is_relative(&self) -> bool {
        let s = self.string.as_str();
        s == "." || s == ".." || s.starts_with("./") || s.starts_with("../")
    }

    /// Filesystem-absolute requests, including Windows drive forms on any
    /// host platform.
    pub fn is_absolute(&self) -> bool {
        looks_absolute(&self.string)
    }
}

pub fn looks_absolute(s: &str) -> bool {
    if Path::new(s).is_absolute() {
        return true;
    }
    // `C:\...` / `C:/...` count as absolute even on non-Windows hosts.
    let bytes = s.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// A request-to-module mapper, composed into the Context's chain.
pub trait Resolver {
    fn name(&self) -> &'static str;

    /// Return the resolved module, `None` to pass the request along the
    /// chain, or an error to abort resolution. Probed locations go into
    /// `tried` for the final `ResolveError`.
    fn resolve(
        &self,
        ctx: &Rc<Context>,
        request: &Request,
        tried: &mut Vec<String>,
    ) -> Result<Option<Rc<Module>>>;
}

// ── filesystem resolver ─────────────────────────────────────────────

/// The primary resolver: relative/absolute paths, search-path walks,
/// suffix and index probing, manifest entry points, package links.
pub struct FsResolver;

impl Resolver for FsResolver {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn resolve(
        &self,
        ctx: &Rc<Context>,
        request: &Request,
        tried: &mut Vec<String>,
    ) -> Result<Option<Rc<Module>>> {
        if request.string.starts_with('!') || request.string.contains("://") {
            return Ok(None);
        }

        if request.is_absolute() {
            let target = VPath::local(request.string.as_str());
            return self.try_target(ctx, request, &target, tried);
        }

        if request.is_relative() {
            let target = request.current_dir.join(&request.string);
            return self.try_target(ctx, request, &target, tried);
        }

        // Bare request: walk the search path; a main request may also be
        // resolved against the current directory.
        let mut bases = Vec::new();
        if request.is_main {
            bases.push(request.current_dir.clone());
        }
        bases.extend(request.search_path.iter().cloned());

        for base in &bases {
            if let Some(found) = self.try_bare(ctx, request, base, tried)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

impl FsResolver {
    fn try_bare(
        &self,
        ctx: &Rc<Context>,
        request: &Request,
        base: &VPath,
        tried: &mut Vec<String>,
    ) -> Result<Option<Rc<Module>>> {
        let target = base.join(&request.string);
        if let Some(found) = self.try_target(ctx, request, &target, tried)? {
            return Ok(Some(found));
        }

        // `pkg/sub` inside a package with a resolve_root maps the subpath
        // under that root.
        if let Some((first, rest)) = request.string.split_once('/') {
            let pkg_dir = base.join(first);
            if Package::exists_at(&pkg_dir) {
                let pkg = ctx.package_for_root(&pkg_dir)?;
                let shifted = pkg.resolve_root();
                if shifted != pkg_dir {
                    let target = shifted.join(rest);
                    if let Some(found) = self.try_target(ctx, request, &target, tried)? {
                        return Ok(Some(found));
                    }
                }
            }
        }
        Ok(None)
    }

    fn try_target(
        &self,
        ctx: &Rc<Context>,
        request: &Request,
        target: &VPath,
        tried: &mut Vec<String>,
    ) -> Result<Option<Rc<Module>>> {
        // Package links: a sibling `<target>.nodepy-link` redirects the
        // whole subtree into the directory it names.
        let link = target.append(LINK_SUFFIX);
        if link.is_file() {
            let text = String::from_utf8(link.read_bytes()?)
                .map_err(|e| Error::load(&link, e))?;
            let dest = match text.lines().next().map(str::trim) {
                Some(line) if !line.is_empty() => VPath::local(line).lexical(),
                _ => return Err(Error::load(&link, "empty package link")),
            };
            let mut redirected = request.copy();
            redirected.link_origin = Some(link.lexical());
            return self.try_target(ctx, &redirected, &dest, tried);
        }

        // 1. The target as a file.
        if target.is_file() {
            return ctx.module_for_path(target, request).map(Some);
        }
        tried.push(target.to_string());

        // 2. The target plus each registered suffix, in loader order.
        for suffix in ctx.loader_suffixes() {
            let candidate = target.append(&suffix);
            if candidate.is_file() {
                return ctx.module_for_path(&candidate, request).map(Some);
            }
            tried.push(candidate.to_string());
        }

        // 3. A directory: index files, then the manifest's main.
        if target.is_dir() {
            let package = if Package::exists_at(target) {
                Some(ctx.package_for_root(target)?)
            } else {
                None
            };

            for suffix in ctx.loader_suffixes() {
                let candidate = target.join("index").append(&suffix);
                if candidate.is_file() {
                    return ctx.module_for_path(&candidate, request).map(Some);
                }
                tried.push(candidate.to_string());
            }

            if let Some(pkg) = package {
                let entry = self.package_entry(&pkg);
                if &entry != target {
                    return self.try_target(ctx, request, &entry, tried);
                }
            }
        }

        Ok(None)
    }

    /// Where a package's entry point lives: an explicit `main` is relative
    /// to the package root; the `index` default follows `resolve_root`.
    fn package_entry(&self, pkg: &Rc<Package>) -> VPath {
        match pkg.manifest().main.as_deref() {
            Some(main) => pkg.root().join(main),
            None => pkg.resolve_root().join("index"),
        }
    }
}

// ── binding resolver ────────────────────────────────────────────────

/// Resolves `!name` requests against the Context's binding table.
pub struct BindingResolver;

impl Resolver for BindingResolver {
    fn name(&self) -> &'static str {
        "binding"
    }

    fn resolve(
        &self,
        ctx: &Rc<Context>,
        request: &Request,
        _tried: &mut Vec<String>,
    ) -> Result<Option<Rc<Module>>> {
        let Some(name) = request.string.strip_prefix('!') else {
            return Ok(None);
        };
        match ctx.binding(name) {
            Some(value) => ctx.binding_module(name, value, request).map(Some),
            None => Err(Error::NoSuchBinding(name.to_string())),
        }
    }
}

// ── null resolver ───────────────────────────────────────────────────

/// Terminal resolver for requests carrying a scheme nothing else claimed.
/// Always yields null so the chain ends in a clean `ResolveError`.
pub struct NullResolver;

impl Resolver for NullResolver {
    fn name(&self) -> &'static str {
        "null"
    }

    fn resolve(
        &self,
        _ctx: &Rc<Context>,
        request: &Request,
        tried: &mut Vec<String>,
    ) -> Result<Option<Rc<Module>>> {
        if request.string.contains("://") {
            tried.push(format!("<no handler for scheme of '{}'>", request.string));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_detection() {
        let cwd = VPath::local("/ws");
        let rel = Request::new("./x", cwd.clone(), vec![]);
        assert!(rel.is_relative());
        assert!(Request::new(".", cwd.clone(), vec![]).is_relative());
        assert!(Request::new("..", cwd.clone(), vec![]).is_relative());
        assert!(!Request::new("pkg", cwd, vec![]).is_relative());
    }

    #[test]
    fn test_windows_drive_is_absolute() {
        assert!(looks_absolute("C:\\tools\\lib"));
        assert!(looks_absolute("c:/tools/lib"));
        assert!(looks_absolute("/usr/lib"));
        assert!(!looks_absolute("pkg"));
        assert!(!looks_absolute("./pkg"));
    }

    #[test]
    fn test_copy_allows_overrides() {
        let base = Request::new("pkg", VPath::local("/ws"), vec![]);
        let mut copy = base.copy();
        copy.is_main = true;
        copy.loader_hint = Some("json".to_string());
        assert!(!base.is_main);
        assert!(copy.is_main);
        assert_eq!(base.string, copy.string);
    }
}
