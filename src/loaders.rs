//! Suffix-keyed loaders: source, bytecache and JSON
//!
//! After resolution yields a path, the Context picks a loader by suffix
//! (most specific first) or by the request's explicit loader hint. Loaders
//! instantiate modules; execution happens later, under the Context.

use crate::context::Context;
use crate::engine;
use crate::error::{Error, Result};
use crate::module::{Artifact, Module};
use crate::resolve::Request;
use crate::vpath::VPath;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Suffix of dialect source files.
pub const SOURCE_SUFFIX: &str = ".ns";
/// Suffix of bytecache files, written adjacent to their source.
pub const CACHE_SUFFIX: &str = ".nsc";
/// Suffix of JSON modules.
pub const JSON_SUFFIX: &str = ".json";

/// Context option disabling bytecache writes.
pub const OPT_WRITE_BYTECACHE: &str = "bytecache.write";

/// A polymorphic artifact reader keyed by file capability.
pub trait Loader {
    /// Loader id, matchable by the `-L` CLI flag and request hints.
    fn name(&self) -> &'static str;

    /// Suffixes this loader claims.
    fn suffixes(&self) -> &'static [&'static str];

    fn can_load(&self, path: &VPath) -> bool {
        match path.suffix() {
            Some(suffix) => self.suffixes().contains(&suffix.as_str()),
            None => false,
        }
    }

    /// Instantiate a module for `path`. The Context inserts it into the
    /// cache before execution.
    fn load(&self, ctx: &Rc<Context>, path: &VPath, request: &Request) -> Result<Rc<Module>>;
}

/// Create the module shell shared by every loader: canonical and real
/// filenames plus the owning package discovered by walking upward.
fn new_module(ctx: &Rc<Context>, path: &VPath, request: &Request) -> Result<Rc<Module>> {
    let canonical = path.lexical();
    let real = path.resolve(false)?;
    let package = match real.parent() {
        Some(dir) => ctx.package_for_directory(&dir)?,
        None => None,
    };
    Ok(Module::new(
        ctx,
        canonical,
        real,
        request.copy(),
        package.as_ref(),
    ))
}

// ── bytecache format ────────────────────────────────────────────────

const CACHE_MAGIC: u32 = 0x4E53_4243; // "NSBC"
const CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    magic: u32,
    version: u32,
    program: engine::Program,
}

impl CacheFile {
    fn wrap(program: engine::Program) -> Self {
        CacheFile {
            magic: CACHE_MAGIC,
            version: CACHE_VERSION,
            program,
        }
    }

    fn unwrap_checked(self, path: &VPath) -> Result<engine::Program> {
        if self.magic != CACHE_MAGIC {
            return Err(Error::load(path, "not a bytecache file"));
        }
        if self.version != CACHE_VERSION {
            return Err(Error::load(
                path,
                format!("unsupported bytecache version {}", self.version),
            ));
        }
        Ok(self.program)
    }
}

/// The sibling bytecache path for a source file (`lib/m.ns` → `lib/m.nsc`).
fn cache_sibling(source: &VPath) -> Option<VPath> {
    let stem = source.stem()?;
    let parent = source.parent()?;
    Some(parent.join(&stem).append(CACHE_SUFFIX))
}

// ── source loader ───────────────────────────────────────────────────

/// Loads `.ns` dialect source: decode, preprocess, compile, bytecache.
pub struct SourceLoader;

impl Loader for SourceLoader {
    fn name(&self) -> &'static str {
        "source"
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[SOURCE_SUFFIX]
    }

    fn load(&self, ctx: &Rc<Context>, path: &VPath, request: &Request) -> Result<Rc<Module>> {
        let module = new_module(ctx, path, request)?;

        let program = match self.cached_program(path) {
            Some(program) => program,
            None => {
                let source = read_source(path)?;
                let package = module.package();
                let source = ctx.preprocess(package.as_ref(), path, source)?;
                let program = engine::compile(&source)
                    .map_err(|e| Error::load(path, e.with_file(&path.to_string())))?;
                self.write_cache(ctx, path, &program);
                program
            }
        };

        module.set_artifact(Artifact::Program(program));
        Ok(module)
    }
}

impl SourceLoader {
    /// Prefer the adjacent bytecache iff its mtime is at least the source's
    /// and it is actually readable; anything else falls back to compiling.
    fn cached_program(&self, source: &VPath) -> Option<engine::Program> {
        let cache = cache_sibling(source)?;
        let cache_mtime = cache.mtime()?;
        let source_mtime = source.mtime()?;
        if cache_mtime < source_mtime {
            return None;
        }
        let bytes = cache.read_bytes().ok()?;
        let file: CacheFile = bincode::deserialize(&bytes).ok()?;
        file.unwrap_checked(&cache).ok()
    }

    fn write_cache(&self, ctx: &Rc<Context>, source: &VPath, program: &engine::Program) {
        if !ctx.option_flag(OPT_WRITE_BYTECACHE, true) {
            return;
        }
        let Some(cache) = cache_sibling(source) else {
            return;
        };
        let Some(local) = cache.as_local() else {
            return;
        };
        match bincode::serialize(&CacheFile::wrap(program.clone())) {
            Ok(bytes) => {
                if let Err(err) = std::fs::write(local, bytes) {
                    tracing::debug!(cache = %cache, error = %err, "bytecache write skipped");
                }
            }
            Err(err) => {
                tracing::debug!(cache = %cache, error = %err, "bytecache serialization failed");
            }
        }
    }
}

// ── bytecache loader ────────────────────────────────────────────────

/// Loads `.nsc` bytecache files requested directly.
pub struct BytecacheLoader;

impl Loader for BytecacheLoader {
    fn name(&self) -> &'static str {
        "bytecache"
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[CACHE_SUFFIX]
    }

    fn load(&self, ctx: &Rc<Context>, path: &VPath, request: &Request) -> Result<Rc<Module>> {
        let module = new_module(ctx, path, request)?;
        let bytes = path.read_bytes()?;
        let file: CacheFile =
            bincode::deserialize(&bytes).map_err(|e| Error::load(path, e))?;
        module.set_artifact(Artifact::Program(file.unwrap_checked(path)?));
        Ok(module)
    }
}

// ── JSON loader ─────────────────────────────────────────────────────

/// Loads `.json` modules; the exported value is the parsed document.
pub struct JsonLoader;

impl Loader for JsonLoader {
    fn name(&self) -> &'static str {
        "json"
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[JSON_SUFFIX]
    }

    fn load(&self, ctx: &Rc<Context>, path: &VPath, request: &Request) -> Result<Rc<Module>> {
        let module = new_module(ctx, path, request)?;
        let bytes = path.read_bytes()?;
        let parsed: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| Error::load(path, e))?;
        module.set_artifact(Artifact::Json(engine::Value::from_json(&parsed)));
        Ok(module)
    }
}

// ── source decoding ─────────────────────────────────────────────────

/// Read source text honoring a coding declaration on the first two lines
/// (`# coding: latin-1` or the editor-cookie form); UTF-8 otherwise.
pub fn read_source(path: &VPath) -> Result<String> {
    let bytes = path.read_bytes()?;
    match detect_coding(&bytes) {
        Some(label) => {
            let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
                .ok_or_else(|| Error::load(path, format!("unknown coding '{}'", label)))?;
            let (text, _, malformed) = encoding.decode(&bytes);
            if malformed {
                return Err(Error::load(
                    path,
                    format!("source is not valid {}", encoding.name()),
                ));
            }
            Ok(text.into_owned())
        }
        None => String::from_utf8(bytes)
            .map_err(|e| Error::load(path, format!("source is not valid UTF-8: {}", e))),
    }
}

fn detect_coding(bytes: &[u8]) -> Option<String> {
    use regex::Regex;
    use std::sync::OnceLock;

    static CODING: OnceLock<Regex> = OnceLock::new();
    let re = CODING
        .get_or_init(|| Regex::new(r"coding[:=]\s*([A-Za-z0-9_.-]+)").expect("coding regex"));

    // Only the first two lines are eligible; peek them as Latin-1 so the
    // scan itself cannot fail on arbitrary bytes.
    let preview: String = bytes
        .iter()
        .take_while({
            let mut newlines = 0;
            move |&&b| {
                if b == b'\n' {
                    newlines += 1;
                }
                newlines < 2
            }
        })
        .map(|&b| b as char)
        .collect();

    re.captures(&preview)
        .map(|caps| caps[1].to_string())
}
