//! Process-scope session state
//!
//! A [`Context`] owns the resolver and loader chains, the module and package
//! caches, the search path, bindings, events and options. Contexts are
//! single-threaded and shared through `Rc`; multiple Contexts in one process
//! share nothing.

use crate::engine::{self, Value};
use crate::error::{Error, Result};
use crate::ext::{self, Extension, RequireImportSyntax, RequireUnpackSyntax};
use crate::loaders::{BytecacheLoader, JsonLoader, Loader, SourceLoader};
use crate::manifest::MANIFEST_FILENAME;
use crate::module::{Artifact, Module};
use crate::package::Package;
use crate::require::Require;
use crate::resolve::{BindingResolver, FsResolver, NullResolver, Request, Resolver};
use crate::vpath::VPath;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

/// Workspace-local directory holding installed packages.
pub const MODULES_DIR: &str = "nodus_modules";

/// Option key: re-execute modules whose source changed since last exec.
pub const OPT_AUTORELOAD: &str = "require.autoreload";
/// Option key: inject `__name__ = "__main__"` into the entry module.
pub const OPT_PYMAIN: &str = "pymain";

/// The per-user prefix holding globally installed packages.
pub fn global_prefix() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".nodus"))
}

pub fn global_modules_dir() -> Option<PathBuf> {
    global_prefix().map(|p| p.join(MODULES_DIR))
}

/// Context event kinds. `Require`/`Load` fire before the action completes,
/// `Enter`/`Leave` after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Require,
    Load,
    Enter,
    Leave,
}

/// An event record passed to subscribers.
#[derive(Clone)]
pub struct Event {
    pub kind: EventKind,
    pub module: Option<Rc<Module>>,
    pub request: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, module: Option<Rc<Module>>, request: Option<String>) -> Self {
        Event {
            kind,
            module,
            request,
        }
    }
}

type Subscriber = Rc<dyn Fn(&Event)>;

/// Construction options for a Context.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Base directory for entry-module resolution; defaults to the process
    /// working directory.
    pub current_dir: Option<PathBuf>,
    /// Snapshot restorable global state on `enter` and restore it on
    /// `leave`.
    pub isolated: bool,
}

struct EnterSnapshot {
    search_path: Vec<VPath>,
    bindings: Option<IndexMap<String, Value>>,
    options: Option<IndexMap<String, Value>>,
}

/// The top-level session object.
pub struct Context {
    resolvers: RefCell<Vec<Rc<dyn Resolver>>>,
    loaders: RefCell<Vec<Rc<dyn Loader>>>,
    modules: RefCell<FxHashMap<String, Rc<Module>>>,
    packages: RefCell<FxHashMap<String, Rc<Package>>>,
    package_extensions: RefCell<FxHashMap<String, Vec<Rc<dyn Extension>>>>,
    file_extensions: RefCell<FxHashMap<String, Vec<Rc<dyn Extension>>>>,
    search_path: RefCell<Vec<VPath>>,
    bindings: RefCell<IndexMap<String, Value>>,
    subscribers: RefCell<Vec<(EventKind, Subscriber)>>,
    module_stack: RefCell<Vec<Rc<Module>>>,
    main_module: RefCell<Option<Rc<Module>>>,
    options: RefCell<IndexMap<String, Value>>,
    resolve_memo: RefCell<FxHashMap<(String, String), String>>,
    snapshot: RefCell<Option<EnterSnapshot>>,
    current_dir: VPath,
    isolated: bool,
    entered: Cell<bool>,
}

thread_local! {
    // Weak entries so a dropped Context cannot be kept alive by the stack.
    static CONTEXT_STACK: RefCell<Vec<std::rc::Weak<Context>>> =
        const { RefCell::new(Vec::new()) };
}

impl Context {
    pub fn new(options: ContextOptions) -> Rc<Context> {
        let current_dir = options
            .current_dir
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        Rc::new(Context {
            resolvers: RefCell::new(vec![
                Rc::new(BindingResolver) as Rc<dyn Resolver>,
                Rc::new(FsResolver),
                Rc::new(NullResolver),
            ]),
            loaders: RefCell::new(vec![
                Rc::new(SourceLoader) as Rc<dyn Loader>,
                Rc::new(BytecacheLoader),
                Rc::new(JsonLoader),
            ]),
            modules: RefCell::new(FxHashMap::default()),
            packages: RefCell::new(FxHashMap::default()),
            package_extensions: RefCell::new(FxHashMap::default()),
            file_extensions: RefCell::new(FxHashMap::default()),
            search_path: RefCell::new(Vec::new()),
            bindings: RefCell::new(IndexMap::new()),
            subscribers: RefCell::new(Vec::new()),
            module_stack: RefCell::new(Vec::new()),
            main_module: RefCell::new(None),
            options: RefCell::new(IndexMap::new()),
            resolve_memo: RefCell::new(FxHashMap::default()),
            snapshot: RefCell::new(None),
            current_dir: VPath::local(current_dir).lexical(),
            isolated: options.isolated,
            entered: Cell::new(false),
        })
    }

    /// The innermost entered Context on this thread.
    pub fn current() -> Option<Rc<Context>> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            while let Some(last) = stack.last() {
                match last.upgrade() {
                    Some(ctx) => return Some(ctx),
                    None => {
                        stack.pop();
                    }
                }
            }
            None
        })
    }

    pub fn current_dir(&self) -> &VPath {
        &self.current_dir
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    // ── session lifecycle ───────────────────────────────────────────

    /// Acquire session-global resources: push onto the context stack,
    /// snapshot restorable state, extend the search path with the workspace
    /// and global modules directories, register the built-in bindings.
    /// Fires `enter` after completing.
    pub fn enter(self: &Rc<Self>) {
        if self.entered.replace(true) {
            return;
        }
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Rc::downgrade(self)));

        *self.snapshot.borrow_mut() = Some(EnterSnapshot {
            search_path: self.search_path.borrow().clone(),
            bindings: self.isolated.then(|| self.bindings.borrow().clone()),
            options: self.isolated.then(|| self.options.borrow().clone()),
        });

        {
            let mut sp = self.search_path.borrow_mut();
            sp.push(self.current_dir.join(MODULES_DIR));
            if let Some(global) = global_modules_dir() {
                sp.push(VPath::local(global));
            }
        }

        self.set_binding(
            ext::UNPACK_SYNTAX_ID,
            Value::Extension(Rc::new(RequireUnpackSyntax)),
        );
        self.set_binding(
            ext::IMPORT_SYNTAX_ID,
            Value::Extension(Rc::new(RequireImportSyntax)),
        );

        self.emit(&Event::new(EventKind::Enter, None, None));
    }

    /// Release session-global resources and fire `leave`.
    pub fn leave(self: &Rc<Self>) {
        if !self.entered.replace(false) {
            return;
        }
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack
                .iter()
                .rposition(|c| std::ptr::eq(c.as_ptr(), Rc::as_ptr(self)))
            {
                stack.remove(pos);
            }
        });

        if let Some(snapshot) = self.snapshot.borrow_mut().take() {
            *self.search_path.borrow_mut() = snapshot.search_path;
            if let Some(bindings) = snapshot.bindings {
                *self.bindings.borrow_mut() = bindings;
            }
            if let Some(options) = snapshot.options {
                *self.options.borrow_mut() = options;
            }
        }

        self.emit(&Event::new(EventKind::Leave, None, None));
    }

    // ── events ──────────────────────────────────────────────────────

    pub fn subscribe(&self, kind: EventKind, subscriber: impl Fn(&Event) + 'static) {
        self.subscribers
            .borrow_mut()
            .push((kind, Rc::new(subscriber)));
    }

    pub fn emit(&self, event: &Event) {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .filter(|(kind, _)| *kind == event.kind)
            .map(|(_, s)| s.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(event);
        }
    }

    // ── options and bindings ────────────────────────────────────────

    pub fn option(&self, key: &str) -> Option<Value> {
        self.options.borrow().get(key).cloned()
    }

    pub fn set_option(&self, key: impl Into<String>, value: Value) {
        self.options.borrow_mut().insert(key.into(), value);
    }

    pub fn option_flag(&self, key: &str, default: bool) -> bool {
        self.option(key).map(|v| v.truthy()).unwrap_or(default)
    }

    pub fn binding(&self, name: &str) -> Option<Value> {
        self.bindings.borrow().get(name).cloned()
    }

    pub fn set_binding(&self, name: impl Into<String>, value: Value) {
        self.bindings.borrow_mut().insert(name.into(), value);
    }

    // ── search path ─────────────────────────────────────────────────

    pub fn search_path(&self) -> Vec<VPath> {
        self.search_path.borrow().clone()
    }

    pub fn add_search_path(&self, path: VPath) {
        self.search_path.borrow_mut().push(path);
    }

    // ── main module and module stack ────────────────────────────────

    pub fn main_module(&self) -> Option<Rc<Module>> {
        self.main_module.borrow().clone()
    }

    /// Unconditional assignment, backing `require.main = ...`.
    pub fn set_main_module(&self, module: Option<Rc<Module>>) {
        *self.main_module.borrow_mut() = module;
    }

    /// Claim the main slot for an `is_main` request.
    pub fn claim_main(&self, module: &Rc<Module>) -> Result<()> {
        let mut main = self.main_module.borrow_mut();
        if main.is_some() {
            return Err(Error::load(
                module.filename(),
                "context already has a main module",
            ));
        }
        *main = Some(module.clone());
        Ok(())
    }

    /// Topmost entry of the current-module stack.
    pub fn current_module(&self) -> Option<Rc<Module>> {
        self.module_stack.borrow().last().cloned()
    }

    pub fn is_executing(&self, module: &Rc<Module>) -> bool {
        self.module_stack
            .borrow()
            .iter()
            .any(|m| Rc::ptr_eq(m, module))
    }

    // ── module cache ────────────────────────────────────────────────

    pub fn cached_module(&self, filename: &VPath) -> Option<Rc<Module>> {
        self.modules.borrow().get(&filename.to_string()).cloned()
    }

    pub fn module_cache_pairs(&self) -> Vec<(String, Rc<Module>)> {
        self.modules
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn remove_module(&self, module: &Rc<Module>) {
        self.modules
            .borrow_mut()
            .remove(&module.filename().to_string());
    }

    // ── loaders ─────────────────────────────────────────────────────

    pub fn add_loader(&self, loader: Rc<dyn Loader>) {
        self.loaders.borrow_mut().push(loader);
    }

    pub fn add_resolver(&self, resolver: Rc<dyn Resolver>) {
        self.resolvers.borrow_mut().push(resolver);
    }

    /// Every registered suffix, in loader registration order. Probing tries
    /// them in this order, so earlier loaders shadow later ones when several
    /// candidate files exist.
    pub fn loader_suffixes(&self) -> Vec<String> {
        let mut suffixes: Vec<String> = Vec::new();
        for loader in self.loaders.borrow().iter() {
            for suffix in loader.suffixes() {
                if !suffixes.iter().any(|s| s == suffix) {
                    suffixes.push(suffix.to_string());
                }
            }
        }
        suffixes
    }

    /// Pick the loader for a resolved path: the request's explicit hint, or
    /// the claiming loader with the most specific (longest) suffix.
    fn loader_for(&self, path: &VPath, request: &Request) -> Result<Rc<dyn Loader>> {
        let loaders = self.loaders.borrow();
        if let Some(hint) = &request.loader_hint {
            return loaders
                .iter()
                .find(|l| l.name() == hint)
                .cloned()
                .ok_or_else(|| Error::load(path, format!("unknown loader '{}'", hint)));
        }
        loaders
            .iter()
            .filter(|l| l.can_load(path))
            .max_by_key(|l| {
                l.suffixes()
                    .iter()
                    .map(|s| s.len())
                    .max()
                    .unwrap_or(0)
            })
            .cloned()
            .ok_or_else(|| {
                Error::load(
                    path,
                    format!(
                        "no loader for suffix '{}'",
                        path.suffix().unwrap_or_default()
                    ),
                )
            })
    }

    // ── resolution ──────────────────────────────────────────────────

    /// Drive the resolver chain. `fresh` bypasses the module cache for the
    /// memoized target, forcing a re-load.
    pub fn resolve_request(self: &Rc<Self>, request: &Request, fresh: bool) -> Result<Rc<Module>> {
        let memo_key = (request.current_dir.to_string(), request.string.clone());
        if let Some(cache_key) = self.resolve_memo.borrow().get(&memo_key).cloned() {
            if fresh {
                self.modules.borrow_mut().remove(&cache_key);
            } else if let Some(module) = self.modules.borrow().get(&cache_key) {
                return Ok(module.clone());
            }
        }

        let resolvers = self.resolvers.borrow().clone();
        let mut tried = Vec::new();
        for resolver in &resolvers {
            if let Some(module) = resolver.resolve(self, request, &mut tried)? {
                self.resolve_memo
                    .borrow_mut()
                    .insert(memo_key, module.filename().to_string());
                return Ok(module);
            }
        }
        Err(Error::Resolve {
            request: request.string.clone(),
            tried,
        })
    }

    /// Instantiate (or return the cached) module for a resolved path.
    /// Inserted into the cache before anything executes it.
    pub fn module_for_path(self: &Rc<Self>, path: &VPath, request: &Request) -> Result<Rc<Module>> {
        let canonical = path.lexical();
        let key = canonical.to_string();
        if let Some(module) = self.modules.borrow().get(&key) {
            return Ok(module.clone());
        }

        let loader = self.loader_for(&canonical, request)?;
        self.emit(&Event::new(
            EventKind::Load,
            None,
            Some(request.string.clone()),
        ));

        let module = loader.load(self, &canonical, request)?;
        {
            let mut cache = self.modules.borrow_mut();
            if let Some(existing) = cache.get(&key) {
                return Ok(existing.clone());
            }
            cache.insert(key, module.clone());
        }

        self.dispatch_module_loaded(&module);
        Ok(module)
    }

    /// Synthesize a module for a `!binding` request.
    pub fn binding_module(
        self: &Rc<Self>,
        name: &str,
        value: Value,
        request: &Request,
    ) -> Result<Rc<Module>> {
        let filename = VPath::url(format!("nodus-binding:{}", name));
        if let Some(module) = self.cached_module(&filename) {
            return Ok(module);
        }
        let module = Module::new(self, filename.clone(), filename.clone(), request.copy(), None);
        module.namespace().set("exports", value);
        module.mark_executed(None);
        self.modules
            .borrow_mut()
            .insert(filename.to_string(), module.clone());
        Ok(module)
    }

    // ── execution ───────────────────────────────────────────────────

    /// Execute a loaded module inside its namespace. Re-entrant requires of
    /// a module that is mid-execution see its partial namespace. A raising
    /// module is evicted from the cache so a retry can re-load it.
    pub fn exec_module(self: &Rc<Self>, module: &Rc<Module>) -> Result<()> {
        if module.executed() || self.is_executing(module) {
            return Ok(());
        }
        let artifact = module
            .artifact()
            .ok_or_else(|| Error::load(module.filename(), "module has no artifact"))?;

        let ns = module.namespace();
        ns.set(
            "require",
            Value::Require(Require::for_module(self, module)),
        );
        ns.set("module", Value::Module(module.clone()));
        ns.set("__directory__", Value::str(module.directory().to_string()));
        for (name, value) in engine::standard_builtins() {
            ns.set(name, value);
        }
        for ext in self.active_extensions(module) {
            for (name, value) in ext.namespace_symbols(module) {
                ns.set(name, value);
            }
        }
        if module.is_main() && self.option_flag(OPT_PYMAIN, false) {
            ns.set("__name__", Value::str("__main__"));
        }

        tracing::debug!(module = %module.filename(), "executing");
        self.module_stack.borrow_mut().push(module.clone());
        let result = match artifact {
            Artifact::Program(program) => engine::execute(&program, ns)
                .map_err(|e| Error::Exec(e.with_file(&module.filename().to_string()))),
            Artifact::Json(value) => {
                ns.set("exports", value);
                Ok(())
            }
        };
        self.module_stack.borrow_mut().pop();

        match result {
            Ok(()) => {
                module.mark_executed(module.real_filename().mtime());
                Ok(())
            }
            Err(err) => {
                self.remove_module(module);
                Err(err)
            }
        }
    }

    // ── packages ────────────────────────────────────────────────────

    /// The package rooted exactly at `dir`, loading and caching it.
    pub fn package_for_root(self: &Rc<Self>, dir: &VPath) -> Result<Rc<Package>> {
        let canonical = dir.resolve(false)?;
        let key = canonical.to_string();
        if let Some(pkg) = self.packages.borrow().get(&key) {
            return Ok(pkg.clone());
        }
        let pkg = Package::load(&canonical)?;
        self.packages.borrow_mut().insert(key, pkg.clone());
        Ok(pkg)
    }

    /// Resolve `dir`, then walk upward until a manifest is found or the
    /// filesystem root is reached.
    pub fn package_for_directory(self: &Rc<Self>, dir: &VPath) -> Result<Option<Rc<Package>>> {
        let mut current = Some(dir.resolve(false)?);
        while let Some(dir) = current {
            if dir.join(MANIFEST_FILENAME).is_file() {
                return self.package_for_root(&dir).map(Some);
            }
            current = dir.parent().filter(|p| p != &dir);
        }
        Ok(None)
    }

    // ── extension dispatch ──────────────────────────────────────────

    /// Resolve one extension request to a native extension handle. Bare ids
    /// naming a registered binding resolve as `!id`.
    fn resolve_extension(self: &Rc<Self>, request: &str) -> Result<Rc<dyn Extension>> {
        let request = if !request.starts_with('!') && self.binding(request).is_some() {
            format!("!{}", request)
        } else {
            request.to_string()
        };
        let require = self.require_root();
        let module = require.load_module(&request)?;
        match module.exported() {
            Value::Extension(ext) => Ok(ext),
            other => Err(Error::load(
                request,
                format!("extension module exported {}, not an extension", other.type_name()),
            )),
        }
    }

    /// The extensions active for a package, resolving its manifest entries
    /// on first use and firing `init_extension`.
    pub fn package_extensions(
        self: &Rc<Self>,
        package: &Rc<Package>,
    ) -> Result<Vec<Rc<dyn Extension>>> {
        let key = package.root().to_string();
        if package.extensions_loaded() {
            return Ok(self
                .package_extensions
                .borrow()
                .get(&key)
                .cloned()
                .unwrap_or_default());
        }
        // Mark first: an extension living inside its own package must not
        // recurse into this resolution.
        package.mark_extensions_loaded();

        let mut extensions = Vec::new();
        for request in &package.manifest().extensions {
            let ext = self.resolve_extension(request)?;
            ext.init_extension(package);
            extensions.push(ext);
        }
        self.package_extensions
            .borrow_mut()
            .insert(key, extensions.clone());
        Ok(extensions)
    }

    /// Run the preprocess chain for a source file: package extensions in
    /// manifest order, then file-comment extensions for this file only.
    pub fn preprocess(
        self: &Rc<Self>,
        package: Option<&Rc<Package>>,
        filename: &VPath,
        source: String,
    ) -> Result<String> {
        let mut chain: Vec<Rc<dyn Extension>> = Vec::new();
        if let Some(pkg) = package {
            chain.extend(self.package_extensions(pkg)?);
        }

        let mut file_scope = Vec::new();
        for id in ext::comment_extensions(&source) {
            let ext = self.resolve_extension(&id)?;
            file_scope.push(ext.clone());
            chain.push(ext);
        }
        if !file_scope.is_empty() {
            self.file_extensions
                .borrow_mut()
                .insert(filename.lexical().to_string(), file_scope);
        }

        let mut out = source;
        for ext in &chain {
            out = ext.preprocess_source(package, filename, out)?;
        }
        Ok(out)
    }

    /// Package extensions plus the file-scoped ones, in registration order.
    fn active_extensions(self: &Rc<Self>, module: &Rc<Module>) -> Vec<Rc<dyn Extension>> {
        let mut chain: Vec<Rc<dyn Extension>> = Vec::new();
        if let Some(pkg) = module.package() {
            if let Some(exts) = self
                .package_extensions
                .borrow()
                .get(&pkg.root().to_string())
            {
                chain.extend(exts.iter().cloned());
            }
        }
        if let Some(exts) = self
            .file_extensions
            .borrow()
            .get(&module.filename().to_string())
        {
            chain.extend(exts.iter().cloned());
        }
        chain
    }

    fn dispatch_module_loaded(self: &Rc<Self>, module: &Rc<Module>) {
        for ext in self.active_extensions(module) {
            ext.module_loaded(module);
        }
    }

    // ── require construction ────────────────────────────────────────

    /// A require capability not owned by any module, for embedding and the
    /// CLI entry path.
    pub fn require_root(self: &Rc<Self>) -> Rc<Require> {
        Require::new(self, None)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Break namespace → module reference cycles so cached modules free
        // with the Context.
        for module in self.modules.borrow().values() {
            module.namespace().clear();
        }
        // Destruction tears the session down if the owner forgot to leave().
        if self.entered.get() {
            CONTEXT_STACK.with(|stack| {
                let mut stack = stack.borrow_mut();
                if let Some(pos) = stack
                    .iter()
                    .rposition(|c| std::ptr::eq(c.as_ptr(), self as *const _))
                {
                    stack.remove(pos);
                }
            });
            self.emit(&Event::new(EventKind::Leave, None, None));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_extends_search_path_and_leave_restores() {
        let ctx = Context::new(ContextOptions::default());
        let before = ctx.search_path().len();
        ctx.enter();
        assert!(ctx.search_path().len() > before);
        assert!(ctx.binding(ext::IMPORT_SYNTAX_ID).is_some());
        assert!(Context::current().is_some());
        ctx.leave();
        assert_eq!(ctx.search_path().len(), before);
        assert!(Context::current().is_none());
    }

    #[test]
    fn test_isolated_context_restores_bindings() {
        let ctx = Context::new(ContextOptions {
            isolated: true,
            ..Default::default()
        });
        ctx.enter();
        ctx.set_binding("session-only", Value::Number(1.0));
        ctx.leave();
        assert!(ctx.binding("session-only").is_none());
    }

    #[test]
    fn test_events_fire_in_registration_order() {
        let ctx = Context::new(ContextOptions::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let log = log.clone();
            ctx.subscribe(EventKind::Enter, move |_| {
                log.borrow_mut().push(tag);
            });
        }
        ctx.enter();
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        ctx.leave();
    }

    #[test]
    fn test_loader_suffixes_in_registration_order() {
        let ctx = Context::new(ContextOptions::default());
        let suffixes = ctx.loader_suffixes();
        assert_eq!(suffixes, vec![".ns", ".nsc", ".json"]);
    }

    #[test]
    fn test_claim_main_rejects_second_claim() {
        let ctx = Context::new(ContextOptions::default());
        let request = Request::new("a", ctx.current_dir().clone(), vec![]);
        let a = Module::new(
            &ctx,
            VPath::local("/ws/a.ns"),
            VPath::local("/ws/a.ns"),
            request.copy(),
            None,
        );
        let b = Module::new(
            &ctx,
            VPath::local("/ws/b.ns"),
            VPath::local("/ws/b.ns"),
            request,
            None,
        );
        ctx.claim_main(&a).unwrap();
        assert!(ctx.claim_main(&b).is_err());
        // Direct assignment stays allowed.
        ctx.set_main_module(Some(b));
    }

    #[test]
    fn test_option_flags() {
        let ctx = Context::new(ContextOptions::default());
        assert!(ctx.option_flag("bytecache.write", true));
        ctx.set_option(OPT_AUTORELOAD, Value::Bool(true));
        assert!(ctx.option_flag(OPT_AUTORELOAD, false));
    }
}
