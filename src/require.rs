//! The per-module `require` capability
//!
//! Each module executes with its own `Require` value closed over the owning
//! module's location (weakly, per the ownership model). The capability
//! exposes resolution, loading, the cache view, main-module control and the
//! star/selective import sugar.

use crate::context::{Context, Event, EventKind, OPT_AUTORELOAD};
use crate::engine::Value;
use crate::error::{Error, Result};
use crate::module::{Module, Namespace};
use crate::resolve::Request;
use crate::vpath::VPath;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Options mirroring the keyword surface of `require(...)`.
#[derive(Debug, Clone)]
pub struct RequireOptions {
    /// Override the resolution base directory.
    pub current_dir: Option<VPath>,
    /// Resolve as the Context's entry module.
    pub is_main: bool,
    /// Reuse the module cache; `false` forces a fresh load.
    pub cache: bool,
    /// Return the exported value (`true`) or the module handle (`false`).
    pub exports: bool,
    /// Execute after loading.
    pub exec: bool,
    /// Copy the returned namespace's public symbols into this object.
    pub into: Option<Value>,
    /// Restrict the copy to these names.
    pub symbols: Option<Vec<String>>,
    /// Explicit loader id overriding suffix detection.
    pub loader: Option<String>,
}

impl Default for RequireOptions {
    fn default() -> Self {
        RequireOptions {
            current_dir: None,
            is_main: false,
            cache: true,
            exports: true,
            exec: true,
            into: None,
            symbols: None,
            loader: None,
        }
    }
}

/// The capability object itself.
pub struct Require {
    context: Weak<Context>,
    owner: Weak<Module>,
    /// Per-require search path additions, consulted before the Context's.
    path: RefCell<Vec<VPath>>,
}

impl Require {
    pub fn new(context: &Rc<Context>, owner: Option<&Rc<Module>>) -> Rc<Require> {
        Rc::new(Require {
            context: Rc::downgrade(context),
            owner: owner.map(Rc::downgrade).unwrap_or_default(),
            path: RefCell::new(Vec::new()),
        })
    }

    pub fn for_module(context: &Rc<Context>, module: &Rc<Module>) -> Rc<Require> {
        Require::new(context, Some(module))
    }

    pub fn context(&self) -> Option<Rc<Context>> {
        self.context.upgrade()
    }

    /// The module owning this capability; `None` for the root require.
    pub fn owner(&self) -> Option<Rc<Module>> {
        self.owner.upgrade()
    }

    fn ctx(&self) -> Result<Rc<Context>> {
        self.context
            .upgrade()
            .ok_or_else(|| Error::load("<require>", "context has been dropped"))
    }

    // ── search path additions ───────────────────────────────────────

    pub fn path(&self) -> Vec<VPath> {
        self.path.borrow().clone()
    }

    pub fn add_path(&self, path: VPath) {
        self.path.borrow_mut().push(path);
    }

    // ── the require contract ────────────────────────────────────────

    pub fn require(&self, request: &str) -> Result<Value> {
        self.require_with(request, RequireOptions::default())
    }

    pub fn require_with(&self, request: &str, opts: RequireOptions) -> Result<Value> {
        let ctx = self.ctx()?;
        ctx.emit(&Event::new(
            EventKind::Require,
            self.owner(),
            Some(request.to_string()),
        ));

        if opts.is_main && ctx.main_module().is_some() {
            return Err(Error::load(request, "context already has a main module"));
        }

        let module = self.locate(&ctx, request, &opts)?;

        if opts.is_main {
            ctx.claim_main(&module)?;
        }
        if opts.exec {
            ctx.exec_module(&module)?;
        }

        if let Some(into) = &opts.into {
            self.copy_symbols(&module, into, opts.symbols.as_deref())?;
        }

        if opts.exports {
            Ok(module.exported())
        } else {
            Ok(Value::Module(module))
        }
    }

    /// `require(..., exports=false)` convenience: the module handle.
    pub fn load_module(&self, request: &str) -> Result<Rc<Module>> {
        match self.require_with(
            request,
            RequireOptions {
                exports: false,
                ..Default::default()
            },
        )? {
            Value::Module(module) => Ok(module),
            other => Err(Error::load(
                request,
                format!("expected a module handle, got {}", other.type_name()),
            )),
        }
    }

    /// Resolve without executing; the canonical filename of the target.
    pub fn resolve(&self, request: &str) -> Result<VPath> {
        let ctx = self.ctx()?;
        let req = self.build_request(&ctx, request, &RequireOptions::default());
        let module = ctx.resolve_request(&req, false)?;
        Ok(module.filename().clone())
    }

    // ── cache and main views ────────────────────────────────────────

    pub fn main(&self) -> Option<Rc<Module>> {
        self.context().and_then(|ctx| ctx.main_module())
    }

    /// `require.main` is assignable.
    pub fn set_main(&self, module: Option<Rc<Module>>) {
        if let Some(ctx) = self.context() {
            ctx.set_main_module(module);
        }
    }

    /// Detach the main module, returning the previous holder.
    pub fn detach_main(&self) -> Option<Rc<Module>> {
        let ctx = self.context()?;
        let previous = ctx.main_module();
        ctx.set_main_module(None);
        previous
    }

    /// Temporarily detach main; restored when the guard drops.
    pub fn hide_main(&self) -> MainGuard {
        MainGuard {
            context: self.context.clone(),
            previous: self.detach_main(),
        }
    }

    /// Topmost entry of the current-module stack.
    pub fn current(&self) -> Option<Rc<Module>> {
        self.context().and_then(|ctx| ctx.current_module())
    }

    /// Snapshot of the module cache (canonical filename → module).
    pub fn cache_pairs(&self) -> Vec<(String, Rc<Module>)> {
        self.context()
            .map(|ctx| ctx.module_cache_pairs())
            .unwrap_or_default()
    }

    /// Copy a required module's public symbols into `scope` (star import).
    pub fn star_import(&self, request: &str, scope: &Namespace) -> Result<()> {
        let ctx = self.ctx()?;
        let module = self.locate(&ctx, request, &RequireOptions::default())?;
        ctx.exec_module(&module)?;
        self.copy_symbols(&module, &scope.object_value(), None)
    }

    // ── internals ───────────────────────────────────────────────────

    fn build_request(&self, ctx: &Rc<Context>, request: &str, opts: &RequireOptions) -> Request {
        let current_dir = opts
            .current_dir
            .clone()
            .or_else(|| self.owner().map(|m| m.directory()))
            .unwrap_or_else(|| ctx.current_dir().clone());

        let mut search_path = self.path.borrow().clone();
        // A package's vendor directories are visible to its own modules.
        if let Some(pkg) = self.owner().and_then(|m| m.package()) {
            search_path.extend(pkg.vendor_directories());
        }
        search_path.extend(ctx.search_path());

        let mut req = Request::new(request, current_dir, search_path);
        req.parent = self.owner();
        req.is_main = opts.is_main;
        req.loader_hint = opts.loader.clone();
        req
    }

    fn locate(
        &self,
        ctx: &Rc<Context>,
        request: &str,
        opts: &RequireOptions,
    ) -> Result<Rc<Module>> {
        let req = self.build_request(ctx, request, opts);
        let module = ctx.resolve_request(&req, !opts.cache)?;

        // Autoreload: a cached module whose source moved on re-executes.
        if opts.cache
            && ctx.option_flag(OPT_AUTORELOAD, false)
            && module.executed()
            && module.is_outdated()
        {
            tracing::debug!(module = %module.filename(), "autoreload");
            return ctx.resolve_request(&req, true);
        }
        Ok(module)
    }

    fn copy_symbols(
        &self,
        module: &Rc<Module>,
        into: &Value,
        symbols: Option<&[String]>,
    ) -> Result<()> {
        if !matches!(into, Value::Object(_)) {
            return Err(Error::load(
                module.filename(),
                format!("cannot import into a {}", into.type_name()),
            ));
        }

        let source = match module.exported() {
            Value::Object(obj) => Value::Object(obj),
            // Scalar exports cannot be unpacked; fall back to the namespace.
            _ => module.namespace().object_value(),
        };

        match symbols {
            Some(names) => {
                for name in names {
                    let value = source.get_attr(name).ok_or_else(|| {
                        Error::load(
                            module.filename(),
                            format!("module does not define '{}'", name),
                        )
                    })?;
                    into.set_attr(name, value);
                }
            }
            None => {
                if let Value::Object(obj) = &source {
                    // Collect first: a cyclic star-import can make `into`
                    // and the source share one backing store.
                    let pairs: Vec<(String, Value)> = obj
                        .borrow()
                        .iter()
                        .filter(|(name, _)| !name.starts_with('_'))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    for (name, value) in pairs {
                        into.set_attr(&name, value);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Restores the previously-detached main module on drop.
pub struct MainGuard {
    context: Weak<Context>,
    previous: Option<Rc<Module>>,
}

impl Drop for MainGuard {
    fn drop(&mut self) {
        if let Some(ctx) = self.context.upgrade() {
            ctx.set_main_module(self.previous.take());
        }
    }
}
