//! In-memory representation of an executable artifact
//!
//! A [`Module`] is created by a loader on first resolution, inserted into the
//! Context cache *before* execution (so cyclic `require` observes the
//! partially-populated namespace), and removed again if execution raises.

use crate::context::Context;
use crate::engine::{Program, Value};
use crate::package::Package;
use crate::resolve::Request;
use crate::vpath::VPath;
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::SystemTime;

/// The execution scope of a module: an ordered name → value map shared with
/// every `Value::Object` handle pointing at it.
#[derive(Clone)]
pub struct Namespace(Rc<RefCell<IndexMap<String, Value>>>);

impl Namespace {
    pub fn new() -> Self {
        Namespace(Rc::new(RefCell::new(IndexMap::new())))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(name.into(), value);
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Symbols eligible for star-imports: everything not underscore-prefixed.
    pub fn public_pairs(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// A `Value::Object` sharing this namespace's backing store.
    pub fn object_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Drop every symbol. The Context uses this at teardown to break the
    /// `namespace → module → namespace` reference cycles that the injected
    /// `module` symbol creates.
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Namespace::new()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({} symbols)", self.len())
    }
}

/// The loadable artifact a loader attaches to a module.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// Compiled dialect source.
    Program(Program),
    /// A parsed JSON document; the module's exported value.
    Json(Value),
}

/// One executable artifact, cached per canonical filename per Context.
pub struct Module {
    filename: VPath,
    real_filename: VPath,
    request: Request,
    package: RefCell<Option<Weak<Package>>>,
    context: Weak<Context>,
    namespace: Namespace,
    artifact: RefCell<Option<Artifact>>,
    exec_mtime: Cell<Option<SystemTime>>,
}

impl Module {
    pub fn new(
        context: &Rc<Context>,
        filename: VPath,
        real_filename: VPath,
        request: Request,
        package: Option<&Rc<Package>>,
    ) -> Rc<Module> {
        Rc::new(Module {
            filename,
            real_filename,
            request,
            package: RefCell::new(package.map(Rc::downgrade)),
            context: Rc::downgrade(context),
            namespace: Namespace::new(),
            artifact: RefCell::new(None),
            exec_mtime: Cell::new(None),
        })
    }

    /// Canonical filename; the module-cache key.
    pub fn filename(&self) -> &VPath {
        &self.filename
    }

    /// Filename after link-file indirection.
    pub fn real_filename(&self) -> &VPath {
        &self.real_filename
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn is_main(&self) -> bool {
        self.request.is_main
    }

    pub fn package(&self) -> Option<Rc<Package>> {
        self.package.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub fn set_package(&self, package: &Rc<Package>) {
        *self.package.borrow_mut() = Some(Rc::downgrade(package));
    }

    pub fn context(&self) -> Option<Rc<Context>> {
        self.context.upgrade()
    }

    /// Parent module, derived from the request that produced this one.
    pub fn parent(&self) -> Option<Rc<Module>> {
        self.request.parent.clone()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Directory containing the real file; what `__directory__` exposes.
    pub fn directory(&self) -> VPath {
        self.real_filename
            .parent()
            .unwrap_or_else(|| self.real_filename.clone())
    }

    pub fn artifact(&self) -> Option<Artifact> {
        self.artifact.borrow().clone()
    }

    pub fn set_artifact(&self, artifact: Artifact) {
        *self.artifact.borrow_mut() = Some(artifact);
    }

    /// The value `require` hands back: the namespace's `exports` member when
    /// present, the namespace itself otherwise.
    pub fn exported(&self) -> Value {
        self.namespace
            .get("exports")
            .unwrap_or_else(|| self.namespace.object_value())
    }

    /// A module is "executed" once its exec mtime is set.
    pub fn executed(&self) -> bool {
        self.exec_mtime.get().is_some()
    }

    pub fn exec_mtime(&self) -> Option<SystemTime> {
        self.exec_mtime.get()
    }

    pub fn mark_executed(&self, source_mtime: Option<SystemTime>) {
        self.exec_mtime
            .set(Some(source_mtime.unwrap_or_else(SystemTime::now)));
    }

    /// Forget execution state; used by `require.autoreload`.
    pub fn mark_stale(&self) {
        self.exec_mtime.set(None);
    }

    /// Whether the artifact on disk is newer than the last execution.
    pub fn is_outdated(&self) -> bool {
        match (self.exec_mtime.get(), self.real_filename.mtime()) {
            (Some(executed), Some(on_disk)) => on_disk > executed,
            _ => false,
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("filename", &self.filename.to_string())
            .field("executed", &self.executed())
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_shares_backing_store() {
        let ns = Namespace::new();
        let handle = ns.object_value();
        ns.set("x", Value::Number(1.0));
        assert_eq!(handle.get_attr("x"), Some(Value::Number(1.0)));
        handle.set_attr("y", Value::Number(2.0));
        assert!(ns.has("y"));
    }

    #[test]
    fn test_public_pairs_hide_underscored() {
        let ns = Namespace::new();
        ns.set("visible", Value::Number(1.0));
        ns.set("_hidden", Value::Number(2.0));
        ns.set("__directory__", Value::str("/tmp"));
        let names: Vec<_> = ns.public_pairs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["visible"]);
    }
}
