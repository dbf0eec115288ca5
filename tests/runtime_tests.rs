//! End-to-end tests of the resolver, loaders, require contract and
//! extension dispatch, driven through the library API the CLI uses.

mod common;

use common::{context_at, write};
use nodus::engine::Value;
use nodus::require::RequireOptions;
use nodus::{Error, MODULES_DIR};
use std::rc::Rc;
use tempfile::tempdir;

#[test]
fn test_relative_require_between_siblings() {
    let ws = tempdir().unwrap();
    write(
        ws.path(),
        "a/index.ns",
        "b = require('./b')\nassert(b.x == 1)\nexports = {b: b}\n",
    );
    write(ws.path(), "a/b.ns", "exports = {x: 1}\n");

    let ctx = context_at(ws.path());
    let require = ctx.require_root();
    let value = require
        .require_with(
            "a/index",
            RequireOptions {
                is_main: true,
                ..Default::default()
            },
        )
        .unwrap();
    let b = value.get_attr("b").unwrap();
    assert_eq!(b.get_attr("x"), Some(Value::Number(1.0)));
    ctx.leave();
}

#[test]
fn test_resolve_root_shifts_in_package_requests() {
    let ws = tempdir().unwrap();
    write(
        ws.path(),
        "p/nodus.json",
        r#"{"name":"p","version":"1.0.0","main":"lib/m.ns","resolve_root":"lib"}"#,
    );
    write(ws.path(), "p/lib/m.ns", "u = require('./u')\nexports = {u: u}\n");
    write(ws.path(), "p/lib/u.ns", "exports = {x: 2}\n");

    let ctx = context_at(ws.path());
    let require = ctx.require_root();
    let module = require.load_module("./p").unwrap();
    assert!(module.filename().to_string().ends_with("lib/m.ns"));
    assert_eq!(
        module.exported().get_attr("u").unwrap().get_attr("x"),
        Some(Value::Number(2.0))
    );

    // Every module under the resolve_root belongs to the package.
    let pkg = module.package().unwrap();
    assert_eq!(pkg.name(), "p");
    let u = require
        .load_module(&format!("{}/lib/u.ns", ws.path().join("p").display()))
        .unwrap();
    assert!(Rc::ptr_eq(&u.package().unwrap(), &pkg));
    ctx.leave();
}

#[test]
fn test_circular_requires_observe_partial_namespaces() {
    let ws = tempdir().unwrap();
    write(
        ws.path(),
        "a.ns",
        "exports = {from_a: 1}\nb = require('./b')\nassert(b)\nassert(b.from_b == 2)\n",
    );
    write(
        ws.path(),
        "b.ns",
        "exports = {from_b: 2}\na = require('./a')\nassert(a)\nassert(a.from_a == 1)\n",
    );

    let ctx = context_at(ws.path());
    let value = ctx.require_root().require("./a").unwrap();
    assert_eq!(value.get_attr("from_a"), Some(Value::Number(1.0)));
    ctx.leave();
}

#[test]
fn test_package_link_resolves_siblings_in_target() {
    let ws = tempdir().unwrap();
    let target = tempdir().unwrap();
    write(
        target.path(),
        "nodus.json",
        r#"{"name":"linked","version":"0.1.0"}"#,
    );
    write(
        target.path(),
        "index.ns",
        "s = require('./sibling')\nexports = {tag: s.tag}\n",
    );
    write(target.path(), "sibling.ns", "exports = {tag: 'target'}\n");

    // The link file stands in for the package directory.
    write(
        ws.path(),
        &format!("{}/linked.nodepy-link", MODULES_DIR),
        &format!("{}\n", target.path().display()),
    );
    // A decoy sibling at the link site must not win.
    write(ws.path(), "sibling.ns", "exports = {tag: 'link-site'}\n");

    let ctx = context_at(ws.path());
    let value = ctx.require_root().require("linked").unwrap();
    assert_eq!(value.get_attr("tag"), Some(Value::str("target")));
    ctx.leave();
}

#[test]
fn test_import_syntax_extension_from_file_comment() {
    let ws = tempdir().unwrap();
    write(ws.path(), "lib.ns", "exports = {a: 10, b: 20}\n");
    write(
        ws.path(),
        "main.ns",
        "# nodepy-extensions: require-import-syntax\n\
         import {a, b as beta} from './lib'\n\
         assert(a == 10)\n\
         assert(beta == 20)\n\
         exports = {sum_parts: [a, beta]}\n",
    );

    let ctx = context_at(ws.path());
    let value = ctx.require_root().require("./main").unwrap();
    assert!(value.get_attr("sum_parts").is_some());
    ctx.leave();
}

#[test]
fn test_unpack_syntax_extension_from_manifest() {
    let ws = tempdir().unwrap();
    write(
        ws.path(),
        "pkg/nodus.json",
        r#"{"name":"pkg","version":"1.0.0","extensions":["!require-unpack-syntax"]}"#,
    );
    write(ws.path(), "pkg/lib.ns", "exports = {x: 7}\n");
    write(
        ws.path(),
        "pkg/index.ns",
        "{x} = require('./lib')\nassert(x == 7)\nexports = {x: x}\n",
    );

    let ctx = context_at(ws.path());
    let value = ctx.require_root().require("./pkg").unwrap();
    assert_eq!(value.get_attr("x"), Some(Value::Number(7.0)));
    ctx.leave();
}

#[test]
fn test_vendor_directories_searched_for_package_modules() {
    let ws = tempdir().unwrap();
    write(
        ws.path(),
        "pkg/nodus.json",
        r#"{"name":"pkg","version":"1.0.0","vendor-directories":["vendor"]}"#,
    );
    write(
        ws.path(),
        "pkg/vendor/third/index.ns",
        "exports = {ok: true}\n",
    );
    write(
        ws.path(),
        "pkg/index.ns",
        "t = require('third')\nexports = {ok: t.ok}\n",
    );

    let ctx = context_at(ws.path());
    let value = ctx.require_root().require("./pkg").unwrap();
    assert_eq!(value.get_attr("ok"), Some(Value::Bool(true)));
    ctx.leave();
}

#[test]
fn test_binding_requests() {
    let ws = tempdir().unwrap();
    let ctx = context_at(ws.path());
    ctx.set_binding("answer", Value::Number(42.0));

    write(ws.path(), "main.ns", "a = require('!answer')\nexports = {a: a}\n");
    let value = ctx.require_root().require("./main").unwrap();
    assert_eq!(value.get_attr("a"), Some(Value::Number(42.0)));

    let err = ctx.require_root().require("!missing").unwrap_err();
    assert!(matches!(err, Error::NoSuchBinding(name) if name == "missing"));
    ctx.leave();
}

#[test]
fn test_bytecache_written_and_preferred() {
    let ws = tempdir().unwrap();
    write(ws.path(), "mod.ns", "exports = {v: 1}\n");

    let ctx = context_at(ws.path());
    ctx.require_root().require("./mod").unwrap();
    ctx.leave();

    let cache = ws.path().join("mod.nsc");
    assert!(cache.is_file(), "bytecache written next to the source");

    // A fresh session loads through the cache transparently.
    let ctx = context_at(ws.path());
    let value = ctx.require_root().require("./mod").unwrap();
    assert_eq!(value.get_attr("v"), Some(Value::Number(1.0)));

    // An unreadable/garbage cache is skipped, not fatal.
    std::fs::write(&cache, b"not a cache file").unwrap();
    let ctx2 = context_at(ws.path());
    let value = ctx2.require_root().require("./mod").unwrap();
    assert_eq!(value.get_attr("v"), Some(Value::Number(1.0)));
    ctx2.leave();
    ctx.leave();
}

#[test]
fn test_modules_dir_on_search_path() {
    let ws = tempdir().unwrap();
    write(
        ws.path(),
        &format!("{}/dep/nodus.json", MODULES_DIR),
        r#"{"name":"dep","version":"1.0.0"}"#,
    );
    write(
        ws.path(),
        &format!("{}/dep/index.ns", MODULES_DIR),
        "exports = {ok: true}\n",
    );
    write(ws.path(), "main.ns", "d = require('dep')\nexports = {ok: d.ok}\n");

    let ctx = context_at(ws.path());
    let value = ctx.require_root().require("./main").unwrap();
    assert_eq!(value.get_attr("ok"), Some(Value::Bool(true)));
    ctx.leave();
}

#[test]
fn test_autoreload_reexecutes_changed_module() {
    let ws = tempdir().unwrap();
    write(ws.path(), "live.ns", "exports = {v: 1}\n");

    let ctx = context_at(ws.path());
    ctx.set_option("bytecache.write", Value::Bool(false));
    ctx.set_option("require.autoreload", Value::Bool(true));

    let require = ctx.require_root();
    let first = require.require("./live").unwrap();
    assert_eq!(first.get_attr("v"), Some(Value::Number(1.0)));

    // Nudge the mtime far enough forward to defeat coarse clocks.
    std::thread::sleep(std::time::Duration::from_millis(20));
    write(ws.path(), "live.ns", "exports = {v: 2}\n");
    let future = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
    let file = std::fs::File::options()
        .append(true)
        .open(ws.path().join("live.ns"))
        .unwrap();
    file.set_modified(future).unwrap();

    let second = require.require("./live").unwrap();
    assert_eq!(second.get_attr("v"), Some(Value::Number(2.0)));
    ctx.leave();
}

#[test]
fn test_require_events_fire() {
    let ws = tempdir().unwrap();
    write(ws.path(), "m.ns", "exports = {}\n");

    let ctx = context_at(ws.path());
    let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
    {
        let seen = seen.clone();
        ctx.subscribe(nodus::EventKind::Require, move |event| {
            seen.borrow_mut().push(event.request.clone().unwrap_or_default());
        });
    }
    ctx.require_root().require("./m").unwrap();
    assert_eq!(*seen.borrow(), vec!["./m".to_string()]);
    ctx.leave();
}
