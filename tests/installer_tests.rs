//! End-to-end installer tests: placement, develop links, dist round trips,
//! hooks and the runtime seeing what the installer placed.

mod common;

use common::{context_at, write};
use nodus::engine::Value;
use nodus::manifest::{Manifest, MANIFEST_FILENAME};
use nodus::pm::installer::{
    parse_target, InstallOptions, Installer, InstallTarget, PARTIAL_SENTINEL,
};
use nodus::pm::registry::MemoryRegistry;
use nodus::pm::dist;
use nodus::{Error, LINK_SUFFIX, MODULES_DIR};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Build a real package directory and return its dist archive bytes.
fn packaged(files: &[(&str, &str)], manifest_json: &str) -> (Manifest, Vec<u8>) {
    let dir = tempdir().unwrap();
    let manifest = Manifest::parse(manifest_json).unwrap();
    manifest.save(&dir.path().join(MANIFEST_FILENAME)).unwrap();
    for (rel, contents) in files {
        write(dir.path(), rel, contents);
    }
    let archive = dist::pack(dir.path(), &manifest).unwrap();
    (manifest, fs::read(archive).unwrap())
}

fn file_snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.unwrap();
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .to_string();
            out.push((rel, fs::read(entry.path()).unwrap()));
        }
    }
    out.sort();
    out
}

#[test]
fn test_installed_package_is_requireable() {
    let ws = tempdir().unwrap();
    let registry = MemoryRegistry::new();
    let (manifest, bytes) = packaged(
        &[("index.ns", "exports = {greeting: 'hello'}\n")],
        r#"{"name":"greeter","version":"1.0.0"}"#,
    );
    registry.add_package(manifest, bytes);

    let installer =
        Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();
    installer
        .install(&[parse_target("greeter@1.0.0").unwrap()])
        .unwrap();

    let ctx = context_at(ws.path());
    let value = ctx.require_root().require("greeter").unwrap();
    assert_eq!(value.get_attr("greeting"), Some(Value::str("hello")));
    ctx.leave();
}

#[test]
fn test_develop_install_writes_link_and_runtime_follows_it() {
    let ws = tempdir().unwrap();
    let src = tempdir().unwrap();
    write(
        src.path(),
        MANIFEST_FILENAME,
        r#"{"name":"local","version":"0.1.0"}"#,
    );
    write(src.path(), "index.ns", "exports = {origin: __directory__}\n");

    let registry = MemoryRegistry::new();
    let installer =
        Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();
    installer
        .install(&[InstallTarget::Directory {
            path: src.path().to_path_buf(),
            develop: true,
        }])
        .unwrap();

    // Exactly one link file, no copied tree.
    let link = ws
        .path()
        .join(MODULES_DIR)
        .join(format!("local{}", LINK_SUFFIX));
    assert!(link.is_file());
    assert_eq!(
        fs::read_to_string(&link).unwrap().trim(),
        src.path().to_string_lossy()
    );
    assert!(!ws.path().join(MODULES_DIR).join("local").exists());

    let ctx = context_at(ws.path());
    let value = ctx.require_root().require("local").unwrap();
    let origin = match value.get_attr("origin") {
        Some(Value::Str(s)) => s,
        other => panic!("unexpected origin {:?}", other),
    };
    let canonical_src = fs::canonicalize(src.path()).unwrap();
    assert_eq!(Path::new(&origin), canonical_src.as_path());
    ctx.leave();
}

#[test]
fn test_repeated_install_is_byte_identical() {
    let ws = tempdir().unwrap();
    let registry = MemoryRegistry::new();
    let (manifest, bytes) = packaged(
        &[
            ("index.ns", "exports = {}\n"),
            ("lib/util.ns", "exports = {u: 1}\n"),
        ],
        r#"{"name":"stable","version":"2.0.0","bin":{"stable":"index"}}"#,
    );
    registry.add_package(manifest, bytes);

    let installer =
        Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();
    let target = parse_target("stable").unwrap();

    installer.install(std::slice::from_ref(&target)).unwrap();
    let first = file_snapshot(&ws.path().join(MODULES_DIR));

    installer.install(std::slice::from_ref(&target)).unwrap();
    let second = file_snapshot(&ws.path().join(MODULES_DIR));
    assert_eq!(first, second);
}

#[cfg(unix)]
#[test]
fn test_hook_order_and_partial_sentinel() {
    let ws = tempdir().unwrap();
    let registry = MemoryRegistry::new();
    // pre-install runs against the staged artifact, post-install against
    // the placed tree.
    let (manifest, bytes) = packaged(
        &[("index.ns", "exports = {}\n")],
        r#"{"name":"hooked","version":"1.0.0","scripts":{"pre-install":"!test -f index.ns","post-install":"!test -f installed-files.txt"}}"#,
    );
    registry.add_package(manifest, bytes);

    let installer =
        Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();
    installer.install(&[parse_target("hooked").unwrap()]).unwrap();
    let dest = ws.path().join(MODULES_DIR).join("hooked");
    assert!(!dest.join(PARTIAL_SENTINEL).exists());

    // A failing post-install aborts with the files placed and the sentinel
    // still present.
    let registry = MemoryRegistry::new();
    let (manifest, bytes) = packaged(
        &[("index.ns", "exports = {}\n")],
        r#"{"name":"broken","version":"1.0.0","scripts":{"post-install":"!exit 2"}}"#,
    );
    registry.add_package(manifest, bytes);
    let installer =
        Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();
    let err = installer
        .install(&[parse_target("broken").unwrap()])
        .unwrap_err();
    assert!(matches!(err, Error::HookFailed { .. }));

    let dest = ws.path().join(MODULES_DIR).join("broken");
    assert!(dest.join("index.ns").is_file());
    assert!(dest.join(PARTIAL_SENTINEL).is_file());
}

#[test]
fn test_archive_target_installs() {
    let ws = tempdir().unwrap();
    let (_, bytes) = packaged(
        &[("index.ns", "exports = {}\n")],
        r#"{"name":"fromtar","version":"3.1.0"}"#,
    );
    let archive_path = ws.path().join("fromtar-3.1.0.tar.gz");
    fs::write(&archive_path, &bytes).unwrap();

    let registry = MemoryRegistry::new();
    let installer =
        Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();
    let report = installer
        .install(&[InstallTarget::Archive {
            path: archive_path,
        }])
        .unwrap();
    assert_eq!(report.installed, vec!["fromtar@3.1.0"]);
    assert!(ws
        .path()
        .join(MODULES_DIR)
        .join("fromtar")
        .join(MANIFEST_FILENAME)
        .is_file());
}

#[test]
fn test_scoped_package_placement() {
    let ws = tempdir().unwrap();
    let registry = MemoryRegistry::new();
    let (manifest, bytes) = packaged(
        &[("index.ns", "exports = {}\n")],
        r#"{"name":"@acme/tools","version":"1.0.0"}"#,
    );
    registry.add_package(manifest, bytes);

    let installer =
        Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();
    installer
        .install(&[parse_target("@acme/tools").unwrap()])
        .unwrap();
    assert!(ws
        .path()
        .join(MODULES_DIR)
        .join("@acme")
        .join("tools")
        .join("index.ns")
        .is_file());
}

#[test]
fn test_uninstall_reverses_placement() {
    let ws = tempdir().unwrap();
    let registry = MemoryRegistry::new();
    let (manifest, bytes) = packaged(
        &[("index.ns", "exports = {}\n"), ("lib/x.ns", "exports = {}\n")],
        r#"{"name":"gone","version":"1.0.0"}"#,
    );
    registry.add_package(manifest, bytes);

    let installer =
        Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();
    installer.install(&[parse_target("gone").unwrap()]).unwrap();
    assert!(ws.path().join(MODULES_DIR).join("gone").is_dir());

    installer.uninstall("gone").unwrap();
    assert!(!ws.path().join(MODULES_DIR).join("gone").exists());
}
