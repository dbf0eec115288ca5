//! Shared helpers for integration tests

use nodus::{Context, ContextOptions};
use std::path::Path;
use std::rc::Rc;

/// Create a file (and its parents) under the workspace.
pub fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// An entered Context rooted at `dir`.
pub fn context_at(dir: &Path) -> Rc<Context> {
    let ctx = Context::new(ContextOptions {
        current_dir: Some(dir.to_path_buf()),
        ..Default::default()
    });
    ctx.enter();
    ctx
}
