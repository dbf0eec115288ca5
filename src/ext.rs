//! Per-package extensions and the built-in syntax preprocessors
//!
//! Extensions receive load/exec/preprocess events. The two built-ins are
//! textual transforms registered as bindings, so a manifest (or an in-file
//! comment) can request them without any package being installed. All
//! transforms map lines to lines, keeping diagnostics usable.

use crate::error::{Error, Result};
use crate::module::Module;
use crate::package::Package;
use crate::vpath::VPath;
use regex::Regex;
use std::rc::Rc;
use std::sync::OnceLock;

/// Binding name of the destructuring-assignment preprocessor.
pub const UNPACK_SYNTAX_ID: &str = "require-unpack-syntax";
/// Binding name of the import-statement preprocessor.
pub const IMPORT_SYNTAX_ID: &str = "require-import-syntax";

/// A plugin receiving module lifecycle events. Every callback is optional.
pub trait Extension {
    fn id(&self) -> &str;

    /// Fired once per package when its manifest extensions are first
    /// resolved. Comment-declared extensions do not receive this.
    fn init_extension(&self, _package: &Rc<Package>) {}

    /// Fired after a module is loaded, before it executes.
    fn module_loaded(&self, _module: &Rc<Module>) {}

    /// Extra symbols to inject into the namespaces of modules this
    /// extension is active for.
    fn namespace_symbols(&self, _module: &Rc<Module>) -> Vec<(String, crate::engine::Value)> {
        Vec::new()
    }

    /// Source-to-source filter. Must preserve line counts.
    fn preprocess_source(
        &self,
        _package: Option<&Rc<Package>>,
        _filename: &VPath,
        source: String,
    ) -> Result<String> {
        Ok(source)
    }
}

/// Scan the leading lines of a source file for the per-file extension
/// comment (`# nodepy-extensions: ext1, ext2`).
pub fn comment_extensions(source: &str) -> Vec<String> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let re = TAG.get_or_init(|| {
        Regex::new(r"^#\s*nodepy-extensions:\s*(.+)$").expect("extension tag regex")
    });

    for line in source.lines().take(5) {
        if let Some(caps) = re.captures(line.trim_end()) {
            return caps[1]
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
    Vec::new()
}

// ── shared binding-list parsing ─────────────────────────────────────

/// `"a, b as c"` → `[("a", "a"), ("b", "c")]`
fn parse_bindings(list: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for item in list.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        match item.split_once(" as ") {
            Some((orig, local)) => {
                out.push((orig.trim().to_string(), local.trim().to_string()))
            }
            None => out.push((item.to_string(), item.to_string())),
        }
    }
    if out.is_empty() {
        return Err(Error::load("<preprocess>", "empty binding list"));
    }
    Ok(out)
}

fn binding_assigns(temp: &str, bindings: &[(String, String)]) -> String {
    bindings
        .iter()
        .map(|(orig, local)| format!("{} = {}.{}", local, temp, orig))
        .collect::<Vec<_>>()
        .join("; ")
}

// ── require-unpack-syntax ───────────────────────────────────────────

/// Rewrites `{a, b as c} = require('x')` into explicit attribute
/// assignments on a hidden temporary.
pub struct RequireUnpackSyntax;

impl Extension for RequireUnpackSyntax {
    fn id(&self) -> &str {
        UNPACK_SYNTAX_ID
    }

    fn preprocess_source(
        &self,
        _package: Option<&Rc<Package>>,
        _filename: &VPath,
        source: String,
    ) -> Result<String> {
        static UNPACK: OnceLock<Regex> = OnceLock::new();
        let re = UNPACK.get_or_init(|| {
            Regex::new(r"^(\s*)\{\s*([^}]+?)\s*\}\s*=\s*(.+?)\s*$").expect("unpack regex")
        });

        let mut lines = Vec::new();
        for line in source.split('\n') {
            match re.captures(line) {
                Some(caps) => {
                    let bindings = parse_bindings(&caps[2])?;
                    lines.push(format!(
                        "{}__unpack__ = {}; {}",
                        &caps[1],
                        &caps[3],
                        binding_assigns("__unpack__", &bindings)
                    ));
                }
                None => lines.push(line.to_string()),
            }
        }
        Ok(lines.join("\n"))
    }
}

// ── require-import-syntax ───────────────────────────────────────────

/// Rewrites the four `import` statement forms into `require` calls:
/// named, star, default and bare imports.
pub struct RequireImportSyntax;

impl Extension for RequireImportSyntax {
    fn id(&self) -> &str {
        IMPORT_SYNTAX_ID
    }

    fn preprocess_source(
        &self,
        _package: Option<&Rc<Package>>,
        _filename: &VPath,
        source: String,
    ) -> Result<String> {
        static NAMED: OnceLock<Regex> = OnceLock::new();
        static STAR: OnceLock<Regex> = OnceLock::new();
        static DEFAULT: OnceLock<Regex> = OnceLock::new();
        static BARE: OnceLock<Regex> = OnceLock::new();

        let named = NAMED.get_or_init(|| {
            Regex::new(r#"^(\s*)import\s*\{([^}]*)\}\s*from\s*['"]([^'"]+)['"]\s*$"#)
                .expect("named import regex")
        });
        let star = STAR.get_or_init(|| {
            Regex::new(r#"^(\s*)import\s*\*\s*from\s*['"]([^'"]+)['"]\s*$"#)
                .expect("star import regex")
        });
        let default = DEFAULT.get_or_init(|| {
            Regex::new(r#"^(\s*)import\s+([A-Za-z_]\w*)\s+from\s+['"]([^'"]+)['"]\s*$"#)
                .expect("default import regex")
        });
        let bare = BARE.get_or_init(|| {
            Regex::new(r#"^(\s*)import\s+['"]([^'"]+)['"]\s*$"#).expect("bare import regex")
        });

        let mut lines = Vec::new();
        for line in source.split('\n') {
            if let Some(caps) = named.captures(line) {
                let bindings = parse_bindings(&caps[2])?;
                lines.push(format!(
                    "{}__imp__ = require('{}'); {}",
                    &caps[1],
                    &caps[3],
                    binding_assigns("__imp__", &bindings)
                ));
            } else if let Some(caps) = star.captures(line) {
                lines.push(format!("{}__import_star__('{}')", &caps[1], &caps[2]));
            } else if let Some(caps) = default.captures(line) {
                lines.push(format!("{}{} = require('{}')", &caps[1], &caps[2], &caps[3]));
            } else if let Some(caps) = bare.captures(line) {
                lines.push(format!("{}require('{}')", &caps[1], &caps[2]));
            } else {
                lines.push(line.to_string());
            }
        }
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unpack(src: &str) -> String {
        RequireUnpackSyntax
            .preprocess_source(None, &VPath::local("/t.ns"), src.to_string())
            .unwrap()
    }

    fn imports(src: &str) -> String {
        RequireImportSyntax
            .preprocess_source(None, &VPath::local("/t.ns"), src.to_string())
            .unwrap()
    }

    #[test]
    fn test_unpack_basic() {
        assert_eq!(
            unpack("{a, b as c} = require('x')"),
            "__unpack__ = require('x'); a = __unpack__.a; c = __unpack__.b"
        );
    }

    #[test]
    fn test_unpack_preserves_line_count() {
        let src = "x = 1\n{a} = require('x')\ny = 2\n";
        let out = unpack(src);
        assert_eq!(src.matches('\n').count(), out.matches('\n').count());
    }

    #[test]
    fn test_unpack_leaves_object_literals_alone() {
        // An object literal on the right-hand side of an assignment is not
        // destructuring.
        assert_eq!(unpack("x = {a: 1}"), "x = {a: 1}");
    }

    #[test]
    fn test_import_named() {
        assert_eq!(
            imports("import {a, b as c} from 'x'"),
            "__imp__ = require('x'); a = __imp__.a; c = __imp__.b"
        );
    }

    #[test]
    fn test_import_star() {
        assert_eq!(imports("import * from 'x'"), "__import_star__('x')");
    }

    #[test]
    fn test_import_default() {
        assert_eq!(imports("import util from './util'"), "util = require('./util')");
    }

    #[test]
    fn test_import_bare() {
        assert_eq!(imports("import 'side-effects'"), "require('side-effects')");
    }

    #[test]
    fn test_import_indentation_kept() {
        assert_eq!(imports("  import x from 'y'"), "  x = require('y')");
    }

    #[test]
    fn test_comment_extensions() {
        let src = "# nodepy-extensions: require-import-syntax, my-ext\nx = 1\n";
        assert_eq!(
            comment_extensions(src),
            vec!["require-import-syntax", "my-ext"]
        );
        assert!(comment_extensions("x = 1\n").is_empty());
        // Only the leading lines are scanned.
        let late = "a = 1\nb = 2\nc = 3\nd = 4\ne = 5\n# nodepy-extensions: x\n";
        assert!(comment_extensions(late).is_empty());
    }
}
