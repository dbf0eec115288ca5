//! nodus: a Node.js-style module runtime and package manager
//!
//! Two tightly coupled cores: a resolver/loader graph giving every module a
//! `require` capability with deterministic resolution and caching, and an
//! installer that materializes dependency expressions into a workspace-local
//! tree with shims, lifecycle hooks and idempotent placement.
//!
//! # Example
//!
//! ```no_run
//! use nodus::{Context, ContextOptions};
//!
//! fn main() -> nodus::Result<()> {
//!     let ctx = Context::new(ContextOptions::default());
//!     ctx.enter();
//!     let require = ctx.require_root();
//!     let exports = require.require("./app")?;
//!     println!("loaded: {}", exports);
//!     ctx.leave();
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod engine;
pub mod env;
pub mod ext;
pub mod loaders;
pub mod manifest;
pub mod module;
pub mod package;
pub mod pm;
pub mod require;
pub mod resolve;
pub mod semver;
pub mod vpath;

mod error;

pub use context::{Context, ContextOptions, Event, EventKind, MODULES_DIR};
pub use engine::Value;
pub use error::{Error, ExecError, Result};
pub use manifest::{Manifest, MANIFEST_FILENAME};
pub use module::{Module, Namespace};
pub use package::Package;
pub use require::{Require, RequireOptions};
pub use resolve::{Request, Resolver, LINK_SUFFIX};
pub use semver::{Selector, Version};
pub use vpath::VPath;

/// nodus version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
