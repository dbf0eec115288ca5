//! Error types for the nodus runtime and package manager

use std::fmt;
use thiserror::Error;

/// Library-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the runtime and installer can surface.
///
/// Module-execution errors propagate through `require` unchanged; resolve
/// errors raised inside a module are ordinary errors the caller may handle.
#[derive(Debug, Error)]
pub enum Error {
    /// No resolver returned a module for the request.
    #[error("cannot resolve '{request}'{}", format_tried(tried))]
    Resolve {
        request: String,
        tried: Vec<String>,
    },

    /// A loader found the artifact but could not instantiate it.
    #[error("cannot load '{path}': {reason}")]
    Load { path: String, reason: String },

    /// A `!binding` request named an unregistered binding.
    #[error("no such binding '!{0}'")]
    NoSuchBinding(String),

    /// Manifest parse or schema failure.
    #[error("invalid manifest{}: {reason}", format_origin(origin))]
    InvalidManifest {
        origin: Option<String>,
        reason: String,
    },

    /// Version selector syntax error.
    #[error("invalid version selector '{input}': {reason}")]
    SelectorParse { input: String, reason: String },

    /// The registry advertises no version matching the selector.
    #[error("no version of '{name}' satisfies '{selector}' (available: {})", available.join(", "))]
    VersionMismatch {
        name: String,
        selector: String,
        available: Vec<String>,
    },

    /// A lifecycle hook exited nonzero.
    #[error("hook '{hook}' of package '{package}' failed with status {status}")]
    HookFailed {
        hook: String,
        package: String,
        status: i32,
    },

    /// Two dependents require incompatible exact selectors.
    #[error("conflicting selectors for '{name}': '{first}' vs '{second}'")]
    InstallConflict {
        name: String,
        first: String,
        second: String,
    },

    /// HTTP or auth failure against a package registry.
    #[error("registry error: {0}")]
    Registry(String),

    /// Script execution raised inside the engine.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Filesystem failure outside the error model above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_tried(tried: &[String]) -> String {
    if tried.is_empty() {
        String::new()
    } else {
        format!(" (searched: {})", tried.join(", "))
    }
}

fn format_origin(origin: &Option<String>) -> String {
    match origin {
        Some(o) => format!(" at {}", o),
        None => String::new(),
    }
}

impl Error {
    /// Build a `Load` error for `path` from any displayable reason.
    pub fn load(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Error::Load {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Build an `InvalidManifest` error with a known origin.
    pub fn manifest(origin: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Error::InvalidManifest {
            origin: Some(origin.to_string()),
            reason: reason.to_string(),
        }
    }

    /// Whether this error belongs to the runtime's known error model.
    /// Unknown kinds map to exit code 127 at the CLI boundary.
    pub fn is_runtime_kind(&self) -> bool {
        !matches!(self, Error::Io(_))
    }
}

/// An error raised while executing dialect source.
///
/// Carries the location of the failing statement so tracebacks stay usable
/// after source preprocessing (transforms preserve line counts).
#[derive(Debug, Error)]
pub enum ExecError {
    /// A plain script failure at a known location.
    #[error("{}:{line}: {message}", filename.as_deref().unwrap_or("<script>"))]
    Script {
        message: String,
        filename: Option<String>,
        line: u32,
    },

    /// A runtime error that crossed a nested `require` boundary.
    /// Kept boxed so the original kind survives unwrapping at the top level.
    #[error("{0}")]
    Raised(Box<Error>),
}

impl ExecError {
    pub fn script(message: impl fmt::Display, line: u32) -> Self {
        ExecError::Script {
            message: message.to_string(),
            filename: None,
            line,
        }
    }

    /// Attach the source filename if the error does not carry one yet.
    pub fn with_file(self, name: &str) -> Self {
        match self {
            ExecError::Script {
                message,
                filename: None,
                line,
            } => ExecError::Script {
                message,
                filename: Some(name.to_string()),
                line,
            },
            other => other,
        }
    }
}

impl From<Error> for ExecError {
    fn from(err: Error) -> Self {
        ExecError::Raised(Box::new(err))
    }
}
