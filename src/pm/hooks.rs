//! Lifecycle hook runner
//!
//! A manifest's `scripts` table maps an event name to either a module
//! request (run as a fresh main module of the runtime) or a shell string
//! prefixed with `!` (handed to the platform shell unprocessed). A nonzero
//! exit aborts the surrounding action.

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const PRE_INSTALL: &str = "pre-install";
pub const POST_INSTALL: &str = "post-install";
pub const PRE_UNINSTALL: &str = "pre-uninstall";
pub const POST_UNINSTALL: &str = "post-uninstall";
pub const PRE_PUBLISH: &str = "pre-publish";
pub const POST_PUBLISH: &str = "post-publish";

/// Run the hook for `event` if the manifest declares one.
pub fn run_hook(package_root: &Path, manifest: &Manifest, event: &str) -> Result<()> {
    let Some(script) = manifest.scripts.get(event) else {
        return Ok(());
    };
    tracing::info!(package = %manifest.name, hook = event, "running hook");
    run_script(package_root, manifest, event, script)
}

/// Run an arbitrary `scripts` entry (also backs `nodus-pm run`).
pub fn run_script(
    package_root: &Path,
    manifest: &Manifest,
    event: &str,
    script: &str,
) -> Result<()> {
    let status = if let Some(shell_line) = script.strip_prefix('!') {
        shell_command(shell_line)
            .current_dir(package_root)
            .status()?
    } else {
        Command::new(runtime_binary())
            .arg("--current-dir")
            .arg(package_root)
            .arg(script)
            .status()?
    };

    if status.success() {
        Ok(())
    } else {
        Err(Error::HookFailed {
            hook: event.to_string(),
            package: manifest.name.clone(),
            status: status.code().unwrap_or(-1),
        })
    }
}

/// The platform shell, fed the line unprocessed.
fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(line);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(line);
        cmd
    }
}

/// The runtime executable: a sibling of the current binary when present
/// (the common installed layout), the PATH lookup otherwise.
pub fn runtime_binary() -> PathBuf {
    let name = if cfg!(windows) { "nodus.exe" } else { "nodus" };
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join(name);
            if sibling.is_file() {
                return sibling;
            }
        }
    }
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use tempfile::tempdir;

    fn manifest_with_script(event: &str, script: &str) -> Manifest {
        Manifest::parse(&format!(
            r#"{{"name":"hooked","version":"1.0.0","scripts":{{"{}":"{}"}}}}"#,
            event, script
        ))
        .unwrap()
    }

    #[test]
    fn test_missing_hook_is_noop() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::parse(r#"{"name":"p","version":"1.0.0"}"#).unwrap();
        assert!(run_hook(dir.path(), &manifest, POST_INSTALL).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_hook_success_and_failure() {
        let dir = tempdir().unwrap();
        let ok = manifest_with_script(POST_INSTALL, "!true");
        assert!(run_hook(dir.path(), &ok, POST_INSTALL).is_ok());

        let fail = manifest_with_script(POST_INSTALL, "!exit 3");
        let err = run_hook(dir.path(), &fail, POST_INSTALL).unwrap_err();
        match err {
            Error::HookFailed {
                hook,
                package,
                status,
            } => {
                assert_eq!(hook, POST_INSTALL);
                assert_eq!(package, "hooked");
                assert_eq!(status, 3);
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_hook_runs_in_package_root() {
        let dir = tempdir().unwrap();
        let manifest = manifest_with_script(PRE_INSTALL, "!test -f nodus.json");
        std::fs::write(dir.path().join("nodus.json"), "{}").unwrap();
        assert!(run_hook(dir.path(), &manifest, PRE_INSTALL).is_ok());
    }
}
