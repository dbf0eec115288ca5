//! Fetch, validate and materialize packages into the workspace tree
//!
//! Placement is deterministic (`<modules-dir>/<name>/`, scoped names under
//! `@scope/`), idempotent (unchanged files keep their bytes and mtimes) and
//! guarded by a `.partial` sentinel that only disappears once placement and
//! the post-install hook both succeeded.

use crate::context::{global_prefix, MODULES_DIR};
use crate::error::{Error, Result};
use crate::manifest::{is_valid_name, Manifest, MANIFEST_FILENAME};
use crate::pm::registry::Registry;
use crate::pm::{dist, hooks, shims, write_file_if_changed};
use crate::resolve::LINK_SUFFIX;
use crate::semver::{MatchOptions, Selector, SelectorKind, Version};
use fs2::FileExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Sentinel present while a package directory is being placed.
pub const PARTIAL_SENTINEL: &str = ".partial";
/// Per-package file manifest consulted by `uninstall`.
pub const INSTALLED_FILES: &str = "installed-files.txt";
/// Install-duration lock under the modules directory.
pub const LOCK_FILE: &str = ".lock";
/// Host-installer target directory under the modules directory.
pub const HOST_SUBDIR: &str = ".pip";
/// Shim directory under the modules directory.
pub const BIN_SUBDIR: &str = ".bin";

// ── install targets ─────────────────────────────────────────────────

/// One parsed install argument.
#[derive(Debug, Clone, PartialEq)]
pub enum InstallTarget {
    /// `<name>[@<selector>]` against the configured registry.
    Registry { name: String, selector: Selector },
    /// `./path` or `../path`; `develop` writes a link instead of copying.
    Directory { path: PathBuf, develop: bool },
    /// A local `.tar.gz` dist archive.
    Archive { path: PathBuf },
    /// `git+<url>[@<ref>]`, cloned via the host VCS.
    Git {
        url: String,
        reference: Option<String>,
    },
    /// `py/<host-pkg>[==ver]`, handed to the host-language installer.
    Host { name: String, spec: Option<String> },
}

/// Parse one CLI install argument into a target.
pub fn parse_target(spec: &str) -> Result<InstallTarget> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(Error::SelectorParse {
            input: spec.to_string(),
            reason: "empty install target".to_string(),
        });
    }

    if let Some(rest) = spec.strip_prefix("py/") {
        let (name, version) = match rest.split_once("==") {
            Some((n, v)) => (n.to_string(), Some(format!("=={}", v))),
            None => (rest.to_string(), None),
        };
        return Ok(InstallTarget::Host {
            name,
            spec: version,
        });
    }

    if spec.starts_with("git+") {
        let selector = Selector::parse(spec)?;
        if let SelectorKind::Git { url, reference } = selector.kind() {
            return Ok(InstallTarget::Git {
                url: url.clone(),
                reference: reference.clone(),
            });
        }
    }

    if spec.ends_with(".tar.gz") {
        return Ok(InstallTarget::Archive {
            path: PathBuf::from(spec),
        });
    }

    if spec.starts_with("./") || spec.starts_with("../") || Path::new(spec).is_absolute() {
        return Ok(InstallTarget::Directory {
            path: PathBuf::from(spec),
            develop: false,
        });
    }

    // `<name>[@<selector>]`, minding the optional `@scope/` prefix.
    let at = if let Some(rest) = spec.strip_prefix('@') {
        rest.find('@').map(|i| i + 1)
    } else {
        spec.find('@')
    };
    let (name, selector) = match at {
        Some(idx) => (&spec[..idx], Selector::parse(&spec[idx + 1..])?),
        None => (spec, Selector::parse("*")?),
    };
    if !is_valid_name(name) {
        return Err(Error::InvalidManifest {
            origin: None,
            reason: format!("invalid package name '{}'", name),
        });
    }
    Ok(InstallTarget::Registry {
        name: name.to_string(),
        selector,
    })
}

// ── options and directories ─────────────────────────────────────────

/// Which manifest table `--save*` writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Dependencies,
    DevDependencies,
    Extensions,
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Install into the per-user prefix instead of the workspace.
    pub global: bool,
    /// Install into the system/virtualenv prefix.
    pub root: bool,
    /// Materialize directory targets as `.nodepy-link` files.
    pub develop: bool,
    /// Skip the root target's dev-dependencies.
    pub production: bool,
    /// Expand the root target's dev-dependencies.
    pub dev: bool,
    /// Re-place packages even when a satisfying version is present.
    pub ignore_installed: bool,
    /// Re-evaluate dependency subtrees of already-satisfied packages.
    pub recursive: bool,
    pub save: Option<SaveKind>,
    /// Promote `--global` to `--root` inside a virtualenv.
    pub promote_global_in_venv: bool,
    /// Let plain selectors match pre-release versions.
    pub include_prereleases: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        InstallOptions {
            global: false,
            root: false,
            develop: false,
            production: false,
            dev: true,
            ignore_installed: false,
            recursive: false,
            save: None,
            promote_global_in_venv: true,
            include_prereleases: false,
        }
    }
}

/// The resolved placement directories for one install run.
#[derive(Debug, Clone)]
pub struct InstallDirs {
    pub modules: PathBuf,
}

impl InstallDirs {
    pub fn local(cwd: &Path) -> InstallDirs {
        InstallDirs {
            modules: cwd.join(MODULES_DIR),
        }
    }

    pub fn global() -> Result<InstallDirs> {
        let prefix = global_prefix().ok_or_else(|| {
            Error::load("<global>", "cannot determine the user prefix")
        })?;
        Ok(InstallDirs {
            modules: prefix.join(MODULES_DIR),
        })
    }

    /// Root install: the system prefix, which inside a virtualenv is the
    /// environment itself.
    pub fn root() -> Result<InstallDirs> {
        match std::env::var_os("VIRTUAL_ENV") {
            Some(venv) => Ok(InstallDirs {
                modules: PathBuf::from(venv).join(MODULES_DIR),
            }),
            None => InstallDirs::global(),
        }
    }

    pub fn for_options(cwd: &Path, options: &InstallOptions) -> Result<InstallDirs> {
        let in_venv = std::env::var_os("VIRTUAL_ENV").is_some();
        if options.root || (options.global && in_venv && options.promote_global_in_venv) {
            InstallDirs::root()
        } else if options.global {
            InstallDirs::global()
        } else {
            Ok(InstallDirs::local(cwd))
        }
    }

    pub fn bin(&self) -> PathBuf {
        self.modules.join(BIN_SUBDIR)
    }

    pub fn host_target(&self) -> PathBuf {
        self.modules.join(HOST_SUBDIR)
    }

    /// `<modules>/<name>` or `<modules>/@scope/<name>` for scoped names.
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.modules.join(name)
    }

    /// The link-file path a develop install writes for `name`.
    pub fn package_link(&self, name: &str) -> PathBuf {
        let mut os = self.package_dir(name).into_os_string();
        os.push(LINK_SUFFIX);
        PathBuf::from(os)
    }
}

/// What an install run did, for logging and tests.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
    pub warnings: Vec<String>,
}

// ── lock guard ──────────────────────────────────────────────────────

struct DirLock {
    file: fs::File,
}

impl DirLock {
    fn acquire(modules: &Path) -> Result<DirLock> {
        fs::create_dir_all(modules)?;
        let file = fs::File::create(modules.join(LOCK_FILE))?;
        file.lock_exclusive()?;
        Ok(DirLock { file })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

// ── the installer ───────────────────────────────────────────────────

pub struct Installer<'a> {
    cwd: PathBuf,
    dirs: InstallDirs,
    registry: &'a dyn Registry,
    options: InstallOptions,
}

type Queue = VecDeque<(InstallTarget, bool)>;

impl<'a> Installer<'a> {
    pub fn new(cwd: &Path, registry: &'a dyn Registry, options: InstallOptions) -> Result<Self> {
        let dirs = InstallDirs::for_options(cwd, &options)?;
        Ok(Installer {
            cwd: cwd.to_path_buf(),
            dirs,
            registry,
            options,
        })
    }

    pub fn dirs(&self) -> &InstallDirs {
        &self.dirs
    }

    /// Install every target, expanding transitive dependencies. Errors
    /// terminate the run without rolling back completed placements.
    pub fn install(&self, targets: &[InstallTarget]) -> Result<InstallReport> {
        let queue: Queue = targets
            .iter()
            .map(|t| (self.apply_develop(t.clone()), true))
            .collect();
        self.run_queue(queue)
    }

    fn run_queue(&self, mut queue: Queue) -> Result<InstallReport> {
        let _lock = DirLock::acquire(&self.dirs.modules)?;

        let mut report = InstallReport::default();
        let mut constraints: HashMap<String, Vec<Selector>> = HashMap::new();
        let mut processed: HashSet<String> = HashSet::new();

        while let Some((target, is_root)) = queue.pop_front() {
            match target {
                InstallTarget::Registry { name, selector } => {
                    constraints.entry(name.clone()).or_default().push(selector);
                    let sels = constraints[&name].clone();
                    if processed.contains(&name) {
                        self.recheck_placed(&name, &sels, &mut report)?;
                        continue;
                    }
                    processed.insert(name.clone());
                    if let Some(manifest) =
                        self.install_registry(&name, &sels, &mut report)?
                    {
                        let base = self.dirs.package_dir(&name);
                        self.queue_dependencies(&manifest, is_root, &base, &mut queue)?;
                        if is_root {
                            self.maybe_save(&sels[0], &manifest)?;
                        }
                    }
                }
                InstallTarget::Directory { path, develop } => {
                    let source = self.absolutize(&path);
                    let manifest = if develop {
                        self.install_develop(&source, &mut report)?
                    } else {
                        self.install_directory(&source, &mut report)?
                    };
                    self.queue_dependencies(&manifest, is_root, &source, &mut queue)?;
                    if is_root {
                        self.maybe_save_path(&path, develop, &manifest)?;
                    }
                }
                InstallTarget::Archive { path } => {
                    let bytes = fs::read(self.absolutize(&path))?;
                    let manifest = read_archive_manifest(&bytes)
                        .ok_or_else(|| Error::manifest(path.display(), "archive carries no manifest"))?;
                    manifest.validate()?;
                    self.place_archive(&manifest, &bytes, &mut report)?;
                    let base = self.dirs.package_dir(&manifest.name);
                    self.queue_dependencies(&manifest, is_root, &base, &mut queue)?;
                }
                InstallTarget::Git { url, reference } => {
                    let manifest = self.install_git(&url, reference.as_deref(), &mut report)?;
                    let base = self.dirs.package_dir(&manifest.name);
                    self.queue_dependencies(&manifest, is_root, &base, &mut queue)?;
                }
                InstallTarget::Host { name, spec } => {
                    self.install_host(&name, spec.as_deref())?;
                    report.installed.push(format!("py/{}", name));
                }
            }
        }

        Ok(report)
    }

    /// `install` without targets: expand the workspace manifest's own
    /// dependency tables without placing the workspace package itself.
    pub fn install_root_dependencies(&self) -> Result<InstallReport> {
        let manifest = Manifest::load(&self.cwd.join(MANIFEST_FILENAME))?;
        let mut queue: Queue = Queue::new();
        self.queue_dependencies(&manifest, true, &self.cwd, &mut queue)?;
        self.run_queue(queue)
    }

    /// `-e` applies to directory targets given on the command line.
    fn apply_develop(&self, target: InstallTarget) -> InstallTarget {
        match target {
            InstallTarget::Directory { path, .. } if self.options.develop => {
                InstallTarget::Directory {
                    path,
                    develop: true,
                }
            }
            other => other,
        }
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            crate::vpath::lexical_normalize(&self.cwd.join(path))
        }
    }

    // ── registry targets ────────────────────────────────────────────

    fn install_registry(
        &self,
        name: &str,
        selectors: &[Selector],
        report: &mut InstallReport,
    ) -> Result<Option<Manifest>> {
        if !is_valid_name(name) {
            return Err(Error::InvalidManifest {
                origin: None,
                reason: format!("invalid package name '{}'", name),
            });
        }

        let chosen = self.pick_version(name, selectors, report)?;
        let dest = self.dirs.package_dir(name);
        let dest_manifest = dest.join(MANIFEST_FILENAME);

        if dest_manifest.is_file() && !self.options.ignore_installed {
            if let Ok(existing) = Manifest::load(&dest_manifest) {
                if existing.parsed_version() == chosen {
                    report.skipped.push(existing.identifier());
                    // `--recursive` re-walks the satisfied subtree.
                    return Ok(self.options.recursive.then_some(existing));
                }
            }
        }

        let manifest = self.registry.package_manifest(name, &chosen)?;
        if manifest.name != name {
            return Err(Error::manifest(
                name,
                format!("registry returned manifest for '{}'", manifest.name),
            ));
        }
        let bytes = self.registry.download(name, &chosen)?;
        self.place_archive(&manifest, &bytes, report)?;
        Ok(Some(manifest))
    }

    /// The placement decision: highest version satisfying every dependent,
    /// otherwise (after ruling out hard exact conflicts) the one satisfying
    /// the most, with a recorded warning.
    fn pick_version(
        &self,
        name: &str,
        selectors: &[Selector],
        report: &mut InstallReport,
    ) -> Result<Version> {
        let versions = self.registry.package_versions(name)?;
        let opts = MatchOptions {
            include_prereleases: self.options.include_prereleases,
        };

        if let Some(best) = versions
            .iter()
            .filter(|v| selectors.iter().all(|s| s.matches_with(v, opts)))
            .max()
        {
            return Ok(best.clone());
        }

        exact_conflict(name, selectors)?;

        let mut best: Option<(usize, &Version)> = None;
        for version in &versions {
            let satisfied = selectors
                .iter()
                .filter(|s| s.matches_with(version, opts))
                .count();
            if satisfied > 0 && best.map_or(true, |(n, v)| (satisfied, version) > (n, v)) {
                best = Some((satisfied, version));
            }
        }

        match best {
            Some((satisfied, version)) => {
                let warning = format!(
                    "selector conflict for '{}': picked {} satisfying {} of {} dependents",
                    name,
                    version,
                    satisfied,
                    selectors.len()
                );
                tracing::warn!("{}", warning);
                report.warnings.push(warning);
                Ok(version.clone())
            }
            None => Err(Error::VersionMismatch {
                name: name.to_string(),
                selector: selectors
                    .iter()
                    .map(|s| s.raw().to_string())
                    .collect::<Vec<_>>()
                    .join(" && "),
                available: versions.iter().map(|v| v.to_string()).collect(),
            }),
        }
    }

    /// A later dependent added a constraint for an already-placed package.
    fn recheck_placed(
        &self,
        name: &str,
        selectors: &[Selector],
        report: &mut InstallReport,
    ) -> Result<()> {
        let dest_manifest = self.dirs.package_dir(name).join(MANIFEST_FILENAME);
        let Ok(existing) = Manifest::load(&dest_manifest) else {
            return Ok(());
        };
        let placed = existing.parsed_version();
        let opts = MatchOptions {
            include_prereleases: self.options.include_prereleases,
        };
        if selectors.iter().all(|s| s.matches_with(&placed, opts)) {
            return Ok(());
        }
        exact_conflict(name, selectors)?;
        let warning = format!(
            "selector conflict for '{}': keeping placed {}",
            name, placed
        );
        tracing::warn!("{}", warning);
        report.warnings.push(warning);
        Ok(())
    }

    // ── placement ───────────────────────────────────────────────────

    fn place_archive(
        &self,
        manifest: &Manifest,
        bytes: &[u8],
        report: &mut InstallReport,
    ) -> Result<()> {
        fs::create_dir_all(&self.dirs.modules)?;
        let stage = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.dirs.modules)?;
        dist::unpack(bytes, stage.path())?;
        self.place_tree(stage.path(), manifest, None, report)
    }

    /// The shared placement path: pre-install hook at the source, sentinel,
    /// copy, `installed-files.txt`, shims, post-install hook, sentinel gone.
    fn place_tree(
        &self,
        source: &Path,
        manifest: &Manifest,
        files: Option<Vec<PathBuf>>,
        report: &mut InstallReport,
    ) -> Result<()> {
        hooks::run_hook(source, manifest, hooks::PRE_INSTALL)?;

        let dest = self.dirs.package_dir(&manifest.name);
        // Replacing a different package or version never merges two trees;
        // re-placing the same version overwrites in place so unchanged
        // files keep their bytes and mtimes.
        let same_version = Manifest::load(&dest.join(MANIFEST_FILENAME))
            .map(|existing| {
                existing.name == manifest.name && existing.version == manifest.version
            })
            .unwrap_or(false);
        if dest.exists() && !same_version {
            fs::remove_dir_all(&dest)?;
        }
        fs::create_dir_all(&dest)?;
        let sentinel = dest.join(PARTIAL_SENTINEL);
        fs::write(&sentinel, b"")?;

        let mut placed = match files {
            Some(files) => files,
            None => walk_files(source)?,
        };
        placed.sort();
        for rel in &placed {
            let data = fs::read(source.join(rel))?;
            write_file_if_changed(&dest.join(rel), &data)?;
        }

        // Drop files a previous placement recorded but this one no longer
        // carries.
        if let Ok(previous) = fs::read_to_string(dest.join(INSTALLED_FILES)) {
            for line in previous.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if !placed.iter().any(|p| p == Path::new(line)) {
                    let stale = dest.join(line);
                    if stale.is_file() {
                        let _ = fs::remove_file(stale);
                    }
                }
            }
        }

        let mut listing = placed
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        listing.push('\n');
        write_file_if_changed(&dest.join(INSTALLED_FILES), listing.as_bytes())?;

        shims::write_shims(&manifest.bin, &manifest.name, &self.dirs.bin())?;

        hooks::run_hook(&dest, manifest, hooks::POST_INSTALL)?;
        fs::remove_file(&sentinel)?;

        tracing::info!(package = %manifest.identifier(), dest = %dest.display(), "placed");
        report.installed.push(manifest.identifier());
        Ok(())
    }

    // ── directory, develop, archive, git targets ────────────────────

    fn install_directory(
        &self,
        source: &Path,
        report: &mut InstallReport,
    ) -> Result<Manifest> {
        let manifest = Manifest::load(&source.join(MANIFEST_FILENAME))?;
        let files = dist::collect_files(source, &manifest)?;
        self.place_tree(source, &manifest, Some(files), report)?;
        Ok(manifest)
    }

    /// Develop install: a single link file naming the source directory;
    /// nothing is copied.
    fn install_develop(&self, source: &Path, report: &mut InstallReport) -> Result<Manifest> {
        let manifest = Manifest::load(&source.join(MANIFEST_FILENAME))?;
        hooks::run_hook(source, &manifest, hooks::PRE_INSTALL)?;

        fs::create_dir_all(&self.dirs.modules)?;
        let link = self.dirs.package_link(&manifest.name);
        let mut contents = source.to_string_lossy().to_string();
        contents.push('\n');
        write_file_if_changed(&link, contents.as_bytes())?;

        shims::write_shims(&manifest.bin, &manifest.name, &self.dirs.bin())?;
        hooks::run_hook(source, &manifest, hooks::POST_INSTALL)?;

        tracing::info!(package = %manifest.identifier(), link = %link.display(), "linked");
        report.installed.push(format!("{} (develop)", manifest.identifier()));
        Ok(manifest)
    }

    fn install_git(
        &self,
        url: &str,
        reference: Option<&str>,
        report: &mut InstallReport,
    ) -> Result<Manifest> {
        let git = which::which("git")
            .map_err(|_| Error::load(url, "the git executable is not on PATH"))?;
        let checkout = tempfile::Builder::new().prefix("nodus-git-").tempdir()?;

        let status = Command::new(&git)
            .arg("clone")
            .arg(url)
            .arg(checkout.path())
            .status()?;
        if !status.success() {
            return Err(Error::load(url, "git clone failed"));
        }
        if let Some(reference) = reference {
            let status = Command::new(&git)
                .arg("-C")
                .arg(checkout.path())
                .arg("checkout")
                .arg(reference)
                .status()?;
            if !status.success() {
                return Err(Error::load(url, format!("git checkout '{}' failed", reference)));
            }
        }
        self.install_directory(checkout.path(), report)
    }

    // ── host-language targets ───────────────────────────────────────

    fn install_host(&self, name: &str, spec: Option<&str>) -> Result<()> {
        let pip = which::which("pip")
            .or_else(|_| which::which("pip3"))
            .map_err(|_| Error::load("pip", "host installer not on PATH"))?;
        let target = self.dirs.host_target();
        fs::create_dir_all(&target)?;

        let requirement = match spec {
            Some(spec) if spec != "*" => format!("{}{}", name, spec),
            _ => name.to_string(),
        };

        // PIP_* environment variables reach the child untouched.
        let run = || -> Result<()> {
            let status = Command::new(&pip)
                .arg("install")
                .arg("--target")
                .arg(&target)
                .arg(&requirement)
                .status()?;
            if status.success() {
                Ok(())
            } else {
                Err(Error::load(
                    format!("py/{}", name),
                    format!("pip exited with status {}", status.code().unwrap_or(-1)),
                ))
            }
        };

        if cfg!(target_os = "macos") {
            with_pydistutils_guard(run)?;
        } else {
            run()?;
        }

        shims::wrap_host_shims(&target.join("bin"), &self.dirs.bin(), &target)?;
        Ok(())
    }

    // ── dependency expansion ────────────────────────────────────────

    fn queue_dependencies(
        &self,
        manifest: &Manifest,
        is_root: bool,
        base: &Path,
        queue: &mut Queue,
    ) -> Result<()> {
        let include_dev = is_root && self.options.dev && !self.options.production;

        let mut push_table =
            |table: &indexmap::IndexMap<String, String>, queue: &mut Queue| -> Result<()> {
                for (name, raw) in table {
                    let selector = Selector::parse(raw)?;
                    let target = match selector.kind() {
                        SelectorKind::Path { path, develop } => InstallTarget::Directory {
                            path: base.join(path),
                            develop: *develop,
                        },
                        SelectorKind::Git { url, reference } => InstallTarget::Git {
                            url: url.clone(),
                            reference: reference.clone(),
                        },
                        _ => InstallTarget::Registry {
                            name: name.clone(),
                            selector,
                        },
                    };
                    queue.push_back((target, false));
                }
                Ok(())
            };

        push_table(&manifest.dependencies, queue)?;
        if include_dev {
            push_table(&manifest.dev_dependencies, queue)?;
        }

        let mut push_host =
            |table: &indexmap::IndexMap<String, String>, queue: &mut Queue| {
                for (name, raw) in table {
                    let spec = (raw != "*" && !raw.is_empty()).then(|| raw.clone());
                    queue.push_back((
                        InstallTarget::Host {
                            name: name.clone(),
                            spec,
                        },
                        false,
                    ));
                }
            };

        push_host(&manifest.python_dependencies, queue);
        if include_dev {
            push_host(&manifest.dev_python_dependencies, queue);
        }
        Ok(())
    }

    // ── manifest rewriting (--save) ─────────────────────────────────

    fn maybe_save(&self, selector: &Selector, manifest: &Manifest) -> Result<()> {
        let Some(kind) = self.options.save else {
            return Ok(());
        };
        let raw = selector.raw().trim();
        let value = if raw.is_empty() || raw == "*" {
            format!("^{}", manifest.version)
        } else {
            raw.to_string()
        };
        self.save_entry(kind, &manifest.name, &value)
    }

    fn maybe_save_path(&self, path: &Path, develop: bool, manifest: &Manifest) -> Result<()> {
        let Some(kind) = self.options.save else {
            return Ok(());
        };
        let value = if develop {
            format!("-e {}", path.display())
        } else {
            path.display().to_string()
        };
        self.save_entry(kind, &manifest.name, &value)
    }

    fn save_entry(&self, kind: SaveKind, name: &str, value: &str) -> Result<()> {
        let path = self.cwd.join(MANIFEST_FILENAME);
        if !path.is_file() {
            tracing::warn!("--save requested but {} has no manifest", self.cwd.display());
            return Ok(());
        }
        let mut manifest = Manifest::load(&path)?;
        match kind {
            SaveKind::Dependencies => {
                manifest
                    .dependencies
                    .insert(name.to_string(), value.to_string());
            }
            SaveKind::DevDependencies => {
                manifest
                    .dev_dependencies
                    .insert(name.to_string(), value.to_string());
            }
            SaveKind::Extensions => {
                if !manifest.extensions.iter().any(|e| e == name) {
                    manifest.extensions.push(name.to_string());
                }
            }
        }
        manifest.save(&path)
    }

    // ── uninstall ───────────────────────────────────────────────────

    /// Reverse placement and shims, consulting `installed-files.txt` and
    /// the manifest's own tables; hooks fire around the removal.
    pub fn uninstall(&self, name: &str) -> Result<()> {
        let _lock = DirLock::acquire(&self.dirs.modules)?;

        if let Some(host_name) = name.strip_prefix("py/") {
            return self.uninstall_host(host_name);
        }

        let link = self.dirs.package_link(name);
        if link.is_file() {
            let target = fs::read_to_string(&link)?;
            let target = PathBuf::from(target.lines().next().unwrap_or_default().trim());
            let manifest = Manifest::load(&target.join(MANIFEST_FILENAME)).ok();
            if let Some(manifest) = &manifest {
                hooks::run_hook(&target, manifest, hooks::PRE_UNINSTALL)?;
                shims::remove_shims(&manifest.bin, &self.dirs.bin())?;
            }
            fs::remove_file(&link)?;
            if let Some(manifest) = &manifest {
                hooks::run_hook(&target, manifest, hooks::POST_UNINSTALL)?;
            }
            return Ok(());
        }

        let dest = self.dirs.package_dir(name);
        let manifest = Manifest::load(&dest.join(MANIFEST_FILENAME)).ok();
        if let Some(manifest) = &manifest {
            hooks::run_hook(&dest, manifest, hooks::PRE_UNINSTALL)?;
            shims::remove_shims(&manifest.bin, &self.dirs.bin())?;
        }

        let listing = dest.join(INSTALLED_FILES);
        if let Ok(text) = fs::read_to_string(&listing) {
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                let path = dest.join(line.trim());
                if path.is_file() {
                    fs::remove_file(path)?;
                }
            }
            let _ = fs::remove_file(&listing);
            prune_empty_dirs(&dest)?;
        } else if dest.is_dir() {
            fs::remove_dir_all(&dest)?;
        }

        if let Some(manifest) = &manifest {
            hooks::run_hook(&self.dirs.modules, manifest, hooks::POST_UNINSTALL)?;
        }
        Ok(())
    }

    /// Remove a host-installed package by replaying the file list its
    /// installer recorded (`RECORD` in a dist-info, or the egg-info
    /// `installed-files.txt`).
    fn uninstall_host(&self, name: &str) -> Result<()> {
        let target = self.dirs.host_target();
        if !target.is_dir() {
            return Ok(());
        }
        let normalized = name.replace('-', "_");
        for entry in fs::read_dir(&target)? {
            let entry = entry?;
            let dir_name = entry.file_name().to_string_lossy().to_string();
            let is_dist_info = dir_name.ends_with(".dist-info")
                && dir_name
                    .strip_suffix(".dist-info")
                    .is_some_and(|stem| stem.split('-').next() == Some(normalized.as_str()));
            let is_egg_info = dir_name == format!("{}.egg-info", normalized);
            if !is_dist_info && !is_egg_info {
                continue;
            }

            let info_dir = entry.path();
            let record = info_dir.join("RECORD");
            let listing = info_dir.join(INSTALLED_FILES);
            if let Ok(text) = fs::read_to_string(&record) {
                for line in text.lines() {
                    // RECORD rows are csv: path,hash,size
                    if let Some(rel) = line.split(',').next() {
                        let path = target.join(rel.trim());
                        if path.is_file() {
                            let _ = fs::remove_file(path);
                        }
                    }
                }
            } else if let Ok(text) = fs::read_to_string(&listing) {
                for line in text.lines().filter(|l| !l.trim().is_empty()) {
                    let path = info_dir.join(line.trim());
                    if path.is_file() {
                        let _ = fs::remove_file(path);
                    }
                }
            }
            let _ = fs::remove_dir_all(&info_dir);
        }
        prune_empty_dirs(&target)?;
        Ok(())
    }
}

/// Two dependents demanding different exact versions cannot be satisfied.
fn exact_conflict(name: &str, selectors: &[Selector]) -> Result<()> {
    let mut exact: Option<(&Selector, &Version)> = None;
    for selector in selectors {
        if let SelectorKind::Exact(version) = selector.kind() {
            match exact {
                Some((first, prior)) if prior != version => {
                    return Err(Error::InstallConflict {
                        name: name.to_string(),
                        first: first.raw().to_string(),
                        second: selector.raw().to_string(),
                    });
                }
                None => exact = Some((selector, version)),
                _ => {}
            }
        }
    }
    Ok(())
}

fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(
                entry
                    .path()
                    .strip_prefix(root)
                    .expect("walkdir yields children of root")
                    .to_path_buf(),
            );
        }
    }
    Ok(files)
}

/// Remove now-empty directories bottom-up, the package dir included.
fn prune_empty_dirs(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Ok(());
    }
    let mut dirs: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.path().to_path_buf())
        .collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        let _ = fs::remove_dir(dir);
    }
    Ok(())
}

/// Pull the manifest out of a dist archive without unpacking it.
fn read_archive_manifest(bytes: &[u8]) -> Option<Manifest> {
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(std::io::Cursor::new(bytes)));
    for entry in archive.entries().ok()? {
        let mut entry = entry.ok()?;
        let path = entry.path().ok()?.to_path_buf();
        if path == Path::new(MANIFEST_FILENAME) {
            let mut text = String::new();
            std::io::Read::read_to_string(&mut entry, &mut text).ok()?;
            return Manifest::parse(&text).ok();
        }
    }
    None
}

/// Temporarily neutralize `~/.pydistutils.cfg` under an advisory lock so a
/// prefix-based host install cannot trip over a user configuration, then
/// restore the previous contents.
fn with_pydistutils_guard<T>(run: impl FnOnce() -> Result<T>) -> Result<T> {
    let Some(home) = dirs::home_dir() else {
        return run();
    };
    let cfg = home.join(".pydistutils.cfg");

    let lock_path = global_prefix()
        .unwrap_or_else(std::env::temp_dir)
        .join("pydistutils.lock");
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let lock = fs::File::create(&lock_path)?;
    lock.lock_exclusive()?;

    let previous = fs::read(&cfg).ok();
    fs::write(&cfg, b"[install]\nprefix=\n")?;
    let result = run();
    match previous {
        Some(bytes) => fs::write(&cfg, bytes)?,
        None => {
            let _ = fs::remove_file(&cfg);
        }
    }
    let _ = fs2::FileExt::unlock(&lock);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pm::registry::MemoryRegistry;
    use tempfile::tempdir;

    fn manifest_json(name: &str, version: &str, extra: &str) -> String {
        format!(
            r#"{{"name":"{}","version":"{}"{}}}"#,
            name, version, extra
        )
    }

    /// Build a real dist archive for a package with the given files.
    fn make_archive(name: &str, version: &str, extra: &str, files: &[(&str, &str)]) -> (Manifest, Vec<u8>) {
        let dir = tempdir().unwrap();
        let manifest = Manifest::parse(&manifest_json(name, version, extra)).unwrap();
        manifest.save(&dir.path().join(MANIFEST_FILENAME)).unwrap();
        for (rel, contents) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        let archive = dist::pack(dir.path(), &manifest).unwrap();
        (manifest, fs::read(archive).unwrap())
    }

    fn seeded_registry(entries: &[(&str, &str, &str)]) -> MemoryRegistry {
        let registry = MemoryRegistry::new();
        for (name, version, extra) in entries {
            let (manifest, bytes) = make_archive(name, version, extra, &[("index.ns", "exports = {}\n")]);
            registry.add_package(manifest, bytes);
        }
        registry
    }

    #[test]
    fn test_parse_targets() {
        assert_eq!(
            parse_target("pkg@~1.2.0").unwrap(),
            InstallTarget::Registry {
                name: "pkg".to_string(),
                selector: Selector::parse("~1.2.0").unwrap(),
            }
        );
        assert!(matches!(
            parse_target("@scope/pkg@^2.0.0").unwrap(),
            InstallTarget::Registry { name, .. } if name == "@scope/pkg"
        ));
        assert!(matches!(
            parse_target("pkg").unwrap(),
            InstallTarget::Registry { .. }
        ));
        assert_eq!(
            parse_target("./local").unwrap(),
            InstallTarget::Directory {
                path: PathBuf::from("./local"),
                develop: false,
            }
        );
        assert!(matches!(
            parse_target("demo-1.0.0.tar.gz").unwrap(),
            InstallTarget::Archive { .. }
        ));
        assert_eq!(
            parse_target("git+https://example.com/r.git@main").unwrap(),
            InstallTarget::Git {
                url: "https://example.com/r.git".to_string(),
                reference: Some("main".to_string()),
            }
        );
        assert_eq!(
            parse_target("py/requests==2.31.0").unwrap(),
            InstallTarget::Host {
                name: "requests".to_string(),
                spec: Some("==2.31.0".to_string()),
            }
        );
        assert!(parse_target("bad name").is_err());
    }

    #[test]
    fn test_install_places_package_deterministically() {
        let ws = tempdir().unwrap();
        let registry = seeded_registry(&[("zed", "1.2.0", "")]);
        let installer =
            Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();

        let report = installer
            .install(&[parse_target("zed@1.2.0").unwrap()])
            .unwrap();
        assert_eq!(report.installed, vec!["zed@1.2.0"]);

        let dest = ws.path().join(MODULES_DIR).join("zed");
        assert!(dest.join(MANIFEST_FILENAME).is_file());
        assert!(dest.join("index.ns").is_file());
        assert!(dest.join(INSTALLED_FILES).is_file());
        assert!(!dest.join(PARTIAL_SENTINEL).exists());
        assert!(ws.path().join(MODULES_DIR).join(LOCK_FILE).is_file());
    }

    #[test]
    fn test_selector_picks_expected_versions() {
        let ws = tempdir().unwrap();
        let registry = seeded_registry(&[
            ("zed", "1.1.9", ""),
            ("zed", "1.2.0", ""),
            ("zed", "1.3.0-pre", ""),
        ]);
        let installer =
            Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();

        installer
            .install(&[parse_target("zed@~1.2.0").unwrap()])
            .unwrap();
        let placed =
            Manifest::load(&ws.path().join(MODULES_DIR).join("zed").join(MANIFEST_FILENAME))
                .unwrap();
        assert_eq!(placed.version, "1.2.0");

        // Caret also lands on 1.2.0: the pre-release stays excluded.
        let installer = Installer::new(
            ws.path(),
            &registry,
            InstallOptions {
                ignore_installed: true,
                ..Default::default()
            },
        )
        .unwrap();
        installer
            .install(&[parse_target("zed@^1.2.0").unwrap()])
            .unwrap();
        let placed =
            Manifest::load(&ws.path().join(MODULES_DIR).join("zed").join(MANIFEST_FILENAME))
                .unwrap();
        assert_eq!(placed.version, "1.2.0");
    }

    #[test]
    fn test_install_twice_is_idempotent() {
        let ws = tempdir().unwrap();
        let registry = seeded_registry(&[("zed", "1.2.0", "")]);
        let target = parse_target("zed@1.2.0").unwrap();

        let installer =
            Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();
        installer.install(std::slice::from_ref(&target)).unwrap();

        let index = ws.path().join(MODULES_DIR).join("zed").join("index.ns");
        let mtime = fs::metadata(&index).unwrap().modified().unwrap();

        let report = installer.install(std::slice::from_ref(&target)).unwrap();
        assert!(report.installed.is_empty());
        assert_eq!(report.skipped, vec!["zed@1.2.0"]);
        assert_eq!(fs::metadata(&index).unwrap().modified().unwrap(), mtime);
    }

    #[test]
    fn test_transitive_dependencies_installed() {
        let ws = tempdir().unwrap();
        let registry = seeded_registry(&[
            ("app", "1.0.0", r#","dependencies":{"base":"^0.1.0"}"#),
            ("base", "0.1.4", ""),
        ]);
        let installer =
            Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();

        let report = installer.install(&[parse_target("app").unwrap()]).unwrap();
        assert!(report.installed.contains(&"app@1.0.0".to_string()));
        assert!(report.installed.contains(&"base@0.1.4".to_string()));
    }

    #[test]
    fn test_dev_dependencies_only_for_root() {
        let ws = tempdir().unwrap();
        let registry = seeded_registry(&[
            (
                "app",
                "1.0.0",
                r#","dependencies":{"base":"*"},"dev-dependencies":{"toolkit":"*"}"#,
            ),
            ("base", "0.1.0", r#","dev-dependencies":{"hidden":"*"}"#),
            ("toolkit", "2.0.0", ""),
            ("hidden", "9.9.9", ""),
        ]);
        let installer =
            Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();

        let report = installer.install(&[parse_target("app").unwrap()]).unwrap();
        assert!(report.installed.contains(&"toolkit@2.0.0".to_string()));
        assert!(!report.installed.iter().any(|p| p.starts_with("hidden")));
    }

    #[test]
    fn test_production_skips_root_dev_dependencies() {
        let ws = tempdir().unwrap();
        let registry = seeded_registry(&[
            ("app", "1.0.0", r#","dev-dependencies":{"toolkit":"*"}"#),
            ("toolkit", "2.0.0", ""),
        ]);
        let installer = Installer::new(
            ws.path(),
            &registry,
            InstallOptions {
                production: true,
                ..Default::default()
            },
        )
        .unwrap();

        let report = installer.install(&[parse_target("app").unwrap()]).unwrap();
        assert!(!report.installed.iter().any(|p| p.starts_with("toolkit")));
    }

    #[test]
    fn test_exact_conflict_rejected() {
        let ws = tempdir().unwrap();
        let registry = seeded_registry(&[
            ("app", "1.0.0", r#","dependencies":{"base":"=1.0.0"}"#),
            ("other", "1.0.0", r#","dependencies":{"base":"=2.0.0"}"#),
            ("base", "1.0.0", ""),
            ("base", "2.0.0", ""),
        ]);
        let installer =
            Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();

        let err = installer
            .install(&[parse_target("app").unwrap(), parse_target("other").unwrap()])
            .unwrap_err();
        assert!(matches!(err, Error::InstallConflict { .. }));
    }

    #[test]
    fn test_soft_conflict_warns_and_picks_best() {
        let ws = tempdir().unwrap();
        let registry = seeded_registry(&[
            ("app", "1.0.0", r#","dependencies":{"base":"~1.0.0"}"#),
            ("other", "1.0.0", r#","dependencies":{"base":"~2.0.0"}"#),
            ("base", "1.0.5", ""),
            ("base", "2.0.3", ""),
        ]);
        let installer =
            Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();

        let report = installer
            .install(&[parse_target("app").unwrap(), parse_target("other").unwrap()])
            .unwrap();
        assert!(!report.warnings.is_empty());
        // The placed version satisfies at least one dependent.
        let placed =
            Manifest::load(&ws.path().join(MODULES_DIR).join("base").join(MANIFEST_FILENAME))
                .unwrap();
        assert!(placed.version == "1.0.5" || placed.version == "2.0.3");
    }

    #[test]
    fn test_develop_install_writes_link_only() {
        let ws = tempdir().unwrap();
        let src = tempdir().unwrap();
        Manifest::parse(&manifest_json("local", "0.1.0", ""))
            .unwrap()
            .save(&src.path().join(MANIFEST_FILENAME))
            .unwrap();
        fs::write(src.path().join("index.ns"), "exports = {}\n").unwrap();

        let registry = MemoryRegistry::new();
        let installer = Installer::new(
            ws.path(),
            &registry,
            InstallOptions {
                develop: true,
                ..Default::default()
            },
        )
        .unwrap();

        installer
            .install(&[InstallTarget::Directory {
                path: src.path().to_path_buf(),
                develop: true,
            }])
            .unwrap();

        let link = ws
            .path()
            .join(MODULES_DIR)
            .join(format!("local{}", LINK_SUFFIX));
        let contents = fs::read_to_string(&link).unwrap();
        assert_eq!(contents.trim(), src.path().to_string_lossy());
        // No copied tree.
        assert!(!ws.path().join(MODULES_DIR).join("local").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_post_install_leaves_partial_sentinel() {
        let ws = tempdir().unwrap();
        let registry = seeded_registry(&[(
            "broken",
            "1.0.0",
            r#","scripts":{"post-install":"!exit 7"}"#,
        )]);
        let installer =
            Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();

        let err = installer
            .install(&[parse_target("broken").unwrap()])
            .unwrap_err();
        assert!(matches!(err, Error::HookFailed { .. }));

        let dest = ws.path().join(MODULES_DIR).join("broken");
        assert!(dest.join(MANIFEST_FILENAME).is_file());
        assert!(dest.join(PARTIAL_SENTINEL).is_file());
    }

    #[test]
    fn test_save_rewrites_root_manifest() {
        let ws = tempdir().unwrap();
        Manifest::parse(&manifest_json("app", "0.0.1", ""))
            .unwrap()
            .save(&ws.path().join(MANIFEST_FILENAME))
            .unwrap();

        let registry = seeded_registry(&[("zed", "1.2.0", "")]);
        let installer = Installer::new(
            ws.path(),
            &registry,
            InstallOptions {
                save: Some(SaveKind::Dependencies),
                ..Default::default()
            },
        )
        .unwrap();
        installer
            .install(&[parse_target("zed@~1.2.0").unwrap()])
            .unwrap();

        let saved = Manifest::load(&ws.path().join(MANIFEST_FILENAME)).unwrap();
        assert_eq!(saved.dependencies.get("zed").unwrap(), "~1.2.0");
        let text = fs::read_to_string(ws.path().join(MANIFEST_FILENAME)).unwrap();
        assert!(text.contains("\n  \"dependencies\""));
    }

    #[test]
    fn test_uninstall_removes_files_and_shims() {
        let ws = tempdir().unwrap();
        let registry = seeded_registry(&[(
            "tooling",
            "1.0.0",
            r#","bin":{"tool":"cli"}"#,
        )]);
        let installer =
            Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();
        installer
            .install(&[parse_target("tooling").unwrap()])
            .unwrap();

        let dest = ws.path().join(MODULES_DIR).join("tooling");
        let shim = installer.dirs().bin().join(if cfg!(windows) {
            "tool.cmd"
        } else {
            "tool"
        });
        assert!(dest.is_dir());
        assert!(shim.is_file());

        installer.uninstall("tooling").unwrap();
        assert!(!dest.exists());
        assert!(!shim.exists());
    }

    #[test]
    fn test_version_mismatch_reports_available() {
        let ws = tempdir().unwrap();
        let registry = seeded_registry(&[("zed", "1.0.0", "")]);
        let installer =
            Installer::new(ws.path(), &registry, InstallOptions::default()).unwrap();

        let err = installer
            .install(&[parse_target("zed@^3.0.0").unwrap()])
            .unwrap_err();
        match err {
            Error::VersionMismatch { available, .. } => assert_eq!(available, vec!["1.0.0"]),
            other => panic!("unexpected error {}", other),
        }
    }
}
