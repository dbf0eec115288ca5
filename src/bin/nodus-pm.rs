//! nodus package manager CLI
//!
//! Subcommands over the installer, dist packer, hook runner and registry
//! request surface.

use anyhow::{anyhow, bail, Context as _};
use clap::{Parser, Subcommand};
use nodus::manifest::{Manifest, MANIFEST_FILENAME};
use nodus::pm::config::PmConfig;
use nodus::pm::installer::{
    parse_target, InstallDirs, InstallOptions, InstallReport, Installer, SaveKind,
};
use nodus::pm::registry::{HttpRegistry, Registry};
use nodus::pm::{dist, hooks};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "nodus-pm")]
#[command(version, about = "Package manager for the nodus runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Registry section from the config file (first one by default)
    #[arg(long, global = true, value_name = "NAME")]
    registry: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the shim directory
    Bin {
        #[arg(long)]
        global: bool,
    },
    /// Pack a dist archive of the current package
    Dist,
    /// Scaffold a manifest in the current directory
    Init,
    /// Install packages, or the workspace dependencies with no targets
    Install {
        /// `<pkg>[@<ver>]`, `./path`, `<file>.tar.gz`, `git+<url>[@<ref>]`,
        /// `py/<host-pkg>[==ver]`
        targets: Vec<String>,

        /// Develop install: link directory targets instead of copying
        #[arg(short = 'e', long)]
        develop: bool,

        /// Install into the per-user prefix
        #[arg(long)]
        global: bool,

        /// Install into the system or virtualenv prefix
        #[arg(long)]
        root: bool,

        /// Expand the root target's dev-dependencies
        #[arg(long)]
        dev: bool,

        /// Skip the root target's dev-dependencies
        #[arg(long, conflicts_with = "dev")]
        production: bool,

        /// Record the dependency in the manifest
        #[arg(long)]
        save: bool,

        /// Record the dependency under dev-dependencies
        #[arg(long, conflicts_with = "save")]
        save_dev: bool,

        /// Record the target under extensions
        #[arg(long, conflicts_with_all = ["save", "save_dev"])]
        save_ext: bool,

        /// Re-place packages even when a satisfying version is present
        #[arg(long)]
        ignore_installed: bool,

        /// Re-evaluate satisfied dependencies' subtrees
        #[arg(long)]
        recursive: bool,

        /// Let plain selectors match pre-release versions
        #[arg(long)]
        pre: bool,
    },
    /// Pack the current package and upload it to the registry
    Publish,
    /// Create an account on the registry
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        email: String,
    },
    /// Run a manifest script by name
    Run {
        script: String,
    },
    /// Remove an installed package
    Uninstall {
        name: String,
        #[arg(long)]
        global: bool,
    },
    /// Upload a previously packed archive for the current package
    Upload {
        archive: PathBuf,
    },
    /// Print or rewrite the package version
    Version {
        new_version: Option<String>,
    },
    /// Print the computed install directories
    Dirs {
        #[arg(long)]
        global: bool,
    },
}

fn main() {
    nodus::env::init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;
    let config = PmConfig::load_default()?;
    let registry_config = config
        .registry(cli.registry.as_deref())
        .ok_or_else(|| anyhow!("no such registry '{}'", cli.registry.as_deref().unwrap_or("")))?
        .clone();
    let registry = HttpRegistry::new(&registry_config);

    match cli.command {
        Commands::Bin { global } => {
            let dirs = dirs_for(&cwd, global)?;
            println!("{}", dirs.bin().display());
        }
        Commands::Dirs { global } => {
            let dirs = dirs_for(&cwd, global)?;
            println!("modules: {}", dirs.modules.display());
            println!("bin:     {}", dirs.bin().display());
            println!("pip:     {}", dirs.host_target().display());
            if let Ok(global_dirs) = InstallDirs::global() {
                println!("global:  {}", global_dirs.modules.display());
            }
        }
        Commands::Dist => {
            let manifest = workspace_manifest(&cwd)?;
            let archive = dist::pack(&cwd, &manifest)?;
            println!("{}", archive.display());
        }
        Commands::Init => init_manifest(&cwd, &config)?,
        Commands::Install {
            targets,
            develop,
            global,
            root,
            dev,
            production,
            save,
            save_dev,
            save_ext,
            ignore_installed,
            recursive,
            pre,
        } => {
            let save = if save {
                Some(SaveKind::Dependencies)
            } else if save_dev {
                Some(SaveKind::DevDependencies)
            } else if save_ext {
                Some(SaveKind::Extensions)
            } else {
                None
            };
            let options = InstallOptions {
                global,
                root,
                develop,
                production,
                dev: dev || !production,
                ignore_installed,
                recursive,
                save,
                include_prereleases: pre,
                ..Default::default()
            };
            let installer = Installer::new(&cwd, &registry, options)?;
            let report = if targets.is_empty() {
                installer.install_root_dependencies()?
            } else {
                let targets = targets
                    .iter()
                    .map(|t| parse_target(t))
                    .collect::<nodus::Result<Vec<_>>>()?;
                installer.install(&targets)?
            };
            print_report(&report);
        }
        Commands::Publish => publish(&cwd, &registry)?,
        Commands::Register {
            username,
            password,
            email,
        } => {
            registry.register(&username, &password, &email)?;
            println!("registered '{}' at {}", username, registry.url());
        }
        Commands::Run { script } => {
            let manifest = workspace_manifest(&cwd)?;
            let entry = manifest
                .scripts
                .get(&script)
                .ok_or_else(|| {
                    anyhow!(
                        "no script '{}' (available: {})",
                        script,
                        manifest
                            .scripts
                            .keys()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                })?
                .clone();
            hooks::run_script(&cwd, &manifest, &script, &entry)?;
        }
        Commands::Uninstall { name, global } => {
            let options = InstallOptions {
                global,
                ..Default::default()
            };
            let installer = Installer::new(&cwd, &registry, options)?;
            installer.uninstall(&name)?;
            println!("uninstalled '{}'", name);
        }
        Commands::Upload { archive } => {
            let manifest = workspace_manifest(&cwd)?;
            let bytes = std::fs::read(&archive)
                .with_context(|| format!("reading {}", archive.display()))?;
            registry.upload(&manifest.name, &manifest.parsed_version(), &bytes)?;
            println!("uploaded {}", manifest.identifier());
        }
        Commands::Version { new_version } => {
            let path = cwd.join(MANIFEST_FILENAME);
            let mut manifest = workspace_manifest(&cwd)?;
            match new_version {
                None => println!("{}", manifest.identifier()),
                Some(version) => {
                    version
                        .parse::<nodus::Version>()
                        .map_err(|e| anyhow!("{}", e))?;
                    manifest.version = version;
                    manifest.save(&path)?;
                    println!("{}", manifest.identifier());
                }
            }
        }
    }
    Ok(())
}

fn dirs_for(cwd: &Path, global: bool) -> nodus::Result<InstallDirs> {
    InstallDirs::for_options(
        cwd,
        &InstallOptions {
            global,
            ..Default::default()
        },
    )
}

fn workspace_manifest(cwd: &Path) -> nodus::Result<Manifest> {
    Manifest::load(&cwd.join(MANIFEST_FILENAME))
}

fn init_manifest(cwd: &Path, config: &PmConfig) -> anyhow::Result<()> {
    let path = cwd.join(MANIFEST_FILENAME);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let name = cwd
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase().replace(' ', "-"))
        .filter(|n| nodus::manifest::is_valid_name(n))
        .unwrap_or_else(|| "new-package".to_string());

    let manifest = Manifest {
        name,
        version: "0.1.0".to_string(),
        license: config.license.clone(),
        ..Default::default()
    };
    manifest.save(&path)?;
    if let Some(author) = &config.author {
        tracing::info!(author = %author, "manifest created");
    }
    println!("wrote {}", path.display());
    Ok(())
}

fn publish(cwd: &Path, registry: &dyn Registry) -> anyhow::Result<()> {
    let manifest = workspace_manifest(cwd)?;
    if manifest.private {
        bail!("'{}' is marked private", manifest.name);
    }
    if manifest.license.is_none() {
        bail!("publishing requires a license field");
    }

    hooks::run_hook(cwd, &manifest, hooks::PRE_PUBLISH)?;
    let archive = dist::pack(cwd, &manifest)?;
    let bytes = std::fs::read(&archive)?;
    registry.upload(&manifest.name, &manifest.parsed_version(), &bytes)?;
    hooks::run_hook(cwd, &manifest, hooks::POST_PUBLISH)?;

    println!(
        "published {} ({}, {})",
        manifest.identifier(),
        archive.display(),
        dist::integrity(&bytes)
    );
    Ok(())
}

fn print_report(report: &InstallReport) {
    for installed in &report.installed {
        println!("installed {}", installed);
    }
    for skipped in &report.skipped {
        println!("up to date {}", skipped);
    }
    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
}
