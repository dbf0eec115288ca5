//! nodus runtime CLI
//!
//! Resolves and executes a request as the session's main module, or
//! evaluates an inline expression.

use clap::Parser;
use nodus::context::{OPT_AUTORELOAD, OPT_PYMAIN};
use nodus::engine::{self, Value};
use nodus::module::Namespace;
use nodus::require::RequireOptions;
use nodus::{Context, ContextOptions, Error};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "nodus")]
#[command(version, about = "Node.js-style module runtime for the nodus dialect", long_about = None)]
struct Cli {
    /// Request to resolve and execute as the main module
    #[arg(value_name = "REQUEST")]
    request: Option<String>,

    /// Arguments passed to the main module
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Evaluate an expression instead of running a request
    #[arg(short = 'c', value_name = "EXPR", conflicts_with = "request")]
    eval: Option<String>,

    /// Enter the post-mortem debugger on uncaught errors
    #[arg(short = 'd')]
    post_mortem: bool,

    /// Override the resolution base directory
    #[arg(long = "current-dir", value_name = "DIR")]
    current_dir: Option<PathBuf>,

    /// Keep the runtime executable as argv[0] for the script
    #[arg(long = "keep-arg0")]
    keep_arg0: bool,

    /// Preload a module before the main request (repeatable)
    #[arg(short = 'P', value_name = "MODULE")]
    preload: Vec<String>,

    /// Force a loader instead of suffix detection
    #[arg(short = 'L', value_name = "LOADER")]
    loader: Option<String>,

    /// Make host-style `__main__` detection succeed in the entry module
    #[arg(long)]
    pymain: bool,

    /// Write profiling data to a file
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Isolate restorable session-global state while entered
    #[arg(long)]
    isolated: bool,

    /// Re-execute modules whose source changed since their last execution
    #[arg(long)]
    autoreload: bool,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = Cli::parse();
    nodus::env::init_tracing();

    let post_mortem = cli.post_mortem || nodus::env::apply_pmd();
    if let Some(selector) = nodus::env::tracing_selector() {
        tracing::debug!(tracer = %selector, "external tracer requested");
    }

    let ctx = Context::new(ContextOptions {
        current_dir: cli.current_dir.clone(),
        isolated: cli.isolated,
    });
    if cli.pymain {
        ctx.set_option(OPT_PYMAIN, Value::Bool(true));
    }
    if cli.autoreload {
        ctx.set_option(OPT_AUTORELOAD, Value::Bool(true));
    }
    ctx.enter();

    let started = Instant::now();
    let result = execute(&ctx, &cli);
    let elapsed = started.elapsed();

    if let Some(profile) = &cli.profile {
        let report = format!(
            "total_ms: {}\nmodules_loaded: {}\n",
            elapsed.as_millis(),
            ctx.module_cache_pairs().len()
        );
        if let Err(err) = std::fs::write(profile, report) {
            tracing::warn!(file = %profile.display(), error = %err, "profile write failed");
        }
    }

    ctx.leave();

    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err);
            if post_mortem {
                // The post-mortem debugger is an external collaborator; the
                // selector decides which one a wrapper attaches.
                match nodus::env::breakpoint_selector() {
                    Some(selector) => eprintln!("post-mortem requested ({})", selector),
                    None => eprintln!("post-mortem requested"),
                }
            }
            if err.is_runtime_kind() {
                1
            } else {
                127
            }
        }
    }
}

fn execute(ctx: &std::rc::Rc<Context>, cli: &Cli) -> nodus::Result<()> {
    let require = ctx.require_root();

    for preload in &cli.preload {
        require.require(preload)?;
    }

    if let Some(expr) = &cli.eval {
        return eval_expression(expr);
    }

    let Some(request) = &cli.request else {
        // Nothing to do; mirror `-h` behavior without an error.
        println!("usage: nodus [OPTIONS] [REQUEST | -c EXPR] [args...]");
        return Ok(());
    };

    let module = match require.require_with(
        request,
        RequireOptions {
            is_main: true,
            exec: false,
            exports: false,
            loader: cli.loader.clone(),
            ..Default::default()
        },
    )? {
        Value::Module(module) => module,
        other => {
            return Err(Error::load(
                request,
                format!("expected a module handle, got {}", other.type_name()),
            ))
        }
    };

    let arg0 = if cli.keep_arg0 {
        std::env::args()
            .next()
            .unwrap_or_else(|| "nodus".to_string())
    } else {
        module.filename().to_string()
    };
    let mut argv = vec![Value::str(arg0)];
    argv.extend(cli.args.iter().map(Value::str));
    module.namespace().set("argv", Value::list(argv));

    ctx.exec_module(&module)
}

/// `-c EXPR`: run dialect source in a scratch scope with the standard
/// builtins; scripts print their own output.
fn eval_expression(source: &str) -> nodus::Result<()> {
    let program = engine::compile(source).map_err(|e| Error::Exec(e.with_file("<eval>")))?;
    let scope = Namespace::new();
    for (name, value) in engine::standard_builtins() {
        scope.set(name, value);
    }
    if let Some(ctx) = Context::current() {
        scope.set("require", Value::Require(ctx.require_root()));
    }
    engine::execute(&program, &scope).map_err(|e| Error::Exec(e.with_file("<eval>")))?;
    Ok(())
}
