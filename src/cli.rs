//! `clap`-derived CLI surface for the `sn` compiler driver (spec.md §6:
//! "CLI surface (shape only; flag set owned by the external CLI
//! collaborator)" — this is that collaborator).

use std::path::PathBuf;

use clap::Parser;

use crate::driver::{self, CompileOptions, NullTypeChecker, PassthroughCodeGenerator};
use crate::error::CompileError;

#[derive(Parser, Debug)]
#[command(name = "sn")]
#[command(about = "Sindarin compiler", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Source file to compile.
    pub source: PathBuf,

    /// Stop after code generation and keep only the `.c` translation unit.
    #[arg(long = "emit-c")]
    pub emit_c: bool,

    /// Retain the intermediate `.c` file after a successful link.
    #[arg(long = "keep-c")]
    pub keep_c: bool,

    /// Print the child compiler command and path-resolution decisions.
    #[arg(long, short)]
    pub verbose: bool,

    /// Select the debug flag set instead of release.
    #[arg(long)]
    pub debug: bool,

    /// Executable output path.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Override the auto-detected compiler directory.
    #[arg(long = "compiler-dir")]
    pub compiler_dir: Option<PathBuf>,

    /// Override the SDK root (equivalent to `SN_SDK`).
    #[arg(long)]
    pub sdk: Option<PathBuf>,
}

impl Cli {
    fn into_options(self) -> CompileOptions {
        CompileOptions {
            source: self.source,
            emit_c_only: self.emit_c,
            keep_c: self.keep_c,
            verbose: self.verbose,
            debug_mode: self.debug,
            output: self.output,
            compiler_dir: self.compiler_dir,
            sdk: self.sdk,
        }
    }
}

/// Installs `tracing-subscriber`'s `fmt` layer with an `EnvFilter` seeded
/// from `RUST_LOG`, falling back to `info` (or `debug` under `--verbose`)
/// when the variable is unset.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Parses `argv`, runs the compile pipeline with the default (no-op)
/// type-checker/code-generator pair, and returns the exit code (spec.md
/// §6's "Exit code 0 on success, 1 on any compilation or linking failure").
pub fn run_cli() -> i32 {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = cli.into_options();
    let mut type_checker = NullTypeChecker;
    let mut code_generator = PassthroughCodeGenerator;

    match driver::compile(&options, &mut type_checker, &mut code_generator) {
        Ok(path) => {
            tracing::info!(path = %path.display(), "done");
            0
        }
        Err(err) => {
            report_error(&err);
            1
        }
    }
}

fn report_error(err: &CompileError) {
    eprintln!("error: {err}");
}
