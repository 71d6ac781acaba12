use clap::Parser;
use crate::{
    metadata::manifest::ProgramManifest,
    prepare::{translate, PrepareOptions},
};
use std::{path::PathBuf, process::ExitCode};
use tracing_subscriber::EnvFilter;

#[macro_use]
mod macros;

pub mod decode;
pub mod dispatch;
pub mod emit;
pub mod error;
pub mod instructions;
pub mod metadata;
pub mod prepare;
pub mod types;
pub mod utils;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Translates IL method bodies from a program manifest into C"
)]
pub struct Args {
    /// JSON program manifest to translate
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,
    /// Where to write the C source; stdout when absent
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// Only translate methods declared on public types
    #[arg(long)]
    pub public_only: bool,
    /// Stop at the first method or type that fails to translate
    #[arg(long)]
    pub fail_fast: bool,
}

/// Logs to stderr, filtered by `RUST_LOG` and defaulting to warnings.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run_cli() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    let metadata = match ProgramManifest::load(&args.manifest).and_then(|m| m.build()) {
        Ok(metadata) => metadata,
        Err(e) => {
            eprintln!("{}: {e}", args.manifest.display());
            return ExitCode::FAILURE;
        }
    };

    let options = PrepareOptions {
        public_only: args.public_only,
        fail_fast: args.fail_fast,
    };
    let translation = match translate(&metadata, &options) {
        Ok(translation) => translation,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let written = match &args.output {
        Some(path) => std::fs::write(path, &translation.source),
        None => {
            print!("{}", translation.source);
            Ok(())
        }
    };
    if let Err(e) = written {
        eprintln!("could not write output: {e}");
        return ExitCode::FAILURE;
    }

    for failure in &translation.failures {
        eprintln!("error: {failure}");
    }
    if translation.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
