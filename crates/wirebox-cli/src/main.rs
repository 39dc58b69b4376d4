//! Command line front end.
//!
//! One command, one optional flag: the root of the source tree to scan.
//! Exit code 0 when every generated file was written, 1 on any pipeline
//! failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "wirebox", version, about = "Compile-time dependency injection for Cargo workspaces")]
struct Args {
    /// Root of the source tree to scan.
    #[arg(long, default_value = ".")]
    path: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let args = Args::parse();
    match wirebox_gen::run(&args.path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
