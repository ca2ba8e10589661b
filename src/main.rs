//! Runs an application made only of the default extensions.
//!
//! Useful for checking a project's settings and health endpoints before any
//! extensions of its own exist.

use std::process::ExitCode;

use cuneus::{build_app, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    match build_app(settings).build() {
        Ok((_app, cli)) => cli.run().await,
        Err(e) => {
            eprintln!("Failed to build application: {e}");
            ExitCode::FAILURE
        }
    }
}
