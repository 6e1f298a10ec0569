//! Runs one analysis and prints the result as JSON for the renderer
//!
//! Usage: `shaketune <config.toml>`; `RUST_LOG` sets the log level.

use std::path::PathBuf;
use std::process::ExitCode;

use shaketune::{pipeline, AnalysisConfig};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: shaketune <config.toml>");
        return ExitCode::from(2);
    };

    let config = match AnalysisConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(2);
        }
    };

    let result = match pipeline::run(&config) {
        Ok(result) => result,
        Err(e) => {
            log::error!("{} analysis failed: {e}", config.graph.name());
            return ExitCode::FAILURE;
        }
    };

    match result.to_json() {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Failed to serialise the result: {e}");
            ExitCode::FAILURE
        }
    }
}
