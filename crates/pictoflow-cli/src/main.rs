//! Pictoflow pipeline CLI.
//!
//! Provides the `pictoflow` binary for inspecting and evaluating pipeline
//! documents against the bundled demo operation library.
//!
//! Reads engine configuration from environment variables:
//! - `PICTOFLOW_MAX_DEPTH`: hydration depth limit (default: 256)
//! - `PICTOFLOW_ALLOW_CYCLES`: accept cycle-closing links when `1` or `true`

mod library;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};

use pictoflow_core::{
    decode_with_config, encode_string, EngineConfig, GraphError, Pipeline, SerializedPipeline,
};

/// Pictoflow pipeline tools.
#[derive(Parser)]
#[command(name = "pictoflow", about = "Inspect and evaluate image pipeline documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// List the operation templates available to documents.
    Templates,

    /// Decode a document and print a structural summary.
    Check {
        /// Path to the pipeline document.
        file: PathBuf,
    },

    /// Decode a document and print the value of its output node.
    Run {
        /// Path to the pipeline document.
        file: PathBuf,
    },

    /// Decode a document and print it re-encoded.
    Normalize {
        /// Path to the pipeline document.
        file: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = engine_config(|key| std::env::var(key).ok());

    let exit_code = match cli.command {
        Commands::Templates => {
            for name in library::build().names() {
                println!("{}", name);
            }
            0
        }
        Commands::Check { file } => with_pipeline(&file, config, |pipeline| {
            let summary = json!({
                "nodes": pipeline.node_count(),
                "links": pipeline.link_count(),
                "output": pipeline.output_node_id(),
            });
            println!("{}", summary);
            Ok(())
        }),
        Commands::Run { file } => with_pipeline(&file, config, |pipeline| {
            let value = pipeline.evaluate()?;
            println!("{}", value);
            Ok(())
        }),
        Commands::Normalize { file } => with_pipeline(&file, config, |pipeline| {
            println!("{}", encode_string(pipeline)?);
            Ok(())
        }),
    };
    process::exit(exit_code);
}

/// Builds the engine configuration from an environment lookup.
fn engine_config(lookup: impl Fn(&str) -> Option<String>) -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(raw) = lookup("PICTOFLOW_MAX_DEPTH") {
        match raw.parse() {
            Ok(depth) => config.max_depth = depth,
            Err(_) => warn!(value = %raw, "ignoring invalid PICTOFLOW_MAX_DEPTH"),
        }
    }
    if let Some(raw) = lookup("PICTOFLOW_ALLOW_CYCLES") {
        config.reject_cycles = !matches!(raw.as_str(), "1" | "true");
    }
    config
}

/// Loads and decodes a document, then runs `action` on it.
///
/// Returns exit code: 0 = success, 1 = graph error, 3 = I/O error.
fn with_pipeline(
    path: &Path,
    config: EngineConfig,
    action: impl FnOnce(&mut Pipeline<Value, Value>) -> Result<(), GraphError>,
) -> i32 {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", path.display(), e);
            return 3;
        }
    };

    match load(&text, config).and_then(|mut pipeline| action(&mut pipeline)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn load(text: &str, config: EngineConfig) -> Result<Pipeline<Value, Value>, GraphError> {
    let document: SerializedPipeline<Value, Value> = serde_json::from_str(text)?;
    let pipeline = decode_with_config(document, library::build(), config)?;
    info!(
        nodes = pipeline.node_count(),
        links = pipeline.link_count(),
        "loaded pipeline"
    );
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_without_environment() {
        let config = engine_config(|_| None);
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn config_reads_environment() {
        let config = engine_config(|key| match key {
            "PICTOFLOW_MAX_DEPTH" => Some("12".to_string()),
            "PICTOFLOW_ALLOW_CYCLES" => Some("true".to_string()),
            _ => None,
        });
        assert_eq!(config.max_depth, 12);
        assert!(!config.reject_cycles);
    }

    #[test]
    fn invalid_depth_keeps_default() {
        let config = engine_config(|key| (key == "PICTOFLOW_MAX_DEPTH").then(|| "deep".to_string()));
        assert_eq!(config.max_depth, EngineConfig::default().max_depth);
    }

    #[test]
    fn load_rejects_malformed_json() {
        assert!(matches!(
            load("{\"nodes\": [", EngineConfig::default()),
            Err(GraphError::MalformedDocument { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let code = with_pipeline(
            Path::new("/nonexistent/pipeline.json"),
            EngineConfig::default(),
            |_| Ok(()),
        );
        assert_eq!(code, 3);
    }
}
