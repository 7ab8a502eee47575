//! Command-line runner (A.4), grounded on `bpmn-lite-server/src/main.rs`'s
//! `tracing_subscriber` setup and argument wiring, with the gRPC server and
//! persistence layer stripped per the engine's non-goals.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sim_core::config::SimConfig;
use sim_core::process::ProcessDefinition;
use sim_core::{simulate, simulate_comparison};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "sim-cli", about = "Run the assembly-line simulation engine")]
struct Args {
    /// Path to the process definition (YAML or JSON).
    #[arg(long)]
    process: PathBuf,

    /// Path to the run configuration (YAML or JSON).
    #[arg(long)]
    config: PathBuf,

    /// Also run the rest-disabled comparison variant and print both.
    #[arg(long)]
    compare: bool,
}

fn load_process(path: &PathBuf) -> Result<ProcessDefinition, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    serde_yaml::from_str(&text).map_err(|e| format!("parsing {}: {e}", path.display()))
}

fn load_config(path: &PathBuf) -> Result<SimConfig, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    SimConfig::from_yaml(&text).map_err(|e| format!("parsing {}: {e}", path.display()))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let process_def = match load_process(&args.process) {
        Ok(p) => p,
        Err(e) => {
            error!(%e, "failed to load process definition");
            return ExitCode::FAILURE;
        }
    };
    let config = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    if args.compare {
        let result = simulate_comparison(config, process_def);
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({
            "standard": result.standard,
            "rest_disabled": result.rest_disabled,
        })).expect("result is always serializable"));
    } else {
        let result = simulate(config, process_def);
        println!("{}", serde_json::to_string_pretty(&result).expect("result is always serializable"));
    }

    ExitCode::SUCCESS
}
