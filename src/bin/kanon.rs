//! CLI entry point. Selects algorithm and backend, resolves configuration
//! from a file, runs the anonymization, and reports NCP. See `spec.md` §6
//! "CLI surface" and `SPEC_FULL.md` §6.
//!
//! The core itself never touches a file or a socket; this binary is the
//! external collaborator that wires a concrete `Backend` to it.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Deserialize;

use kanon::backend::memory::{FieldValue, InMemoryBackend, Record};
use kanon::driver::{self, Algorithm};
use kanon::RawConfig;

#[derive(Parser, Debug)]
#[command(name = "kanon", about = "A k-anonymization engine: Mondrian and Datafly over an abstract backend.")]
struct Cli {
    /// Which anonymization algorithm to run.
    #[arg(long, value_parser = ["mondrian", "datafly"])]
    algorithm: String,

    /// Which backend to query. Only `memory` is implemented in this core;
    /// `es`/`mysql` are out-of-scope external collaborators (`spec.md` §1).
    #[arg(long, value_parser = ["es", "mysql", "memory"])]
    backend: String,

    /// Path to the JSON configuration document (`spec.md` §6).
    #[arg(long)]
    config: PathBuf,

    /// Path to a JSON array of records, required for `--backend memory`.
    #[arg(long)]
    records: Option<PathBuf>,
}

/// One record as read from the `--records` JSON file: a flat object mapping
/// field name to either a JSON number or a JSON string.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RawRecord(HashMap<String, serde_json::Value>);

fn load_records(path: &PathBuf) -> Result<Vec<Record>, String> {
    let contents = fs::read_to_string(path).map_err(|e| format!("reading '{}': {e}", path.display()))?;
    let raw: Vec<RawRecord> =
        serde_json::from_str(&contents).map_err(|e| format!("parsing '{}': {e}", path.display()))?;

    raw.into_iter()
        .map(|RawRecord(fields)| {
            let mut record = Record::new();
            for (name, value) in fields {
                let field = match value {
                    serde_json::Value::Number(n) => {
                        let i = n.as_i64().ok_or_else(|| format!("field '{name}' is not an integer"))?;
                        FieldValue::Int(i)
                    }
                    serde_json::Value::String(s) => FieldValue::Str(s),
                    other => return Err(format!("field '{name}' has unsupported value {other}")),
                };
                record.insert(name, field);
            }
            Ok(record)
        })
        .collect()
}

fn run(cli: Cli) -> Result<(), String> {
    let algorithm = Algorithm::parse(&cli.algorithm).map_err(|e| e.to_string())?;

    let config_contents =
        fs::read_to_string(&cli.config).map_err(|e| format!("reading '{}': {e}", cli.config.display()))?;
    let raw_config: RawConfig =
        serde_json::from_str(&config_contents).map_err(|e| format!("parsing '{}': {e}", cli.config.display()))?;

    match cli.backend.as_str() {
        "es" | "mysql" => {
            return Err(format!(
                "backend '{}' is an external collaborator not implemented in this core (spec.md §1)",
                cli.backend
            ));
        }
        "memory" => {
            let records_path = cli
                .records
                .ok_or_else(|| "--backend memory requires --records <path>".to_string())?;
            let records = load_records(&records_path)?;
            let mut backend = InMemoryBackend::new(records);

            let report = driver::run(algorithm, raw_config, &mut backend).map_err(|e| e.to_string())?;
            log::info!("{} partitions published, NCP = {:.2}%", report.partitions.len(), report.ncp);
            println!("partitions: {}", report.partitions.len());
            println!("ncp: {:.2}%", report.ncp);
            Ok(())
        }
        other => unreachable!("clap value_parser should reject unknown backend '{other}'"),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
