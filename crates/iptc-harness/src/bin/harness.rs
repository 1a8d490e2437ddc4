//! CLI entrypoint for the `iptc` conformance harness.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

/// Conformance tooling for `iptc-core`.
#[derive(Debug, Parser)]
#[command(name = "iptc-harness")]
#[command(about = "Conformance testing harness for the iptc ruleset cache/compiler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the S1-S6 literal end-to-end scenarios and report pass/fail.
    Scenarios {
        /// Output report path (JSON). If omitted, prints to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct ScenarioReport {
    ok: bool,
    outcomes: Vec<iptc_harness::ScenarioOutcome>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Scenarios { output } => run_scenarios(output),
    }
}

fn run_scenarios(output: Option<PathBuf>) -> ExitCode {
    let outcomes = iptc_harness::run_all();
    let ok = outcomes.iter().all(|o| o.passed);
    let report = ScenarioReport { ok, outcomes };
    let json = serde_json::to_string_pretty(&report).expect("report serializes");

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &json) {
                eprintln!("failed writing {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
        None => println!("{json}"),
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
