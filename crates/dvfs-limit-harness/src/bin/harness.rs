//! CLI entrypoint for the DVFS limit harness.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dvfs_limit_core::endpoint;
use dvfs_limit_core::{Frequency, FrequencyTable, HardwareLimits, LimiterConfig};
use dvfs_limit_harness::structured_log::validate_log_file;
use dvfs_limit_harness::{JsonlLogger, LogEmitter, Scenario, scenario};
use parking_lot::Mutex;

/// Replay and inspection tooling for the DVFS limit arbiter.
#[derive(Debug, Parser)]
#[command(name = "dvfs-limit-harness")]
#[command(about = "Scenario replay for the DVFS min/max limit arbiter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a scenario against the in-memory platform.
    Run {
        /// Scenario JSON path.
        #[arg(long)]
        scenario: PathBuf,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Most verbose limiter record forwarded to the log.
        #[arg(long, default_value = "info")]
        level: log::LevelFilter,
        /// Output path for the JSON report (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Render the `cpufreq_table` attribute for a table.
    Table {
        /// Ascending operating points in kHz; `-` marks an invalid entry.
        #[arg(long, value_delimiter = ',', required = true)]
        khz: Vec<String>,
        /// Hardware minimum (defaults to the lowest valid entry).
        #[arg(long)]
        min: Option<u32>,
        /// Hardware maximum (defaults to the highest valid entry).
        #[arg(long)]
        max: Option<u32>,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            scenario: path,
            log,
            level,
            output,
        } => {
            let scenario = Scenario::from_file(&path)?;
            let emitter = match &log {
                Some(log_path) => {
                    let file = LogEmitter::to_file(log_path, &scenario.name)?;
                    let emitter = Arc::new(Mutex::new(file));
                    JsonlLogger::new(Arc::clone(&emitter), level).install()?;
                    Some(emitter)
                }
                None => None,
            };

            let report = scenario::run(&scenario, LimiterConfig::from_env(), emitter.as_ref())?;
            let json = serde_json::to_string_pretty(&report)?;
            match output {
                Some(out) => std::fs::write(&out, json + "\n")?,
                None => println!("{json}"),
            }
            eprintln!(
                "{}: {} passed, {} failed",
                report.name, report.passed, report.failed
            );
            if !report.all_passed() {
                return Err(format!("{} step(s) failed", report.failed).into());
            }
        }
        Command::Table { khz, min, max } => {
            let raw = khz
                .iter()
                .map(|token| match token.trim() {
                    "-" => Ok(None),
                    value => value.parse::<u32>().map(Some),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let table = FrequencyTable::from_khz(raw)?;
            let limits = match (
                min.map(Frequency::from_khz).or(table.lowest_valid()),
                max.map(Frequency::from_khz).or(table.highest_valid()),
            ) {
                (Some(min), Some(max)) => Some(HardwareLimits { min, max }),
                _ => None,
            };
            print!("{}", endpoint::show_table(&table, limits));
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            if !errors.is_empty() {
                return Err(format!("{} error(s) in {lines} line(s)", errors.len()).into());
            }
            println!("{}: {lines} line(s) valid", log.display());
        }
    }

    Ok(())
}
