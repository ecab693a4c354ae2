//! Batch driver: load inputs, verify preconditions, run the assignment
//! pipeline, persist the table and reports.
//!
//! Usage:
//!   gauge_assign_service [config.toml] [--resume]
//!
//! With `--resume`, a previously cached `assign_table.csv` is reloaded in
//! place of regenerating from the input tables. Every stage is a pure
//! function of its input table, so re-running the pipeline over a partially
//! assigned checkpoint converges to the same result as an uninterrupted run.

use std::error::Error;
use std::process::ExitCode;

use gauge_assign_service::assign;
use gauge_assign_service::config::{self, AssignConfig, DEFAULT_CONFIG_PATH};
use gauge_assign_service::logging::{self, LogLevel, Stage};
use gauge_assign_service::table::{self, AssignTable};
use gauge_assign_service::verify;

fn main() -> ExitCode {
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    let mut resume = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--resume" => resume = true,
            "--help" | "-h" => {
                println!("usage: gauge_assign_service [config.toml] [--resume]");
                return ExitCode::SUCCESS;
            }
            other if other.starts_with('-') => {
                eprintln!("unknown flag '{}'", other);
                return ExitCode::FAILURE;
            }
            other => config_path = other.to_string(),
        }
    }

    let config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config {}: {}", config_path, e);
            return ExitCode::FAILURE;
        }
    };

    let level = config
        .log
        .level
        .parse::<LogLevel>()
        .unwrap_or(LogLevel::Info);
    let log_file = (!config.log.file.is_empty()).then_some(config.log.file.as_str());
    logging::init_logger(level, log_file, config.log.timestamps);

    match run(&config, resume) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::error(Stage::System, None, &e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn run(config: &AssignConfig, resume: bool) -> Result<(), Box<dyn Error>> {
    let workdir = &config.workdir;

    let table = if resume && table::assign_table_path(workdir).exists() {
        logging::info(Stage::System, None, "resuming from cached assign table");
        table::read_assign_table(workdir)?
    } else {
        let drain = table::read_drain_table(workdir)?;
        let gauges = table::read_gauge_table(workdir)?;
        let labels = table::read_cluster_labels(workdir)?;
        let table = AssignTable::generate(drain, gauges, labels)?;
        table::write_assign_table(&table, workdir)?;
        table
    };

    // Preconditions are checked before any stage runs; a malformed table
    // never partially executes.
    let report = verify::preflight(&table, config.outlet_sentinel)?;
    let report_path = verify::write_report(&report, workdir)?;
    logging::info(
        Stage::Verify,
        None,
        &format!("validation report written to {}", report_path.display()),
    );

    let table = assign::run_pipeline(table, config)?;

    let summary = assign::summarize(&table);
    assign::log_summary(&summary);
    logging::info(
        Stage::System,
        None,
        &format!(
            "assign table written to {}",
            table::assign_table_path(workdir).display()
        ),
    );
    Ok(())
}
