//! gridcalc - build a small workbook from the command line and print
//! evaluated cells or an ad-hoc formula.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use gridcalc_core::document::DEFAULT_SHEET_NAME;
use gridcalc_core::{Value, Workbook};
use gridcalc_engine::engine::format_value;

/// Evaluate spreadsheet cells and formulas
#[derive(Parser, Debug)]
#[command(
    name = "gridcalc",
    about = "Incremental spreadsheet recalculation with Rhai formulas",
    version
)]
struct Args {
    /// Set a cell, e.g. `A1=5`, `B1==A1*2` or `Data!A1="text"` (repeatable)
    #[arg(short, long = "set", value_name = "REF=INPUT")]
    set: Vec<String>,

    /// Add a sheet before any cell is set (repeatable)
    #[arg(long = "sheet", value_name = "NAME")]
    sheets: Vec<String>,

    /// Print the evaluated value of a cell (repeatable)
    #[arg(short, long = "print", value_name = "REF")]
    print: Vec<String>,

    /// Evaluate a formula against the workbook without storing it
    #[arg(short, long, value_name = "FORMULA")]
    command: Option<String>,

    /// Settings file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ignore the user config file
    #[arg(long)]
    no_config: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Returns whether every printed value was free of errors.
fn run(args: Args) -> Result<bool> {
    let config = config::load(args.config.as_deref(), args.no_config)?;
    let mut workbook = Workbook::new(config);

    for name in &args.sheets {
        workbook.add_sheet(name)?;
    }
    for assignment in &args.set {
        let (address, input) = assignment
            .split_once('=')
            .with_context(|| format!("expected REF=INPUT, got '{assignment}'"))?;
        let position = workbook.parse_address(address.trim())?;
        workbook.set_input_at(position, input)?;
    }

    let stats = workbook.recalculate();
    log::info!(
        "{} cells evaluated in {} passes",
        stats.evaluated,
        stats.passes
    );

    let mut clean = true;
    for address in &args.print {
        let position = workbook.parse_address(address.trim())?;
        let value = workbook.value_at(position);
        clean &= !matches!(value, Value::Error(_));
        println!("{}", format_value(&value));
    }

    if let Some(formula) = &args.command {
        let value = workbook.evaluate_ad_hoc(formula, DEFAULT_SHEET_NAME)?;
        clean &= !matches!(value, Value::Error(_));
        println!("{}", format_value(&value));
    }

    Ok(clean)
}
