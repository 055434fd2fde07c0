//! Report rendering.

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, Table};

use crate::config::OutputFormat;
use crate::error::{Error, Result};
use crate::operation::Operation;
use crate::runner::{Outcome, RunReport, StrategyReport};

/// Render a run report in the requested format.
pub fn render(report: &RunReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(report)),
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).map_err(|e| Error::Io(e.into()))
        }
    }
}

/// One block per operation: a header line followed by one row per strategy.
pub fn render_table(report: &RunReport) -> String {
    let mut output = String::new();
    for &op in &report.operations {
        output.push('\n');
        output.push_str(&format!("Operation: {}\n", op));
        output.push_str(&operation_table(report, op).to_string());
        output.push('\n');
    }
    output
}

fn operation_table(report: &RunReport, op: Operation) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    for strategy in &report.strategies {
        table.add_row(strategy_row(strategy, op));
    }
    table
}

fn right(content: impl ToString) -> Cell {
    Cell::new(content.to_string()).set_alignment(CellAlignment::Right)
}

fn strategy_row(strategy: &StrategyReport, op: Operation) -> Vec<Cell> {
    let name = right(format!("{}:", strategy.strategy));
    if let Some(error) = &strategy.error {
        return vec![name, Cell::new(format!("not run: {}", error))];
    }
    match strategy.outcome(op) {
        Some(Outcome::Measured(result)) if result.failed() => {
            let first = result.errors.first().map(String::as_str).unwrap_or("unknown error");
            vec![
                name,
                Cell::new(format!(
                    "failed: {} ({} of {} calls)",
                    first, result.error_count, result.iterations
                )),
            ]
        }
        Some(Outcome::Measured(result)) => vec![
            name,
            right(result.iterations),
            right(format!("{} ns/op", result.ns_per_op())),
            right(format!("{} B/op", result.bytes_per_op())),
            right(format!("{} allocs/op", result.allocs_per_op())),
        ],
        Some(Outcome::Failed { reason }) => vec![name, Cell::new(format!("failed: {}", reason))],
        Some(Outcome::Skipped { reason }) => vec![name, Cell::new(format!("skipped: {}", reason))],
        None => vec![name, Cell::new("not run")],
    }
}
