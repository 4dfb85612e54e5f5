//! Min–max normalization of one table column.

use std::path::Path;

use anyhow::Result;

use crate::error::Error;
use crate::table::{self, Cell, ReadOptions, Table};

/// Range of a column before scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnRange {
    pub min: f64,
    pub max: f64,
}

/// Scale values to `[0, 1]`. The minimum maps to exactly 0 and the maximum
/// to exactly 1.
pub fn min_max_scale(values: &[f64], column: &str) -> crate::Result<(Vec<f64>, ColumnRange)> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() || max <= min {
        return Err(Error::ConstantColumn(column.to_string()));
    }
    let span = max - min;
    let scaled = values.iter().map(|v| (v - min) / span).collect();
    Ok((scaled, ColumnRange { min, max }))
}

/// Replace `column` of the table with its min–max scaled values. Empty
/// cells are left out of the range and stay empty.
pub fn min_max_normalize(table: &mut Table, column: &str) -> crate::Result<ColumnRange> {
    let values = table.sparse_numeric_column(column)?;
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let (scaled, range) = min_max_scale(&present, column)?;
    let mut scaled = scaled.into_iter();
    let cells = values
        .iter()
        .map(|v| match v {
            Some(_) => scaled.next().map_or(Cell::Empty, Cell::from),
            None => Cell::Empty,
        })
        .collect();
    table.set_column(column, cells)?;
    let skipped = values.len() - present.len();
    if skipped > 0 {
        tracing::warn!("{} empty '{}' cells left unscaled", skipped, column);
    }
    Ok(range)
}

/// Normalize one column of a CSV file and write the result as CSV.
pub fn run_normalize(input: &Path, output: &Path, column: &str) -> Result<ColumnRange> {
    let mut table = table::read_table(input, &ReadOptions::default())?;
    let range = min_max_normalize(&mut table, column)?;
    tracing::info!("{}: min={}, max={}, scaled to [0, 1]", column, range.min, range.max);

    table::write_table(output, &table)?;
    tracing::info!("Normalized table written to {:?}", output);
    Ok(range)
}
