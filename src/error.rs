//! Error types for geostat

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the analysis pipelines
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Column '{column}' has a non-numeric value at row {row}")]
    NonNumeric { column: String, row: usize },

    #[error("Column '{0}' is constant")]
    ConstantColumn(String),

    #[error("Row has {actual} cells, table has {expected} columns")]
    RowWidth { expected: usize, actual: usize },

    #[error("Invalid raster dimensions: {rows}x{cols} with {len} values")]
    InvalidDimensions { rows: usize, cols: usize, len: usize },

    #[error("Spatial weights error: {0}")]
    Weights(String),

    #[error("Statistical precondition failed: {0}")]
    Precondition(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Plotting failed: {0}")]
    Plot(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet read error: {0}")]
    SpreadsheetRead(#[from] calamine::Error),

    #[error("Spreadsheet write error: {0}")]
    SpreadsheetWrite(#[from] rust_xlsxwriter::XlsxError),
}

/// Result type alias for geostat operations
pub type Result<T> = std::result::Result<T, Error>;
