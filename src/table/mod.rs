//! In-memory attribute tables and their spreadsheet / CSV persistence.
//!
//! A [`Table`] is the unit of input and output for the tabular pipelines:
//! named columns, rows of loosely typed [`Cell`]s. Files are dispatched on
//! their extension: `.csv` goes through the `csv` crate, spreadsheets are read
//! with `calamine` and written with `rust_xlsxwriter`.

mod delimited;
mod spreadsheet;

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

pub use self::spreadsheet::write_workbook;

/// One value of an attribute table.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Cell {
    /// Numeric view of the cell; text is parsed when it looks like a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
            Cell::Bool(_) | Cell::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Parse a raw text field the way a delimited file is read.
    pub fn parse(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else if let Ok(v) = trimmed.parse::<i64>() {
            Cell::Int(v)
        } else if let Ok(v) = trimmed.parse::<f64>() {
            Cell::Float(v)
        } else {
            match trimmed {
                "true" | "True" | "TRUE" => Cell::Bool(true),
                "false" | "False" | "FALSE" => Cell::Bool(false),
                _ => Cell::Text(raw.to_string()),
            }
        }
    }

    fn sort_cmp(&self, other: &Cell) -> Ordering {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => match (self, other) {
                (Cell::Empty, Cell::Empty) => Ordering::Equal,
                (Cell::Empty, _) => Ordering::Greater,
                (_, Cell::Empty) => Ordering::Less,
                _ => self.to_string().cmp(&other.to_string()),
            },
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Text(s) => f.write_str(s),
            Cell::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        if v.is_nan() {
            Cell::Empty
        } else {
            Cell::Float(v)
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map(Cell::from).unwrap_or_default()
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

/// Options for reading a table from disk.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Worksheet to read; the first sheet when unset
    pub sheet: Option<String>,
}

/// Named columns with rows of cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<Vec<&Cell>> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// All values of a column as `f64`; any empty or non-numeric cell is an error.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self.require_column(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, r)| {
                r[idx].as_f64().ok_or_else(|| Error::NonNumeric {
                    column: name.to_string(),
                    row,
                })
            })
            .collect()
    }

    /// Like [`Table::numeric_column`], but empty cells come back as `None`.
    pub fn sparse_numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let idx = self.require_column(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, r)| match &r[idx] {
                Cell::Empty => Ok(None),
                cell => cell.as_f64().map(Some).ok_or_else(|| Error::NonNumeric {
                    column: name.to_string(),
                    row,
                }),
            })
            .collect()
    }

    /// Names of the columns whose non-empty cells are all numeric.
    pub fn numeric_columns(&self) -> Vec<String> {
        (0..self.columns.len())
            .filter(|&idx| {
                let mut seen = false;
                let all_numeric = self.rows.iter().all(|r| match &r[idx] {
                    Cell::Empty => true,
                    cell => {
                        seen = true;
                        matches!(cell, Cell::Int(_) | Cell::Float(_))
                    }
                });
                all_numeric && seen
            })
            .map(|idx| self.columns[idx].clone())
            .collect()
    }

    /// Replace a column's values, or append the column when it does not exist.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(Error::RowWidth {
                expected: self.rows.len(),
                actual: values.len(),
            });
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Result<()> {
        let idx = self.require_column(name)?;
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        Ok(())
    }

    /// Stable ascending sort. Numbers come first, then text, then empty cells.
    pub fn sort_by_column(&mut self, name: &str) -> Result<()> {
        let idx = self.require_column(name)?;
        self.rows.sort_by(|a, b| a[idx].sort_cmp(&b[idx]));
        Ok(())
    }

    /// Columns of `other` appended to the right of this table.
    pub fn hstack(&self, other: &Table) -> Result<Table> {
        if self.n_rows() != other.n_rows() {
            return Err(Error::RowWidth {
                expected: self.n_rows(),
                actual: other.n_rows(),
            });
        }
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        let rows = self
            .rows
            .iter()
            .zip(&other.rows)
            .map(|(a, b)| a.iter().chain(b).cloned().collect())
            .collect();
        Ok(Table { columns, rows })
    }

    /// Build a table from an index column and a numeric matrix given row by row.
    pub fn from_matrix(
        index_name: &str,
        index: &[Cell],
        columns: &[String],
        values: &ndarray::Array2<f64>,
    ) -> Result<Table> {
        if index.len() != values.nrows() {
            return Err(Error::RowWidth {
                expected: values.nrows(),
                actual: index.len(),
            });
        }
        let mut table = Table::new(std::iter::once(index_name.to_string()).chain(columns.iter().cloned()));
        for (label, row) in index.iter().zip(values.rows()) {
            let mut cells = vec![label.clone()];
            cells.extend(row.iter().map(|&v| Cell::from(v)));
            table.push_row(cells)?;
        }
        Ok(table)
    }
}

/// Read a table, choosing the format from the file extension.
pub fn read_table(path: &Path, options: &ReadOptions) -> Result<Table> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    match extension(path).as_deref() {
        Some("csv") => delimited::read_csv(path),
        Some("xlsx" | "xlsm" | "xls" | "ods") => spreadsheet::read_sheet(path, options.sheet.as_deref()),
        _ => Err(Error::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Write a table, choosing the format from the file extension.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    match extension(path).as_deref() {
        Some("csv") => delimited::write_csv(path, table),
        Some("xlsx") => write_workbook(path, &[("Sheet1", table)]),
        _ => Err(Error::UnsupportedFormat(path.to_path_buf())),
    }
}

pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_table() -> Table {
        let mut table = Table::new(["ORIG_FID", "name", "value"]);
        table
            .push_row(vec![Cell::Int(3), "c".into(), Cell::Float(0.5)])
            .unwrap();
        table
            .push_row(vec![Cell::Int(1), "a".into(), Cell::Float(1.5)])
            .unwrap();
        table
            .push_row(vec![Cell::Empty, "z".into(), Cell::Empty])
            .unwrap();
        table
            .push_row(vec![Cell::Int(2), "b".into(), Cell::Int(7)])
            .unwrap();
        table
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut table = Table::new(["a", "b"]);
        let err = table.push_row(vec![Cell::Int(1)]).unwrap_err();
        assert!(matches!(err, Error::RowWidth { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_sort_puts_empty_keys_last() {
        let mut table = sample_table();
        table.sort_by_column("ORIG_FID").unwrap();
        let names: Vec<String> = table.rows.iter().map(|r| r[1].to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c", "z"]);
    }

    #[test]
    fn test_numeric_column_reports_row() {
        let table = sample_table();
        match table.numeric_column("value") {
            Err(Error::NonNumeric { column, row }) => {
                assert_eq!(column, "value");
                assert_eq!(row, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            table.numeric_column("missing"),
            Err(Error::MissingColumn(_))
        ));
    }

    #[test]
    fn test_numeric_columns() {
        let table = sample_table();
        assert_eq!(table.numeric_columns(), vec!["ORIG_FID", "value"]);
    }

    #[test]
    fn test_set_and_drop_column() {
        let mut table = sample_table();
        table
            .set_column("extra", vec![Cell::Int(1), Cell::Int(2), Cell::Int(3), Cell::Int(4)])
            .unwrap();
        assert_eq!(table.n_cols(), 4);
        table
            .set_column("extra", vec![Cell::Empty; 4])
            .unwrap();
        assert_eq!(table.n_cols(), 4);
        assert!(table.rows.iter().all(|r| r[3].is_empty()));
        table.drop_column("name").unwrap();
        assert_eq!(table.columns, vec!["ORIG_FID", "value", "extra"]);
    }

    #[test]
    fn test_cell_parse() {
        assert_eq!(Cell::parse("12"), Cell::Int(12));
        assert_eq!(Cell::parse(" 1.25 "), Cell::Float(1.25));
        assert_eq!(Cell::parse(""), Cell::Empty);
        assert_eq!(Cell::parse("TRUE"), Cell::Bool(true));
        assert_eq!(Cell::parse("abc"), Cell::Text("abc".to_string()));
    }

    #[test]
    fn test_csv_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("table.csv");
        let table = sample_table();
        write_table(&path, &table).unwrap();

        let read = read_table(&path, &ReadOptions::default()).unwrap();
        assert_eq!(read.columns, table.columns);
        assert_eq!(read.rows[0], vec![Cell::Int(3), "c".into(), Cell::Float(0.5)]);
        assert_eq!(read.rows[2], vec![Cell::Empty, "z".into(), Cell::Empty]);
    }

    #[test]
    fn test_xlsx_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("table.xlsx");
        let table = sample_table();
        write_table(&path, &table).unwrap();

        let read = read_table(&path, &ReadOptions::default()).unwrap();
        assert_eq!(read.columns, table.columns);
        assert_eq!(read.n_rows(), 4);
        assert_eq!(read.rows[1][1], Cell::Text("a".to_string()));
        assert_eq!(read.rows[1][2].as_f64(), Some(1.5));
        assert!(read.rows[2][0].is_empty());
    }

    #[test]
    fn test_missing_file() {
        let err = read_table(Path::new("does/not/exist.csv"), &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
