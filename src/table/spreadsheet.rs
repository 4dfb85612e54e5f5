use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, Workbook};

use super::{Cell, Table};
use crate::error::{Error, Result};

/// Read one worksheet; the first row holds the column names.
pub(super) fn read_sheet(path: &Path, sheet: Option<&str>) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| Error::Algorithm(format!("No sheets found in {}", path.display())))?,
    };
    let range = workbook.worksheet_range(&sheet_name)?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };
    let mut table = Table::new(header.iter().enumerate().map(|(idx, data)| header_name(idx, data)));

    for row in rows {
        let cells = (0..table.n_cols())
            .map(|idx| row.get(idx).map(data_to_cell).unwrap_or_default())
            .collect();
        table.push_row(cells)?;
    }
    Ok(table)
}

/// Numeric headers such as years are kept as `2000`, not `2000.0`.
fn header_name(idx: usize, data: &Data) -> String {
    match data {
        Data::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
        Data::Empty => format!("Unnamed: {idx}"),
        other => other.to_string(),
    }
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Int(v) => Cell::Int(*v),
        Data::Float(v) => Cell::Float(*v),
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Bool(*b),
        Data::Empty => Cell::Empty,
        other => Cell::Text(other.to_string()),
    }
}

/// Write several tables into one workbook, one worksheet each.
pub fn write_workbook(path: &Path, sheets: &[(&str, &Table)]) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    for (name, table) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name)?;

        for (col, column) in table.columns.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, column, &header_format)?;
        }
        for (row_idx, row) in table.rows.iter().enumerate() {
            let r = row_idx as u32 + 1;
            for (col, cell) in row.iter().enumerate() {
                let c = col as u16;
                match cell {
                    Cell::Empty => {}
                    Cell::Int(v) => {
                        worksheet.write_number(r, c, *v as f64)?;
                    }
                    Cell::Float(v) if v.is_finite() => {
                        worksheet.write_number(r, c, *v)?;
                    }
                    Cell::Float(_) => {}
                    Cell::Text(s) => {
                        worksheet.write_string(r, c, s)?;
                    }
                    Cell::Bool(b) => {
                        worksheet.write_boolean(r, c, *b)?;
                    }
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}
