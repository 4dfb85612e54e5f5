use std::path::Path;

use csv::{ReaderBuilder, Writer};

use super::{Cell, Table};
use crate::error::Result;

pub(super) fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = ReaderBuilder::new().flexible(false).from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut table = Table::new(headers.iter().map(|h| h.trim_start_matches('\u{feff}')));

    for record in reader.records() {
        let record = record?;
        table.push_row(record.iter().map(Cell::parse).collect())?;
    }
    Ok(table)
}

pub(super) fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|c| c.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}
