//! Attribute join of two layers on a shared key field.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;

use crate::error::Error;
use crate::reader::read_features;
use crate::table::{self, Cell, Table};

#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub key: String,
    /// Field copied from the value layer
    pub value_field: String,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            key: "ORIG_FID".to_string(),
            value_field: "soil2000".to_string(),
        }
    }
}

/// Normalised join key. Numeric cells compare by value, so `1`, `1.0` and
/// `"1"` match each other.
fn key_of(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Empty => None,
        other => Some(match other.as_f64() {
            Some(v) => format!("{}", v),
            None => other.to_string(),
        }),
    }
}

/// Left join `options.value_field` of `values` onto `source` by `options.key`,
/// then sort by the key.
///
/// A source without the key gets one synthesised from its row index. Rows
/// without a match receive an empty cell; for duplicate keys in `values` the
/// first row wins.
pub fn left_join(mut source: Table, values: &Table, options: &JoinOptions) -> crate::Result<Table> {
    let value_key_idx = values.require_column(&options.key)?;
    let value_idx = values.require_column(&options.value_field)?;

    if source.column_index(&options.key).is_none() {
        tracing::info!("Source has no '{}' field; using the row index", options.key);
        let index = (0..source.n_rows()).map(|i| Cell::Int(i as i64)).collect();
        source.set_column(&options.key, index)?;
    }

    let mut lookup: HashMap<String, &Cell> = HashMap::with_capacity(values.n_rows());
    let mut duplicates = 0usize;
    for row in &values.rows {
        if let Some(key) = key_of(&row[value_key_idx]) {
            if lookup.contains_key(&key) {
                duplicates += 1;
            } else {
                lookup.insert(key, &row[value_idx]);
            }
        }
    }
    if duplicates > 0 {
        tracing::warn!("{} duplicate keys in the value layer; first match kept", duplicates);
    }

    let key_idx = source.require_column(&options.key)?;
    let joined: Vec<Cell> = source
        .rows
        .iter()
        .map(|row| {
            key_of(&row[key_idx])
                .and_then(|k| lookup.get(&k))
                .map(|c| (*c).clone())
                .unwrap_or_default()
        })
        .collect();
    let unmatched = joined.iter().filter(|c| c.is_empty()).count();
    if unmatched > 0 {
        tracing::warn!("{} of {} rows have no '{}' value", unmatched, joined.len(), options.value_field);
    }

    if source.column_index(&options.value_field).is_some() {
        tracing::warn!("Replacing existing '{}' field in the source", options.value_field);
    }
    source.set_column(&options.value_field, joined)?;
    source.sort_by_column(&options.key)?;
    Ok(source)
}

/// Join two layers (or tables) and write the attribute table without geometry.
pub fn run_join(source_path: &Path, values_path: &Path, output: &Path, options: &JoinOptions) -> Result<Table> {
    for path in [source_path, values_path] {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()).into());
        }
    }

    let source = read_features(source_path)?.into_attribute_table();
    let values = read_features(values_path)?.into_attribute_table();
    tracing::info!(
        "Joining '{}' from {} rows onto {} rows by '{}'",
        options.value_field,
        values.n_rows(),
        source.n_rows(),
        options.key
    );

    let table = left_join(source, &values, options)?;
    table::write_table(output, &table)?;
    tracing::info!("Wrote {:?}", output);
    Ok(table)
}
