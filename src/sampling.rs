//! Point-in-raster sampling.

use std::path::Path;

use anyhow::Result;

use crate::error::Error;
use crate::model::{FeatureCollection, Raster};
use crate::reader::{read_features, read_raster, reproject_points, same_crs};
use crate::table::{self, Cell, Table};

#[derive(Debug, Clone)]
pub struct SamplingOptions {
    /// Name of the field receiving the sampled values
    pub value_field: String,
    /// Field the output is sorted by, when present
    pub sort_key: String,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            value_field: "np".to_string(),
            sort_key: "ORIG_FID".to_string(),
        }
    }
}

/// Raster value under each point, `None` for missing geometry and points
/// outside the grid.
///
/// Nodata cells are masked to `None` as well, so the output table holds an
/// empty cell rather than the raster's nodata sentinel.
pub fn sample_points(raster: &Raster, points: &[Option<(f64, f64)>]) -> Vec<Option<f64>> {
    points
        .iter()
        .map(|p| p.and_then(|(x, y)| raster.sample(x, y)))
        .collect()
}

/// Sort by `key` when the table has it; otherwise keep the current order.
pub fn sort_if_present(table: &mut Table, key: &str) -> crate::Result<()> {
    if table.column_index(key).is_some() {
        table.sort_by_column(key)?;
        tracing::info!("Sorted by {} ascending", key);
    } else {
        tracing::warn!("No '{}' field found; keeping the input order", key);
    }
    Ok(())
}

/// Attach sampled values to the features' attributes and drop geometry.
///
/// Points must already be in the raster's coordinate reference system.
pub fn attach_samples(
    features: FeatureCollection,
    raster: &Raster,
    options: &SamplingOptions,
) -> crate::Result<Table> {
    let samples = sample_points(raster, &features.points);
    let missing = samples.iter().filter(|s| s.is_none()).count();
    if missing > 0 {
        tracing::warn!("{} of {} points have no raster value", missing, samples.len());
    }

    let mut table = features.into_attribute_table();
    table.set_column(&options.value_field, samples.into_iter().map(Cell::from).collect())?;
    sort_if_present(&mut table, &options.sort_key)?;
    Ok(table)
}

/// Sample a raster at every point of a layer and write the attribute table.
pub fn run_sampling(
    points_path: &Path,
    raster_path: &Path,
    output: &Path,
    options: &SamplingOptions,
) -> Result<Table> {
    for path in [points_path, raster_path] {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()).into());
        }
    }

    let mut features = read_features(points_path)?;
    tracing::info!("Read {} points from {:?}", features.len(), points_path);
    let raster = read_raster(raster_path)?;

    match features.spatial_ref.as_deref() {
        Some(layer_crs) if !raster.projection.is_empty() => {
            if !same_crs(layer_crs, &raster.projection) {
                tracing::info!("Reprojecting points into the raster CRS");
                reproject_points(&mut features.points, layer_crs, &raster.projection)?;
            }
        }
        _ => tracing::warn!("Point layer or raster has no CRS; sampling coordinates as given"),
    }

    let table = attach_samples(features, &raster, options)?;
    table::write_table(output, &table)?;
    tracing::info!("Attribute table written without geometry to {:?}", output);
    Ok(table)
}
