use anyhow::{Context, Result};
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::vector::{FieldValue, LayerAccess};
use gdal::Dataset;
use std::path::Path;

use crate::error::Error;
use crate::model::{FeatureCollection, Raster};
use crate::table::{self, Cell, ReadOptions, Table};

/// Read band 1 of a raster as `f32` together with its georeferencing.
pub fn read_raster(path: &Path) -> Result<Raster> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()).into());
    }
    let dataset =
        Dataset::open(path).with_context(|| format!("Failed to open raster {:?}", path))?;
    let (cols, rows) = dataset.raster_size();
    let geo_transform = dataset
        .geo_transform()
        .context("Failed to read geo transform")?;
    let projection = dataset.projection();

    let band = dataset.rasterband(1).context("Failed to get raster band")?;
    let nodata = band.no_data_value();
    let buffer = band
        .read_as::<f32>((0, 0), (cols, rows), (cols, rows), None)
        .context("Failed to read raster data")?;

    tracing::debug!("Read raster {:?}: {} x {} pixels", path, cols, rows);

    Ok(Raster::new(
        rows,
        cols,
        buffer.data().to_vec(),
        geo_transform,
        projection,
        nodata,
    )?)
}

/// Read a point layer, or a plain table when the file is a CSV or spreadsheet.
///
/// For vector sources the first vertex of every geometry is kept; attribute
/// fields keep the layer's field order.
pub fn read_features(path: &Path) -> Result<FeatureCollection> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()).into());
    }
    if let Some("csv" | "xlsx" | "xlsm" | "xls" | "ods") = table::extension(path).as_deref() {
        let attributes = table::read_table(path, &ReadOptions::default())?;
        let points = vec![None; attributes.n_rows()];
        return Ok(FeatureCollection {
            attributes,
            points,
            spatial_ref: None,
        });
    }

    let dataset =
        Dataset::open(path).with_context(|| format!("Failed to open vector {:?}", path))?;
    let mut layer = dataset.layer(0).context("Failed to get layer 0")?;
    let spatial_ref = layer.spatial_ref().and_then(|srs| srs.to_wkt().ok());
    let field_names: Vec<String> = layer.defn().fields().map(|f| f.name()).collect();

    let mut attributes = Table::new(field_names.iter().cloned());
    let mut points = Vec::new();
    for feature in layer.features() {
        let mut row = vec![Cell::Empty; field_names.len()];
        for (name, value) in feature.fields() {
            if let Some(idx) = field_names.iter().position(|f| *f == name) {
                row[idx] = value.map(field_to_cell).unwrap_or_default();
            }
        }
        attributes.push_row(row)?;
        points.push(feature.geometry().map(|g| {
            let (x, y, _) = g.get_point(0);
            (x, y)
        }));
    }

    tracing::debug!("Read {} features from {:?}", points.len(), path);

    Ok(FeatureCollection {
        attributes,
        points,
        spatial_ref,
    })
}

fn field_to_cell(value: FieldValue) -> Cell {
    match value {
        FieldValue::IntegerValue(v) => Cell::Int(v as i64),
        FieldValue::Integer64Value(v) => Cell::Int(v),
        FieldValue::RealValue(v) => Cell::from(v),
        FieldValue::StringValue(s) => Cell::Text(s),
        other => other.into_string().map(Cell::Text).unwrap_or_default(),
    }
}

/// Reproject points from one CRS (WKT) into another, in place.
///
/// Both references use the traditional GIS axis order so coordinates stay
/// `(x, y)` / `(lon, lat)`.
pub fn reproject_points(points: &mut [Option<(f64, f64)>], from_wkt: &str, to_wkt: &str) -> Result<()> {
    let mut from = SpatialRef::from_wkt(from_wkt).context("Failed to parse source CRS")?;
    let mut to = SpatialRef::from_wkt(to_wkt).context("Failed to parse target CRS")?;
    from.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    to.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    let transform = CoordTransform::new(&from, &to).context("Failed to create coordinate transform")?;

    let present: Vec<usize> = points
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.map(|_| i))
        .collect();
    let mut xs: Vec<f64> = present.iter().filter_map(|&i| points[i].map(|p| p.0)).collect();
    let mut ys: Vec<f64> = present.iter().filter_map(|&i| points[i].map(|p| p.1)).collect();
    let mut zs = vec![0.0; xs.len()];
    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .context("Failed to transform coordinates")?;

    for (k, &i) in present.iter().enumerate() {
        points[i] = Some((xs[k], ys[k]));
    }
    Ok(())
}

/// True when both WKT strings describe the same CRS. Empty strings never match.
pub fn same_crs(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    match (SpatialRef::from_wkt(a), SpatialRef::from_wkt(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
