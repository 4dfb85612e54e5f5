use anyhow::{Context, Result};
use gdal::raster::Buffer;
use gdal::{DriverManager, Metadata};
use std::path::Path;

use crate::model::Raster;

#[derive(Default)]
pub struct GeoTiffWriter {
    description: Option<String>,
}

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self { description: None }
    }

    /// Attach a free-text description stored as `DESCRIPTION` dataset metadata.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Write a single-band `f32` GeoTIFF, keeping the grid's georeferencing and nodata.
    pub fn write(&self, raster: &Raster, output_path: &Path) -> Result<()> {
        let (rows, cols) = raster.shape();

        tracing::info!("Writing GeoTIFF: {} x {} pixels", cols, rows);

        let driver =
            DriverManager::get_driver_by_name("GTiff").context("Failed to get GTiff driver")?;

        let mut dataset = driver
            .create_with_band_type::<f32, _>(output_path, cols, rows, 1)
            .context("Failed to create dataset")?;

        self.set_geo_metadata(&mut dataset, raster)?;

        let mut band = dataset.rasterband(1).context("Failed to get raster band")?;

        if let Some(nodata) = raster.nodata {
            band.set_no_data_value(Some(nodata))
                .context("Failed to set no data value")?;
        }

        // GDAL expects row-major order
        let mut buffer = Buffer::new((cols, rows), raster.values.clone());
        band.write((0, 0), (cols, rows), &mut buffer)
            .context("Failed to write raster data")?;

        Ok(())
    }

    fn set_geo_metadata(&self, dataset: &mut gdal::Dataset, raster: &Raster) -> Result<()> {
        dataset
            .set_geo_transform(&raster.geo_transform)
            .context("Failed to set geo transform")?;

        if raster.projection.is_empty() {
            tracing::warn!("Raster has no coordinate reference system; writing without projection");
        } else {
            dataset
                .set_projection(&raster.projection)
                .context("Failed to set projection")?;
        }

        if let Some(description) = &self.description {
            dataset
                .set_metadata_item("DESCRIPTION", description, "")
                .context("Failed to set description metadata")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_raster;
    use gdal::spatial_ref::SpatialRef;
    use gdal::Dataset;
    use tempfile::TempDir;

    fn gtiff_available() -> bool {
        DriverManager::get_driver_by_name("GTiff").is_ok()
    }

    fn create_test_raster() -> Raster {
        let wkt = SpatialRef::from_epsg(4326).unwrap().to_wkt().unwrap();
        Raster::new(
            2,
            3,
            vec![100.0, 101.0, 102.0, 103.0, -9999.0, 105.0],
            [135.0, 0.001, 0.0, 35.0, 0.0, -0.001],
            wkt,
            Some(-9999.0),
        )
        .unwrap()
    }

    #[test]
    fn test_write_geotiff() {
        if !gtiff_available() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("test.tif");

        let raster = create_test_raster();
        GeoTiffWriter::new()
            .with_description("unit test")
            .write(&raster, &output_path)
            .unwrap();

        assert!(output_path.exists());

        let dataset = Dataset::open(&output_path).unwrap();
        assert_eq!(dataset.raster_size(), (3, 2));

        let transform = dataset.geo_transform().unwrap();
        assert_eq!(transform[0], 135.0);
        assert_eq!(transform[1], 0.001);

        let band = dataset.rasterband(1).unwrap();
        assert_eq!(band.no_data_value(), Some(-9999.0));
        assert_eq!(
            dataset.metadata_item("DESCRIPTION", "").as_deref(),
            Some("unit test")
        );
    }

    #[test]
    fn test_read_back_matches() {
        if !gtiff_available() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("round.tif");

        let raster = create_test_raster();
        GeoTiffWriter::new().write(&raster, &output_path).unwrap();

        let read = read_raster(&output_path).unwrap();
        assert_eq!(read.shape(), (2, 3));
        assert_eq!(read.values, raster.values);
        assert_eq!(read.nodata, Some(-9999.0));
        for i in 0..6 {
            assert!((read.geo_transform[i] - raster.geo_transform[i]).abs() < 1e-12);
        }
        assert!(!read.projection.is_empty());
    }
}
