//! Water-mass accounting from an evapotranspiration raster.
//!
//! Each cell holds a depth in millimetres; multiplying by the cell area in
//! square metres and by 0.001 gives a volume in cubic metres. The total mass
//! assumes 1000 kg/m³ and is reported in teragrams.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::Raster;
use crate::reader::read_raster;
use crate::writer::GeoTiffWriter;

/// Millimetres to metres.
pub const MM_TO_M: f64 = 0.001;
/// Density of water in kg/m³.
pub const WATER_DENSITY: f64 = 1000.0;
/// Kilograms per teragram.
pub const KG_PER_TG: f64 = 1e12;

/// Volume raster (m³) from a depth raster (mm). Nodata cells stay nodata.
pub fn convert_to_volume(depth: &Raster) -> crate::Result<Raster> {
    let factor = depth.pixel_area() * MM_TO_M;
    let values = depth
        .values
        .iter()
        .map(|&v| {
            if depth.is_nodata(v) {
                v
            } else {
                (v as f64 * factor) as f32
            }
        })
        .collect();
    depth.with_values(values)
}

/// Total mass in teragrams of a volume raster, skipping nodata and NaN cells.
pub fn total_mass_tg(volume: &Raster) -> f64 {
    let total_m3: f64 = volume
        .valid_values()
        .map(f64::from)
        .filter(|v| v.is_finite())
        .sum();
    total_m3 * WATER_DENSITY / KG_PER_TG
}

pub fn format_report(total_tg: f64) -> String {
    format!("Total water mass: {:.6} Tg\n", total_tg)
}

pub fn write_report(path: &Path, total_tg: f64) -> Result<()> {
    fs::write(path, format_report(total_tg))
        .with_context(|| format!("Failed to write report {:?}", path))
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterMassSummary {
    pub pixel_area: f64,
    pub valid_cells: usize,
    pub total_tg: f64,
}

/// Convert a depth raster to volumes, write the volume GeoTIFF and the
/// text report.
pub fn run_water_mass(input: &Path, raster_out: &Path, report_out: &Path) -> Result<WaterMassSummary> {
    tracing::info!("Reading depth raster {:?}", input);
    let depth = read_raster(input)?;

    let volume = convert_to_volume(&depth)?;
    let total_tg = total_mass_tg(&volume);
    let summary = WaterMassSummary {
        pixel_area: depth.pixel_area(),
        valid_cells: volume.valid_values().count(),
        total_tg,
    };
    tracing::info!(
        "Pixel area {:.3} m², {} valid cells",
        summary.pixel_area,
        summary.valid_cells
    );

    GeoTiffWriter::new()
        .with_description("Water volume (m3)")
        .write(&volume, raster_out)?;
    write_report(report_out, total_tg)?;

    tracing::info!("Total water mass: {:.6} Tg", total_tg);
    tracing::info!("Wrote {:?} and {:?}", raster_out, report_out);
    Ok(summary)
}
