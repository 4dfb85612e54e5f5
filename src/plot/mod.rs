//! PNG figures for the autocorrelation and PCA pipelines.
//!
//! Everything is drawn with the [`plotters`] bitmap backend. Multi-variable
//! figures are laid out as a grid of panels with at most three columns.

use std::ops::Range;
use std::path::Path;

use plotters::prelude::*;

use crate::autocorrelation::Cluster;
use crate::error::{Error, Result};

const PANEL_SIZE: (u32, u32) = (600, 500);
const MAX_COLUMNS: usize = 3;

/// Scatter of a standardized variable against its spatial lag.
pub struct ScatterPanel<'a> {
    /// Panel caption in grid figures
    pub title: String,
    /// Legend entry in the combined figure
    pub label: String,
    pub x: &'a [f64],
    pub y: &'a [f64],
    /// Slope of the fitted line through the origin (Moran's I)
    pub slope: f64,
}

/// Point locations coloured by LISA cluster.
pub struct ClusterPanel<'a> {
    pub title: String,
    pub points: &'a [(f64, f64)],
    pub clusters: &'a [Cluster],
}

fn plot_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Plot(e.to_string())
}

/// Rows and columns of a panel grid holding `n` panels.
pub fn grid_shape(n: usize) -> (usize, usize) {
    let cols = n.clamp(1, MAX_COLUMNS);
    (n.max(1).div_ceil(cols), cols)
}

/// Range covering all finite values with 5% padding on each side.
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !min.is_finite() {
        return -1.0..1.0;
    }
    if max - min < f64::EPSILON {
        return (min - 0.5)..(max + 0.5);
    }
    let pad = (max - min) * 0.05;
    (min - pad)..(max + pad)
}

/// Symmetric range around zero covering both axes, so the scatter keeps
/// an equal aspect.
fn symmetric_range(x: &[f64], y: &[f64]) -> Range<f64> {
    let lim = x
        .iter()
        .chain(y)
        .filter(|v| v.is_finite())
        .fold(0.0_f64, |m, v| m.max(v.abs()));
    let lim = if lim > 0.0 { lim * 1.1 } else { 1.0 };
    -lim..lim
}

pub fn cluster_color(cluster: Cluster) -> RGBColor {
    match cluster {
        Cluster::HighHigh => RGBColor(215, 25, 28),
        Cluster::LowHigh => RGBColor(171, 217, 233),
        Cluster::LowLow => RGBColor(44, 123, 182),
        Cluster::HighLow => RGBColor(253, 174, 97),
        Cluster::NotSignificant => RGBColor(211, 211, 211),
    }
}

fn check_not_empty(n: usize, what: &str) -> Result<()> {
    if n == 0 {
        return Err(Error::Plot(format!("No {what} to draw")));
    }
    Ok(())
}

/// One Moran scatter plot per variable, laid out on a grid.
pub fn moran_scatter_grid(path: &Path, panels: &[ScatterPanel]) -> Result<()> {
    check_not_empty(panels.len(), "variables")?;
    let (rows, cols) = grid_shape(panels.len());
    let size = (PANEL_SIZE.0 * cols as u32, PANEL_SIZE.1 * rows as u32);

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    for (area, panel) in root.split_evenly((rows, cols)).iter().zip(panels) {
        let range = symmetric_range(panel.x, panel.y);
        let mut chart = ChartBuilder::on(area)
            .caption(&panel.title, ("sans-serif", 16))
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(range.clone(), range.clone())
            .map_err(plot_err)?;

        chart
            .configure_mesh()
            .x_desc("Standardized Variable")
            .y_desc("Spatial Lag")
            .label_style(("sans-serif", 12))
            .draw()
            .map_err(plot_err)?;

        let axis_style = BLACK.mix(0.4).stroke_width(1);
        chart
            .draw_series(LineSeries::new([(range.start, 0.0), (range.end, 0.0)], axis_style))
            .map_err(plot_err)?;
        chart
            .draw_series(LineSeries::new([(0.0, range.start), (0.0, range.end)], axis_style))
            .map_err(plot_err)?;

        chart
            .draw_series(
                panel
                    .x
                    .iter()
                    .zip(panel.y)
                    .map(|(&x, &y)| Circle::new((x, y), 3, BLUE.mix(0.6).filled())),
            )
            .map_err(plot_err)?;

        let line = [
            (range.start, panel.slope * range.start),
            (range.end, panel.slope * range.end),
        ];
        chart
            .draw_series(LineSeries::new(line, RED.stroke_width(2)))
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    tracing::debug!("Saved Moran scatter grid to {:?}", path);
    Ok(())
}

/// All variables on one Moran scatter plot with one fitted line each.
pub fn combined_scatter(path: &Path, panels: &[ScatterPanel]) -> Result<()> {
    check_not_empty(panels.len(), "variables")?;

    let all_x: Vec<f64> = panels.iter().flat_map(|p| p.x.iter().copied()).collect();
    let all_y: Vec<f64> = panels.iter().flat_map(|p| p.y.iter().copied()).collect();
    let range = symmetric_range(&all_x, &all_y);

    let root = BitMapBackend::new(path, (1000, 900)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Moran's I Scatter Plot (All Variables)", ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(range.clone(), range.clone())
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Standardized Variable")
        .y_desc("Spatial Lag")
        .draw()
        .map_err(plot_err)?;

    for (idx, panel) in panels.iter().enumerate() {
        let color = Palette99::pick(idx).mix(0.9);
        chart
            .draw_series(
                panel
                    .x
                    .iter()
                    .zip(panel.y)
                    .map(move |(&x, &y)| Circle::new((x, y), 3, color.mix(0.5).filled())),
            )
            .map_err(plot_err)?;

        let line = [
            (range.start, panel.slope * range.start),
            (range.end, panel.slope * range.end),
        ];
        chart
            .draw_series(LineSeries::new(line, color.stroke_width(2)))
            .map_err(plot_err)?
            .label(panel.label.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    tracing::debug!("Saved combined Moran scatter to {:?}", path);
    Ok(())
}

/// One LISA cluster map per variable, laid out on a grid.
pub fn lisa_map_grid(path: &Path, panels: &[ClusterPanel]) -> Result<()> {
    check_not_empty(panels.len(), "variables")?;
    let (rows, cols) = grid_shape(panels.len());
    let size = (PANEL_SIZE.0 * cols as u32, PANEL_SIZE.1 * rows as u32);

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    for (area, panel) in root.split_evenly((rows, cols)).iter().zip(panels) {
        let x_range = padded_range(panel.points.iter().map(|p| p.0));
        let y_range = padded_range(panel.points.iter().map(|p| p.1));
        let mut chart = ChartBuilder::on(area)
            .caption(&panel.title, ("sans-serif", 16))
            .margin(12)
            .x_label_area_size(35)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range, y_range)
            .map_err(plot_err)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .label_style(("sans-serif", 11))
            .draw()
            .map_err(plot_err)?;

        // Non-significant points first so clusters stay on top
        for cluster in Cluster::ALL.iter().rev() {
            let color = cluster_color(*cluster);
            let members: Vec<(f64, f64)> = panel
                .points
                .iter()
                .zip(panel.clusters)
                .filter(|(_, c)| *c == cluster)
                .map(|(p, _)| *p)
                .collect();
            if members.is_empty() {
                continue;
            }
            chart
                .draw_series(members.into_iter().map(|p| Circle::new(p, 4, color.filled())))
                .map_err(plot_err)?
                .label(cluster.label())
                .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(("sans-serif", 12))
            .draw()
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    tracing::debug!("Saved LISA cluster maps to {:?}", path);
    Ok(())
}

/// Eigenvalues by component number with the Kaiser threshold at 1.
pub fn scree_plot(path: &Path, eigenvalues: &[f64]) -> Result<()> {
    check_not_empty(eigenvalues.len(), "eigenvalues")?;

    let n = eigenvalues.len();
    let top = eigenvalues.iter().copied().fold(1.0_f64, f64::max) * 1.15;

    let root = BitMapBackend::new(path, (1000, 700)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let x_range = 0.5..(n as f64 + 0.5);
    let mut chart = ChartBuilder::on(&root)
        .caption("Scree Plot", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range.clone(), 0.0..top)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Principal Component")
        .y_desc("Eigenvalue")
        .x_labels(n.min(20))
        .x_label_formatter(&|x| format!("{:.0}", x))
        .draw()
        .map_err(plot_err)?;

    let points: Vec<(f64, f64)> = eigenvalues
        .iter()
        .enumerate()
        .map(|(i, &v)| ((i + 1) as f64, v))
        .collect();

    chart
        .draw_series(LineSeries::new(points.iter().copied(), BLUE.stroke_width(2)))
        .map_err(plot_err)?;
    chart
        .draw_series(points.iter().map(|&p| Circle::new(p, 5, BLUE.filled())))
        .map_err(plot_err)?;
    chart
        .draw_series(points.iter().map(|&(x, y)| {
            Text::new(format!("{:.2}", y), (x + 0.05, y + top * 0.02), ("sans-serif", 14))
        }))
        .map_err(plot_err)?;

    // Dashed Kaiser line
    let dash = (x_range.end - x_range.start) / 60.0;
    chart
        .draw_series((0..30).map(|k| {
            let start = x_range.start + 2.0 * k as f64 * dash;
            PathElement::new(vec![(start, 1.0), (start + dash, 1.0)], RED.stroke_width(1))
        }))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    tracing::debug!("Saved scree plot to {:?}", path);
    Ok(())
}
