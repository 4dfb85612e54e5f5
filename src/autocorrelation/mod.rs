//! Spatial autocorrelation of point observations.
//!
//! Global Moran's I, Geary's C and local Moran (LISA) over Voronoi
//! contiguity weights, with permutation inference.

mod geary;
mod lisa;
mod moran;

pub use geary::{geary, Geary};
pub use lisa::{local_moran, Cluster, LocalMoran, Quadrant};
pub use moran::{moran, Moran};

use std::path::{Path, PathBuf};

use anyhow::Context;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::plot::{self, ClusterPanel, ScatterPanel};
use crate::stats::{mean, std_dev};
use crate::table::{self, Cell, ReadOptions, Table};
use crate::weights::{Contiguity, SpatialWeights};

pub const MORAN_PLOT: &str = "Moran_All.png";
pub const LISA_PLOT: &str = "LISA_All.png";
pub const COMBINED_PLOT: &str = "Moran_Combined.png";
pub const SUMMARY_WORKBOOK: &str = "spatial_autocorr_summary.xlsx";

/// Years recognised as variable columns when none are given explicitly.
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 2000..=2023;

/// Random permutation settings shared by all statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permutations {
    pub count: usize,
    pub seed: u64,
}

impl Permutations {
    pub fn new(count: usize, seed: u64) -> Self {
        Self { count, seed }
    }

    /// Analytical inference only.
    pub fn none() -> Self {
        Self { count: 0, seed: 0 }
    }
}

/// Pseudo significance of an observed statistic against its permutation
/// distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct PermutationInference {
    /// (min(larger, perms - larger) + 1) / (perms + 1)
    pub p_sim: f64,
    /// Mean of the simulated statistics
    pub expected: f64,
    /// Population standard deviation of the simulated statistics
    pub std: f64,
    pub z_sim: f64,
    /// One-tailed normal p-value of `|z_sim|`
    pub p_z_sim: f64,
}

impl PermutationInference {
    pub(crate) fn from_simulations(observed: f64, sims: &[f64]) -> Self {
        let perms = sims.len();
        let larger = sims.iter().filter(|&&s| s >= observed).count();
        let larger = larger.min(perms - larger);
        let expected = mean(sims);
        let std = std_dev(sims);
        let z_sim = if std > 0.0 {
            (observed - expected) / std
        } else {
            f64::NAN
        };
        Self {
            p_sim: (larger as f64 + 1.0) / (perms as f64 + 1.0),
            expected,
            std,
            z_sim,
            p_z_sim: crate::stats::normal_sf(z_sim.abs()),
        }
    }
}

pub(crate) fn check_inputs(values: &[f64], w: &SpatialWeights) -> Result<()> {
    if values.len() != w.n() {
        return Err(Error::Weights(format!(
            "{} values for {} weights rows",
            values.len(),
            w.n()
        )));
    }
    if values.len() < 3 {
        return Err(Error::Precondition(format!(
            "At least 3 observations are required, got {}",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::Algorithm("Values contain NaN or infinity".into()));
    }
    if std_dev(values) < f64::EPSILON {
        return Err(Error::Algorithm("Variable has zero variance".into()));
    }
    if w.s0() <= 0.0 {
        return Err(Error::Weights("No observation has a neighbor".into()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AutocorrelationOptions {
    pub lon_field: String,
    pub lat_field: String,
    /// Columns to analyse; detected from the headers when empty
    pub variables: Vec<String>,
    /// Worksheet of a spreadsheet input
    pub sheet: Option<String>,
    pub contiguity: Contiguity,
    pub permutations: usize,
    pub seed: u64,
    /// Pseudo p-value threshold for LISA clusters
    pub significance: f64,
}

impl Default for AutocorrelationOptions {
    fn default() -> Self {
        Self {
            lon_field: "lon".to_string(),
            lat_field: "lat".to_string(),
            variables: Vec::new(),
            sheet: None,
            contiguity: Contiguity::Queen,
            permutations: 999,
            seed: 12345,
            significance: 0.05,
        }
    }
}

/// Statistics of one variable.
#[derive(Debug, Clone)]
pub struct VariableResult {
    pub name: String,
    /// z-scores (population standard deviation)
    pub standardized: Vec<f64>,
    /// Spatial lag of `standardized`
    pub lag: Vec<f64>,
    pub moran: Moran,
    pub geary: Geary,
    pub local: LocalMoran,
}

impl VariableResult {
    /// Permutation z-score of Moran's I, or the normal approximation
    /// when no permutations were run.
    pub fn moran_z(&self) -> f64 {
        self.moran
            .permutation
            .as_ref()
            .map_or(self.moran.z_norm, |p| p.z_sim)
    }

    pub fn moran_p(&self) -> f64 {
        self.moran
            .permutation
            .as_ref()
            .map_or(self.moran.p_norm, |p| p.p_sim)
    }

    pub fn geary_p(&self) -> f64 {
        self.geary
            .permutation
            .as_ref()
            .map_or(self.geary.p_norm, |p| p.p_sim)
    }
}

#[derive(Debug, Clone)]
pub struct AutocorrelationReport {
    pub points: Vec<(f64, f64)>,
    pub islands: Vec<usize>,
    pub variables: Vec<VariableResult>,
}

impl AutocorrelationReport {
    /// One row per variable: `Variable, Moran_I, Z_score, P_value, Geary_C, Geary_p`.
    pub fn summary_table(&self) -> Table {
        let mut table = Table::new(["Variable", "Moran_I", "Z_score", "P_value", "Geary_C", "Geary_p"]);
        for v in &self.variables {
            table.rows.push(vec![
                Cell::from(v.name.as_str()),
                Cell::from(v.moran.i),
                Cell::from(v.moran_z()),
                Cell::from(v.moran_p()),
                Cell::from(v.geary.c),
                Cell::from(v.geary_p()),
            ]);
        }
        table
    }
}

fn is_year(s: &str) -> bool {
    s.parse::<i32>().is_ok_and(|y| YEAR_RANGE.contains(&y))
}

fn contains_year(s: &str) -> bool {
    s.as_bytes().windows(4).any(|w| {
        w.iter().all(u8::is_ascii_digit)
            && std::str::from_utf8(w).is_ok_and(is_year)
    })
}

/// Resolve the variable columns to analyse.
///
/// An explicit list is validated against the table. Otherwise numeric
/// columns are considered, excluding the coordinate fields: headers that are
/// a year between 2000 and 2023, else headers containing such a year, else
/// all of them.
pub fn select_variables(
    table: &Table,
    lon_field: &str,
    lat_field: &str,
    explicit: &[String],
) -> Result<Vec<String>> {
    if !explicit.is_empty() {
        for name in explicit {
            table.require_column(name)?;
        }
        return Ok(explicit.to_vec());
    }

    let numeric: Vec<String> = table
        .numeric_columns()
        .into_iter()
        .filter(|c| c != lon_field && c != lat_field)
        .collect();

    let years: Vec<String> = numeric.iter().filter(|c| is_year(c.trim())).cloned().collect();
    let selected = if !years.is_empty() {
        years
    } else {
        let containing: Vec<String> = numeric.iter().filter(|c| contains_year(c)).cloned().collect();
        if containing.is_empty() {
            numeric
        } else {
            containing
        }
    };

    if selected.is_empty() {
        return Err(Error::Precondition(
            "No numeric variable columns found for autocorrelation".into(),
        ));
    }
    Ok(selected)
}

fn analyze_variable(
    table: &Table,
    name: &str,
    w: &SpatialWeights,
    permutations: Permutations,
) -> Result<VariableResult> {
    let values = table.numeric_column(name)?;
    if std_dev(&values) < f64::EPSILON {
        return Err(Error::ConstantColumn(name.to_string()));
    }
    let standardized = crate::stats::standardize(&values)?;
    let lag = w.spatial_lag(&standardized);

    let moran = moran(&standardized, w, permutations)?;
    let geary = geary(&standardized, w, permutations)?;
    let local = local_moran(&standardized, w, permutations)?;

    tracing::info!(
        "{}: Moran's I = {:.4}, Geary's C = {:.4}",
        name,
        moran.i,
        geary.c
    );

    Ok(VariableResult {
        name: name.to_string(),
        standardized,
        lag,
        moran,
        geary,
        local,
    })
}

/// Compute all statistics for the table without touching the filesystem.
pub fn analyze(table: &Table, options: &AutocorrelationOptions) -> Result<AutocorrelationReport> {
    let lon = table.numeric_column(&options.lon_field)?;
    let lat = table.numeric_column(&options.lat_field)?;
    let points: Vec<(f64, f64)> = lon.into_iter().zip(lat).collect();

    let variables = select_variables(table, &options.lon_field, &options.lat_field, &options.variables)?;
    tracing::info!("Variable columns for spatial autocorrelation: {:?}", variables);

    let mut w = SpatialWeights::from_points(&points, options.contiguity)?;
    w.row_standardize();
    let islands = w.islands();

    let permutations = Permutations::new(options.permutations, options.seed);
    let results = variables
        .par_iter()
        .map(|name| analyze_variable(table, name, &w, permutations))
        .collect::<Result<Vec<_>>>()?;

    Ok(AutocorrelationReport {
        points,
        islands,
        variables: results,
    })
}

/// Paths written by [`run_autocorrelation`].
#[derive(Debug, Clone)]
pub struct AutocorrelationOutputs {
    pub moran_plot: PathBuf,
    pub lisa_plot: PathBuf,
    pub combined_plot: PathBuf,
    pub summary: PathBuf,
}

impl AutocorrelationOutputs {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            moran_plot: dir.join(MORAN_PLOT),
            lisa_plot: dir.join(LISA_PLOT),
            combined_plot: dir.join(COMBINED_PLOT),
            summary: dir.join(SUMMARY_WORKBOOK),
        }
    }
}

/// Read the table, analyse every variable and write plots and the summary workbook.
pub fn run_autocorrelation(
    input: &Path,
    output_dir: &Path,
    options: &AutocorrelationOptions,
) -> anyhow::Result<AutocorrelationReport> {
    tracing::info!("Reading observations from {:?}", input);
    let table = table::read_table(
        input,
        &ReadOptions {
            sheet: options.sheet.clone(),
        },
    )?;
    tracing::info!("Loaded {} observations", table.n_rows());

    let report = analyze(&table, options)?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;
    let outputs = AutocorrelationOutputs::in_dir(output_dir);

    let panels: Vec<ScatterPanel> = report
        .variables
        .iter()
        .map(|v| ScatterPanel {
            title: format!(
                "{} | Moran's I = {:.3} | Z = {:.2}, p = {:.3}",
                v.name,
                v.moran.i,
                v.moran_z(),
                v.moran_p()
            ),
            label: format!(
                "{}: I={:.3}, Z={:.2}, P={:.3}",
                v.name,
                v.moran.i,
                v.moran_z(),
                v.moran_p()
            ),
            x: &v.standardized,
            y: &v.lag,
            slope: v.moran.i,
        })
        .collect();
    plot::moran_scatter_grid(&outputs.moran_plot, &panels)?;
    plot::combined_scatter(&outputs.combined_plot, &panels)?;

    let labels: Vec<Vec<Cluster>> = report
        .variables
        .iter()
        .map(|v| v.local.cluster_labels(options.significance))
        .collect();
    let cluster_panels: Vec<ClusterPanel> = report
        .variables
        .iter()
        .zip(&labels)
        .map(|(v, clusters)| ClusterPanel {
            title: format!("LISA Clusters ({})", v.name),
            points: &report.points,
            clusters,
        })
        .collect();
    plot::lisa_map_grid(&outputs.lisa_plot, &cluster_panels)?;

    table::write_workbook(&outputs.summary, &[("Sheet1", &report.summary_table())])?;

    tracing::info!(
        "Wrote {:?}, {:?}, {:?} and {:?}",
        outputs.moran_plot,
        outputs.lisa_plot,
        outputs.combined_plot,
        outputs.summary
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid_table(columns: &[&str], f: impl Fn(usize, usize, usize) -> f64) -> Table {
        let mut names = vec!["lon", "lat"];
        names.extend_from_slice(columns);
        let mut table = Table::new(names);
        for r in 0..6 {
            for c in 0..6 {
                let mut row = vec![Cell::Float(c as f64), Cell::Float(r as f64)];
                row.extend((0..columns.len()).map(|k| Cell::Float(f(r, c, k))));
                table.push_row(row).unwrap();
            }
        }
        table
    }

    #[test]
    fn test_permutation_inference() {
        let sims = [0.1, 0.2, 0.3, 0.4];
        let inf = PermutationInference::from_simulations(0.35, &sims);
        // one simulation at or above -> larger = 1
        assert_abs_diff_eq!(inf.p_sim, 2.0 / 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(inf.expected, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(inf.std, 0.0125_f64.sqrt(), epsilon = 1e-12);

        let low = PermutationInference::from_simulations(0.0, &sims);
        // all four above -> folded to 4 - 4 = 0
        assert_abs_diff_eq!(low.p_sim, 1.0 / 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_permutation_z_p_value_is_one_tailed() {
        let sims = [0.1, 0.2, 0.3, 0.4];
        // z = 0.1 / sqrt(0.0125) = 0.894
        let high = PermutationInference::from_simulations(0.35, &sims);
        assert_abs_diff_eq!(high.p_z_sim, 0.1855, epsilon = 1e-3);
        // z = -2.236, same tail on the other side
        let low = PermutationInference::from_simulations(0.0, &sims);
        assert!(low.z_sim < 0.0);
        assert_abs_diff_eq!(low.p_z_sim, 0.0127, epsilon = 1e-3);
    }

    #[test]
    fn test_select_year_columns() {
        let mut table = Table::new(["id", "lon", "lat", "2000", "2005", "name", "1999"]);
        table
            .push_row(vec![
                Cell::Int(1),
                Cell::Float(1.0),
                Cell::Float(2.0),
                Cell::Float(0.1),
                Cell::Float(0.2),
                Cell::from("a"),
                Cell::Float(0.3),
            ])
            .unwrap();
        let vars = select_variables(&table, "lon", "lat", &[]).unwrap();
        assert_eq!(vars, vec!["2000".to_string(), "2005".to_string()]);
    }

    #[test]
    fn test_select_columns_containing_year() {
        let mut table = Table::new(["lon", "lat", "ndvi_2001", "ndvi_2002", "elev"]);
        table
            .push_row(vec![Cell::Float(1.0), Cell::Float(2.0), Cell::Float(0.1), Cell::Float(0.2), Cell::Float(3.0)])
            .unwrap();
        let vars = select_variables(&table, "lon", "lat", &[]).unwrap();
        assert_eq!(vars, vec!["ndvi_2001".to_string(), "ndvi_2002".to_string()]);
    }

    #[test]
    fn test_select_falls_back_to_numeric() {
        let mut table = Table::new(["lon", "lat", "a", "b", "label"]);
        table
            .push_row(vec![Cell::Float(1.0), Cell::Float(2.0), Cell::Int(1), Cell::Float(0.2), Cell::from("x")])
            .unwrap();
        let vars = select_variables(&table, "lon", "lat", &[]).unwrap();
        assert_eq!(vars, vec!["a".to_string(), "b".to_string()]);

        let explicit = vec!["b".to_string()];
        assert_eq!(select_variables(&table, "lon", "lat", &explicit).unwrap(), explicit);
        assert!(matches!(
            select_variables(&table, "lon", "lat", &["zzz".to_string()]),
            Err(Error::MissingColumn(_))
        ));
    }

    #[test]
    fn test_select_nothing_is_error() {
        let mut table = Table::new(["lon", "lat", "label"]);
        table
            .push_row(vec![Cell::Float(1.0), Cell::Float(2.0), Cell::from("x")])
            .unwrap();
        assert!(select_variables(&table, "lon", "lat", &[]).is_err());
    }

    #[test]
    fn test_analyze_grid() {
        // variable 0 is a smooth west-east gradient, variable 1 a checkerboard
        let table = grid_table(&["a", "b"], |r, c, k| {
            if k == 0 {
                c as f64
            } else {
                ((r + c) % 2) as f64
            }
        });
        let options = AutocorrelationOptions {
            permutations: 99,
            ..Default::default()
        };
        let report = analyze(&table, &options).unwrap();
        assert_eq!(report.variables.len(), 2);
        assert!(report.islands.is_empty());

        let gradient = &report.variables[0];
        assert!(gradient.moran.i > 0.5);
        assert!(gradient.geary.c < 0.5);
        assert!(gradient.moran_p() <= 0.05);

        // queen neighbors of a checkerboard mix both colours
        let checker = &report.variables[1];
        assert!(checker.moran.i < gradient.moran.i);

        let summary = report.summary_table();
        assert_eq!(summary.columns[0], "Variable");
        assert_eq!(summary.n_rows(), 2);
        assert_eq!(summary.rows[1][0], Cell::from("b"));
    }

    #[test]
    fn test_constant_variable_is_rejected() {
        let table = grid_table(&["flat"], |_, _, _| 4.0);
        let options = AutocorrelationOptions {
            permutations: 0,
            variables: vec!["flat".to_string()],
            ..Default::default()
        };
        assert!(matches!(analyze(&table, &options), Err(Error::ConstantColumn(_))));
    }
}
