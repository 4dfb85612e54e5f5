//! Principal component analysis with varimax rotation.
//!
//! The input table is indexed by its first column; every other column is a
//! numeric variable. Variables are standardized, checked for sphericity with
//! Bartlett's test, reduced with the Kaiser criterion and rotated with
//! varimax.

mod factor;

pub use factor::{align_signs, factor_variance, kaiser_criterion, principal_loadings, varimax, FactorVariance};

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ndarray::{Array1, Array2};

use crate::error::{Error, Result};
use crate::linalg::{symmetric_determinant, symmetric_eigen, symmetric_inverse};
use crate::plot;
use crate::stats::{chi2_sf, standardize, std_dev};
use crate::table::{self, Cell, ReadOptions, Table};

pub const SCREE_PLOT: &str = "scree.png";
pub const RESULTS_WORKBOOK: &str = "pca_results_complete.xlsx";
pub const SCORES_WORKBOOK: &str = "pca_scores.xlsx";
pub const WITH_SCORES_WORKBOOK: &str = "pca_with_scores.xlsx";

#[derive(Debug, Clone)]
pub struct PcaOptions {
    pub sheet: Option<String>,
    /// Bartlett's test must reject sphericity at this level
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for PcaOptions {
    fn default() -> Self {
        Self {
            sheet: None,
            alpha: 0.05,
            max_iter: 1000,
            tol: 1e-5,
        }
    }
}

/// Bartlett's test of sphericity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BartlettTest {
    pub statistic: f64,
    pub dof: f64,
    pub p_value: f64,
}

/// Correlation matrix of already standardized columns.
pub fn correlation_matrix(standardized: &Array2<f64>) -> Array2<f64> {
    let n = standardized.nrows() as f64;
    standardized.t().dot(standardized) / n
}

/// χ² = -ln|R| (n - 1 - (2p + 5) / 6) with p(p - 1) / 2 degrees of freedom.
pub fn bartlett_sphericity(correlation: &Array2<f64>, n_obs: usize) -> Result<BartlettTest> {
    let p = correlation.nrows() as f64;
    let det = symmetric_determinant(correlation)?;
    if det <= 0.0 {
        return Err(Error::Precondition(
            "Correlation matrix is singular; Bartlett's test is undefined".into(),
        ));
    }
    let statistic = -det.ln() * (n_obs as f64 - 1.0 - (2.0 * p + 5.0) / 6.0);
    let dof = p * (p - 1.0) / 2.0;
    Ok(BartlettTest {
        statistic,
        dof,
        p_value: chi2_sf(statistic, dof),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sign::Positive => f.write_str("Positive"),
            Sign::Negative => f.write_str("Negative"),
        }
    }
}

/// A variable assigned to the component it loads on most strongly.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub variable: String,
    /// Zero-based component index
    pub component: usize,
    pub loading: f64,
    pub sign: Sign,
}

/// A fitted varimax-rotated principal component model.
#[derive(Debug, Clone)]
pub struct PcaModel {
    pub variables: Vec<String>,
    pub n_obs: usize,
    pub correlation: Array2<f64>,
    /// Eigenvalues of the correlation matrix, descending
    pub eigenvalues: Array1<f64>,
    pub bartlett: BartlettTest,
    /// Variables × retained components
    pub loadings: Array2<f64>,
}

impl PcaModel {
    /// Fit on a matrix of z-scores (observations × variables).
    pub fn fit(standardized: &Array2<f64>, variables: Vec<String>, options: &PcaOptions) -> Result<Self> {
        let (n_obs, p) = standardized.dim();
        if p < 2 {
            return Err(Error::Precondition(format!(
                "PCA needs at least 2 variables, got {p}"
            )));
        }
        if n_obs < 3 {
            return Err(Error::Precondition(format!(
                "PCA needs at least 3 observations, got {n_obs}"
            )));
        }

        let correlation = correlation_matrix(standardized);
        let bartlett = bartlett_sphericity(&correlation, n_obs)?;
        tracing::info!(
            "Bartlett chi2 = {:.2}, p = {:.4}",
            bartlett.statistic,
            bartlett.p_value
        );
        if bartlett.p_value >= options.alpha {
            return Err(Error::Precondition(format!(
                "Bartlett's test p = {:.4} is not below {}; variables are not correlated enough for PCA",
                bartlett.p_value, options.alpha
            )));
        }

        let eigen = symmetric_eigen(&correlation)?;
        let n_factors = kaiser_criterion(&eigen.values.to_vec());
        tracing::info!("Retaining {} principal components (eigenvalue > 1)", n_factors);

        let unrotated = principal_loadings(&eigen, n_factors)?;
        let loadings = varimax(&unrotated, options.max_iter, options.tol)?;

        Ok(Self {
            variables,
            n_obs,
            correlation,
            eigenvalues: eigen.values,
            bartlett,
            loadings,
        })
    }

    pub fn n_components(&self) -> usize {
        self.loadings.ncols()
    }

    /// `PC1`, `PC2`, ...
    pub fn component_names(&self) -> Vec<String> {
        (1..=self.n_components()).map(|i| format!("PC{i}")).collect()
    }

    /// Each variable goes to the component with the largest absolute loading;
    /// ties go to the lower component.
    pub fn assignments(&self) -> Vec<Assignment> {
        self.variables
            .iter()
            .zip(self.loadings.rows())
            .map(|(variable, row)| {
                let (component, loading) = row
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((0, row[0]), |best, (k, v)| {
                        if v.abs() > best.1.abs() {
                            (k, v)
                        } else {
                            best
                        }
                    });
                Assignment {
                    variable: variable.clone(),
                    component,
                    loading,
                    sign: if loading > 0.0 {
                        Sign::Positive
                    } else {
                        Sign::Negative
                    },
                }
            })
            .collect()
    }

    pub fn factor_variance(&self) -> FactorVariance {
        factor_variance(&self.loadings)
    }

    /// Standardized data projected on the rotated loadings, `Z L`.
    pub fn projected_scores(&self, standardized: &Array2<f64>) -> Array2<f64> {
        standardized.dot(&self.loadings)
    }

    /// Regression (Thurstone) factor scores, `Z R⁻¹ L`.
    pub fn regression_scores(&self, standardized: &Array2<f64>) -> Result<Array2<f64>> {
        let weights = symmetric_inverse(&self.correlation)?.dot(&self.loadings);
        Ok(standardized.dot(&weights))
    }
}

/// Index column and z-scored variables of a table whose first column labels the rows.
pub struct PreparedData {
    pub index_name: String,
    pub index: Vec<Cell>,
    pub variables: Vec<String>,
    pub standardized: Array2<f64>,
}

pub fn prepare(table: &Table) -> Result<PreparedData> {
    let Some((index_name, variables)) = table.columns.split_first() else {
        return Err(Error::Precondition("Table has no columns".into()));
    };
    let n = table.n_rows();
    let mut standardized = Array2::<f64>::zeros((n, variables.len()));
    for (k, name) in variables.iter().enumerate() {
        let values = table.numeric_column(name)?;
        if std_dev(&values) < f64::EPSILON {
            return Err(Error::ConstantColumn(name.clone()));
        }
        let z = standardize(&values)?;
        standardized.column_mut(k).assign(&Array1::from(z));
    }
    Ok(PreparedData {
        index_name: index_name.clone(),
        index: table.rows.iter().map(|r| r[0].clone()).collect(),
        variables: variables.to_vec(),
        standardized,
    })
}

/// Tables written to the results workbook.
pub struct PcaTables {
    pub loadings: Table,
    pub assignments: Table,
    pub scores: Table,
    pub explained_variance: Table,
    pub regression_scores: Table,
}

pub fn build_tables(model: &PcaModel, data: &PreparedData) -> Result<PcaTables> {
    let names = model.component_names();
    let variable_index: Vec<Cell> = model.variables.iter().map(|v| Cell::from(v.as_str())).collect();
    let loadings = Table::from_matrix("Variable", &variable_index, &names, &model.loadings)?;

    let mut assignments = Table::new(["Variable", "Assigned_PC", "Loading", "Sign"]);
    for a in model.assignments() {
        assignments.push_row(vec![
            Cell::from(a.variable.as_str()),
            Cell::from(names[a.component].as_str()),
            Cell::from(a.loading),
            Cell::from(a.sign.to_string()),
        ])?;
    }

    let scores = Table::from_matrix(
        &data.index_name,
        &data.index,
        &names,
        &model.projected_scores(&data.standardized),
    )?;

    let fv = model.factor_variance();
    let mut variance = Array2::<f64>::zeros((names.len(), 3));
    for k in 0..names.len() {
        variance[(k, 0)] = fv.ss_loadings[k];
        variance[(k, 1)] = fv.proportion[k] * 100.0;
        variance[(k, 2)] = fv.cumulative[k] * 100.0;
    }
    let component_index: Vec<Cell> = names.iter().map(|n| Cell::from(n.as_str())).collect();
    let explained_variance = Table::from_matrix(
        "Component",
        &component_index,
        &["Eigenvalue".to_string(), "Variance%".to_string(), "Cumulative%".to_string()],
        &variance,
    )?;

    let regression_scores = Table::from_matrix(
        &data.index_name,
        &data.index,
        &names,
        &model.regression_scores(&data.standardized)?,
    )?;

    Ok(PcaTables {
        loadings,
        assignments,
        scores,
        explained_variance,
        regression_scores,
    })
}

fn log_assignments(model: &PcaModel) {
    let assignments = model.assignments();
    for (k, name) in model.component_names().iter().enumerate() {
        let of = |sign: Sign| -> Vec<&str> {
            assignments
                .iter()
                .filter(|a| a.component == k && a.sign == sign)
                .map(|a| a.variable.as_str())
                .collect()
        };
        tracing::info!(
            "{}: positive {:?}, negative {:?}",
            name,
            of(Sign::Positive),
            of(Sign::Negative)
        );
    }
}

#[derive(Debug, Clone)]
pub struct PcaOutputs {
    pub scree_plot: PathBuf,
    pub results: PathBuf,
    pub scores: PathBuf,
    pub with_scores: PathBuf,
}

impl PcaOutputs {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            scree_plot: dir.join(SCREE_PLOT),
            results: dir.join(RESULTS_WORKBOOK),
            scores: dir.join(SCORES_WORKBOOK),
            with_scores: dir.join(WITH_SCORES_WORKBOOK),
        }
    }
}

/// Read the table, fit the model and write the scree plot and workbooks.
pub fn run_pca(input: &Path, output_dir: &Path, options: &PcaOptions) -> anyhow::Result<PcaModel> {
    tracing::info!("Reading PCA input {:?}", input);
    let table = table::read_table(
        input,
        &ReadOptions {
            sheet: options.sheet.clone(),
        },
    )?;
    let data = prepare(&table)?;
    tracing::info!(
        "{} observations, {} variables",
        data.standardized.nrows(),
        data.variables.len()
    );

    let model = PcaModel::fit(&data.standardized, data.variables.clone(), options)?;
    log_assignments(&model);

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;
    let outputs = PcaOutputs::in_dir(output_dir);

    plot::scree_plot(&outputs.scree_plot, &model.eigenvalues.to_vec())?;

    let tables = build_tables(&model, &data)?;
    table::write_workbook(
        &outputs.results,
        &[
            ("Loadings", &tables.loadings),
            ("Assignments", &tables.assignments),
            ("Scores", &tables.scores),
            ("Explained Variance", &tables.explained_variance),
        ],
    )?;
    table::write_workbook(&outputs.scores, &[("Sheet1", &tables.regression_scores)])?;

    let mut score_columns = tables.regression_scores.clone();
    score_columns.drop_column(&data.index_name)?;
    let combined = table.hstack(&score_columns)?;
    table::write_workbook(&outputs.with_scores, &[("Sheet1", &combined)])?;

    tracing::info!(
        "Wrote {:?}, {:?}, {:?} and {:?}",
        outputs.scree_plot,
        outputs.results,
        outputs.scores,
        outputs.with_scores
    );
    Ok(model)
}
