//! Principal-factor extraction and varimax rotation.

use ndarray::{Array1, Array2, Axis};

use crate::error::{Error, Result};
use crate::linalg::SymmetricEigen;

/// Number of components whose eigenvalue exceeds 1, at least one.
pub fn kaiser_criterion(eigenvalues: &[f64]) -> usize {
    eigenvalues.iter().filter(|&&v| v > 1.0).count().max(1)
}

/// Unrotated loadings of the first `n_factors` principal components:
/// each eigenvector scaled by the square root of its eigenvalue, so that a
/// loading is the correlation of a variable with the component.
pub fn principal_loadings(eigen: &SymmetricEigen, n_factors: usize) -> Result<Array2<f64>> {
    let p = eigen.values.len();
    if n_factors == 0 || n_factors > p {
        return Err(Error::Algorithm(format!(
            "Cannot extract {n_factors} factors from {p} variables"
        )));
    }

    let mut loadings = Array2::<f64>::zeros((p, n_factors));
    for k in 0..n_factors {
        let sd = eigen.values[k].max(0.0).sqrt();
        loadings
            .column_mut(k)
            .assign(&eigen.vectors.column(k).mapv(|v| v * sd));
    }
    align_signs(&mut loadings);
    Ok(loadings)
}

/// Flip columns so that every column sums to a non-negative value.
pub fn align_signs(loadings: &mut Array2<f64>) {
    for mut column in loadings.columns_mut() {
        if column.sum() < 0.0 {
            column.mapv_inplace(|v| -v);
        }
    }
}

/// Raw varimax criterion: summed variance of the squared loadings per column.
fn varimax_criterion(loadings: &Array2<f64>) -> f64 {
    let p = loadings.nrows() as f64;
    loadings
        .columns()
        .into_iter()
        .map(|c| {
            let s2: f64 = c.iter().map(|v| v * v).sum();
            let s4: f64 = c.iter().map(|v| v.powi(4)).sum();
            (p * s4 - s2 * s2) / (p * p)
        })
        .sum()
}

/// Varimax rotation with Kaiser row normalisation.
///
/// Sweeps over every pair of columns and applies the planar rotation that
/// maximises the criterion for that pair (Kaiser, 1958). Stops once a full
/// sweep raises the criterion by no more than `tol` relative. A single factor
/// is returned unchanged.
pub fn varimax(loadings: &Array2<f64>, max_iter: usize, tol: f64) -> Result<Array2<f64>> {
    let (p, k) = loadings.dim();
    if k < 2 {
        return Ok(loadings.clone());
    }
    if loadings.iter().any(|v| !v.is_finite()) {
        return Err(Error::Algorithm("Loadings contain non-finite values".into()));
    }

    let norms: Array1<f64> = loadings.map_axis(Axis(1), |row| row.dot(&row).sqrt());
    let mut x = loadings.clone();
    for (mut row, &norm) in x.rows_mut().into_iter().zip(norms.iter()) {
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }

    let n = p as f64;
    let mut criterion = varimax_criterion(&x);
    let mut converged = false;
    for sweep in 0..max_iter {
        for a in 0..k {
            for b in (a + 1)..k {
                let (mut sum_u, mut sum_v, mut sum_uv_sq, mut sum_uv) = (0.0, 0.0, 0.0, 0.0);
                for row in x.rows() {
                    let u = row[a] * row[a] - row[b] * row[b];
                    let v = 2.0 * row[a] * row[b];
                    sum_u += u;
                    sum_v += v;
                    sum_uv_sq += u * u - v * v;
                    sum_uv += u * v;
                }
                let num = 2.0 * sum_uv - 2.0 * sum_u * sum_v / n;
                let den = sum_uv_sq - (sum_u * sum_u - sum_v * sum_v) / n;
                let phi = num.atan2(den) / 4.0;
                if phi.abs() < f64::EPSILON {
                    continue;
                }
                let (sin, cos) = phi.sin_cos();
                for mut row in x.rows_mut() {
                    let (xa, xb) = (row[a], row[b]);
                    row[a] = xa * cos + xb * sin;
                    row[b] = -xa * sin + xb * cos;
                }
            }
        }

        let next = varimax_criterion(&x);
        let gain = next - criterion;
        criterion = next;
        if gain <= tol * criterion.abs() {
            tracing::debug!("Varimax converged after {} sweeps", sweep + 1);
            converged = true;
            break;
        }
    }
    if !converged {
        tracing::warn!("Varimax did not converge in {} sweeps", max_iter);
    }

    for (mut row, &norm) in x.rows_mut().into_iter().zip(norms.iter()) {
        row.mapv_inplace(|v| v * norm);
    }
    align_signs(&mut x);
    Ok(x)
}

/// Sum of squared loadings per factor, its share of the total variance and
/// the running total of that share.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorVariance {
    pub ss_loadings: Vec<f64>,
    pub proportion: Vec<f64>,
    pub cumulative: Vec<f64>,
}

pub fn factor_variance(loadings: &Array2<f64>) -> FactorVariance {
    let p = loadings.nrows() as f64;
    let ss_loadings: Vec<f64> = loadings
        .columns()
        .into_iter()
        .map(|c| c.dot(&c))
        .collect();
    let proportion: Vec<f64> = ss_loadings.iter().map(|v| v / p).collect();
    let cumulative = proportion
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect();
    FactorVariance {
        ss_loadings,
        proportion,
        cumulative,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::symmetric_eigen;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_kaiser_criterion() {
        assert_eq!(kaiser_criterion(&[2.5, 1.2, 0.8, 0.5]), 2);
        assert_eq!(kaiser_criterion(&[0.9, 0.6]), 1);
        // exactly one is not retained
        assert_eq!(kaiser_criterion(&[3.0, 1.0, 0.0]), 1);
    }

    #[test]
    fn test_principal_loadings_reproduce_correlation() {
        let r = array![[1.0, 0.6], [0.6, 1.0]];
        let eig = symmetric_eigen(&r).unwrap();
        // With every factor retained, L Lᵀ = R
        let l = principal_loadings(&eig, 2).unwrap();
        let rebuilt = l.dot(&l.t());
        for (a, b) in rebuilt.iter().zip(r.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
        assert!(l.column(0).sum() >= 0.0);
        assert!(l.column(1).sum() >= 0.0);
    }

    #[test]
    fn test_all_factors_explain_all_variance() {
        let r = array![[1.0, 0.6, 0.3], [0.6, 1.0, -0.2], [0.3, -0.2, 1.0]];
        let eig = symmetric_eigen(&r).unwrap();
        let l = varimax(&principal_loadings(&eig, 3).unwrap(), 1000, 1e-5).unwrap();
        for row in l.rows() {
            assert_abs_diff_eq!(row.dot(&row), 1.0, epsilon = 1e-10);
        }
        let fv = factor_variance(&l);
        assert_abs_diff_eq!(fv.cumulative[2] * 100.0, 100.0, epsilon = 1e-8);
        assert_abs_diff_eq!(fv.ss_loadings.iter().sum::<f64>(), 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_principal_loadings_rejects_factor_count() {
        let eig = symmetric_eigen(&array![[1.0, 0.6], [0.6, 1.0]]).unwrap();
        assert!(principal_loadings(&eig, 0).is_err());
        assert!(principal_loadings(&eig, 3).is_err());
    }

    #[test]
    fn test_varimax_recovers_simple_structure() {
        // Two blocks of variables mixed by a 30 degree rotation
        let (sin, cos) = std::f64::consts::FRAC_PI_6.sin_cos();
        let pure = array![[0.9, 0.1], [0.8, 0.2], [0.1, 0.85], [0.2, 0.7], [0.5, 0.5]];
        let mix = array![[cos, sin], [-sin, cos]];
        let mixed = pure.dot(&mix);
        let rotated = varimax(&mixed, 1000, 1e-5).unwrap();

        // Communalities are invariant under rotation
        for i in 0..5 {
            let before = mixed.row(i).dot(&mixed.row(i));
            let after = rotated.row(i).dot(&rotated.row(i));
            assert_abs_diff_eq!(before, after, epsilon = 1e-10);
        }
        for (got, want) in rotated.iter().zip(pure.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 0.02);
        }
    }

    #[test]
    fn test_varimax_from_balanced_start() {
        // Both blocks sit near 45 degrees between the unrotated axes
        let (sin, cos) = std::f64::consts::FRAC_PI_4.sin_cos();
        let pure = array![[0.95, 0.02], [0.9, -0.03], [0.01, 0.92], [-0.02, 0.88]];
        let mixed = pure.dot(&array![[cos, sin], [-sin, cos]]);
        let rotated = varimax(&mixed, 1000, 1e-5).unwrap();
        for row in rotated.rows() {
            let (big, small) = if row[0].abs() > row[1].abs() { (row[0], row[1]) } else { (row[1], row[0]) };
            assert!(big.abs() > 0.85, "{:?}", row);
            assert!(small.abs() < 0.1, "{:?}", row);
        }
        let first = |i: usize| rotated[(i, 0)].abs() > rotated[(i, 1)].abs();
        assert_eq!(first(0), first(1));
        assert_eq!(first(2), first(3));
        assert_ne!(first(0), first(2));
    }

    #[test]
    fn test_varimax_single_factor_unchanged() {
        let l = array![[0.5], [0.7], [0.2]];
        assert_eq!(varimax(&l, 1000, 1e-5).unwrap(), l);
    }

    #[test]
    fn test_factor_variance() {
        let l = array![[0.8, 0.0], [0.6, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let fv = factor_variance(&l);
        assert_abs_diff_eq!(fv.ss_loadings[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fv.ss_loadings[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fv.proportion[0], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(fv.cumulative[1], 0.5, epsilon = 1e-12);
    }
}
