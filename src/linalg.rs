//! Small dense linear algebra on `ndarray` matrices.
//!
//! Matrices here are at most variables × variables, so a cyclic Jacobi
//! eigensolver is accurate and fast enough.

use ndarray::{Array1, Array2};

use crate::error::{Error, Result};

/// Eigen decomposition of a symmetric matrix.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    /// Eigenvalues, sorted descending
    pub values: Array1<f64>,
    /// Eigenvectors as columns, in the order of `values`
    pub vectors: Array2<f64>,
}

/// Jacobi eigenvalue algorithm for symmetric matrices.
pub fn symmetric_eigen(matrix: &Array2<f64>) -> Result<SymmetricEigen> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(Error::Algorithm(format!(
            "Eigen decomposition needs a square matrix, got {}x{}",
            n,
            matrix.ncols()
        )));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(Error::Algorithm("Matrix contains non-finite values".into()));
    }

    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);
    let max_sweeps = 100;
    let scale = a.iter().map(|x| x.abs()).fold(0.0, f64::max).max(f64::MIN_POSITIVE);

    for _ in 0..max_sweeps {
        let off: f64 = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .map(|(i, j)| a[(i, j)] * a[(i, j)])
            .sum();
        if off.sqrt() < 1e-14 * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[(p, q)];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let app = a[(p, p)];
                let aqq = a[(q, q)];
                let theta = (aqq - app) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let t = if theta == 0.0 { 1.0 } else { t };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[(k, p)];
                    let akq = a[(k, q)];
                    a[(k, p)] = c * akp - s * akq;
                    a[(k, q)] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[(p, k)];
                    let aqk = a[(q, k)];
                    a[(p, k)] = c * apk - s * aqk;
                    a[(q, k)] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[(k, p)];
                    let vkq = v[(k, q)];
                    v[(k, p)] = c * vkp - s * vkq;
                    v[(k, q)] = s * vkp + c * vkq;
                }
            }
        }
    }

    // Sort by eigenvalue descending
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[(j, j)].total_cmp(&a[(i, i)]));

    let values = Array1::from_iter(order.iter().map(|&i| a[(i, i)]));
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }

    Ok(SymmetricEigen { values, vectors })
}

/// Determinant of a symmetric matrix as the product of its eigenvalues.
pub fn symmetric_determinant(matrix: &Array2<f64>) -> Result<f64> {
    Ok(symmetric_eigen(matrix)?.values.iter().product())
}

/// Inverse of a symmetric positive-definite matrix.
pub fn symmetric_inverse(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let eig = symmetric_eigen(matrix)?;
    let max = eig.values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if eig.values.iter().any(|&v| v.abs() <= max * 1e-12) {
        return Err(Error::Algorithm("Matrix is singular".into()));
    }
    let inv_values = eig.values.mapv(|v| 1.0 / v);
    Ok(reconstruct(&eig.vectors, &inv_values))
}

/// `Q diag(d) Qᵀ`
fn reconstruct(vectors: &Array2<f64>, diag: &Array1<f64>) -> Array2<f64> {
    let scaled = vectors * &diag.view().insert_axis(ndarray::Axis(0));
    scaled.dot(&vectors.t())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_eigen_sorted_descending() {
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let eig = symmetric_eigen(&m).unwrap();
        assert_abs_diff_eq!(eig.values[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eig.values[1], 1.0, epsilon = 1e-12);

        // A v = lambda v
        for k in 0..2 {
            let v = eig.vectors.column(k);
            let av = m.dot(&v);
            for i in 0..2 {
                assert_abs_diff_eq!(av[i], eig.values[k] * v[i], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_eigen_three_by_three() {
        let m = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 1.0]];
        let eig = symmetric_eigen(&m).unwrap();
        let trace: f64 = eig.values.sum();
        assert_abs_diff_eq!(trace, 8.0, epsilon = 1e-10);
        let rebuilt = reconstruct(&eig.vectors, &eig.values);
        for (a, b) in rebuilt.iter().zip(m.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_determinant_and_inverse() {
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        assert_abs_diff_eq!(symmetric_determinant(&m).unwrap(), 3.0, epsilon = 1e-12);
        let inv = symmetric_inverse(&m).unwrap();
        let id = m.dot(&inv);
        assert_abs_diff_eq!(id[(0, 0)], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(id[(0, 1)], 0.0, epsilon = 1e-12);

        let singular = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(symmetric_inverse(&singular).is_err());
    }
}
