//! Descriptive statistics and the few distribution functions the tests need.

use crate::error::{Error, Result};

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by n).
pub fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Z-scores with the population standard deviation.
///
/// Fails on an empty slice or a zero-variance variable.
pub fn standardize(values: &[f64]) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(Error::Algorithm("Cannot standardize an empty variable".into()));
    }
    let m = mean(values);
    let s = std_dev(values);
    if s < f64::EPSILON {
        return Err(Error::Algorithm(
            "Cannot standardize a variable with zero variance".into(),
        ));
    }
    Ok(values.iter().map(|v| (v - m) / s).collect())
}

/// Approximate CDF of the standard normal distribution.
/// Abramowitz & Stegun 26.2.17 (error < 7.5e-8)
pub fn normal_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }

    let t = 1.0 / (1.0 + 0.2316419 * x.abs());
    let d = 0.3989422804014327; // 1/sqrt(2*pi)
    let p = d
        * (-x * x / 2.0).exp()
        * (t * (0.3193815 + t * (-0.3565638 + t * (1.781478 + t * (-1.821256 + t * 1.330274)))));

    if x > 0.0 {
        1.0 - p
    } else {
        p
    }
}

/// Upper tail of the standard normal distribution.
pub fn normal_sf(x: f64) -> f64 {
    normal_cdf(-x)
}

/// Survival function of the chi-square distribution.
pub fn chi2_sf(x: f64, dof: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    gamma_q(dof / 2.0, x / 2.0)
}

/// Natural log of the gamma function (Lanczos, g = 7).
fn ln_gamma(x: f64) -> f64 {
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection formula
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = COEF[0];
    let t = x + 7.5;
    for (i, c) in COEF.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Regularized upper incomplete gamma function Q(a, x).
fn gamma_q(a: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 500;
    const EPS: f64 = 1e-14;

    if x < a + 1.0 {
        // Series for P(a, x)
        let mut sum = 1.0 / a;
        let mut term = sum;
        let mut ap = a;
        for _ in 0..MAX_ITER {
            ap += 1.0;
            term *= x / ap;
            sum += term;
            if term.abs() < sum.abs() * EPS {
                break;
            }
        }
        let p = sum * (-x + a * x.ln() - ln_gamma(a)).exp();
        (1.0 - p).clamp(0.0, 1.0)
    } else {
        // Lentz continued fraction for Q(a, x)
        let tiny = 1e-300;
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / tiny;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..MAX_ITER {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < tiny {
                d = tiny;
            }
            c = b + an / c;
            if c.abs() < tiny {
                c = tiny;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < EPS {
                break;
            }
        }
        ((-x + a * x.ln() - ln_gamma(a)).exp() * h).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_standardize() {
        let z = standardize(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_abs_diff_eq!(mean(&z), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(std_dev(&z), 1.0, epsilon = 1e-12);
        // population std of 1..4 is sqrt(1.25)
        assert_abs_diff_eq!(z[0], -1.5 / 1.25_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_standardize_constant_fails() {
        assert!(standardize(&[2.0, 2.0, 2.0]).is_err());
        assert!(standardize(&[]).is_err());
    }

    #[test]
    fn test_normal_cdf() {
        assert_abs_diff_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(normal_cdf(1.96), 0.975, epsilon = 1e-3);
        assert_abs_diff_eq!(normal_sf(1.96), 0.025, epsilon = 1e-3);
    }

    #[test]
    fn test_chi2_sf() {
        // dof 2 has the closed form exp(-x/2)
        assert_abs_diff_eq!(chi2_sf(3.0, 2.0), (-1.5_f64).exp(), epsilon = 1e-10);
        // critical values from standard tables
        assert_abs_diff_eq!(chi2_sf(3.841_458_820_694_124, 1.0), 0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(chi2_sf(18.307_038_053_275_146, 10.0), 0.05, epsilon = 1e-6);
        assert_eq!(chi2_sf(0.0, 3.0), 1.0);
    }
}
