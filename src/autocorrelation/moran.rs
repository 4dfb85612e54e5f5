//! Global Moran's I

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{check_inputs, PermutationInference, Permutations};
use crate::error::Result;
use crate::stats::{mean, normal_sf};
use crate::weights::SpatialWeights;

/// Result of Global Moran's I computation
#[derive(Debug, Clone)]
pub struct Moran {
    /// Moran's I statistic
    pub i: f64,
    /// Expected I under the null, -1/(n-1)
    pub expected: f64,
    /// Variance under the normality assumption
    pub var_norm: f64,
    pub z_norm: f64,
    /// Two-tailed p-value under normality
    pub p_norm: f64,
    /// Variance under randomization; NaN with fewer than 4 observations
    pub var_rand: f64,
    pub z_rand: f64,
    pub p_rand: f64,
    /// Permutation inference, when permutations were requested
    pub permutation: Option<PermutationInference>,
}

impl Moran {
    pub fn z_sim(&self) -> f64 {
        self.permutation.as_ref().map_or(f64::NAN, |p| p.z_sim)
    }

    pub fn p_sim(&self) -> f64 {
        self.permutation.as_ref().map_or(f64::NAN, |p| p.p_sim)
    }
}

/// I = n / S0 * (z' W z) / (z' z) with z the deviations from the mean.
fn statistic(z: &[f64], w: &SpatialWeights, s0: f64, den: f64) -> f64 {
    let lag = w.spatial_lag(z);
    let num: f64 = z.iter().zip(&lag).map(|(a, b)| a * b).sum();
    z.len() as f64 / s0 * num / den
}

/// Compute Global Moran's I.
///
/// # Arguments
/// * `values` - One observation per weights row
/// * `w` - Spatial weights, usually row-standardized
/// * `permutations` - Number of random permutations for pseudo p-values
pub fn moran(values: &[f64], w: &SpatialWeights, permutations: Permutations) -> Result<Moran> {
    check_inputs(values, w)?;

    let n = values.len() as f64;
    let m = mean(values);
    let z: Vec<f64> = values.iter().map(|v| v - m).collect();
    let den: f64 = z.iter().map(|v| v * v).sum();
    let s0 = w.s0();
    let s1 = w.s1();
    let s2 = w.s2();
    let s02 = s0 * s0;

    let i = statistic(&z, w, s0, den);
    let expected = -1.0 / (n - 1.0);

    let n2 = n * n;
    let var_norm = (n2 * s1 - n * s2 + 3.0 * s02) / ((n - 1.0) * (n + 1.0) * s02) - expected * expected;
    let z_norm = (i - expected) / var_norm.sqrt();
    let p_norm = 2.0 * normal_sf(z_norm.abs());

    let var_rand = if n > 3.0 {
        let k = (z.iter().map(|v| v.powi(4)).sum::<f64>() / n) / (den / n).powi(2);
        let a = n * ((n2 - 3.0 * n + 3.0) * s1 - n * s2 + 3.0 * s02);
        let b = k * ((n2 - n) * s1 - 2.0 * n * s2 + 6.0 * s02);
        (a - b) / ((n - 1.0) * (n - 2.0) * (n - 3.0) * s02) - expected * expected
    } else {
        f64::NAN
    };
    let z_rand = (i - expected) / var_rand.sqrt();
    let p_rand = 2.0 * normal_sf(z_rand.abs());

    let permutation = (permutations.count > 0).then(|| {
        let mut rng = StdRng::seed_from_u64(permutations.seed);
        let mut shuffled = z.clone();
        let sims: Vec<f64> = (0..permutations.count)
            .map(|_| {
                shuffled.shuffle(&mut rng);
                statistic(&shuffled, w, s0, den)
            })
            .collect();
        PermutationInference::from_simulations(i, &sims)
    });

    tracing::debug!("Moran's I = {:.4} (E[I] = {:.4}, z_norm = {:.3})", i, expected, z_norm);

    Ok(Moran {
        i,
        expected,
        var_norm,
        z_norm,
        p_norm,
        var_rand,
        z_rand,
        p_rand,
        permutation,
    })
}
