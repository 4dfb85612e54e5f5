//! Geary's C

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{check_inputs, PermutationInference, Permutations};
use crate::error::Result;
use crate::stats::{mean, normal_sf};
use crate::weights::SpatialWeights;

#[derive(Debug, Clone)]
pub struct Geary {
    /// Geary's C; below 1 for positive autocorrelation
    pub c: f64,
    /// Always 1
    pub expected: f64,
    pub var_norm: f64,
    pub z_norm: f64,
    pub p_norm: f64,
    /// NaN with fewer than 4 observations
    pub var_rand: f64,
    pub z_rand: f64,
    pub p_rand: f64,
    pub permutation: Option<PermutationInference>,
}

impl Geary {
    pub fn p_sim(&self) -> f64 {
        self.permutation.as_ref().map_or(f64::NAN, |p| p.p_sim)
    }
}

fn statistic(y: &[f64], w: &SpatialWeights, den: f64) -> f64 {
    let n = y.len();
    let sum: f64 = (0..n)
        .map(|i| {
            w.neighbors(i)
                .iter()
                .zip(w.weights(i))
                .map(|(&j, wij)| wij * (y[i] - y[j]).powi(2))
                .sum::<f64>()
        })
        .sum();
    (n as f64 - 1.0) * sum / den
}

/// Compute Geary's C with normal, randomization and permutation inference.
pub fn geary(values: &[f64], w: &SpatialWeights, permutations: Permutations) -> Result<Geary> {
    check_inputs(values, w)?;

    let n = values.len() as f64;
    let m = mean(values);
    let yss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    let s0 = w.s0();
    let s1 = w.s1();
    let s2 = w.s2();
    let s02 = s0 * s0;
    let den = 2.0 * s0 * yss;

    let c = statistic(values, w, den);

    let n2 = n * n;
    let var_norm = ((2.0 * s1 + s2) * (n - 1.0) - 4.0 * s02) / (2.0 * (n + 1.0) * s02);
    let var_rand = if n > 3.0 {
        let k = (values.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n) / (yss / n).powi(2);
        let a = (n - 1.0) * s1 * (n2 - 3.0 * n + 3.0 - (n - 1.0) * k);
        let b = 0.25 * ((n - 1.0) * s2 * (n2 + 3.0 * n - 6.0 - (n2 - n + 2.0) * k));
        let cc = s02 * (n2 - 3.0 - (n - 1.0).powi(2) * k);
        (a - b + cc) / (n * (n - 2.0) * (n - 3.0) * s02)
    } else {
        f64::NAN
    };

    let z_norm = (c - 1.0) / var_norm.sqrt();
    let z_rand = (c - 1.0) / var_rand.sqrt();

    let permutation = (permutations.count > 0).then(|| {
        let mut rng = StdRng::seed_from_u64(permutations.seed);
        let mut shuffled = values.to_vec();
        let sims: Vec<f64> = (0..permutations.count)
            .map(|_| {
                shuffled.shuffle(&mut rng);
                statistic(&shuffled, w, den)
            })
            .collect();
        PermutationInference::from_simulations(c, &sims)
    });

    tracing::debug!("Geary's C = {:.4} (z_norm = {:.3})", c, z_norm);

    Ok(Geary {
        c,
        expected: 1.0,
        var_norm,
        z_norm,
        p_norm: 2.0 * normal_sf(z_norm.abs()),
        var_rand,
        z_rand,
        p_rand: 2.0 * normal_sf(z_rand.abs()),
        permutation,
    })
}
