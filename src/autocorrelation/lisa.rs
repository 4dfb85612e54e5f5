//! Local Moran's I (LISA) with conditional permutation inference

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;

use super::{check_inputs, Permutations};
use crate::error::Result;
use crate::stats::{mean, normal_sf, std_dev};
use crate::weights::SpatialWeights;

/// Moran scatter plot quadrant of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    HighHigh = 1,
    LowHigh = 2,
    LowLow = 3,
    HighLow = 4,
}

impl Quadrant {
    fn classify(z: f64, lag: f64) -> Self {
        match (z > 0.0, lag > 0.0) {
            (true, true) => Quadrant::HighHigh,
            (false, true) => Quadrant::LowHigh,
            (false, false) => Quadrant::LowLow,
            (true, false) => Quadrant::HighLow,
        }
    }
}

/// Cluster label used on LISA maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cluster {
    NotSignificant,
    HighHigh,
    LowHigh,
    LowLow,
    HighLow,
}

impl Cluster {
    pub const ALL: [Cluster; 5] = [
        Cluster::HighHigh,
        Cluster::LowHigh,
        Cluster::LowLow,
        Cluster::HighLow,
        Cluster::NotSignificant,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Cluster::NotSignificant => "ns",
            Cluster::HighHigh => "HH",
            Cluster::LowHigh => "LH",
            Cluster::LowLow => "LL",
            Cluster::HighLow => "HL",
        }
    }
}

impl From<Quadrant> for Cluster {
    fn from(q: Quadrant) -> Self {
        match q {
            Quadrant::HighHigh => Cluster::HighHigh,
            Quadrant::LowHigh => Cluster::LowHigh,
            Quadrant::LowLow => Cluster::LowLow,
            Quadrant::HighLow => Cluster::HighLow,
        }
    }
}

/// Per-location results of the local Moran statistic.
#[derive(Debug, Clone)]
pub struct LocalMoran {
    /// Local statistic Is_i
    pub is: Vec<f64>,
    pub quadrants: Vec<Quadrant>,
    /// Pseudo p-values; empty when no permutations were run
    pub p_sim: Vec<f64>,
    pub z_sim: Vec<f64>,
    pub p_z_sim: Vec<f64>,
}

impl LocalMoran {
    /// Label each location with its quadrant when `p_sim <= significance`.
    /// Without permutation inference every location is `NotSignificant`.
    pub fn cluster_labels(&self, significance: f64) -> Vec<Cluster> {
        self.quadrants
            .iter()
            .enumerate()
            .map(|(i, &q)| match self.p_sim.get(i) {
                Some(&p) if p <= significance => Cluster::from(q),
                _ => Cluster::NotSignificant,
            })
            .collect()
    }
}

/// Compute local Moran's I for every location.
///
/// Values are z-standardized internally. Conditional permutation draws,
/// for each location, as many other observations as it has neighbors and
/// recomputes its statistic; locations are processed in parallel with a
/// per-location seed so results do not depend on the thread count.
pub fn local_moran(
    values: &[f64],
    w: &SpatialWeights,
    permutations: Permutations,
) -> Result<LocalMoran> {
    check_inputs(values, w)?;

    let n = values.len();
    let m = mean(values);
    let sd = std_dev(values);
    let z: Vec<f64> = values.iter().map(|v| (v - m) / sd).collect();
    let den: f64 = z.iter().map(|v| v * v).sum();
    let scale = (n as f64 - 1.0) / den;

    let lag = w.spatial_lag(&z);
    let is: Vec<f64> = z.iter().zip(&lag).map(|(zi, li)| scale * zi * li).collect();
    let quadrants: Vec<Quadrant> = z
        .iter()
        .zip(&lag)
        .map(|(&zi, &li)| Quadrant::classify(zi, li))
        .collect();

    if permutations.count == 0 {
        return Ok(LocalMoran {
            is,
            quadrants,
            p_sim: Vec::new(),
            z_sim: Vec::new(),
            p_z_sim: Vec::new(),
        });
    }

    let perms = permutations.count;
    let inference: Vec<(f64, f64, f64)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let k = w.neighbors(i).len();
            // Islands have no lag to permute
            if k == 0 {
                return (1.0, 0.0, 1.0);
            }
            let wi = w.weights(i);
            let mut rng = StdRng::seed_from_u64(permutations.seed.wrapping_add(i as u64));
            let sims: Vec<f64> = (0..perms)
                .map(|_| {
                    let lag_sim: f64 = index::sample(&mut rng, n - 1, k)
                        .iter()
                        .map(|j| if j >= i { j + 1 } else { j })
                        .zip(wi)
                        .map(|(j, wij)| wij * z[j])
                        .sum();
                    scale * z[i] * lag_sim
                })
                .collect();

            let larger = sims.iter().filter(|&&s| s >= is[i]).count();
            let larger = larger.min(perms - larger);
            let p_sim = (larger as f64 + 1.0) / (perms as f64 + 1.0);

            let sim_mean = mean(&sims);
            let sim_sd = std_dev(&sims);
            let z_sim = if sim_sd > 0.0 {
                (is[i] - sim_mean) / sim_sd
            } else {
                0.0
            };
            (p_sim, z_sim, normal_sf(z_sim.abs()))
        })
        .collect();

    let p_sim = inference.iter().map(|r| r.0).collect();
    let z_sim = inference.iter().map(|r| r.1).collect();
    let p_z_sim = inference.iter().map(|r| r.2).collect();

    Ok(LocalMoran {
        is,
        quadrants,
        p_sim,
        z_sim,
        p_z_sim,
    })
}
