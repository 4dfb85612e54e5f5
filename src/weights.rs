//! Contiguity-based spatial weights.
//!
//! Point observations have no shared boundaries of their own, so contiguity
//! is defined on their Voronoi cells: two points are rook neighbours when
//! their cells share an edge (a Delaunay edge) and queen neighbours when the
//! cells share at least a vertex, which adds the diagonals of co-circular
//! point sets such as regular grids.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};

/// Which cell contacts count as adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Contiguity {
    /// Shared edge
    Rook,
    /// Shared edge or vertex
    #[default]
    Queen,
}

/// Weight transformation currently applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Binary,
    RowStandardized,
}

/// Sparse neighbour lists with one weight per neighbour.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialWeights {
    neighbors: Vec<Vec<usize>>,
    weights: Vec<Vec<f64>>,
    transform: Transform,
}

impl SpatialWeights {
    /// Binary weights from explicit neighbour lists.
    ///
    /// Neighbour lists are sorted and deduplicated; self-links and
    /// out-of-range indices are rejected.
    pub fn from_neighbors(neighbors: Vec<Vec<usize>>) -> Result<Self> {
        let n = neighbors.len();
        let mut cleaned = Vec::with_capacity(n);
        for (i, list) in neighbors.into_iter().enumerate() {
            let set: BTreeSet<usize> = list.into_iter().collect();
            if set.contains(&i) {
                return Err(Error::Weights(format!("Observation {i} lists itself as neighbor")));
            }
            if let Some(&bad) = set.iter().find(|&&j| j >= n) {
                return Err(Error::Weights(format!(
                    "Observation {i} has neighbor {bad} outside 0..{n}"
                )));
            }
            cleaned.push(set.into_iter().collect::<Vec<_>>());
        }
        let weights = cleaned.iter().map(|l| vec![1.0; l.len()]).collect();
        Ok(Self {
            neighbors: cleaned,
            weights,
            transform: Transform::Binary,
        })
    }

    /// Contiguity on a regular `rows` x `cols` lattice, row-major ids.
    pub fn lattice(rows: usize, cols: usize, contiguity: Contiguity) -> Result<Self> {
        let mut neighbors = vec![Vec::new(); rows * cols];
        for row in 0..rows {
            for col in 0..cols {
                for dr in -1_isize..=1 {
                    for dc in -1_isize..=1 {
                        if dr == 0 && dc == 0 {
                            continue;
                        }
                        if contiguity == Contiguity::Rook && dr != 0 && dc != 0 {
                            continue;
                        }
                        let nr = row as isize + dr;
                        let nc = col as isize + dc;
                        if nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols {
                            neighbors[row * cols + col].push(nr as usize * cols + nc as usize);
                        }
                    }
                }
            }
        }
        Self::from_neighbors(neighbors)
    }

    /// Contiguity of the Voronoi cells of a point set.
    pub fn from_points(points: &[(f64, f64)], contiguity: Contiguity) -> Result<Self> {
        let n = points.len();
        if n < 2 {
            return Err(Error::Weights(format!("Need at least 2 points, got {n}")));
        }
        if let Some(p) = points.iter().find(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(Error::Weights(format!("Non-finite coordinate {:?}", p)));
        }
        check_duplicates(points)?;

        let mut neighbors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        if n == 2 {
            neighbors[0].insert(1);
            neighbors[1].insert(0);
        } else {
            let triangles = delaunay(points);
            if triangles.is_empty() {
                // Collinear points: each cell touches only its neighbours along the line
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| {
                    points[a]
                        .0
                        .total_cmp(&points[b].0)
                        .then(points[a].1.total_cmp(&points[b].1))
                });
                for pair in order.windows(2) {
                    neighbors[pair[0]].insert(pair[1]);
                    neighbors[pair[1]].insert(pair[0]);
                }
            } else {
                let centers = circumcenters(points, &triangles);
                let mut edges: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
                for (k, tri) in triangles.iter().enumerate() {
                    for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                        edges.entry((a.min(b), a.max(b))).or_default().push(k);
                    }
                }
                for ((a, b), shared_by) in edges {
                    // Both triangles on one circle: the Voronoi cells meet at a point only
                    let point_contact = matches!(
                        shared_by.as_slice(),
                        &[s, t] if same_center(centers[s], centers[t])
                    );
                    if !point_contact {
                        neighbors[a].insert(b);
                        neighbors[b].insert(a);
                    }
                }
                if contiguity == Contiguity::Queen {
                    link_cocircular(&triangles, &centers, &mut neighbors);
                }
            }
        }

        let weights = Self::from_neighbors(neighbors.into_iter().map(|s| s.into_iter().collect()).collect())?;
        let islands = weights.islands();
        if !islands.is_empty() {
            tracing::warn!("{} observations have no neighbors", islands.len());
        }
        Ok(weights)
    }

    pub fn n(&self) -> usize {
        self.neighbors.len()
    }

    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    pub fn weights(&self, i: usize) -> &[f64] {
        &self.weights[i]
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn cardinalities(&self) -> Vec<usize> {
        self.neighbors.iter().map(Vec::len).collect()
    }

    /// Observations without any neighbour.
    pub fn islands(&self) -> Vec<usize> {
        self.neighbors
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Row-standardize so each observation's weights sum to one.
    /// Islands keep an empty row.
    pub fn row_standardize(&mut self) {
        for row in &mut self.weights {
            let sum: f64 = row.iter().sum();
            if sum > 0.0 {
                row.iter_mut().for_each(|w| *w /= sum);
            }
        }
        self.transform = Transform::RowStandardized;
    }

    /// Weighted sum of each observation's neighbours.
    pub fn spatial_lag(&self, values: &[f64]) -> Vec<f64> {
        self.neighbors
            .iter()
            .zip(&self.weights)
            .map(|(nbrs, ws)| nbrs.iter().zip(ws).map(|(&j, w)| w * values[j]).sum())
            .collect()
    }

    fn weight(&self, i: usize, j: usize) -> f64 {
        self.neighbors[i]
            .binary_search(&j)
            .map(|k| self.weights[i][k])
            .unwrap_or(0.0)
    }

    /// Sum of all weights.
    pub fn s0(&self) -> f64 {
        self.weights.iter().flatten().sum()
    }

    /// Half the sum of squared symmetric pair weights.
    pub fn s1(&self) -> f64 {
        let mut total = 0.0;
        for (i, nbrs) in self.neighbors.iter().enumerate() {
            for (k, &j) in nbrs.iter().enumerate() {
                let wij = self.weights[i][k];
                let wji = self.weight(j, i);
                total += (wij + wji).powi(2);
            }
        }
        // Pairs with a one-directional link were only counted from i
        for (i, nbrs) in self.neighbors.iter().enumerate() {
            for &j in nbrs {
                if self.neighbors[j].binary_search(&i).is_err() {
                    total += self.weight(i, j).powi(2);
                }
            }
        }
        total / 2.0
    }

    /// Sum over observations of squared (row sum + column sum).
    pub fn s2(&self) -> f64 {
        let n = self.n();
        let mut col_sums = vec![0.0; n];
        for (nbrs, ws) in self.neighbors.iter().zip(&self.weights) {
            for (&j, w) in nbrs.iter().zip(ws) {
                col_sums[j] += w;
            }
        }
        self.weights
            .iter()
            .zip(col_sums)
            .map(|(row, col)| (row.iter().sum::<f64>() + col).powi(2))
            .sum()
    }
}

fn check_duplicates(points: &[(f64, f64)]) -> Result<()> {
    let mut seen: HashMap<(u64, u64), usize> = HashMap::with_capacity(points.len());
    for (i, &(x, y)) in points.iter().enumerate() {
        let key = ((x + 0.0).to_bits(), (y + 0.0).to_bits());
        if let Some(first) = seen.insert(key, i) {
            return Err(Error::Weights(format!(
                "Observations {first} and {i} share the coordinate ({x}, {y})"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Circumcircle {
    cx: f64,
    cy: f64,
}

fn circumcircle(p0: (f64, f64), p1: (f64, f64), p2: (f64, f64)) -> Option<Circumcircle> {
    let (ax, ay) = p0;
    let (bx, by) = p1;
    let (cx, cy) = p2;

    let d = 2.0 * (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by));
    if d == 0.0 {
        return None;
    }

    let ux = ((ax * ax + ay * ay) * (by - cy) + (bx * bx + by * by) * (cy - ay) + (cx * cx + cy * cy) * (ay - by)) / d;
    let uy = ((ax * ax + ay * ay) * (cx - bx) + (bx * bx + by * by) * (ax - cx) + (cx * cx + cy * cy) * (bx - ax)) / d;

    Some(Circumcircle { cx: ux, cy: uy })
}

/// Relative error bound below which a predicate counts as a tie.
const PREDICATE_EPSILON: f64 = 1e-9;

/// Twice the signed area of `abc`: positive when counter-clockwise, zero
/// when collinear within rounding.
fn orient(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    let left = (b.0 - a.0) * (c.1 - a.1);
    let right = (b.1 - a.1) * (c.0 - a.0);
    let det = left - right;
    if det.abs() <= PREDICATE_EPSILON * (left.abs() + right.abs()) {
        0.0
    } else {
        det
    }
}

/// Whether `d` lies strictly inside the circumcircle of the
/// counter-clockwise triangle `abc`.
fn in_circle(a: (f64, f64), b: (f64, f64), c: (f64, f64), d: (f64, f64)) -> bool {
    let (adx, ady) = (a.0 - d.0, a.1 - d.1);
    let (bdx, bdy) = (b.0 - d.0, b.1 - d.1);
    let (cdx, cdy) = (c.0 - d.0, c.1 - d.1);
    let alift = adx * adx + ady * ady;
    let blift = bdx * bdx + bdy * bdy;
    let clift = cdx * cdx + cdy * cdy;

    let det = alift * (bdx * cdy - bdy * cdx) + blift * (cdx * ady - cdy * adx) + clift * (adx * bdy - ady * bdx);
    let permanent = alift * ((bdx * cdy).abs() + (bdy * cdx).abs())
        + blift * ((cdx * ady).abs() + (cdy * adx).abs())
        + clift * ((adx * bdy).abs() + (ady * bdx).abs());
    det > PREDICATE_EPSILON * permanent
}

/// Vertex at infinity closing every convex-hull edge into a triangle.
const GHOST: usize = usize::MAX;

/// Incremental Bowyer-Watson triangulation on normalized coordinates;
/// returns counter-clockwise vertex index triples, or nothing when all
/// points are collinear.
///
/// Hull edges are stored as triangles `[a, b, GHOST]` with the outside on
/// the left of `a -> b`. A new point outside the hull conflicts with every
/// hull edge it can see.
fn delaunay(points: &[(f64, f64)]) -> Vec<[usize; 3]> {
    let vertices = normalize(points);
    if vertices.len() < 3 {
        return Vec::new();
    }

    let Some(seed) = (2..vertices.len()).find(|&k| orient(vertices[0], vertices[1], vertices[k]) != 0.0) else {
        return Vec::new();
    };
    let (a, b) = if orient(vertices[0], vertices[1], vertices[seed]) > 0.0 {
        (0, 1)
    } else {
        (1, 0)
    };
    let mut triangles: Vec<[usize; 3]> = vec![[a, b, seed], [b, a, GHOST], [seed, b, GHOST], [a, seed, GHOST]];

    let conflicts = |t: &[usize; 3], p: (f64, f64)| -> bool {
        let (u, v) = (vertices[t[0]], vertices[t[1]]);
        if t[2] == GHOST {
            let side = orient(u, v, p);
            // On the open hull edge itself
            side > 0.0 || (side == 0.0 && (p.0 - u.0) * (p.0 - v.0) + (p.1 - u.1) * (p.1 - v.1) < 0.0)
        } else {
            in_circle(u, v, vertices[t[2]], p)
        }
    };

    for (vi, &point) in vertices.iter().enumerate() {
        if vi == 0 || vi == 1 || vi == seed {
            continue;
        }

        let bad: Vec<usize> = triangles
            .iter()
            .enumerate()
            .filter(|&(_, t)| conflicts(t, point))
            .map(|(i, _)| i)
            .collect();

        // Boundary of the cavity: edges not shared by two bad triangles
        let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
        for &bi in &bad {
            let t = triangles[bi];
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                *edge_count.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        let mut boundary = Vec::new();
        for &bi in &bad {
            let t = triangles[bi];
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                if edge_count[&(a.min(b), a.max(b))] == 1 {
                    boundary.push((a, b));
                }
            }
        }

        let mut bad_sorted = bad;
        bad_sorted.sort_unstable_by(|a, b| b.cmp(a));
        for bi in bad_sorted {
            triangles.swap_remove(bi);
        }
        for (a, b) in boundary {
            // Keep the ghost last so hull edges stay `[a, b, GHOST]`
            let triangle = match (a == GHOST, b == GHOST) {
                (true, _) => [b, vi, GHOST],
                (_, true) => [vi, a, GHOST],
                _ => [a, b, vi],
            };
            triangles.push(triangle);
        }
    }

    triangles
        .into_iter()
        .filter(|t| t[2] != GHOST)
        .filter(|t| circumcircle(vertices[t[0]], vertices[t[1]], vertices[t[2]]).is_some())
        .collect()
}

/// Shift and scale coordinates into the unit square so tolerances do not
/// depend on the CRS units.
fn normalize(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let (min_x, max_x) = points.iter().fold((f64::MAX, f64::MIN), |(lo, hi), p| (lo.min(p.0), hi.max(p.0)));
    let (min_y, max_y) = points.iter().fold((f64::MAX, f64::MIN), |(lo, hi), p| (lo.min(p.1), hi.max(p.1)));
    let extent = (max_x - min_x).max(max_y - min_y).max(f64::MIN_POSITIVE);
    points
        .iter()
        .map(|&(x, y)| ((x - min_x) / extent, (y - min_y) / extent))
        .collect()
}

/// Circumcentre of each triangle in normalized coordinates.
fn circumcenters(points: &[(f64, f64)], triangles: &[[usize; 3]]) -> Vec<(f64, f64)> {
    let normalized = normalize(points);
    triangles
        .iter()
        .map(|t| {
            circumcircle(normalized[t[0]], normalized[t[1]], normalized[t[2]])
                .map_or((f64::NAN, f64::NAN), |cc| (cc.cx, cc.cy))
        })
        .collect()
}

fn same_center(a: (f64, f64), b: (f64, f64)) -> bool {
    const TOLERANCE: f64 = 1e-9;
    (a.0 - b.0).abs() < TOLERANCE && (a.1 - b.1).abs() < TOLERANCE
}

/// Voronoi cells meeting at a shared vertex: all vertices of triangles with
/// the same circumcentre are mutual queen neighbours.
fn link_cocircular(triangles: &[[usize; 3]], centers: &[(f64, f64)], neighbors: &mut [BTreeSet<usize>]) {
    for i in 0..triangles.len() {
        for j in (i + 1)..triangles.len() {
            if same_center(centers[i], centers[j]) {
                for &u in &triangles[i] {
                    for &v in &triangles[j] {
                        if u != v {
                            neighbors[u].insert(v);
                            neighbors[v].insert(u);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid_points(rows: usize, cols: usize) -> Vec<(f64, f64)> {
        (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (c as f64, r as f64)))
            .collect()
    }

    #[test]
    fn test_lattice_rook_and_queen() {
        let rook = SpatialWeights::lattice(3, 3, Contiguity::Rook).unwrap();
        assert_eq!(rook.cardinalities(), vec![2, 3, 2, 3, 4, 3, 2, 3, 2]);
        let queen = SpatialWeights::lattice(3, 3, Contiguity::Queen).unwrap();
        assert_eq!(queen.cardinalities(), vec![3, 5, 3, 5, 8, 5, 3, 5, 3]);
        assert_eq!(queen.neighbors(0), &[1, 3, 4]);
    }

    #[test]
    fn test_points_on_grid_match_lattice() {
        let points = grid_points(3, 3);
        let queen = SpatialWeights::from_points(&points, Contiguity::Queen).unwrap();
        let lattice = SpatialWeights::lattice(3, 3, Contiguity::Queen).unwrap();
        assert_eq!(queen, lattice);
    }

    #[test]
    fn test_points_on_grid_rook_drops_diagonals() {
        let points = grid_points(3, 4);
        let rook = SpatialWeights::from_points(&points, Contiguity::Rook).unwrap();
        let lattice = SpatialWeights::lattice(3, 4, Contiguity::Rook).unwrap();
        assert_eq!(rook, lattice);
    }

    #[test]
    fn test_points_near_hull_edge_keep_hull_edge() {
        // Point 2 sits just inside hull edge 0-1, which every triangulation keeps
        let points = vec![(0.0, 0.0), (1.0, 0.0), (0.5, 0.001), (0.5, 1.0)];
        let rook = SpatialWeights::from_points(&points, Contiguity::Rook).unwrap();
        assert_eq!(rook.neighbors(0), &[1, 2, 3]);
        assert_eq!(rook.neighbors(1), &[0, 2, 3]);
        assert_eq!(rook.neighbors(2), &[0, 1, 3]);
    }

    #[test]
    fn test_delaunay_covers_hull_of_far_apart_points() {
        let points = vec![
            (0.0, 0.0),
            (100.0, 0.0),
            (50.0, 1e-4),
            (30.0, 0.2),
            (70.0, 0.5),
            (50.0, 1.0),
            (99.0, 0.9),
        ];
        let normalized = normalize(&points);
        let triangles = delaunay(&points);
        // n points, all but 0, 1, 5, 6 strictly inside: 2n - 2 - hull triangles
        assert_eq!(triangles.len(), 2 * points.len() - 2 - 4);
        for t in &triangles {
            assert!(orient(normalized[t[0]], normalized[t[1]], normalized[t[2]]) > 0.0);
            for (m, &p) in normalized.iter().enumerate() {
                if !t.contains(&m) {
                    assert!(!in_circle(normalized[t[0]], normalized[t[1]], normalized[t[2]], p));
                }
            }
        }
    }

    #[test]
    fn test_points_irregular_are_symmetric() {
        let points = vec![(0.0, 0.0), (2.1, 0.3), (1.2, 1.9), (3.3, 2.2), (0.4, 3.1), (2.5, 4.0)];
        let w = SpatialWeights::from_points(&points, Contiguity::Queen).unwrap();
        for i in 0..w.n() {
            assert!(!w.neighbors(i).is_empty());
            for &j in w.neighbors(i) {
                assert!(w.neighbors(j).contains(&i), "{i} -> {j} is not symmetric");
            }
        }
        // Points far apart on opposite corners never touch
        assert!(!w.neighbors(0).contains(&5));
    }

    #[test]
    fn test_duplicate_points_rejected() {
        let points = vec![(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)];
        assert!(matches!(
            SpatialWeights::from_points(&points, Contiguity::Queen),
            Err(Error::Weights(_))
        ));
    }

    #[test]
    fn test_collinear_points_chain() {
        let points = vec![(2.0, 0.0), (0.0, 0.0), (1.0, 0.0)];
        let w = SpatialWeights::from_points(&points, Contiguity::Queen).unwrap();
        assert_eq!(w.neighbors(0), &[2]);
        assert_eq!(w.neighbors(1), &[2]);
        assert_eq!(w.neighbors(2), &[0, 1]);
    }

    #[test]
    fn test_row_standardize_and_lag() {
        let mut w = SpatialWeights::lattice(2, 2, Contiguity::Rook).unwrap();
        w.row_standardize();
        assert_eq!(w.transform(), Transform::RowStandardized);
        for i in 0..w.n() {
            assert_abs_diff_eq!(w.weights(i).iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
        let lag = w.spatial_lag(&[1.0, 3.0, 2.0, 6.0]);
        assert_eq!(lag, vec![2.5, 3.5, 3.5, 2.5]);
    }

    #[test]
    fn test_moments_of_row_standardized_rook_square() {
        let mut w = SpatialWeights::lattice(2, 2, Contiguity::Rook).unwrap();
        w.row_standardize();
        assert_abs_diff_eq!(w.s0(), 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w.s1(), 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w.s2(), 16.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_neighbors() {
        assert!(SpatialWeights::from_neighbors(vec![vec![0]]).is_err());
        assert!(SpatialWeights::from_neighbors(vec![vec![1], vec![5]]).is_err());
    }
}
