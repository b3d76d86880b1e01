//! Broad-phase conjunction screening over a spatial hash.
//!
//! Positions are bucketed into cubic cells; candidate pairs come from the
//! same cell or one of the 13 canonical neighbor offsets, so every
//! unordered pair of adjacent cells is visited exactly once. For a
//! threshold no larger than the cell edge this enumerates a superset of
//! all close pairs, which the squared-distance filter then trims.
//!
//! Cell traversal is parallelized in chunks of 16 cells; per-thread
//! result buffers are merged afterwards, so the output *set* is
//! deterministic but its order is not. Sort externally if a canonical
//! order is needed.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::store::StateView;

/// Default cell edge, also the floor for threshold-driven sizing (km).
pub const DEFAULT_CELL_KM: f64 = 50.0;

/// A screened close-approach candidate. `i` and `j` are store indices
/// with `i < j`; ephemeral, produced fresh each screening pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conjunction {
    pub i: usize,
    pub j: usize,
    pub distance_km: f64,
    pub time_minutes: f64,
}

// Each unordered pair of adjacent cells appears exactly once across
// these offsets.
const NEIGHBOR_OFFSETS: [(i64, i64, i64); 13] = [
    (1, 0, 0),
    (0, 1, 0),
    (0, 0, 1),
    (1, 1, 0),
    (1, -1, 0),
    (1, 0, 1),
    (1, 0, -1),
    (0, 1, 1),
    (0, 1, -1),
    (1, 1, 1),
    (1, 1, -1),
    (1, -1, 1),
    (1, -1, -1),
];

const CELL_BITS: u32 = 21;
const CELL_BIAS: i64 = 1 << 20;
const CELL_MASK: u64 = (1 << CELL_BITS) - 1;
const SCREEN_CELL_CHUNK: usize = 16;

/// Spatial hash grid over current Cartesian positions.
///
/// Built per query pass and owned by it; never shared between passes.
#[derive(Debug)]
pub struct SpatialGrid {
    cell_size: f64,
    inv_cell_size: f64,
    grid: HashMap<u64, Vec<usize>>,
}

impl SpatialGrid {
    /// Create a grid with the given cell edge (km). The edge must be at
    /// least the screening threshold for the pair enumeration to be
    /// complete.
    pub fn new(cell_size_km: f64) -> Self {
        assert!(
            cell_size_km > 0.0 && cell_size_km.is_finite(),
            "cell size must be positive, got {cell_size_km}"
        );
        SpatialGrid {
            cell_size: cell_size_km,
            inv_cell_size: 1.0 / cell_size_km,
            grid: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of populated cells.
    pub fn occupied_cells(&self) -> usize {
        self.grid.len()
    }

    /// Clear and rebuild the grid from the view's position columns.
    /// Bucket contents keep insertion (index) order.
    pub fn build(&mut self, view: &StateView<'_>) {
        self.grid.clear();
        self.grid.reserve(view.len / 8 + 1);

        for i in 0..view.len {
            let key = self.cell_key(view.x[i], view.y[i], view.z[i]);
            self.grid.entry(key).or_default().push(i);
        }
    }

    /// Enumerate all pairs within `threshold_km`, tagged with
    /// `time_minutes`. Pairs satisfy `i < j` and appear at most once;
    /// output order is unspecified.
    pub fn find_conjunctions(
        &self,
        view: &StateView<'_>,
        threshold_km: f64,
        time_minutes: f64,
    ) -> Vec<Conjunction> {
        let threshold_sq = threshold_km * threshold_km;

        let cell_keys: Vec<u64> = self.grid.keys().copied().collect();

        cell_keys
            .par_chunks(SCREEN_CELL_CHUNK)
            .map(|keys| {
                let mut local = Vec::new();

                for &cell_key in keys {
                    let indices = &self.grid[&cell_key];
                    let (cx, cy, cz) = unpack_cell(cell_key);

                    // In-cell pairs; buckets are index-ordered, so a < b
                    // already implies i < j
                    for a in 0..indices.len() {
                        let i = indices[a];
                        let pi = view.position(i);
                        for &j in &indices[a + 1..] {
                            let d2 = distance_squared(pi, view.position(j));
                            if d2 < threshold_sq {
                                local.push(Conjunction {
                                    i,
                                    j,
                                    distance_km: d2.sqrt(),
                                    time_minutes,
                                });
                            }
                        }
                    }

                    // Pairs against each canonical neighbor
                    for &(dx, dy, dz) in &NEIGHBOR_OFFSETS {
                        let neighbor_key = pack_cell(cx + dx, cy + dy, cz + dz);
                        let Some(neighbor) = self.grid.get(&neighbor_key) else {
                            continue;
                        };

                        for &i in indices {
                            let pi = view.position(i);
                            for &j in neighbor {
                                let d2 = distance_squared(pi, view.position(j));
                                if d2 < threshold_sq {
                                    let (lo, hi) = if i < j { (i, j) } else { (j, i) };
                                    local.push(Conjunction {
                                        i: lo,
                                        j: hi,
                                        distance_km: d2.sqrt(),
                                        time_minutes,
                                    });
                                }
                            }
                        }
                    }
                }

                local
            })
            .reduce(Vec::new, |mut a, mut b| {
                a.append(&mut b);
                a
            })
    }

    fn cell_key(&self, x: f64, y: f64, z: f64) -> u64 {
        pack_cell(
            (x * self.inv_cell_size).floor() as i64,
            (y * self.inv_cell_size).floor() as i64,
            (z * self.inv_cell_size).floor() as i64,
        )
    }
}

/// Pack signed cell coordinates into a 64-bit key: 21 bits per axis with
/// a 2²⁰ centering bias. Coordinates outside [-2²⁰, 2²⁰) are a
/// programmer error (the grid would alias cells) and assert.
fn pack_cell(cx: i64, cy: i64, cz: i64) -> u64 {
    assert!(
        cx >= -CELL_BIAS && cx < CELL_BIAS
            && cy >= -CELL_BIAS && cy < CELL_BIAS
            && cz >= -CELL_BIAS && cz < CELL_BIAS,
        "cell coordinate ({cx}, {cy}, {cz}) outside the 21-bit key range"
    );
    let ux = (cx + CELL_BIAS) as u64 & CELL_MASK;
    let uy = (cy + CELL_BIAS) as u64 & CELL_MASK;
    let uz = (cz + CELL_BIAS) as u64 & CELL_MASK;
    (ux << (2 * CELL_BITS)) | (uy << CELL_BITS) | uz
}

fn unpack_cell(key: u64) -> (i64, i64, i64) {
    let cx = ((key >> (2 * CELL_BITS)) & CELL_MASK) as i64 - CELL_BIAS;
    let cy = ((key >> CELL_BITS) & CELL_MASK) as i64 - CELL_BIAS;
    let cz = (key & CELL_MASK) as i64 - CELL_BIAS;
    (cx, cy, cz)
}

#[inline]
fn distance_squared(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// One-shot screening: build a grid sized `max(threshold, 50 km)` (or
/// the caller's larger cell size) and enumerate close pairs.
pub fn screen_pairs(
    view: &StateView<'_>,
    threshold_km: f64,
    time_minutes: f64,
    cell_size_km: f64,
) -> Vec<Conjunction> {
    let mut grid = SpatialGrid::new(threshold_km.max(cell_size_km));
    grid.build(view);
    grid.find_conjunctions(view, threshold_km, time_minutes)
}

/// Reference O(N²) screener. Same output set as the grid path; used for
/// verification and tiny populations.
pub fn screen_naive(view: &StateView<'_>, threshold_km: f64, time_minutes: f64) -> Vec<Conjunction> {
    let threshold_sq = threshold_km * threshold_km;
    let mut out = Vec::new();

    for i in 0..view.len {
        let pi = view.position(i);
        for j in (i + 1)..view.len {
            let d2 = distance_squared(pi, view.position(j));
            if d2 < threshold_sq {
                out.push(Conjunction {
                    i,
                    j,
                    distance_km: d2.sqrt(),
                    time_minutes,
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Hand-built view over plain position arrays; the element columns
    /// are irrelevant to screening.
    struct Fixture {
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        zero: Vec<f64>,
    }

    impl Fixture {
        fn new(points: &[[f64; 3]]) -> Self {
            Fixture {
                x: points.iter().map(|p| p[0]).collect(),
                y: points.iter().map(|p| p[1]).collect(),
                z: points.iter().map(|p| p[2]).collect(),
                zero: vec![0.0; points.len()],
            }
        }

        fn view(&self) -> StateView<'_> {
            StateView {
                len: self.x.len(),
                x: &self.x,
                y: &self.y,
                z: &self.z,
                vx: &self.zero,
                vy: &self.zero,
                vz: &self.zero,
                inc: &self.zero,
                raan0: &self.zero,
                ecc: &self.zero,
                argp0: &self.zero,
                m0: &self.zero,
                n0: &self.zero,
                a0: &self.zero,
                bstar: &self.zero,
            }
        }
    }

    fn pair_set(conjunctions: &[Conjunction]) -> HashSet<(usize, usize)> {
        conjunctions.iter().map(|c| (c.i, c.j)).collect()
    }

    /// Deterministic scatter across a few thousand km, deliberately
    /// straddling cell boundaries and the origin.
    fn scatter(n: usize) -> Vec<[f64; 3]> {
        (0..n)
            .map(|k| {
                let k = k as f64;
                [
                    (k * 137.5).sin() * 3000.0,
                    (k * 59.3).cos() * 3000.0,
                    (k * 17.7).sin() * 1500.0,
                ]
            })
            .collect()
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        for &(cx, cy, cz) in &[
            (0, 0, 0),
            (1, -1, 5),
            (-200, 199, -3),
            (-(1 << 20), (1 << 20) - 1, 12345),
        ] {
            assert_eq!(unpack_cell(pack_cell(cx, cy, cz)), (cx, cy, cz));
        }
    }

    #[test]
    #[should_panic(expected = "21-bit key range")]
    fn test_pack_overflow_asserts() {
        pack_cell(1 << 20, 0, 0);
    }

    #[test]
    fn test_grid_matches_naive() {
        let points = scatter(300);
        let fixture = Fixture::new(&points);
        let view = fixture.view();

        let threshold = 120.0;
        let grid_pairs = screen_pairs(&view, threshold, 0.0, threshold);
        let naive_pairs = screen_naive(&view, threshold, 0.0);

        assert_eq!(pair_set(&grid_pairs), pair_set(&naive_pairs));
        assert!(!naive_pairs.is_empty(), "fixture produced no close pairs");
    }

    #[test]
    fn test_grid_matches_naive_threshold_below_cell() {
        let points = scatter(300);
        let fixture = Fixture::new(&points);
        let view = fixture.view();

        // threshold < cell size is the guaranteed-complete regime
        let mut grid = SpatialGrid::new(200.0);
        grid.build(&view);
        let grid_pairs = grid.find_conjunctions(&view, 80.0, 0.0);
        let naive_pairs = screen_naive(&view, 80.0, 0.0);

        assert_eq!(pair_set(&grid_pairs), pair_set(&naive_pairs));
    }

    #[test]
    fn test_pairs_ordered_and_unique() {
        let points = scatter(250);
        let fixture = Fixture::new(&points);
        let view = fixture.view();

        let pairs = screen_pairs(&view, 150.0, 5.0, 50.0);
        let mut seen = HashSet::new();
        for c in &pairs {
            assert!(c.i < c.j, "pair ({}, {}) not ordered", c.i, c.j);
            assert!(seen.insert((c.i, c.j)), "pair ({}, {}) emitted twice", c.i, c.j);
            assert_eq!(c.time_minutes, 5.0);
        }
    }

    #[test]
    fn test_cross_boundary_pair_found() {
        // Two points 1 km apart but in different cells of a 50 km grid
        let fixture = Fixture::new(&[[49.9, 0.0, 0.0], [50.5, 0.0, 0.0]]);
        let view = fixture.view();

        let pairs = screen_pairs(&view, 5.0, 0.0, 50.0);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].i, pairs[0].j), (0, 1));
        assert!((pairs[0].distance_km - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_diagonal_neighbor_pair_found() {
        // Corner-adjacent cells exercise the (1, -1, -1) style offsets
        let fixture = Fixture::new(&[[99.5, 0.5, 0.5], [100.5, -0.5, -0.5]]);
        let view = fixture.view();

        let pairs = screen_pairs(&view, 5.0, 0.0, 50.0);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_empty_and_sparse() {
        let fixture = Fixture::new(&[]);
        assert!(screen_pairs(&fixture.view(), 100.0, 0.0, 50.0).is_empty());

        let fixture = Fixture::new(&[[0.0, 0.0, 0.0], [5000.0, 5000.0, 5000.0]]);
        assert!(screen_pairs(&fixture.view(), 100.0, 0.0, 50.0).is_empty());
    }

    #[test]
    fn test_grid_set_deterministic_across_runs() {
        let points = scatter(400);
        let fixture = Fixture::new(&points);
        let view = fixture.view();

        let a = pair_set(&screen_pairs(&view, 100.0, 0.0, 50.0));
        let b = pair_set(&screen_pairs(&view, 100.0, 0.0, 50.0));
        assert_eq!(a, b);
    }
}
