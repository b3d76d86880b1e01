//! Collision probability for screened conjunctions.
//!
//! The primary path is Monte Carlo: perturb both nominal positions with
//! independent per-axis Gaussian noise and count samples closer than the
//! combined hard-body radius. The generator is a deterministically
//! seeded PCG so a given configuration reproduces bit-identical
//! statistics. Two analytic alternates (Foster's 3D approximation and a
//! rough Chan-style 2D proxy) are provided for quick estimates.

use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::screen::Conjunction;
use crate::store::StateStore;

/// Default Monte-Carlo sample count.
pub const DEFAULT_SAMPLE_COUNT: u32 = 10_000;

/// Default RNG seed.
pub const DEFAULT_SEED: u64 = 42;

/// Default combined hard-body radius (km) — 10 m.
pub const DEFAULT_COLLISION_RADIUS_KM: f64 = 0.01;

/// Diagonal position covariance, expressed as 1-sigma standard
/// deviations (km) per axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionCovariance {
    /// Radial 1-sigma (km).
    pub sigma_x: f64,
    /// Along-track 1-sigma (km).
    pub sigma_y: f64,
    /// Cross-track 1-sigma (km).
    pub sigma_z: f64,
}

impl Default for PositionCovariance {
    fn default() -> Self {
        PositionCovariance {
            sigma_x: 0.1,
            sigma_y: 0.5,
            sigma_z: 0.3,
        }
    }
}

/// A screened conjunction refined with nominal geometry and a collision
/// probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConjunctionProbability {
    pub catalog_1: u32,
    pub catalog_2: u32,
    pub name_1: String,
    pub name_2: String,
    /// Nominal miss distance (km).
    pub miss_distance_km: f64,
    /// Nominal relative speed (km/s).
    pub relative_speed_km_s: f64,
    /// Time of closest approach (minutes from epoch).
    pub tca_minutes: f64,
    /// Combined hard-body radius used for the hit test (km).
    pub combined_radius_km: f64,
    /// Collision probability in [0, 1].
    pub collision_probability: f64,
    pub samples_taken: u32,
    pub hits: u32,
    pub min_miss_km: f64,
    pub mean_miss_km: f64,
    pub max_miss_km: f64,
    pub std_miss_km: f64,
}

/// Monte-Carlo collision probability calculator.
///
/// Holds the generator, so successive conjunctions assessed by one
/// calculator draw from one reproducible stream.
#[derive(Debug)]
pub struct ProbabilityCalculator {
    rng: Pcg64,
    sample_count: u32,
    collision_radius_km: f64,
}

impl Default for ProbabilityCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl ProbabilityCalculator {
    pub fn new(seed: u64) -> Self {
        ProbabilityCalculator {
            rng: Pcg64::seed_from_u64(seed),
            sample_count: DEFAULT_SAMPLE_COUNT,
            collision_radius_km: DEFAULT_COLLISION_RADIUS_KM,
        }
    }

    /// Set the Monte-Carlo sample count.
    pub fn set_sample_count(&mut self, count: u32) {
        self.sample_count = count.max(1);
    }

    /// Set the combined hard-body radius (km).
    pub fn set_collision_radius(&mut self, radius_km: f64) {
        self.collision_radius_km = radius_km;
    }

    fn sample_axis(&mut self, nominal: f64, sigma: f64) -> f64 {
        let eta: f64 = StandardNormal.sample(&mut self.rng);
        nominal + eta * sigma
    }

    fn sample_position(&mut self, nominal: [f64; 3], cov: &PositionCovariance) -> [f64; 3] {
        [
            self.sample_axis(nominal[0], cov.sigma_x),
            self.sample_axis(nominal[1], cov.sigma_y),
            self.sample_axis(nominal[2], cov.sigma_z),
        ]
    }

    /// Monte-Carlo probability for a single conjunction.
    #[allow(clippy::too_many_arguments)]
    pub fn calculate(
        &mut self,
        pos1: [f64; 3],
        vel1: [f64; 3],
        cov1: &PositionCovariance,
        pos2: [f64; 3],
        vel2: [f64; 3],
        cov2: &PositionCovariance,
        catalog_1: u32,
        catalog_2: u32,
        name_1: &str,
        name_2: &str,
        tca_minutes: f64,
    ) -> ConjunctionProbability {
        let miss_distance_km = distance(pos1, pos2);
        let relative_speed_km_s = distance(vel1, vel2);

        let mut hits = 0u32;
        let mut min_miss = f64::MAX;
        let mut max_miss = 0.0f64;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;

        for _ in 0..self.sample_count {
            let p1 = self.sample_position(pos1, cov1);
            let p2 = self.sample_position(pos2, cov2);
            let d = distance(p1, p2);

            if d < self.collision_radius_km {
                hits += 1;
            }
            min_miss = min_miss.min(d);
            max_miss = max_miss.max(d);
            sum += d;
            sum_sq += d * d;
        }

        let samples = self.sample_count as f64;
        let mean = sum / samples;
        let variance = (sum_sq / samples - mean * mean).max(0.0);

        ConjunctionProbability {
            catalog_1,
            catalog_2,
            name_1: name_1.to_string(),
            name_2: name_2.to_string(),
            miss_distance_km,
            relative_speed_km_s,
            tca_minutes,
            combined_radius_km: self.collision_radius_km,
            collision_probability: hits as f64 / samples,
            samples_taken: self.sample_count,
            hits,
            min_miss_km: min_miss,
            mean_miss_km: mean,
            max_miss_km: max_miss,
            std_miss_km: variance.sqrt(),
        }
    }

    /// Assess every screened conjunction against the store, deriving
    /// each object's covariance from its element age at TCA.
    pub fn assess_all(
        &mut self,
        store: &StateStore,
        conjunctions: &[Conjunction],
    ) -> Vec<ConjunctionProbability> {
        let mut out = Vec::with_capacity(conjunctions.len());

        for conj in conjunctions {
            if conj.i >= store.len() || conj.j >= store.len() {
                log::warn!(
                    "skipping conjunction with out-of-range index ({}, {})",
                    conj.i,
                    conj.j
                );
                continue;
            }

            let hours = conj.time_minutes / 60.0;
            let name_1 = store.name(conj.i).to_string();
            let name_2 = store.name(conj.j).to_string();
            let cov1 = covariance_from_age(hours, is_debris_name(&name_1));
            let cov2 = covariance_from_age(hours, is_debris_name(&name_2));

            let result = self.calculate(
                store.position(conj.i),
                store.velocity(conj.i),
                &cov1,
                store.position(conj.j),
                store.velocity(conj.j),
                &cov2,
                store.catalog_number(conj.i),
                store.catalog_number(conj.j),
                &name_1,
                &name_2,
                conj.time_minutes,
            );
            out.push(result);
        }

        out
    }
}

/// Foster's 3D Gaussian approximation.
///
/// Combines the six per-axis variances root-sum-square over axes
/// (divided by √3) into a single spherical sigma, then evaluates the
/// Gaussian density over the hard-body cross-section.
pub fn foster_probability(
    pos1: [f64; 3],
    pos2: [f64; 3],
    cov1: &PositionCovariance,
    cov2: &PositionCovariance,
    collision_radius_km: f64,
) -> f64 {
    let r = distance(pos1, pos2);

    let sigma_combined = (cov1.sigma_x * cov1.sigma_x
        + cov2.sigma_x * cov2.sigma_x
        + cov1.sigma_y * cov1.sigma_y
        + cov2.sigma_y * cov2.sigma_y
        + cov1.sigma_z * cov1.sigma_z
        + cov2.sigma_z * cov2.sigma_z)
        .sqrt()
        / 3.0_f64.sqrt();

    let cross_section = std::f64::consts::PI * collision_radius_km * collision_radius_km;
    let normalization = 2.0 * std::f64::consts::PI * sigma_combined * sigma_combined;
    let exponent = -(r * r) / (2.0 * sigma_combined * sigma_combined);

    (cross_section / normalization) * exponent.exp()
}

/// Chan-style 2D encounter-plane estimate.
///
/// A rough analytic proxy, not the published Chan series: with u = r/σ
/// and v = Rc/σ it returns clamp(v²·exp(−u²/2), 0, 1), and the exact
/// 1 − exp(−Rc²/2σ²) limit when the nominal miss is effectively zero.
pub fn chan_probability(miss_distance_km: f64, sigma_total_km: f64, collision_radius_km: f64) -> f64 {
    if miss_distance_km < 1e-10 {
        return 1.0
            - (-collision_radius_km * collision_radius_km
                / (2.0 * sigma_total_km * sigma_total_km))
                .exp();
    }

    let u = miss_distance_km / sigma_total_km;
    let v = collision_radius_km / sigma_total_km;
    (v * v * (-u * u / 2.0).exp()).clamp(0.0, 1.0)
}

/// Map element age (hours since epoch) to a plausible diagonal
/// covariance. Growth is piecewise linear inside 24 h, linear to a week,
/// quadratic beyond, with per-axis caps.
pub fn covariance_from_age(hours_since_epoch: f64, is_debris: bool) -> PositionCovariance {
    // Base uncertainty for a well-tracked object
    let mut sigma_x = 0.05;
    let mut sigma_y = 0.5;
    let mut sigma_z = 0.1;

    if is_debris {
        sigma_x *= 3.0;
        sigma_y *= 3.0;
        sigma_z *= 3.0;
    }

    let hours = hours_since_epoch.max(0.0);
    if hours <= 24.0 {
        let scale = 1.0 + 0.05 * hours;
        sigma_x *= scale;
        sigma_y *= scale;
        sigma_z *= scale;
    } else if hours <= 168.0 {
        let days = hours / 24.0;
        let scale = 1.5 + 0.5 * days;
        sigma_x *= scale;
        sigma_y *= scale;
        sigma_z *= scale;
    } else {
        let days = hours / 24.0;
        let scale = 3.0 + 0.2 * days * days / 7.0;
        sigma_x *= scale.min(50.0);
        sigma_y *= scale.min(100.0);
        sigma_z *= scale.min(50.0);
    }

    PositionCovariance {
        sigma_x,
        sigma_y,
        sigma_z,
    }
}

/// Name-based debris flag for covariance selection. A heuristic over
/// catalog naming conventions, not a classifier: fragment entries carry
/// a " DEB" suffix and spent stages "R/B".
pub fn is_debris_name(name: &str) -> bool {
    name.contains(" DEB") || name.contains("R/B")
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_monte_carlo_sanity() {
        // Two objects 100 m apart with sigmas far larger than the 10 m
        // hard-body radius: the hit probability must be well under 1%
        let cov = PositionCovariance {
            sigma_x: 0.1,
            sigma_y: 0.5,
            sigma_z: 0.3,
        };
        let mut calc = ProbabilityCalculator::new(42);

        let result = calc.calculate(
            [7000.0, 0.0, 0.0],
            [0.0, 7.5, 0.0],
            &cov,
            [7000.1, 0.0, 0.0],
            [0.0, -7.5, 0.0],
            &cov,
            1,
            2,
            "A",
            "B",
            0.0,
        );

        assert!(result.collision_probability < 0.01);
        assert_relative_eq!(result.miss_distance_km, 0.1, epsilon = 1e-12);
        assert_relative_eq!(result.relative_speed_km_s, 15.0, epsilon = 1e-12);
        assert_eq!(result.samples_taken, DEFAULT_SAMPLE_COUNT);
        assert!(result.min_miss_km <= result.mean_miss_km);
        assert!(result.mean_miss_km <= result.max_miss_km);
        assert!(result.std_miss_km > 0.0);
    }

    #[test]
    fn test_monte_carlo_reproducible() {
        let cov = PositionCovariance::default();
        let run = || {
            let mut calc = ProbabilityCalculator::new(42);
            calc.set_sample_count(2000);
            calc.set_collision_radius(0.3);
            calc.calculate(
                [7000.0, 0.0, 0.0],
                [0.0, 7.5, 0.0],
                &cov,
                [7000.2, 0.1, 0.0],
                [0.0, -7.5, 0.0],
                &cov,
                1,
                2,
                "A",
                "B",
                12.0,
            )
        };

        let a = run();
        let b = run();
        assert_eq!(a.hits, b.hits);
        assert_eq!(a.collision_probability, b.collision_probability);
        assert_eq!(a.mean_miss_km, b.mean_miss_km);
    }

    #[test]
    fn test_probability_monotone_in_radius() {
        // Identical seed → identical sampled distances, so a larger
        // radius can only add hits
        let cov = PositionCovariance::default();
        let mut last = -1.0;

        for &radius in &[0.01, 0.05, 0.1, 0.3, 0.6, 1.0] {
            let mut calc = ProbabilityCalculator::new(42);
            calc.set_sample_count(4000);
            calc.set_collision_radius(radius);
            let result = calc.calculate(
                [7000.0, 0.0, 0.0],
                [0.0, 7.5, 0.0],
                &cov,
                [7000.1, 0.05, 0.02],
                [0.0, -7.5, 0.0],
                &cov,
                1,
                2,
                "A",
                "B",
                0.0,
            );
            assert!(
                result.collision_probability >= last,
                "Pc decreased at radius {radius}"
            );
            last = result.collision_probability;
        }
        assert!(last > 0.0, "largest radius should register hits");
    }

    #[test]
    fn test_coincident_objects_high_probability() {
        let cov = PositionCovariance {
            sigma_x: 0.01,
            sigma_y: 0.01,
            sigma_z: 0.01,
        };
        let mut calc = ProbabilityCalculator::new(7);
        calc.set_collision_radius(0.5);

        let result = calc.calculate(
            [7000.0, 0.0, 0.0],
            [0.0, 7.5, 0.0],
            &cov,
            [7000.0, 0.0, 0.0],
            [0.0, 7.5, 0.0],
            &cov,
            1,
            2,
            "A",
            "B",
            0.0,
        );
        // Sigmas are tiny compared to the radius: essentially every
        // sample is a hit
        assert!(result.collision_probability > 0.99);
    }

    #[test]
    fn test_foster_sanity() {
        let cov = PositionCovariance {
            sigma_x: 0.1,
            sigma_y: 0.5,
            sigma_z: 0.3,
        };
        let p = foster_probability(
            [7000.0, 0.0, 0.0],
            [7000.1, 0.0, 0.0],
            &cov,
            &cov,
            0.01,
        );
        assert!(p > 0.0 && p < 1e-3, "Foster Pc = {p}");

        // Probability falls off with the nominal miss
        let p_far = foster_probability(
            [7000.0, 0.0, 0.0],
            [7002.0, 0.0, 0.0],
            &cov,
            &cov,
            0.01,
        );
        assert!(p_far < p);
    }

    #[test]
    fn test_chan_limits() {
        // Near-zero miss uses the closed-form limit
        let p0 = chan_probability(0.0, 0.5, 0.1);
        assert_relative_eq!(p0, 1.0 - (-0.01f64 / 0.5).exp(), epsilon = 1e-12);

        // Monotone in collision radius, clamped to [0, 1]
        let p_small = chan_probability(0.3, 0.5, 0.05);
        let p_large = chan_probability(0.3, 0.5, 0.2);
        assert!(p_small < p_large);
        assert!(chan_probability(0.0, 0.01, 10.0) <= 1.0);
        assert!(chan_probability(100.0, 0.5, 0.01) >= 0.0);
    }

    #[test]
    fn test_covariance_growth_and_caps() {
        let fresh = covariance_from_age(0.0, false);
        assert_relative_eq!(fresh.sigma_x, 0.05, epsilon = 1e-12);
        assert_relative_eq!(fresh.sigma_y, 0.5, epsilon = 1e-12);
        assert_relative_eq!(fresh.sigma_z, 0.1, epsilon = 1e-12);

        let day = covariance_from_age(24.0, false);
        assert!(day.sigma_y > fresh.sigma_y);

        let week = covariance_from_age(168.0, false);
        assert!(week.sigma_y > day.sigma_y);

        // Quadratic region saturates at the per-axis caps
        let ancient = covariance_from_age(24.0 * 365.0, false);
        assert_relative_eq!(ancient.sigma_x, 0.05 * 50.0, epsilon = 1e-9);
        assert_relative_eq!(ancient.sigma_y, 0.5 * 100.0, epsilon = 1e-9);
        assert_relative_eq!(ancient.sigma_z, 0.1 * 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_debris_covariance_scaled() {
        let tracked = covariance_from_age(12.0, false);
        let debris = covariance_from_age(12.0, true);
        assert_relative_eq!(debris.sigma_x, tracked.sigma_x * 3.0, epsilon = 1e-12);
        assert_relative_eq!(debris.sigma_y, tracked.sigma_y * 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_is_debris_name() {
        assert!(is_debris_name("FENGYUN 1C DEB"));
        assert!(is_debris_name("SL-16 R/B"));
        assert!(!is_debris_name("ISS (ZARYA)"));
        assert!(!is_debris_name("DEBRA"));
    }
}
