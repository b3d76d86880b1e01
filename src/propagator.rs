//! Batch mean-element propagation with secular J2.
//!
//! Advances every object in a [`StateStore`] to the same time offset
//! (minutes from each object's epoch). The model is the mean-element
//! two-body solution plus secular J2 rates on RAAN and argument of
//! perigee; mean motion itself carries no J2 correction. Output frame is
//! the TEME-like inertial frame of the input elements.
//!
//! Objects are independent, so the batch is data-parallel: the index
//! range is cut into uniform chunks and spread across the rayon pool.
//! Per-object numeric failures (near-parabolic elements, a Kepler
//! residual that will not die) zero that object's state and are reported
//! in the batch result; they never abort the pass.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::elements::{normalize_angle, ElementRecord};
use crate::store::StateStore;

/// Cartesian state of a single object in the inertial frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateVector {
    /// Position (km): [x, y, z]
    pub r: [f64; 3],
    /// Velocity (km/s): [vx, vy, vz]
    pub v: [f64; 3],
}

impl StateVector {
    /// Position magnitude (km).
    pub fn r_mag(&self) -> f64 {
        (self.r[0].powi(2) + self.r[1].powi(2) + self.r[2].powi(2)).sqrt()
    }

    /// Velocity magnitude (km/s).
    pub fn v_mag(&self) -> f64 {
        (self.v[0].powi(2) + self.v[1].powi(2) + self.v[2].powi(2)).sqrt()
    }

    /// Altitude above the equatorial radius (km).
    pub fn altitude(&self) -> f64 {
        self.r_mag() - R_EARTH
    }

    /// Semi-major axis from vis-viva (km).
    pub fn semi_major_axis(&self) -> f64 {
        let r = self.r_mag();
        let v = self.v_mag();
        let energy = v * v / 2.0 - MU_EARTH / r;
        -MU_EARTH / (2.0 * energy)
    }
}

/// Why a single object failed to propagate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Eccentricity at or beyond the parabolic boundary.
    NearParabolic { eccentricity: f64 },
    /// Kepler iteration residual still above tolerance after the
    /// iteration budget.
    KeplerNonConvergence { residual: f64 },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NearParabolic { eccentricity } => {
                write!(f, "eccentricity {eccentricity} is not elliptical")
            }
            FailureReason::KeplerNonConvergence { residual } => {
                write!(f, "Kepler iteration stalled at residual {residual:e}")
            }
        }
    }
}

/// One failed object within a batch pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObjectFailure {
    pub index: usize,
    pub reason: FailureReason,
}

/// Outcome of one batch propagation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationReport {
    /// Time offset the pass was run at (minutes from epoch).
    pub time_minutes: f64,
    /// Objects attempted (the store length).
    pub attempted: usize,
    /// Objects whose state was updated.
    pub succeeded: usize,
    /// Per-object failures, sorted by index. Failed objects have their
    /// state zeroed, never NaN.
    pub failures: Vec<ObjectFailure>,
}

impl PropagationReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

const KEPLER_MAX_ITER: usize = 10;
const KEPLER_TOL: f64 = 1e-12;
// Residual above this after the iteration budget marks the object failed.
const KEPLER_FAIL_TOL: f64 = 1e-6;
const PARABOLIC_EPS: f64 = 1e-12;
// Uniform chunk size for the parallel pass.
const PROPAGATE_CHUNK: usize = 512;

/// Solve Kepler's equation M = E - e sin E by Newton iteration from
/// E₀ = M. The step is clamped to ±1 rad, which keeps the iteration
/// stable through the small-denominator region near e → 1, M → 0.
fn solve_kepler(m: f64, e: f64) -> (f64, f64) {
    let mut ea = m;
    let mut residual = ea - e * ea.sin() - m;

    for _ in 0..KEPLER_MAX_ITER {
        if residual.abs() < KEPLER_TOL {
            break;
        }
        let delta = (residual / (1.0 - e * ea.cos())).clamp(-1.0, 1.0);
        ea -= delta;
        residual = ea - e * ea.sin() - m;
    }

    (ea, residual.abs())
}

/// Propagate one set of mean elements to `t` minutes past epoch.
///
/// Angles in radians, mean motion in rad/min, semi-major axis in km.
#[allow(clippy::too_many_arguments)]
fn propagate_kernel(
    inc: f64,
    raan0: f64,
    ecc: f64,
    argp0: f64,
    m0: f64,
    n0: f64,
    a0: f64,
    t: f64,
) -> Result<([f64; 3], [f64; 3]), FailureReason> {
    if ecc >= 1.0 - PARABOLIC_EPS {
        return Err(FailureReason::NearParabolic { eccentricity: ecc });
    }

    let p = a0 * (1.0 - ecc * ecc);
    let cos_i = inc.cos();
    let sin_i = inc.sin();

    // Secular J2 rates (rad/min, since n0 is rad/min)
    let factor = 1.5 * J2 * (R_EARTH / p) * (R_EARTH / p);
    let raan_dot = -factor * n0 * cos_i;
    let argp_dot = factor * n0 * (2.0 - 2.5 * sin_i * sin_i);

    let raan = raan0 + raan_dot * t;
    let argp = argp0 + argp_dot * t;
    let m = normalize_angle(m0 + n0 * t);

    let (ea, residual) = solve_kepler(m, ecc);
    if residual > KEPLER_FAIL_TOL {
        return Err(FailureReason::KeplerNonConvergence { residual });
    }

    let cos_e = ea.cos();
    let sin_e = ea.sin();
    let denom = 1.0 - ecc * cos_e;

    let sin_nu = (1.0 - ecc * ecc).sqrt() * sin_e / denom;
    let cos_nu = (cos_e - ecc) / denom;
    let nu = sin_nu.atan2(cos_nu);

    let u = argp + nu;
    let r = a0 * denom;

    // Position in the orbit plane, then R_z(-Ω)·R_x(-i) into inertial
    let xp = r * u.cos();
    let yp = r * u.sin();
    let cos_raan = raan.cos();
    let sin_raan = raan.sin();

    let position = [
        xp * cos_raan - yp * cos_i * sin_raan,
        xp * sin_raan + yp * cos_i * cos_raan,
        yp * sin_i,
    ];

    // Velocity: radial and transverse components in km/s
    let h = (MU_EARTH * p).sqrt();
    let r_dot = (MU_EARTH / p).sqrt() * ecc * nu.sin();
    let rf_dot = h / r;

    let vxp = r_dot * u.cos() - rf_dot * u.sin();
    let vyp = r_dot * u.sin() + rf_dot * u.cos();

    let velocity = [
        vxp * cos_raan - vyp * cos_i * sin_raan,
        vxp * sin_raan + vyp * cos_i * cos_raan,
        vyp * sin_i,
    ];

    Ok((position, velocity))
}

/// Propagate a single element record to `t` minutes past its epoch.
pub fn propagate_record(record: &ElementRecord, time_minutes: f64) -> Result<StateVector, FailureReason> {
    propagate_kernel(
        record.inclination,
        record.raan,
        record.eccentricity,
        record.arg_perigee,
        record.mean_anomaly,
        record.mean_motion,
        record.semi_major_axis,
        time_minutes,
    )
    .map(|(r, v)| StateVector { r, v })
}

/// Advance every object in the store to `time_minutes` past its epoch.
///
/// Deterministic: two calls with the same store contents and the same
/// `time_minutes` produce bit-identical columns. Failed objects are
/// zeroed and listed in the report; the pass always completes.
pub fn propagate_all(store: &mut StateStore, time_minutes: f64) -> PropagationReport {
    let attempted = store.len();

    let inc = &store.inc[..];
    let raan0 = &store.raan0[..];
    let ecc = &store.ecc[..];
    let argp0 = &store.argp0[..];
    let m0 = &store.m0[..];
    let n0 = &store.n0[..];
    let a0 = &store.a0[..];

    let mut failures: Vec<ObjectFailure> = store
        .x
        .par_chunks_mut(PROPAGATE_CHUNK)
        .zip(store.y.par_chunks_mut(PROPAGATE_CHUNK))
        .zip(store.z.par_chunks_mut(PROPAGATE_CHUNK))
        .zip(store.vx.par_chunks_mut(PROPAGATE_CHUNK))
        .zip(store.vy.par_chunks_mut(PROPAGATE_CHUNK))
        .zip(store.vz.par_chunks_mut(PROPAGATE_CHUNK))
        .enumerate()
        .map(|(ci, (((((cx, cy), cz), cvx), cvy), cvz))| {
            let base = ci * PROPAGATE_CHUNK;
            let mut local = Vec::new();

            for k in 0..cx.len() {
                let i = base + k;
                match propagate_kernel(
                    inc[i], raan0[i], ecc[i], argp0[i], m0[i], n0[i], a0[i], time_minutes,
                ) {
                    Ok((r, v)) => {
                        cx[k] = r[0];
                        cy[k] = r[1];
                        cz[k] = r[2];
                        cvx[k] = v[0];
                        cvy[k] = v[1];
                        cvz[k] = v[2];
                    }
                    Err(reason) => {
                        cx[k] = 0.0;
                        cy[k] = 0.0;
                        cz[k] = 0.0;
                        cvx[k] = 0.0;
                        cvy[k] = 0.0;
                        cvz[k] = 0.0;
                        local.push(ObjectFailure { index: i, reason });
                    }
                }
            }

            local
        })
        .reduce(Vec::new, |mut a, mut b| {
            a.append(&mut b);
            a
        });

    // Merge order across chunks is nondeterministic; the report is not.
    failures.sort_by_key(|f| f.index);

    if !failures.is_empty() {
        log::warn!(
            "propagation at t={time_minutes} min: {} of {attempted} objects failed",
            failures.len()
        );
    }

    PropagationReport {
        time_minutes,
        attempted,
        succeeded: attempted - failures.len(),
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::ElementRecord;
    use crate::store::StateStore;
    use approx::assert_relative_eq;

    fn record_from_degrees(
        catalog: u32,
        inc_deg: f64,
        raan_deg: f64,
        e: f64,
        argp_deg: f64,
        ma_deg: f64,
        n_rev_day: f64,
    ) -> ElementRecord {
        ElementRecord::new(
            catalog,
            format!("SAT-{catalog}"),
            "24001A",
            JD_J2000,
            inc_deg * DEG2RAD,
            raan_deg * DEG2RAD,
            e,
            argp_deg * DEG2RAD,
            ma_deg * DEG2RAD,
            n_rev_day * TAU / MIN_PER_DAY,
            0.0,
        )
    }

    #[test]
    fn test_kepler_circular() {
        let (ea, res) = solve_kepler(0.5, 0.0);
        assert_relative_eq!(ea, 0.5, epsilon = 1e-12);
        assert!(res < 1e-12);
    }

    #[test]
    fn test_kepler_high_eccentricity_stable() {
        // The clamped Newton step must stay convergent up to e = 0.99
        // (and in practice to the 0.999 store cap)
        for &e in &[0.5, 0.9, 0.95, 0.99, 0.999] {
            for k in 0..64 {
                let m = k as f64 * TAU / 64.0;
                let (ea, res) = solve_kepler(m, e);
                assert!(res < 1e-10, "e={e} M={m}: residual {res:e}");
                assert!(ea.is_finite());
            }
        }
    }

    #[test]
    fn test_vanguard_reference_position() {
        // Vanguard-1 mean elements at epoch; reference state from the
        // same mean-element model
        let rec = record_from_degrees(
            5, 34.2682, 348.7242, 0.1859667, 331.7664, 19.3264, 10.82419157,
        );
        let state = propagate_record(&rec, 0.0).unwrap();

        let reference = [7022.465, -1400.083, 0.040];
        let err = (0..3)
            .map(|k| (state.r[k] - reference[k]).powi(2))
            .sum::<f64>()
            .sqrt();
        assert!(err < 100.0, "position error {err} km from reference");
    }

    #[test]
    fn test_circular_leo_closure_after_one_period() {
        // One orbital period later a circular LEO returns close to its
        // starting position; the tolerance absorbs the secular J2 drift
        let rec = record_from_degrees(10, 51.6, 0.0, 0.0001, 0.0, 0.0, 15.0);
        let period_min = MIN_PER_DAY / 15.0;

        let s0 = propagate_record(&rec, 0.0).unwrap();
        let s1 = propagate_record(&rec, period_min).unwrap();

        let dist = (0..3)
            .map(|k| (s0.r[k] - s1.r[k]).powi(2))
            .sum::<f64>()
            .sqrt();
        assert!(dist < 500.0, "closure distance {dist} km");
    }

    #[test]
    fn test_batch_matches_single() {
        let records: Vec<_> = (0..20)
            .map(|i| {
                record_from_degrees(
                    100 + i as u32,
                    51.6,
                    7.2 * i as f64,
                    0.001,
                    0.0,
                    7.2 * i as f64,
                    15.5,
                )
            })
            .collect();

        let mut store = StateStore::from_elements(&records).unwrap();
        let report = propagate_all(&mut store, 42.0);
        assert!(report.all_succeeded());
        assert_eq!(report.succeeded, 20);

        for (i, rec) in records.iter().enumerate() {
            let single = propagate_record(rec, 42.0).unwrap();
            // Same code path, same inputs: exact equality expected
            assert_eq!(store.position(i), single.r);
            assert_eq!(store.velocity(i), single.v);
        }
    }

    #[test]
    fn test_batch_deterministic() {
        let records: Vec<_> = (0..600)
            .map(|i| {
                record_from_degrees(
                    1000 + i as u32,
                    51.6 + 0.01 * i as f64,
                    0.6 * i as f64,
                    0.001 + 0.0001 * (i % 7) as f64,
                    0.0,
                    0.6 * i as f64,
                    14.8,
                )
            })
            .collect();

        let mut store_a = StateStore::from_elements(&records).unwrap();
        let mut store_b = StateStore::from_elements(&records).unwrap();
        propagate_all(&mut store_a, 123.456);
        propagate_all(&mut store_b, 123.456);

        for i in 0..records.len() {
            assert_eq!(store_a.position(i), store_b.position(i));
            assert_eq!(store_a.velocity(i), store_b.velocity(i));
        }
    }

    #[test]
    fn test_all_states_finite() {
        let records: Vec<_> = (0..50)
            .map(|i| {
                record_from_degrees(
                    2000 + i as u32,
                    97.8,
                    3.0 * i as f64,
                    0.02 * (i % 10) as f64,
                    45.0,
                    20.0 * i as f64,
                    14.2,
                )
            })
            .collect();

        let mut store = StateStore::from_elements(&records).unwrap();
        for &t in &[0.0, 1.0, 96.0, 1440.0, 10080.0] {
            let report = propagate_all(&mut store, t);
            assert!(report.all_succeeded());
            let view = store.view();
            for i in 0..view.len {
                for c in view.position(i).into_iter().chain(view.velocity(i)) {
                    assert!(c.is_finite(), "non-finite state at t={t}, i={i}");
                }
            }
        }
    }

    #[test]
    fn test_near_parabolic_zeroed_and_reported() {
        let mut bad = record_from_degrees(3000, 10.0, 0.0, 0.0, 0.0, 0.0, 2.0);
        bad.eccentricity = 1.0 - 1e-13; // past the parabolic guard
        let good = record_from_degrees(3001, 51.6, 0.0, 0.001, 0.0, 0.0, 15.0);

        let mut store = StateStore::from_elements(&[bad, good]).unwrap();
        let report = propagate_all(&mut store, 10.0);

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 0);
        assert!(matches!(
            report.failures[0].reason,
            FailureReason::NearParabolic { .. }
        ));

        // Failed object is zeroed, not NaN; the batch continued
        assert_eq!(store.position(0), [0.0, 0.0, 0.0]);
        assert!(store.position(1)[0].is_finite());
        assert!(store.position(1) != [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_velocity_magnitude_plausible() {
        // Circular LEO speed is near sqrt(mu/a) ≈ 7.6 km/s
        let rec = record_from_degrees(4000, 51.6, 0.0, 0.0001, 0.0, 0.0, 15.5);
        let state = propagate_record(&rec, 17.0).unwrap();
        let v_circ = (MU_EARTH / rec.semi_major_axis).sqrt();
        assert_relative_eq!(state.v_mag(), v_circ, epsilon = 0.05);
    }

    #[test]
    fn test_raan_regression_moves_node() {
        // Prograde LEO: RAAN regresses westward ≈ 5°/day; after a day the
        // position at the same mean anomaly has rotated
        let rec = record_from_degrees(5000, 51.6, 0.0, 0.0001, 0.0, 0.0, 15.0);
        let s0 = propagate_record(&rec, 0.0).unwrap();
        let s1 = propagate_record(&rec, 15.0 * MIN_PER_DAY / 15.0).unwrap(); // exactly 15 revs
        let dist = (0..3)
            .map(|k| (s0.r[k] - s1.r[k]).powi(2))
            .sum::<f64>()
            .sqrt();
        // J2 drift over a full day is visible but bounded
        assert!(dist > 1.0 && dist < 2000.0, "drift {dist} km");
    }
}
