//! Collision-avoidance maneuver planning.
//!
//! Works in the orbit-local RIC frame of the protected object: R̂ along
//! the position vector, Ĉ along the orbital angular momentum, Î = Ĉ × R̂
//! completing the right-handed set. Candidate impulsive burns are sized
//! from linearized Clohessy-Wiltshire responses at the time to closest
//! approach and ranked by |Δv|; the smallest fuel-feasible candidate
//! (Tsiolkovsky) wins, the rest are reported as alternatives.
//!
//! Also provides the classical utilities: Hohmann transfer between
//! circular radii, single-impulse plane change, and a one-orbit phasing
//! maneuver.

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Spacecraft parameters for fuel-feasibility checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpacecraftParams {
    /// Dry mass (kg).
    pub dry_mass_kg: f64,
    /// Specific impulse (s).
    pub isp_s: f64,
    /// Maximum thrust (N).
    pub max_thrust_n: f64,
    /// Available fuel mass (kg).
    pub fuel_mass_kg: f64,
}

impl Default for SpacecraftParams {
    fn default() -> Self {
        SpacecraftParams {
            dry_mass_kg: 1000.0,
            isp_s: 300.0,
            max_thrust_n: 100.0,
            fuel_mass_kg: 50.0,
        }
    }
}

impl SpacecraftParams {
    /// Fuel mass consumed by a Δv (km/s), from the Tsiolkovsky equation.
    pub fn fuel_required(&self, delta_v_km_s: f64) -> f64 {
        let delta_v_m_s = delta_v_km_s.abs() * 1000.0;
        self.dry_mass_kg * (1.0 - (-delta_v_m_s / (self.isp_s * G0)).exp())
    }

    /// True when the available fuel covers the Δv.
    pub fn can_execute(&self, delta_v_km_s: f64) -> bool {
        self.fuel_required(delta_v_km_s) <= self.fuel_mass_kg
    }
}

/// Relative position and velocity expressed in the RIC basis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RelativeState {
    /// [radial, in-track, cross-track] (km).
    pub position: [f64; 3],
    /// [radial, in-track, cross-track] (km/s).
    pub velocity: [f64; 3],
}

/// A non-primary burn option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    /// Δv in RIC components (km/s).
    pub delta_v: [f64; 3],
    /// Execution offset (minutes from now).
    pub burn_time_minutes: f64,
    /// Miss distance this burn is sized to achieve (km): the configured
    /// safe distance, not an integrated prediction.
    pub new_miss_distance_km: f64,
    /// Fuel mass for this option (kg).
    pub fuel_cost_kg: f64,
    pub description: String,
}

/// Outcome of a maneuver computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManeuverResult {
    pub success: bool,
    pub message: String,
    /// Primary Δv in RIC components (km/s).
    pub delta_v: [f64; 3],
    /// Execution offset of the primary burn (minutes from now).
    pub burn_time_minutes: f64,
    /// |Δv| of the primary burn (km/s).
    pub total_delta_v: f64,
    /// Miss distance the primary burn is sized to achieve (km): the
    /// configured safe distance for avoidance plans, the unchanged
    /// current miss when no burn is needed, zero where not applicable.
    pub new_miss_distance_km: f64,
    /// Fuel mass for the primary burn (kg).
    pub fuel_cost_kg: f64,
    /// Remaining options, ranked by |Δv|.
    pub alternatives: Vec<Alternative>,
}

impl ManeuverResult {
    fn failure(message: impl Into<String>) -> Self {
        ManeuverResult {
            success: false,
            message: message.into(),
            delta_v: [0.0; 3],
            burn_time_minutes: 0.0,
            total_delta_v: 0.0,
            new_miss_distance_km: 0.0,
            fuel_cost_kg: 0.0,
            alternatives: Vec::new(),
        }
    }
}

/// Collision-avoidance optimizer. Stateless across calls; spacecraft
/// parameters and the safe miss distance are plain configuration.
#[derive(Debug, Clone)]
pub struct ManeuverOptimizer {
    spacecraft: SpacecraftParams,
    safe_distance_km: f64,
}

impl Default for ManeuverOptimizer {
    fn default() -> Self {
        ManeuverOptimizer {
            spacecraft: SpacecraftParams::default(),
            safe_distance_km: 1.0,
        }
    }
}

impl ManeuverOptimizer {
    pub fn set_spacecraft(&mut self, params: SpacecraftParams) {
        self.spacecraft = params;
    }

    pub fn spacecraft(&self) -> &SpacecraftParams {
        &self.spacecraft
    }

    /// Set the required post-maneuver miss distance (km).
    pub fn set_safe_distance(&mut self, km: f64) {
        self.safe_distance_km = km;
    }

    pub fn safe_distance(&self) -> f64 {
        self.safe_distance_km
    }

    /// Smallest impulsive Δv that opens the miss distance to the
    /// configured safe value at the time of closest approach.
    pub fn plan_avoidance(
        &self,
        sat_pos: [f64; 3],
        sat_vel: [f64; 3],
        threat_pos: [f64; 3],
        threat_vel: [f64; 3],
        time_to_tca_minutes: f64,
        current_miss_km: f64,
    ) -> ManeuverResult {
        let required_separation = self.safe_distance_km - current_miss_km;
        if required_separation <= 0.0 {
            return ManeuverResult {
                success: true,
                message: "current miss distance already safe".to_string(),
                delta_v: [0.0; 3],
                burn_time_minutes: 0.0,
                total_delta_v: 0.0,
                new_miss_distance_km: current_miss_km,
                fuel_cost_kg: 0.0,
                alternatives: Vec::new(),
            };
        }

        if time_to_tca_minutes <= 0.0 {
            return ManeuverResult::failure("closest approach is not in the future");
        }

        let tau = time_to_tca_minutes * 60.0;

        // Encounter geometry in the RIC basis, for diagnostics only:
        // the candidate burns below are sized from the required
        // separation alone.
        let relative = to_ric_frame(
            sat_pos,
            sat_vel,
            sub(threat_pos, sat_pos),
            sub(threat_vel, sat_vel),
        );
        log::debug!(
            "avoidance geometry: RIC relative position {:?} km, velocity {:?} km/s",
            relative.position,
            relative.velocity
        );

        let a = semi_major_axis_from_state(sat_pos, sat_vel);
        if !(a > 0.0) || !a.is_finite() {
            return ManeuverResult::failure("protected object state is not an elliptical orbit");
        }
        let n = (MU_EARTH / (a * a * a)).sqrt(); // rad/s

        // Linearized CW responses at tau
        let dv_radial = required_separation * n / (3.0 * tau);
        let dv_intrack = required_separation / (2.0 * tau);
        let dv_crosstrack = required_separation / tau;

        let mut options = vec![
            ([dv_radial, 0.0, 0.0], dv_radial.abs(), "radial burn"),
            ([0.0, dv_intrack, 0.0], dv_intrack.abs(), "in-track burn"),
            ([0.0, 0.0, dv_crosstrack], dv_crosstrack.abs(), "cross-track burn"),
        ];
        options.sort_by(|a, b| a.1.total_cmp(&b.1));

        let Some(primary_idx) = options
            .iter()
            .position(|&(_, mag, _)| self.spacecraft.can_execute(mag))
        else {
            return ManeuverResult::failure("insufficient fuel for any avoidance burn");
        };

        let (dv, magnitude, description) = options.remove(primary_idx);
        let alternatives = options
            .into_iter()
            .map(|(alt_dv, alt_mag, alt_desc)| Alternative {
                delta_v: alt_dv,
                burn_time_minutes: 0.0,
                new_miss_distance_km: self.safe_distance_km,
                fuel_cost_kg: self.spacecraft.fuel_required(alt_mag),
                description: alt_desc.to_string(),
            })
            .collect();

        ManeuverResult {
            success: true,
            message: format!("{description} - minimum delta-v solution"),
            delta_v: dv,
            burn_time_minutes: 0.0,
            total_delta_v: magnitude,
            new_miss_distance_km: self.safe_distance_km,
            fuel_cost_kg: self.spacecraft.fuel_required(magnitude),
            alternatives,
        }
    }
}

/// Express a relative state in the RIC basis of `(sat_pos, sat_vel)`.
pub fn to_ric_frame(
    sat_pos: [f64; 3],
    sat_vel: [f64; 3],
    relative_pos: [f64; 3],
    relative_vel: [f64; 3],
) -> RelativeState {
    let r_hat = unit(sat_pos);
    let c_hat = unit(cross(sat_pos, sat_vel));
    let i_hat = cross(c_hat, r_hat);

    RelativeState {
        position: [
            dot(relative_pos, r_hat),
            dot(relative_pos, i_hat),
            dot(relative_pos, c_hat),
        ],
        velocity: [
            dot(relative_vel, r_hat),
            dot(relative_vel, i_hat),
            dot(relative_vel, c_hat),
        ],
    }
}

/// Clohessy-Wiltshire prediction of the relative position after
/// `dt_seconds`, about a circular reference orbit with mean motion `n`
/// (rad/s).
pub fn predict_relative(initial: &RelativeState, n: f64, dt_seconds: f64) -> [f64; 3] {
    let t = dt_seconds;
    let c = (n * t).cos();
    let s = (n * t).sin();

    let [x0, y0, z0] = initial.position;
    let [vx0, vy0, vz0] = initial.velocity;

    [
        (4.0 - 3.0 * c) * x0 + (s / n) * vx0 + (2.0 / n) * (1.0 - c) * vy0,
        6.0 * (s - n * t) * x0 + y0 - (2.0 / n) * (1.0 - c) * vx0 + (4.0 * s / n - 3.0 * t) * vy0,
        z0 * c + (vz0 / n) * s,
    ]
}

/// Hohmann transfer between two circular orbit radii (km).
///
/// The second burn executes half a transfer period after the first.
pub fn hohmann_transfer(r1_km: f64, r2_km: f64, spacecraft: &SpacecraftParams) -> ManeuverResult {
    if !(r1_km > 0.0 && r2_km > 0.0) {
        return ManeuverResult::failure("transfer radii must be positive");
    }

    let a_transfer = (r1_km + r2_km) / 2.0;

    let v1_circular = (MU_EARTH / r1_km).sqrt();
    let v2_circular = (MU_EARTH / r2_km).sqrt();
    let v_transfer_perigee = (2.0 * MU_EARTH * (1.0 / r1_km - 1.0 / (2.0 * a_transfer))).sqrt();
    let v_transfer_apogee = (2.0 * MU_EARTH * (1.0 / r2_km - 1.0 / (2.0 * a_transfer))).sqrt();

    let (dv1, dv2) = if r2_km > r1_km {
        (v_transfer_perigee - v1_circular, v2_circular - v_transfer_apogee)
    } else {
        (v1_circular - v_transfer_perigee, v_transfer_apogee - v2_circular)
    };

    let total = dv1.abs() + dv2.abs();
    let transfer_minutes = orbital_period_seconds(a_transfer) / 2.0 / 60.0;
    let feasible = spacecraft.can_execute(total);

    ManeuverResult {
        success: feasible,
        message: if feasible {
            "Hohmann transfer feasible".to_string()
        } else {
            "insufficient fuel for Hohmann transfer".to_string()
        },
        delta_v: [0.0, dv1, 0.0],
        burn_time_minutes: transfer_minutes,
        total_delta_v: total,
        new_miss_distance_km: 0.0,
        fuel_cost_kg: spacecraft.fuel_required(total),
        alternatives: vec![
            Alternative {
                delta_v: [0.0, dv1, 0.0],
                burn_time_minutes: 0.0,
                new_miss_distance_km: 0.0,
                fuel_cost_kg: spacecraft.fuel_required(dv1),
                description: "first burn (departure)".to_string(),
            },
            Alternative {
                delta_v: [0.0, dv2, 0.0],
                burn_time_minutes: transfer_minutes,
                new_miss_distance_km: 0.0,
                fuel_cost_kg: spacecraft.fuel_required(dv2),
                description: "second burn (arrival)".to_string(),
            },
        ],
    }
}

/// Single-impulse plane change at the given orbital speed:
/// |Δv| = 2 v sin(Δi/2).
pub fn plane_change(
    velocity_km_s: f64,
    inclination_change_rad: f64,
    spacecraft: &SpacecraftParams,
) -> ManeuverResult {
    let delta_v = 2.0 * velocity_km_s * (inclination_change_rad / 2.0).sin().abs();
    let feasible = spacecraft.can_execute(delta_v);

    ManeuverResult {
        success: feasible,
        message: if feasible {
            "plane change feasible".to_string()
        } else {
            "insufficient fuel for plane change".to_string()
        },
        delta_v: [0.0, 0.0, delta_v],
        burn_time_minutes: 0.0,
        total_delta_v: delta_v,
        new_miss_distance_km: 0.0,
        fuel_cost_kg: spacecraft.fuel_required(delta_v),
        alternatives: Vec::new(),
    }
}

/// Phasing maneuver shifting the along-track position by `phase_angle`
/// over one phasing orbit.
pub fn phasing(
    altitude_km: f64,
    phase_angle_rad: f64,
    spacecraft: &SpacecraftParams,
) -> ManeuverResult {
    let r = R_EARTH + altitude_km;
    let period = orbital_period_seconds(r);

    let target_period = period * (1.0 - phase_angle_rad / TAU);
    let a_phase = ((target_period / TAU) * (target_period / TAU) * MU_EARTH).powf(1.0 / 3.0);

    let v_circular = (MU_EARTH / r).sqrt();
    let v_phase_sq = 2.0 * MU_EARTH * (1.0 / r - 1.0 / (2.0 * a_phase));
    if v_phase_sq <= 0.0 {
        return ManeuverResult::failure("phase angle too large for a bound phasing orbit");
    }

    // Enter and exit the phasing orbit: two equal burns
    let delta_v = 2.0 * (v_phase_sq.sqrt() - v_circular).abs();
    let feasible = spacecraft.can_execute(delta_v);

    ManeuverResult {
        success: feasible,
        message: if feasible {
            "phasing maneuver feasible".to_string()
        } else {
            "insufficient fuel for phasing".to_string()
        },
        delta_v: [0.0, delta_v / 2.0, 0.0],
        burn_time_minutes: target_period / 60.0,
        total_delta_v: delta_v,
        new_miss_distance_km: 0.0,
        fuel_cost_kg: spacecraft.fuel_required(delta_v),
        alternatives: Vec::new(),
    }
}

/// Orbital period of a (circular or semi-major-axis) radius (seconds).
pub fn orbital_period_seconds(semi_major_axis_km: f64) -> f64 {
    TAU * (semi_major_axis_km.powi(3) / MU_EARTH).sqrt()
}

/// Semi-major axis from an inertial state via vis-viva (km).
pub fn semi_major_axis_from_state(pos: [f64; 3], vel: [f64; 3]) -> f64 {
    let r = norm(pos);
    let v = norm(vel);
    let energy = v * v / 2.0 - MU_EARTH / r;
    -MU_EARTH / (2.0 * energy)
}

// ── Small vector helpers ──

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn unit(a: [f64; 3]) -> [f64; 3] {
    let m = norm(a);
    [a[0] / m, a[1] / m, a[2] / m]
}
