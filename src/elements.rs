//! Catalog element records.
//!
//! An [`ElementRecord`] is the immutable per-object input to the engine:
//! mean orbital elements at an epoch, plus catalog identity. Semi-major
//! axis is never stored independently — it is derived from mean motion by
//! Kepler's third law at construction, with mean motion in rad/min.

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Mean orbital elements for one cataloged object, immutable after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementRecord {
    /// Catalog (NORAD) number.
    pub catalog_number: u32,
    /// Human-readable name, possibly empty.
    pub name: String,
    /// International designator (e.g., "98067A").
    pub intl_designator: String,
    /// Epoch as a Julian date.
    pub epoch_jd: f64,
    /// Mean inclination (rad).
    pub inclination: f64,
    /// RAAN at epoch (rad).
    pub raan: f64,
    /// Eccentricity, in [0, 0.999].
    pub eccentricity: f64,
    /// Argument of perigee at epoch (rad).
    pub arg_perigee: f64,
    /// Mean anomaly at epoch (rad).
    pub mean_anomaly: f64,
    /// Mean motion at epoch (rad/min).
    pub mean_motion: f64,
    /// Semi-major axis (km), derived from mean motion.
    pub semi_major_axis: f64,
    /// B* drag term (1/Earth radii).
    pub bstar: f64,
}

impl ElementRecord {
    /// Build a record, deriving the semi-major axis from `mean_motion`
    /// (rad/min) via Kepler's third law.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog_number: u32,
        name: impl Into<String>,
        intl_designator: impl Into<String>,
        epoch_jd: f64,
        inclination: f64,
        raan: f64,
        eccentricity: f64,
        arg_perigee: f64,
        mean_anomaly: f64,
        mean_motion: f64,
        bstar: f64,
    ) -> Self {
        ElementRecord {
            catalog_number,
            name: name.into(),
            intl_designator: intl_designator.into(),
            epoch_jd,
            inclination,
            raan,
            eccentricity,
            arg_perigee,
            mean_anomaly,
            mean_motion,
            semi_major_axis: semi_major_axis_from_mean_motion(mean_motion),
            bstar,
        }
    }

    /// Orbital period (minutes).
    pub fn period_minutes(&self) -> f64 {
        TAU / self.mean_motion
    }

    /// Age of the elements at the given Julian date (hours).
    pub fn hours_since_epoch(&self, now_jd: f64) -> f64 {
        (now_jd - self.epoch_jd) * 24.0
    }

    /// Perigee altitude above the equatorial radius (km).
    pub fn perigee_altitude(&self) -> f64 {
        self.semi_major_axis * (1.0 - self.eccentricity) - R_EARTH
    }
}

/// Semi-major axis (km) from mean motion (rad/min): a = (μ·3600 / n²)^(1/3).
///
/// The 3600 factor converts μ from km³/s² to km³/min².
pub fn semi_major_axis_from_mean_motion(n_rad_min: f64) -> f64 {
    (MU_EARTH * 3600.0 / (n_rad_min * n_rad_min)).powf(1.0 / 3.0)
}

/// Merge two element sets, keyed by catalog number. On collision the
/// record with the later epoch wins. Output is sorted by catalog number.
pub fn merge_elements(existing: &[ElementRecord], updates: &[ElementRecord]) -> Vec<ElementRecord> {
    use std::collections::BTreeMap;

    let mut merged: BTreeMap<u32, &ElementRecord> = BTreeMap::new();
    for rec in existing {
        merged.insert(rec.catalog_number, rec);
    }
    for rec in updates {
        match merged.get(&rec.catalog_number) {
            Some(current) if current.epoch_jd >= rec.epoch_jd => {}
            _ => {
                merged.insert(rec.catalog_number, rec);
            }
        }
    }

    merged.into_values().cloned().collect()
}

/// Normalize angle to [0, 2π).
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle % TAU;
    if a < 0.0 { a + TAU } else { a }
}
