//! Runtime configuration.
//!
//! Every tunable of the pipeline in one serde struct with sane defaults,
//! loadable from a JSON file. Missing fields fall back to defaults, so a
//! config file only needs the values it changes.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::history::RecorderConfig;
use crate::maneuver::SpacecraftParams;
use crate::probability;
use crate::screen::DEFAULT_CELL_KM;

/// Engine-wide runtime parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Conjunction screening threshold (km).
    pub threshold_km: f64,
    /// Required post-maneuver miss distance (km).
    pub safe_distance_km: f64,
    /// Combined hard-body radius for probability (km).
    pub collision_radius_km: f64,
    /// Monte-Carlo sample count per conjunction.
    pub monte_carlo_samples: u32,
    /// Seed for the probability sampler.
    pub rng_seed: u64,
    /// Spatial hash cell edge (km); raised to the threshold when smaller.
    pub cell_size_km: f64,
    /// Spacecraft parameters for maneuver feasibility.
    pub spacecraft: SpacecraftParams,
    /// Snapshot cap for the history recorder.
    pub max_snapshots: usize,
    /// Conjunction event cap for the history recorder.
    pub max_events: usize,
    /// Snapshot cadence (seconds).
    pub snapshot_interval_s: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            threshold_km: 10.0,
            safe_distance_km: 1.0,
            collision_radius_km: probability::DEFAULT_COLLISION_RADIUS_KM,
            monte_carlo_samples: probability::DEFAULT_SAMPLE_COUNT,
            rng_seed: probability::DEFAULT_SEED,
            cell_size_km: DEFAULT_CELL_KM,
            spacecraft: SpacecraftParams::default(),
            max_snapshots: 86_400,
            max_events: 10_000,
            snapshot_interval_s: 1.0,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; absent fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::resource(format!("cannot open config file: {e}")))?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::invalid_input(format!("config parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold_km > 0.0) {
            return Err(Error::invalid_input("threshold_km must be positive"));
        }
        if !(self.cell_size_km > 0.0) {
            return Err(Error::invalid_input("cell_size_km must be positive"));
        }
        if !(self.collision_radius_km > 0.0) {
            return Err(Error::invalid_input("collision_radius_km must be positive"));
        }
        if self.safe_distance_km < 0.0 {
            return Err(Error::invalid_input("safe_distance_km must not be negative"));
        }
        if self.monte_carlo_samples == 0 {
            return Err(Error::invalid_input("monte_carlo_samples must be at least 1"));
        }
        if !(self.snapshot_interval_s > 0.0) {
            return Err(Error::invalid_input("snapshot_interval_s must be positive"));
        }
        Ok(())
    }

    /// Recorder settings derived from the engine config.
    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            snapshot_interval_s: self.snapshot_interval_s,
            max_snapshots: self.max_snapshots,
            max_events: self.max_events,
            record_conjunctions: true,
        }
    }
}
