//! Engine facade over the numerical core.
//!
//! Owns the element set, the state store, the probability calculator,
//! the maneuver optimizer and the history recorder, and exposes the
//! operations an outer service layer marshals: catalog listing,
//! propagation, screening, probability assessment, orbit paths, maneuver
//! planning, element updates and screening sweeps.
//!
//! The store is mutated by propagation and read by screening; `&mut
//! self` on the mutating calls serializes them, so a service multiplexing
//! requests onto one engine wraps it in its own mutex.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::constants::*;
use crate::elements::{merge_elements, ElementRecord};
use crate::error::{Error, Result};
use crate::history::{ConjunctionEvent, HistoryRecorder};
use crate::maneuver::{ManeuverOptimizer, ManeuverResult};
use crate::probability::{ConjunctionProbability, ProbabilityCalculator};
use crate::propagator::{propagate_all, propagate_record, PropagationReport, StateVector};
use crate::screen::{screen_pairs, Conjunction};
use crate::store::StateStore;
use crate::tle::Tle;

/// Cooperative cancellation flag, polled by streaming operations between
/// time steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One catalog row for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub catalog_number: u32,
    pub name: String,
    pub intl_designator: String,
    pub inclination_deg: f64,
    pub period_minutes: f64,
    pub perigee_altitude_km: f64,
}

/// Result of one propagate-and-screen step.
#[derive(Debug, Clone)]
pub struct ScreeningPass {
    pub report: PropagationReport,
    pub conjunctions: Vec<Conjunction>,
}

/// Totals from a multi-step screening sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SweepSummary {
    pub steps_completed: u32,
    pub conjunctions_found: usize,
    pub cancelled: bool,
}

/// Result of an element-set update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateSummary {
    pub before: usize,
    pub received: usize,
    pub after: usize,
}

/// The assembled pipeline.
pub struct Engine {
    config: EngineConfig,
    elements: Vec<ElementRecord>,
    store: StateStore,
    calculator: ProbabilityCalculator,
    optimizer: ManeuverOptimizer,
    recorder: Arc<HistoryRecorder>,
    current_time_minutes: f64,
    rejected: Vec<String>,
}

impl Engine {
    /// Build an engine from element records. Records violating the store
    /// invariants are dropped with a warning and listed in
    /// [`Engine::rejected`]; the rest form the population.
    pub fn new(records: Vec<ElementRecord>, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let mut rejected = Vec::new();
        let accepted: Vec<ElementRecord> = records
            .into_iter()
            .filter(|rec| match validate_record(rec) {
                Ok(()) => true,
                Err(reason) => {
                    log::warn!("rejecting catalog {}: {reason}", rec.catalog_number);
                    rejected.push(format!("catalog {}: {reason}", rec.catalog_number));
                    false
                }
            })
            .collect();

        let store = StateStore::from_elements(&accepted)?;

        let mut calculator = ProbabilityCalculator::new(config.rng_seed);
        calculator.set_sample_count(config.monte_carlo_samples);
        calculator.set_collision_radius(config.collision_radius_km);

        let mut optimizer = ManeuverOptimizer::default();
        optimizer.set_spacecraft(config.spacecraft);
        optimizer.set_safe_distance(config.safe_distance_km);

        let recorder = Arc::new(HistoryRecorder::new(config.recorder_config()));

        log::info!(
            "engine ready: {} objects ({} rejected)",
            store.len(),
            rejected.len()
        );

        Ok(Engine {
            config,
            elements: accepted,
            store,
            calculator,
            optimizer,
            recorder,
            current_time_minutes: 0.0,
            rejected,
        })
    }

    /// Build an engine from a TLE text file.
    pub fn load_tle_file(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::resource(format!("cannot read element file: {e}")))?;
        let records: Vec<ElementRecord> = Tle::parse_batch(&text).iter().map(Tle::to_elements).collect();
        if records.is_empty() {
            return Err(Error::invalid_input(format!(
                "no element sets found in {}",
                path.as_ref().display()
            )));
        }
        Self::new(records, config)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn elements(&self) -> &[ElementRecord] {
        &self.elements
    }

    /// Records dropped at construction or update time.
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    pub fn recorder(&self) -> &Arc<HistoryRecorder> {
        &self.recorder
    }

    /// Time offset of the most recent propagation (minutes).
    pub fn current_time_minutes(&self) -> f64 {
        self.current_time_minutes
    }

    /// Catalog listing in store order.
    pub fn catalog(&self) -> Vec<CatalogSummary> {
        self.elements
            .iter()
            .map(|rec| CatalogSummary {
                catalog_number: rec.catalog_number,
                name: rec.name.clone(),
                intl_designator: rec.intl_designator.clone(),
                inclination_deg: rec.inclination * RAD2DEG,
                period_minutes: rec.period_minutes(),
                perigee_altitude_km: rec.perigee_altitude(),
            })
            .collect()
    }

    /// Advance every object to `time_minutes` past its epoch.
    pub fn propagate_to(&mut self, time_minutes: f64) -> PropagationReport {
        let report = propagate_all(&mut self.store, time_minutes);
        self.current_time_minutes = time_minutes;
        report
    }

    /// Propagate to `time_minutes`, then screen for close pairs at the
    /// configured threshold.
    pub fn screen_at(&mut self, time_minutes: f64) -> ScreeningPass {
        let report = self.propagate_to(time_minutes);
        let conjunctions = screen_pairs(
            &self.store.view(),
            self.config.threshold_km,
            time_minutes,
            self.config.cell_size_km,
        );
        ScreeningPass {
            report,
            conjunctions,
        }
    }

    /// Refine screened conjunctions with collision probabilities.
    pub fn assess(&mut self, conjunctions: &[Conjunction]) -> Vec<ConjunctionProbability> {
        self.calculator.assess_all(&self.store, conjunctions)
    }

    /// Run `steps` propagate-screen-assess cycles starting at
    /// `start_minutes`, `step_minutes` apart. Polls the cancellation
    /// token once per step; records snapshots and conjunction events
    /// when the recorder is running.
    pub fn sweep<F>(
        &mut self,
        start_minutes: f64,
        step_minutes: f64,
        steps: u32,
        cancel: &CancelToken,
        mut on_step: F,
    ) -> SweepSummary
    where
        F: FnMut(f64, &[ConjunctionProbability]),
    {
        let mut summary = SweepSummary {
            steps_completed: 0,
            conjunctions_found: 0,
            cancelled: false,
        };

        for k in 0..steps {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                log::info!("sweep cancelled after {} steps", summary.steps_completed);
                break;
            }

            let t = start_minutes + k as f64 * step_minutes;
            let pass = self.screen_at(t);
            let assessed = self.assess(&pass.conjunctions);

            self.recorder.record_snapshot(&self.store, t);
            for prob in &assessed {
                self.recorder.record_event(ConjunctionEvent {
                    time_minutes: t,
                    wall_time: chrono::Utc::now(),
                    catalog_1: prob.catalog_1 as i32,
                    catalog_2: prob.catalog_2 as i32,
                    miss_distance_km: prob.miss_distance_km,
                    relative_speed_km_s: prob.relative_speed_km_s,
                    collision_probability: prob.collision_probability,
                });
            }

            summary.conjunctions_found += assessed.len();
            summary.steps_completed += 1;
            on_step(t, &assessed);
        }

        summary
    }

    /// Sample one full orbit of a single object, `points` states evenly
    /// spaced over its period, starting at the current engine time.
    pub fn orbit_path(&self, catalog_number: u32, points: usize) -> Result<Vec<(f64, StateVector)>> {
        let index = self.store.index_of(catalog_number).ok_or_else(|| {
            Error::invalid_input(format!("catalog {catalog_number} not in the population"))
        })?;
        let record = &self.elements[index];
        let period = record.period_minutes();
        let points = points.max(2);

        let mut path = Vec::with_capacity(points);
        for k in 0..points {
            let t = self.current_time_minutes + period * k as f64 / (points - 1) as f64;
            let state = propagate_record(record, t)
                .map_err(|reason| Error::numerical(index, reason.to_string()))?;
            path.push((t, state));
        }
        Ok(path)
    }

    /// Plan the minimum avoidance burn for `protected` against `threat`,
    /// with closest approach `time_to_tca_minutes` from the engine's
    /// current time. The unmitigated miss distance comes from
    /// propagating both element sets to TCA.
    pub fn plan_avoidance(
        &self,
        protected: u32,
        threat: u32,
        time_to_tca_minutes: f64,
    ) -> Result<ManeuverResult> {
        let pi = self.store.index_of(protected).ok_or_else(|| {
            Error::invalid_input(format!("catalog {protected} not in the population"))
        })?;
        let ti = self
            .store
            .index_of(threat)
            .ok_or_else(|| Error::invalid_input(format!("catalog {threat} not in the population")))?;
        if pi == ti {
            return Err(Error::invalid_input("protected and threat are the same object"));
        }

        let tca = self.current_time_minutes + time_to_tca_minutes;
        let p_at_tca = propagate_record(&self.elements[pi], tca)
            .map_err(|r| Error::numerical(pi, r.to_string()))?;
        let t_at_tca = propagate_record(&self.elements[ti], tca)
            .map_err(|r| Error::numerical(ti, r.to_string()))?;
        let miss = (0..3)
            .map(|k| (p_at_tca.r[k] - t_at_tca.r[k]).powi(2))
            .sum::<f64>()
            .sqrt();

        let p_now = propagate_record(&self.elements[pi], self.current_time_minutes)
            .map_err(|r| Error::numerical(pi, r.to_string()))?;
        let t_now = propagate_record(&self.elements[ti], self.current_time_minutes)
            .map_err(|r| Error::numerical(ti, r.to_string()))?;

        Ok(self.optimizer.plan_avoidance(
            p_now.r,
            p_now.v,
            t_now.r,
            t_now.v,
            time_to_tca_minutes,
            miss,
        ))
    }

    /// Direct access to the maneuver optimizer for simulation-style
    /// calls (Hohmann, plane change, phasing).
    pub fn optimizer(&self) -> &ManeuverOptimizer {
        &self.optimizer
    }

    /// Merge an element update into the population (catalog number keyed,
    /// later epoch wins) and rebuild the store. Positions are undefined
    /// until the next propagation.
    pub fn update_elements(&mut self, updates: &[ElementRecord]) -> Result<UpdateSummary> {
        let before = self.elements.len();

        let mut accepted = Vec::with_capacity(updates.len());
        for rec in updates {
            match validate_record(rec) {
                Ok(()) => accepted.push(rec.clone()),
                Err(reason) => {
                    log::warn!("rejecting update for catalog {}: {reason}", rec.catalog_number);
                    self.rejected
                        .push(format!("catalog {}: {reason}", rec.catalog_number));
                }
            }
        }

        let merged = merge_elements(&self.elements, &accepted);
        let store = StateStore::from_elements(&merged)?;

        let after = merged.len();
        self.elements = merged;
        self.store = store;

        log::info!("element update: {before} -> {after} objects ({} received)", updates.len());
        Ok(UpdateSummary {
            before,
            received: updates.len(),
            after,
        })
    }
}

fn validate_record(rec: &ElementRecord) -> std::result::Result<(), String> {
    if !(0.0..=0.999).contains(&rec.eccentricity) || !rec.eccentricity.is_finite() {
        return Err(format!("eccentricity {} outside [0, 0.999]", rec.eccentricity));
    }
    if !(rec.mean_motion > 0.0) || !rec.mean_motion.is_finite() {
        return Err(format!("mean motion {} must be positive", rec.mean_motion));
    }
    if ![rec.inclination, rec.raan, rec.arg_perigee, rec.mean_anomaly, rec.epoch_jd]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err("non-finite element".to_string());
    }
    Ok(())
}
