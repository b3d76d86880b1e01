//! Position history recording and playback.
//!
//! Two bounded deques — position snapshots and conjunction events — live
//! behind one mutex. Eviction is strict FIFO at the configured caps.
//! Snapshots store positions as `f32` to halve the memory bill; the
//! engine's `f64` state is the source of truth, history is for playback.
//!
//! The on-disk format is little-endian binary: magic "ORBI"
//! (0x4F524249), u32 version 1, u64 snapshot count, snapshots, u64 event
//! count, events (six f64 fields each). Endianness is fixed regardless
//! of host.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::StateStore;

const MAGIC: u32 = 0x4F52_4249; // "ORBI"
const VERSION: u32 = 1;

/// Time tolerance for an exact snapshot lookup (minutes).
const EXACT_LOOKUP_TOL_MIN: f64 = 1e-3;

/// One recorded frame of the population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Simulation time (minutes from epoch).
    pub time_minutes: f64,
    /// Wall clock at recording time.
    pub wall_time: DateTime<Utc>,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
    pub catalog_ids: Vec<i32>,
}

impl PositionSnapshot {
    pub fn satellite_count(&self) -> usize {
        self.catalog_ids.len()
    }

    /// Approximate heap usage of this snapshot.
    pub fn memory_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + (self.x.capacity() + self.y.capacity() + self.z.capacity())
                * std::mem::size_of::<f32>()
            + self.catalog_ids.capacity() * std::mem::size_of::<i32>()
    }
}

/// A recorded close approach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConjunctionEvent {
    pub time_minutes: f64,
    pub wall_time: DateTime<Utc>,
    pub catalog_1: i32,
    pub catalog_2: i32,
    pub miss_distance_km: f64,
    pub relative_speed_km_s: f64,
    pub collision_probability: f64,
}

/// Recorder limits and behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// How often the engine records snapshots (seconds).
    pub snapshot_interval_s: f64,
    /// Snapshot cap; oldest evicted first.
    pub max_snapshots: usize,
    /// Conjunction event cap; oldest evicted first.
    pub max_events: usize,
    /// Whether conjunction events are recorded at all.
    pub record_conjunctions: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        RecorderConfig {
            snapshot_interval_s: 1.0,
            max_snapshots: 86_400,
            max_events: 10_000,
            record_conjunctions: true,
        }
    }
}

/// Recorded time span and element counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_minutes: f64,
    pub end_minutes: f64,
    pub snapshot_count: usize,
    pub event_count: usize,
}

/// Recorder statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecorderStats {
    pub total_snapshots: usize,
    pub total_events: usize,
    pub memory_usage_bytes: usize,
    pub recording_duration_seconds: f64,
}

#[derive(Debug)]
struct RecorderInner {
    config: RecorderConfig,
    recording: bool,
    snapshots: VecDeque<PositionSnapshot>,
    events: VecDeque<ConjunctionEvent>,
}

impl RecorderInner {
    fn trim(&mut self) {
        while self.snapshots.len() > self.config.max_snapshots {
            self.snapshots.pop_front();
        }
        while self.events.len() > self.config.max_events {
            self.events.pop_front();
        }
    }
}

/// Bounded history of snapshots and conjunction events.
///
/// All public operations take the internal mutex; the recorder owns its
/// deques exclusively.
#[derive(Debug)]
pub struct HistoryRecorder {
    inner: Mutex<RecorderInner>,
}

impl Default for HistoryRecorder {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}

impl HistoryRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        HistoryRecorder {
            inner: Mutex::new(RecorderInner {
                config,
                recording: false,
                snapshots: VecDeque::new(),
                events: VecDeque::new(),
            }),
        }
    }

    pub fn start(&self) {
        self.inner.lock().recording = true;
    }

    pub fn stop(&self) {
        self.inner.lock().recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().recording
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.snapshots.clear();
        inner.events.clear();
    }

    pub fn config(&self) -> RecorderConfig {
        self.inner.lock().config
    }

    /// Replace the config; tighter caps evict immediately.
    pub fn set_config(&self, config: RecorderConfig) {
        let mut inner = self.inner.lock();
        inner.config = config;
        inner.trim();
    }

    /// Record the store's current positions as a new snapshot
    /// (downcast to f32). No-op unless recording.
    pub fn record_snapshot(&self, store: &StateStore, time_minutes: f64) {
        let mut inner = self.inner.lock();
        if !inner.recording {
            return;
        }

        let n = store.len();
        let mut snapshot = PositionSnapshot {
            time_minutes,
            wall_time: Utc::now(),
            x: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
            z: Vec::with_capacity(n),
            catalog_ids: Vec::with_capacity(n),
        };
        for i in 0..n {
            let [px, py, pz] = store.position(i);
            snapshot.x.push(px as f32);
            snapshot.y.push(py as f32);
            snapshot.z.push(pz as f32);
            snapshot.catalog_ids.push(store.catalog_number(i) as i32);
        }

        inner.snapshots.push_back(snapshot);
        inner.trim();
    }

    /// Record a conjunction event. No-op unless recording and events are
    /// enabled.
    pub fn record_event(&self, event: ConjunctionEvent) {
        let mut inner = self.inner.lock();
        if !inner.recording || !inner.config.record_conjunctions {
            return;
        }
        inner.events.push_back(event);
        inner.trim();
    }

    /// Snapshot whose time matches within 10⁻³ minutes, if any.
    pub fn get_snapshot_at(&self, time_minutes: f64) -> Option<PositionSnapshot> {
        let inner = self.inner.lock();
        let idx = inner
            .snapshots
            .partition_point(|s| s.time_minutes < time_minutes);

        for candidate in [idx.checked_sub(1), Some(idx)].into_iter().flatten() {
            if let Some(snapshot) = inner.snapshots.get(candidate) {
                if (snapshot.time_minutes - time_minutes).abs() < EXACT_LOOKUP_TOL_MIN {
                    return Some(snapshot.clone());
                }
            }
        }
        None
    }

    /// Closest recorded snapshot to the given time, if any.
    pub fn get_snapshot_nearest(&self, time_minutes: f64) -> Option<PositionSnapshot> {
        let inner = self.inner.lock();
        if inner.snapshots.is_empty() {
            return None;
        }

        let idx = inner
            .snapshots
            .partition_point(|s| s.time_minutes < time_minutes);

        if idx == inner.snapshots.len() {
            return inner.snapshots.back().cloned();
        }
        if idx == 0 {
            return inner.snapshots.front().cloned();
        }

        let after = &inner.snapshots[idx];
        let before = &inner.snapshots[idx - 1];
        if (after.time_minutes - time_minutes).abs() < (before.time_minutes - time_minutes).abs() {
            Some(after.clone())
        } else {
            Some(before.clone())
        }
    }

    /// Snapshots with time in [start, end].
    pub fn snapshots_between(&self, start_minutes: f64, end_minutes: f64) -> Vec<PositionSnapshot> {
        self.inner
            .lock()
            .snapshots
            .iter()
            .filter(|s| s.time_minutes >= start_minutes && s.time_minutes <= end_minutes)
            .cloned()
            .collect()
    }

    /// Events with time in [start, end].
    pub fn events_between(&self, start_minutes: f64, end_minutes: f64) -> Vec<ConjunctionEvent> {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|e| e.time_minutes >= start_minutes && e.time_minutes <= end_minutes)
            .cloned()
            .collect()
    }

    /// All events touching the given catalog number.
    pub fn events_for(&self, catalog_number: i32) -> Vec<ConjunctionEvent> {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|e| e.catalog_1 == catalog_number || e.catalog_2 == catalog_number)
            .cloned()
            .collect()
    }

    pub fn snapshots(&self) -> Vec<PositionSnapshot> {
        self.inner.lock().snapshots.iter().cloned().collect()
    }

    pub fn events(&self) -> Vec<ConjunctionEvent> {
        self.inner.lock().events.iter().cloned().collect()
    }

    /// Recorded simulation-time range; `None` when nothing is recorded.
    pub fn time_range(&self) -> Option<TimeRange> {
        let inner = self.inner.lock();
        let first = inner.snapshots.front()?;
        let last = inner.snapshots.back()?;
        Some(TimeRange {
            start_minutes: first.time_minutes,
            end_minutes: last.time_minutes,
            snapshot_count: inner.snapshots.len(),
            event_count: inner.events.len(),
        })
    }

    pub fn stats(&self) -> RecorderStats {
        let inner = self.inner.lock();
        let memory: usize = inner.snapshots.iter().map(|s| s.memory_bytes()).sum::<usize>()
            + inner.events.len() * std::mem::size_of::<ConjunctionEvent>();
        let duration = match (inner.snapshots.front(), inner.snapshots.back()) {
            (Some(first), Some(last)) => (last.wall_time - first.wall_time)
                .num_milliseconds() as f64
                / 1000.0,
            _ => 0.0,
        };
        RecorderStats {
            total_snapshots: inner.snapshots.len(),
            total_events: inner.events.len(),
            memory_usage_bytes: memory,
            recording_duration_seconds: duration,
        }
    }

    /// Write the whole history to a little-endian binary file.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let inner = self.inner.lock();
        let file = File::create(path.as_ref())
            .map_err(|e| Error::resource(format!("cannot create history file: {e}")))?;
        let mut w = BufWriter::new(file);

        w.write_all(&MAGIC.to_le_bytes())?;
        w.write_all(&VERSION.to_le_bytes())?;

        w.write_all(&(inner.snapshots.len() as u64).to_le_bytes())?;
        for snapshot in &inner.snapshots {
            w.write_all(&snapshot.time_minutes.to_le_bytes())?;
            w.write_all(&(snapshot.satellite_count() as u32).to_le_bytes())?;
            for v in &snapshot.x {
                w.write_all(&v.to_le_bytes())?;
            }
            for v in &snapshot.y {
                w.write_all(&v.to_le_bytes())?;
            }
            for v in &snapshot.z {
                w.write_all(&v.to_le_bytes())?;
            }
            for id in &snapshot.catalog_ids {
                w.write_all(&id.to_le_bytes())?;
            }
        }

        w.write_all(&(inner.events.len() as u64).to_le_bytes())?;
        for event in &inner.events {
            for field in [
                event.time_minutes,
                event.catalog_1 as f64,
                event.catalog_2 as f64,
                event.miss_distance_km,
                event.relative_speed_km_s,
                event.collision_probability,
            ] {
                w.write_all(&field.to_le_bytes())?;
            }
        }

        w.flush()?;
        log::info!(
            "exported history: {} snapshots, {} events",
            inner.snapshots.len(),
            inner.events.len()
        );
        Ok(())
    }

    /// Replace the current history with the contents of an exported
    /// file. Wall-clock timestamps are re-stamped at import time.
    pub fn import_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::resource(format!("cannot open history file: {e}")))?;
        let mut r = BufReader::new(file);

        let magic = read_u32(&mut r)?;
        let version = read_u32(&mut r)?;
        if magic != MAGIC {
            return Err(Error::invalid_input(format!(
                "not a history file (magic 0x{magic:08X})"
            )));
        }
        if version != VERSION {
            return Err(Error::invalid_input(format!(
                "unsupported history version {version}"
            )));
        }

        let now = Utc::now();
        let mut snapshots = VecDeque::new();
        let snapshot_count = read_u64(&mut r)?;
        for _ in 0..snapshot_count {
            let time_minutes = read_f64(&mut r)?;
            let count = read_u32(&mut r)? as usize;
            let x = read_f32_array(&mut r, count)?;
            let y = read_f32_array(&mut r, count)?;
            let z = read_f32_array(&mut r, count)?;
            let mut catalog_ids = Vec::with_capacity(count);
            for _ in 0..count {
                catalog_ids.push(read_i32(&mut r)?);
            }
            snapshots.push_back(PositionSnapshot {
                time_minutes,
                wall_time: now,
                x,
                y,
                z,
                catalog_ids,
            });
        }

        let mut events = VecDeque::new();
        let event_count = read_u64(&mut r)?;
        for _ in 0..event_count {
            let time_minutes = read_f64(&mut r)?;
            let catalog_1 = read_f64(&mut r)? as i32;
            let catalog_2 = read_f64(&mut r)? as i32;
            let miss_distance_km = read_f64(&mut r)?;
            let relative_speed_km_s = read_f64(&mut r)?;
            let collision_probability = read_f64(&mut r)?;
            events.push_back(ConjunctionEvent {
                time_minutes,
                wall_time: now,
                catalog_1,
                catalog_2,
                miss_distance_km,
                relative_speed_km_s,
                collision_probability,
            });
        }

        let mut inner = self.inner.lock();
        inner.snapshots = snapshots;
        inner.events = events;
        inner.trim();
        Ok(())
    }
}

fn read_exact<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u32(r: &mut impl Read) -> Result<u32> {
    Ok(u32::from_le_bytes(read_exact(r)?))
}

fn read_u64(r: &mut impl Read) -> Result<u64> {
    Ok(u64::from_le_bytes(read_exact(r)?))
}

fn read_i32(r: &mut impl Read) -> Result<i32> {
    Ok(i32::from_le_bytes(read_exact(r)?))
}

fn read_f64(r: &mut impl Read) -> Result<f64> {
    Ok(f64::from_le_bytes(read_exact(r)?))
}

fn read_f32_array(r: &mut impl Read, count: usize) -> Result<Vec<f32>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(f32::from_le_bytes(read_exact(r)?));
    }
    Ok(out)
}

/// Playback cursor over a recorder's snapshot range.
pub struct TimeScrubber {
    recorder: std::sync::Arc<HistoryRecorder>,
    current_time_minutes: f64,
    playback_speed: f64,
    playing: bool,
    #[allow(clippy::type_complexity)]
    callback: Option<Box<dyn FnMut(f64, Option<&PositionSnapshot>) + Send>>,
}

impl TimeScrubber {
    pub fn new(recorder: std::sync::Arc<HistoryRecorder>) -> Self {
        TimeScrubber {
            recorder,
            current_time_minutes: 0.0,
            playback_speed: 1.0,
            playing: false,
            callback: None,
        }
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Stop playback and rewind to the start of the recorded range.
    pub fn stop(&mut self) {
        self.playing = false;
        if let Some(range) = self.recorder.time_range() {
            self.current_time_minutes = range.start_minutes;
        }
    }

    pub fn seek(&mut self, time_minutes: f64) {
        self.current_time_minutes = time_minutes;
        self.fire_callback();
    }

    /// Playback speed multiplier, clamped to [0.1, 10].
    pub fn set_playback_speed(&mut self, speed: f64) {
        self.playback_speed = speed.clamp(0.1, 10.0);
    }

    pub fn playback_speed(&self) -> f64 {
        self.playback_speed
    }

    pub fn current_time(&self) -> f64 {
        self.current_time_minutes
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn current_snapshot(&self) -> Option<PositionSnapshot> {
        self.recorder.get_snapshot_nearest(self.current_time_minutes)
    }

    pub fn set_callback(
        &mut self,
        callback: impl FnMut(f64, Option<&PositionSnapshot>) + Send + 'static,
    ) {
        self.callback = Some(Box::new(callback));
    }

    /// Advance the cursor by `delta_seconds` of wall time, scaled by the
    /// playback speed. Clamps to the recorded range and auto-pauses at
    /// the end.
    pub fn tick(&mut self, delta_seconds: f64) {
        if !self.playing {
            return;
        }

        self.current_time_minutes += delta_seconds / 60.0 * self.playback_speed;

        if let Some(range) = self.recorder.time_range() {
            if self.current_time_minutes >= range.end_minutes {
                self.current_time_minutes = range.end_minutes;
                self.playing = false;
            }
            if self.current_time_minutes < range.start_minutes {
                self.current_time_minutes = range.start_minutes;
            }
        }

        self.fire_callback();
    }

    fn fire_callback(&mut self) {
        if let Some(callback) = self.callback.as_mut() {
            let snapshot = self.recorder.get_snapshot_nearest(self.current_time_minutes);
            callback(self.current_time_minutes, snapshot.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::elements::ElementRecord;
    use crate::propagator::propagate_all;
    use std::sync::Arc;

    fn small_store(n: usize) -> StateStore {
        let records: Vec<_> = (0..n)
            .map(|i| {
                ElementRecord::new(
                    40000 + i as u32,
                    format!("SAT-{i}"),
                    "24001A",
                    JD_J2000,
                    51.6 * DEG2RAD,
                    (i as f64) * 10.0 * DEG2RAD,
                    0.001,
                    0.0,
                    (i as f64) * 10.0 * DEG2RAD,
                    15.0 * TAU / MIN_PER_DAY,
                    0.0,
                )
            })
            .collect();
        StateStore::from_elements(&records).unwrap()
    }

    fn event(t: f64, a: i32, b: i32) -> ConjunctionEvent {
        ConjunctionEvent {
            time_minutes: t,
            wall_time: Utc::now(),
            catalog_1: a,
            catalog_2: b,
            miss_distance_km: 3.5,
            relative_speed_km_s: 11.0,
            collision_probability: 1e-4,
        }
    }

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cicada-history-{tag}-{}.orbi", std::process::id()))
    }

    #[test]
    fn test_fifo_eviction_keeps_most_recent() {
        let recorder = HistoryRecorder::new(RecorderConfig {
            max_snapshots: 3,
            ..RecorderConfig::default()
        });
        recorder.start();

        let mut store = small_store(2);
        for k in 0..5 {
            propagate_all(&mut store, k as f64);
            recorder.record_snapshot(&store, k as f64);
        }

        let snapshots = recorder.snapshots();
        assert_eq!(snapshots.len(), 3);
        let times: Vec<f64> = snapshots.iter().map(|s| s.time_minutes).collect();
        assert_eq!(times, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_not_recording_is_noop() {
        let recorder = HistoryRecorder::default();
        let mut store = small_store(1);
        propagate_all(&mut store, 0.0);
        recorder.record_snapshot(&store, 0.0);
        recorder.record_event(event(0.0, 1, 2));
        assert!(recorder.snapshots().is_empty());
        assert!(recorder.events().is_empty());

        recorder.start();
        recorder.record_snapshot(&store, 0.0);
        assert_eq!(recorder.snapshots().len(), 1);
        recorder.stop();
        recorder.record_snapshot(&store, 1.0);
        assert_eq!(recorder.snapshots().len(), 1);
    }

    #[test]
    fn test_snapshot_lookup_exact_and_nearest() {
        let recorder = HistoryRecorder::default();
        recorder.start();
        let mut store = small_store(2);
        for k in 0..4 {
            propagate_all(&mut store, k as f64 * 10.0);
            recorder.record_snapshot(&store, k as f64 * 10.0);
        }

        assert!(recorder.get_snapshot_at(20.0).is_some());
        assert!(recorder.get_snapshot_at(20.0005).is_some());
        assert!(recorder.get_snapshot_at(15.0).is_none());

        // Nearest of the bracketing pair
        assert_eq!(recorder.get_snapshot_nearest(14.0).unwrap().time_minutes, 10.0);
        assert_eq!(recorder.get_snapshot_nearest(16.0).unwrap().time_minutes, 20.0);
        // Out-of-range clamps to the ends
        assert_eq!(recorder.get_snapshot_nearest(-5.0).unwrap().time_minutes, 0.0);
        assert_eq!(recorder.get_snapshot_nearest(99.0).unwrap().time_minutes, 30.0);
    }

    #[test]
    fn test_event_queries() {
        let recorder = HistoryRecorder::default();
        recorder.start();
        recorder.record_event(event(1.0, 100, 200));
        recorder.record_event(event(2.0, 100, 300));
        recorder.record_event(event(9.0, 400, 500));

        assert_eq!(recorder.events_between(0.0, 5.0).len(), 2);
        assert_eq!(recorder.events_for(100).len(), 2);
        assert_eq!(recorder.events_for(500).len(), 1);
        assert_eq!(recorder.events_for(999).len(), 0);
    }

    #[test]
    fn test_events_disabled() {
        let recorder = HistoryRecorder::new(RecorderConfig {
            record_conjunctions: false,
            ..RecorderConfig::default()
        });
        recorder.start();
        recorder.record_event(event(1.0, 1, 2));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_export_import_round_trip() {
        let recorder = HistoryRecorder::default();
        recorder.start();
        let mut store = small_store(3);
        for k in 0..3 {
            propagate_all(&mut store, k as f64 * 5.0);
            recorder.record_snapshot(&store, k as f64 * 5.0);
        }
        recorder.record_event(event(2.5, 40000, 40001));
        recorder.record_event(event(7.5, 40001, 40002));

        let path = temp_path("roundtrip");
        recorder.export_to_file(&path).unwrap();

        let restored = HistoryRecorder::default();
        restored.import_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let original_snaps = recorder.snapshots();
        let restored_snaps = restored.snapshots();
        assert_eq!(original_snaps.len(), restored_snaps.len());
        for (a, b) in original_snaps.iter().zip(&restored_snaps) {
            assert_eq!(a.time_minutes, b.time_minutes);
            assert_eq!(a.x, b.x);
            assert_eq!(a.y, b.y);
            assert_eq!(a.z, b.z);
            assert_eq!(a.catalog_ids, b.catalog_ids);
        }

        let original_events = recorder.events();
        let restored_events = restored.events();
        assert_eq!(original_events.len(), restored_events.len());
        for (a, b) in original_events.iter().zip(&restored_events) {
            assert_eq!(a.time_minutes, b.time_minutes);
            assert_eq!(a.catalog_1, b.catalog_1);
            assert_eq!(a.catalog_2, b.catalog_2);
            assert_eq!(a.miss_distance_km, b.miss_distance_km);
            assert_eq!(a.relative_speed_km_s, b.relative_speed_km_s);
            assert_eq!(a.collision_probability, b.collision_probability);
        }
    }

    #[test]
    fn test_import_rejects_bad_magic() {
        let path = temp_path("badmagic");
        std::fs::write(&path, b"NOPE\x01\x00\x00\x00").unwrap();
        let recorder = HistoryRecorder::default();
        let err = recorder.import_from_file(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_scrubber_tick_and_autopause() {
        let recorder = Arc::new(HistoryRecorder::default());
        recorder.start();
        let mut store = small_store(1);
        for k in 0..3 {
            propagate_all(&mut store, k as f64);
            recorder.record_snapshot(&store, k as f64); // 0, 1, 2 minutes
        }

        let mut scrubber = TimeScrubber::new(recorder);
        scrubber.set_playback_speed(2.0);
        scrubber.play();

        // 30 s at 2x = 1 simulated minute
        scrubber.tick(30.0);
        assert!((scrubber.current_time() - 1.0).abs() < 1e-12);
        assert!(scrubber.is_playing());

        // Run past the end: clamps and auto-pauses
        scrubber.tick(3600.0);
        assert_eq!(scrubber.current_time(), 2.0);
        assert!(!scrubber.is_playing());

        // Paused ticks do nothing
        scrubber.tick(30.0);
        assert_eq!(scrubber.current_time(), 2.0);
    }

    #[test]
    fn test_scrubber_speed_clamped() {
        let recorder = Arc::new(HistoryRecorder::default());
        let mut scrubber = TimeScrubber::new(recorder);
        scrubber.set_playback_speed(100.0);
        assert_eq!(scrubber.playback_speed(), 10.0);
        scrubber.set_playback_speed(0.0);
        assert_eq!(scrubber.playback_speed(), 0.1);
    }

    #[test]
    fn test_scrubber_callback_sees_nearest() {
        let recorder = Arc::new(HistoryRecorder::default());
        recorder.start();
        let mut store = small_store(1);
        for k in 0..3 {
            propagate_all(&mut store, k as f64 * 10.0);
            recorder.record_snapshot(&store, k as f64 * 10.0);
        }

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_inner = Arc::clone(&seen);
        let mut scrubber = TimeScrubber::new(recorder);
        scrubber.set_callback(move |t, snapshot| {
            seen_inner.lock().push((t, snapshot.map(|s| s.time_minutes)));
        });

        scrubber.seek(12.0);
        let calls = seen.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (12.0, Some(10.0)));
    }

    #[test]
    fn test_stats_and_range() {
        let recorder = HistoryRecorder::default();
        assert!(recorder.time_range().is_none());

        recorder.start();
        let mut store = small_store(2);
        for k in 0..3 {
            propagate_all(&mut store, k as f64);
            recorder.record_snapshot(&store, k as f64);
        }
        recorder.record_event(event(1.0, 1, 2));

        let range = recorder.time_range().unwrap();
        assert_eq!(range.start_minutes, 0.0);
        assert_eq!(range.end_minutes, 2.0);
        assert_eq!(range.snapshot_count, 3);
        assert_eq!(range.event_count, 1);

        let stats = recorder.stats();
        assert_eq!(stats.total_snapshots, 3);
        assert!(stats.memory_usage_bytes > 0);
    }
}
