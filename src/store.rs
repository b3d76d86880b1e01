//! Structure-of-Arrays state store.
//!
//! The hot state of the whole engine lives here: one contiguous column
//! per field, 14 columns of `f64` (position, velocity, and the eight
//! propagation elements), plus cold side-car arrays for catalog numbers
//! and names. Columns are 64-byte aligned and over-allocated to a whole
//! number of SIMD lanes so a vectorized loop has no ragged tail.
//!
//! The store is exclusively owned and move-only. Readers get a
//! [`StateView`] that bundles the column slices with the common length.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::elements::ElementRecord;
use crate::error::{Error, Result};

/// Column alignment in bytes, wide enough for current SIMD registers.
pub const COLUMN_ALIGN: usize = 64;

const LANE_DOUBLES: usize = COLUMN_ALIGN / std::mem::size_of::<f64>();

/// An owned, aligned, fixed-length buffer of `f64`.
///
/// Replaces hand-managed raw-pointer columns with a single RAII type:
/// allocation and release live here and nowhere else. Not `Clone` — a
/// column moves with its store.
#[derive(Debug)]
pub struct AlignedColumn {
    ptr: NonNull<f64>,
    len: usize,
    cap: usize,
}

// The buffer is uniquely owned plain data.
unsafe impl Send for AlignedColumn {}
unsafe impl Sync for AlignedColumn {}

impl AlignedColumn {
    /// Allocate a zero-filled column of `len` doubles.
    pub fn zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(AlignedColumn {
                ptr: NonNull::dangling(),
                len: 0,
                cap: 0,
            });
        }

        let cap = len.div_ceil(LANE_DOUBLES) * LANE_DOUBLES;
        let layout = Self::layout(cap)?;
        let raw = unsafe { alloc_zeroed(layout) }.cast::<f64>();
        let ptr = NonNull::new(raw)
            .ok_or_else(|| Error::resource(format!("failed to allocate column of {len} doubles")))?;

        Ok(AlignedColumn { ptr, len, cap })
    }

    /// Allocate a column initialized from `values`.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let mut col = Self::zeroed(values.len())?;
        col.copy_from_slice(values);
        Ok(col)
    }

    fn layout(cap: usize) -> Result<Layout> {
        Layout::from_size_align(cap * std::mem::size_of::<f64>(), COLUMN_ALIGN)
            .map_err(|e| Error::resource(format!("bad column layout: {e}")))
    }
}

impl Deref for AlignedColumn {
    type Target = [f64];
    fn deref(&self) -> &[f64] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedColumn {
    fn deref_mut(&mut self) -> &mut [f64] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedColumn {
    fn drop(&mut self) {
        if self.cap > 0 {
            // Same layout as allocation; cap is already lane-rounded.
            let layout = Layout::from_size_align(
                self.cap * std::mem::size_of::<f64>(),
                COLUMN_ALIGN,
            )
            .expect("column layout was valid at allocation");
            unsafe { dealloc(self.ptr.as_ptr().cast(), layout) };
        }
    }
}

/// The Structure-of-Arrays satellite population.
///
/// Length is fixed at construction; to grow the population, rebuild the
/// store from a merged element set. Position and velocity columns carry
/// no meaning until the propagator has been applied at least once.
#[derive(Debug)]
pub struct StateStore {
    len: usize,

    // Hot data, written every propagation pass
    pub(crate) x: AlignedColumn,
    pub(crate) y: AlignedColumn,
    pub(crate) z: AlignedColumn,
    pub(crate) vx: AlignedColumn,
    pub(crate) vy: AlignedColumn,
    pub(crate) vz: AlignedColumn,

    // Propagation elements, fixed after construction
    pub(crate) inc: AlignedColumn,
    pub(crate) raan0: AlignedColumn,
    pub(crate) ecc: AlignedColumn,
    pub(crate) argp0: AlignedColumn,
    pub(crate) m0: AlignedColumn,
    pub(crate) n0: AlignedColumn,
    pub(crate) a0: AlignedColumn,
    pub(crate) bstar: AlignedColumn,

    // Cold side-cars
    catalog_numbers: Vec<u32>,
    names: Vec<String>,
    epoch_jds: Vec<f64>,
}

impl StateStore {
    /// Build a store from element records.
    ///
    /// Validates each record: eccentricity in [0, 1), strictly positive
    /// mean motion, finite angles. The first violation aborts the build
    /// with an invalid-input error naming the offending object.
    pub fn from_elements(records: &[ElementRecord]) -> Result<Self> {
        for (i, rec) in records.iter().enumerate() {
            if !(0.0..1.0).contains(&rec.eccentricity) || !rec.eccentricity.is_finite() {
                return Err(Error::invalid_input(format!(
                    "object {} (catalog {}): eccentricity {} outside [0, 1)",
                    i, rec.catalog_number, rec.eccentricity
                )));
            }
            if !(rec.mean_motion > 0.0) || !rec.mean_motion.is_finite() {
                return Err(Error::invalid_input(format!(
                    "object {} (catalog {}): mean motion {} must be positive",
                    i, rec.catalog_number, rec.mean_motion
                )));
            }
            let angles = [rec.inclination, rec.raan, rec.arg_perigee, rec.mean_anomaly];
            if angles.iter().any(|a| !a.is_finite()) {
                return Err(Error::invalid_input(format!(
                    "object {} (catalog {}): non-finite angle",
                    i, rec.catalog_number
                )));
            }
        }

        let n = records.len();
        let collect = |f: fn(&ElementRecord) -> f64| -> Vec<f64> { records.iter().map(f).collect() };

        let store = StateStore {
            len: n,
            x: AlignedColumn::zeroed(n)?,
            y: AlignedColumn::zeroed(n)?,
            z: AlignedColumn::zeroed(n)?,
            vx: AlignedColumn::zeroed(n)?,
            vy: AlignedColumn::zeroed(n)?,
            vz: AlignedColumn::zeroed(n)?,
            inc: AlignedColumn::from_slice(&collect(|r| r.inclination))?,
            raan0: AlignedColumn::from_slice(&collect(|r| r.raan))?,
            ecc: AlignedColumn::from_slice(&collect(|r| r.eccentricity))?,
            argp0: AlignedColumn::from_slice(&collect(|r| r.arg_perigee))?,
            m0: AlignedColumn::from_slice(&collect(|r| r.mean_anomaly))?,
            n0: AlignedColumn::from_slice(&collect(|r| r.mean_motion))?,
            a0: AlignedColumn::from_slice(&collect(|r| r.semi_major_axis))?,
            bstar: AlignedColumn::from_slice(&collect(|r| r.bstar))?,
            catalog_numbers: records.iter().map(|r| r.catalog_number).collect(),
            names: records.iter().map(|r| r.name.clone()).collect(),
            epoch_jds: records.iter().map(|r| r.epoch_jd).collect(),
        };

        log::debug!("state store built: {} objects, 14 aligned columns", n);
        Ok(store)
    }

    /// Number of objects. Equal to every column length.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read-only view over all 14 columns.
    pub fn view(&self) -> StateView<'_> {
        StateView::new(self)
    }

    /// Current position of object `i` (km).
    pub fn position(&self, i: usize) -> [f64; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    /// Current velocity of object `i` (km/s).
    pub fn velocity(&self, i: usize) -> [f64; 3] {
        [self.vx[i], self.vy[i], self.vz[i]]
    }

    pub fn catalog_number(&self, i: usize) -> u32 {
        self.catalog_numbers[i]
    }

    pub fn name(&self, i: usize) -> &str {
        &self.names[i]
    }

    /// Element epoch of object `i` as a Julian date.
    pub fn epoch_jd(&self, i: usize) -> f64 {
        self.epoch_jds[i]
    }

    pub fn catalog_numbers(&self) -> &[u32] {
        &self.catalog_numbers
    }

    /// Index of the object with the given catalog number, if present.
    pub fn index_of(&self, catalog_number: u32) -> Option<usize> {
        self.catalog_numbers.iter().position(|&c| c == catalog_number)
    }
}

/// Read-only bundle of the 14 column slices plus the common length.
///
/// Construction asserts that every column matches the store length, so a
/// view in hand is proof the invariant holds.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    pub len: usize,
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub z: &'a [f64],
    pub vx: &'a [f64],
    pub vy: &'a [f64],
    pub vz: &'a [f64],
    pub inc: &'a [f64],
    pub raan0: &'a [f64],
    pub ecc: &'a [f64],
    pub argp0: &'a [f64],
    pub m0: &'a [f64],
    pub n0: &'a [f64],
    pub a0: &'a [f64],
    pub bstar: &'a [f64],
}

impl<'a> StateView<'a> {
    fn new(store: &'a StateStore) -> Self {
        let view = StateView {
            len: store.len,
            x: &store.x,
            y: &store.y,
            z: &store.z,
            vx: &store.vx,
            vy: &store.vy,
            vz: &store.vz,
            inc: &store.inc,
            raan0: &store.raan0,
            ecc: &store.ecc,
            argp0: &store.argp0,
            m0: &store.m0,
            n0: &store.n0,
            a0: &store.a0,
            bstar: &store.bstar,
        };

        let columns = [
            view.x.len(),
            view.y.len(),
            view.z.len(),
            view.vx.len(),
            view.vy.len(),
            view.vz.len(),
            view.inc.len(),
            view.raan0.len(),
            view.ecc.len(),
            view.argp0.len(),
            view.m0.len(),
            view.n0.len(),
            view.a0.len(),
            view.bstar.len(),
        ];
        assert!(
            columns.iter().all(|&l| l == view.len),
            "state store column lengths diverged"
        );

        view
    }

    /// Position of object `i` (km).
    pub fn position(&self, i: usize) -> [f64; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    /// Velocity of object `i` (km/s).
    pub fn velocity(&self, i: usize) -> [f64; 3] {
        [self.vx[i], self.vy[i], self.vz[i]]
    }
}
