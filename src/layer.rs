//! Shared weight matrices.
//!
//! Training is lock-free: every worker reads and writes the same matrices
//! without synchronization, and lost updates are accepted. The storage type
//! makes that legal in Rust by keeping each weight in an `AtomicU32` and only
//! ever using relaxed loads and stores.

use std::sync::atomic::{AtomicU32, Ordering};

use aligned_box::AlignedBox;
use log::error;

use crate::real;
use crate::rng::Rng;

/// Matrices are aligned for SIMD loads.
const ALIGNMENT: usize = 128;

/// An `f32` that any thread may read or write at any time.
///
/// `add` is a plain read followed by a write, not an atomic
/// read-modify-write. Concurrent adds to the same weight can lose one of the
/// updates.
#[derive(Default)]
#[repr(transparent)]
pub struct RacyReal {
    bits: AtomicU32,
}

impl RacyReal {
    pub fn get(&self) -> real {
        real::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: real) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn add(&self, x: real) {
        let a = self.get();
        self.set(a + x);
    }
}

impl std::fmt::Debug for RacyReal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.get(), f)
    }
}

/// A `rows x cols` row-major matrix of [`RacyReal`].
pub struct LookupLayer {
    rows: usize,
    cols: usize,
    data: AlignedBox<[RacyReal]>,
}

impl LookupLayer {
    /// An all-zero matrix.
    ///
    /// Running out of memory here is unrecoverable; the process is aborted
    /// after logging the size that was requested.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        // AlignedBox cannot hold a zero-sized slice.
        let len = (rows * cols).max(1);
        let data = match AlignedBox::slice_from_default(ALIGNMENT, len) {
            Ok(data) => data,
            Err(err) => {
                error!("Memory allocation failed for a {rows}x{cols} matrix: {err}");
                std::process::abort();
            }
        };
        LookupLayer { rows, cols, data }
    }

    /// A matrix with every weight drawn uniformly from `[-0.5/cols, 0.5/cols)`.
    pub fn random(rows: usize, cols: usize, rng: &mut Rng) -> Self {
        let layer = LookupLayer::zeros(rows, cols);
        for w in layer.weights() {
            w.set((rng.rand_real() - 0.5) / cols as real);
        }
        layer
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn weights(&self) -> &[RacyReal] {
        &self.data[..self.rows * self.cols]
    }

    /// # Panics
    ///
    /// If `r` is out of range.
    pub fn row(&self, r: usize) -> &[RacyReal] {
        assert!(r < self.rows, "row {r} out of range for {} rows", self.rows);
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_to_vec(&self, r: usize) -> Vec<real> {
        self.row(r).iter().map(RacyReal::get).collect()
    }

    /// Snapshot of the whole matrix, row-major.
    pub fn to_vec(&self) -> Vec<real> {
        self.weights().iter().map(RacyReal::get).collect()
    }

    /// Overwrite the matrix from a row-major slice.
    ///
    /// # Panics
    ///
    /// If `values` has the wrong length.
    pub fn load(&self, values: &[real]) {
        assert_eq!(values.len(), self.rows * self.cols);
        for (w, &v) in self.weights().iter().zip(values) {
            w.set(v);
        }
    }
}

impl std::fmt::Debug for LookupLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupLayer")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish_non_exhaustive()
    }
}

/// Dot product of a plain vector with a shared row.
pub fn row_dot(x: &[real], row: &[RacyReal]) -> real {
    debug_assert_eq!(x.len(), row.len());
    x.iter().zip(row).map(|(&a, b)| a * b.get()).sum()
}

/// `row += g * x`
pub fn row_add_scaled(row: &[RacyReal], g: real, x: &[real]) {
    debug_assert_eq!(x.len(), row.len());
    for (w, &v) in row.iter().zip(x) {
        w.add(g * v);
    }
}

/// `acc += g * row`
pub fn accumulate(acc: &mut [real], g: real, row: &[RacyReal]) {
    debug_assert_eq!(acc.len(), row.len());
    for (a, w) in acc.iter_mut().zip(row) {
        *a += g * w.get();
    }
}
