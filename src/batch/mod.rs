//! Batched GEMM: many independent triples of one shape, run in two phases.
//!
//! Every iteration first reorders all operands into panels, then multiplies
//! all of them. Each phase ends with a barrier, so no multiply starts before
//! every reorder of the same iteration has finished. Workers only ever see
//! disjoint sub-slices of the batch storage.
//!
//! ```no_run
//! use panel_gemm::batch::{Batch, BatchConfig, BatchRunner, CancelToken};
//! use panel_gemm::select_kernel;
//!
//! let config = BatchConfig { iterations: Some(3), ..BatchConfig::from_env()? };
//! let runner = BatchRunner::new(config.clone(), select_kernel())?;
//! let mut batch = Batch::sequential(config.shape, config.batch);
//!
//! let summary = runner.run(&mut batch, &CancelToken::new(), |report| {
//!     println!("{:.0} triples/s", report.triples_per_sec);
//! })?;
//! assert_eq!(summary.iterations, 3);
//! # Ok::<(), panel_gemm::Error>(())
//! ```

mod cancel;
mod config;
mod partition;
mod runner;

pub use cancel::CancelToken;
pub use config::{
    BATCH_SIZE_VAR, BatchConfig, ITERATIONS_VAR, ReorderPolicy, SCHEDULE_VAR, Schedule, THREADS_VAR,
};
pub use partition::{chunk_ranges, partition};
pub use runner::{BatchRunner, IterationReport, RunSummary};

use crate::matrix::{GemmShape, MatrixView, MatrixViewMut, TileDims};

/// Storage for `len` GEMM triples sharing one shape.
///
/// A, B and C of all triples live in three contiguous buffers, triple `i`
/// at offset `i * m·k`, `i * k·n` and `i * m·n`. The reordered panels are
/// allocated the first time a reorder phase needs them and remember the
/// tile they were packed for.
#[derive(Clone, Debug)]
pub struct Batch {
    shape: GemmShape,
    len: usize,
    a: Vec<f32>,
    b: Vec<f32>,
    c: Vec<f32>,
    a_panels: Vec<f32>,
    b_panels: Vec<f32>,
    panels_tile: Option<TileDims>,
}

impl Batch {
    /// Zero-filled batch.
    pub fn new(shape: GemmShape, len: usize) -> Self {
        Self::from_fn(shape, len, |_| 0.0, |_| 0.0)
    }

    /// Batch whose A and B buffers hold their own flat index, `0, 1, 2, ...`
    /// across the whole batch.
    pub fn sequential(shape: GemmShape, len: usize) -> Self {
        Self::from_fn(shape, len, |i| i as f32, |i| i as f32)
    }

    /// Batch with A and B filled from their flat index in the batch buffers.
    ///
    /// # Panics
    ///
    /// Panics if any dimension of `shape` is zero.
    pub fn from_fn(
        shape: GemmShape,
        len: usize,
        a: impl FnMut(usize) -> f32,
        b: impl FnMut(usize) -> f32,
    ) -> Self {
        assert!(!shape.is_empty(), "shape {} has a zero dimension", shape);
        log::debug!("allocating batch of {} triples of {}", len, shape);
        Batch {
            shape,
            len,
            a: (0..len * shape.a_len()).map(a).collect(),
            b: (0..len * shape.b_len()).map(b).collect(),
            c: vec![0.0; len * shape.c_len()],
            a_panels: Vec::new(),
            b_panels: Vec::new(),
            panels_tile: None,
        }
    }

    pub fn shape(&self) -> GemmShape {
        self.shape
    }

    /// Number of triples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn a(&self, i: usize) -> MatrixView<'_> {
        let len = self.shape.a_len();
        MatrixView::new(&self.a[i * len..(i + 1) * len], self.shape.m, self.shape.k)
    }

    pub fn b(&self, i: usize) -> MatrixView<'_> {
        let len = self.shape.b_len();
        MatrixView::new(&self.b[i * len..(i + 1) * len], self.shape.k, self.shape.n)
    }

    /// Result of triple `i` from the last multiply phase.
    pub fn c(&self, i: usize) -> MatrixView<'_> {
        let len = self.shape.c_len();
        MatrixView::new(&self.c[i * len..(i + 1) * len], self.shape.m, self.shape.n)
    }

    /// Mutable A of triple `i`. Drops the cached panels.
    pub fn a_mut(&mut self, i: usize) -> MatrixViewMut<'_> {
        self.panels_tile = None;
        let len = self.shape.a_len();
        MatrixViewMut::new(&mut self.a[i * len..(i + 1) * len], self.shape.m, self.shape.k)
    }

    /// Mutable B of triple `i`. Drops the cached panels.
    pub fn b_mut(&mut self, i: usize) -> MatrixViewMut<'_> {
        self.panels_tile = None;
        let len = self.shape.b_len();
        MatrixViewMut::new(&mut self.b[i * len..(i + 1) * len], self.shape.k, self.shape.n)
    }

    /// C of every triple, back to back.
    pub fn outputs(&self) -> &[f32] {
        &self.c
    }

    /// True if the panels hold the current operands in `tile`'s layout.
    pub fn has_panels_for(&self, tile: TileDims) -> bool {
        self.panels_tile == Some(tile)
    }

    fn ensure_panels(&mut self) {
        if self.a_panels.is_empty() {
            log::debug!("allocating panels for {} triples", self.len);
            self.a_panels = vec![0.0; self.a.len()];
            self.b_panels = vec![0.0; self.b.len()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_views() {
        let shape = GemmShape::new(2, 3, 4);
        let batch = Batch::sequential(shape, 3);

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.a(1).row(0), &[8.0, 9.0, 10.0, 11.0]);
        assert_eq!(batch.b(2).get(0, 0), 24.0);
        assert_eq!(batch.outputs().len(), 3 * 6);
        assert!(batch.outputs().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_writes_drop_panels() {
        let tile = TileDims::new(4, 4, 4);
        let mut batch = Batch::new(GemmShape::new(4, 4, 4), 2);
        batch.ensure_panels();
        batch.panels_tile = Some(tile);
        assert!(batch.has_panels_for(tile));

        batch.b_mut(1).row_mut(0)[0] = 1.0;

        assert!(!batch.has_panels_for(tile));
        assert_eq!(batch.b(1).get(0, 0), 1.0);
    }

    #[test]
    #[should_panic(expected = "has a zero dimension")]
    fn test_rejects_empty_shape() {
        Batch::new(GemmShape::new(4, 0, 4), 1);
    }
}
