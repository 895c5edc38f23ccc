use std::ops::Range;
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::{Batch, BatchConfig, CancelToken, ReorderPolicy, Schedule, chunk_ranges, partition};
use crate::error::{Error, Result};
use crate::kernels::Kernel;
use crate::matrix::{GemmShape, MatrixView, MatrixViewMut};

/// Timing of one reorder + multiply iteration over a whole batch.
#[derive(Clone, Debug)]
pub struct IterationReport {
    pub iteration: usize,
    /// Wall time of both phases
    pub elapsed: Duration,
    /// Whether the reorder phase ran
    pub reordered: bool,
    pub triples: usize,
    pub triples_per_sec: f64,
    pub gflops: f64,
}

impl IterationReport {
    fn new(iteration: usize, elapsed: Duration, reordered: bool, triples: usize, shape: GemmShape) -> Self {
        let secs = elapsed.as_secs_f64().max(1e-9);
        IterationReport {
            iteration,
            elapsed,
            reordered,
            triples,
            triples_per_sec: triples as f64 / secs,
            gflops: triples as f64 * shape.flops() / secs / 1e9,
        }
    }
}

/// Outcome of [`BatchRunner::run`].
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Iterations that ran to completion
    pub iterations: usize,
    pub total_elapsed: Duration,
    pub best_triples_per_sec: f64,
    /// True if the run stopped because of the cancel token
    pub cancelled: bool,
}

/// Runs batches with one kernel under one [`BatchConfig`].
///
/// With [`Schedule::Pooled`] the worker pool is created here and reused by
/// every phase of every iteration.
pub struct BatchRunner<'k> {
    kernel: &'k dyn Kernel,
    config: BatchConfig,
    pool: Option<ThreadPool>,
}

impl<'k> BatchRunner<'k> {
    /// Validate `config` for `kernel` and start the workers it needs.
    pub fn new(config: BatchConfig, kernel: &'k dyn Kernel) -> Result<Self> {
        config.validate(kernel.tile())?;

        let pool = match config.schedule {
            Schedule::Static => None,
            Schedule::Pooled { .. } => Some(
                ThreadPoolBuilder::new()
                    .num_threads(config.threads)
                    .thread_name(|i| format!("gemm-{i}"))
                    .build()?,
            ),
        };
        log::debug!(
            "batch runner: kernel {}, {} threads, {:?}, reorder {:?}",
            kernel.name(),
            config.threads,
            config.schedule,
            config.reorder
        );

        Ok(BatchRunner { kernel, config, pool })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn kernel(&self) -> &'k dyn Kernel {
        self.kernel
    }

    /// Run one iteration: reorder phase (unless the policy skips it), then
    /// multiply phase.
    ///
    /// # Errors
    ///
    /// Fails without touching the batch if it is empty, its shape does not
    /// fit the kernel's tile, or the static schedule cannot split it evenly.
    pub fn run_iteration(&self, batch: &mut Batch, iteration: usize) -> Result<IterationReport> {
        let ranges = self.work_ranges(batch)?;
        let tile = self.kernel.tile();
        let start = Instant::now();

        let reordered = match self.config.reorder {
            ReorderPolicy::Skip => false,
            ReorderPolicy::Once if batch.has_panels_for(tile) => false,
            ReorderPolicy::Once | ReorderPolicy::EveryIteration => {
                self.reorder_phase(batch, &ranges);
                true
            }
        };
        self.multiply_phase(batch, &ranges, self.config.reorder != ReorderPolicy::Skip);

        Ok(IterationReport::new(
            iteration,
            start.elapsed(),
            reordered,
            batch.len(),
            batch.shape(),
        ))
    }

    /// Run iterations until the configured count is reached or `cancel` is
    /// set, calling `on_report` after each one.
    ///
    /// The token is checked between iterations only.
    pub fn run(
        &self,
        batch: &mut Batch,
        cancel: &CancelToken,
        mut on_report: impl FnMut(&IterationReport),
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary::default();

        while self.config.iterations.is_none_or(|limit| summary.iterations < limit) {
            if cancel.is_cancelled() {
                log::warn!("batch run cancelled after {} iterations", summary.iterations);
                summary.cancelled = true;
                break;
            }

            let report = self.run_iteration(batch, summary.iterations)?;
            log::info!(
                "iteration {}: {:.3?}, {:.0} triples/s, {:.2} GFLOP/s{}",
                report.iteration,
                report.elapsed,
                report.triples_per_sec,
                report.gflops,
                if report.reordered { "" } else { " (no reorder)" }
            );
            summary.best_triples_per_sec = summary.best_triples_per_sec.max(report.triples_per_sec);
            summary.iterations += 1;
            on_report(&report);
        }

        summary.total_elapsed = start.elapsed();
        log::info!(
            "ran {} iterations in {:.3?}, best {:.0} triples/s",
            summary.iterations,
            summary.total_elapsed,
            summary.best_triples_per_sec
        );
        Ok(summary)
    }

    /// Triple indices of each work item, consecutive from 0.
    fn work_ranges(&self, batch: &Batch) -> Result<Vec<Range<usize>>> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let tile = self.kernel.tile();
        if !batch.shape().fits(tile) {
            return Err(Error::IndivisibleShape {
                shape: batch.shape(),
                tile,
            });
        }

        match self.config.schedule {
            Schedule::Static => partition(batch.len(), self.config.threads),
            Schedule::Pooled { chunk } => Ok(chunk_ranges(batch.len(), chunk)),
        }
    }

    /// Run `task` on every item and return once all of them are done.
    fn for_each_item<T: Send>(&self, items: Vec<T>, task: impl Fn(T) + Sync) {
        match &self.pool {
            Some(pool) => pool.install(|| items.into_par_iter().for_each(&task)),
            None => thread::scope(|scope| {
                for item in items {
                    let task = &task;
                    scope.spawn(move || task(item));
                }
            }),
        }
    }

    fn reorder_phase(&self, batch: &mut Batch, ranges: &[Range<usize>]) {
        batch.ensure_panels();

        let shape = batch.shape;
        let (a_len, b_len) = (shape.a_len(), shape.b_len());
        let kernel = self.kernel;

        let items: Vec<_> = split_ranges(&batch.a, ranges, a_len)
            .into_iter()
            .zip(split_ranges(&batch.b, ranges, b_len))
            .zip(split_ranges_mut(&mut batch.a_panels, ranges, a_len))
            .zip(split_ranges_mut(&mut batch.b_panels, ranges, b_len))
            .map(|(((a, b), a_out), b_out)| (a, b, a_out, b_out))
            .collect();

        self.for_each_item(items, |(a, b, a_out, b_out)| {
            let triples = a
                .chunks_exact(a_len)
                .zip(b.chunks_exact(b_len))
                .zip(a_out.chunks_exact_mut(a_len))
                .zip(b_out.chunks_exact_mut(b_len));
            for (((a, b), a_out), b_out) in triples {
                kernel.reorder(
                    MatrixView::new(a, shape.m, shape.k),
                    MatrixView::new(b, shape.k, shape.n),
                    a_out,
                    b_out,
                );
            }
        });

        batch.panels_tile = Some(kernel.tile());
    }

    fn multiply_phase(&self, batch: &mut Batch, ranges: &[Range<usize>], packed: bool) {
        let shape = batch.shape;
        let (a_len, b_len, c_len) = (shape.a_len(), shape.b_len(), shape.c_len());
        let kernel = self.kernel;

        let (a_src, b_src) = if packed {
            (&batch.a_panels, &batch.b_panels)
        } else {
            (&batch.a, &batch.b)
        };
        let items: Vec<_> = split_ranges(a_src, ranges, a_len)
            .into_iter()
            .zip(split_ranges(b_src, ranges, b_len))
            .zip(split_ranges_mut(&mut batch.c, ranges, c_len))
            .map(|((a, b), c)| (a, b, c))
            .collect();

        self.for_each_item(items, |(a, b, c)| {
            let triples = a
                .chunks_exact(a_len)
                .zip(b.chunks_exact(b_len))
                .zip(c.chunks_exact_mut(c_len));
            for ((a, b), c) in triples {
                let c = MatrixViewMut::new(c, shape.m, shape.n);
                if packed {
                    kernel.multiply_packed(a, b, c, shape);
                } else {
                    kernel.multiply_unpacked(
                        MatrixView::new(a, shape.m, shape.k),
                        MatrixView::new(b, shape.k, shape.n),
                        c,
                    );
                }
            }
        });
    }
}

/// The elements of each range of triples, `stride` elements per triple.
fn split_ranges<'a>(data: &'a [f32], ranges: &[Range<usize>], stride: usize) -> Vec<&'a [f32]> {
    ranges
        .iter()
        .map(|range| &data[range.start * stride..range.end * stride])
        .collect()
}

/// Like [`split_ranges`], handing out disjoint mutable slices. The ranges
/// must be consecutive from 0.
fn split_ranges_mut<'a>(mut data: &'a mut [f32], ranges: &[Range<usize>], stride: usize) -> Vec<&'a mut [f32]> {
    let mut parts = Vec::with_capacity(ranges.len());
    for range in ranges {
        let (part, rest) = std::mem::take(&mut data).split_at_mut(range.len() * stride);
        parts.push(part);
        data = rest;
    }
    parts
}
