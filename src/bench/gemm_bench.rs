use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use panel_gemm::batch::{Batch, BatchConfig, BatchRunner, ReorderPolicy, Schedule};
use panel_gemm::{
    GemmShape, Kernel, MatrixView, MatrixViewMut, PanelBuffer, available_kernels, multiply_panel,
    reference_multiply,
};

/// Shapes divisible by every kernel tile and by the 24/40 panel widths.
const SHAPES: &[(&str, GemmShape)] = &[
    ("64x120x64", GemmShape::new(64, 120, 64)),
    ("256x240x128", GemmShape::new(256, 240, 128)),
];

fn make_operands(shape: GemmShape) -> (Vec<f32>, Vec<f32>) {
    let a = (0..shape.a_len()).map(|i| (i % 17) as f32 / 17.0).collect();
    let b = (0..shape.b_len()).map(|i| (i % 13) as f32 / 13.0).collect();
    (a, b)
}

fn bench_single(c: &mut Criterion) {
    for &(label, shape) in SHAPES {
        let mut group = c.benchmark_group(format!("gemm/{label}"));
        group.throughput(Throughput::Elements((shape.m * shape.n * shape.k) as u64));

        let (a, b) = make_operands(shape);
        let a = MatrixView::new(&a, shape.m, shape.k);
        let b = MatrixView::new(&b, shape.k, shape.n);
        let mut out = vec![0.0f32; shape.c_len()];

        group.bench_function("baseline", |bench| {
            bench.iter(|| {
                reference_multiply(black_box(a), black_box(b), MatrixViewMut::new(&mut out, shape.m, shape.n))
            });
        });

        for kernel in available_kernels() {
            let panels = PanelBuffer::pack(kernel, a, b);

            group.bench_function(BenchmarkId::new("packed", kernel.name()), |bench| {
                bench.iter(|| panels.multiply(kernel, MatrixViewMut::new(&mut out, shape.m, shape.n)));
            });
            group.bench_function(BenchmarkId::new("reorder+packed", kernel.name()), |bench| {
                bench.iter(|| {
                    PanelBuffer::pack(kernel, black_box(a), black_box(b))
                        .multiply(kernel, MatrixViewMut::new(&mut out, shape.m, shape.n))
                });
            });
            group.bench_function(BenchmarkId::new("unpacked", kernel.name()), |bench| {
                bench.iter(|| {
                    kernel.multiply_unpacked(black_box(a), black_box(b), MatrixViewMut::new(&mut out, shape.m, shape.n))
                });
            });
        }

        group.bench_function("panel-24", |bench| {
            bench.iter(|| multiply_panel::<24>(black_box(a), black_box(b), MatrixViewMut::new(&mut out, shape.m, shape.n)));
        });
        group.bench_function("panel-40", |bench| {
            bench.iter(|| multiply_panel::<40>(black_box(a), black_box(b), MatrixViewMut::new(&mut out, shape.m, shape.n)));
        });

        black_box(out[out.len() / 2]);
        group.finish();
    }
}

fn bench_batch(c: &mut Criterion) {
    let shape = GemmShape::new(64, 64, 64);
    let len = 64;
    let threads = std::thread::available_parallelism().map_or(1, |n| n.get().min(4));

    let mut group = c.benchmark_group("batch/64x64x64");
    group.throughput(Throughput::Elements(len as u64));

    let kernel: &dyn Kernel = panel_gemm::select_kernel();
    let schedules = [
        ("static", Schedule::Static),
        ("pooled", Schedule::Pooled { chunk: 4 }),
    ];
    for (label, schedule) in schedules {
        for reorder in [ReorderPolicy::EveryIteration, ReorderPolicy::Once] {
            let config = BatchConfig {
                batch: len,
                shape,
                threads,
                schedule,
                reorder,
                iterations: Some(1),
            };
            let Ok(runner) = BatchRunner::new(config, kernel) else {
                continue;
            };
            let mut batch = Batch::sequential(shape, len);

            group.bench_function(BenchmarkId::new(label, format!("{reorder:?}")), |bench| {
                bench.iter(|| runner.run_iteration(&mut batch, 0))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_single, bench_batch);
criterion_main!(benches);
