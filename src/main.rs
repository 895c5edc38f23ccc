//! Benchmark and verification harness for the GEMM strategies.

use std::error::Error;
use std::process::ExitCode;
use std::time::Instant;

use env_logger::Env;
use log::LevelFilter;

use panel_gemm::batch::{Batch, BatchConfig, BatchRunner, CancelToken};
use panel_gemm::verify::{Tolerance, compare, max_abs_diff, term_magnitudes};
use panel_gemm::{
    GemmShape, MatrixView, MatrixViewMut, PanelBuffer, available_kernels, multiply_panel,
    reference_multiply, select_kernel,
};

/// Problem used by the single-threaded benchmarks. Every dimension is a
/// multiple of every kernel tile and panel width.
const SHAPE: GemmShape = GemmShape::new(1000, 240, 200);
const BATCH: usize = 16;

type MultiplyFn = Box<dyn Fn(MatrixView, MatrixView, MatrixViewMut)>;

struct Strategy {
    name: String,
    run: MultiplyFn,
}

fn strategies() -> Vec<Strategy> {
    let mut list = vec![Strategy {
        name: "baseline".into(),
        run: Box::new(reference_multiply),
    }];

    for kernel in available_kernels() {
        list.push(Strategy {
            name: format!("{}-raw", kernel.name()),
            run: Box::new(move |a: MatrixView, b: MatrixView, c: MatrixViewMut| {
                kernel.multiply_unpacked(a, b, c)
            }),
        });
        list.push(Strategy {
            name: kernel.name().into(),
            run: Box::new(move |a: MatrixView, b: MatrixView, c: MatrixViewMut| {
                PanelBuffer::pack(kernel, a, b).multiply(kernel, c)
            }),
        });
    }

    list.push(Strategy {
        name: "panel-24".into(),
        run: Box::new(multiply_panel::<24>),
    });
    list.push(Strategy {
        name: "panel-40".into(),
        run: Box::new(multiply_panel::<40>),
    });
    list
}

enum Command {
    List,
    Bench { names: Vec<String>, verify: bool },
    Batch,
}

struct Args {
    command: Command,
    verbose: bool,
}

fn parse_args(strategies: &[Strategy]) -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut parser = lexopt::Parser::from_env();
    let mut command = None;
    let mut verbose = false;

    while let Some(arg) = parser.next()? {
        match arg {
            Short('v') | Long("verbose") => verbose = true,
            Value(val) if command.is_none() => command = Some(val.string()?),
            Long("help") | Short('h') => {
                println!(
                    "Benchmark the GEMM strategies.

Usage: {bin_name} [options] [command]

Commands:

  list     - List strategy names
  all      - Benchmark every strategy
  test     - Verify every strategy against the baseline
  batch    - Run the threaded batch driver (configured by MM_* variables)
  <name>   - Benchmark one strategy (default: the last one listed)

Options:

 -v, --verbose  - Log at debug level
",
                    bin_name = parser.bin_name().unwrap_or("panel-gemm")
                );
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    let all = || strategies.iter().map(|s| s.name.clone()).collect();
    let command = match command.as_deref() {
        Some("list") => Command::List,
        Some("all") => Command::Bench {
            names: all(),
            verify: false,
        },
        Some("test") => Command::Bench {
            names: all(),
            verify: true,
        },
        Some("batch") => Command::Batch,
        Some(name) => {
            if !strategies.iter().any(|s| s.name == name) {
                return Err(format!("unknown strategy {name:?}, see `list`").into());
            }
            Command::Bench {
                names: vec![name.to_string()],
                verify: false,
            }
        }
        None => Command::Bench {
            names: strategies.last().map(|s| s.name.clone()).into_iter().collect(),
            verify: false,
        },
    };

    Ok(Args { command, verbose })
}

fn run_strategy(strategy: &Strategy, batch: &Batch, c: &mut [f32]) {
    let shape = batch.shape();
    for (i, c) in c.chunks_exact_mut(shape.c_len()).enumerate() {
        (strategy.run)(batch.a(i), batch.b(i), MatrixViewMut::new(c, shape.m, shape.n));
    }
}

/// Benchmark or verify the named strategies. Returns false if any result
/// differs from the baseline.
fn bench(strategies: &[Strategy], names: &[String], verify: bool) -> bool {
    let batch = Batch::sequential(SHAPE, BATCH);
    let mut c = vec![0.0f32; BATCH * SHAPE.c_len()];

    let baseline = verify.then(|| {
        println!("calculate baseline result as ground truth");
        let mut expected = vec![0.0f32; c.len()];
        let mut magnitudes = Vec::with_capacity(c.len());
        for (i, expected) in expected.chunks_exact_mut(SHAPE.c_len()).enumerate() {
            reference_multiply(batch.a(i), batch.b(i), MatrixViewMut::new(expected, SHAPE.m, SHAPE.n));
            magnitudes.extend(term_magnitudes(batch.a(i), batch.b(i)));
        }
        (expected, magnitudes)
    });

    for strategy in strategies.iter().filter(|s| names.contains(&s.name)) {
        if verify && strategy.name == "baseline" {
            continue;
        }
        println!("========== {} ==========", strategy.name);

        // warmup
        run_strategy(strategy, &batch, &mut c);

        if let Some((expected, magnitudes)) = &baseline {
            match compare(expected, &c, magnitudes, Tolerance::for_depth(SHAPE.k)) {
                Ok(()) => println!("OK (max abs diff {})", max_abs_diff(expected, &c)),
                Err(mismatch) => {
                    eprintln!("FAILED! {}", mismatch);
                    return false;
                }
            }
        } else {
            let start = Instant::now();
            run_strategy(strategy, &batch, &mut c);
            let secs = start.elapsed().as_secs_f64();
            println!(
                "time: {:.2} ms  {:.2} GFLOP/s",
                secs * 1000.0,
                BATCH as f64 * SHAPE.flops() / secs / 1e9
            );

            // spot values for quick debugging
            eprintln!("c[0]    = {}", c[0]);
            eprintln!("c[9973] = {}", c[9973]);
            eprintln!("c[-1]   = {}", c[c.len() - 1]);
        }
    }
    true
}

fn run_batch() -> Result<(), Box<dyn Error>> {
    let config = BatchConfig::from_env()?;
    let runner = BatchRunner::new(config.clone(), select_kernel())?;
    let mut batch = Batch::sequential(config.shape, config.batch);

    let pid = std::process::id();
    runner.run(&mut batch, &CancelToken::new(), |report| {
        println!(
            "pid={}, threads={}, ops={}",
            pid, config.threads, report.triples_per_sec as u64
        );
    })?;
    Ok(())
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let strategies = strategies();
    let args = parse_args(&strategies)?;

    let mut logger = env_logger::Builder::from_env(Env::default().default_filter_or("warn"));
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    match args.command {
        Command::List => {
            for strategy in &strategies {
                println!("{}", strategy.name);
            }
        }
        Command::Bench { names, verify } => {
            if !bench(&strategies, &names, verify) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Batch => run_batch()?,
    }
    Ok(ExitCode::SUCCESS)
}
