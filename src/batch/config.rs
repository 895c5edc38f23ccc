use std::env;

use crate::error::{Error, Result};
use crate::matrix::{GemmShape, TileDims};

/// Environment variable holding the worker thread count.
pub const THREADS_VAR: &str = "MM_NUM_THREADS";
/// Environment variable holding the number of triples per batch.
pub const BATCH_SIZE_VAR: &str = "MM_BATCH_SIZE";
/// Environment variable holding the number of iterations to run.
pub const ITERATIONS_VAR: &str = "MM_ITERATIONS";
/// Environment variable selecting the schedule, `static` or `pooled`.
pub const SCHEDULE_VAR: &str = "MM_SCHEDULE";

/// How the triples of a batch are spread over worker threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    /// One contiguous, equal share per thread. Threads are spawned and joined
    /// for every phase, and the batch size must be a multiple of the thread
    /// count.
    Static,
    /// A persistent pool pulls work items of `chunk` triples until the phase
    /// is done. Any batch size works.
    Pooled { chunk: usize },
}

/// When the reorder phase runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReorderPolicy {
    /// Reorder every triple before every multiply.
    EveryIteration,
    /// Reorder on the first iteration only and keep the panels.
    Once,
    /// Never reorder; multiply the raw matrices directly.
    Skip,
}

/// Configuration of a batch run.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchConfig {
    /// Number of independent triples
    pub batch: usize,
    /// Shape shared by every triple
    pub shape: GemmShape,
    /// Worker thread count
    pub threads: usize,
    pub schedule: Schedule,
    pub reorder: ReorderPolicy,
    /// Stop after this many iterations; `None` runs until cancelled.
    pub iterations: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            batch: 2048,
            shape: GemmShape::new(512, 256, 128),
            threads: 1,
            schedule: Schedule::Pooled { chunk: 1 },
            reorder: ReorderPolicy::EveryIteration,
            iterations: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidEnvVar { name, value })
}

impl BatchConfig {
    /// Default configuration overridden by the `MM_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Default configuration overridden by whatever `lookup` returns for the
    /// `MM_*` variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = BatchConfig::default();

        if let Some(value) = lookup(THREADS_VAR) {
            config.threads = parse_var(THREADS_VAR, value)?;
        }
        if let Some(value) = lookup(BATCH_SIZE_VAR) {
            config.batch = parse_var(BATCH_SIZE_VAR, value)?;
        }
        if let Some(value) = lookup(ITERATIONS_VAR) {
            config.iterations = Some(parse_var(ITERATIONS_VAR, value)?);
        }
        if let Some(value) = lookup(SCHEDULE_VAR) {
            config.schedule = match value.trim() {
                "static" => Schedule::Static,
                "pooled" => Schedule::Pooled { chunk: 1 },
                _ => {
                    return Err(Error::InvalidEnvVar {
                        name: SCHEDULE_VAR,
                        value,
                    });
                }
            };
        }

        Ok(config)
    }

    /// Reject configurations that cannot run with a kernel using `tile`.
    pub fn validate(&self, tile: TileDims) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::InvalidThreadCount);
        }
        if self.batch == 0 {
            return Err(Error::EmptyBatch);
        }
        match self.schedule {
            Schedule::Static if self.batch % self.threads != 0 => {
                return Err(Error::IndivisibleBatch {
                    batch: self.batch,
                    threads: self.threads,
                });
            }
            Schedule::Pooled { chunk: 0 } => return Err(Error::InvalidChunkSize),
            _ => {}
        }
        if self.shape.is_empty() {
            return Err(Error::EmptyShape(self.shape));
        }
        if !self.shape.fits(tile) {
            return Err(Error::IndivisibleShape {
                shape: self.shape,
                tile,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = BatchConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, BatchConfig::default());
        assert_eq!(config.threads, 1);
    }

    #[test]
    fn test_env_overrides() {
        let config = BatchConfig::from_lookup(lookup(&[
            ("MM_NUM_THREADS", "4"),
            ("MM_BATCH_SIZE", " 64 "),
            ("MM_ITERATIONS", "3"),
            ("MM_SCHEDULE", "static"),
        ]))
        .unwrap();

        assert_eq!(config.threads, 4);
        assert_eq!(config.batch, 64);
        assert_eq!(config.iterations, Some(3));
        assert_eq!(config.schedule, Schedule::Static);
    }

    #[test]
    fn test_unparsable_thread_count() {
        let err = BatchConfig::from_lookup(lookup(&[("MM_NUM_THREADS", "four")])).unwrap_err();
        assert_eq!(err.to_string(), "invalid value \"four\" for MM_NUM_THREADS");
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let tile = TileDims::new(8, 8, 4);
        let base = BatchConfig {
            batch: 12,
            shape: GemmShape::new(16, 16, 8),
            threads: 4,
            schedule: Schedule::Static,
            reorder: ReorderPolicy::EveryIteration,
            iterations: Some(1),
        };
        assert!(base.validate(tile).is_ok());

        let zero_threads = BatchConfig { threads: 0, ..base.clone() };
        assert!(matches!(zero_threads.validate(tile), Err(Error::InvalidThreadCount)));

        let uneven = BatchConfig { threads: 5, ..base.clone() };
        assert!(matches!(
            uneven.validate(tile),
            Err(Error::IndivisibleBatch { batch: 12, threads: 5 })
        ));

        // the pooled schedule does not need an even split
        let pooled = BatchConfig {
            schedule: Schedule::Pooled { chunk: 2 },
            ..uneven.clone()
        };
        assert!(pooled.validate(tile).is_ok());

        let bad_shape = BatchConfig {
            shape: GemmShape::new(16, 12, 8),
            ..base.clone()
        };
        assert!(matches!(bad_shape.validate(tile), Err(Error::IndivisibleShape { .. })));

        let flat = BatchConfig {
            shape: GemmShape::new(0, 16, 8),
            ..base.clone()
        };
        assert!(matches!(flat.validate(tile), Err(Error::EmptyShape(_))));

        let empty = BatchConfig { batch: 0, ..base };
        assert!(matches!(empty.validate(tile), Err(Error::EmptyBatch)));
    }
}
