//! Error types for batch configuration.
//!
//! Kernel and reorder calls never return these: a shape that does not fit
//! the tile is a caller bug and panics. Errors here are reported before any
//! work starts, when a batch run is being configured.

use crate::matrix::{GemmShape, TileDims};
use thiserror::Error;

/// Result type alias using this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that reject a batch configuration up front.
#[derive(Error, Debug)]
pub enum Error {
    /// Thread count was zero.
    #[error("invalid thread count: must be at least 1")]
    InvalidThreadCount,

    /// The static schedule needs every worker to get the same number of triples.
    #[error("thread count {threads} must divide batch size {batch}")]
    IndivisibleBatch {
        /// Number of triples in the batch
        batch: usize,
        /// Requested worker count
        threads: usize,
    },

    /// Pooled work items must hold at least one triple.
    #[error("chunk size must be at least 1")]
    InvalidChunkSize,

    /// A batch must contain at least one triple.
    #[error("batch size must be at least 1")]
    EmptyBatch,

    /// Every matrix dimension must be at least 1.
    #[error("shape {0} has a zero dimension")]
    EmptyShape(GemmShape),

    /// Matrix shape is not a whole number of tiles.
    #[error("shape {shape} is not divisible by tile {tile}")]
    IndivisibleShape {
        /// Requested shape
        shape: GemmShape,
        /// Tile of the selected kernel
        tile: TileDims,
    },

    /// An environment variable could not be parsed.
    #[error("invalid value {value:?} for {name}")]
    InvalidEnvVar {
        /// Variable name
        name: &'static str,
        /// Raw value found in the environment
        value: String,
    },

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
