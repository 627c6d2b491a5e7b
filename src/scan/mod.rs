//! Tiled volumetric inference.
//!
//! This module slides a fixed-size cubic window across 3D volumes on a
//! regular stride grid, runs a segmentation model once per placement, and
//! stitches the per-window outputs into a full-volume prediction map:
//!
//! - [`WindowGrid`]: deterministic patch scheduling
//! - [`ScanRunner`]: per-volume sweep, shape reconciliation, masking
//! - [`buffered`]: bounded input prefetch
//! - [`SaverPool`]: bounded pool of background persistence workers
//!
//! Model inference runs only on the calling thread; concurrency is confined
//! to input prefetch and output persistence.

mod grid;
mod prefetch;
mod runner;
mod saver;
mod volume;

pub use grid::{Placement, Placements, WindowGrid};
pub use prefetch::{buffered, Buffered};
pub use runner::{PatchModel, ScanParams, ScanRunner, ScanSummary};
pub use saver::{DiskSink, SaverPool, StoredVolume, VolumeSink};
pub use volume::{AffineTransform, PredictionVolume, ScanVolume, IDENTITY_TRANSFORM};

/// Errors from the tiled inference runner and its persistence workers.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] bincode::Error),

    #[error("volume {patient_id}: axis {axis} needs at least {required} voxels, got {got}")]
    VolumeTooSmall {
        patient_id: String,
        axis: usize,
        required: usize,
        got: usize,
    },

    #[error("model returned a patch of shape {got:?}, expected {expected:?}")]
    PatchShape {
        expected: [usize; 3],
        got: [usize; 3],
    },

    #[error("volume {patient_id}: mask shape {mask:?} does not match volume shape {volume:?}")]
    MaskShape {
        patient_id: String,
        mask: [usize; 3],
        volume: [usize; 3],
    },

    #[error(
        "volume {patient_id}: assembled output {output:?} is larger than the input {input:?}"
    )]
    OutputExceedsInput {
        patient_id: String,
        output: [usize; 3],
        input: [usize; 3],
    },

    #[error("saver pool is shut down")]
    PoolShutDown,

    #[error("saver worker panicked")]
    WorkerPanicked,
}
