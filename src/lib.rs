//! scanblend: ensemble blending and tiled 3D inference for volumetric scans.
//!
//! This crate combines predictions from independently trained classifiers
//! into a single blended prediction, and applies a trained segmentation
//! model over large 3D volumes window by window.
//!
//! # Key Types
//!
//! - [`WeightOptimizer`] / [`EnsembleParams`] - Learn a convex combination of models
//! - [`PredictionStack`] - Aligned per-model, per-patient probability tensor
//! - [`ScanRunner`] / [`ScanParams`] - Tiled sweep of a segmentation model
//! - [`SaverPool`] - Bounded pool of background persistence workers
//!
//! # Ensembling
//!
//! Build a `WeightOptimizer` from [`EnsembleParams`], then call
//! [`WeightOptimizer::fit`] with per-model validation predictions and labels.
//! Blend any cohort with [`weighted_average`].
//!
//! # Tiled Inference
//!
//! Implement [`PatchModel`] for your segmentation model, configure a
//! [`WindowGrid`], and drive a volume stream through [`ScanRunner::run`].

// Re-export approx traits for users who want to compare predictions
pub use approx;

pub mod ensemble;
pub mod logger;
pub mod pipeline;
pub mod report;
pub mod scan;
pub mod testing;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Ensemble types (most users want these)
pub use ensemble::{
    simple_average, weighted_average, CohortPredictions, CvFoldResult, EnsembleError,
    EnsembleFit, EnsembleParams, LabelMap, ModelWeights, PredictionMap, PredictionStack,
    WeightOptimizer,
};

// Logging
pub use logger::{MetricValue, TrainingLogger, Verbosity};

// Tiled inference types
pub use scan::{
    DiskSink, PatchModel, PredictionVolume, SaverPool, ScanError, ScanParams, ScanRunner,
    ScanVolume, VolumeSink, WindowGrid,
};

// Pipeline seams
pub use pipeline::{Cohort, EnsembleRun, LabelStore, LeaderboardScorer, PredictionStore};
