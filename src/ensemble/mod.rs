//! Ensemble weight optimization.
//!
//! This module learns a convex combination of independently trained
//! classifiers that minimizes cross-entropy on a validation cohort:
//!
//! - [`PredictionStack`]: aligned `[n_models, n_patients, 2]` tensor
//! - [`WeightOptimizer`]: stratified CV diagnostics + final L-BFGS fit
//! - [`weighted_average`]: blend any cohort with the learned weights
//!
//! The optimization variable is an unconstrained vector; the per-model
//! weight is its softmax, which guarantees non-negativity and sum-to-one
//! without explicit constrained optimization.

mod average;
mod cv;
mod lbfgs;
mod loss;
mod stack;
mod trainer;

pub use average::{simple_average, weighted_average};
pub use cv::{stratified_folds, CvFoldResult};
pub use lbfgs::{minimize, LbfgsParams, LbfgsResult};
pub use loss::{binary_log_loss, numerical_gradient, patient_log_losses, softmax, BlendLoss};
pub use stack::{one_hot, sorted_labels, PredictionStack};
pub use trainer::{EnsembleFit, EnsembleParams, WeightOptimizer};

use std::collections::BTreeMap;

/// Patient id → predicted probability of the positive class.
pub type PredictionMap = BTreeMap<String, f64>;

/// Patient id → binary ground-truth label.
pub type LabelMap = BTreeMap<String, u8>;

/// Model id → per-patient predictions for one cohort.
pub type CohortPredictions = BTreeMap<String, PredictionMap>;

/// Model id → blending weight on the simplex.
pub type ModelWeights = BTreeMap<String, f64>;

/// Ensembling validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EnsembleError {
    #[error("predictions for model {model_id} do not cover the same patients as the validation labels")]
    KeyMismatch { model_id: String },

    #[error("no models supplied for ensembling")]
    NoModels,

    #[error("validation cohort is empty")]
    NoPatients,
}
