//! Ensemble weight optimizer.
//!
//! Fits a convex combination of models by minimizing mean cross-entropy of
//! the softmax-weighted blend over a validation cohort. A stratified k-fold
//! pass runs first for diagnostics; the final weights are fitted on the full
//! cohort.

use ndarray::{Array2, ArrayView2, ArrayView3};

use crate::logger::{MetricValue, TrainingLogger, Verbosity};

use super::cv::{complement, stratified_folds, CvFoldResult};
use super::lbfgs::{minimize, LbfgsParams};
use super::loss::{binary_log_loss, softmax, BlendLoss};
use super::stack::{one_hot, sorted_labels, PredictionStack};
use super::{CohortPredictions, EnsembleError, LabelMap, ModelWeights};

// ============================================================================
// EnsembleParams
// ============================================================================

/// Parameters for ensemble weight optimization.
#[derive(Debug, Clone)]
pub struct EnsembleParams {
    /// Number of stratified diagnostic folds.
    pub n_folds: usize,

    /// Random seed for the fold split.
    pub seed: u64,

    /// Inner L-BFGS settings.
    pub lbfgs: LbfgsParams,

    /// Verbosity level for progress output.
    pub verbosity: Verbosity,
}

impl Default for EnsembleParams {
    fn default() -> Self {
        Self {
            n_folds: 5,
            seed: 0,
            lbfgs: LbfgsParams::default(),
            verbosity: Verbosity::default(),
        }
    }
}

// ============================================================================
// EnsembleFit
// ============================================================================

/// Result of a weight optimization run.
#[derive(Debug, Clone)]
pub struct EnsembleFit {
    /// Final simplex weights, keyed by model id.
    pub weights: ModelWeights,
    /// Mean cross-entropy of the final blend on the full cohort.
    pub training_loss: f64,
    /// Per-fold diagnostics. Reporting only; the final fit ignores them.
    pub cv: Vec<CvFoldResult>,
}

// ============================================================================
// WeightOptimizer
// ============================================================================

/// Learns blending weights from validation predictions and labels.
#[derive(Debug, Clone, Default)]
pub struct WeightOptimizer {
    params: EnsembleParams,
}

impl WeightOptimizer {
    /// Create an optimizer with the given parameters.
    pub fn new(params: EnsembleParams) -> Self {
        Self { params }
    }

    /// Fit blending weights on a validation cohort.
    ///
    /// Every model's prediction keys must equal the label keys; a mismatch
    /// aborts the whole run. The returned weights are non-negative and sum
    /// to one. The L-BFGS termination reason is not inspected: the final
    /// iterate is used whether or not the gradient tolerance was reached.
    pub fn fit(
        &self,
        predictions: &CohortPredictions,
        labels: &LabelMap,
    ) -> Result<EnsembleFit, EnsembleError> {
        let stack = PredictionStack::from_predictions(predictions, labels)?;
        let label_vec = sorted_labels(labels);
        let targets = one_hot(&label_vec);

        let logger = TrainingLogger::new(self.params.verbosity);
        logger.start_optimization(stack.n_models(), stack.n_patients());

        let cv = self.run_cv(&stack, &label_vec, &targets, &logger);

        let (weights_vec, training_loss) =
            fit_simplex_weights(stack.values(), targets.view(), &self.params.lbfgs);

        let weights: ModelWeights = stack
            .model_ids()
            .iter()
            .cloned()
            .zip(weights_vec.iter().copied())
            .collect();
        for (model_id, &weight) in &weights {
            logger.log_weight(model_id, weight);
        }
        logger.log_final_loss(training_loss);
        logger.finish();

        Ok(EnsembleFit {
            weights,
            training_loss,
            cv,
        })
    }

    /// Stratified k-fold diagnostic pass.
    fn run_cv(
        &self,
        stack: &PredictionStack,
        labels: &[u8],
        targets: &Array2<f64>,
        logger: &TrainingLogger,
    ) -> Vec<CvFoldResult> {
        let n_patients = stack.n_patients();
        let folds = stratified_folds(labels, self.params.n_folds, self.params.seed);

        let mut results = Vec::with_capacity(folds.len());
        for (fold, held_out) in folds.iter().enumerate() {
            let train_indices = complement(held_out, n_patients);
            if held_out.is_empty() || train_indices.is_empty() {
                logger.warn(&format!("fold {fold} is degenerate, skipping"));
                continue;
            }

            let train_stack = stack.select_patients(&train_indices);
            let train_targets = select_rows(targets, &train_indices);
            let (weights, training_loss) = fit_simplex_weights(
                train_stack.values(),
                train_targets.view(),
                &self.params.lbfgs,
            );

            let held_out_stack = stack.select_patients(held_out);
            let held_out_labels: Vec<u8> = held_out.iter().map(|&p| labels[p]).collect();
            let probs = blend_positive(held_out_stack.values(), &weights);
            let validation_loss = binary_log_loss(&probs, &held_out_labels);

            logger.log_fold(
                fold,
                &[
                    MetricValue::new("train-logloss", training_loss, false),
                    MetricValue::new("valid-logloss", validation_loss, false),
                ],
            );

            results.push(CvFoldResult {
                fold,
                weights,
                training_loss,
                validation_loss,
                train_indices,
            });
        }
        results
    }
}

// ============================================================================
// Fitting helpers
// ============================================================================

/// L-BFGS fit of the unconstrained vector, mapped back to the simplex.
fn fit_simplex_weights<'a>(
    stack: ArrayView3<'a, f64>,
    targets: ArrayView2<'a, f64>,
    params: &LbfgsParams,
) -> (Vec<f64>, f64) {
    let loss = BlendLoss::new(stack, targets);
    let n_models = loss.n_models();

    // W = 0 gives uniform initial weights through the softmax
    let x0 = vec![0.0; n_models];
    let result = minimize(|x, g| loss.value_and_grad(x, g), &x0, params);

    let mut weights = vec![0.0; n_models];
    softmax(&result.x, &mut weights);
    (weights, result.loss)
}

/// Positive-class probabilities of the blend, in stack patient order.
fn blend_positive(stack: ArrayView3<'_, f64>, weights: &[f64]) -> Vec<f64> {
    let (n_models, n_patients, _) = stack.dim();
    debug_assert_eq!(weights.len(), n_models);

    let mut probs = vec![0.0; n_patients];
    for m in 0..n_models {
        for (p, prob) in probs.iter_mut().enumerate() {
            *prob += weights[m] * stack[[m, p, 1]];
        }
    }
    probs
}

fn select_rows(targets: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    let mut selected = Array2::zeros((indices.len(), targets.dim().1));
    for (out_row, &row) in indices.iter().enumerate() {
        selected.row_mut(out_row).assign(&targets.row(row));
    }
    selected
}

// ============================================================================
// Tests
// ============================================================================
