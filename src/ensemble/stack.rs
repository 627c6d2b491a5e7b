//! Aligned prediction tensor for weight optimization.
//!
//! [`PredictionStack`] turns per-model prediction maps into a dense
//! `[n_models, n_patients, 2]` tensor. The model and patient orderings are
//! computed once (sorted lexicographically) and carried alongside the values,
//! so every later stage re-associates indices with ids through the stack
//! rather than through map iteration order.

use ndarray::{Array2, Array3, ArrayView3};

use super::{CohortPredictions, EnsembleError, LabelMap, PredictionMap};

// =============================================================================
// PredictionStack
// =============================================================================

/// Per-model two-class probabilities, aligned with the validation labels.
///
/// Entry `[m, p, .]` holds `[1 - prob, prob]` for model `m` and patient `p`,
/// where `prob` is the model's predicted probability of the positive class.
#[derive(Debug, Clone)]
pub struct PredictionStack {
    values: Array3<f64>,
    model_ids: Vec<String>,
    patient_ids: Vec<String>,
}

impl PredictionStack {
    /// Build the stack from per-model predictions and validation labels.
    ///
    /// Every model must predict exactly the patient set that carries labels;
    /// a mismatch aborts with [`EnsembleError::KeyMismatch`]. No partial or
    /// best-effort stacking is attempted.
    pub fn from_predictions(
        predictions: &CohortPredictions,
        labels: &LabelMap,
    ) -> Result<Self, EnsembleError> {
        if predictions.is_empty() {
            return Err(EnsembleError::NoModels);
        }
        if labels.is_empty() {
            return Err(EnsembleError::NoPatients);
        }

        for (model_id, model_predictions) in predictions {
            if !model_predictions.keys().eq(labels.keys()) {
                return Err(EnsembleError::KeyMismatch {
                    model_id: model_id.clone(),
                });
            }
        }

        let model_ids: Vec<String> = predictions.keys().cloned().collect();
        let patient_ids: Vec<String> = labels.keys().cloned().collect();

        let mut values = Array3::zeros((model_ids.len(), patient_ids.len(), 2));
        for (m, model_id) in model_ids.iter().enumerate() {
            let model_predictions = &predictions[model_id];
            for (p, patient_id) in patient_ids.iter().enumerate() {
                let prob = model_predictions[patient_id];
                values[[m, p, 0]] = 1.0 - prob;
                values[[m, p, 1]] = prob;
            }
        }

        Ok(Self {
            values,
            model_ids,
            patient_ids,
        })
    }

    /// Number of stacked models.
    pub fn n_models(&self) -> usize {
        self.model_ids.len()
    }

    /// Number of aligned patients.
    pub fn n_patients(&self) -> usize {
        self.patient_ids.len()
    }

    /// The stacked values, shape `[n_models, n_patients, 2]`.
    pub fn values(&self) -> ArrayView3<'_, f64> {
        self.values.view()
    }

    /// Model ids in stack order (sorted).
    pub fn model_ids(&self) -> &[String] {
        &self.model_ids
    }

    /// Patient ids in stack order (sorted).
    pub fn patient_ids(&self) -> &[String] {
        &self.patient_ids
    }

    /// Reconstruct one model's prediction map from the stack.
    ///
    /// Returns `None` for an unknown model id. Inverse of
    /// [`from_predictions`](Self::from_predictions) for each model.
    pub fn unstack(&self, model_id: &str) -> Option<PredictionMap> {
        let m = self.model_ids.iter().position(|id| id == model_id)?;
        let map = self
            .patient_ids
            .iter()
            .enumerate()
            .map(|(p, patient_id)| (patient_id.clone(), self.values[[m, p, 1]]))
            .collect();
        Some(map)
    }

    /// Restrict the stack to a subset of patients, by stack index.
    ///
    /// Used to carve cross-validation folds out of the full cohort.
    pub fn select_patients(&self, indices: &[usize]) -> PredictionStack {
        let mut values = Array3::zeros((self.n_models(), indices.len(), 2));
        let mut patient_ids = Vec::with_capacity(indices.len());
        for (out_p, &p) in indices.iter().enumerate() {
            patient_ids.push(self.patient_ids[p].clone());
            for m in 0..self.n_models() {
                values[[m, out_p, 0]] = self.values[[m, p, 0]];
                values[[m, out_p, 1]] = self.values[[m, p, 1]];
            }
        }
        PredictionStack {
            values,
            model_ids: self.model_ids.clone(),
            patient_ids,
        }
    }
}

// =============================================================================
// Label helpers
// =============================================================================

/// Labels in stack patient order (sorted by patient id).
pub fn sorted_labels(labels: &LabelMap) -> Vec<u8> {
    labels.values().copied().collect()
}

/// One-hot encode binary labels into a `[n_patients, 2]` target matrix.
pub fn one_hot(labels: &[u8]) -> Array2<f64> {
    let mut targets = Array2::zeros((labels.len(), 2));
    for (p, &label) in labels.iter().enumerate() {
        targets[[p, label as usize]] = 1.0;
    }
    targets
}

// =============================================================================
// Tests
// =============================================================================
