//! Weighted blending of per-model prediction maps.

use super::{CohortPredictions, ModelWeights, PredictionMap};

/// Blend per-model predictions with the given weights.
///
/// Each patient accumulates `Σ_model w_model · p_model,patient` over every
/// model that supplies a prediction for that id. This contract is looser
/// than the optimizer's strict key-equality check: a model missing a patient
/// (or a weight) simply contributes nothing. Output is sorted by patient id.
pub fn weighted_average(
    predictions: &CohortPredictions,
    weights: &ModelWeights,
) -> PredictionMap {
    let mut blended = PredictionMap::new();
    for (model_id, model_predictions) in predictions {
        let Some(&weight) = weights.get(model_id) else {
            continue;
        };
        for (patient_id, &prob) in model_predictions {
            *blended.entry(patient_id.clone()).or_insert(0.0) += weight * prob;
        }
    }
    blended
}

/// Uniform weights over the given models.
pub fn simple_average<I, S>(model_ids: I) -> ModelWeights
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let ids: Vec<String> = model_ids.into_iter().map(Into::into).collect();
    let weight = 1.0 / ids.len() as f64;
    ids.into_iter().map(|id| (id, weight)).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::prediction_map;

    fn weights(pairs: &[(&str, f64)]) -> ModelWeights {
        pairs
            .iter()
            .map(|(id, w)| (id.to_string(), *w))
            .collect()
    }

    #[test]
    fn blends_with_given_weights() {
        let mut predictions = CohortPredictions::new();
        predictions.insert("a".into(), prediction_map(&[("p1", 0.8), ("p2", 0.2)]));
        predictions.insert("b".into(), prediction_map(&[("p1", 0.4), ("p2", 0.6)]));

        let blended = weighted_average(&predictions, &weights(&[("a", 0.75), ("b", 0.25)]));
        assert!((blended["p1"] - 0.7).abs() < 1e-12);
        assert!((blended["p2"] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn identical_models_reproduce_common_prediction() {
        let common = prediction_map(&[("p1", 0.3), ("p2", 0.7), ("p3", 0.5)]);
        let mut predictions = CohortPredictions::new();
        predictions.insert("a".into(), common.clone());
        predictions.insert("b".into(), common.clone());
        predictions.insert("c".into(), common.clone());

        // Any weights summing to one give back the common prediction
        let blended =
            weighted_average(&predictions, &weights(&[("a", 0.2), ("b", 0.5), ("c", 0.3)]));
        for (patient_id, &prob) in &common {
            assert!((blended[patient_id] - prob).abs() < 1e-12);
        }
    }

    #[test]
    fn missing_patient_contributes_nothing() {
        let mut predictions = CohortPredictions::new();
        predictions.insert("a".into(), prediction_map(&[("p1", 0.8), ("p2", 0.2)]));
        predictions.insert("b".into(), prediction_map(&[("p1", 0.4)]));

        let blended = weighted_average(&predictions, &weights(&[("a", 0.5), ("b", 0.5)]));
        assert!((blended["p1"] - 0.6).abs() < 1e-12);
        // Only model a contributed to p2
        assert!((blended["p2"] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn model_without_weight_is_ignored() {
        let mut predictions = CohortPredictions::new();
        predictions.insert("a".into(), prediction_map(&[("p1", 0.8)]));
        predictions.insert("rogue".into(), prediction_map(&[("p1", 1.0)]));

        let blended = weighted_average(&predictions, &weights(&[("a", 1.0)]));
        assert!((blended["p1"] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn output_is_sorted_by_patient_id() {
        let mut predictions = CohortPredictions::new();
        predictions.insert("a".into(), prediction_map(&[("z", 0.1), ("m", 0.2), ("a", 0.3)]));

        let blended = weighted_average(&predictions, &weights(&[("a", 1.0)]));
        let ids: Vec<&String> = blended.keys().collect();
        assert_eq!(ids, ["a", "m", "z"]);
    }

    #[test]
    fn simple_average_is_uniform() {
        let uniform = simple_average(["a", "b", "c", "d"]);
        for weight in uniform.values() {
            assert!((weight - 0.25).abs() < 1e-12);
        }
        let total: f64 = uniform.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }
}
