//! Integration tests for ensemble weight optimization and blending.

use scanblend::ensemble::{
    simple_average, weighted_average, CohortPredictions, EnsembleError, EnsembleParams,
    LabelMap, PredictionMap, PredictionStack, WeightOptimizer,
};
use approx::assert_abs_diff_eq;
use scanblend::testing::{label_map, prediction_map};
use scanblend::Verbosity;

fn silent_params() -> EnsembleParams {
    EnsembleParams {
        verbosity: Verbosity::Silent,
        ..Default::default()
    }
}

fn two_model_cohort() -> (CohortPredictions, LabelMap) {
    let mut predictions = CohortPredictions::new();
    predictions.insert(
        "a".to_string(),
        prediction_map(&[("p1", 0.9), ("p2", 0.1), ("p3", 0.8)]),
    );
    predictions.insert(
        "b".to_string(),
        prediction_map(&[("p1", 0.2), ("p2", 0.3), ("p3", 0.9)]),
    );
    let labels = label_map(&[("p1", 1), ("p2", 0), ("p3", 1)]);
    (predictions, labels)
}

#[test]
fn end_to_end_two_model_scenario() {
    let (predictions, labels) = two_model_cohort();

    let fit = WeightOptimizer::new(silent_params())
        .fit(&predictions, &labels)
        .unwrap();

    // Model a is clearly the better predictor of these labels
    assert!(fit.weights["a"] > fit.weights["b"]);

    let blended = weighted_average(&predictions, &fit.weights);
    assert!(blended["p1"] > 0.8, "blended p1 = {}", blended["p1"]);
}

#[test]
fn fitted_weights_form_a_distribution() {
    let (predictions, labels) = two_model_cohort();

    let fit = WeightOptimizer::new(silent_params())
        .fit(&predictions, &labels)
        .unwrap();

    let total: f64 = fit.weights.values().sum();
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-6);
    for &weight in fit.weights.values() {
        assert!((0.0..=1.0).contains(&weight));
    }
}

#[test]
fn identical_models_blend_to_the_common_prediction() {
    let common = prediction_map(&[("p1", 0.35), ("p2", 0.65), ("p3", 0.5), ("p4", 0.9)]);
    let mut predictions = CohortPredictions::new();
    for model_id in ["a", "b", "c"] {
        predictions.insert(model_id.to_string(), common.clone());
    }
    let labels = label_map(&[("p1", 0), ("p2", 1), ("p3", 0), ("p4", 1)]);

    let fit = WeightOptimizer::new(silent_params())
        .fit(&predictions, &labels)
        .unwrap();

    // Whatever weights the optimizer lands on, the blend is the input
    let blended = weighted_average(&predictions, &fit.weights);
    for (patient_id, &prob) in &common {
        assert_abs_diff_eq!(blended[patient_id], prob, epsilon = 1e-9);
    }

    // Same for hand-picked uniform weights
    let uniform = simple_average(predictions.keys().cloned());
    let blended = weighted_average(&predictions, &uniform);
    for (patient_id, &prob) in &common {
        assert_abs_diff_eq!(blended[patient_id], prob, epsilon = 1e-12);
    }
}

#[test]
fn perfect_model_dominates_noise() {
    let mut predictions = CohortPredictions::new();
    predictions.insert(
        "oracle".to_string(),
        prediction_map(&[
            ("p1", 1.0),
            ("p2", 0.0),
            ("p3", 1.0),
            ("p4", 0.0),
            ("p5", 1.0),
            ("p6", 0.0),
        ]),
    );
    predictions.insert(
        "noise".to_string(),
        prediction_map(&[
            ("p1", 0.48),
            ("p2", 0.61),
            ("p3", 0.27),
            ("p4", 0.55),
            ("p5", 0.39),
            ("p6", 0.71),
        ]),
    );
    let labels = label_map(&[
        ("p1", 1),
        ("p2", 0),
        ("p3", 1),
        ("p4", 0),
        ("p5", 1),
        ("p6", 0),
    ]);

    let fit = WeightOptimizer::new(silent_params())
        .fit(&predictions, &labels)
        .unwrap();

    assert!(fit.weights["oracle"] > fit.weights["noise"]);
}

#[test]
fn weighted_average_ignores_insertion_order() {
    let pairs_a = [("p1", 0.8), ("p2", 0.2), ("p3", 0.6)];
    let pairs_b = [("p1", 0.1), ("p2", 0.9), ("p3", 0.4)];

    // Build the same cohort twice with different insertion orders
    let mut forward = CohortPredictions::new();
    forward.insert("a".to_string(), prediction_map(&pairs_a));
    forward.insert("b".to_string(), prediction_map(&pairs_b));

    let mut reversed = CohortPredictions::new();
    let mut b_rev = PredictionMap::new();
    for (pid, p) in pairs_b.iter().rev() {
        b_rev.insert(pid.to_string(), *p);
    }
    reversed.insert("b".to_string(), b_rev);
    let mut a_rev = PredictionMap::new();
    for (pid, p) in pairs_a.iter().rev() {
        a_rev.insert(pid.to_string(), *p);
    }
    reversed.insert("a".to_string(), a_rev);

    let mut weights = scanblend::ensemble::ModelWeights::new();
    weights.insert("a".to_string(), 0.3);
    weights.insert("b".to_string(), 0.7);

    assert_eq!(
        weighted_average(&forward, &weights),
        weighted_average(&reversed, &weights)
    );
}

#[test]
fn stack_round_trip_preserves_every_model() {
    let (predictions, labels) = two_model_cohort();
    let stack = PredictionStack::from_predictions(&predictions, &labels).unwrap();

    for (model_id, original) in &predictions {
        let recovered = stack.unstack(model_id).unwrap();
        assert_eq!(&recovered, original);
    }
}

#[test]
fn mismatched_cohorts_are_rejected_outright() {
    let (mut predictions, labels) = two_model_cohort();
    predictions
        .get_mut("a")
        .unwrap()
        .insert("stray".to_string(), 0.5);

    let err = WeightOptimizer::new(silent_params())
        .fit(&predictions, &labels)
        .unwrap_err();
    assert!(matches!(err, EnsembleError::KeyMismatch { .. }));
}
