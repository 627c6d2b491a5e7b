//! End-to-end ensembling run over external stores.
//!
//! The stores that supply per-model predictions and validation labels, and
//! the scorer that rates a submission file, are trait seams: the run only
//! sees in-memory maps and paths. [`EnsembleRun::execute`] strings the whole
//! flow together: load → validate → optimize → blend → persist → compare.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ensemble::{
    weighted_average, CohortPredictions, EnsembleError, EnsembleFit, EnsembleParams, LabelMap,
    PredictionMap, WeightOptimizer,
};
use crate::report::{save_predictions, write_submission, WeightReport};

// =============================================================================
// Errors
// =============================================================================

/// Errors from an end-to-end ensembling run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ensemble(#[from] EnsembleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(String),
}

// =============================================================================
// External store seams
// =============================================================================

/// A named partition of patients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cohort {
    Validation,
    Test,
}

impl Cohort {
    /// Short name used in artifact paths.
    pub fn as_str(self) -> &'static str {
        match self {
            Cohort::Validation => "valid",
            Cohort::Test => "test",
        }
    }
}

/// Resolves a model id to its persisted per-cohort predictions.
pub trait PredictionStore {
    fn load_predictions(
        &self,
        model_id: &str,
        cohort: Cohort,
    ) -> Result<PredictionMap, PipelineError>;
}

/// Supplies ground-truth labels for the validation cohort.
pub trait LabelStore {
    fn validation_labels(&self) -> Result<LabelMap, PipelineError>;
}

/// Rates a submission file. Used for reporting only, never for fitting.
pub trait LeaderboardScorer {
    fn score(&self, submission: &Path) -> Result<f64, PipelineError>;
}

// =============================================================================
// EnsembleRun
// =============================================================================

/// Artifacts produced by one run.
#[derive(Debug)]
pub struct RunArtifacts {
    /// The fitted weights and diagnostics.
    pub fit: EnsembleFit,
    /// Blended validation-cohort predictions.
    pub validation_predictions: PredictionMap,
    /// Blended test-cohort predictions.
    pub test_predictions: PredictionMap,
    /// Path of the written submission file.
    pub submission_path: PathBuf,
    /// Leaderboard loss of the blended submission, if a scorer was supplied.
    pub ensemble_score: Option<f64>,
    /// Leaderboard loss per individual model, if a scorer was supplied.
    pub individual_scores: BTreeMap<String, f64>,
}

/// One complete ensembling run over a fixed set of models.
pub struct EnsembleRun<P, L> {
    predictions: P,
    labels: L,
    model_ids: Vec<String>,
    params: EnsembleParams,
    output_dir: PathBuf,
}

impl<P: PredictionStore, L: LabelStore> EnsembleRun<P, L> {
    /// Configure a run writing its artifacts under `output_dir`.
    pub fn new(
        predictions: P,
        labels: L,
        model_ids: Vec<String>,
        params: EnsembleParams,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            predictions,
            labels,
            model_ids,
            params,
            output_dir: output_dir.into(),
        }
    }

    /// Execute the full flow.
    ///
    /// Loads validation predictions for every model, fits blending weights,
    /// blends both cohorts, persists the three artifacts (validation and
    /// test prediction maps, submission file) plus the weight report, and,
    /// when a scorer is supplied, compares each individual model against the
    /// blend through temporary per-model submissions.
    pub fn execute(
        &self,
        scorer: Option<&dyn LeaderboardScorer>,
    ) -> Result<RunArtifacts, PipelineError> {
        std::fs::create_dir_all(&self.output_dir)?;

        let validation = self.load_cohort(Cohort::Validation)?;
        let labels = self.labels.validation_labels()?;

        let fit = WeightOptimizer::new(self.params.clone()).fit(&validation, &labels)?;

        let validation_predictions = weighted_average(&validation, &fit.weights);
        let test = self.load_cohort(Cohort::Test)?;
        let test_predictions = weighted_average(&test, &fit.weights);

        save_predictions(
            &self.output_dir.join("validation_set_predictions.json"),
            &validation_predictions,
        )?;
        save_predictions(
            &self.output_dir.join("test_set_predictions.json"),
            &test_predictions,
        )?;
        let submission_path = self.output_dir.join("test_set_predictions.csv");
        write_submission(&submission_path, &test_predictions)?;
        WeightReport::from_fit(&fit).save(&self.output_dir.join("weight_report.json"))?;

        let mut ensemble_score = None;
        let mut individual_scores = BTreeMap::new();
        if let Some(scorer) = scorer {
            for (model_id, model_predictions) in &test {
                individual_scores.insert(
                    model_id.clone(),
                    self.score_model(scorer, model_id, model_predictions)?,
                );
            }
            ensemble_score = Some(scorer.score(&submission_path)?);
        }

        Ok(RunArtifacts {
            fit,
            validation_predictions,
            test_predictions,
            submission_path,
            ensemble_score,
            individual_scores,
        })
    }

    fn load_cohort(&self, cohort: Cohort) -> Result<CohortPredictions, PipelineError> {
        let mut loaded = CohortPredictions::new();
        for model_id in &self.model_ids {
            let predictions = self.predictions.load_predictions(model_id, cohort)?;
            loaded.insert(model_id.clone(), predictions);
        }
        Ok(loaded)
    }

    /// Score one model through a transient submission file.
    fn score_model(
        &self,
        scorer: &dyn LeaderboardScorer,
        model_id: &str,
        predictions: &PredictionMap,
    ) -> Result<f64, PipelineError> {
        let path = self
            .output_dir
            .join(format!("submission_{model_id}.csv"));
        write_submission(&path, predictions)?;
        let score = scorer.score(&path);
        let _ = std::fs::remove_file(&path);
        score
    }
}

/// Generate a run identifier for the artifact directory.
pub fn generate_run_id() -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("ensemble-{seconds}")
}

// =============================================================================
// Tests
// =============================================================================
