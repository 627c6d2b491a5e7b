//! Run artifacts: weight reports, prediction maps, submission files.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::Serialize;

use crate::ensemble::{CvFoldResult, EnsembleFit, ModelWeights, PredictionMap};
use crate::pipeline::PipelineError;

// =============================================================================
// WeightReport
// =============================================================================

/// Human- and machine-readable summary of a weight optimization run.
#[derive(Debug, Clone, Serialize)]
pub struct WeightReport {
    /// Final simplex weights per model.
    pub weights: ModelWeights,
    /// Mean cross-entropy of the final blend on the validation cohort.
    pub training_loss: f64,
    /// Per-fold diagnostics.
    pub cv: Vec<CvFoldResult>,
}

impl WeightReport {
    /// Build a report from a finished fit.
    pub fn from_fit(fit: &EnsembleFit) -> Self {
        Self {
            weights: fit.weights.clone(),
            training_loss: fit.training_loss,
            cv: fit.cv.clone(),
        }
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

impl fmt::Display for WeightReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ensemble weights (training loss {:.6}):", self.training_loss)?;
        for (model_id, weight) in &self.weights {
            writeln!(f, "  {model_id}: {weight:.6}")?;
        }
        for fold in &self.cv {
            writeln!(
                f,
                "  fold {}: train-logloss {:.6}  valid-logloss {:.6}",
                fold.fold, fold.training_loss, fold.validation_loss
            )?;
        }
        Ok(())
    }
}

// =============================================================================
// Prediction maps
// =============================================================================

/// Persist a prediction map as JSON (sorted by patient id).
pub fn save_predictions(path: &Path, predictions: &PredictionMap) -> Result<(), PipelineError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, predictions)?;
    Ok(())
}

/// Read a prediction map back from JSON.
pub fn load_predictions(path: &Path) -> Result<PredictionMap, PipelineError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

// =============================================================================
// Submission files
// =============================================================================

/// Write a two-column `(id, probability)` submission file.
pub fn write_submission(path: &Path, predictions: &PredictionMap) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["id", "probability"])?;
    for (patient_id, prob) in predictions {
        writer.write_record([patient_id.clone(), prob.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a submission file back into a prediction map.
pub fn read_submission(path: &Path) -> Result<PredictionMap, PipelineError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut predictions = PredictionMap::new();
    for record in reader.records() {
        let record = record?;
        let patient_id = record
            .get(0)
            .ok_or_else(|| PipelineError::Store("submission row missing id".into()))?;
        let prob: f64 = record
            .get(1)
            .ok_or_else(|| PipelineError::Store("submission row missing probability".into()))?
            .parse()
            .map_err(|e| PipelineError::Store(format!("bad probability: {e}")))?;
        predictions.insert(patient_id.to_string(), prob);
    }
    Ok(predictions)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::prediction_map;

    #[test]
    fn predictions_round_trip_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valid.json");
        let predictions = prediction_map(&[("p1", 0.25), ("p2", 0.75)]);

        save_predictions(&path, &predictions).unwrap();
        assert_eq!(load_predictions(&path).unwrap(), predictions);
    }

    #[test]
    fn submission_round_trips_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("submission.csv");
        let predictions = prediction_map(&[("p1", 0.125), ("p2", 0.5)]);

        write_submission(&path, &predictions).unwrap();
        assert_eq!(read_submission(&path).unwrap(), predictions);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("id,probability\n"));
    }

    #[test]
    fn report_displays_weights_and_folds() {
        let mut weights = ModelWeights::new();
        weights.insert("a".into(), 0.7);
        weights.insert("b".into(), 0.3);
        let report = WeightReport {
            weights,
            training_loss: 0.42,
            cv: vec![],
        };

        let rendered = format!("{report}");
        assert!(rendered.contains("a: 0.700000"));
        assert!(rendered.contains("0.420000"));
    }
}
