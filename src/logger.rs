//! Structured progress logging with verbosity levels.
//!
//! Both the ensemble optimizer and the scan runner report progress through
//! [`TrainingLogger`], gated on a [`Verbosity`] level carried in their
//! parameter structs. Metric lines are wrapped in [`MetricValue`] so they
//! render uniformly (`name: value`).

use std::fmt;

// =============================================================================
// Verbosity
// =============================================================================

/// Verbosity level for progress output.
///
/// Levels are ordered: `Silent < Warning < Info < Debug`. Components compare
/// with `>=` before emitting, e.g. `if verbosity >= Verbosity::Info { ... }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// No output at all.
    Silent,
    /// Only warnings.
    #[default]
    Warning,
    /// Per-fold / per-volume progress lines.
    Info,
    /// Everything, including per-evaluation detail.
    Debug,
}

// =============================================================================
// MetricValue
// =============================================================================

/// A computed metric value with metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    /// Name of the metric (e.g., "train-logloss", "valid-logloss").
    pub name: String,
    /// The computed value.
    pub value: f64,
    /// Whether higher values are better (false for log loss).
    pub higher_is_better: bool,
}

impl MetricValue {
    /// Create a new metric value.
    pub fn new(name: impl Into<String>, value: f64, higher_is_better: bool) -> Self {
        Self {
            name: name.into(),
            value,
            higher_is_better,
        }
    }

    /// Returns true if this value is better than another.
    pub fn is_better_than(&self, other: &Self) -> bool {
        if self.higher_is_better {
            self.value > other.value
        } else {
            self.value < other.value
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.6}", self.name, self.value)
    }
}

// =============================================================================
// TrainingLogger
// =============================================================================

/// Console logger for optimization and scan progress.
///
/// All methods are no-ops below their required verbosity, so callers can
/// invoke them unconditionally.
#[derive(Debug, Clone, Copy)]
pub struct TrainingLogger {
    verbosity: Verbosity,
}

impl TrainingLogger {
    /// Create a new logger with the given verbosity.
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// The configured verbosity.
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Announce the start of weight optimization.
    pub fn start_optimization(&self, n_models: usize, n_patients: usize) {
        if self.verbosity >= Verbosity::Info {
            println!(
                "optimizing weights for {} models over {} patients",
                n_models, n_patients
            );
        }
    }

    /// Log one diagnostic fold's metrics on a single line.
    pub fn log_fold(&self, fold: usize, metrics: &[MetricValue]) {
        if self.verbosity >= Verbosity::Info {
            let line: Vec<String> = metrics.iter().map(|m| m.to_string()).collect();
            println!("[fold {}] {}", fold, line.join("  "));
        }
    }

    /// Log the final weight assigned to one model.
    pub fn log_weight(&self, model_id: &str, weight: f64) {
        if self.verbosity >= Verbosity::Info {
            println!("weight for {} is {:.6}", model_id, weight);
        }
    }

    /// Log the final training loss.
    pub fn log_final_loss(&self, loss: f64) {
        if self.verbosity >= Verbosity::Info {
            println!("final training loss: {:.6}", loss);
        }
    }

    /// Log progress on one scanned volume.
    pub fn log_volume(&self, index: usize, patient_id: &str, elapsed_secs: f64) {
        if self.verbosity >= Verbosity::Info {
            println!("[{}] {} scanned in {:.1}s", index, patient_id, elapsed_secs);
        }
    }

    /// Emit a warning line.
    pub fn warn(&self, message: &str) {
        if self.verbosity >= Verbosity::Warning {
            eprintln!("warning: {}", message);
        }
    }

    /// Announce completion.
    pub fn finish(&self) {
        if self.verbosity >= Verbosity::Info {
            println!("done");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_ordering() {
        assert!(Verbosity::Silent < Verbosity::Warning);
        assert!(Verbosity::Warning < Verbosity::Info);
        assert!(Verbosity::Info < Verbosity::Debug);
        assert_eq!(Verbosity::default(), Verbosity::Warning);
    }

    #[test]
    fn metric_value_comparison() {
        let a = MetricValue::new("logloss", 0.4, false);
        let b = MetricValue::new("logloss", 0.6, false);
        assert!(a.is_better_than(&b));
        assert!(!b.is_better_than(&a));

        let c = MetricValue::new("auc", 0.9, true);
        let d = MetricValue::new("auc", 0.8, true);
        assert!(c.is_better_than(&d));
    }

    #[test]
    fn metric_value_display() {
        let m = MetricValue::new("valid-logloss", 0.123456, false);
        assert_eq!(format!("{}", m), "valid-logloss: 0.123456");
    }
}
