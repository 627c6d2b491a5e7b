//! Stratified cross-validation folds for optimizer diagnostics.
//!
//! Folds preserve the class balance of the cohort: indices are grouped by
//! label, shuffled with a seeded generator, and dealt round-robin across
//! folds. The split is deterministic for a given `(labels, n_folds, seed)`.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;

// =============================================================================
// CvFoldResult
// =============================================================================

/// Diagnostic record for one cross-validation fold.
///
/// Collected for reporting only; fold results do not feed back into the
/// final weight fit.
#[derive(Debug, Clone, Serialize)]
pub struct CvFoldResult {
    /// Fold index in `[0, n_folds)`.
    pub fold: usize,
    /// Simplex weights fitted on the fold's training side, in stack model order.
    pub weights: Vec<f64>,
    /// Mean cross-entropy on the training side.
    pub training_loss: f64,
    /// Binary log loss on the held-out side.
    pub validation_loss: f64,
    /// Stack patient indices of the training side.
    pub train_indices: Vec<usize>,
}

// =============================================================================
// stratified_folds
// =============================================================================

/// Split patient indices into `n_folds` stratified held-out sets.
///
/// Returns one sorted index set per fold. With fewer members of a class than
/// folds, some folds receive no member of that class; folds can be empty for
/// very small cohorts and callers are expected to skip those.
pub fn stratified_folds(labels: &[u8], n_folds: usize, seed: u64) -> Vec<Vec<usize>> {
    assert!(n_folds >= 2, "cross-validation needs at least 2 folds");

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_folds];

    // Classes processed in fixed order so the split is reproducible
    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == class)
            .map(|(idx, _)| idx)
            .collect();
        members.shuffle(&mut rng);

        for (i, idx) in members.into_iter().enumerate() {
            folds[i % n_folds].push(idx);
        }
    }

    for fold in folds.iter_mut() {
        fold.sort_unstable();
    }
    folds
}

/// Complement of a sorted held-out set over `0..n_total`.
pub fn complement(held_out: &[usize], n_total: usize) -> Vec<usize> {
    let mut in_fold = vec![false; n_total];
    for &idx in held_out {
        in_fold[idx] = true;
    }
    (0..n_total).filter(|&idx| !in_fold[idx]).collect()
}

// =============================================================================
// Tests
// =============================================================================
