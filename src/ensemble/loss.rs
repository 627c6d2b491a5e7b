//! Cross-entropy loss of a softmax-weighted model blend.
//!
//! The optimization variable is an unconstrained real vector `W` of length
//! `n_models`; the blending weight per model is `softmax(W)`. [`BlendLoss`]
//! evaluates the mean cross-entropy of the blended two-class predictions and
//! its closed-form gradient with respect to `W`.
//!
//! Gradient derivation: with `w = softmax(W)`, `ŷ = Σ_m w_m X_m` and
//! `L = -(1/P) Σ_{p,c} t_pc ln(clip(ŷ_pc))`,
//!
//! ```text
//! ∂L/∂w_m = -(1/P) Σ_{p,c} t_pc X_mpc / ŷ_pc
//! ∂L/∂W_j = w_j (∂L/∂w_j − Σ_k w_k ∂L/∂w_k)
//! ```

use ndarray::{Array2, ArrayView2, ArrayView3};

/// Probabilities are clipped to `[EPS, 1 - EPS]` before taking logs.
pub const CLIP_EPS: f64 = 1e-15;

// =============================================================================
// Softmax
// =============================================================================

/// Softmax function (numerically stable).
pub fn softmax(input: &[f64], output: &mut [f64]) {
    debug_assert_eq!(input.len(), output.len());

    if input.is_empty() {
        return;
    }

    // Find max for numerical stability
    let max_val = input.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut sum = 0.0f64;
    for (inp, out) in input.iter().zip(output.iter_mut()) {
        *out = (*inp - max_val).exp();
        sum += *out;
    }

    if sum > 0.0 {
        for out in output.iter_mut() {
            *out /= sum;
        }
    }
}

// =============================================================================
// BlendLoss
// =============================================================================

/// Mean cross-entropy of softmax-weighted stacked predictions.
///
/// Borrows the stacked tensor (`[n_models, n_patients, 2]`) and the one-hot
/// targets (`[n_patients, 2]`) for the lifetime of the optimization.
pub struct BlendLoss<'a> {
    stack: ArrayView3<'a, f64>,
    targets: ArrayView2<'a, f64>,
}

impl<'a> BlendLoss<'a> {
    /// Create a loss over the given stack and targets.
    ///
    /// # Panics
    ///
    /// Panics if the patient or class dimensions disagree.
    pub fn new(stack: ArrayView3<'a, f64>, targets: ArrayView2<'a, f64>) -> Self {
        assert_eq!(
            stack.dim().1,
            targets.dim().0,
            "stack and targets disagree on patient count"
        );
        assert_eq!(stack.dim().2, 2, "stack must be two-class");
        assert_eq!(targets.dim().1, 2, "targets must be one-hot two-class");
        Self { stack, targets }
    }

    /// Number of models in the stack.
    pub fn n_models(&self) -> usize {
        self.stack.dim().0
    }

    /// Blend the stack with simplex weights: `ŷ_pc = Σ_m w_m X_mpc`.
    pub fn blend(&self, weights: &[f64]) -> Array2<f64> {
        let (n_models, n_patients, n_classes) = self.stack.dim();
        debug_assert_eq!(weights.len(), n_models);

        let mut blended = Array2::zeros((n_patients, n_classes));
        for m in 0..n_models {
            let w = weights[m];
            for p in 0..n_patients {
                for c in 0..n_classes {
                    blended[[p, c]] += w * self.stack[[m, p, c]];
                }
            }
        }
        blended
    }

    /// Loss at the unconstrained vector `w_raw`.
    pub fn value(&self, w_raw: &[f64]) -> f64 {
        let mut weights = vec![0.0; w_raw.len()];
        softmax(w_raw, &mut weights);
        let blended = self.blend(&weights);
        mean_cross_entropy(blended.view(), self.targets)
    }

    /// Loss and gradient with respect to `w_raw`, gradient written into `grad`.
    pub fn value_and_grad(&self, w_raw: &[f64], grad: &mut [f64]) -> f64 {
        let (n_models, n_patients, n_classes) = self.stack.dim();
        debug_assert_eq!(w_raw.len(), n_models);
        debug_assert_eq!(grad.len(), n_models);

        let mut weights = vec![0.0; n_models];
        softmax(w_raw, &mut weights);
        let blended = self.blend(&weights);

        // ∂L/∂w_m, against the clipped blend
        let mut simplex_grad = vec![0.0; n_models];
        let mut loss = 0.0;
        for p in 0..n_patients {
            for c in 0..n_classes {
                let t = self.targets[[p, c]];
                if t == 0.0 {
                    continue;
                }
                let y = blended[[p, c]].clamp(CLIP_EPS, 1.0 - CLIP_EPS);
                loss -= t * y.ln();
                for (m, g) in simplex_grad.iter_mut().enumerate() {
                    *g -= t * self.stack[[m, p, c]] / y;
                }
            }
        }
        let scale = 1.0 / n_patients as f64;
        loss *= scale;

        // Chain through the softmax reparameterization
        let mut weighted_sum = 0.0;
        for m in 0..n_models {
            simplex_grad[m] *= scale;
            weighted_sum += weights[m] * simplex_grad[m];
        }
        for m in 0..n_models {
            grad[m] = weights[m] * (simplex_grad[m] - weighted_sum);
        }

        loss
    }
}

// =============================================================================
// Loss helpers
// =============================================================================

/// Cross-entropy summed over classes, averaged over patients.
fn mean_cross_entropy(predictions: ArrayView2<'_, f64>, targets: ArrayView2<'_, f64>) -> f64 {
    let n_patients = predictions.dim().0;
    if n_patients == 0 {
        return 0.0;
    }

    let mut loss = 0.0;
    for (y, t) in predictions.iter().zip(targets.iter()) {
        if *t == 0.0 {
            continue;
        }
        let y = y.clamp(CLIP_EPS, 1.0 - CLIP_EPS);
        loss -= t * y.ln();
    }
    loss / n_patients as f64
}

/// Cross-entropy per patient, summed over classes.
pub fn patient_log_losses(
    predictions: ArrayView2<'_, f64>,
    targets: ArrayView2<'_, f64>,
) -> Vec<f64> {
    let (n_patients, n_classes) = predictions.dim();
    let mut losses = vec![0.0; n_patients];
    for p in 0..n_patients {
        for c in 0..n_classes {
            let t = targets[[p, c]];
            if t == 0.0 {
                continue;
            }
            let y = predictions[[p, c]].clamp(CLIP_EPS, 1.0 - CLIP_EPS);
            losses[p] -= t * y.ln();
        }
    }
    losses
}

/// Binary log loss of positive-class probabilities against {0,1} labels.
pub fn binary_log_loss(probs: &[f64], labels: &[u8]) -> f64 {
    debug_assert_eq!(probs.len(), labels.len());
    if probs.is_empty() {
        return 0.0;
    }

    let mut loss = 0.0;
    for (&p, &label) in probs.iter().zip(labels.iter()) {
        let p = p.clamp(CLIP_EPS, 1.0 - CLIP_EPS);
        loss -= if label == 1 { p.ln() } else { (1.0 - p).ln() };
    }
    loss / probs.len() as f64
}

/// Central finite-difference gradient, for verifying analytic gradients.
pub fn numerical_gradient<F>(mut f: F, x: &[f64], step: f64) -> Vec<f64>
where
    F: FnMut(&[f64]) -> f64,
{
    let mut grad = vec![0.0; x.len()];
    let mut probe = x.to_vec();
    for i in 0..x.len() {
        probe[i] = x[i] + step;
        let plus = f(&probe);
        probe[i] = x[i] - step;
        let minus = f(&probe);
        probe[i] = x[i];
        grad[i] = (plus - minus) / (2.0 * step);
    }
    grad
}

// =============================================================================
// Tests
// =============================================================================
