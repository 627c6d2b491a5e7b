//! Limited-memory BFGS minimizer.
//!
//! A compact L-BFGS with the standard two-loop recursion and Armijo
//! backtracking line search. The problem dimension here is the number of
//! ensembled models, so the history and per-iteration cost are tiny; the
//! implementation favors clarity over vectorization.

use std::collections::VecDeque;

// =============================================================================
// LbfgsParams
// =============================================================================

/// Parameters for L-BFGS minimization.
#[derive(Debug, Clone)]
pub struct LbfgsParams {
    /// Number of curvature pairs kept for the two-loop recursion.
    pub history: usize,

    /// Convergence tolerance on the gradient infinity norm.
    pub grad_tol: f64,

    /// Maximum number of function/gradient evaluations.
    pub max_evals: usize,

    /// Initial step length tried by the line search.
    pub initial_step: f64,

    /// Armijo sufficient-decrease constant.
    pub armijo_c1: f64,

    /// Step shrink factor on line-search failure.
    pub backtrack: f64,

    /// Maximum backtracking steps before giving up on a direction.
    pub max_backtracks: usize,
}

impl Default for LbfgsParams {
    fn default() -> Self {
        Self {
            history: 10,
            grad_tol: 1e-9,
            max_evals: 10_000,
            initial_step: 1.0,
            armijo_c1: 1e-4,
            backtrack: 0.5,
            max_backtracks: 40,
        }
    }
}

// =============================================================================
// LbfgsResult
// =============================================================================

/// Outcome of a minimization run.
///
/// `converged` is informational: callers that need the scipy-style behavior
/// of using the final iterate regardless of the termination reason can simply
/// ignore it.
#[derive(Debug, Clone)]
pub struct LbfgsResult {
    /// Final iterate.
    pub x: Vec<f64>,
    /// Loss at the final iterate.
    pub loss: f64,
    /// Function/gradient evaluations consumed.
    pub n_evals: usize,
    /// Whether the gradient tolerance was reached.
    pub converged: bool,
}

// =============================================================================
// minimize
// =============================================================================

/// Minimize `f` starting from `x0`.
///
/// `f` evaluates the loss at a point and writes the gradient into its second
/// argument. Returns the best iterate found when the gradient tolerance, the
/// evaluation limit, or a failed line search stops the run.
pub fn minimize<F>(mut f: F, x0: &[f64], params: &LbfgsParams) -> LbfgsResult
where
    F: FnMut(&[f64], &mut [f64]) -> f64,
{
    let n = x0.len();
    let mut x = x0.to_vec();
    let mut grad = vec![0.0; n];
    let mut loss = f(&x, &mut grad);
    let mut n_evals = 1;

    // (s, y, 1/sᵀy) pairs, oldest first
    let mut history: VecDeque<(Vec<f64>, Vec<f64>, f64)> = VecDeque::new();

    let mut new_x = vec![0.0; n];
    let mut new_grad = vec![0.0; n];

    let mut converged = inf_norm(&grad) <= params.grad_tol;
    while !converged && n_evals < params.max_evals {
        let mut direction = two_loop_direction(&grad, &history);

        // Fall back to steepest descent if the recursion produced an ascent
        // direction (possible right after a history reset).
        let mut slope = dot(&direction, &grad);
        if slope >= 0.0 {
            for (d, g) in direction.iter_mut().zip(grad.iter()) {
                *d = -g;
            }
            slope = -dot(&grad, &grad);
        }

        // Armijo backtracking
        let mut step = params.initial_step;
        let mut accepted = false;
        for _ in 0..params.max_backtracks {
            for i in 0..n {
                new_x[i] = x[i] + step * direction[i];
            }
            let new_loss = f(&new_x, &mut new_grad);
            n_evals += 1;

            if new_loss <= loss + params.armijo_c1 * step * slope {
                let s: Vec<f64> = new_x.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
                let y: Vec<f64> = new_grad
                    .iter()
                    .zip(grad.iter())
                    .map(|(a, b)| a - b)
                    .collect();
                let sy = dot(&s, &y);
                // Only curvature-positive pairs keep the Hessian estimate SPD
                if sy > 1e-12 {
                    if history.len() == params.history {
                        history.pop_front();
                    }
                    history.push_back((s, y, 1.0 / sy));
                }

                x.copy_from_slice(&new_x);
                grad.copy_from_slice(&new_grad);
                loss = new_loss;
                accepted = true;
                break;
            }

            step *= params.backtrack;
            if n_evals >= params.max_evals {
                break;
            }
        }

        if !accepted {
            break;
        }
        converged = inf_norm(&grad) <= params.grad_tol;
    }

    LbfgsResult {
        x,
        loss,
        n_evals,
        converged,
    }
}

/// Two-loop recursion: approximate -H·grad from the curvature history.
fn two_loop_direction(grad: &[f64], history: &VecDeque<(Vec<f64>, Vec<f64>, f64)>) -> Vec<f64> {
    let mut direction: Vec<f64> = grad.iter().map(|g| -g).collect();

    let mut alphas = Vec::with_capacity(history.len());
    for (s, y, rho) in history.iter().rev() {
        let alpha = rho * dot(s, &direction);
        axpy(-alpha, y, &mut direction);
        alphas.push(alpha);
    }

    // Initial Hessian scaling from the most recent pair
    if let Some((s, y, _)) = history.back() {
        let yy = dot(y, y);
        if yy > 0.0 {
            let gamma = dot(s, y) / yy;
            for d in direction.iter_mut() {
                *d *= gamma;
            }
        }
    }

    for ((s, y, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = rho * dot(y, &direction);
        axpy(alpha - beta, s, &mut direction);
    }

    direction
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

// =============================================================================
// Tests
// =============================================================================
