use log::debug;

use crate::error::SolverError;
use crate::matrix::Matrix;

const MAX_ITERATIONS: usize = 2_000;
const GRAD_TOLERANCE: f64 = 1e-10;

/// The outcome of a QP or MIQP solve (SPEC_FULL §4.4): the nonnegative
/// weight of every candidate conformer, plus the minimized quadratic value.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub weights: Vec<f64>,
    pub obj_value: f64,
}

impl Solution {
    /// `2 * obj_value + t.t`, the diagnostic "remaining density" value
    /// (SPEC_FULL §4.4).
    pub fn remainder(&self, target: &[f64]) -> f64 {
        let tt: f64 = target.iter().map(|v| v * v).sum();
        2.0 * self.obj_value + tt
    }
}

fn objective(q: &Matrix, c: &[f64], w: &[f64]) -> f64 {
    let qw = q.mul_vec(w);
    let quad: f64 = w.iter().zip(qw.iter()).map(|(wi, qwi)| wi * qwi).sum();
    let lin: f64 = w.iter().zip(c.iter()).map(|(wi, ci)| wi * ci).sum();
    0.5 * quad - lin
}

fn gradient(q: &Matrix, c: &[f64], w: &[f64]) -> Vec<f64> {
    let qw = q.mul_vec(w);
    qw.iter().zip(c.iter()).map(|(qwi, ci)| qwi - ci).collect()
}

/// Largest eigenvalue of a symmetric PSD matrix, estimated by power
/// iteration; used as the Lipschitz constant of the QP gradient so the
/// projected-gradient step size is safely stable.
fn largest_eigenvalue(q: &Matrix) -> f64 {
    let n = q.rows();
    if n == 0 { return 1.0; }
    let mut v = vec![1.0 / (n as f64).sqrt(); n];
    let mut lambda = 1.0;
    for _ in 0..100 {
        let qv = q.mul_vec(&v);
        let norm: f64 = qv.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm < 1e-14 { return 1.0; }
        lambda = norm;
        v = qv.iter().map(|x| x / norm).collect();
    }
    lambda.max(1e-8)
}

/// Projects `v` onto `{ w : lower_i <= w_i <= upper_i, sum(w) <= cap }` by
/// bisecting for the Lagrange multiplier `mu` of the sum constraint: for a
/// fixed `mu`, `w_i(mu) = clamp(v_i - mu, lower_i, upper_i)` is monotonically
/// non-increasing in `mu`, so `sum(w(mu))` is too, and the root of
/// `sum(w(mu)) = cap` (if one exists below `cap` at `mu = 0`) is found by
/// bisection.
fn project_box_capped_simplex(v: &[f64], lower: &[f64], upper: &[f64], cap: f64) -> Vec<f64> {
    let clamp_at = |mu: f64| -> Vec<f64> {
        v.iter().zip(lower.iter()).zip(upper.iter())
            .map(|((vi, lo), hi)| (vi - mu).clamp(*lo, *hi))
            .collect()
    };

    let at_zero = clamp_at(0.0);
    let sum_at_zero: f64 = at_zero.iter().sum();
    if sum_at_zero <= cap + 1e-12 {
        return at_zero;
    }

    let mut lo_mu = 0.0_f64;
    let mut hi_mu = v.iter().cloned().fold(f64::MIN, f64::max) + 1.0;
    for _ in 0..100 {
        let mid = 0.5 * (lo_mu + hi_mu);
        let w = clamp_at(mid);
        let s: f64 = w.iter().sum();
        if s > cap { lo_mu = mid; } else { hi_mu = mid; }
    }
    clamp_at(hi_mu)
}

/// Solves `min_w 1/2 w^T Q w - w^T c` subject to `lower_i <= w_i <= upper_i`
/// and `sum(w) <= cap`, via projected gradient descent (FISTA-style
/// momentum) starting from the all-`lower` point.
fn solve_box_capped_qp(
    q: &Matrix,
    c: &[f64],
    lower: &[f64],
    upper: &[f64],
    cap: f64,
) -> Result<Solution, SolverError> {
    let n = q.rows();
    if n == 0 {
        return Ok(Solution { weights: Vec::new(), obj_value: 0.0 });
    }

    let l = largest_eigenvalue(q);
    let step = 1.0 / l;

    let mut w = project_box_capped_simplex(lower, lower, upper, cap);
    let mut y = w.clone();
    let mut t = 1.0_f64;

    for iteration in 0..MAX_ITERATIONS {
        let grad = gradient(q, c, &y);
        let grad_norm: f64 = grad.iter().map(|g| g * g).sum::<f64>().sqrt();

        let raw: Vec<f64> = y.iter().zip(grad.iter()).map(|(yi, gi)| yi - step * gi).collect();
        let w_next = project_box_capped_simplex(&raw, lower, upper, cap);

        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
        let momentum = (t - 1.0) / t_next;
        y = w_next.iter().zip(w.iter())
            .map(|(wn, wp)| wn + momentum * (wn - wp))
            .collect();

        let delta: f64 = w_next.iter().zip(w.iter()).map(|(a, b)| (a - b).abs()).sum();
        w = w_next;
        t = t_next;

        if grad_norm < GRAD_TOLERANCE || delta < 1e-12 {
            debug!("projected-gradient QP converged after {} iterations", iteration);
            break;
        }
    }

    let obj_value = objective(q, c, &w);
    Ok(Solution { weights: w, obj_value })
}

/// Solves the QP of SPEC_FULL §4.4: `min 1/2 w^T(MM^T)w - w^T(Mt)` subject to
/// `w_i >= 0` and `sum(w) <= 1`.
pub fn solve_qp(target: &[f64], models: &Matrix) -> Result<Solution, SolverError> {
    if models.rows() == 0 {
        return Err(SolverError::NoCandidates);
    }
    if target.len() != models.cols() {
        return Err(SolverError::DimensionMismatch { target_len: target.len(), model_cols: models.cols() });
    }

    let q = models.gram();
    let c = models.mul_vec(target);
    let n = models.rows();
    let lower = vec![0.0; n];
    let upper = vec![1.0; n];
    solve_box_capped_qp(&q, &c, &lower, &upper, 1.0)
}

/// Solves the MIQP of SPEC_FULL §4.4: the same objective, with the
/// additional requirement that `w_i` is either exactly `0` or lies in
/// `[threshold, 1]`, and at most `cardinality` weights are nonzero.
///
/// Implemented as branch-and-bound over which candidates are allowed to be
/// active: every node fixes a subset of indices to exactly zero (the
/// "excluded" branch) and solves the restricted box-capped QP over the
/// rest with a `[threshold, 1]` lower bound on the still-free indices,
/// pruning any branch whose free-index count can no longer satisfy the
/// cardinality bound.
pub fn solve_miqp(
    target: &[f64],
    models: &Matrix,
    cardinality: usize,
    threshold: f64,
) -> Result<Solution, SolverError> {
    if models.rows() == 0 {
        return Err(SolverError::NoCandidates);
    }
    if target.len() != models.cols() {
        return Err(SolverError::DimensionMismatch { target_len: target.len(), model_cols: models.cols() });
    }

    let q = models.gram();
    let c = models.mul_vec(target);
    let n = models.rows();

    if cardinality >= n {
        // Every candidate may be active: a single restricted-QP solve covers it.
        let lower = vec![0.0; n];
        let upper = vec![1.0; n];
        return solve_threshold_qp(&q, &c, &lower, &upper, threshold);
    }

    let mut best: Option<Solution> = None;
    let mut active = vec![false; n];
    branch(&q, &c, threshold, cardinality, 0, &mut active, &mut best);

    best.ok_or(SolverError::DidNotConverge { iterations: MAX_ITERATIONS })
}

/// Recursive branch-and-bound: at index `i`, either exclude candidate `i`
/// (forced to weight 0) or include it (free to take `[threshold, 1]`),
/// subject to never exceeding `cardinality` included candidates.
fn branch(
    q: &Matrix,
    c: &[f64],
    threshold: f64,
    cardinality: usize,
    i: usize,
    active: &mut Vec<bool>,
    best: &mut Option<Solution>,
) {
    let n = active.len();
    if i == n {
        let included = active.iter().filter(|a| **a).count();
        if included == 0 {
            let candidate = Solution { weights: vec![0.0; n], obj_value: 0.0 };
            update_best(best, candidate);
            return;
        }
        let lower: Vec<f64> = active.iter().map(|a| if *a { threshold } else { 0.0 }).collect();
        let upper: Vec<f64> = active.iter().map(|a| if *a { 1.0 } else { 0.0 }).collect();
        if let Ok(sol) = solve_box_capped_qp(q, c, &lower, &upper, 1.0) {
            update_best(best, sol);
        }
        return;
    }

    let included_so_far = active[..i].iter().filter(|a| **a).count();

    // Exclude branch: always explorable.
    active[i] = false;
    branch(q, c, threshold, cardinality, i + 1, active, best);

    // Include branch: only if the cardinality budget allows it.
    if included_so_far < cardinality {
        active[i] = true;
        branch(q, c, threshold, cardinality, i + 1, active, best);
        active[i] = false;
    }
}

fn update_best(best: &mut Option<Solution>, candidate: Solution) {
    let better = match best {
        None => true,
        Some(current) => candidate.obj_value < current.obj_value,
    };
    if better {
        *best = Some(candidate);
    }
}

/// Solves the relaxed form used when `cardinality >= n` (every candidate may
/// be active): any nonzero weight must still respect the `[threshold, 1]`
/// box once it leaves zero. Solved by comparing the unconstrained-lower-bound
/// solve against the all-active thresholded solve and keeping the better.
fn solve_threshold_qp(
    q: &Matrix,
    c: &[f64],
    lower: &[f64],
    upper: &[f64],
    threshold: f64,
) -> Result<Solution, SolverError> {
    let n = q.rows();
    let thresholded_lower: Vec<f64> = lower.iter().map(|_| threshold).collect();
    let with_threshold = solve_box_capped_qp(q, c, &thresholded_lower, upper, 1.0)?;
    let all_zero = Solution { weights: vec![0.0; n], obj_value: 0.0 };
    Ok(if with_threshold.obj_value <= all_zero.obj_value { with_threshold } else { all_zero })
}
