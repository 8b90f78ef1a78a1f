//! Dense linear-algebra helpers for the least-squares solver.
//!
//! Each Levenberg–Marquardt step solves a tiny symmetric system
//!
//! ```text
//! (JᵀJ + λ D) δ = -Jᵀr
//! ```
//!
//! with one or two unknowns. We try Cholesky first and fall back to SVD when the
//! damped matrix is not numerically positive definite (e.g. a parameter whose
//! Jacobian column vanishes).

use nalgebra::{DMatrix, DVector};

/// Solve a symmetric system `a x = b`.
///
/// Returns `None` if neither Cholesky nor SVD produces a finite solution.
pub fn solve_symmetric(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = a.clone().cholesky() {
        let x = chol.solve(b);
        if x.iter().all(|v| v.is_finite()) {
            return Some(x);
        }
    }
    solve_least_squares(a, b)
}

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Parameter covariance from the Jacobian at the optimum.
///
/// Follows the `curve_fit` convention without absolute sigma:
/// `cov = (JᵀJ)⁻¹ · SSE / (m - k)`.
///
/// Returns `None` when there are no residual degrees of freedom (`m <= k`) or
/// `J` is rank deficient.
pub fn covariance_from_jacobian(jacobian: &DMatrix<f64>, sse: f64) -> Option<DMatrix<f64>> {
    let (m, k) = jacobian.shape();
    if m <= k || k == 0 || !sse.is_finite() {
        return None;
    }

    let svd = jacobian.clone().svd(false, true);
    let v_t = svd.v_t?;
    let s = &svd.singular_values;

    let s_max = s.iter().cloned().fold(0.0_f64, f64::max);
    let threshold = f64::EPSILON * m.max(k) as f64 * s_max;
    if s_max <= 0.0 || s.iter().any(|&sv| sv <= threshold) {
        return None;
    }

    // (JᵀJ)⁻¹ = V S⁻² Vᵀ
    let mut scaled = v_t.transpose();
    for (j, &sv) in s.iter().enumerate() {
        let inv = 1.0 / (sv * sv);
        for i in 0..scaled.nrows() {
            scaled[(i, j)] *= inv;
        }
    }
    let inv_jtj = &scaled * &v_t;

    let variance = sse / (m - k) as f64;
    let cov = inv_jtj * variance;
    if cov.iter().all(|v| v.is_finite()) {
        Some(cov)
    } else {
        None
    }
}
