//! Box-constrained Levenberg–Marquardt.
//!
//! Minimizes `SSE(x) = Σ r_i(x)²` subject to `lower <= x <= upper`, where the
//! residual vector `r(x)` comes from a caller-supplied closure.
//!
//! Each trial step:
//! 1. solves `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr` over the *free* parameters (a
//!    parameter sitting on a bound whose gradient points outward is frozen),
//! 2. projects `x + δ` back onto the box,
//! 3. accepts the trial if SSE drops, updating `λ` with Nielsen's gain-ratio
//!    rule; otherwise grows `λ` and retries.
//!
//! The Jacobian is a forward-difference approximation, switched to a backward
//! difference when the forward probe would leave the box.
//!
//! Stopping rules:
//! - zero residual,
//! - accepted step reduced SSE by less than `ftol · SSE`,
//! - projected step shorter than `xtol · (xtol + ‖x‖)`,
//! - largest cosine between `r` and a free Jacobian column below `gtol`.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::Termination;
use crate::error::SirError;
use crate::fit::options::FitOptions;
use crate::math::ols::solve_symmetric;

/// `sqrt(f64::EPSILON)`.
const FD_STEP: f64 = 1.490_116_119_384_765_6e-8;

/// Floor on diagonal scaling so a vanishing Jacobian column still gets damped.
const DIAG_FLOOR: f64 = 1e-12;

const LAMBDA_MAX: f64 = 1e300;

/// Result of a converged run.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub x: Vec<f64>,
    pub residuals: Vec<f64>,
    pub sse: f64,
    /// Jacobian of the residuals at `x`.
    pub jacobian: DMatrix<f64>,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

/// Minimize the sum of squared residuals within `[lower, upper]`.
///
/// The starting point is projected onto the box before the first evaluation.
///
/// # Errors
/// - `InvalidParameter` if dimensions disagree or the residual vector is empty.
/// - `NumericalInstability` if the closure yields a non-finite residual or the
///   damped normal equations cannot be solved.
/// - `Convergence` if `max_iterations` trial steps pass without meeting a
///   stopping rule.
/// - Any error returned by `residual_fn` itself.
pub fn minimize_bounded<F>(
    mut residual_fn: F,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: &FitOptions,
) -> Result<LmOutcome, SirError>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>, SirError>,
{
    let k = x0.len();
    if k == 0 || lower.len() != k || upper.len() != k {
        return Err(SirError::invalid(format!(
            "dimension mismatch: x0={k}, lower={}, upper={}",
            lower.len(),
            upper.len()
        )));
    }

    let mut evaluations = 0usize;
    let mut x = project(x0, lower, upper);
    let mut r = evaluate(&mut residual_fn, &x, &mut evaluations)?;
    if r.is_empty() {
        return Err(SirError::invalid("residual vector is empty"));
    }
    let mut sse = sum_sq(&r);
    let mut jac = jacobian(&mut residual_fn, &x, &r, lower, upper, &mut evaluations)?;

    if sse == 0.0 {
        return Ok(outcome(x, r, sse, jac, 0, evaluations, Termination::ZeroResidual));
    }

    let mut lambda = options.initial_damping();
    let mut nu = 2.0_f64;

    for iteration in 1..=options.max_iterations() {
        let jt = jac.transpose();
        let jtj = &jt * &jac;
        let g = &jt * DVector::from_column_slice(&r);

        let free: Vec<bool> = (0..k)
            .map(|j| !blocked_by_bound(x[j], g[j], lower[j], upper[j]))
            .collect();

        if max_gradient_cosine(&jac, &g, &free, sse) <= options.gtol() {
            return Ok(outcome(x, r, sse, jac, iteration - 1, evaluations, Termination::GradientTolerance));
        }

        let mut a = jtj.clone();
        let mut rhs = -g.clone();
        for j in 0..k {
            a[(j, j)] += lambda * jtj[(j, j)].max(DIAG_FLOOR);
        }
        for j in 0..k {
            if !free[j] {
                for c in 0..k {
                    a[(j, c)] = 0.0;
                    a[(c, j)] = 0.0;
                }
                a[(j, j)] = 1.0;
                rhs[j] = 0.0;
            }
        }

        let delta = solve_symmetric(&a, &rhs)
            .ok_or_else(|| SirError::unstable("damped normal equations could not be solved"))?;

        let x_trial: Vec<f64> = (0..k)
            .map(|j| (x[j] + delta[j]).clamp(lower[j], upper[j]))
            .collect();
        let step = DVector::from_iterator(k, (0..k).map(|j| x_trial[j] - x[j]));

        let x_norm = DVector::from_column_slice(&x).norm();
        if step.norm() <= options.xtol() * (options.xtol() + x_norm) {
            return Ok(outcome(x, r, sse, jac, iteration, evaluations, Termination::StepTolerance));
        }

        let r_trial = evaluate(&mut residual_fn, &x_trial, &mut evaluations)?;
        let sse_trial = sum_sq(&r_trial);
        let actual = sse - sse_trial;

        if actual > 0.0 {
            // Gauss–Newton model: SSE(x + s) ≈ SSE + 2 gᵀs + sᵀ JᵀJ s
            let predicted = -(2.0 * g.dot(&step) + step.dot(&(&jtj * &step)));
            let rho = if predicted > 0.0 { actual / predicted } else { 1.0 };

            let prev_sse = sse;
            x = x_trial;
            r = r_trial;
            sse = sse_trial;
            jac = jacobian(&mut residual_fn, &x, &r, lower, upper, &mut evaluations)?;

            lambda *= (1.0 / 3.0_f64).max(1.0 - (2.0 * rho - 1.0).powi(3));
            nu = 2.0;

            debug!(iteration, ?x, sse, lambda, "accepted step");

            if sse == 0.0 {
                return Ok(outcome(x, r, sse, jac, iteration, evaluations, Termination::ZeroResidual));
            }
            if actual <= options.ftol() * prev_sse {
                return Ok(outcome(x, r, sse, jac, iteration, evaluations, Termination::CostTolerance));
            }
        } else {
            lambda = (lambda * nu).min(LAMBDA_MAX);
            nu = (nu * 2.0).min(1e6);
            debug!(iteration, sse_trial, lambda, "rejected step");
        }
    }

    Err(SirError::Convergence {
        iterations: options.max_iterations(),
        cost: sse,
    })
}

fn outcome(
    x: Vec<f64>,
    residuals: Vec<f64>,
    sse: f64,
    jacobian: DMatrix<f64>,
    iterations: usize,
    evaluations: usize,
    termination: Termination,
) -> LmOutcome {
    LmOutcome {
        x,
        residuals,
        sse,
        jacobian,
        iterations,
        evaluations,
        termination,
    }
}

fn project(x: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(lower.iter().zip(upper.iter()))
        .map(|(&v, (&lo, &hi))| v.clamp(lo, hi))
        .collect()
}

fn sum_sq(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn evaluate<F>(residual_fn: &mut F, x: &[f64], evaluations: &mut usize) -> Result<Vec<f64>, SirError>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>, SirError>,
{
    *evaluations += 1;
    let r = residual_fn(x)?;
    if let Some(idx) = r.iter().position(|v| !v.is_finite()) {
        return Err(SirError::unstable(format!(
            "objective returned a non-finite residual at index {idx} for parameters {x:?}"
        )));
    }
    Ok(r)
}

fn jacobian<F>(
    residual_fn: &mut F,
    x: &[f64],
    r: &[f64],
    lower: &[f64],
    upper: &[f64],
    evaluations: &mut usize,
) -> Result<DMatrix<f64>, SirError>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>, SirError>,
{
    let m = r.len();
    let k = x.len();
    let mut jac = DMatrix::<f64>::zeros(m, k);

    for j in 0..k {
        let Some(h) = fd_step(x[j], lower[j], upper[j]) else {
            // Degenerate box: parameter is pinned, its column stays zero.
            continue;
        };

        let mut probe = x.to_vec();
        probe[j] += h;
        let r_probe = evaluate(residual_fn, &probe, evaluations)?;
        if r_probe.len() != m {
            return Err(SirError::unstable("residual length changed between evaluations"));
        }
        for i in 0..m {
            jac[(i, j)] = (r_probe[i] - r[i]) / h;
        }
    }

    Ok(jac)
}

/// Signed finite-difference step that keeps `x + h` inside `[lower, upper]`.
fn fd_step(x: f64, lower: f64, upper: f64) -> Option<f64> {
    let room_up = upper - x;
    let room_down = x - lower;
    if room_up <= 0.0 && room_down <= 0.0 {
        return None;
    }

    let h = FD_STEP * x.abs().max(1.0);
    if h <= room_up {
        Some(h)
    } else if h <= room_down {
        Some(-h)
    } else if room_up >= room_down {
        Some(room_up)
    } else {
        Some(-room_down)
    }
}

/// A descent step `-g` would push this parameter out of the box.
fn blocked_by_bound(x: f64, g: f64, lower: f64, upper: f64) -> bool {
    (x <= lower && g > 0.0) || (x >= upper && g < 0.0)
}

fn max_gradient_cosine(jac: &DMatrix<f64>, g: &DVector<f64>, free: &[bool], sse: f64) -> f64 {
    let r_norm = sse.sqrt();
    let mut worst = 0.0_f64;
    for (j, &is_free) in free.iter().enumerate() {
        if !is_free {
            continue;
        }
        let col_norm = jac.column(j).norm();
        if col_norm > 0.0 && r_norm > 0.0 {
            worst = worst.max(g[j].abs() / (r_norm * col_norm));
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exponential_decay() {
        // y = 3 exp(-0.5 t), exact data.
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = t.iter().map(|&ti| 3.0 * (-0.5 * ti).exp()).collect();

        let out = minimize_bounded(
            |p: &[f64]| Ok(t.iter().zip(&y).map(|(&ti, &yi)| p[0] * (-p[1] * ti).exp() - yi).collect()),
            &[1.0, 1.0],
            &[0.1, 0.01],
            &[10.0, 5.0],
            &FitOptions::default(),
        )
        .unwrap();

        assert!((out.x[0] - 3.0).abs() < 1e-6, "amplitude {}", out.x[0]);
        assert!((out.x[1] - 0.5).abs() < 1e-6, "rate {}", out.x[1]);
        assert!(out.sse < 1e-10);
    }

    #[test]
    fn stops_on_upper_bound_when_minimum_is_outside() {
        // Minimum of (p - 5)² is at 5 but the box ends at 2.
        let out = minimize_bounded(
            |p: &[f64]| Ok(vec![p[0] - 5.0]),
            &[1.0],
            &[0.0],
            &[2.0],
            &FitOptions::default(),
        )
        .unwrap();

        assert_eq!(out.x[0], 2.0);
    }

    #[test]
    fn starting_point_outside_box_is_projected() {
        let mut seen = Vec::new();
        let _ = minimize_bounded(
            |p: &[f64]| {
                seen.push(p[0]);
                Ok(vec![p[0] - 1.0, p[0] - 1.0])
            },
            &[50.0],
            &[0.0],
            &[3.0],
            &FitOptions::default(),
        )
        .unwrap();

        assert!(seen.iter().all(|&v| (0.0..=3.0).contains(&v)));
    }

    #[test]
    fn non_finite_residual_is_reported() {
        let err = minimize_bounded(
            |p: &[f64]| Ok(vec![p[0].ln() - 1.0, f64::NAN]),
            &[1.0],
            &[0.5],
            &[4.0],
            &FitOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, SirError::NumericalInstability(_)));
    }

    #[test]
    fn iteration_cap_yields_convergence_error() {
        // Rosenbrock-style valley from a poor start; one iteration is never enough.
        let opts = FitOptions::with_max_iterations(1).unwrap();
        let err = minimize_bounded(
            |p: &[f64]| Ok(vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]]),
            &[-1.2, 1.0],
            &[-5.0, -5.0],
            &[5.0, 5.0],
            &opts,
        )
        .unwrap_err();

        assert!(matches!(err, SirError::Convergence { iterations: 1, .. }));
    }

    #[test]
    fn fd_step_stays_inside_box() {
        assert!(fd_step(2.0, 0.0, 2.0).unwrap() < 0.0);
        assert!(fd_step(0.0, 0.0, 2.0).unwrap() > 0.0);
        assert!(fd_step(1.0, 1.0, 1.0).is_none());
    }
}
