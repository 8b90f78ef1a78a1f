//! SIR compartmental model, integrated with explicit Euler steps of one day.
//!
//! Given `(s, i, r)` on day `k` and `N = s0 + i0 + r0`:
//!
//! ```text
//! ds = -beta * i * s / N
//! di =  beta * i * s / N - gamma * i
//! dr =  gamma * i
//! ```
//!
//! and the next day is `(s + ds, i + di, r + dr)`. The three increments sum to
//! zero, so `S + I + R` stays at `N` up to rounding.
//!
//! Numerical notes:
//! - There is no sub-stepping and no clamping. With large `beta` (or small `d`)
//!   a single step can overshoot and drive a compartment below zero. The
//!   trajectory is returned as computed; use `Trajectory::first_negative_day`
//!   to detect this.

use crate::domain::{CompartmentState, ModelParameters, Trajectory};
use crate::error::SirError;

/// Simulate `n_days` steps from `initial`. The result has `n_days + 1` states.
pub fn simulate(
    initial: CompartmentState,
    params: ModelParameters,
    n_days: usize,
) -> Result<Trajectory, SirError> {
    initial.validate_initial()?;
    params.validate()?;

    let n = initial.total();
    let gamma = params.gamma();
    let beta = params.beta();

    let mut states = Vec::with_capacity(n_days + 1);
    states.push(initial);

    let mut cur = initial;
    for _ in 0..n_days {
        cur = step(cur, beta, gamma, n);
        states.push(cur);
    }

    Ok(Trajectory::from_states(states))
}

/// Flat-argument form of [`simulate`].
pub fn simulate_sir(
    s0: f64,
    i0: f64,
    r0: f64,
    r_naught: f64,
    d: f64,
    n_days: usize,
) -> Result<Trajectory, SirError> {
    simulate(
        CompartmentState::new(s0, i0, r0),
        ModelParameters::new(r_naught, d),
        n_days,
    )
}

fn step(state: CompartmentState, beta: f64, gamma: f64, n: f64) -> CompartmentState {
    let new_infections = beta * state.infected * state.susceptible / n;
    let recoveries = gamma * state.infected;

    CompartmentState {
        susceptible: state.susceptible - new_infections,
        infected: state.infected + new_infections - recoveries,
        recovered: state.recovered + recoveries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allegheny_like() -> CompartmentState {
        CompartmentState::new(999_000.0, 1_000.0, 0.0)
    }

    #[test]
    fn population_is_conserved() {
        for &(r_naught, d) in &[(0.8, 3.0), (2.0, 10.0), (5.0, 7.0), (15.0, 10.0)] {
            let traj = simulate(allegheny_like(), ModelParameters::new(r_naught, d), 200).unwrap();
            let n = 1_000_000.0;
            for s in traj.states() {
                assert!(
                    ((s.total() - n) / n).abs() < 1e-6,
                    "r_naught={r_naught} d={d}: total drifted to {}",
                    s.total()
                );
            }
        }
    }

    #[test]
    fn zero_infected_stays_constant() {
        let initial = CompartmentState::new(5_000.0, 0.0, 250.0);
        let traj = simulate(initial, ModelParameters::new(3.0, 4.0), 50).unwrap();
        assert_eq!(traj.len(), 51);
        for s in traj.states() {
            assert_eq!(*s, initial);
        }
    }

    #[test]
    fn recovered_never_decreases() {
        let traj = simulate(allegheny_like(), ModelParameters::new(3.0, 6.0), 150).unwrap();
        let r = traj.recovered();
        for w in r.windows(2) {
            assert!(w[1] >= w[0]);
        }
    }

    #[test]
    fn zero_days_returns_initial_only() {
        let traj = simulate(allegheny_like(), ModelParameters::new(2.0, 10.0), 0).unwrap();
        assert_eq!(traj.states(), &[allegheny_like()]);
        assert!(traj.infected_differences().is_empty());
    }

    #[test]
    fn first_step_matches_hand_computation() {
        // N = 100, beta = 0.3, gamma = 0.1
        let traj = simulate_sir(90.0, 10.0, 0.0, 3.0, 10.0, 1).unwrap();
        let s1 = traj.states()[1];
        assert!((s1.susceptible - 87.3).abs() < 1e-12);
        assert!((s1.infected - 11.7).abs() < 1e-12);
        assert!((s1.recovered - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_d_is_rejected() {
        let err = simulate_sir(90.0, 10.0, 0.0, 2.0, 0.0, 5).unwrap_err();
        assert!(matches!(err, SirError::InvalidParameter(_)));
    }

    #[test]
    fn empty_population_is_rejected() {
        let err = simulate_sir(0.0, 0.0, 0.0, 2.0, 10.0, 5).unwrap_err();
        assert!(matches!(err, SirError::InvalidParameter(_)));
    }

    #[test]
    fn aggressive_parameters_can_go_negative() {
        // beta = 3: a single step removes more susceptibles than exist.
        let traj = simulate_sir(50.0, 50.0, 0.0, 3.0, 1.0, 3).unwrap();
        assert!(traj.first_negative_day().is_some());
    }
}
