//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - compartment states and simulated trajectories (`CompartmentState`, `Trajectory`)
//! - model parameters and fit modes (`ModelParameters`, `FitMode`, `ParamSearch`)
//! - fit outputs (`FitResult`, `Termination`)
//! - resolved run configuration (`FitConfig`, `SimulateConfig`, `SynthConfig`, `BatchConfig`)

pub mod types;

pub use types::*;
