//! `sir-fit` library crate.
//!
//! The binary (`sir`) is a thin wrapper around this library so that:
//!
//! - the simulator and fitter are testable without spawning processes
//! - modules are reusable (notebooks, batch jobs, other front-ends)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
