//! Approximate Bayesian inference of fitness, mutation rate and population
//! size from observed allele-frequency time series, driven by Wright-Fisher
//! forward simulations.

pub mod abc;
pub mod args;
pub mod config;
pub mod errors;
pub mod prior;
pub mod readwrite;
pub mod runner;
pub mod simulation;
pub mod stats;
