//! Posterior statistics: accumulators, the prior/posterior dispersion test
//! and the summary reports.

pub mod accumulator;
pub mod levene;
pub mod summary;

pub use accumulator::{RunningStats, median, median_and_mad};
pub use levene::levene_test;
pub use summary::{FactorSummary, SummaryRow};
