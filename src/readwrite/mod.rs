//! Reading observed data and writing the report files.

mod actual;
mod report;

pub use actual::{ActualData, Position};
pub use report::{write_posterior, write_prior, write_summary, write_trajectory};
