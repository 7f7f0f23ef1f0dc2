//! Equality-of-variance test between the posterior and prior samples.
//!
//! Median-centered Levene's test (the Brown-Forsythe variant), robust to the
//! skewed distributions rejection sampling tends to produce. A small p-value
//! means the posterior dispersion differs from the prior, i.e. the data was
//! informative.

use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use super::accumulator::{RunningStats, median};
use crate::errors::{AllefitError, Result};

/// Two-sample Levene's test; returns the p-value.
pub fn levene_test(sample_a: &[f64], sample_b: &[f64]) -> Result<f64> {
    if sample_a.len() < 2 || sample_b.len() < 2 {
        return Err(AllefitError::InsufficientData(
            "Levene's test requires at least two values per sample".to_string(),
        ));
    }

    let deviations_a = absolute_deviations_from_median(sample_a)?;
    let deviations_b = absolute_deviations_from_median(sample_b)?;

    let stats_a: RunningStats = deviations_a.iter().copied().collect();
    let stats_b: RunningStats = deviations_b.iter().copied().collect();
    let grand_mean = (stats_a.mean() * stats_a.count() as f64
        + stats_b.mean() * stats_b.count() as f64)
        / (stats_a.count() + stats_b.count()) as f64;

    let total = (stats_a.count() + stats_b.count()) as f64;
    let between = stats_a.count() as f64 * (stats_a.mean() - grand_mean).powi(2)
        + stats_b.count() as f64 * (stats_b.mean() - grand_mean).powi(2);
    let within: f64 = deviations_a
        .iter()
        .map(|z| (z - stats_a.mean()).powi(2))
        .chain(deviations_b.iter().map(|z| (z - stats_b.mean()).powi(2)))
        .sum();

    // two groups: k - 1 = 1 numerator degree of freedom
    let df_within = total - 2.0;
    if within <= 0.0 {
        return Ok(if between <= 0.0 { 1.0 } else { 0.0 });
    }
    let statistic = df_within * between / within;

    let distribution = FisherSnedecor::new(1.0, df_within).map_err(|err| {
        AllefitError::InsufficientData(format!("Invalid F distribution: {err}"))
    })?;
    Ok(1.0 - distribution.cdf(statistic))
}

fn absolute_deviations_from_median(sample: &[f64]) -> Result<Vec<f64>> {
    let mut sorted = sample.to_vec();
    let center = median(&mut sorted)?;
    Ok(sample.iter().map(|value| (value - center).abs()).collect())
}
