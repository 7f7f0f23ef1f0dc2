//! Streaming summary statistics and robust location/dispersion estimates.

use crate::errors::{AllefitError, Result};

/// Single-pass accumulator for min/max/mean/sd (Welford's recurrence).
#[derive(Clone, Debug, Default)]
pub struct RunningStats {
    count: usize,
    min: f64,
    max: f64,
    mean: f64,
    sum_squared_deviations: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.sum_squared_deviations += delta * (value - self.mean);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation.
    pub fn sd(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_squared_deviations / self.count as f64).sqrt()
        }
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut stats = Self::new();
        for value in values {
            stats.push(value);
        }
        stats
    }
}

/// Median of a sequence; sorts the slice in place.
pub fn median(values: &mut [f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(AllefitError::InsufficientData(
            "Median of an empty sequence".to_string(),
        ));
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let middle = values.len() / 2;
    if values.len() % 2 == 1 {
        Ok(values[middle])
    } else {
        Ok((values[middle - 1] + values[middle]) / 2.0)
    }
}

/// Median and median absolute deviation of a sequence.
pub fn median_and_mad(values: &[f64]) -> Result<(f64, f64)> {
    let mut sorted = values.to_vec();
    let center = median(&mut sorted)?;
    let mut deviations: Vec<f64> = values.iter().map(|value| (value - center).abs()).collect();
    let mad = median(&mut deviations)?;
    Ok((center, mad))
}
