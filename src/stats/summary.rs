//! Posterior summary reports.
//!
//! Two renderings of the same figures: a tab-delimited table for downstream
//! tooling and a fixed-width on-screen report. A leading `*` marks a
//! quantity whose posterior dispersion is statistically indistinguishable
//! from the prior; such estimates should be treated with caution.

use std::fmt;
use std::time::Duration;

use super::accumulator::{RunningStats, median_and_mad};
use super::levene::levene_test;
use crate::abc::{InferenceOutcome, SimulationResult};
use crate::config::{DistanceMetric, Factor, Settings};
use crate::errors::{AllefitError, Result};

#[derive(Clone, Debug)]
pub struct SummaryRow {
    pub label: String,
    pub median: f64,
    pub mad: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sd: f64,
    pub pval: f64,
}

impl SummaryRow {
    fn compute(label: String, posterior: &[f64], prior_marginal: &[f64]) -> Result<Self> {
        let stats: RunningStats = posterior.iter().copied().collect();
        let (median, mad) = median_and_mad(posterior)?;
        let pval = levene_test(posterior, prior_marginal)?;
        Ok(Self {
            label,
            median,
            mad,
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            sd: stats.sd(),
            pval,
        })
    }
}

#[derive(Clone, Debug)]
pub struct FactorSummary {
    pub factor: Factor,
    pub rows: Vec<SummaryRow>,
    pub significance: f64,
    pub num_results: usize,
    pub distance_metric: DistanceMetric,
    pub distance_stats: RunningStats,
    pub rejection_threshold: Option<f64>,
    pub running_time: Duration,
    pub single_mutation_rate: bool,
}

impl FactorSummary {
    /// Summarize an accepted set against the prior it was drawn from.
    pub fn compute(outcome: &InferenceOutcome, settings: &Settings) -> Result<Self> {
        let accepted = &outcome.accepted;
        if accepted.is_empty() {
            return Err(AllefitError::InsufficientData(
                "No accepted results to summarize".to_string(),
            ));
        }

        let rows = match settings.factor {
            Factor::Fitness => (1..settings.num_alleles)
                .map(|allele| {
                    let posterior: Vec<f64> =
                        accepted.iter().map(|result| result.fitness[allele]).collect();
                    SummaryRow::compute(
                        format!("allele{allele}"),
                        &posterior,
                        &outcome.prior.linear_marginal(allele - 1),
                    )
                })
                .collect::<Result<Vec<SummaryRow>>>()?,
            Factor::PopulationSize => {
                let posterior: Vec<f64> = accepted
                    .iter()
                    .map(|result| result.population_size as f64)
                    .collect();
                vec![SummaryRow::compute(
                    "N".to_string(),
                    &posterior,
                    &outcome.prior.linear_marginal(0),
                )?]
            }
            Factor::MutationRate => {
                let posterior: Vec<f64> = accepted
                    .iter()
                    .map(|result| result.mutation_rate)
                    .collect();
                vec![SummaryRow::compute(
                    "mutation_rate".to_string(),
                    &posterior,
                    &outcome.prior.linear_marginal(0),
                )?]
            }
        };

        Ok(Self {
            factor: settings.factor,
            rows,
            significance: settings.levenes_significance,
            num_results: accepted.len(),
            distance_metric: settings.distance_metric,
            distance_stats: accepted
                .iter()
                .map(SimulationResult::distance_key)
                .collect(),
            rejection_threshold: outcome.rejection_threshold,
            running_time: outcome.running_time,
            single_mutation_rate: settings.single_mutation_rate,
        })
    }

    fn is_flagged(&self, row: &SummaryRow) -> bool {
        row.pval >= self.significance
    }

    /// Tab-delimited rendering for spreadsheets and downstream tooling.
    pub fn to_table(&self) -> String {
        let mut output = String::new();
        let labeled = self.rows.len() > 1;
        if labeled {
            output.push_str("allele\t");
        }
        output.push_str("median\tMAD\tmin\tmax\tpval\n");
        for row in &self.rows {
            if labeled {
                output.push_str(&row.label);
                output.push('\t');
            }
            if self.is_flagged(row) {
                output.push('*');
            }
            output.push_str(&format!(
                "{:.2e}\t{:.2e}\t{:.2e}\t{:.2e}\t{:.2e}\n",
                row.median, row.mad, row.min, row.max, row.pval
            ));
        }
        output
    }
}

impl fmt::Display for FactorSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let title = match self.factor {
            Factor::Fitness => "Fitness Report",
            Factor::MutationRate => "Mutation Rate Report",
            Factor::PopulationSize => "Population Size Report",
        };
        writeln!(f, "{title}")?;
        writeln!(f, "====================")?;
        writeln!(f, "{} results accepted", self.num_results)?;
        if matches!(self.factor, Factor::MutationRate) {
            if self.single_mutation_rate {
                writeln!(f, "Used a single mutation rate.")?;
            } else {
                writeln!(f, "Used individual mutation rates.")?;
            }
        }
        writeln!(
            f,
            "Distance metric: {:?}",
            self.distance_metric
        )?;
        writeln!(
            f,
            "Distance min {:.2e} max {:.2e} mean {:.2e} sd {:.2e}",
            self.distance_stats.min(),
            self.distance_stats.max(),
            self.distance_stats.mean(),
            self.distance_stats.sd()
        )?;
        if let Some(threshold) = self.rejection_threshold {
            writeln!(f, "Rejection threshold: {threshold:.2e}")?;
        }
        writeln!(f, "Running time: {} seconds", self.running_time.as_secs())?;
        writeln!(f, "====================")?;

        let labeled = self.rows.len() > 1;
        if labeled {
            write!(f, "{:<12}", "allele")?;
        }
        for column in ["median", "MAD", "min", "max", "pval"] {
            write!(f, "{column:<12}")?;
        }
        writeln!(f)?;
        for row in &self.rows {
            if labeled {
                write!(f, "{:<12}", row.label)?;
            }
            let median = if self.is_flagged(row) {
                format!("*{:.2e}", row.median)
            } else {
                format!("{:.2e}", row.median)
            };
            write!(f, "{median:<12}")?;
            for value in [row.mad, row.min, row.max, row.pval] {
                write!(f, "{:<12}", format!("{value:.2e}"))?;
            }
            writeln!(f)?;
        }
        if self.rows.iter().any(|row| self.is_flagged(row)) {
            writeln!(
                f,
                "* posterior dispersion indistinguishable from the prior (p >= {}); \
treat with caution",
                self.significance
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParameterStore;
    use crate::prior::{PriorKind, PriorSample, PriorSpec};
    use crate::readwrite::ActualData;

    fn accepted_popsize(sizes: &[u64]) -> Vec<SimulationResult> {
        sizes
            .iter()
            .enumerate()
            .map(|(index, &population_size)| SimulationResult {
                prior_sample_index: index,
                fitness: vec![1.0, 1.0],
                population_size,
                mutation_rate: 1e-5,
                distance_from_actual: 0.1 * (index + 1) as f64,
                sum_distance: 0.1 * (index + 1) as f64,
                position: 0,
                multi_position: false,
                fixated: false,
            })
            .collect()
    }

    fn popsize_outcome(sizes: &[u64], prior_draws: Vec<Vec<f64>>) -> InferenceOutcome {
        let accepted = accepted_popsize(sizes);
        InferenceOutcome {
            all_results: accepted.clone(),
            accepted,
            prior: PriorSample {
                spec: PriorSpec {
                    kinds: vec![PriorKind::LogUniform { low: 1.0, high: 4.0 }],
                },
                draws: prior_draws,
            },
            rejection_threshold: Some(0.5),
            running_time: Duration::from_secs(3),
            multi_position: false,
        }
    }

    fn popsize_settings() -> Settings {
        let data = "gen\tallele\tfreq\n0\t0\t0.9\n0\t1\t0.1\n5\t0\t0.5\n5\t1\t0.5\n";
        let data = ActualData::read(data.as_bytes()).unwrap();
        let params = "min_log_popsize 1\nmax_log_popsize 4\nmutation_rate 1e-5\n";
        let mut store = ParameterStore::parse(params).unwrap();
        Settings::from_store(&mut store, &data, Factor::PopulationSize).unwrap()
    }

    #[test]
    fn popsize_summary_statistics() {
        // prior spread out over 10^1..10^4, posterior concentrated
        let prior_draws: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![1.0 + 3.0 * i as f64 / 99.0])
            .collect();
        let sizes: Vec<u64> = (0..100).map(|i| 500 + i % 10).collect();
        let outcome = popsize_outcome(&sizes, prior_draws);
        let summary = FactorSummary::compute(&outcome, &popsize_settings()).unwrap();

        assert_eq!(summary.rows.len(), 1);
        let row = &summary.rows[0];
        assert_eq!(row.label, "N");
        assert!((row.median - 504.5).abs() < 1.0);
        assert_eq!(row.min, 500.0);
        assert_eq!(row.max, 509.0);
        assert!(row.pval < 0.05, "posterior should be tighter than prior");

        let table = summary.to_table();
        assert!(table.starts_with("median\tMAD\tmin\tmax\tpval\n"));
        assert!(!table.contains('*'));
    }

    #[test]
    fn uninformative_posterior_is_flagged() {
        // posterior dispersion mirrors the prior's
        let prior_draws: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![1.0 + 3.0 * i as f64 / 99.0])
            .collect();
        let sizes: Vec<u64> = (0..100)
            .map(|i| 10f64.powf(1.0 + 3.0 * i as f64 / 99.0).round() as u64)
            .collect();
        let outcome = popsize_outcome(&sizes, prior_draws);
        let summary = FactorSummary::compute(&outcome, &popsize_settings()).unwrap();

        let row = &summary.rows[0];
        assert!(row.pval >= 0.05);
        assert!(summary.to_table().contains('*'));
        assert!(summary.to_string().contains("treat with caution"));
    }

    #[test]
    fn empty_accepted_set_is_an_error() {
        let outcome = popsize_outcome(&[], vec![]);
        assert!(matches!(
            FactorSummary::compute(&outcome, &popsize_settings()),
            Err(AllefitError::InsufficientData(_))
        ));
    }

    #[test]
    fn screen_report_contains_the_figures() {
        let prior_draws: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![1.0 + 3.0 * i as f64 / 49.0])
            .collect();
        let sizes: Vec<u64> = (0..50).map(|i| 100 + i).collect();
        let outcome = popsize_outcome(&sizes, prior_draws);
        let summary = FactorSummary::compute(&outcome, &popsize_settings()).unwrap();
        let screen = summary.to_string();
        assert!(screen.contains("Population Size Report"));
        assert!(screen.contains("50 results accepted"));
        assert!(screen.contains("Running time: 3 seconds"));
        assert!(screen.contains("median"));
    }
}
