//! Forward Wright-Fisher simulator for allele-frequency trajectories.
//!
//! Each generation applies selection (per-allele fitness), mutation (a
//! row-stochastic rate matrix) and genetic drift (multinomial resampling of
//! `N` individuals) to the frequency vector.

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::{Binomial, Distribution};

use crate::config::{DistanceMetric, Scaling};
use crate::errors::{AllefitError, Result};
use crate::prior::ParameterVector;
use crate::readwrite::Position;

const FIXATION_TOLERANCE: f64 = 1e-9;

/// Output of one forward simulation.
///
/// `frequencies` has one row per generation, row 0 being the initial state.
/// A truncated trajectory has fewer rows than requested.
#[derive(Clone, Debug)]
pub struct Trajectory {
    pub frequencies: Array2<f64>,
    /// A single allele reached frequency one at some point.
    pub fixated: bool,
    /// The run was aborted early, either by immediate rejection or by total
    /// population collapse.
    pub truncated: bool,
}

impl Trajectory {
    pub fn num_generations(&self) -> usize {
        self.frequencies.nrows().saturating_sub(1)
    }
}

/// Immediate-rejection mode: abort a simulation once the running distance
/// over already-passed observation generations exceeds the threshold.
///
/// Disabled in inference mode; a stale threshold only wastes simulation
/// effort, it never changes accepted results.
pub struct EarlyRejection<'a> {
    pub observed: &'a Position,
    pub metric: DistanceMetric,
    pub threshold: f64,
}

pub struct WrightFisherSimulator {
    fitness: Array1<f64>,
    mutation_matrix: Array2<f64>,
    population_size: u64,
}

impl WrightFisherSimulator {
    pub fn new(params: &ParameterVector, num_alleles: usize) -> Result<Self> {
        if params.fitness.len() != num_alleles {
            return Err(AllefitError::ConfigError(format!(
                "Expected {num_alleles} fitness values, got {}",
                params.fitness.len()
            )));
        }
        if params.population_size == 0 {
            return Err(AllefitError::ConfigError(
                "Population size must be at least 1".to_string(),
            ));
        }
        let retention = 1.0 - (num_alleles - 1) as f64 * params.mutation_rate;
        if retention < 0.0 {
            return Err(AllefitError::ConfigError(format!(
                "Mutation rate {} is too large for {num_alleles} alleles",
                params.mutation_rate
            )));
        }
        let mut mutation_matrix = Array2::from_elem(
            (num_alleles, num_alleles),
            params.mutation_rate,
        );
        mutation_matrix
            .diag_mut()
            .iter_mut()
            .for_each(|entry| *entry = retention);

        Ok(Self {
            fitness: Array1::from_vec(params.fitness.clone()),
            mutation_matrix,
            population_size: params.population_size,
        })
    }

    /// Evolve `initial` for `generations` generations.
    pub fn simulate<R: Rng>(
        &self,
        initial: &[f64],
        generations: usize,
        early: Option<&EarlyRejection>,
        rng: &mut R,
    ) -> Trajectory {
        let num_alleles = self.fitness.len();
        let mut current = Array1::from_vec(initial.to_vec());
        normalize(&mut current);

        let mut rows: Vec<f64> = Vec::with_capacity((generations + 1) * num_alleles);
        rows.extend(current.iter());

        let mut fixated = is_fixated(current.view());
        let mut truncated = false;

        // Cursor over the observation generations for immediate rejection.
        let offsets = early.map(|early| early.observed.generation_offsets());
        let mut observation_cursor = if offsets.is_some() { 1 } else { 0 };
        let mut running_distance = 0.0;

        for generation in 1..=generations {
            // selection
            current *= &self.fitness;
            let total = current.sum();
            if total <= 0.0 {
                // every remaining allele is lethal; the population collapses
                truncated = true;
                fixated = true;
                break;
            }
            current /= total;

            // mutation
            current = self.mutation_matrix.t().dot(&current);
            normalize(&mut current);

            // drift
            let counts = multinomial_draw(self.population_size, current.view(), rng);
            current = counts.mapv(|count| count as f64 / self.population_size as f64);

            rows.extend(current.iter());
            fixated |= is_fixated(current.view());

            if let (Some(early), Some(offsets)) = (early, offsets.as_ref()) {
                while observation_cursor < offsets.len()
                    && offsets[observation_cursor] == generation
                {
                    let observed = early.observed.frequencies.row(observation_cursor);
                    running_distance += current
                        .iter()
                        .zip(observed.iter())
                        .map(|(&simulated, &observed)| {
                            early.metric.accumulate(simulated, observed)
                        })
                        .sum::<f64>();
                    observation_cursor += 1;
                }
                if running_distance > early.threshold {
                    truncated = true;
                    break;
                }
            }
        }

        let num_rows = rows.len() / num_alleles;
        let frequencies = Array2::from_shape_vec((num_rows, num_alleles), rows)
            .expect("trajectory rows have uniform width");
        Trajectory {
            frequencies,
            fixated,
            truncated,
        }
    }
}

fn is_fixated(frequencies: ArrayView1<f64>) -> bool {
    frequencies
        .iter()
        .any(|&freq| freq >= 1.0 - FIXATION_TOLERANCE)
}

fn normalize(frequencies: &mut Array1<f64>) {
    frequencies.mapv_inplace(|freq| freq.max(0.0));
    let total = frequencies.sum();
    if total > 0.0 {
        *frequencies /= total;
    }
}

/// Multinomial sample via chained conditional binomials.
fn multinomial_draw<R: Rng>(
    count: u64,
    probabilities: ArrayView1<f64>,
    rng: &mut R,
) -> Array1<u64> {
    let num_categories = probabilities.len();
    let mut counts = Array1::zeros(num_categories);
    let mut remaining = count;
    let mut remaining_probability = 1.0;

    for category in 0..num_categories - 1 {
        if remaining == 0 || remaining_probability <= 0.0 {
            break;
        }
        let conditional = (probabilities[category] / remaining_probability).clamp(0.0, 1.0);
        let drawn = Binomial::new(remaining, conditional)
            .expect("conditional probability is in [0, 1]")
            .sample(rng);
        counts[category] = drawn;
        remaining -= drawn;
        remaining_probability -= probabilities[category];
    }
    counts[num_categories - 1] = remaining;
    counts
}

/// Score a trajectory against an observed position.
///
/// Truncated trajectories order behind every completed one.
pub fn trajectory_distance(
    trajectory: &Trajectory,
    position: &Position,
    metric: DistanceMetric,
    scaling: Scaling,
) -> f64 {
    if trajectory.truncated {
        return f64::INFINITY;
    }
    let mut distance = 0.0;
    for (row, offset) in position.generation_offsets().into_iter().enumerate() {
        if offset >= trajectory.frequencies.nrows() {
            return f64::INFINITY;
        }
        let simulated = trajectory.frequencies.row(offset);
        let observed = position.frequencies.row(row);
        distance += simulated
            .iter()
            .zip(observed.iter())
            .map(|(&simulated, &observed)| metric.accumulate(simulated, observed))
            .sum::<f64>();
    }
    match scaling {
        Scaling::Off => distance,
        Scaling::PerGeneration => distance / position.num_observations() as f64,
    }
}
