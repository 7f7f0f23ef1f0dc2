//! ABC rejection-sampling orchestrator.
//!
//! Draws one prior sample per run, simulates every drawn parameter vector in
//! batches, scores trajectories against the observed data and keeps the
//! closest K proposals as the empirical posterior. In multi-position mode
//! the same prior indices are reused for every position and per-position
//! distances are summed per index before acceptance.

use itertools::Itertools;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::errors::{AllefitError, Result};
use crate::prior::{ParameterVector, PriorSample, PriorSampler, PriorSpec};
use crate::readwrite::{ActualData, Position};
use crate::simulation::{WrightFisherSimulator, trajectory_distance};

/// Durable record of one completed simulation.
///
/// `sum_distance` accumulates across positions in multi-position mode and
/// mirrors `distance_from_actual` otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationResult {
    pub prior_sample_index: usize,
    pub fitness: Vec<f64>,
    pub population_size: u64,
    pub mutation_rate: f64,
    pub distance_from_actual: f64,
    pub sum_distance: f64,
    pub position: u32,
    pub multi_position: bool,
    pub fixated: bool,
}

impl SimulationResult {
    /// Ordering key for acceptance: summed distance across positions in
    /// multi-position mode, plain distance otherwise.
    pub fn distance_key(&self) -> f64 {
        if self.multi_position {
            self.sum_distance
        } else {
            self.distance_from_actual
        }
    }
}

/// Everything an inference run produces besides the written reports.
#[derive(Clone, Debug)]
pub struct InferenceOutcome {
    /// The K lowest-distance results, sorted ascending for reporting.
    pub accepted: Vec<SimulationResult>,
    /// Every scored simulation of every position.
    pub all_results: Vec<SimulationResult>,
    pub prior: PriorSample,
    /// Distance of the worst-ranked accepted result.
    pub rejection_threshold: Option<f64>,
    pub running_time: Duration,
    pub multi_position: bool,
}

pub struct AbcOrchestrator<'a> {
    settings: &'a Settings,
    data: &'a ActualData,
    rng: StdRng,
    rejection_threshold: Option<f64>,
}

impl<'a> AbcOrchestrator<'a> {
    pub fn new(settings: &'a Settings, data: &'a ActualData) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            settings,
            data,
            rng,
            rejection_threshold: None,
        }
    }

    pub fn run_inference(&mut self) -> Result<InferenceOutcome> {
        self.run_inference_with_progress(|_| {})
    }

    /// Run the full inference; `progress` is called with the number of
    /// simulations completed so far across all positions.
    pub fn run_inference_with_progress<F: FnMut(u64)>(
        &mut self,
        mut progress: F,
    ) -> Result<InferenceOutcome> {
        let spec = PriorSpec::for_factor(self.settings)?;
        let sampler = PriorSampler::new(spec);
        let prior = sampler.sample(self.settings.num_simulations, &mut self.rng);

        let start = Instant::now();
        let count = prior.len();
        let keep = self.settings.num_results_to_keep;
        let multi_position = self.data.is_multi_position();

        let mut all_results: Vec<SimulationResult> = Vec::new();
        let mut completed: u64 = 0;

        // Aggregated per prior index; only the first position materializes
        // the slot, later positions add their distance into it.
        let mut aggregated: Vec<Option<SimulationResult>> = vec![None; count];

        let data = self.data;
        for position in data.positions() {
            log::info!("Scoring position {}", position.id);
            let position_results =
                self.run_position(position, &prior, &mut completed, &mut progress)?;
            verify_prior_coverage(&position_results, count)?;

            for mut result in position_results {
                result.multi_position = multi_position;
                let index = result.prior_sample_index;
                if let Some(aggregate) = &mut aggregated[index] {
                    aggregate.sum_distance += result.distance_from_actual;
                } else {
                    result.sum_distance = result.distance_from_actual;
                    aggregated[index] = Some(result.clone());
                }
                all_results.push(result);
            }
        }

        let merged: Vec<SimulationResult> = aggregated.into_iter().flatten().collect();
        verify_prior_coverage(&merged, count)?;

        let accepted = select_accepted(merged, keep);
        let rejection_threshold = accepted.last().map(SimulationResult::distance_key);
        self.rejection_threshold = rejection_threshold;

        Ok(InferenceOutcome {
            accepted,
            all_results,
            prior,
            rejection_threshold,
            running_time: start.elapsed(),
            multi_position,
        })
    }

    /// Simulate and score every prior draw against one position, in batches.
    ///
    /// The rejection threshold is recomputed only between batches, so it is
    /// frozen while a batch runs.
    fn run_position<F: FnMut(u64)>(
        &mut self,
        position: &Position,
        prior: &PriorSample,
        completed: &mut u64,
        progress: &mut F,
    ) -> Result<Vec<SimulationResult>> {
        let count = prior.len();
        let num_batches = self.settings.num_batches();
        let batch_size = count.div_ceil(num_batches).max(1);

        let initial = position.initial_frequencies();
        let generations = position.generation_span();

        let mut results: Vec<SimulationResult> = Vec::with_capacity(count);
        let mut fixation_count = 0usize;

        for batch in prior.draws.chunks(batch_size) {
            let batch_start = results.len();
            for (offset, draw) in batch.iter().enumerate() {
                let index = batch_start + offset;
                let params = ParameterVector::from_draw(index, draw, self.settings);
                let simulator =
                    WrightFisherSimulator::new(&params, self.settings.num_alleles)?;
                // immediate rejection stays disabled in inference mode
                let trajectory =
                    simulator.simulate(&initial, generations, None, &mut self.rng);
                let distance = trajectory_distance(
                    &trajectory,
                    position,
                    self.settings.distance_metric,
                    self.settings.scaling,
                );
                if trajectory.fixated {
                    fixation_count += 1;
                }
                results.push(SimulationResult {
                    prior_sample_index: index,
                    fitness: params.fitness,
                    population_size: params.population_size,
                    mutation_rate: params.mutation_rate,
                    distance_from_actual: distance,
                    sum_distance: distance,
                    position: position.id,
                    multi_position: false,
                    fixated: trajectory.fixated,
                });
                *completed += 1;
                progress(*completed);
            }
            self.tighten_threshold(&results);
            log::debug!(
                "Position {}: batch done, {}/{} simulations, threshold {:?}",
                position.id,
                results.len(),
                count,
                self.rejection_threshold
            );
        }

        if fixation_count > 0 {
            log::info!(
                "Position {}: {fixation_count} of {count} simulations reached fixation",
                position.id
            );
        }
        Ok(results)
    }

    /// Distance of the current K-th best result; only ever tightens.
    fn tighten_threshold(&mut self, results: &[SimulationResult]) {
        let keep = self.settings.num_results_to_keep;
        if keep == 0 || results.len() < keep {
            return;
        }
        let mut distances: Vec<f64> = results
            .iter()
            .map(|result| result.distance_from_actual)
            .collect();
        let (_, kth, _) =
            distances.select_nth_unstable_by(keep - 1, |a, b| a.total_cmp(b));
        let kth = *kth;
        if self
            .rejection_threshold
            .is_none_or(|threshold| kth < threshold)
        {
            self.rejection_threshold = Some(kth);
        }
    }

    pub fn rejection_threshold(&self) -> Option<f64> {
        self.rejection_threshold
    }
}

/// Check that the prior indices cover `0..count` exactly once each.
///
/// A gap or duplicate here means the bookkeeping is broken; aborting beats
/// silently truncating the posterior.
pub fn verify_prior_coverage(results: &[SimulationResult], count: usize) -> Result<()> {
    if results.len() != count {
        return Err(AllefitError::InvariantViolation(format!(
            "Expected {count} prior samples, found {}",
            results.len()
        )));
    }
    for (expected, found) in results
        .iter()
        .map(|result| result.prior_sample_index)
        .sorted()
        .enumerate()
    {
        if expected != found {
            return Err(AllefitError::InvariantViolation(format!(
                "Prior sample coverage incomplete at index {expected} (found {found})"
            )));
        }
    }
    Ok(())
}

/// Keep the `keep` lowest-distance results: partial selection first, then a
/// full sort of the survivors for deterministic reporting order.
fn select_accepted(mut results: Vec<SimulationResult>, keep: usize) -> Vec<SimulationResult> {
    let keep = keep.min(results.len());
    if keep == 0 {
        return Vec::new();
    }
    if keep < results.len() {
        results.select_nth_unstable_by(keep - 1, |a, b| {
            a.distance_key().total_cmp(&b.distance_key())
        });
        results.truncate(keep);
    }
    results.sort_by(|a, b| a.distance_key().total_cmp(&b.distance_key()));
    results
}
