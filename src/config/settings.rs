//! Typed, validated view over the parameter store.

use serde::{Deserialize, Serialize};

use super::store::ParameterStore;
use crate::errors::{AllefitError, Result};
use crate::readwrite::ActualData;

// Parameter file keys.
pub const PARAM_NUM_ALLELES: &str = "num_alleles";
pub const PARAM_NUM_GENERATIONS: &str = "num_generations";
pub const PARAM_NUM_SIMULATIONS: &str = "num_simulations";
pub const PARAM_SIM_REPEATS: &str = "sim_repeats";
pub const PARAM_NUM_RESULTS_TO_KEEP: &str = "num_results_to_keep";
pub const PARAM_SEED: &str = "seed";
pub const PARAM_DISTANCE_METRIC: &str = "distance_metric";
pub const PARAM_SCALING: &str = "scaling";
pub const PARAM_PRIOR_DISTRIBUTION: &str = "prior_distribution";
pub const PARAM_MIN_FITNESS: &str = "min_fitness";
pub const PARAM_MAX_FITNESS: &str = "max_fitness";
pub const PARAM_FITNESS_ALLELE_PREFIX: &str = "fitness_allele";
pub const PARAM_POPSIZE: &str = "popsize";
pub const PARAM_MIN_LOG_POPSIZE: &str = "min_log_popsize";
pub const PARAM_MAX_LOG_POPSIZE: &str = "max_log_popsize";
pub const PARAM_MUTATION_RATE: &str = "mutation_rate";
pub const PARAM_SINGLE_MUTATION_RATE: &str = "single_mutation_rate";
pub const PARAM_MIN_LOG_MUTATION_RATE: &str = "min_log_mutation_rate";
pub const PARAM_MAX_LOG_MUTATION_RATE: &str = "max_log_mutation_rate";
pub const PARAM_LEVENES_SIGNIFICANCE: &str = "levenes_significance";
pub const PARAM_INIT_FREQ_ALLELE_PREFIX: &str = "init_freq_allele";

const DEFAULT_NUM_SIMULATIONS: usize = 100_000;
const DEFAULT_SIM_REPEATS: usize = 1;
const DEFAULT_NUM_RESULTS_TO_KEEP: usize = 1000;
const DEFAULT_LEVENES_SIGNIFICANCE: f64 = 0.05;
const DEFAULT_MIN_FITNESS: f64 = 0.0;
const DEFAULT_MAX_FITNESS: f64 = 2.0;

/// Maximum number of batches the prior sample is partitioned into.
pub const MAX_BATCHES: usize = 10;

/// Which parameter an inference run treats as the unknown; the other two are
/// held at their configured values.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factor {
    Fitness,
    MutationRate,
    PopulationSize,
}

impl Factor {
    pub fn name(&self) -> &'static str {
        match self {
            Factor::Fitness => "fitness",
            Factor::MutationRate => "mutation rate",
            Factor::PopulationSize => "population size",
        }
    }
}

/// Discrepancy measure between a simulated trajectory and the observed one.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    L1,
    L2,
}

impl DistanceMetric {
    /// Contribution of one (generation, allele) pair to the distance.
    pub fn accumulate(&self, simulated: f64, observed: f64) -> f64 {
        match self {
            DistanceMetric::L1 => (simulated - observed).abs(),
            DistanceMetric::L2 => (simulated - observed).powi(2),
        }
    }
}

/// Distance scaling applied after scoring a trajectory.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaling {
    Off,
    /// Divide by the number of observed generations, making distances
    /// comparable across positions with different sampling density.
    PerGeneration,
}

/// Shape of the prior placed on the inferred quantity.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorDistributionType {
    Uniform,
    LogUniform,
    Fixed,
    Composite,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub factor: Factor,
    pub num_alleles: usize,
    pub num_simulations: usize,
    pub sim_repeats: usize,
    pub num_results_to_keep: usize,
    pub seed: Option<u64>,
    pub distance_metric: DistanceMetric,
    pub scaling: Scaling,
    pub prior_distribution: PriorDistributionType,
    pub min_fitness: f64,
    pub max_fitness: f64,
    /// Per-allele fitness used when fitness is not the inferred factor;
    /// allele 0 is the reference and always has fitness 1.
    pub fixed_fitness: Vec<f64>,
    pub fixed_population_size: u64,
    pub min_log_popsize: f64,
    pub max_log_popsize: f64,
    pub fixed_mutation_rate: f64,
    pub single_mutation_rate: bool,
    pub min_log_mutation_rate: f64,
    pub max_log_mutation_rate: f64,
    pub levenes_significance: f64,
}

impl std::fmt::Display for Settings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let output = serde_yaml::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(formatter, "{}", output)
    }
}

impl Settings {
    /// Assemble and validate settings for an inference run.
    ///
    /// The allele count is auto-filled from the observed data when the
    /// parameter file does not provide it.
    pub fn from_store(
        store: &mut ParameterStore,
        data: &ActualData,
        factor: Factor,
    ) -> Result<Settings> {
        if !store.contains(PARAM_NUM_ALLELES) {
            let num_alleles = data.num_alleles()?;
            store.fill(PARAM_NUM_ALLELES, num_alleles.to_string());
            log::info!("Autodetected alleles: {num_alleles}");
        }

        let num_alleles = store.require_usize(PARAM_NUM_ALLELES)?;
        if num_alleles != data.num_alleles()? {
            return Err(AllefitError::ConfigError(format!(
                "Parameter file declares {num_alleles} alleles, data file has {}",
                data.num_alleles()?
            )));
        }

        let settings = Self::assemble(store, num_alleles, factor)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Assemble settings for a standalone simulation run, where there is no
    /// data file to derive values from.
    pub fn for_simulation(store: &ParameterStore) -> Result<Settings> {
        let num_alleles = store.require_usize(PARAM_NUM_ALLELES)?;
        let settings = Self::assemble(store, num_alleles, Factor::Fitness)?;
        settings.validate()?;
        Ok(settings)
    }

    fn assemble(store: &ParameterStore, num_alleles: usize, factor: Factor) -> Result<Settings> {
        let distance_metric = match store.get_string(PARAM_DISTANCE_METRIC, "L1").as_str() {
            "L1" => DistanceMetric::L1,
            "L2" => DistanceMetric::L2,
            other => {
                return Err(AllefitError::ConfigError(format!(
                    "Unknown distance metric: {other}"
                )));
            }
        };

        let scaling = match store.get_string(PARAM_SCALING, "off").as_str() {
            "off" => Scaling::Off,
            "per_generation" => Scaling::PerGeneration,
            other => {
                return Err(AllefitError::ConfigError(format!(
                    "Unknown scaling mode: {other}"
                )));
            }
        };

        let prior_distribution =
            match store.get_string(PARAM_PRIOR_DISTRIBUTION, "uniform").as_str() {
                "uniform" => PriorDistributionType::Uniform,
                "log_uniform" => PriorDistributionType::LogUniform,
                "fixed" => PriorDistributionType::Fixed,
                "composite" => PriorDistributionType::Composite,
                other => {
                    return Err(AllefitError::ConfigError(format!(
                        "Unknown prior distribution: {other}"
                    )));
                }
            };

        let seed = if store.contains(PARAM_SEED) {
            Some(store.require_usize(PARAM_SEED)? as u64)
        } else {
            None
        };

        // Factor-specific requirements; quantities that are held fixed must
        // be configured, the inferred one needs its prior bounds instead.
        let fixed_population_size = match factor {
            Factor::PopulationSize => 0,
            _ => store.require_usize(PARAM_POPSIZE)? as u64,
        };
        let (min_log_popsize, max_log_popsize) = match factor {
            Factor::PopulationSize => (
                store.require_f64(PARAM_MIN_LOG_POPSIZE)?,
                store.require_f64(PARAM_MAX_LOG_POPSIZE)?,
            ),
            _ => (
                store.get_f64(PARAM_MIN_LOG_POPSIZE, 0.0)?,
                store.get_f64(PARAM_MAX_LOG_POPSIZE, 0.0)?,
            ),
        };
        let (min_log_mutation_rate, max_log_mutation_rate) = match factor {
            Factor::MutationRate => (
                store.require_f64(PARAM_MIN_LOG_MUTATION_RATE)?,
                store.require_f64(PARAM_MAX_LOG_MUTATION_RATE)?,
            ),
            _ => (
                store.get_f64(PARAM_MIN_LOG_MUTATION_RATE, 0.0)?,
                store.get_f64(PARAM_MAX_LOG_MUTATION_RATE, 0.0)?,
            ),
        };

        let mut fixed_fitness = Vec::with_capacity(num_alleles);
        fixed_fitness.push(1.0);
        for allele in 1..num_alleles {
            let key = format!("{PARAM_FITNESS_ALLELE_PREFIX}{allele}");
            fixed_fitness.push(store.get_f64(&key, 1.0)?);
        }

        Ok(Settings {
            factor,
            num_alleles,
            num_simulations: store.get_usize(PARAM_NUM_SIMULATIONS, DEFAULT_NUM_SIMULATIONS)?,
            sim_repeats: store.get_usize(PARAM_SIM_REPEATS, DEFAULT_SIM_REPEATS)?,
            num_results_to_keep: store
                .get_usize(PARAM_NUM_RESULTS_TO_KEEP, DEFAULT_NUM_RESULTS_TO_KEEP)?,
            seed,
            distance_metric,
            scaling,
            prior_distribution,
            min_fitness: store.get_f64(PARAM_MIN_FITNESS, DEFAULT_MIN_FITNESS)?,
            max_fitness: store.get_f64(PARAM_MAX_FITNESS, DEFAULT_MAX_FITNESS)?,
            fixed_fitness,
            fixed_population_size,
            min_log_popsize,
            max_log_popsize,
            fixed_mutation_rate: store.get_f64(PARAM_MUTATION_RATE, 0.0)?,
            single_mutation_rate: store.get_bool(PARAM_SINGLE_MUTATION_RATE, true)?,
            min_log_mutation_rate,
            max_log_mutation_rate,
            levenes_significance: store
                .get_f64(PARAM_LEVENES_SIGNIFICANCE, DEFAULT_LEVENES_SIGNIFICANCE)?,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.num_alleles < 2 {
            return Err(AllefitError::ConfigError(
                "At least two alleles are required".to_string(),
            ));
        }
        if self.sim_repeats == 0 {
            return Err(AllefitError::ConfigError(
                "sim_repeats must be at least 1".to_string(),
            ));
        }
        match self.factor {
            Factor::PopulationSize => {
                if self.min_log_popsize > self.max_log_popsize {
                    return Err(AllefitError::ConfigError(
                        "min_log_popsize exceeds max_log_popsize".to_string(),
                    ));
                }
            }
            Factor::MutationRate => {
                if self.min_log_mutation_rate > self.max_log_mutation_rate {
                    return Err(AllefitError::ConfigError(
                        "min_log_mutation_rate exceeds max_log_mutation_rate".to_string(),
                    ));
                }
                // Every drawable rate must leave a valid mutation matrix.
                let max_drawn_rate =
                    (self.num_alleles - 1) as f64 * 10f64.powf(self.max_log_mutation_rate);
                if max_drawn_rate >= 1.0 {
                    return Err(AllefitError::ConfigError(format!(
                        "max_log_mutation_rate {} allows a total mutation rate of {max_drawn_rate} for {} alleles",
                        self.max_log_mutation_rate, self.num_alleles
                    )));
                }
            }
            Factor::Fitness => {
                if self.min_fitness > self.max_fitness {
                    return Err(AllefitError::ConfigError(
                        "min_fitness exceeds max_fitness".to_string(),
                    ));
                }
            }
        }
        let max_total_rate = (self.num_alleles - 1) as f64 * self.fixed_mutation_rate;
        if !(0.0..1.0).contains(&max_total_rate) {
            return Err(AllefitError::ConfigError(format!(
                "Mutation rate {} is too large for {} alleles",
                self.fixed_mutation_rate, self.num_alleles
            )));
        }
        Ok(())
    }

    /// Number of batches the prior sample is partitioned into.
    pub fn num_batches(&self) -> usize {
        self.sim_repeats.min(MAX_BATCHES)
    }
}
