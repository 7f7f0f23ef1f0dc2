//! Prior distributions and the prior sampler.
//!
//! A prior sample is drawn once per orchestrator run; draw `i` is assigned
//! the prior sample index `i`, which identifies the same parameter vector
//! across positions in multi-position mode.

use rand::Rng;
use rand::distr::weighted::WeightedIndex;
use rand_distr::Distribution;

use crate::config::{Factor, PriorDistributionType, Settings};
use crate::errors::{AllefitError, Result};

// Category weights of the composite fitness prior: lethal, deleterious,
// neutral, advantageous.
const COMPOSITE_WEIGHTS: [f64; 4] = [0.1, 0.4, 0.1, 0.4];

/// One marginal prior distribution.
///
/// `LogUniform` bounds are log10 exponents; its draws stay in log space and
/// are transformed back where the linear value is needed.
#[derive(Clone, Debug, PartialEq)]
pub enum PriorKind {
    Uniform { low: f64, high: f64 },
    LogUniform { low: f64, high: f64 },
    Fixed(f64),
    Composite(Vec<(f64, PriorKind)>),
}

impl PriorKind {
    fn sample_one<R: Rng>(&self, rng: &mut R) -> f64 {
        match self {
            PriorKind::Uniform { low, high } | PriorKind::LogUniform { low, high } => {
                if high > low {
                    rng.random_range(*low..*high)
                } else {
                    *low
                }
            }
            PriorKind::Fixed(value) => *value,
            PriorKind::Composite(components) => {
                let weights = WeightedIndex::new(components.iter().map(|(weight, _)| *weight))
                    .expect("composite prior weights are positive");
                let component = weights.sample(rng);
                components[component].1.sample_one(rng)
            }
        }
    }

    /// Whether draws are kept in log10 space.
    pub fn is_log_scale(&self) -> bool {
        matches!(self, PriorKind::LogUniform { .. })
    }
}

/// Ordered marginals for the free dimensions of the factor under inference.
#[derive(Clone, Debug, PartialEq)]
pub struct PriorSpec {
    pub kinds: Vec<PriorKind>,
}

impl PriorSpec {
    /// Build the prior for the factor an inference run treats as unknown.
    ///
    /// Fitness gets one dimension per non-reference allele; population size
    /// and mutation rate get a single log-scale dimension.
    pub fn for_factor(settings: &Settings) -> Result<PriorSpec> {
        let kinds = match settings.factor {
            Factor::Fitness => match settings.prior_distribution {
                // point mass at the configured per-allele fitness
                PriorDistributionType::Fixed => (1..settings.num_alleles)
                    .map(|allele| PriorKind::Fixed(settings.fixed_fitness[allele]))
                    .collect(),
                PriorDistributionType::Uniform => vec![
                    PriorKind::Uniform {
                        low: settings.min_fitness,
                        high: settings.max_fitness,
                    };
                    settings.num_alleles - 1
                ],
                PriorDistributionType::LogUniform => {
                    if settings.min_fitness <= 0.0 {
                        return Err(AllefitError::ConfigError(
                            "Log-uniform fitness prior requires min_fitness > 0".to_string(),
                        ));
                    }
                    vec![
                        PriorKind::LogUniform {
                            low: settings.min_fitness.log10(),
                            high: settings.max_fitness.log10(),
                        };
                        settings.num_alleles - 1
                    ]
                }
                PriorDistributionType::Composite => {
                    vec![composite_fitness_prior(); settings.num_alleles - 1]
                }
            },
            Factor::PopulationSize => vec![PriorKind::LogUniform {
                low: settings.min_log_popsize,
                high: settings.max_log_popsize,
            }],
            Factor::MutationRate => vec![PriorKind::LogUniform {
                low: settings.min_log_mutation_rate,
                high: settings.max_log_mutation_rate,
            }],
        };
        Ok(PriorSpec { kinds })
    }

    pub fn num_dimensions(&self) -> usize {
        self.kinds.len()
    }
}

fn composite_fitness_prior() -> PriorKind {
    PriorKind::Composite(vec![
        (COMPOSITE_WEIGHTS[0], PriorKind::Fixed(0.0)),
        (COMPOSITE_WEIGHTS[1], PriorKind::Uniform { low: 0.0, high: 1.0 }),
        (COMPOSITE_WEIGHTS[2], PriorKind::Fixed(1.0)),
        (COMPOSITE_WEIGHTS[3], PriorKind::Uniform { low: 1.0, high: 2.0 }),
    ])
}

/// The full table of drawn parameter vectors, in sampling scale.
///
/// Retained across the run for goodness-of-fit testing against the
/// posterior and for the optional prior report.
#[derive(Clone, Debug, PartialEq)]
pub struct PriorSample {
    pub spec: PriorSpec,
    pub draws: Vec<Vec<f64>>,
}

impl PriorSample {
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// One dimension of the prior, transformed to linear scale.
    pub fn linear_marginal(&self, dimension: usize) -> Vec<f64> {
        let log_scale = self.spec.kinds[dimension].is_log_scale();
        self.draws
            .iter()
            .map(|draw| {
                if log_scale {
                    10f64.powf(draw[dimension])
                } else {
                    draw[dimension]
                }
            })
            .collect()
    }
}

pub struct PriorSampler {
    spec: PriorSpec,
}

impl PriorSampler {
    pub fn new(spec: PriorSpec) -> Self {
        Self { spec }
    }

    /// Draw `count` parameter vectors; indices `0..count` are assigned in
    /// draw order and never reused within a run.
    pub fn sample<R: Rng>(&self, count: usize, rng: &mut R) -> PriorSample {
        let draws = (0..count)
            .map(|_| {
                self.spec
                    .kinds
                    .iter()
                    .map(|kind| kind.sample_one(rng))
                    .collect()
            })
            .collect();
        PriorSample {
            spec: self.spec.clone(),
            draws,
        }
    }
}

/// One proposed parameter combination, immutable once drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterVector {
    pub prior_sample_index: usize,
    /// Per-allele fitness; allele 0 is the reference with fitness 1.
    pub fitness: Vec<f64>,
    pub population_size: u64,
    pub mutation_rate: f64,
}

impl ParameterVector {
    /// Combine one prior draw with the configured fixed values.
    pub fn from_draw(index: usize, draw: &[f64], settings: &Settings) -> Self {
        match settings.factor {
            Factor::Fitness => {
                let mut fitness = Vec::with_capacity(settings.num_alleles);
                fitness.push(1.0);
                for &value in draw {
                    let value =
                        if settings.prior_distribution == PriorDistributionType::LogUniform {
                            10f64.powf(value)
                        } else {
                            value
                        };
                    fitness.push(value);
                }
                Self {
                    prior_sample_index: index,
                    fitness,
                    population_size: settings.fixed_population_size,
                    mutation_rate: settings.fixed_mutation_rate,
                }
            }
            Factor::PopulationSize => Self {
                prior_sample_index: index,
                fitness: settings.fixed_fitness.clone(),
                population_size: 10f64.powf(draw[0]).round().max(1.0) as u64,
                mutation_rate: settings.fixed_mutation_rate,
            },
            Factor::MutationRate => Self {
                prior_sample_index: index,
                fitness: settings.fixed_fitness.clone(),
                population_size: settings.fixed_population_size,
                mutation_rate: 10f64.powf(draw[0]),
            },
        }
    }

    /// Parameter vector with every quantity at its configured value, used by
    /// the standalone simulation mode.
    pub fn fixed(settings: &Settings) -> Self {
        Self {
            prior_sample_index: 0,
            fitness: settings.fixed_fitness.clone(),
            population_size: settings.fixed_population_size,
            mutation_rate: settings.fixed_mutation_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn uniform_spec(dimensions: usize) -> PriorSpec {
        PriorSpec {
            kinds: vec![PriorKind::Uniform { low: 0.5, high: 2.0 }; dimensions],
        }
    }

    #[test]
    fn sample_count_and_bounds() {
        let sampler = PriorSampler::new(uniform_spec(2));
        let mut rng = StdRng::seed_from_u64(1);
        let sample = sampler.sample(100, &mut rng);
        assert_eq!(sample.len(), 100);
        for draw in &sample.draws {
            assert_eq!(draw.len(), 2);
            for &value in draw {
                assert!((0.5..2.0).contains(&value));
            }
        }
    }

    #[test]
    fn sampling_is_reproducible() {
        let sampler = PriorSampler::new(uniform_spec(3));
        let sample_a = sampler.sample(50, &mut StdRng::seed_from_u64(7));
        let sample_b = sampler.sample(50, &mut StdRng::seed_from_u64(7));
        assert_eq!(sample_a, sample_b);
    }

    #[test]
    fn zero_count_yields_empty_sample() {
        let sampler = PriorSampler::new(uniform_spec(1));
        let sample = sampler.sample(0, &mut StdRng::seed_from_u64(1));
        assert!(sample.is_empty());
    }

    #[test]
    fn log_uniform_draws_stay_in_log_space() {
        let spec = PriorSpec {
            kinds: vec![PriorKind::LogUniform { low: 2.0, high: 5.0 }],
        };
        let sampler = PriorSampler::new(spec);
        let sample = sampler.sample(200, &mut StdRng::seed_from_u64(3));
        for draw in &sample.draws {
            assert!((2.0..5.0).contains(&draw[0]));
        }
        for value in sample.linear_marginal(0) {
            assert!((100.0..100_000.0).contains(&value));
        }
    }

    #[test]
    fn composite_covers_all_categories() {
        let spec = PriorSpec {
            kinds: vec![composite_fitness_prior()],
        };
        let sampler = PriorSampler::new(spec);
        let sample = sampler.sample(1000, &mut StdRng::seed_from_u64(11));
        let lethal = sample.draws.iter().filter(|draw| draw[0] == 0.0).count();
        let neutral = sample.draws.iter().filter(|draw| draw[0] == 1.0).count();
        let advantageous = sample.draws.iter().filter(|draw| draw[0] > 1.0).count();
        assert!(lethal > 0 && neutral > 0 && advantageous > 0);
        for draw in &sample.draws {
            assert!((0.0..=2.0).contains(&draw[0]));
        }
    }

    #[test]
    fn degenerate_bounds_yield_point_mass() {
        let spec = PriorSpec {
            kinds: vec![PriorKind::Uniform { low: 1.5, high: 1.5 }],
        };
        let sampler = PriorSampler::new(spec);
        let sample = sampler.sample(10, &mut StdRng::seed_from_u64(5));
        assert!(sample.draws.iter().all(|draw| draw[0] == 1.5));
    }

    #[test]
    fn popsize_vector_transforms_from_log_scale() {
        let settings = test_settings(Factor::PopulationSize);
        let vector = ParameterVector::from_draw(4, &[3.0], &settings);
        assert_eq!(vector.prior_sample_index, 4);
        assert_eq!(vector.population_size, 1000);
        assert_eq!(vector.fitness, settings.fixed_fitness);
        assert_eq!(vector.mutation_rate, settings.fixed_mutation_rate);
    }

    #[test]
    fn fixed_fitness_prior_uses_configured_values() {
        let mut settings = test_settings(Factor::Fitness);
        settings.prior_distribution = PriorDistributionType::Fixed;
        settings.fixed_fitness = vec![1.0, 1.4];

        let spec = PriorSpec::for_factor(&settings).unwrap();
        assert_eq!(spec.kinds, vec![PriorKind::Fixed(1.4)]);

        let sample = PriorSampler::new(spec).sample(20, &mut StdRng::seed_from_u64(8));
        assert!(sample.draws.iter().all(|draw| draw == &vec![1.4]));
    }

    #[test]
    fn fitness_vector_prepends_reference_allele() {
        let settings = test_settings(Factor::Fitness);
        let vector = ParameterVector::from_draw(0, &[1.2], &settings);
        assert_eq!(vector.fitness, vec![1.0, 1.2]);
        assert_eq!(vector.population_size, settings.fixed_population_size);
    }

    fn test_settings(factor: Factor) -> Settings {
        use crate::config::ParameterStore;
        use crate::readwrite::ActualData;

        let data = "gen\tallele\tfreq\n0\t0\t0.9\n0\t1\t0.1\n5\t0\t0.5\n5\t1\t0.5\n";
        let params = "popsize 100\nmutation_rate 1e-5\n\
min_log_popsize 2\nmax_log_popsize 5\n\
min_log_mutation_rate -8\nmax_log_mutation_rate -3\n";
        let data = ActualData::read(data.as_bytes()).unwrap();
        let mut store = ParameterStore::parse(params).unwrap();
        Settings::from_store(&mut store, &data, factor).unwrap()
    }
}
