//! Configuration data structures for inference and simulation runs.

mod settings;
mod store;

pub use settings::{
    DistanceMetric, Factor, MAX_BATCHES, PARAM_FITNESS_ALLELE_PREFIX,
    PARAM_INIT_FREQ_ALLELE_PREFIX, PARAM_NUM_ALLELES, PARAM_NUM_GENERATIONS, PriorDistributionType,
    Scaling, Settings,
};
pub use store::ParameterStore;
