//! Reader for observed allele-frequency time series.
//!
//! The data file is tab-delimited with a header line `gen allele freq` and
//! an optional `pos` column for multi-position (multi-locus) data. Rows for
//! one position and generation together form the frequency vector of that
//! generation.

use ndarray::Array2;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io;

use crate::errors::{AllefitError, Result};

const FREQUENCY_SUM_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Deserialize)]
struct ObservationRecord {
    #[serde(rename = "gen")]
    generation: usize,
    allele: usize,
    freq: f64,
    #[serde(default)]
    pos: Option<u32>,
}

/// One genomic locus with its observed time series.
///
/// `frequencies` has one row per observed generation, one column per allele.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    pub id: u32,
    pub generations: Vec<usize>,
    pub frequencies: Array2<f64>,
}

impl Position {
    pub fn num_observations(&self) -> usize {
        self.generations.len()
    }

    pub fn num_alleles(&self) -> usize {
        self.frequencies.ncols()
    }

    /// Observation generations relative to the first one.
    pub fn generation_offsets(&self) -> Vec<usize> {
        let first = self.generations[0];
        self.generations
            .iter()
            .map(|generation| generation - first)
            .collect()
    }

    /// Number of generations the simulator has to cover.
    pub fn generation_span(&self) -> usize {
        self.generations[self.num_observations() - 1] - self.generations[0]
    }

    pub fn initial_frequencies(&self) -> Vec<f64> {
        self.frequencies.row(0).to_vec()
    }
}

/// The full observed dataset: one or more positions, loaded once and
/// read-only thereafter.
#[derive(Clone, Debug, PartialEq)]
pub struct ActualData {
    positions: Vec<Position>,
}

impl ActualData {
    pub fn read_from_file(path: &str) -> Result<Self> {
        let reader = std::fs::File::open(path).map_err(|err| {
            AllefitError::DataError(format!("Failed to open data file {path}: {err}"))
        })?;
        Self::read(reader)
            .map_err(|err| AllefitError::DataError(format!("In data file {path}: {err}")))
    }

    pub fn read(reader: impl io::Read) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_reader(reader);

        // position id -> generation -> (allele, freq)
        let mut table: BTreeMap<u32, BTreeMap<usize, Vec<(usize, f64)>>> = BTreeMap::new();
        for record in csv_reader.deserialize() {
            let record: ObservationRecord = record
                .map_err(|err| AllefitError::DataError(format!("Failed to parse record: {err}")))?;
            table
                .entry(record.pos.unwrap_or(0))
                .or_default()
                .entry(record.generation)
                .or_default()
                .push((record.allele, record.freq));
        }

        if table.is_empty() {
            return Err(AllefitError::DataError(
                "Data file contains no observations".to_string(),
            ));
        }

        let positions: Result<Vec<Position>> = table
            .into_iter()
            .map(|(id, generations)| Self::build_position(id, generations))
            .collect();
        Ok(Self {
            positions: positions?,
        })
    }

    fn build_position(
        id: u32,
        generations: BTreeMap<usize, Vec<(usize, f64)>>,
    ) -> Result<Position> {
        let num_alleles = generations
            .values()
            .flat_map(|alleles| alleles.iter().map(|(allele, _)| allele + 1))
            .max()
            .unwrap_or(0);
        if num_alleles < 2 {
            return Err(AllefitError::DataError(format!(
                "Position {id} has fewer than two alleles"
            )));
        }

        let num_observations = generations.len();
        let mut frequencies = Array2::zeros((num_observations, num_alleles));
        let mut generation_numbers = Vec::with_capacity(num_observations);

        for (row, (generation, mut alleles)) in generations.into_iter().enumerate() {
            alleles.sort_by_key(|(allele, _)| *allele);
            let indices: Vec<usize> = alleles.iter().map(|(allele, _)| *allele).collect();
            if indices != (0..num_alleles).collect::<Vec<usize>>() {
                return Err(AllefitError::DataError(format!(
                    "Position {id}, generation {generation}: expected alleles 0..{num_alleles}, got {indices:?}"
                )));
            }
            let sum: f64 = alleles.iter().map(|(_, freq)| freq).sum();
            if (sum - 1.0).abs() > FREQUENCY_SUM_TOLERANCE {
                return Err(AllefitError::DataError(format!(
                    "Position {id}, generation {generation}: frequencies sum to {sum}, expected 1"
                )));
            }
            for (allele, freq) in alleles {
                if !(0.0..=1.0).contains(&freq) {
                    return Err(AllefitError::DataError(format!(
                        "Position {id}, generation {generation}, allele {allele}: frequency {freq} out of range"
                    )));
                }
                frequencies[[row, allele]] = freq;
            }
            generation_numbers.push(generation);
        }

        if num_observations < 2 {
            return Err(AllefitError::DataError(format!(
                "Position {id} has fewer than two observed generations"
            )));
        }

        Ok(Position {
            id,
            generations: generation_numbers,
            frequencies,
        })
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn num_positions(&self) -> usize {
        self.positions.len()
    }

    pub fn is_multi_position(&self) -> bool {
        self.positions.len() > 1
    }

    pub fn first_position(&self) -> &Position {
        &self.positions[0]
    }

    /// Allele count shared by all positions; mixed counts are a data error.
    pub fn num_alleles(&self) -> Result<usize> {
        let num_alleles = self.positions[0].num_alleles();
        for position in &self.positions {
            if position.num_alleles() != num_alleles {
                return Err(AllefitError::DataError(format!(
                    "Position {} has {} alleles, expected {}",
                    position.id,
                    position.num_alleles(),
                    num_alleles
                )));
            }
        }
        Ok(num_alleles)
    }
}
