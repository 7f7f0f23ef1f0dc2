//! Writers for the posterior, prior and summary report files.
//!
//! All tabular output is tab-delimited to match the input format.

use std::collections::HashMap;
use std::fs::File;

use crate::abc::{InferenceOutcome, SimulationResult};
use crate::config::Settings;
use crate::errors::{AllefitError, Result};
use crate::prior::PriorSample;

fn open_writer(path: &str) -> Result<csv::Writer<File>> {
    let file = File::create(path).map_err(|err| {
        AllefitError::WriteError(format!("Failed to create {path}: {err}"))
    })?;
    Ok(csv::WriterBuilder::new().delimiter(b'\t').from_writer(file))
}

fn write_failure(path: &str, err: impl std::fmt::Display) -> AllefitError {
    AllefitError::WriteError(format!("Failed to write {path}: {err}"))
}

/// Write the accepted posterior sample, one row per accepted parameter
/// vector. In multi-position mode the aggregate rows carry the summed
/// distance and are followed by the per-position rows of every accepted
/// index.
pub fn write_posterior(
    path: &str,
    outcome: &InferenceOutcome,
    settings: &Settings,
) -> Result<()> {
    let mut writer = open_writer(path)?;

    let mut header: Vec<String> = vec!["index".to_string()];
    for allele in 0..settings.num_alleles {
        header.push(format!("allele{allele}"));
    }
    header.push("N".to_string());
    header.push("mutation_rate".to_string());
    header.push("distance".to_string());
    if outcome.multi_position {
        header.push("sum_distance".to_string());
        header.push("pos".to_string());
    }
    writer
        .write_record(&header)
        .map_err(|err| write_failure(path, err))?;

    for result in &outcome.accepted {
        let mut row: Vec<String> = vec![result.prior_sample_index.to_string()];
        for &fitness in &result.fitness {
            row.push(format!("{fitness:.6}"));
        }
        row.push(result.population_size.to_string());
        row.push(format!("{:.6e}", result.mutation_rate));
        row.push(format!("{:.6e}", result.distance_from_actual));
        if outcome.multi_position {
            row.push(format!("{:.6e}", result.sum_distance));
            row.push(result.position.to_string());
        }
        writer
            .write_record(&row)
            .map_err(|err| write_failure(path, err))?;
    }

    if outcome.multi_position {
        let mut by_index: HashMap<usize, Vec<&SimulationResult>> = HashMap::new();
        for result in &outcome.all_results {
            by_index
                .entry(result.prior_sample_index)
                .or_default()
                .push(result);
        }
        for accepted in &outcome.accepted {
            for result in by_index
                .get(&accepted.prior_sample_index)
                .into_iter()
                .flatten()
            {
                let mut row: Vec<String> = vec![result.prior_sample_index.to_string()];
                for &fitness in &result.fitness {
                    row.push(format!("{fitness:.6}"));
                }
                row.push(result.population_size.to_string());
                row.push(format!("{:.6e}", result.mutation_rate));
                row.push(format!("{:.6e}", result.distance_from_actual));
                row.push(format!("{:.6e}", accepted.sum_distance));
                row.push(result.position.to_string());
                writer
                    .write_record(&row)
                    .map_err(|err| write_failure(path, err))?;
            }
        }
    }

    writer.flush().map_err(|err| write_failure(path, err))?;
    Ok(())
}

/// Write the full prior sample in sampling scale, one row per draw.
pub fn write_prior(path: &str, prior: &PriorSample) -> Result<()> {
    let mut writer = open_writer(path)?;

    let dimensions = prior.spec.num_dimensions();
    let mut header: Vec<String> = vec!["index".to_string()];
    for dimension in 0..dimensions {
        header.push(format!("draw{dimension}"));
    }
    writer
        .write_record(&header)
        .map_err(|err| write_failure(path, err))?;

    for (index, draw) in prior.draws.iter().enumerate() {
        let mut row: Vec<String> = vec![index.to_string()];
        for &value in draw {
            row.push(format!("{value:.6e}"));
        }
        writer
            .write_record(&row)
            .map_err(|err| write_failure(path, err))?;
    }

    writer.flush().map_err(|err| write_failure(path, err))?;
    Ok(())
}

/// Write an already-rendered report verbatim.
pub fn write_summary(path: &str, report: &str) -> Result<()> {
    std::fs::write(path, report).map_err(|err| write_failure(path, err))
}

/// Write a simulated trajectory in the observed-data format so it can be
/// fed straight back into inference.
pub fn write_trajectory(
    path: &str,
    frequencies: &ndarray::Array2<f64>,
) -> Result<()> {
    let mut writer = open_writer(path)?;
    writer
        .write_record(["gen", "allele", "freq"])
        .map_err(|err| write_failure(path, err))?;
    for (generation, row) in frequencies.rows().into_iter().enumerate() {
        for (allele, &freq) in row.iter().enumerate() {
            writer
                .write_record([
                    generation.to_string(),
                    allele.to_string(),
                    format!("{freq:.6}"),
                ])
                .map_err(|err| write_failure(path, err))?;
        }
    }
    writer.flush().map_err(|err| write_failure(path, err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Factor, ParameterStore};
    use crate::prior::{PriorKind, PriorSpec};
    use crate::readwrite::ActualData;
    use ndarray::array;
    use std::time::Duration;

    fn temp_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("allefit-report-{name}-{}", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    fn result(index: usize, distance: f64, position: u32) -> SimulationResult {
        SimulationResult {
            prior_sample_index: index,
            fitness: vec![1.0, 1.3],
            population_size: 1000,
            mutation_rate: 1e-5,
            distance_from_actual: distance,
            sum_distance: distance,
            position,
            multi_position: false,
            fixated: false,
        }
    }

    fn settings() -> Settings {
        let data = "gen\tallele\tfreq\n0\t0\t0.9\n0\t1\t0.1\n5\t0\t0.5\n5\t1\t0.5\n";
        let data = ActualData::read(data.as_bytes()).unwrap();
        let mut store = ParameterStore::parse("popsize 1000\nmutation_rate 1e-5\n").unwrap();
        Settings::from_store(&mut store, &data, Factor::Fitness).unwrap()
    }

    #[test]
    fn posterior_file_round_trips() {
        let outcome = InferenceOutcome {
            accepted: vec![result(3, 0.1, 0), result(1, 0.2, 0)],
            all_results: vec![result(3, 0.1, 0), result(1, 0.2, 0)],
            prior: PriorSample {
                spec: PriorSpec {
                    kinds: vec![PriorKind::Uniform { low: 0.0, high: 2.0 }],
                },
                draws: vec![vec![1.3], vec![0.7]],
            },
            rejection_threshold: Some(0.2),
            running_time: Duration::from_secs(1),
            multi_position: false,
        };
        let path = temp_path("posterior");
        write_posterior(&path, &outcome, &settings()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "index\tallele0\tallele1\tN\tmutation_rate\tdistance"
        );
        let first: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(first[0], "3");
        assert_eq!(first[2], "1.300000");
        assert_eq!(first[3], "1000");
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn multi_position_posterior_lists_per_position_rows() {
        let mut aggregate_a = result(0, 0.3, 1);
        aggregate_a.sum_distance = 0.5;
        aggregate_a.multi_position = true;
        let mut aggregate_b = result(1, 0.4, 1);
        aggregate_b.sum_distance = 0.9;
        aggregate_b.multi_position = true;

        let all_results = vec![
            result(0, 0.3, 1),
            result(1, 0.4, 1),
            result(0, 0.2, 2),
            result(1, 0.5, 2),
        ];
        let outcome = InferenceOutcome {
            accepted: vec![aggregate_a, aggregate_b],
            all_results,
            prior: PriorSample {
                spec: PriorSpec {
                    kinds: vec![PriorKind::Uniform { low: 0.0, high: 2.0 }],
                },
                draws: vec![vec![1.3], vec![0.7]],
            },
            rejection_threshold: Some(0.9),
            running_time: Duration::from_secs(1),
            multi_position: true,
        };
        let path = temp_path("posterior-multi");
        write_posterior(&path, &outcome, &settings()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "index\tallele0\tallele1\tN\tmutation_rate\tdistance\tsum_distance\tpos"
        );
        // two aggregate rows, then two per-position rows per accepted index
        assert_eq!(lines.len(), 7);
        let per_position_positions: Vec<&str> = lines[3..]
            .iter()
            .map(|line| line.split('\t').next_back().unwrap())
            .collect();
        assert_eq!(per_position_positions, vec!["1", "2", "1", "2"]);
        let per_position_indices: Vec<&str> = lines[3..]
            .iter()
            .map(|line| line.split('\t').next().unwrap())
            .collect();
        assert_eq!(per_position_indices, vec!["0", "0", "1", "1"]);
    }

    #[test]
    fn prior_file_lists_every_draw() {
        let prior = PriorSample {
            spec: PriorSpec {
                kinds: vec![PriorKind::Uniform { low: 0.0, high: 2.0 }; 2],
            },
            draws: vec![vec![0.5, 1.5], vec![1.0, 1.0]],
        };
        let path = temp_path("prior");
        write_prior(&path, &prior).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "index\tdraw0\tdraw1");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("0\t"));
        assert!(lines[2].starts_with("1\t"));
    }

    #[test]
    fn trajectory_file_is_valid_input_data() {
        let frequencies = array![[0.9, 0.1], [0.7, 0.3], [0.5, 0.5]];
        let path = temp_path("trajectory");
        write_trajectory(&path, &frequencies).unwrap();
        let reread = ActualData::read_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let position = reread.first_position();
        assert_eq!(position.num_observations(), 3);
        assert_eq!(position.initial_frequencies(), vec![0.9, 0.1]);
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let outcome = InferenceOutcome {
            accepted: vec![],
            all_results: vec![],
            prior: PriorSample {
                spec: PriorSpec { kinds: vec![] },
                draws: vec![],
            },
            rejection_threshold: None,
            running_time: Duration::ZERO,
            multi_position: false,
        };
        assert!(matches!(
            write_posterior("/nonexistent-dir/posterior.tsv", &outcome, &settings()),
            Err(AllefitError::WriteError(_))
        ));
    }
}
