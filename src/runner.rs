//! Ties the command line to the inference and simulation pipelines.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::abc::AbcOrchestrator;
use crate::args::{Args, Command, InferArgs, SimulateArgs};
use crate::config::{
    Factor, PARAM_INIT_FREQ_ALLELE_PREFIX, PARAM_NUM_GENERATIONS, ParameterStore, Settings,
};
use crate::prior::ParameterVector;
use crate::readwrite::{ActualData, write_posterior, write_prior, write_summary, write_trajectory};
use crate::simulation::WrightFisherSimulator;
use crate::stats::FactorSummary;

pub struct Runner {
    args: Args,
}

impl Runner {
    pub fn new(args: Args) -> Runner {
        Self::setup_logger(&args);
        Self { args }
    }

    pub fn start(&self) -> Result<()> {
        println!("allefit {}", env!("CARGO_PKG_VERSION"));
        match &self.args.command {
            Command::InferFitness(infer) => self.infer(infer, Factor::Fitness),
            Command::InferMutation(infer) => self.infer(infer, Factor::MutationRate),
            Command::InferPopsize(infer) => self.infer(infer, Factor::PopulationSize),
            Command::Simulate(simulate) => self.simulate(simulate),
        }
    }

    /// Setup logging level and file
    fn setup_logger(args: &Args) {
        let log_level = match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        simple_logging::log_to_file(args.log_file.as_str(), log_level).unwrap_or_else(|_| {
            eprintln!("Unable to open log file.");
            std::process::exit(1);
        });
    }

    fn infer(&self, infer: &InferArgs, factor: Factor) -> Result<()> {
        print!("Reading parameters and data... ");
        let mut store = ParameterStore::read_from_file(&infer.params)
            .with_context(|| format!("Loading parameter file {}", infer.params))?;
        let data = ActualData::read_from_file(&infer.data)
            .with_context(|| format!("Loading data file {}", infer.data))?;
        println!("Done.");

        let settings = Settings::from_store(&mut store, &data, factor)?;
        log::info!("Loaded settings\n{}", settings);
        println!(
            "Inferring {} from {} position(s), {} simulations.",
            factor.name(),
            data.num_positions(),
            settings.num_simulations
        );

        let total = (settings.num_simulations * data.num_positions()) as u64;
        let bar = self.progress_bar(total);

        let mut orchestrator = AbcOrchestrator::new(&settings, &data);
        let outcome = orchestrator.run_inference_with_progress(|completed| {
            if let Some(bar) = &bar {
                bar.set_position(completed);
            }
        })?;
        if let Some(bar) = &bar {
            bar.finish_with_message("Done.");
        }
        log::info!(
            "Inference finished in {} seconds, {} results accepted",
            outcome.running_time.as_secs(),
            outcome.accepted.len()
        );

        let summary = FactorSummary::compute(&outcome, &settings)?;
        write_posterior(&infer.posterior, &outcome, &settings)?;
        write_summary(&infer.summary, &summary.to_table())?;
        if let Some(prior_path) = &infer.prior {
            write_prior(prior_path, &outcome.prior)?;
        }

        println!("{summary}");
        println!("Posterior written to {}.", infer.posterior);
        println!("Summary written to {}.", infer.summary);
        Ok(())
    }

    fn simulate(&self, simulate: &SimulateArgs) -> Result<()> {
        print!("Reading parameters... ");
        let store = ParameterStore::read_from_file(&simulate.params)
            .with_context(|| format!("Loading parameter file {}", simulate.params))?;
        println!("Done.");

        let settings = Settings::for_simulation(&store)?;
        log::info!("Loaded settings\n{}", settings);
        let generations = store.require_usize(PARAM_NUM_GENERATIONS)?;
        let initial = Self::initial_frequencies(&store, settings.num_alleles)?;

        let params = ParameterVector::fixed(&settings);
        let simulator = WrightFisherSimulator::new(&params, settings.num_alleles)?;
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let trajectory = simulator.simulate(&initial, generations, None, &mut rng);
        if trajectory.fixated {
            log::info!("Simulation reached fixation.");
        }

        write_trajectory(&simulate.output, &trajectory.frequencies)?;
        println!(
            "Simulated {} generations, trajectory written to {}.",
            trajectory.num_generations(),
            simulate.output
        );
        Ok(())
    }

    fn initial_frequencies(store: &ParameterStore, num_alleles: usize) -> Result<Vec<f64>> {
        let mut initial = Vec::with_capacity(num_alleles);
        for allele in 0..num_alleles {
            let key = format!("{PARAM_INIT_FREQ_ALLELE_PREFIX}{allele}");
            initial.push(store.require_f64(&key)?);
        }
        Ok(initial)
    }

    fn progress_bar(&self, total: u64) -> Option<ProgressBar> {
        if self.args.disable_progress_bar {
            return None;
        }
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{bar:40}] {pos:>7}/{len:7} [{elapsed_precise} / {duration_precise}] {msg}",
                )
                .expect("Unable to create template.")
                .progress_chars("=> "),
        );
        Some(bar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use std::path::PathBuf;

    struct Workdir {
        dir: PathBuf,
    }

    impl Workdir {
        fn new(name: &str) -> Workdir {
            let dir = std::env::temp_dir().join(format!("allefit-{name}-{}", std::process::id()));
            fs::create_dir_all(&dir).unwrap();
            Workdir { dir }
        }

        fn write(&self, name: &str, content: &str) -> String {
            let path = self.dir.join(name);
            fs::write(&path, content).unwrap();
            path.to_string_lossy().into_owned()
        }

        fn path(&self, name: &str) -> String {
            self.dir.join(name).to_string_lossy().into_owned()
        }
    }

    impl Drop for Workdir {
        fn drop(&mut self) {
            fs::remove_dir_all(&self.dir).ok();
        }
    }

    fn observed_data() -> String {
        let mut rows = String::from("gen\tallele\tfreq\n");
        let mut freq = 0.5;
        for generation in 0..=4 {
            rows.push_str(&format!("{generation}\t0\t{:.6}\n", 1.0 - freq));
            rows.push_str(&format!("{generation}\t1\t{freq:.6}\n"));
            freq = 1.2 * freq / (1.0 - freq + 1.2 * freq);
        }
        rows
    }

    const INFER_PARAMS: &str = "\
popsize 10000
num_simulations 300
num_results_to_keep 30
min_fitness 0.5
max_fitness 2.0
seed 11
";

    fn infer_args(workdir: &Workdir) -> Args {
        Args {
            log_file: workdir.path("run.log"),
            verbose: 0,
            disable_progress_bar: true,
            command: Command::InferFitness(InferArgs {
                params: workdir.write("params.txt", INFER_PARAMS),
                data: workdir.write("data.tsv", &observed_data()),
                posterior: workdir.path("posterior.tsv"),
                summary: workdir.path("summary.tsv"),
                prior: Some(workdir.path("prior.tsv")),
            }),
        }
    }

    #[test]
    #[serial]
    fn infer_fitness_end_to_end() {
        let workdir = Workdir::new("infer");
        let args = infer_args(&workdir);
        Runner::new(args).start().unwrap();

        let posterior = fs::read_to_string(workdir.path("posterior.tsv")).unwrap();
        // header + 30 accepted rows
        assert_eq!(posterior.lines().count(), 31);
        assert!(posterior.starts_with("index\tallele0\tallele1\tN\tmutation_rate\tdistance"));

        let summary = fs::read_to_string(workdir.path("summary.tsv")).unwrap();
        assert!(summary.starts_with("median\tMAD\tmin\tmax\tpval"));

        let prior = fs::read_to_string(workdir.path("prior.tsv")).unwrap();
        assert_eq!(prior.lines().count(), 301);
    }

    #[test]
    #[serial]
    fn seeded_runs_write_identical_files() {
        let workdir_a = Workdir::new("seed-a");
        let workdir_b = Workdir::new("seed-b");
        Runner::new(infer_args(&workdir_a)).start().unwrap();
        Runner::new(infer_args(&workdir_b)).start().unwrap();

        for name in ["posterior.tsv", "summary.tsv", "prior.tsv"] {
            let a = fs::read_to_string(workdir_a.path(name)).unwrap();
            let b = fs::read_to_string(workdir_b.path(name)).unwrap();
            assert_eq!(a, b, "{name} differs between identically seeded runs");
        }
    }

    #[test]
    #[serial]
    fn simulate_output_feeds_back_into_inference() {
        let workdir = Workdir::new("simulate");
        let params = "\
num_alleles 2
popsize 5000
mutation_rate 1e-5
fitness_allele1 1.3
num_generations 6
init_freq_allele0 0.8
init_freq_allele1 0.2
seed 3
";
        let args = Args {
            log_file: workdir.path("run.log"),
            verbose: 0,
            disable_progress_bar: true,
            command: Command::Simulate(SimulateArgs {
                params: workdir.write("params.txt", params),
                output: workdir.path("trajectory.tsv"),
            }),
        };
        Runner::new(args).start().unwrap();

        let data = ActualData::read_from_file(&workdir.path("trajectory.tsv")).unwrap();
        let position = data.first_position();
        assert_eq!(position.num_observations(), 7);
        assert_eq!(position.initial_frequencies(), vec![0.8, 0.2]);
    }

    #[test]
    #[serial]
    fn missing_parameter_file_is_reported() {
        let workdir = Workdir::new("missing");
        let args = Args {
            log_file: workdir.path("run.log"),
            verbose: 0,
            disable_progress_bar: true,
            command: Command::Simulate(SimulateArgs {
                params: workdir.path("does-not-exist.txt"),
                output: workdir.path("trajectory.tsv"),
            }),
        };
        let error = Runner::new(args).start().unwrap_err();
        assert!(error.to_string().contains("does-not-exist"));
    }
}
