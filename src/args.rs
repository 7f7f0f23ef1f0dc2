use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Path to log file.
    #[clap(long, default_value = "allefit.log")]
    pub log_file: String,

    /// Verbosity (-v debug, -vv trace).
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable the progress bar.
    #[clap(long)]
    pub disable_progress_bar: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Infer per-allele fitness from observed allele frequencies.
    InferFitness(InferArgs),

    /// Infer the mutation rate from observed allele frequencies.
    InferMutation(InferArgs),

    /// Infer the population size from observed allele frequencies.
    InferPopsize(InferArgs),

    /// Run one forward simulation with fixed parameters.
    Simulate(SimulateArgs),
}

#[derive(clap::Args, Debug)]
pub struct InferArgs {
    /// Path to parameter file.
    #[clap(long)]
    pub params: String,

    /// Path to observed data (tab-delimited).
    #[clap(long)]
    pub data: String,

    /// Path to posterior output.
    #[clap(long, short)]
    pub posterior: String,

    /// Path to summary report output.
    #[clap(long, short)]
    pub summary: String,

    /// Optional path to a dump of the full prior sample.
    #[clap(long)]
    pub prior: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct SimulateArgs {
    /// Path to parameter file.
    #[clap(long)]
    pub params: String,

    /// Path to trajectory output (tab-delimited).
    #[clap(long, short)]
    pub output: String,
}
