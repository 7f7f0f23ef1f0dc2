use clap::Parser;

use allefit::args::Args;
use allefit::runner::Runner;

fn main() {
    let args = Args::parse();
    let runner = Runner::new(args);
    if let Err(err) = runner.start() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
