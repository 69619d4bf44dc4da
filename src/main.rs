use clap::Parser;
use sportfund::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
