use std::path::Path;

use airtime_core::seed::{self, SeedOptions};
use clap::Args;

use super::{open_engine, print_json, CliResult};

#[derive(Args)]
pub struct SeedArgs {
    /// RNG seed for reproducible data
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 5)]
    operators: usize,
    #[arg(long, default_value_t = 10)]
    sessions: usize,
}

pub fn run(db: Option<&Path>, args: SeedArgs) -> CliResult {
    let engine = open_engine(db)?;
    let options = SeedOptions {
        seed: args.seed,
        operators: args.operators,
        sessions_per_operator: args.sessions,
    };
    print_json(&seed::populate(&engine, &options)?)
}
