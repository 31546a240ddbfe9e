use std::path::Path;

use super::{open_engine, print_json, CliResult};

pub fn run(db: Option<&Path>, operator: Option<i64>) -> CliResult {
    let engine = open_engine(db)?;
    print_json(&engine.history(operator)?)
}
