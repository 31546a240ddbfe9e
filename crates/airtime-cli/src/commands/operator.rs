use std::path::Path;

use clap::Subcommand;

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum OperatorAction {
    /// Register an operator
    Add {
        /// Badge number (unique)
        badge: String,
        first_name: String,
        last_name: String,
    },
    /// List operators
    List {
        /// Include deactivated operators
        #[arg(long)]
        all: bool,
    },
    /// Exclude an operator from refresh passes
    Deactivate { id: i64 },
}

pub fn run(db: Option<&Path>, action: OperatorAction) -> CliResult {
    let engine = open_engine(db)?;
    match action {
        OperatorAction::Add {
            badge,
            first_name,
            last_name,
        } => print_json(&engine.register_operator(&badge, &first_name, &last_name)?),
        OperatorAction::List { all } => print_json(&engine.list_operators(!all)?),
        OperatorAction::Deactivate { id } => print_json(&engine.deactivate_operator(id)?),
    }
}
