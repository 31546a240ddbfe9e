use std::path::Path;

use clap::Subcommand;

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum ModelAction {
    /// Curve currently used for an operator
    Curve { operator: i64 },
    /// Default and personalized estimates at a pressure
    Predict { operator: i64, pressure: i32 },
    /// Re-fit one operator now
    Analyze { operator: i64 },
    /// Run one refresh cycle over every active operator
    Refresh,
    /// Sample every stored curve at 300/200/150 bar
    Report,
}

pub fn run(db: Option<&Path>, action: ModelAction) -> CliResult {
    let engine = open_engine(db)?;
    match action {
        ModelAction::Curve { operator } => print_json(&engine.get_effective_curve(operator)?),
        ModelAction::Predict { operator, pressure } => {
            print_json(&engine.predict(operator, pressure)?)
        }
        ModelAction::Analyze { operator } => print_json(&engine.analyze_operator(operator)?),
        ModelAction::Refresh => print_json(&engine.run_refresh_cycle()?),
        ModelAction::Report => print_json(&engine.model_report()?),
    }
}
