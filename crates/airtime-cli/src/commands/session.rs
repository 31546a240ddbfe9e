use std::path::Path;

use airtime_core::MetadataPatch;
use clap::Subcommand;

use super::{open_engine, print_json, CliResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start monitoring an operator
    Start {
        operator: i64,
        /// Cylinder pressure in bar
        pressure: i32,
        location: String,
        #[arg(long)]
        remarks: Option<String>,
    },
    /// Record a pressure reading
    Update { session: i64, pressure: i32 },
    /// Change location or remarks
    Edit {
        session: i64,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        remarks: Option<String>,
    },
    /// List sessions
    List {
        /// Include completed sessions
        #[arg(long)]
        all: bool,
    },
}

pub fn run(db: Option<&Path>, action: SessionAction) -> CliResult {
    let engine = open_engine(db)?;
    match action {
        SessionAction::Start {
            operator,
            pressure,
            location,
            remarks,
        } => print_json(&engine.create_session(operator, pressure, &location, remarks.as_deref())?),
        SessionAction::Update { session, pressure } => {
            print_json(&engine.update_pressure(session, pressure)?)
        }
        SessionAction::Edit {
            session,
            location,
            remarks,
        } => {
            let patch = MetadataPatch { location, remarks };
            if patch.is_empty() {
                return Err("nothing to edit: pass --location and/or --remarks".into());
            }
            print_json(&engine.update_metadata(session, &patch)?)
        }
        SessionAction::List { all } => print_json(&engine.list_sessions(!all)?),
    }
}
