use std::path::Path;

use airtime_core::{Config, Database, Engine};
use serde::Serialize;

pub mod config;
pub mod history;
pub mod model;
pub mod operator;
pub mod seed;
pub mod serve;
pub mod session;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the engine over `db`, or over the configured database file.
pub fn open_engine(db: Option<&Path>) -> Result<Engine<Database>, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    open_engine_with(db, &config)
}

pub fn open_engine_with(
    db: Option<&Path>,
    config: &Config,
) -> Result<Engine<Database>, Box<dyn std::error::Error>> {
    let database = match db {
        Some(path) => Database::open_at(path)?,
        None => Database::open_at(&config.database_path()?)?,
    };
    Ok(Engine::new(database, &config.model)?)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
