mod config;
pub mod database;
pub mod memory;
pub mod migrations;

pub use config::{Config, ModelConfig, RefreshConfig, StorageConfig};
pub use database::Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::curve::{CalibrationCurve, CurveId};
use crate::error::Result;
use crate::operator::{Operator, OperatorId};
use crate::session::{ActiveSession, HistoricalRecord, RecordId, SessionId};

/// Returns `~/.config/airtime[-dev]/` based on AIRTIME_ENV.
///
/// Set AIRTIME_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("AIRTIME_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("airtime-dev")
    } else {
        base_dir.join("airtime")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// How a refresh changes an operator's personalized curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CurveWrite {
    /// Overwrite coefficients of an existing curve, keeping its id.
    Update {
        curve_id: CurveId,
        slope: f64,
        intercept: f64,
        description: String,
    },
    /// Insert a new personalized curve and link it to the operator.
    Insert(CalibrationCurve),
}

/// New estimate for one active session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionEstimate {
    pub session_id: SessionId,
    pub estimated_time: i32,
}

/// Everything one operator's refresh writes, committed as a unit.
///
/// Every listed session is re-pointed at the resulting curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshWrite {
    pub operator_id: OperatorId,
    pub curve: CurveWrite,
    pub sessions: Vec<SessionEstimate>,
}

/// Persistence collaborator of the engine.
///
/// Plain CRUD plus two composite writes that must be all-or-nothing:
/// [`complete_session`](Store::complete_session) and
/// [`commit_refresh`](Store::commit_refresh). Uniqueness of the default curve
/// and of each operator's personalized curve is the engine's job; stores may
/// also refuse violating writes.
pub trait Store: Send {
    // === Operators ===
    fn insert_operator(&mut self, operator: &Operator) -> Result<OperatorId>;
    fn get_operator(&self, id: OperatorId) -> Result<Option<Operator>>;
    fn list_operators(&self, active_only: bool) -> Result<Vec<Operator>>;
    fn set_operator_active(&mut self, id: OperatorId, active: bool) -> Result<()>;

    // === Calibration curves ===
    fn insert_curve(&mut self, curve: &CalibrationCurve) -> Result<CurveId>;
    fn get_curve(&self, id: CurveId) -> Result<Option<CalibrationCurve>>;
    fn default_curves(&self) -> Result<Vec<CalibrationCurve>>;
    fn personalized_curve(&self, operator_id: OperatorId) -> Result<Option<CalibrationCurve>>;
    fn list_curves(&self) -> Result<Vec<CalibrationCurve>>;

    // === Active sessions ===
    fn insert_session(&mut self, session: &ActiveSession) -> Result<SessionId>;
    fn get_session(&self, id: SessionId) -> Result<Option<ActiveSession>>;
    fn update_session(&mut self, session: &ActiveSession) -> Result<()>;
    fn list_sessions(&self, active_only: bool) -> Result<Vec<ActiveSession>>;
    fn active_sessions_for(&self, operator_id: OperatorId) -> Result<Vec<ActiveSession>>;

    // === Historical records ===
    fn insert_record(&mut self, record: &HistoricalRecord) -> Result<RecordId>;
    /// Newest first.
    fn history_for(&self, operator_id: OperatorId) -> Result<Vec<HistoricalRecord>>;
    fn list_records(&self) -> Result<Vec<HistoricalRecord>>;

    // === Composite writes ===
    /// Persist the completed session and its archive record together.
    fn complete_session(
        &mut self,
        session: &ActiveSession,
        record: &HistoricalRecord,
    ) -> Result<RecordId>;
    /// Apply one operator's refresh. Returns the id of the resulting curve.
    fn commit_refresh(&mut self, write: &RefreshWrite) -> Result<CurveId>;
}
