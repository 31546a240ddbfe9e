use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::curve::{CurveId, Pressure};
use crate::operator::OperatorId;

/// Record identifier assigned by the store.
pub type RecordId = i64;

/// Archive of one completed session. Written once, never changed.
///
/// These records are the only input to personalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub id: Option<RecordId>,
    pub operator_id: OperatorId,
    /// Curve that was producing estimates when the session ended.
    pub curve_id: CurveId,
    pub session_date: DateTime<Utc>,
    pub initial_pressure: Pressure,
    pub final_pressure: Pressure,
    /// Whole minutes from entry to completion.
    pub duration: i64,
    pub location: String,
}

impl HistoricalRecord {
    /// Records with no duration carry no consumption signal.
    pub fn has_signal(&self) -> bool {
        self.duration > 0
    }
}
