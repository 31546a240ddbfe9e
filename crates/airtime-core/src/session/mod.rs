//! Monitoring sessions and their archived records.
//!
//! ## State Transitions
//!
//! ```text
//! Active --(pressure <= curve.min_pressure)--> Completed
//! ```
//!
//! A session is created active. Each pressure reading re-estimates the
//! remaining time against the session's curve; the reading that reaches the
//! curve's minimum pressure completes the session and yields exactly one
//! [`HistoricalRecord`]. Completed sessions accept no further changes.

mod record;

pub use record::{HistoricalRecord, RecordId};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::curve::{CalibrationCurve, CurveId, Pressure};
use crate::error::{CoreError, Result};
use crate::operator::OperatorId;

/// Session identifier assigned by the store.
pub type SessionId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Completed,
}

/// Location/remarks edit. `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPatch {
    pub location: Option<String>,
    pub remarks: Option<String>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.location.is_none() && self.remarks.is_none()
    }
}

/// A live monitoring session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub id: Option<SessionId>,
    pub operator_id: OperatorId,
    /// Curve used for estimates; refresh passes may re-point it.
    pub curve_id: CurveId,
    pub initial_pressure: Pressure,
    pub current_pressure: Pressure,
    pub entry_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
    /// Minutes remaining according to the current curve.
    pub estimated_time: i32,
    pub active: bool,
    pub location: String,
    pub remarks: String,
}

impl ActiveSession {
    /// Open a session at `initial_pressure`, estimated with `curve`.
    pub fn start(
        operator_id: OperatorId,
        curve_id: CurveId,
        curve: &CalibrationCurve,
        initial_pressure: Pressure,
        location: &str,
        remarks: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            operator_id,
            curve_id,
            initial_pressure,
            current_pressure: initial_pressure,
            entry_time: now,
            updated_time: now,
            estimated_time: curve.evaluate(initial_pressure),
            active: true,
            location: location.to_string(),
            remarks: remarks.to_string(),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.active {
            SessionState::Active
        } else {
            SessionState::Completed
        }
    }

    pub(crate) fn ensure_active(&self, action: &str) -> Result<()> {
        if self.active {
            return Ok(());
        }
        Err(CoreError::InvalidState {
            session_id: self.id.unwrap_or_default(),
            message: format!("cannot {action}: session is completed"),
        })
    }

    /// Apply a pressure reading.
    ///
    /// Returns the archive record when this reading completes the session.
    /// The caller must persist the session and the record together.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidState`] if the session is already completed.
    pub fn apply_pressure(
        &mut self,
        curve: &CalibrationCurve,
        pressure: Pressure,
        now: DateTime<Utc>,
    ) -> Result<Option<HistoricalRecord>> {
        self.ensure_active("update pressure")?;

        self.current_pressure = pressure;
        self.estimated_time = curve.evaluate(pressure);
        self.updated_time = now;

        if !curve.is_exhausted(pressure) {
            return Ok(None);
        }

        self.active = false;
        Ok(Some(HistoricalRecord {
            id: None,
            operator_id: self.operator_id,
            curve_id: self.curve_id,
            session_date: self.entry_time,
            initial_pressure: self.initial_pressure,
            final_pressure: pressure,
            duration: elapsed_minutes(self.entry_time, now),
            location: self.location.clone(),
        }))
    }

    /// Estimate under `curve` from the last reading, without a new reading.
    pub fn estimate_with(&self, curve: &CalibrationCurve) -> i32 {
        curve.evaluate(self.current_pressure)
    }

    /// # Errors
    /// Returns [`CoreError::InvalidState`] if the session is already completed.
    pub fn apply_metadata(&mut self, patch: &MetadataPatch) -> Result<()> {
        self.ensure_active("edit metadata")?;
        if let Some(location) = &patch.location {
            self.location = location.clone();
        }
        if let Some(remarks) = &patch.remarks {
            self.remarks = remarks.clone();
        }
        Ok(())
    }
}

/// Whole minutes between two instants, rounded half-to-even, never negative.
pub fn elapsed_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let secs = (to - from).num_milliseconds() as f64 / 1000.0;
    ((secs / 60.0).round_ties_even() as i64).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_at(pressure: Pressure, now: DateTime<Utc>) -> ActiveSession {
        let mut session = ActiveSession::start(
            1,
            1,
            &CalibrationCurve::standard(),
            pressure,
            "Active Incident",
            "",
            now,
        );
        session.id = Some(10);
        session
    }

    #[test]
    fn start_estimates_from_initial_pressure() {
        let now = Utc::now();
        let session = session_at(290, now);
        assert_eq!(session.estimated_time, 37);
        assert_eq!(session.current_pressure, 290);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn pressure_above_minimum_stays_active() {
        let start = Utc::now();
        let mut session = session_at(290, start);
        let curve = CalibrationCurve::standard();
        let later = start + Duration::minutes(5);

        let record = session.apply_pressure(&curve, 260, later).unwrap();
        assert!(record.is_none());
        assert!(session.active);
        assert_eq!(session.estimated_time, 32);
        assert_eq!(session.updated_time, later);
    }

    #[test]
    fn reaching_minimum_completes_with_record() {
        let start = Utc::now();
        let mut session = session_at(290, start);
        let curve = CalibrationCurve::standard();

        let record = session
            .apply_pressure(&curve, 150, start + Duration::seconds(21 * 60 + 40))
            .unwrap()
            .expect("completion record");
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(record.duration, 22);
        assert_eq!(record.initial_pressure, 290);
        assert_eq!(record.final_pressure, 150);
        assert_eq!(record.session_date, start);
        assert_eq!(record.location, "Active Incident");
    }

    #[test]
    fn completed_session_rejects_changes() {
        let start = Utc::now();
        let mut session = session_at(160, start);
        let curve = CalibrationCurve::standard();
        session.apply_pressure(&curve, 140, start).unwrap();

        let err = session.apply_pressure(&curve, 130, start).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { session_id: 10, .. }));

        let patch = MetadataPatch {
            location: Some("Sector 2".into()),
            remarks: None,
        };
        assert!(session.apply_metadata(&patch).is_err());
        assert_eq!(session.current_pressure, 140);
    }

    #[test]
    fn metadata_patch_leaves_estimate_alone() {
        let mut session = session_at(250, Utc::now());
        let before = session.estimated_time;
        session
            .apply_metadata(&MetadataPatch {
                location: None,
                remarks: Some("entering stairwell B".into()),
            })
            .unwrap();
        assert_eq!(session.remarks, "entering stairwell B");
        assert_eq!(session.location, "Active Incident");
        assert_eq!(session.estimated_time, before);
    }

    #[test]
    fn estimate_with_uses_current_pressure() {
        let mut session = session_at(300, Utc::now());
        session.current_pressure = 200;
        let mut curve = CalibrationCurve::standard();
        curve.slope *= 2.0;
        assert_eq!(session.estimate_with(&curve), curve.evaluate(200));
        assert_eq!(session.estimated_time, 38);
    }

    #[test]
    fn elapsed_minutes_rounds_and_floors_at_zero() {
        let t = Utc::now();
        assert_eq!(elapsed_minutes(t, t + Duration::seconds(89)), 1);
        assert_eq!(elapsed_minutes(t, t + Duration::seconds(91)), 2);
        assert_eq!(elapsed_minutes(t, t + Duration::seconds(150)), 2);
        assert_eq!(elapsed_minutes(t, t - Duration::minutes(3)), 0);
    }
}
