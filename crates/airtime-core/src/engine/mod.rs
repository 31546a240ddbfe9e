//! Consumption modelling engine.
//!
//! [`Engine`] ties the pieces together: it owns the store, resolves which
//! curve applies to an operator, drives the session lifecycle and runs refresh
//! passes. The store sits behind one mutex and every public operation holds it
//! for its whole read-modify-write, so a reader never observes a curve with one
//! coefficient updated and the other not.

mod refresh;
mod report;
mod scheduler;

pub use refresh::{RefreshOutcome, RefreshReport};
pub use report::{CurveReport, ModelReport, REPORT_PRESSURES};
pub use scheduler::RefreshScheduler;

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::curve::{CalibrationCurve, Pressure};
use crate::error::{CoreError, Result, ValidationError};
use crate::fitting::ConsumptionFitter;
use crate::operator::{Operator, OperatorId};
use crate::session::{ActiveSession, HistoricalRecord, MetadataPatch, SessionId};
use crate::storage::{ModelConfig, Store};

/// Result of a pressure reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub session: ActiveSession,
    /// Archive record, present only when this reading completed the session.
    pub completed: Option<HistoricalRecord>,
}

/// Estimates for one operator at one pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub operator_id: OperatorId,
    pub pressure: Pressure,
    pub default_estimate: i32,
    /// Equal to `default_estimate` while the operator has no personalized curve.
    pub personalized_estimate: i32,
    pub personalized: bool,
}

pub struct Engine<S: Store> {
    store: Mutex<S>,
    fitter: ConsumptionFitter,
    default_curve: CalibrationCurve,
}

impl<S: Store> Engine<S> {
    /// Wrap `store`, resolving the system default curve.
    ///
    /// An empty store gets the default curve built from `model`'s anchors;
    /// otherwise the stored default is adopted as is.
    ///
    /// # Errors
    /// Returns a config error if `model` fails validation, and
    /// [`CoreError::Integrity`] if the store holds more than one default curve.
    pub fn new(mut store: S, model: &ModelConfig) -> Result<Self> {
        model.validate()?;
        let mut defaults = store.default_curves()?;
        let default_curve = match defaults.len() {
            0 => {
                let mut curve = model.default_curve();
                curve.id = Some(store.insert_curve(&curve)?);
                info!(
                    slope = curve.slope,
                    intercept = curve.intercept,
                    "created default calibration curve"
                );
                curve
            }
            1 => defaults.remove(0),
            n => {
                return Err(CoreError::Integrity(format!(
                    "expected one default calibration curve, found {n}"
                )))
            }
        };
        if default_curve.id.is_none() {
            return Err(CoreError::Integrity("default curve has no id".into()));
        }

        let fitter = ConsumptionFitter::from_config(model, &default_curve);
        Ok(Self {
            store: Mutex::new(store),
            fitter,
            default_curve,
        })
    }

    pub fn default_curve(&self) -> &CalibrationCurve {
        &self.default_curve
    }

    pub fn fitter(&self) -> &ConsumptionFitter {
        &self.fitter
    }

    fn lock(&self) -> Result<MutexGuard<'_, S>> {
        self.store
            .lock()
            .map_err(|_| CoreError::Custom("store lock poisoned".to_string()))
    }

    /// Run a read-only closure against the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&S) -> Result<R>) -> Result<R> {
        let store = self.lock()?;
        f(&store)
    }

    // === Operators ===

    /// # Errors
    /// Returns a validation error for a blank badge number or name.
    pub fn register_operator(&self, badge: &str, first: &str, last: &str) -> Result<Operator> {
        let fields = [
            ("badge_number", badge),
            ("first_name", first),
            ("last_name", last),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: field.to_string(),
                    message: "must not be empty".to_string(),
                }
                .into());
            }
        }

        let mut operator = Operator::new(badge.trim(), first.trim(), last.trim(), Utc::now());
        let id = self.lock()?.insert_operator(&operator)?;
        operator.id = Some(id);
        info!(operator_id = id, badge = %operator.badge_number, "registered operator");
        Ok(operator)
    }

    pub fn get_operator(&self, operator_id: OperatorId) -> Result<Operator> {
        self.with_store(|store| load_operator(store, operator_id))
    }

    pub fn list_operators(&self, active_only: bool) -> Result<Vec<Operator>> {
        self.with_store(|store| store.list_operators(active_only))
    }

    /// Take an operator out of refresh passes. History and curves are kept.
    pub fn deactivate_operator(&self, operator_id: OperatorId) -> Result<Operator> {
        let mut store = self.lock()?;
        let mut operator = load_operator(&*store, operator_id)?;
        store.set_operator_active(operator_id, false)?;
        operator.active = false;
        info!(operator_id, "deactivated operator");
        Ok(operator)
    }

    // === Curves ===

    fn effective_curve(&self, store: &S, operator: &Operator) -> Result<CalibrationCurve> {
        if let Some(curve_id) = operator.custom_curve_id {
            match store.get_curve(curve_id)? {
                Some(curve) => return Ok(curve),
                None => warn!(
                    operator_id = ?operator.id,
                    curve_id,
                    "linked calibration curve missing, using default"
                ),
            }
        }
        Ok(self.default_curve.clone())
    }

    /// The operator's personalized curve if one exists, else the default.
    pub fn get_effective_curve(&self, operator_id: OperatorId) -> Result<CalibrationCurve> {
        self.with_store(|store| {
            let operator = load_operator(store, operator_id)?;
            self.effective_curve(store, &operator)
        })
    }

    pub fn list_curves(&self) -> Result<Vec<CalibrationCurve>> {
        self.with_store(|store| store.list_curves())
    }

    pub fn predict(&self, operator_id: OperatorId, pressure: Pressure) -> Result<Prediction> {
        let curve = self.get_effective_curve(operator_id)?;
        Ok(Prediction {
            operator_id,
            pressure,
            default_estimate: self.default_curve.evaluate(pressure),
            personalized_estimate: curve.evaluate(pressure),
            personalized: !curve.is_default,
        })
    }

    // === Sessions ===

    pub fn create_session(
        &self,
        operator_id: OperatorId,
        initial_pressure: Pressure,
        location: &str,
        remarks: Option<&str>,
    ) -> Result<ActiveSession> {
        self.create_session_at(operator_id, initial_pressure, location, remarks, Utc::now())
    }

    /// Open a session estimated with the operator's effective curve.
    ///
    /// # Errors
    /// Returns [`CoreError::NotFound`] if the operator does not exist.
    pub fn create_session_at(
        &self,
        operator_id: OperatorId,
        initial_pressure: Pressure,
        location: &str,
        remarks: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ActiveSession> {
        let mut store = self.lock()?;
        let operator = load_operator(&*store, operator_id)?;
        let curve = self.effective_curve(&*store, &operator)?;
        let curve_id = curve
            .id
            .ok_or_else(|| CoreError::Integrity(format!("curve '{}' has no id", curve.name)))?;

        let mut session = ActiveSession::start(
            operator_id,
            curve_id,
            &curve,
            initial_pressure,
            location,
            remarks.unwrap_or_default(),
            now,
        );
        session.id = Some(store.insert_session(&session)?);
        info!(
            session_id = ?session.id,
            operator_id,
            curve_id,
            estimated_time = session.estimated_time,
            "session started"
        );
        Ok(session)
    }

    pub fn update_pressure(
        &self,
        session_id: SessionId,
        pressure: Pressure,
    ) -> Result<SessionUpdate> {
        self.update_pressure_at(session_id, pressure, Utc::now())
    }

    /// Record a pressure reading.
    ///
    /// The reading that reaches the session curve's minimum pressure completes
    /// the session; the session and its archive record are written together.
    ///
    /// # Errors
    /// Returns [`CoreError::NotFound`] for an unknown session and
    /// [`CoreError::InvalidState`] for a completed one.
    pub fn update_pressure_at(
        &self,
        session_id: SessionId,
        pressure: Pressure,
        now: DateTime<Utc>,
    ) -> Result<SessionUpdate> {
        let mut store = self.lock()?;
        let mut session = load_session(&*store, session_id)?;
        session.ensure_active("update pressure")?;

        let curve = store
            .get_curve(session.curve_id)?
            .ok_or_else(|| CoreError::curve_not_found(session.curve_id))?;
        let completed = match session.apply_pressure(&curve, pressure, now)? {
            Some(mut record) => {
                record.id = Some(store.complete_session(&session, &record)?);
                info!(
                    session_id,
                    operator_id = session.operator_id,
                    duration = record.duration,
                    final_pressure = record.final_pressure,
                    "session completed"
                );
                Some(record)
            }
            None => {
                store.update_session(&session)?;
                debug!(
                    session_id,
                    pressure,
                    estimated_time = session.estimated_time,
                    "pressure updated"
                );
                None
            }
        };
        Ok(SessionUpdate { session, completed })
    }

    /// Edit location/remarks. State and estimate are untouched.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidState`] for a completed session.
    pub fn update_metadata(
        &self,
        session_id: SessionId,
        patch: &MetadataPatch,
    ) -> Result<ActiveSession> {
        let mut store = self.lock()?;
        let mut session = load_session(&*store, session_id)?;
        session.apply_metadata(patch)?;
        if !patch.is_empty() {
            store.update_session(&session)?;
        }
        Ok(session)
    }

    pub fn get_session(&self, session_id: SessionId) -> Result<ActiveSession> {
        self.with_store(|store| load_session(store, session_id))
    }

    pub fn list_sessions(&self, active_only: bool) -> Result<Vec<ActiveSession>> {
        self.with_store(|store| store.list_sessions(active_only))
    }

    // === History ===

    /// Archive records, newest first when filtered by operator.
    pub fn history(&self, operator_id: Option<OperatorId>) -> Result<Vec<HistoricalRecord>> {
        self.with_store(|store| match operator_id {
            Some(id) => {
                load_operator(store, id)?;
                store.history_for(id)
            }
            None => store.list_records(),
        })
    }

    /// Import an archive record produced outside the session lifecycle.
    ///
    /// # Errors
    /// Returns a validation error for a negative duration and
    /// [`CoreError::NotFound`] for an unknown operator.
    pub fn record_history(&self, mut record: HistoricalRecord) -> Result<HistoricalRecord> {
        if record.duration < 0 {
            return Err(ValidationError::InvalidValue {
                field: "duration".to_string(),
                message: format!("{} is negative", record.duration),
            }
            .into());
        }
        let mut store = self.lock()?;
        load_operator(&*store, record.operator_id)?;
        record.id = Some(store.insert_record(&record)?);
        Ok(record)
    }
}

fn load_operator<S: Store + ?Sized>(store: &S, id: OperatorId) -> Result<Operator> {
    store
        .get_operator(id)?
        .ok_or_else(|| CoreError::operator_not_found(id))
}

fn load_session<S: Store + ?Sized>(store: &S, id: SessionId) -> Result<ActiveSession> {
    store
        .get_session(id)?
        .ok_or_else(|| CoreError::session_not_found(id))
}
