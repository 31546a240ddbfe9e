//! In-memory store.
//!
//! Same contract as the SQLite [`Database`](super::Database): composite writes
//! check every id they touch before changing anything, so a failed call leaves
//! the store as it was.

use std::collections::BTreeMap;

use super::{CurveWrite, RefreshWrite, Store};
use crate::curve::{CalibrationCurve, CurveId};
use crate::error::{CoreError, Result};
use crate::operator::{Operator, OperatorId};
use crate::session::{ActiveSession, HistoricalRecord, RecordId, SessionId};

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    operators: BTreeMap<OperatorId, Operator>,
    curves: BTreeMap<CurveId, CalibrationCurve>,
    sessions: BTreeMap<SessionId, ActiveSession>,
    records: BTreeMap<RecordId, HistoricalRecord>,
    last_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn require_operator(&self, id: OperatorId) -> Result<&Operator> {
        self.operators
            .get(&id)
            .ok_or_else(|| CoreError::operator_not_found(id))
    }

    fn require_curve(&self, id: CurveId) -> Result<&CalibrationCurve> {
        self.curves
            .get(&id)
            .ok_or_else(|| CoreError::curve_not_found(id))
    }

    fn check_session_write(&self, session: &ActiveSession) -> Result<SessionId> {
        let id = session
            .id
            .ok_or_else(|| CoreError::Integrity("session has not been persisted".into()))?;
        match self.sessions.get(&id) {
            None => return Err(CoreError::session_not_found(id)),
            Some(stored) if !stored.active => return Err(CoreError::session_completed(id)),
            Some(_) => {}
        }
        self.require_curve(session.curve_id)?;
        Ok(id)
    }

    fn check_record(&self, record: &HistoricalRecord) -> Result<()> {
        self.require_operator(record.operator_id)?;
        self.require_curve(record.curve_id)?;
        Ok(())
    }
}

impl Store for MemoryStore {
    // === Operators ===

    fn insert_operator(&mut self, operator: &Operator) -> Result<OperatorId> {
        if self
            .operators
            .values()
            .any(|o| o.badge_number == operator.badge_number)
        {
            return Err(CoreError::Integrity(format!(
                "badge number {} already registered",
                operator.badge_number
            )));
        }
        let id = self.next_id();
        let mut stored = operator.clone();
        stored.id = Some(id);
        self.operators.insert(id, stored);
        Ok(id)
    }

    fn get_operator(&self, id: OperatorId) -> Result<Option<Operator>> {
        Ok(self.operators.get(&id).cloned())
    }

    fn list_operators(&self, active_only: bool) -> Result<Vec<Operator>> {
        Ok(self
            .operators
            .values()
            .filter(|o| !active_only || o.active)
            .cloned()
            .collect())
    }

    fn set_operator_active(&mut self, id: OperatorId, active: bool) -> Result<()> {
        let operator = self
            .operators
            .get_mut(&id)
            .ok_or_else(|| CoreError::operator_not_found(id))?;
        operator.active = active;
        Ok(())
    }

    // === Calibration curves ===

    fn insert_curve(&mut self, curve: &CalibrationCurve) -> Result<CurveId> {
        if curve.is_default && self.curves.values().any(|c| c.is_default) {
            return Err(CoreError::Integrity("a default curve already exists".into()));
        }
        if let Some(owner) = curve.operator_id.filter(|_| !curve.is_default) {
            self.require_operator(owner)?;
            if self.personalized_curve(owner)?.is_some() {
                return Err(CoreError::Integrity(format!(
                    "operator {owner} already has a personalized curve"
                )));
            }
        }
        let id = self.next_id();
        let mut stored = curve.clone();
        stored.id = Some(id);
        self.curves.insert(id, stored);
        Ok(id)
    }

    fn get_curve(&self, id: CurveId) -> Result<Option<CalibrationCurve>> {
        Ok(self.curves.get(&id).cloned())
    }

    fn default_curves(&self) -> Result<Vec<CalibrationCurve>> {
        Ok(self.curves.values().filter(|c| c.is_default).cloned().collect())
    }

    fn personalized_curve(&self, operator_id: OperatorId) -> Result<Option<CalibrationCurve>> {
        Ok(self
            .curves
            .values()
            .find(|c| !c.is_default && c.operator_id == Some(operator_id))
            .cloned())
    }

    fn list_curves(&self) -> Result<Vec<CalibrationCurve>> {
        Ok(self.curves.values().cloned().collect())
    }

    // === Active sessions ===

    fn insert_session(&mut self, session: &ActiveSession) -> Result<SessionId> {
        self.require_operator(session.operator_id)?;
        self.require_curve(session.curve_id)?;
        let id = self.next_id();
        let mut stored = session.clone();
        stored.id = Some(id);
        self.sessions.insert(id, stored);
        Ok(id)
    }

    fn get_session(&self, id: SessionId) -> Result<Option<ActiveSession>> {
        Ok(self.sessions.get(&id).cloned())
    }

    fn update_session(&mut self, session: &ActiveSession) -> Result<()> {
        let id = self.check_session_write(session)?;
        self.sessions.insert(id, session.clone());
        Ok(())
    }

    fn list_sessions(&self, active_only: bool) -> Result<Vec<ActiveSession>> {
        Ok(self
            .sessions
            .values()
            .filter(|s| !active_only || s.active)
            .cloned()
            .collect())
    }

    fn active_sessions_for(&self, operator_id: OperatorId) -> Result<Vec<ActiveSession>> {
        Ok(self
            .sessions
            .values()
            .filter(|s| s.active && s.operator_id == operator_id)
            .cloned()
            .collect())
    }

    // === Historical records ===

    fn insert_record(&mut self, record: &HistoricalRecord) -> Result<RecordId> {
        self.check_record(record)?;
        let id = self.next_id();
        let mut stored = record.clone();
        stored.id = Some(id);
        self.records.insert(id, stored);
        Ok(id)
    }

    fn history_for(&self, operator_id: OperatorId) -> Result<Vec<HistoricalRecord>> {
        let mut history: Vec<_> = self
            .records
            .values()
            .filter(|r| r.operator_id == operator_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.session_date.cmp(&a.session_date).then(b.id.cmp(&a.id)));
        Ok(history)
    }

    fn list_records(&self) -> Result<Vec<HistoricalRecord>> {
        Ok(self.records.values().cloned().collect())
    }

    // === Composite writes ===

    fn complete_session(
        &mut self,
        session: &ActiveSession,
        record: &HistoricalRecord,
    ) -> Result<RecordId> {
        let session_id = self.check_session_write(session)?;
        self.check_record(record)?;

        self.sessions.insert(session_id, session.clone());
        self.insert_record(record)
    }

    fn commit_refresh(&mut self, write: &RefreshWrite) -> Result<CurveId> {
        self.require_operator(write.operator_id)?;
        match &write.curve {
            CurveWrite::Update { curve_id, .. } => {
                let curve = self.require_curve(*curve_id)?;
                if curve.is_default || curve.operator_id != Some(write.operator_id) {
                    return Err(CoreError::Integrity(format!(
                        "curve {curve_id} is not owned by operator {}",
                        write.operator_id
                    )));
                }
            }
            CurveWrite::Insert(curve) => {
                if curve.is_default || curve.operator_id != Some(write.operator_id) {
                    return Err(CoreError::Integrity(
                        "refresh may only insert the operator's own personalized curve".into(),
                    ));
                }
                if self.personalized_curve(write.operator_id)?.is_some() {
                    return Err(CoreError::Integrity(format!(
                        "operator {} already has a personalized curve",
                        write.operator_id
                    )));
                }
            }
        }
        for estimate in &write.sessions {
            match self.sessions.get(&estimate.session_id) {
                Some(s) if s.active && s.operator_id == write.operator_id => {}
                _ => return Err(CoreError::session_not_found(estimate.session_id)),
            }
        }

        let curve_id = match &write.curve {
            CurveWrite::Update {
                curve_id,
                slope,
                intercept,
                description,
            } => {
                if let Some(curve) = self.curves.get_mut(curve_id) {
                    curve.slope = *slope;
                    curve.intercept = *intercept;
                    curve.description = description.clone();
                }
                *curve_id
            }
            CurveWrite::Insert(curve) => self.insert_curve(curve)?,
        };
        if let Some(operator) = self.operators.get_mut(&write.operator_id) {
            operator.custom_curve_id = Some(curve_id);
        }
        for estimate in &write.sessions {
            if let Some(session) = self.sessions.get_mut(&estimate.session_id) {
                session.curve_id = curve_id;
                session.estimated_time = estimate.estimated_time;
            }
        }
        Ok(curve_id)
    }
}
