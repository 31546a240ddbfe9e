//! Refresh passes: re-fit personalized curves from accumulated history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{load_operator, Engine};
use crate::curve::CurveId;
use crate::error::{CoreError, Result};
use crate::fitting::FitOutcome;
use crate::operator::{Operator, OperatorId};
use crate::storage::{CurveWrite, RefreshWrite, SessionEstimate, Store};

/// What a refresh did for one operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// First personalized curve inserted and linked.
    Created {
        curve_id: CurveId,
        ratio: f64,
        points: usize,
        sessions: usize,
    },
    /// Existing personalized curve overwritten in place.
    Updated {
        curve_id: CurveId,
        ratio: f64,
        points: usize,
        sessions: usize,
    },
    /// Too little history; nothing was written.
    SkippedInsufficientData { qualifying: usize, required: usize },
    /// The operator failed; nothing was written.
    Error { message: String },
}

impl RefreshOutcome {
    /// Active sessions re-pointed at the new curve.
    pub fn sessions_reestimated(&self) -> usize {
        match self {
            RefreshOutcome::Created { sessions, .. } | RefreshOutcome::Updated { sessions, .. } => {
                *sessions
            }
            _ => 0,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RefreshOutcome::Error { .. })
    }
}

/// Summary of one pass over every active operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: BTreeMap<OperatorId, RefreshOutcome>,
    pub sessions_reestimated: usize,
}

impl RefreshReport {
    pub fn errors(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_error()).count()
    }
}

impl<S: Store> Engine<S> {
    /// Re-fit every active operator.
    ///
    /// Operators are handled one at a time, each under its own lock
    /// acquisition. A failing operator is logged and reported as
    /// [`RefreshOutcome::Error`]; the others are still processed.
    ///
    /// # Errors
    /// Only fails if the operator list itself cannot be read.
    pub fn run_refresh_cycle(&self) -> Result<RefreshReport> {
        let started_at = Utc::now();
        let operators = self.list_operators(true)?;

        let mut outcomes = BTreeMap::new();
        for operator in operators {
            let Some(operator_id) = operator.id else {
                continue;
            };
            let outcome = self
                .lock()
                .and_then(|mut store| self.refresh_operator(&mut *store, &operator))
                .unwrap_or_else(|e| {
                    warn!(operator_id, error = %e, "refresh failed for operator");
                    RefreshOutcome::Error {
                        message: e.to_string(),
                    }
                });
            outcomes.insert(operator_id, outcome);
        }

        let report = RefreshReport {
            started_at,
            sessions_reestimated: outcomes.values().map(RefreshOutcome::sessions_reestimated).sum(),
            outcomes,
        };
        info!(
            operators = report.outcomes.len(),
            sessions = report.sessions_reestimated,
            errors = report.errors(),
            "refresh cycle finished"
        );
        Ok(report)
    }

    /// Refresh a single operator, active or not.
    ///
    /// # Errors
    /// Unlike a full cycle, failures are returned to the caller.
    pub fn analyze_operator(&self, operator_id: OperatorId) -> Result<RefreshOutcome> {
        let mut store = self.lock()?;
        let operator = load_operator(&*store, operator_id)?;
        self.refresh_operator(&mut *store, &operator)
    }

    fn refresh_operator(&self, store: &mut S, operator: &Operator) -> Result<RefreshOutcome> {
        let operator_id = operator
            .id
            .ok_or_else(|| CoreError::Integrity("operator has not been persisted".into()))?;
        let history = store.history_for(operator_id)?;

        let fit = match self.fitter.fit(&history)? {
            FitOutcome::Personalized(fit) => fit,
            FitOutcome::InsufficientData {
                qualifying,
                required,
                ..
            } => {
                debug!(operator_id, qualifying, required, "not enough history to personalize");
                return Ok(RefreshOutcome::SkippedInsufficientData {
                    qualifying,
                    required,
                });
            }
        };

        let (write, curve) = match store.personalized_curve(operator_id)? {
            Some(mut existing) => {
                let curve_id = existing
                    .id
                    .ok_or_else(|| CoreError::Integrity("stored curve has no id".into()))?;
                existing.slope = fit.slope;
                existing.intercept = fit.intercept;
                existing.description = fit.description();
                let write = CurveWrite::Update {
                    curve_id,
                    slope: fit.slope,
                    intercept: fit.intercept,
                    description: existing.description.clone(),
                };
                (write, existing)
            }
            None => {
                let curve = self.fitter.curve_for(operator, &fit).ok_or_else(|| {
                    CoreError::Integrity(format!("cannot build curve for operator {operator_id}"))
                })?;
                (CurveWrite::Insert(curve.clone()), curve)
            }
        };
        let created = matches!(write, CurveWrite::Insert(_));

        let sessions: Vec<SessionEstimate> = store
            .active_sessions_for(operator_id)?
            .iter()
            .filter_map(|s| {
                s.id.map(|session_id| SessionEstimate {
                    session_id,
                    estimated_time: s.estimate_with(&curve),
                })
            })
            .collect();
        let session_count = sessions.len();

        let curve_id = store.commit_refresh(&RefreshWrite {
            operator_id,
            curve: write,
            sessions,
        })?;
        info!(
            operator_id,
            curve_id,
            ratio = fit.ratio,
            points = fit.points,
            sessions = session_count,
            created,
            "personalized curve refreshed"
        );

        Ok(if created {
            RefreshOutcome::Created {
                curve_id,
                ratio: fit.ratio,
                points: fit.points,
                sessions: session_count,
            }
        } else {
            RefreshOutcome::Updated {
                curve_id,
                ratio: fit.ratio,
                points: fit.points,
                sessions: session_count,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::HistoricalRecord;
    use crate::storage::{MemoryStore, ModelConfig};

    fn engine_with_history(durations: &[i64]) -> (Engine<MemoryStore>, OperatorId) {
        let engine = Engine::new(MemoryStore::new(), &ModelConfig::default()).unwrap();
        let op = engine.register_operator("FF001", "Test1", "Firefighter1").unwrap();
        let operator_id = op.id.unwrap();
        for &duration in durations {
            engine
                .record_history(HistoricalRecord {
                    id: None,
                    operator_id,
                    curve_id: engine.default_curve().id.unwrap(),
                    session_date: Utc::now(),
                    initial_pressure: 300,
                    final_pressure: 150,
                    duration,
                    location: "Training Area 1".into(),
                })
                .unwrap();
        }
        (engine, operator_id)
    }

    #[test]
    fn sparse_history_is_skipped_without_writes() {
        let (engine, op) = engine_with_history(&[42, 42, 42]);
        let report = engine.run_refresh_cycle().unwrap();
        assert_eq!(
            report.outcomes[&op],
            RefreshOutcome::SkippedInsufficientData {
                qualifying: 3,
                required: 5
            }
        );
        assert_eq!(engine.list_curves().unwrap().len(), 1);
        assert!(engine.get_operator(op).unwrap().custom_curve_id.is_none());
    }

    #[test]
    fn first_refresh_creates_then_updates() {
        let (engine, op) = engine_with_history(&[42; 5]);
        let first = engine.analyze_operator(op).unwrap();
        let RefreshOutcome::Created { curve_id, points, .. } = first else {
            panic!("expected created, got {first:?}");
        };
        assert_eq!(points, 5);

        let second = engine.analyze_operator(op).unwrap();
        assert!(matches!(second, RefreshOutcome::Updated { curve_id: id, .. } if id == curve_id));
        assert_eq!(engine.get_effective_curve(op).unwrap().evaluate(300), 42);
    }

    #[test]
    fn inactive_operators_are_not_refreshed() {
        let (engine, op) = engine_with_history(&[42; 5]);
        engine.deactivate_operator(op).unwrap();
        let report = engine.run_refresh_cycle().unwrap();
        assert!(report.outcomes.is_empty());
        assert!(engine.analyze_operator(op).is_ok());
    }
}
