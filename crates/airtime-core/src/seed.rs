//! Synthetic history for demos and development databases.
//!
//! Each generated operator follows a consumption profile: a duration
//! multiplier against the reference chart plus a uniform relative jitter.
//! With a fixed seed the generated data is reproducible.

use chrono::{DateTime, Duration, Utc};
use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::Engine;
use crate::error::{CoreError, Result};
use crate::operator::OperatorId;
use crate::session::{HistoricalRecord, SessionId};
use crate::storage::Store;

/// Consumption profile of a generated operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Profile {
    pub label: &'static str,
    /// Scales the charted duration (1.11 = lasts 11% longer)
    pub multiplier: f64,
    /// Half-width of the uniform jitter, relative to the scaled duration
    pub variation: f64,
}

pub const PROFILES: [Profile; 5] = [
    Profile {
        label: "high",
        multiplier: 1.11,
        variation: 0.05,
    },
    Profile {
        label: "average",
        multiplier: 1.0,
        variation: 0.05,
    },
    Profile {
        label: "low",
        multiplier: 0.89,
        variation: 0.05,
    },
    Profile {
        label: "inconsistent",
        multiplier: 1.05,
        variation: 0.15,
    },
    Profile {
        label: "consistent",
        multiplier: 0.95,
        variation: 0.03,
    },
];

const MIN_DURATION: i64 = 15;
const SESSION_SPACING_DAYS: i64 = 3;
const ACTIVE_SESSIONS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedOptions {
    /// `None` seeds from entropy
    pub seed: Option<u64>,
    pub operators: usize,
    pub sessions_per_operator: usize,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            seed: None,
            operators: PROFILES.len(),
            sessions_per_operator: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedSummary {
    pub operators: Vec<OperatorId>,
    pub records: usize,
    pub active_sessions: Vec<SessionId>,
}

/// Register operators `FF001..`, archive their synthetic history and open
/// two live sessions.
///
/// # Errors
/// Fails on the first store error, e.g. a badge number that already exists.
pub fn populate<S: Store>(engine: &Engine<S>, options: &SeedOptions) -> Result<SeedSummary> {
    populate_at(engine, options, Utc::now())
}

pub fn populate_at<S: Store>(
    engine: &Engine<S>,
    options: &SeedOptions,
    now: DateTime<Utc>,
) -> Result<SeedSummary> {
    let mut rng = match options.seed {
        Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
        None => Mcg128Xsl64::from_entropy(),
    };
    let default_curve_id = engine
        .default_curve()
        .id
        .ok_or_else(|| CoreError::Integrity("default curve has no id".into()))?;
    let chart = engine.fitter().reference().points().to_vec();

    let mut summary = SeedSummary {
        operators: Vec::with_capacity(options.operators),
        records: 0,
        active_sessions: Vec::new(),
    };

    for index in 0..options.operators {
        let n = index + 1;
        let operator = engine.register_operator(
            &format!("FF{n:03}"),
            &format!("Test{n}"),
            &format!("Firefighter{n}"),
        )?;
        let operator_id = operator
            .id
            .ok_or_else(|| CoreError::Integrity("operator has no id".into()))?;
        let profile = PROFILES[index % PROFILES.len()];

        for i in 0..options.sessions_per_operator {
            let Some(&(initial_pressure, charted)) = chart.choose(&mut rng) else {
                break;
            };
            let final_pressure = (initial_pressure - rng.gen_range(100..=140)).max(150);
            let expected = charted * profile.multiplier;
            let spread = expected * profile.variation;
            let duration = ((expected + rng.gen_range(-spread..=spread)) as i64).max(MIN_DURATION);

            engine.record_history(HistoricalRecord {
                id: None,
                operator_id,
                curve_id: default_curve_id,
                session_date: now - Duration::days(i as i64 * SESSION_SPACING_DAYS),
                initial_pressure,
                final_pressure,
                duration,
                location: format!("Training Area {}", rng.gen_range(1..=5)),
            })?;
            summary.records += 1;
        }
        summary.operators.push(operator_id);
    }

    for &operator_id in summary.operators.iter().take(ACTIVE_SESSIONS) {
        let session = engine.create_session_at(
            operator_id,
            290,
            "Active Incident",
            None,
            now - Duration::minutes(15),
        )?;
        let session_id = session
            .id
            .ok_or_else(|| CoreError::Integrity("session has no id".into()))?;
        engine.update_pressure_at(session_id, 260, now)?;
        summary.active_sessions.push(session_id);
    }

    info!(
        operators = summary.operators.len(),
        records = summary.records,
        sessions = summary.active_sessions.len(),
        "seeded synthetic history"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, ModelConfig};

    fn engine() -> Engine<MemoryStore> {
        Engine::new(MemoryStore::new(), &ModelConfig::default()).unwrap()
    }

    fn options(seed: u64) -> SeedOptions {
        SeedOptions {
            seed: Some(seed),
            ..SeedOptions::default()
        }
    }

    #[test]
    fn populates_default_shape() {
        let engine = engine();
        let summary = populate(&engine, &options(7)).unwrap();
        assert_eq!(summary.operators.len(), 5);
        assert_eq!(summary.records, 50);
        assert_eq!(summary.active_sessions.len(), 2);

        let badges: Vec<_> = engine
            .list_operators(false)
            .unwrap()
            .into_iter()
            .map(|o| o.badge_number)
            .collect();
        assert_eq!(badges, ["FF001", "FF002", "FF003", "FF004", "FF005"]);

        for record in engine.history(None).unwrap() {
            assert!(record.duration >= MIN_DURATION);
            assert!(record.final_pressure >= 150);
            assert!(record.final_pressure <= record.initial_pressure);
        }
        for id in summary.active_sessions {
            let session = engine.get_session(id).unwrap();
            assert!(session.active);
            assert_eq!(session.current_pressure, 260);
            assert_eq!(session.estimated_time, 32);
        }
    }

    #[test]
    fn same_seed_same_history() {
        let now = Utc::now();
        let a = engine();
        let b = engine();
        populate_at(&a, &options(42), now).unwrap();
        populate_at(&b, &options(42), now).unwrap();

        let durations = |e: &Engine<MemoryStore>| -> Vec<(i32, i64)> {
            e.history(None)
                .unwrap()
                .into_iter()
                .map(|r| (r.initial_pressure, r.duration))
                .collect()
        };
        assert_eq!(durations(&a), durations(&b));
    }

    #[test]
    fn seeded_history_personalizes_every_operator() {
        let engine = engine();
        populate(&engine, &options(3)).unwrap();
        let report = engine.run_refresh_cycle().unwrap();
        assert_eq!(report.outcomes.len(), 5);
        assert!(report
            .outcomes
            .values()
            .all(|o| matches!(o, crate::engine::RefreshOutcome::Created { .. })));
        assert_eq!(report.sessions_reestimated, 2);
    }

    #[test]
    fn reseeding_the_same_store_fails_on_badges() {
        let engine = engine();
        populate(&engine, &options(1)).unwrap();
        assert!(populate(&engine, &options(1)).is_err());
    }
}
