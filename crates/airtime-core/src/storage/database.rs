//! SQLite-backed store.
//!
//! Provides persistent storage for:
//! - Operators and their personalized curve links
//! - Calibration curves (one default, at most one per operator)
//! - Active sessions
//! - Historical session records

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{migrations, CurveWrite, RefreshWrite, Store};
use crate::curve::{CalibrationCurve, CurveId};
use crate::error::{CoreError, DatabaseError, Result};
use crate::operator::{Operator, OperatorId};
use crate::session::{ActiveSession, HistoricalRecord, RecordId, SessionId};

const OPERATOR_COLUMNS: &str =
    "id, badge_number, first_name, last_name, active, created_at, custom_curve_id";
const CURVE_COLUMNS: &str =
    "id, name, description, slope, intercept, max_pressure, min_pressure, is_default, operator_id";
const SESSION_COLUMNS: &str = "id, operator_id, curve_id, initial_pressure, current_pressure, \
     entry_time, updated_time, estimated_time, active, location, remarks";
const RECORD_COLUMNS: &str = "id, operator_id, curve_id, session_date, initial_pressure, \
     final_pressure, duration, location";

fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_operator(row: &Row) -> rusqlite::Result<Operator> {
    Ok(Operator {
        id: Some(row.get(0)?),
        badge_number: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        active: row.get(4)?,
        created_at: parse_time(row, 5)?,
        custom_curve_id: row.get(6)?,
    })
}

fn row_to_curve(row: &Row) -> rusqlite::Result<CalibrationCurve> {
    Ok(CalibrationCurve {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        slope: row.get(3)?,
        intercept: row.get(4)?,
        max_pressure: row.get(5)?,
        min_pressure: row.get(6)?,
        is_default: row.get(7)?,
        operator_id: row.get(8)?,
    })
}

fn row_to_session(row: &Row) -> rusqlite::Result<ActiveSession> {
    Ok(ActiveSession {
        id: Some(row.get(0)?),
        operator_id: row.get(1)?,
        curve_id: row.get(2)?,
        initial_pressure: row.get(3)?,
        current_pressure: row.get(4)?,
        entry_time: parse_time(row, 5)?,
        updated_time: parse_time(row, 6)?,
        estimated_time: row.get(7)?,
        active: row.get(8)?,
        location: row.get(9)?,
        remarks: row.get(10)?,
    })
}

fn row_to_record(row: &Row) -> rusqlite::Result<HistoricalRecord> {
    Ok(HistoricalRecord {
        id: Some(row.get(0)?),
        operator_id: row.get(1)?,
        curve_id: row.get(2)?,
        session_date: parse_time(row, 3)?,
        initial_pressure: row.get(4)?,
        final_pressure: row.get(5)?,
        duration: row.get(6)?,
        location: row.get(7)?,
    })
}

fn require_id(id: Option<i64>, entity: &'static str) -> Result<i64> {
    id.ok_or_else(|| CoreError::Integrity(format!("{entity} has not been persisted")))
}

/// SQLite database implementing [`Store`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open (creating if needed) the database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Run `f` inside `BEGIN IMMEDIATE`, rolling back on any error.
    fn in_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        match f(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    fn query_all<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&Row) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn write_session(conn: &Connection, session: &ActiveSession) -> Result<()> {
        let id = require_id(session.id, "session")?;
        let changed = conn.execute(
            "UPDATE active_sessions
             SET curve_id = ?2, current_pressure = ?3, updated_time = ?4,
                 estimated_time = ?5, active = ?6, location = ?7, remarks = ?8
             WHERE id = ?1 AND active = 1",
            params![
                id,
                session.curve_id,
                session.current_pressure,
                format_time(session.updated_time),
                session.estimated_time,
                session.active,
                session.location,
                session.remarks,
            ],
        )?;
        if changed == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM active_sessions WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                CoreError::session_completed(id)
            } else {
                CoreError::session_not_found(id)
            });
        }
        Ok(())
    }

    fn write_record(conn: &Connection, record: &HistoricalRecord) -> Result<RecordId> {
        conn.execute(
            "INSERT INTO historical_records
                (operator_id, curve_id, session_date, initial_pressure,
                 final_pressure, duration, location)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.operator_id,
                record.curve_id,
                format_time(record.session_date),
                record.initial_pressure,
                record.final_pressure,
                record.duration,
                record.location,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn write_curve(conn: &Connection, curve: &CalibrationCurve) -> Result<CurveId> {
        conn.execute(
            "INSERT INTO calibration_curves
                (name, description, slope, intercept, max_pressure, min_pressure,
                 is_default, operator_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                curve.name,
                curve.description,
                curve.slope,
                curve.intercept,
                curve.max_pressure,
                curve.min_pressure,
                curve.is_default,
                curve.operator_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl Store for Database {
    // === Operators ===

    fn insert_operator(&mut self, operator: &Operator) -> Result<OperatorId> {
        self.conn.execute(
            "INSERT INTO operators
                (badge_number, first_name, last_name, active, created_at, custom_curve_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                operator.badge_number,
                operator.first_name,
                operator.last_name,
                operator.active,
                format_time(operator.created_at),
                operator.custom_curve_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_operator(&self, id: OperatorId) -> Result<Option<Operator>> {
        let sql = format!("SELECT {OPERATOR_COLUMNS} FROM operators WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_operator)
            .optional()?)
    }

    fn list_operators(&self, active_only: bool) -> Result<Vec<Operator>> {
        let sql = format!(
            "SELECT {OPERATOR_COLUMNS} FROM operators WHERE (?1 = 0 OR active = 1) ORDER BY id"
        );
        self.query_all(&sql, params![active_only], row_to_operator)
    }

    fn set_operator_active(&mut self, id: OperatorId, active: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE operators SET active = ?2 WHERE id = ?1",
            params![id, active],
        )?;
        if changed == 0 {
            return Err(CoreError::operator_not_found(id));
        }
        Ok(())
    }

    // === Calibration curves ===

    fn insert_curve(&mut self, curve: &CalibrationCurve) -> Result<CurveId> {
        Self::write_curve(&self.conn, curve)
    }

    fn get_curve(&self, id: CurveId) -> Result<Option<CalibrationCurve>> {
        let sql = format!("SELECT {CURVE_COLUMNS} FROM calibration_curves WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_curve)
            .optional()?)
    }

    fn default_curves(&self) -> Result<Vec<CalibrationCurve>> {
        let sql = format!(
            "SELECT {CURVE_COLUMNS} FROM calibration_curves WHERE is_default = 1 ORDER BY id"
        );
        self.query_all(&sql, [], row_to_curve)
    }

    fn personalized_curve(&self, operator_id: OperatorId) -> Result<Option<CalibrationCurve>> {
        let sql = format!(
            "SELECT {CURVE_COLUMNS} FROM calibration_curves
             WHERE operator_id = ?1 AND is_default = 0"
        );
        Ok(self
            .conn
            .query_row(&sql, params![operator_id], row_to_curve)
            .optional()?)
    }

    fn list_curves(&self) -> Result<Vec<CalibrationCurve>> {
        let sql = format!("SELECT {CURVE_COLUMNS} FROM calibration_curves ORDER BY id");
        self.query_all(&sql, [], row_to_curve)
    }

    // === Active sessions ===

    fn insert_session(&mut self, session: &ActiveSession) -> Result<SessionId> {
        self.conn.execute(
            "INSERT INTO active_sessions
                (operator_id, curve_id, initial_pressure, current_pressure, entry_time,
                 updated_time, estimated_time, active, location, remarks)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session.operator_id,
                session.curve_id,
                session.initial_pressure,
                session.current_pressure,
                format_time(session.entry_time),
                format_time(session.updated_time),
                session.estimated_time,
                session.active,
                session.location,
                session.remarks,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_session(&self, id: SessionId) -> Result<Option<ActiveSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM active_sessions WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_session)
            .optional()?)
    }

    fn update_session(&mut self, session: &ActiveSession) -> Result<()> {
        Self::write_session(&self.conn, session)
    }

    fn list_sessions(&self, active_only: bool) -> Result<Vec<ActiveSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM active_sessions WHERE (?1 = 0 OR active = 1) ORDER BY id"
        );
        self.query_all(&sql, params![active_only], row_to_session)
    }

    fn active_sessions_for(&self, operator_id: OperatorId) -> Result<Vec<ActiveSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM active_sessions
             WHERE operator_id = ?1 AND active = 1 ORDER BY id"
        );
        self.query_all(&sql, params![operator_id], row_to_session)
    }

    // === Historical records ===

    fn insert_record(&mut self, record: &HistoricalRecord) -> Result<RecordId> {
        Self::write_record(&self.conn, record)
    }

    fn history_for(&self, operator_id: OperatorId) -> Result<Vec<HistoricalRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM historical_records
             WHERE operator_id = ?1 ORDER BY session_date DESC, id DESC"
        );
        self.query_all(&sql, params![operator_id], row_to_record)
    }

    fn list_records(&self) -> Result<Vec<HistoricalRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM historical_records ORDER BY id");
        self.query_all(&sql, [], row_to_record)
    }

    // === Composite writes ===

    fn complete_session(
        &mut self,
        session: &ActiveSession,
        record: &HistoricalRecord,
    ) -> Result<RecordId> {
        self.in_transaction(|conn| {
            Self::write_session(conn, session)?;
            Self::write_record(conn, record)
        })
    }

    fn commit_refresh(&mut self, write: &RefreshWrite) -> Result<CurveId> {
        self.in_transaction(|conn| {
            let curve_id = match &write.curve {
                CurveWrite::Update {
                    curve_id,
                    slope,
                    intercept,
                    description,
                } => {
                    let changed = conn.execute(
                        "UPDATE calibration_curves
                         SET slope = ?2, intercept = ?3, description = ?4
                         WHERE id = ?1 AND operator_id = ?5 AND is_default = 0",
                        params![curve_id, slope, intercept, description, write.operator_id],
                    )?;
                    if changed == 0 {
                        return Err(CoreError::curve_not_found(*curve_id));
                    }
                    *curve_id
                }
                CurveWrite::Insert(curve) => Self::write_curve(conn, curve)?,
            };

            let linked = conn.execute(
                "UPDATE operators SET custom_curve_id = ?2 WHERE id = ?1",
                params![write.operator_id, curve_id],
            )?;
            if linked == 0 {
                return Err(CoreError::operator_not_found(write.operator_id));
            }

            for estimate in &write.sessions {
                let changed = conn.execute(
                    "UPDATE active_sessions SET curve_id = ?2, estimated_time = ?3
                     WHERE id = ?1 AND operator_id = ?4 AND active = 1",
                    params![
                        estimate.session_id,
                        curve_id,
                        estimate.estimated_time,
                        write.operator_id
                    ],
                )?;
                if changed == 0 {
                    return Err(CoreError::session_not_found(estimate.session_id));
                }
            }
            Ok(curve_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SessionEstimate;
    use chrono::Duration;

    fn seeded() -> (Database, OperatorId, CurveId) {
        let mut db = Database::open_memory().unwrap();
        let op = db
            .insert_operator(&Operator::new("FF001", "Test1", "Firefighter1", Utc::now()))
            .unwrap();
        let curve = db.insert_curve(&CalibrationCurve::standard()).unwrap();
        (db, op, curve)
    }

    fn fixed_time() -> DateTime<Utc> {
        "2024-05-01T10:00:00.250Z".parse().unwrap()
    }

    fn session(op: OperatorId, curve: CurveId) -> ActiveSession {
        ActiveSession::start(
            op,
            curve,
            &CalibrationCurve::standard(),
            290,
            "Active Incident",
            "",
            fixed_time(),
        )
    }

    #[test]
    fn operator_roundtrip_and_deactivate() {
        let (mut db, op, _) = seeded();
        let loaded = db.get_operator(op).unwrap().unwrap();
        assert_eq!(loaded.badge_number, "FF001");
        assert!(loaded.active);

        db.set_operator_active(op, false).unwrap();
        assert!(db.list_operators(true).unwrap().is_empty());
        assert_eq!(db.list_operators(false).unwrap().len(), 1);
        assert!(db.set_operator_active(99, false).is_err());
    }

    #[test]
    fn duplicate_badge_rejected() {
        let (mut db, _, _) = seeded();
        let dup = Operator::new("FF001", "Other", "Person", Utc::now());
        assert!(db.insert_operator(&dup).is_err());
    }

    #[test]
    fn curve_roundtrip_preserves_coefficients() {
        let (db, _, curve_id) = seeded();
        let loaded = db.get_curve(curve_id).unwrap().unwrap();
        let standard = CalibrationCurve::standard();
        assert_eq!(loaded.slope.to_bits(), standard.slope.to_bits());
        assert_eq!(loaded.intercept.to_bits(), standard.intercept.to_bits());
        assert_eq!(db.default_curves().unwrap().len(), 1);
    }

    #[test]
    fn session_roundtrip_preserves_times() {
        let (mut db, op, curve) = seeded();
        let mut s = session(op, curve);
        let id = db.insert_session(&s).unwrap();
        s.id = Some(id);
        let loaded = db.get_session(id).unwrap().unwrap();
        assert_eq!(loaded, s);
    }

    #[test]
    fn complete_session_writes_both_rows() {
        let (mut db, op, curve) = seeded();
        let mut s = session(op, curve);
        s.id = Some(db.insert_session(&s).unwrap());
        let record = s
            .apply_pressure(
                &CalibrationCurve::standard(),
                150,
                s.entry_time + Duration::minutes(20),
            )
            .unwrap()
            .unwrap();

        db.complete_session(&s, &record).unwrap();
        assert!(db.active_sessions_for(op).unwrap().is_empty());
        let history = db.history_for(op).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].duration, 20);
    }

    #[test]
    fn complete_session_rolls_back_on_missing_session() {
        let (mut db, op, curve) = seeded();
        let mut s = session(op, curve);
        s.id = Some(77);
        let record = HistoricalRecord {
            id: None,
            operator_id: op,
            curve_id: curve,
            session_date: s.entry_time,
            initial_pressure: 290,
            final_pressure: 150,
            duration: 20,
            location: String::new(),
        };
        assert!(db.complete_session(&s, &record).is_err());
        assert!(db.list_records().unwrap().is_empty());
    }

    #[test]
    fn commit_refresh_insert_then_update_keeps_id() {
        let (mut db, op, curve) = seeded();
        let mut s = session(op, curve);
        let sid = db.insert_session(&s).unwrap();
        s.id = Some(sid);

        let custom = CalibrationCurve::personalized(
            op,
            "Custom Model - Test1 Firefighter1".into(),
            "first".into(),
            crate::curve::Coefficients {
                slope: 0.15,
                intercept: -4.0,
            },
            150,
            300,
        );
        let created = db
            .commit_refresh(&RefreshWrite {
                operator_id: op,
                curve: CurveWrite::Insert(custom),
                sessions: vec![SessionEstimate {
                    session_id: sid,
                    estimated_time: 40,
                }],
            })
            .unwrap();
        assert_eq!(db.get_operator(op).unwrap().unwrap().custom_curve_id, Some(created));
        let reloaded = db.get_session(sid).unwrap().unwrap();
        assert_eq!((reloaded.curve_id, reloaded.estimated_time), (created, 40));

        let updated = db
            .commit_refresh(&RefreshWrite {
                operator_id: op,
                curve: CurveWrite::Update {
                    curve_id: created,
                    slope: 0.16,
                    intercept: -5.0,
                    description: "second".into(),
                },
                sessions: Vec::new(),
            })
            .unwrap();
        assert_eq!(updated, created);
        let curve = db.personalized_curve(op).unwrap().unwrap();
        assert_eq!(curve.slope, 0.16);
        assert_eq!(curve.description, "second");
        assert_eq!(db.list_curves().unwrap().len(), 2);
    }

    #[test]
    fn commit_refresh_is_all_or_nothing() {
        let (mut db, op, _) = seeded();
        let custom = CalibrationCurve::personalized(
            op,
            "custom".into(),
            String::new(),
            crate::curve::Coefficients {
                slope: 0.15,
                intercept: -4.0,
            },
            150,
            300,
        );
        let result = db.commit_refresh(&RefreshWrite {
            operator_id: op,
            curve: CurveWrite::Insert(custom),
            sessions: vec![SessionEstimate {
                session_id: 404,
                estimated_time: 10,
            }],
        });
        assert!(result.is_err());
        assert!(db.personalized_curve(op).unwrap().is_none());
        assert_eq!(db.get_operator(op).unwrap().unwrap().custom_curve_id, None);
    }

    #[test]
    fn history_is_newest_first() {
        let (mut db, op, curve) = seeded();
        let base = Utc::now();
        for days in [6, 0, 3] {
            db.insert_record(&HistoricalRecord {
                id: None,
                operator_id: op,
                curve_id: curve,
                session_date: base - Duration::days(days),
                initial_pressure: 300,
                final_pressure: 160,
                duration: 30 + days,
                location: String::new(),
            })
            .unwrap();
        }
        let durations: Vec<_> = db.history_for(op).unwrap().iter().map(|r| r.duration).collect();
        assert_eq!(durations, vec![30, 33, 36]);
    }

    #[test]
    fn open_at_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airtime.db");
        {
            let mut db = Database::open_at(&path).unwrap();
            db.insert_operator(&Operator::new("FF009", "A", "B", Utc::now()))
                .unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.list_operators(false).unwrap().len(), 1);
    }

    #[test]
    fn stale_snapshot_cannot_complete_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airtime.db");
        let mut db_a = Database::open_at(&path).unwrap();
        let mut db_b = Database::open_at(&path).unwrap();

        let op = db_a
            .insert_operator(&Operator::new("FF001", "Test1", "Firefighter1", Utc::now()))
            .unwrap();
        let curve = db_a.insert_curve(&CalibrationCurve::standard()).unwrap();
        let sid = db_a.insert_session(&session(op, curve)).unwrap();

        let mut fresh = db_a.get_session(sid).unwrap().unwrap();
        let mut stale = db_b.get_session(sid).unwrap().unwrap();
        let done = fresh.entry_time + Duration::minutes(20);
        let record = fresh
            .apply_pressure(&CalibrationCurve::standard(), 150, done)
            .unwrap()
            .unwrap();
        db_a.complete_session(&fresh, &record).unwrap();

        let mut reading = stale.clone();
        reading
            .apply_pressure(&CalibrationCurve::standard(), 200, done)
            .unwrap();
        let err = db_b.update_session(&reading).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { session_id, .. } if session_id == sid));

        let late = stale
            .apply_pressure(&CalibrationCurve::standard(), 140, done)
            .unwrap()
            .unwrap();
        let err = db_b.complete_session(&stale, &late).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));

        assert_eq!(db_a.list_records().unwrap().len(), 1);
        let stored = db_b.get_session(sid).unwrap().unwrap();
        assert!(!stored.active);
        assert_eq!(stored.current_pressure, 150);
    }
}
