//! Database schema migrations for airtime.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: operators, curves, sessions and the archive.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS operators (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            badge_number    TEXT NOT NULL UNIQUE,
            first_name      TEXT NOT NULL,
            last_name       TEXT NOT NULL,
            active          INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL,
            custom_curve_id INTEGER REFERENCES calibration_curves(id)
        );

        CREATE TABLE IF NOT EXISTS calibration_curves (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT NOT NULL,
            description  TEXT NOT NULL DEFAULT '',
            slope        REAL NOT NULL,
            intercept    REAL NOT NULL,
            max_pressure INTEGER NOT NULL DEFAULT 300,
            min_pressure INTEGER NOT NULL DEFAULT 150,
            is_default   INTEGER NOT NULL DEFAULT 0,
            operator_id  INTEGER REFERENCES operators(id)
        );

        CREATE TABLE IF NOT EXISTS active_sessions (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            operator_id      INTEGER NOT NULL REFERENCES operators(id),
            curve_id         INTEGER NOT NULL REFERENCES calibration_curves(id),
            initial_pressure INTEGER NOT NULL,
            current_pressure INTEGER NOT NULL,
            entry_time       TEXT NOT NULL,
            updated_time     TEXT NOT NULL,
            estimated_time   INTEGER NOT NULL,
            active           INTEGER NOT NULL DEFAULT 1,
            location         TEXT NOT NULL DEFAULT '',
            remarks          TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS historical_records (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            operator_id      INTEGER NOT NULL REFERENCES operators(id),
            curve_id         INTEGER NOT NULL REFERENCES calibration_curves(id),
            session_date     TEXT NOT NULL,
            initial_pressure INTEGER NOT NULL,
            final_pressure   INTEGER NOT NULL,
            duration         INTEGER NOT NULL,
            location         TEXT NOT NULL DEFAULT ''
        );",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: lookup indexes and curve uniqueness.
///
/// - at most one row with `is_default = 1`
/// - at most one personalized row per operator
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_curves_single_default
            ON calibration_curves(is_default) WHERE is_default = 1;
         CREATE UNIQUE INDEX IF NOT EXISTS idx_curves_one_per_operator
            ON calibration_curves(operator_id) WHERE is_default = 0;
         CREATE INDEX IF NOT EXISTS idx_sessions_operator_active
            ON active_sessions(operator_id, active);
         CREATE INDEX IF NOT EXISTS idx_records_operator_date
            ON historical_records(operator_id, session_date);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i32>(0),
        )
        .unwrap()
            > 0
    }

    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        for table in [
            "operators",
            "calibration_curves",
            "active_sessions",
            "historical_records",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn test_incremental_migration() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 1);

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 2);
    }

    #[test]
    fn test_second_default_curve_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let insert = "INSERT INTO calibration_curves (name, slope, intercept, is_default)
                      VALUES ('std', 0.14, -4.0, 1)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }

    #[test]
    fn test_second_personalized_curve_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO operators (badge_number, first_name, last_name, created_at)
             VALUES ('FF001', 'A', 'B', '2024-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();

        let insert = "INSERT INTO calibration_curves
                        (name, slope, intercept, is_default, operator_id)
                      VALUES ('custom', 0.15, -4.0, 0, 1)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
