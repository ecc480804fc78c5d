use duckdb::Connection;

type Migration = fn(&Connection) -> Result<(), duckdb::Error>;

/// Ordered schema migrations. A database at version `n` has applied every
/// entry with a version `<= n`.
const MIGRATIONS: [(u32, &str, Migration); 2] = [
    (1, "report tables and catalog mirror", migrate_v1),
    (2, "period lookup indexes", migrate_v2),
];

const CURRENT_VERSION: u32 = MIGRATIONS[MIGRATIONS.len() - 1].0;

/// Create the version table if needed and apply every pending migration.
///
/// Table creation is `IF NOT EXISTS`, so a store already populated by the
/// collector keeps its rows.
pub fn run_migrations(conn: &Connection) -> Result<(), duckdb::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL, applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
    )?;

    let current = get_current_version(conn)?;
    tracing::debug!(current, target = CURRENT_VERSION, "Checking schema version");

    for (version, name, migrate) in MIGRATIONS {
        if version <= current {
            continue;
        }
        migrate(conn)?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            [version],
        )?;
        tracing::info!(version, migration = name, "Applied schema migration");
    }

    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<u32, duckdb::Error> {
    let mut stmt = conn.prepare("SELECT COALESCE(MAX(version), 0) FROM schema_version")?;
    stmt.query_row([], |row| row.get(0))
}

fn migrate_v1(conn: &Connection) -> Result<(), duckdb::Error> {
    crate::storage::schema::init_schema(conn)
}

fn migrate_v2(conn: &Connection) -> Result<(), duckdb::Error> {
    // Every report query filters on period; publisher pages also on department
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_ga_stat_category ON ga_stat (stat_name, period_name);
         CREATE INDEX IF NOT EXISTS idx_ga_url_department ON ga_url (department_id, period_name);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied_versions(conn: &Connection) -> Vec<u32> {
        let mut stmt = conn
            .prepare("SELECT version FROM schema_version ORDER BY version")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<u32>, _>>()
            .unwrap()
    }

    #[test]
    fn test_run_migrations_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(get_current_version(&conn).unwrap(), CURRENT_VERSION);
        assert_eq!(applied_versions(&conn), vec![1, 2]);
    }

    #[test]
    fn test_run_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(applied_versions(&conn), vec![1, 2]);
    }

    #[test]
    fn test_resumes_from_partial_version() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER NOT NULL, applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP);
             INSERT INTO schema_version (version) VALUES (1);",
        )
        .unwrap();
        migrate_v1(&conn).unwrap();

        run_migrations(&conn).unwrap();
        assert_eq!(applied_versions(&conn), vec![1, 2]);
    }

    #[test]
    fn test_existing_rows_survive_migration() {
        let conn = Connection::open_in_memory().unwrap();
        crate::storage::schema::init_schema(&conn).unwrap();
        conn.execute(
            r#"INSERT INTO ga_stat (period_name, stat_name, "key", "value") VALUES ('2013-04', 'Totals', 'Bounces', '10')"#,
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let mut stmt = conn.prepare("SELECT COUNT(*) FROM ga_stat").unwrap();
        let count: i64 = stmt.query_row([], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}
