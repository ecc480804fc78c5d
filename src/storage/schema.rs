use duckdb::Connection;

/// Keyed statistics: one fact per (period, category, key). Values are stored
/// as text exactly as the collector wrote them.
pub const CREATE_GA_STAT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ga_stat (
    period_name     VARCHAR NOT NULL,
    stat_name       VARCHAR NOT NULL,
    "key"           VARCHAR NOT NULL,
    "value"         VARCHAR NOT NULL
)
"#;

/// Per-URL traffic: one fact per (period, url).
pub const CREATE_GA_URL_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS ga_url (
    period_name     VARCHAR NOT NULL,
    url             VARCHAR NOT NULL,
    department_id   VARCHAR NOT NULL DEFAULT '',
    pageviews       VARCHAR NOT NULL,
    visitors        VARCHAR NOT NULL
)
";

/// Mirror of the organization catalog, keyed by the name used in
/// `department_id` and `/publisher/<name>`.
pub const CREATE_ORGANIZATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS organizations (
    name            VARCHAR PRIMARY KEY,
    title           VARCHAR NOT NULL
)
";

/// Mirror of the content-record catalog, keyed by the `/dataset/<name>` segment.
pub const CREATE_DATASETS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS datasets (
    name            VARCHAR PRIMARY KEY,
    title           VARCHAR NOT NULL,
    owner_org       VARCHAR
)
";

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<(), duckdb::Error> {
    conn.execute_batch(CREATE_GA_STAT_TABLE)?;
    conn.execute_batch(CREATE_GA_URL_TABLE)?;
    conn.execute_batch(CREATE_ORGANIZATIONS_TABLE)?;
    conn.execute_batch(CREATE_DATASETS_TABLE)?;
    Ok(())
}
