use crate::error::ReportResult;
use duckdb::{Connection, OptionalExt};
use serde::Serialize;

/// An owning organization (publisher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Organization {
    pub name: String,
    pub title: String,
}

/// A content record (dataset) addressed as `/dataset/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    pub name: String,
    pub title: String,
    pub owner_org: Option<String>,
}

/// Identifier-to-entity resolution for organizations and content records.
///
/// Absence is `Ok(None)`, never an error.
pub trait EntityLookup {
    fn organization(&self, name: &str) -> ReportResult<Option<Organization>>;
    fn dataset(&self, name: &str) -> ReportResult<Option<Dataset>>;
}

/// Lookup backed by the catalog mirror tables.
pub struct DuckDbLookup<'a> {
    conn: &'a Connection,
}

impl<'a> DuckDbLookup<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl EntityLookup for DuckDbLookup<'_> {
    fn organization(&self, name: &str) -> ReportResult<Option<Organization>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT name, title FROM organizations WHERE name = ?")?;
        let org = stmt
            .query_row([name], |row| {
                Ok(Organization {
                    name: row.get(0)?,
                    title: row.get(1)?,
                })
            })
            .optional()?;
        Ok(org)
    }

    fn dataset(&self, name: &str) -> ReportResult<Option<Dataset>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT name, title, owner_org FROM datasets WHERE name = ?")?;
        let dataset = stmt
            .query_row([name], |row| {
                Ok(Dataset {
                    name: row.get(0)?,
                    title: row.get(1)?,
                    owner_org: row.get(2)?,
                })
            })
            .optional()?;
        if dataset.is_none() {
            tracing::debug!(dataset = name, "Dataset referenced by analytics not found in catalog");
        }
        Ok(dataset)
    }
}
