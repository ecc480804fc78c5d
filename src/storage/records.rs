//! Read-only access to the analytics tables.
//!
//! Rows leave the store as raw text and are parsed here, once, into typed
//! records. Aggregation code never sees an unparsed number.

use crate::error::{ReportError, ReportResult};
use crate::query::period::{Period, PeriodFilter};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The two analytics record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Stat,
    Url,
}

impl RecordKind {
    const fn table_name(self) -> &'static str {
        match self {
            Self::Stat => "ga_stat",
            Self::Url => "ga_url",
        }
    }
}

/// A `ga_stat` row exactly as stored. Also the CSV export row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedStatRow {
    #[serde(rename = "Period")]
    pub period_name: String,
    #[serde(rename = "Statistic")]
    pub stat_name: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// A parsed keyed statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedStat {
    pub period: Period,
    pub stat_name: String,
    pub key: String,
    pub value: StatValue,
    /// The value text exactly as stored, for metrics shown without cleaning.
    pub raw_value: String,
}

impl TryFrom<KeyedStatRow> for KeyedStat {
    type Error = ReportError;

    fn try_from(row: KeyedStatRow) -> Result<Self, Self::Error> {
        Ok(Self {
            period: row.period_name.parse()?,
            value: row.value.parse()?,
            raw_value: row.value,
            stat_name: row.stat_name,
            key: row.key,
        })
    }
}

/// A numeric statistic value. Integers are kept exact so that counts sum
/// without float drift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatValue {
    Integer(i64),
    Decimal(f64),
}

impl StatValue {
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(self) -> f64 {
        match self {
            Self::Integer(i) => i as f64,
            Self::Decimal(d) => d,
        }
    }

    /// The value as an exact integer; a fractional value is malformed where
    /// a count is expected.
    pub fn as_integer(self) -> ReportResult<i64> {
        match self {
            Self::Integer(i) => Ok(i),
            Self::Decimal(d) => Err(ReportError::MalformedValue {
                field: "integer",
                value: d.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for StatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
        }
    }
}

impl FromStr for StatValue {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(Self::Integer(i));
        }
        match trimmed.parse::<f64>() {
            Ok(d) if d.is_finite() => Ok(Self::Decimal(d)),
            _ => Err(ReportError::MalformedValue {
                field: "value",
                value: s.to_string(),
            }),
        }
    }
}

/// A parsed per-URL traffic row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlStat {
    pub period: Period,
    pub url: String,
    pub department_id: String,
    pub pageviews: u64,
    pub visitors: u64,
}

struct UrlStatRow {
    period_name: String,
    url: String,
    department_id: String,
    pageviews: String,
    visitors: String,
}

impl TryFrom<UrlStatRow> for UrlStat {
    type Error = ReportError;

    fn try_from(row: UrlStatRow) -> Result<Self, Self::Error> {
        Ok(Self {
            period: row.period_name.parse()?,
            pageviews: parse_count("pageviews", &row.pageviews)?,
            visitors: parse_count("visitors", &row.visitors)?,
            url: row.url,
            department_id: row.department_id,
        })
    }
}

fn parse_count(field: &'static str, raw: &str) -> ReportResult<u64> {
    raw.trim()
        .parse()
        .map_err(|_| ReportError::MalformedValue {
            field,
            value: raw.to_string(),
        })
}

/// Distinct raw `period_name` values of a record kind.
pub fn distinct_periods(conn: &Connection, kind: RecordKind) -> Result<Vec<String>, duckdb::Error> {
    let table = kind.table_name();
    // Table name comes from a fixed enum
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT period_name FROM {table} ORDER BY period_name"
    ))?;
    let periods = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(periods)
}

/// Raw keyed statistics ordered by `(period_name, stat_name, key)`.
///
/// `stat_name = None` returns every category.
pub fn keyed_stat_rows(
    conn: &Connection,
    stat_name: Option<&str>,
    filter: PeriodFilter,
) -> Result<Vec<KeyedStatRow>, duckdb::Error> {
    let mut sql = String::from(
        r#"SELECT period_name, stat_name, "key", "value" FROM ga_stat WHERE 1 = 1"#,
    );
    let mut params: Vec<String> = Vec::new();
    if let Some(stat_name) = stat_name {
        sql.push_str(" AND stat_name = ?");
        params.push(stat_name.to_string());
    }
    if let Some(code) = filter.code() {
        sql.push_str(" AND period_name = ?");
        params.push(code);
    }
    sql.push_str(r#" ORDER BY period_name, stat_name, "key""#);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(duckdb::params_from_iter(params.iter()), |row| {
            Ok(KeyedStatRow {
                period_name: row.get(0)?,
                stat_name: row.get(1)?,
                key: row.get(2)?,
                value: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Parsed keyed statistics of one category, ordered by `(period_name, key)`.
pub fn keyed_stats(
    conn: &Connection,
    stat_name: &str,
    filter: PeriodFilter,
) -> ReportResult<Vec<KeyedStat>> {
    let rows = keyed_stat_rows(conn, Some(stat_name), filter)?;
    tracing::debug!(stat_name, rows = rows.len(), "Loaded keyed statistics");
    rows.into_iter().map(KeyedStat::try_from).collect()
}

/// Which URL rows to load.
#[derive(Debug, Clone, Copy)]
pub enum UrlSelection<'a> {
    /// Every row attributed to some department.
    AnyDepartment,
    /// The row(s) for one exact URL.
    Url(&'a str),
    /// Rows of one department whose URL starts with a prefix.
    DepartmentPrefix {
        department_id: &'a str,
        prefix: &'a str,
    },
}

/// Parsed URL rows matching a selection, ordered by `(period_name, url)`.
pub fn url_stats(
    conn: &Connection,
    selection: UrlSelection<'_>,
    filter: PeriodFilter,
) -> ReportResult<Vec<UrlStat>> {
    let mut sql = String::from(
        "SELECT period_name, url, department_id, pageviews, visitors FROM ga_url WHERE 1 = 1",
    );
    let mut params: Vec<String> = Vec::new();
    match selection {
        UrlSelection::AnyDepartment => sql.push_str(" AND department_id <> ''"),
        UrlSelection::Url(url) => {
            sql.push_str(" AND url = ?");
            params.push(url.to_string());
        }
        UrlSelection::DepartmentPrefix {
            department_id,
            prefix,
        } => {
            sql.push_str(" AND department_id = ? AND starts_with(url, ?)");
            params.push(department_id.to_string());
            params.push(prefix.to_string());
        }
    }
    if let Some(code) = filter.code() {
        sql.push_str(" AND period_name = ?");
        params.push(code);
    }
    sql.push_str(" ORDER BY period_name, url");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(duckdb::params_from_iter(params.iter()), |row| {
            Ok(UrlStatRow {
                period_name: row.get(0)?,
                url: row.get(1)?,
                department_id: row.get(2)?,
                pageviews: row.get(3)?,
                visitors: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(?selection, rows = rows.len(), "Loaded URL statistics");
    rows.into_iter().map(UrlStat::try_from).collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_stat_value_parsing() {
        assert_eq!("42".parse::<StatValue>().unwrap(), StatValue::Integer(42));
        assert_eq!(" 7 ".parse::<StatValue>().unwrap(), StatValue::Integer(7));
        assert_eq!("33.5".parse::<StatValue>().unwrap(), StatValue::Decimal(33.5));
        assert!("abc".parse::<StatValue>().is_err());
        assert!("NaN".parse::<StatValue>().is_err());
        assert!("".parse::<StatValue>().is_err());
    }

    #[test]
    fn test_stat_value_as_integer() {
        assert_eq!(StatValue::Integer(3).as_integer().unwrap(), 3);
        assert!(StatValue::Decimal(3.5).as_integer().is_err());
    }

    #[test]
    fn test_distinct_periods() {
        let conn = setup_test_db();
        insert_stat(&conn, "2013-05", "Totals", "Bounces", "1");
        insert_stat(&conn, "2013-04", "Totals", "Bounces", "1");
        insert_stat(&conn, "2013-04", "Country", "France", "1");

        let periods = distinct_periods(&conn, RecordKind::Stat).unwrap();
        assert_eq!(periods, vec!["2013-04", "2013-05"]);
        assert!(distinct_periods(&conn, RecordKind::Url).unwrap().is_empty());
    }

    #[test]
    fn test_keyed_stat_rows_order_and_filter() {
        let conn = setup_test_db();
        insert_stat(&conn, "2013-05", "Totals", "Bounces", "2");
        insert_stat(&conn, "2013-04", "Totals", "Total pageviews", "9");
        insert_stat(&conn, "2013-04", "Country", "France", "3");
        insert_stat(&conn, "2013-04", "Totals", "Bounces", "1");

        let all = keyed_stat_rows(&conn, None, PeriodFilter::All).unwrap();
        let order: Vec<(&str, &str, &str)> = all
            .iter()
            .map(|r| (r.period_name.as_str(), r.stat_name.as_str(), r.key.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2013-04", "Country", "France"),
                ("2013-04", "Totals", "Bounces"),
                ("2013-04", "Totals", "Total pageviews"),
                ("2013-05", "Totals", "Bounces"),
            ]
        );

        let april = PeriodFilter::from_param(Some("2013-04")).unwrap();
        let totals = keyed_stat_rows(&conn, Some("Totals"), april).unwrap();
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn test_keyed_stats_keep_stored_text() {
        let conn = setup_test_db();
        insert_stat(&conn, "2013-04", "Totals", "Visits", "0042");

        let stats = keyed_stats(&conn, "Totals", PeriodFilter::All).unwrap();
        assert_eq!(stats[0].value, StatValue::Integer(42));
        assert_eq!(stats[0].raw_value, "0042");
    }

    #[test]
    fn test_keyed_stats_rejects_malformed_period() {
        let conn = setup_test_db();
        insert_stat(&conn, "April", "Totals", "Bounces", "1");
        let err = keyed_stats(&conn, "Totals", PeriodFilter::All).unwrap_err();
        assert!(matches!(err, ReportError::MalformedPeriod(_)));
    }

    #[test]
    fn test_url_stats_selections() {
        let conn = setup_test_db();
        insert_url(&conn, "2013-04", "/dataset/roads", "dft", "10", "4");
        insert_url(&conn, "2013-04", "/publisher/dft", "dft", "7", "2");
        insert_url(&conn, "2013-04", "/about", "", "99", "50");
        insert_url(&conn, "2013-05", "/dataset/rail", "dft", "3", "1");

        let any = url_stats(&conn, UrlSelection::AnyDepartment, PeriodFilter::All).unwrap();
        assert_eq!(any.len(), 3);

        let landing = url_stats(&conn, UrlSelection::Url("/publisher/dft"), PeriodFilter::All).unwrap();
        assert_eq!(landing.len(), 1);
        assert_eq!(landing[0].pageviews, 7);

        let may = PeriodFilter::from_param(Some("2013-05")).unwrap();
        let datasets = url_stats(
            &conn,
            UrlSelection::DepartmentPrefix {
                department_id: "dft",
                prefix: "/dataset/",
            },
            may,
        )
        .unwrap();
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].url, "/dataset/rail");
    }

    #[test]
    fn test_url_stats_rejects_non_integer_counts() {
        let conn = setup_test_db();
        insert_url(&conn, "2013-04", "/dataset/roads", "dft", "ten", "4");
        let err = url_stats(&conn, UrlSelection::AnyDepartment, PeriodFilter::All).unwrap_err();
        assert!(matches!(
            err,
            ReportError::MalformedValue { field: "pageviews", .. }
        ));
    }
}
