use crate::error::{ReportError, ReportResult};
use crate::storage::records::{self, RecordKind};
use chrono::NaiveDate;
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar-month reporting bucket, written `YYYY-MM`.
///
/// Ordering is chronological, which matches the lexicographic order of the
/// `YYYY-MM` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> ReportResult<Self> {
        if !(0..=9999).contains(&year) || !(1..=12).contains(&month) {
            return Err(ReportError::MalformedPeriod(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    pub const fn year(self) -> i32 {
        self.year
    }

    pub const fn month(self) -> u32 {
        self.month
    }

    /// Human-readable label, e.g. `April 2013`.
    pub fn label(self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).map_or_else(
            || self.to_string(),
            |d| d.format("%B %Y").to_string(),
        )
    }
}

impl FromStr for Period {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ReportError::MalformedPeriod(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(malformed)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(malformed());
        }
        if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let year: i32 = year.parse().map_err(|_| malformed())?;
        let month: u32 = month.parse().map_err(|_| malformed())?;
        Self::new(year, month).map_err(|_| malformed())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}

impl TryFrom<String> for Period {
    type Error = ReportError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Which periods a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodFilter {
    #[default]
    All,
    Month(Period),
}

impl PeriodFilter {
    /// Parse the `month` request parameter. Missing, empty and `all` mean
    /// every period.
    pub fn from_param(param: Option<&str>) -> ReportResult<Self> {
        match param.map(str::trim) {
            None | Some("" | "all") => Ok(Self::All),
            Some(code) => code.parse().map(Self::Month),
        }
    }

    pub const fn period(self) -> Option<Period> {
        match self {
            Self::All => None,
            Self::Month(p) => Some(p),
        }
    }

    /// The period code as stored, or `None` for all periods.
    pub fn code(self) -> Option<String> {
        self.period().map(|p| p.to_string())
    }

    pub const fn is_all(self) -> bool {
        matches!(self, Self::All)
    }
}

/// One entry of the month selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthOption {
    pub period: Period,
    pub label: String,
}

/// Distinct periods present in the given record kind, most recent first.
///
/// A stored period that is not `YYYY-MM` fails the whole listing rather than
/// being dropped.
pub fn list_periods(conn: &Connection, kind: RecordKind) -> ReportResult<Vec<MonthOption>> {
    let codes = records::distinct_periods(conn, kind)?;
    catalog_from_codes(&codes)
}

/// Build the month selector from raw period codes.
pub fn catalog_from_codes<S: AsRef<str>>(codes: &[S]) -> ReportResult<Vec<MonthOption>> {
    let mut months = codes
        .iter()
        .map(|code| {
            let period: Period = code.as_ref().parse()?;
            Ok(MonthOption {
                period,
                label: period.label(),
            })
        })
        .collect::<ReportResult<Vec<_>>>()?;
    months.sort_by(|a, b| b.period.cmp(&a.period));
    months.dedup_by_key(|m| m.period);
    Ok(months)
}

/// Description shown next to a report: `all time` or the month label.
pub fn describe_period(filter: PeriodFilter, months: &[MonthOption]) -> String {
    match filter {
        PeriodFilter::All => "all time".to_string(),
        PeriodFilter::Month(period) => months
            .iter()
            .find(|m| m.period == period)
            .map_or_else(|| period.label(), |m| m.label.clone()),
    }
}
