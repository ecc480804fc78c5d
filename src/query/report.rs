use crate::error::ReportResult;
use crate::query::category::Category;
use crate::query::period::{self, MonthOption, Period, PeriodFilter};
use crate::query::stats::{self, StatEntry};
use crate::storage::records::RecordKind;
use duckdb::Connection;
use serde::Serialize;

/// One breakdown section of the site report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSection {
    pub section: &'static str,
    pub category: &'static str,
    pub entries: Vec<StatEntry>,
}

/// Site-wide report for one period filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteReport {
    pub month: Option<Period>,
    pub month_desc: String,
    pub months: Vec<MonthOption>,
    pub totals: Vec<StatEntry>,
    pub breakdowns: Vec<ReportSection>,
    /// Sections left empty because their stored data was malformed.
    pub degraded: Vec<&'static str>,
}

/// Build the site report: totals plus every breakdown category.
///
/// A data-quality error in one section is logged and leaves that section
/// empty; the rest of the report is still produced. Any other error fails
/// the whole report.
pub fn site_report(conn: &Connection, filter: PeriodFilter) -> ReportResult<SiteReport> {
    let mut degraded = Vec::new();

    let months = degrade(
        period::list_periods(conn, RecordKind::Stat),
        "months",
        &mut degraded,
    )?;
    let totals = degrade(
        stats::aggregate_category(conn, Category::Totals, filter),
        Category::Totals.section(),
        &mut degraded,
    )?;

    let mut breakdowns = Vec::with_capacity(Category::BREAKDOWNS.len());
    for category in Category::BREAKDOWNS {
        let entries = degrade(
            stats::aggregate_category(conn, category, filter),
            category.section(),
            &mut degraded,
        )?;
        breakdowns.push(ReportSection {
            section: category.section(),
            category: category.stat_name(),
            entries,
        });
    }

    Ok(SiteReport {
        month: filter.period(),
        month_desc: period::describe_period(filter, &months),
        months,
        totals,
        breakdowns,
        degraded,
    })
}

fn degrade<T: Default>(
    result: ReportResult<T>,
    section: &'static str,
    degraded: &mut Vec<&'static str>,
) -> ReportResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_data_quality() => {
            tracing::warn!(section, error = %e, "Malformed analytics data, section left empty");
            degraded.push(section);
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

impl SiteReport {
    /// Breakdown section by its short name, e.g. `browsers`.
    pub fn section(&self, name: &str) -> Option<&ReportSection> {
        self.breakdowns.iter().find(|s| s.section == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::stats::MetricValue;
    use crate::storage::records::test_support::*;

    #[test]
    fn test_site_report_all_time() {
        let conn = setup_test_db();
        insert_stat(&conn, "2013-04", "Totals", "Bounces", "10");
        insert_stat(&conn, "2013-05", "Totals", "Bounces", "20");
        insert_stat(&conn, "2013-04", "Country", "France", "3");
        insert_stat(&conn, "2013-04", "Browser versions", "Chrome (36.0.1985)", "4");

        let report = site_report(&conn, PeriodFilter::All).unwrap();
        assert_eq!(report.month_desc, "all time");
        assert!(report.month.is_none());
        assert_eq!(report.months.len(), 2);
        assert_eq!(report.totals[0].value, MetricValue::Count(30));
        assert_eq!(report.breakdowns.len(), 5);
        assert_eq!(report.section("country").unwrap().entries[0].label, "France");
        assert_eq!(report.section("browsers").unwrap().entries[0].label, "Chrome (36)");
        assert!(report.section("languages").unwrap().entries.is_empty());
        assert!(report.degraded.is_empty());
    }

    #[test]
    fn test_site_report_single_month_desc() {
        let conn = setup_test_db();
        insert_stat(&conn, "2013-04", "Totals", "Bounces", "10");

        let filter = PeriodFilter::from_param(Some("2013-04")).unwrap();
        let report = site_report(&conn, filter).unwrap();
        assert_eq!(report.month_desc, "April 2013");
        assert_eq!(report.month.map(|p| p.to_string()).as_deref(), Some("2013-04"));
    }

    #[test]
    fn test_site_report_degrades_malformed_section() {
        let conn = setup_test_db();
        insert_stat(&conn, "2013-04", "Browser versions", "not a browser key", "4");
        insert_stat(&conn, "2013-04", "Country", "France", "3");

        let report = site_report(&conn, PeriodFilter::All).unwrap();
        assert_eq!(report.degraded, vec!["browsers"]);
        assert!(report.section("browsers").unwrap().entries.is_empty());
        assert_eq!(report.section("country").unwrap().entries.len(), 1);
    }
}
