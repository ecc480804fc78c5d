use crate::error::{ReportError, ReportResult};
use crate::query::grouping::OrderedGroups;
use crate::query::period::PeriodFilter;
use crate::storage::lookup::{Dataset, EntityLookup, Organization};
use crate::storage::records::{self, UrlSelection, UrlStat};
use duckdb::Connection;
use serde::Serialize;
use std::cmp::Reverse;

/// Default number of rows in publisher rankings.
pub const DEFAULT_LIMIT: usize = 20;

/// Path prefix of content-record pages.
pub const DATASET_PREFIX: &str = "/dataset/";

/// Landing page path of an organization.
pub fn landing_path(organization_id: &str) -> String {
    format!("/publisher/{organization_id}")
}

/// Traffic totals of one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublisherTotal {
    pub organization_id: String,
    pub pageviews: u64,
    pub visitors: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Traffic {
    pageviews: u64,
    visitors: u64,
}

impl Traffic {
    fn add(&mut self, row: &UrlStat) {
        self.pageviews = self.pageviews.saturating_add(row.pageviews);
        self.visitors = self.visitors.saturating_add(row.visitors);
    }
}

/// Organizations ranked by total pageviews over all their URLs.
pub fn top_publishers(
    conn: &Connection,
    filter: PeriodFilter,
    limit: usize,
) -> ReportResult<Vec<PublisherTotal>> {
    let rows = records::url_stats(conn, UrlSelection::AnyDepartment, filter)?;
    let ranked = rank_publishers(&rows, limit);
    tracing::debug!(
        period = ?filter.code(),
        rows = rows.len(),
        publishers = ranked.len(),
        "Ranked publishers"
    );
    Ok(ranked)
}

/// Group attributed rows by department, sum, sort by pageviews, truncate.
pub fn rank_publishers(rows: &[UrlStat], limit: usize) -> Vec<PublisherTotal> {
    let mut groups: OrderedGroups<Traffic> = OrderedGroups::new();
    for row in rows.iter().filter(|r| !r.department_id.is_empty()) {
        groups.entry(&row.department_id).add(row);
    }
    let mut ranked = groups.into_entries();
    ranked.sort_by_key(|(_, t)| Reverse(t.pageviews));
    ranked
        .into_iter()
        .take(limit)
        .map(|(organization_id, t)| PublisherTotal {
            organization_id,
            pageviews: t.pageviews,
            visitors: t.visitors,
        })
        .collect()
}

/// Traffic of one content record, before catalog resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTotal {
    pub record_id: String,
    pub pageviews: u64,
    pub visitors: u64,
}

/// Traffic of one content record with its catalog entry, if it still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordTraffic {
    pub record_id: String,
    pub record: Option<Dataset>,
    pub pageviews: u64,
    pub visitors: u64,
}

/// Landing-page views and ranked content records of one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublisherDetail {
    pub organization: Organization,
    pub landing_views: u64,
    pub records: Vec<RecordTraffic>,
}

/// Build the detail view of one organization.
///
/// Fails with [`ReportError::OrganizationNotFound`] for an unknown id. A
/// record that no longer exists in the catalog is reported with
/// `record: None`.
pub fn publisher_detail<L: EntityLookup + ?Sized>(
    conn: &Connection,
    lookup: &L,
    organization_id: &str,
    filter: PeriodFilter,
    limit: usize,
) -> ReportResult<PublisherDetail> {
    let organization = lookup
        .organization(organization_id)?
        .ok_or_else(|| ReportError::OrganizationNotFound(organization_id.to_string()))?;

    let landing_rows = records::url_stats(
        conn,
        UrlSelection::Url(&landing_path(&organization.name)),
        filter,
    )?;
    let landing_views = sum_pageviews(&landing_rows);

    let record_rows = records::url_stats(
        conn,
        UrlSelection::DepartmentPrefix {
            department_id: &organization.name,
            prefix: DATASET_PREFIX,
        },
        filter,
    )?;
    let ranked = rank_records(&record_rows, filter, limit);

    let records = ranked
        .into_iter()
        .map(|total| {
            let record = lookup.dataset(&total.record_id)?;
            if record.is_none() {
                tracing::warn!(
                    organization = %organization.name,
                    record_id = %total.record_id,
                    "Analytics row references a record missing from the catalog"
                );
            }
            Ok(RecordTraffic {
                record_id: total.record_id,
                record,
                pageviews: total.pageviews,
                visitors: total.visitors,
            })
        })
        .collect::<ReportResult<Vec<_>>>()?;

    tracing::debug!(
        organization = %organization.name,
        period = ?filter.code(),
        landing_views,
        records = records.len(),
        "Built publisher detail"
    );

    Ok(PublisherDetail {
        organization,
        landing_views,
        records,
    })
}

/// Total pageviews of the landing rows; no row means zero.
pub fn sum_pageviews(rows: &[UrlStat]) -> u64 {
    rows.iter()
        .fold(0u64, |acc, r| acc.saturating_add(r.pageviews))
}

/// Rank content-record rows.
///
/// Rows are first ordered by pageviews descending. For a single period the
/// first `limit` rows are taken directly. Across periods rows are merged per
/// record in that order, and merging stops as soon as `limit` distinct
/// records are held: the cap is applied by discovery order, then only the
/// capped set is sorted by summed pageviews.
pub fn rank_records(rows: &[UrlStat], filter: PeriodFilter, limit: usize) -> Vec<RecordTotal> {
    let mut ordered: Vec<&UrlStat> = rows.iter().collect();
    ordered.sort_by_key(|r| Reverse(r.pageviews));

    if !filter.is_all() {
        return ordered
            .into_iter()
            .take(limit)
            .map(|r| RecordTotal {
                record_id: record_id(&r.url).to_string(),
                pageviews: r.pageviews,
                visitors: r.visitors,
            })
            .collect();
    }

    let mut groups: OrderedGroups<Traffic> = OrderedGroups::new();
    for row in ordered {
        if groups.len() >= limit {
            break;
        }
        groups.entry(record_id(&row.url)).add(row);
    }

    let mut ranked = groups.into_entries();
    ranked.sort_by_key(|(_, t)| Reverse(t.pageviews));
    ranked
        .into_iter()
        .map(|(record_id, t)| RecordTotal {
            record_id,
            pageviews: t.pageviews,
            visitors: t.visitors,
        })
        .collect()
}

fn record_id(url: &str) -> &str {
    url.strip_prefix(DATASET_PREFIX).unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::lookup::DuckDbLookup;
    use crate::storage::records::test_support::*;

    fn row(period: &str, url: &str, dept: &str, pageviews: u64, visitors: u64) -> UrlStat {
        UrlStat {
            period: period.parse().unwrap(),
            url: url.to_string(),
            department_id: dept.to_string(),
            pageviews,
            visitors,
        }
    }

    fn month(code: &str) -> PeriodFilter {
        PeriodFilter::from_param(Some(code)).unwrap()
    }

    fn ids(totals: &[RecordTotal]) -> Vec<&str> {
        totals.iter().map(|t| t.record_id.as_str()).collect()
    }

    fn setup_catalog() -> Connection {
        let conn = setup_test_db();
        conn.execute(
            "INSERT INTO organizations (name, title) VALUES ('dft', 'Department for Transport')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO datasets (name, title, owner_org) VALUES ('roads', 'Road traffic', 'dft')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO datasets (name, title, owner_org) VALUES ('rail', 'Rail usage', 'dft')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_rank_publishers() {
        let rows = vec![
            row("2013-04", "/dataset/a", "dft", 10, 5),
            row("2013-04", "/dataset/b", "defra", 30, 9),
            row("2013-04", "/publisher/dft", "dft", 25, 4),
            row("2013-04", "/about", "", 1000, 900),
        ];
        let ranked = rank_publishers(&rows, DEFAULT_LIMIT);
        assert_eq!(
            ranked,
            vec![
                PublisherTotal {
                    organization_id: "dft".to_string(),
                    pageviews: 35,
                    visitors: 9,
                },
                PublisherTotal {
                    organization_id: "defra".to_string(),
                    pageviews: 30,
                    visitors: 9,
                },
            ]
        );
    }

    #[test]
    fn test_rank_publishers_limit() {
        let rows: Vec<UrlStat> = (0..30u64)
            .map(|i| row("2013-04", "/dataset/x", &format!("org{i}"), i, 1))
            .collect();
        let ranked = rank_publishers(&rows, 20);
        assert_eq!(ranked.len(), 20);
        assert_eq!(ranked[0].organization_id, "org29");
    }

    #[test]
    fn test_rank_records_single_period_takes_top() {
        let rows = vec![
            row("2013-04", "/dataset/a", "dft", 1, 1),
            row("2013-04", "/dataset/b", "dft", 9, 3),
            row("2013-04", "/dataset/c", "dft", 5, 2),
        ];
        let ranked = rank_records(&rows, month("2013-04"), 2);
        assert_eq!(ids(&ranked), vec!["b", "c"]);
        assert_eq!(ranked[0].visitors, 3);
    }

    #[test]
    fn test_rank_records_all_periods_merges() {
        let rows = vec![
            row("2013-04", "/dataset/a", "dft", 10, 1),
            row("2013-05", "/dataset/a", "dft", 10, 1),
            row("2013-04", "/dataset/b", "dft", 15, 2),
        ];
        let ranked = rank_records(&rows, PeriodFilter::All, DEFAULT_LIMIT);
        assert_eq!(
            ranked,
            vec![
                RecordTotal {
                    record_id: "a".to_string(),
                    pageviews: 20,
                    visitors: 2,
                },
                RecordTotal {
                    record_id: "b".to_string(),
                    pageviews: 15,
                    visitors: 2,
                },
            ]
        );
    }

    #[test]
    fn test_rank_records_cap_then_sort() {
        // Scan order by pageviews: a(50) b(40) c(30) a(25) c(20) ...
        // With limit 2 only a and b are admitted; c never enters even though
        // its merged total (50) would beat b (40). The scan stops at the first
        // row after the cap is reached, so a's later rows are not merged.
        let rows = vec![
            row("2013-04", "/dataset/a", "dft", 50, 5),
            row("2013-04", "/dataset/b", "dft", 40, 4),
            row("2013-04", "/dataset/c", "dft", 30, 3),
            row("2013-05", "/dataset/a", "dft", 25, 2),
            row("2013-05", "/dataset/c", "dft", 20, 2),
        ];
        let ranked = rank_records(&rows, PeriodFilter::All, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ids(&ranked), vec!["a", "b"]);
        assert_eq!(ranked[0].pageviews, 50);
    }

    #[test]
    fn test_rank_records_capped_set_is_resorted() {
        let rows = vec![
            row("2013-04", "/dataset/a", "dft", 50, 1),
            row("2013-04", "/dataset/b", "dft", 40, 1),
            row("2013-05", "/dataset/b", "dft", 35, 1),
            row("2013-06", "/dataset/b", "dft", 30, 1),
        ];
        let ranked = rank_records(&rows, PeriodFilter::All, 3);
        assert_eq!(ids(&ranked), vec!["b", "a"]);
        assert_eq!(ranked[0].pageviews, 105);
    }

    #[test]
    fn test_sum_pageviews_empty_is_zero() {
        assert_eq!(sum_pageviews(&[]), 0);
    }

    #[test]
    fn test_top_publishers_from_store() {
        let conn = setup_test_db();
        insert_url(&conn, "2013-04", "/dataset/roads", "dft", "10", "4");
        insert_url(&conn, "2013-05", "/dataset/roads", "dft", "5", "1");
        insert_url(&conn, "2013-04", "/dataset/farms", "defra", "12", "6");

        let all = top_publishers(&conn, PeriodFilter::All, DEFAULT_LIMIT).unwrap();
        assert_eq!(all[0].organization_id, "dft");
        assert_eq!(all[0].pageviews, 15);

        let april = top_publishers(&conn, month("2013-04"), DEFAULT_LIMIT).unwrap();
        assert_eq!(april[0].organization_id, "defra");
    }

    #[test]
    fn test_publisher_detail_single_period() {
        let conn = setup_catalog();
        insert_url(&conn, "2013-04", "/publisher/dft", "dft", "7", "3");
        insert_url(&conn, "2013-04", "/dataset/roads", "dft", "10", "4");
        insert_url(&conn, "2013-04", "/dataset/rail", "dft", "20", "8");
        insert_url(&conn, "2013-04", "/dataset/other", "defra", "99", "8");

        let lookup = DuckDbLookup::new(&conn);
        let detail = publisher_detail(&conn, &lookup, "dft", month("2013-04"), DEFAULT_LIMIT).unwrap();
        assert_eq!(detail.organization.title, "Department for Transport");
        assert_eq!(detail.landing_views, 7);
        assert_eq!(detail.records.len(), 2);
        assert_eq!(detail.records[0].record_id, "rail");
        assert_eq!(
            detail.records[0].record.as_ref().map(|d| d.title.as_str()),
            Some("Rail usage")
        );
    }

    #[test]
    fn test_publisher_detail_all_periods_sums_landing() {
        let conn = setup_catalog();
        insert_url(&conn, "2013-04", "/publisher/dft", "dft", "7", "3");
        insert_url(&conn, "2013-05", "/publisher/dft", "dft", "8", "3");

        let lookup = DuckDbLookup::new(&conn);
        let detail = publisher_detail(&conn, &lookup, "dft", PeriodFilter::All, DEFAULT_LIMIT).unwrap();
        assert_eq!(detail.landing_views, 15);
        assert!(detail.records.is_empty());
    }

    #[test]
    fn test_publisher_detail_missing_landing_row_is_zero() {
        let conn = setup_catalog();
        let lookup = DuckDbLookup::new(&conn);
        let detail = publisher_detail(&conn, &lookup, "dft", month("2013-04"), DEFAULT_LIMIT).unwrap();
        assert_eq!(detail.landing_views, 0);
    }

    #[test]
    fn test_publisher_detail_unknown_organization() {
        let conn = setup_catalog();
        let lookup = DuckDbLookup::new(&conn);
        let err = publisher_detail(&conn, &lookup, "nobody", PeriodFilter::All, DEFAULT_LIMIT).unwrap_err();
        assert!(matches!(err, ReportError::OrganizationNotFound(ref id) if id == "nobody"));
    }

    #[test]
    fn test_publisher_detail_dangling_record() {
        let conn = setup_catalog();
        insert_url(&conn, "2013-04", "/dataset/deleted", "dft", "4", "2");

        let lookup = DuckDbLookup::new(&conn);
        let detail = publisher_detail(&conn, &lookup, "dft", PeriodFilter::All, DEFAULT_LIMIT).unwrap();
        assert_eq!(detail.records.len(), 1);
        assert_eq!(detail.records[0].record_id, "deleted");
        assert!(detail.records[0].record.is_none());
        assert_eq!(detail.records[0].pageviews, 4);
    }
}
