use crate::api::errors::ApiError;
use crate::error::{ReportError, ReportResult};
use crate::query::category::Category;
use crate::query::period::{self, MonthOption, Period, PeriodFilter};
use crate::query::publishers::{self, PublisherDetail};
use crate::query::report::{self, SiteReport};
use crate::query::stats::{self, StatEntry};
use crate::query::export;
use crate::storage::lookup::{DuckDbLookup, EntityLookup, Organization};
use crate::storage::records::RecordKind;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use duckdb::Connection;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state for the report handlers.
pub struct AppState {
    pub conn: Arc<Mutex<Connection>>,
    pub top_publishers_limit: usize,
    pub publisher_records_limit: usize,
    pub dashboard_origin: Option<String>,
}

/// Query parameters shared by the report endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
    /// `YYYY-MM`, or absent / empty / `all` for every period.
    pub month: Option<String>,
}

impl ReportParams {
    fn filter(&self) -> Result<PeriodFilter, ApiError> {
        parse_month(self.month.as_deref())
    }
}

fn parse_month(month: Option<&str>) -> Result<PeriodFilter, ApiError> {
    PeriodFilter::from_param(month).map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid month: '{}'. Use YYYY-MM or 'all'.",
            month.unwrap_or_default()
        ))
    })
}

/// Run a report computation on a blocking thread while holding the
/// connection lock.
async fn run_blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> ReportResult<T> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        let conn = state.conn.lock();
        f(&conn)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Report task panicked: {e}")))?
    .map_err(ApiError::from)
}

/// Month selector for publisher pages; malformed periods leave it empty.
fn url_months(conn: &Connection) -> ReportResult<Vec<MonthOption>> {
    match period::list_periods(conn, RecordKind::Url) {
        Err(e) if e.is_data_quality() => {
            tracing::warn!(error = %e, "Malformed period in URL statistics, month selector left empty");
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Query parameters for the month selector.
#[derive(Debug, Deserialize)]
pub struct MonthsParams {
    #[serde(default = "default_kind")]
    pub kind: RecordKind,
}

const fn default_kind() -> RecordKind {
    RecordKind::Stat
}

/// GET /api/months — Distinct periods, most recent first.
pub async fn get_months(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MonthsParams>,
) -> Result<Json<Vec<MonthOption>>, ApiError> {
    let kind = params.kind;
    let months = run_blocking(&state, move |conn| period::list_periods(conn, kind)).await?;
    Ok(Json(months))
}

/// GET /api/report — Site totals and every breakdown.
pub async fn get_site_report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> Result<Json<SiteReport>, ApiError> {
    let filter = params.filter()?;
    let report = run_blocking(&state, move |conn| report::site_report(conn, filter)).await?;
    Ok(Json(report))
}

/// One aggregated category.
#[derive(Debug, Serialize)]
pub struct CategoryReport {
    pub category: &'static str,
    pub month: Option<Period>,
    pub entries: Vec<StatEntry>,
}

/// GET /api/report/category/{name} — One statistic category.
pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<ReportParams>,
) -> Result<Json<CategoryReport>, ApiError> {
    let category: Category = name.parse()?;
    let filter = params.filter()?;
    let entries = run_blocking(&state, move |conn| {
        stats::aggregate_category(conn, category, filter)
    })
    .await?;
    Ok(Json(CategoryReport {
        category: category.stat_name(),
        month: filter.period(),
        entries,
    }))
}

/// GET /api/report/{month}/csv — Raw keyed statistics as CSV.
pub async fn get_csv(
    State(state): State<Arc<AppState>>,
    Path(month): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = parse_month(Some(&month))?;
    let body = run_blocking(&state, move |conn| export::export_csv(conn, filter)).await?;
    let disposition = format!(
        "attachment; filename=\"ga-report-{}.csv\"",
        filter.code().unwrap_or_else(|| "all".to_string())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// A top-publishers row with the organization resolved from the catalog.
#[derive(Debug, Serialize)]
pub struct PublisherRow {
    pub organization_id: String,
    pub organization: Option<Organization>,
    pub pageviews: u64,
    pub visitors: u64,
}

/// Top publishers page.
#[derive(Debug, Serialize)]
pub struct TopPublishersReport {
    pub month: Option<Period>,
    pub month_desc: String,
    pub months: Vec<MonthOption>,
    pub publishers: Vec<PublisherRow>,
}

/// GET /api/publishers — Organizations ranked by traffic.
pub async fn get_top_publishers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> Result<Json<TopPublishersReport>, ApiError> {
    let filter = params.filter()?;
    let limit = state.top_publishers_limit;
    let report = run_blocking(&state, move |conn| {
        let months = url_months(conn)?;
        let lookup = DuckDbLookup::new(conn);
        let publishers = publishers::top_publishers(conn, filter, limit)?
            .into_iter()
            .map(|total| {
                Ok(PublisherRow {
                    organization: lookup.organization(&total.organization_id)?,
                    organization_id: total.organization_id,
                    pageviews: total.pageviews,
                    visitors: total.visitors,
                })
            })
            .collect::<Result<Vec<_>, ReportError>>()?;
        Ok(TopPublishersReport {
            month: filter.period(),
            month_desc: period::describe_period(filter, &months),
            months,
            publishers,
        })
    })
    .await?;
    Ok(Json(report))
}

/// Publisher detail page.
#[derive(Debug, Serialize)]
pub struct PublisherReport {
    pub month: Option<Period>,
    pub month_desc: String,
    pub months: Vec<MonthOption>,
    #[serde(flatten)]
    pub detail: PublisherDetail,
}

/// GET /api/publishers/{id} — Landing views and top records of one publisher.
pub async fn get_publisher(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ReportParams>,
) -> Result<Json<PublisherReport>, ApiError> {
    let filter = params.filter()?;
    let limit = state.publisher_records_limit;
    let report = run_blocking(&state, move |conn| {
        let lookup = DuckDbLookup::new(conn);
        let detail = publishers::publisher_detail(conn, &lookup, &id, filter, limit)?;
        let months = url_months(conn)?;
        Ok(PublisherReport {
            month: filter.period(),
            month_desc: period::describe_period(filter, &months),
            months,
            detail,
        })
    })
    .await?;
    Ok(Json(report))
}
