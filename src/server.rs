use crate::api::reports::{self, AppState};
use axum::http::{header, HeaderValue, Method};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let report_cors = build_dashboard_cors(state.dashboard_origin.as_deref());

    let report_routes = Router::new()
        .route("/months", get(reports::get_months))
        .route("/report", get(reports::get_site_report))
        .route("/report/category/{name}", get(reports::get_category))
        .route("/report/{month}/csv", get(reports::get_csv))
        .route("/publishers", get(reports::get_top_publishers))
        .route("/publishers/{id}", get(reports::get_publisher))
        .layer(report_cors);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", report_routes)
        .layer(axum::middleware::map_response(add_security_headers))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            std::time::Duration::from_secs(30),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Inject security headers on every HTTP response.
async fn add_security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response
}

/// Build CORS layer for report routes based on configured origin.
fn build_dashboard_cors(dashboard_origin: Option<&str>) -> CorsLayer {
    dashboard_origin.map_or_else(
        || {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers(Any)
        },
        |origin| {
            let allowed_origin = origin
                .parse::<HeaderValue>()
                .unwrap_or_else(|_| HeaderValue::from_static("*"));
            CorsLayer::new()
                .allow_origin(allowed_origin)
                .allow_methods([Method::GET])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        },
    )
}

/// GET /health — Simple health check endpoint.
async fn health_check() -> &'static str {
    "ok"
}
