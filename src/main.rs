use duckdb::Connection;
use ga_report::api::reports::AppState;
use ga_report::config::Config;
use ga_report::{server, storage};
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ga_report=info,tower_http=info".into()),
        )
        .init();

    // Load configuration
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref().map(std::path::Path::new));

    tracing::info!(
        host = %config.host,
        port = config.port,
        database = ?config.database_path,
        "Starting GA report server"
    );

    let conn = match &config.database_path {
        Some(path) => Connection::open(path)
            .unwrap_or_else(|e| panic!("Failed to open database {}: {e}", path.display())),
        None => {
            tracing::warn!("No database configured, serving reports from an empty in-memory database");
            Connection::open_in_memory().expect("Failed to open DuckDB")
        }
    };
    storage::migrations::run_migrations(&conn).expect("Failed to run migrations");

    let state = Arc::new(AppState {
        conn: Arc::new(Mutex::new(conn)),
        top_publishers_limit: config.top_publishers_limit,
        publisher_records_limit: config.publisher_records_limit,
        dashboard_origin: config.dashboard_origin.clone(),
    });

    let app = server::build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(addr = %addr, "Listening");
    axum::serve(listener, app).await.expect("Server error");
}
