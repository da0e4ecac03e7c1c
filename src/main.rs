mod config;
mod database;
mod error;
mod handlers;
mod middleware;
mod models;
mod ocr;
mod state;
mod store;
mod utils;
mod workflow;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use dotenvy::dotenv;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::Config;
use database::{create_database_pool, run_migrations};
use ocr::HttpOcrClient;
use state::AppState;
use store::{LocalReceiptFiles, PgStore};
use workflow::{ReceiptService, WorkflowEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    let config = Config::from_env()?;

    let db = create_database_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&db)
        .await
        .context("Failed to apply migrations")?;

    let store = Arc::new(PgStore::new(db));
    let files = Arc::new(LocalReceiptFiles::new(&config.receipts_dir));
    let ocr = Arc::new(HttpOcrClient::new(&config.ocr_service_url, config.ocr_timeout)?);

    let state = AppState {
        engine: Arc::new(WorkflowEngine::new(store.clone(), store.clone())),
        receipts: Arc::new(ReceiptService::new(
            store.clone(),
            files,
            ocr,
            config.ocr_timeout,
        )),
        directory: store,
        jwt_secret: Arc::from(config.jwt_secret.as_str()),
    };

    let app = create_router(state, config.max_upload_bytes);

    let addr = format!("0.0.0.0:{}", config.port);
    log::info!("Claimflow server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))

        // Auth
        .route("/api/auth/token", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/me", get(handlers::auth::me))

        // Claims
        .route(
            "/api/expenses",
            get(handlers::expenses::list_expenses).post(handlers::expenses::create_expense),
        )
        .route(
            "/api/expenses/:id",
            get(handlers::expenses::expense_detail).put(handlers::expenses::update_expense),
        )
        .route("/api/expenses/:id/submit", post(handlers::expenses::submit))
        .route("/api/expenses/:id/manager_approve", post(handlers::expenses::manager_approve))
        .route("/api/expenses/:id/manager_reject", post(handlers::expenses::manager_reject))
        .route("/api/expenses/:id/finance_approve", post(handlers::expenses::finance_approve))
        .route("/api/expenses/:id/mark_paid", post(handlers::expenses::mark_paid))

        // Receipts
        .route(
            "/api/expenses/:id/receipt",
            get(handlers::receipts::get_receipt).post(handlers::receipts::upload_receipt),
        )
        .route("/api/receipts", get(handlers::receipts::list_receipts))

        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
}
