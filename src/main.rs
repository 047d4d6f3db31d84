#![allow(dead_code, unused)]
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{Extension, Router};
use dotenvy::dotenv;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod config;
mod db;
mod integrations;
mod middleware;
mod utils;

use crate::api::auth::AuthDoc;
use crate::config::Config;
use crate::db::queries::accounting::AccountingDoc;
use crate::db::queries::application::ApplicationDoc;
use crate::db::queries::business_trip::BusinessTripDoc;
use crate::db::queries::document::DocumentDoc;
use crate::db::queries::expense_item::ExpenseItemDoc;
use crate::db::queries::notification::NotificationDoc;
use crate::db::queries::organization::OrganizationDoc;
use crate::db::queries::user::UserDoc;
use crate::db::queries::workflow::WorkflowDoc;
use crate::middleware::auth::{create_permission_cache, jwt_middleware, rbac_middleware};

#[tokio::main]
async fn main() {
    dotenv().ok();
    Config::init();

    std::fs::create_dir_all("logs").expect("Failed to create logs directory");

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true) // Include target (module path) in logs
        .with_writer(non_blocking)
        .init();

    let permission_cache = create_permission_cache();
    let pool = db::pool::get_db_pool().await;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    let merged_doc = AuthDoc::openapi()
        .merge_from(ApplicationDoc::openapi())
        .merge_from(ExpenseItemDoc::openapi())
        .merge_from(BusinessTripDoc::openapi())
        .merge_from(WorkflowDoc::openapi())
        .merge_from(NotificationDoc::openapi())
        .merge_from(AccountingDoc::openapi())
        .merge_from(OrganizationDoc::openapi())
        .merge_from(DocumentDoc::openapi())
        .merge_from(UserDoc::openapi());

    // Public routes
    let public_routes = Router::new().merge(api::auth::auth_routes());

    // Private routes
    let private_routes = Router::new()
        .merge(api::application::application_routes())
        .merge(api::notification::notification_routes())
        .merge(api::accounting::accounting_routes())
        .merge(api::organization::organization_routes())
        .merge(api::document::document_routes())
        .merge(api::user::user_routes())
        .route_layer(from_fn_with_state(pool.clone(), rbac_middleware))
        .route_layer(from_fn(jwt_middleware));

    let app = Router::new()
        .merge(api::health::health_routes())
        .merge(public_routes)
        .merge(private_routes)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", merged_doc.clone()))
        .merge(RapiDoc::with_openapi("/api-docs/rapidoc.json", merged_doc).path("/rapidoc"))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .layer(Extension(permission_cache.clone()))
        .with_state(pool.clone());

    run_server(app, pool).await;
    println!("Shutdown complete.");
}

async fn shutdown_signal(pool: PgPool) {
    signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");
    println!("Received Ctrl+C, shutting down...");
    println!("Closing database pool...");
    pool.close().await;
    println!("Database pool closed. Server shutting down.");
}

async fn run_server(app: Router, pool: PgPool) {
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    println!("Server running at http://{}", addr);

    let listener = TcpListener::bind(&addr).await.expect("Failed to bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(pool.clone()))
        .await
        .expect("Server encountered an error");
}
