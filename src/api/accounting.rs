use crate::db::queries::accounting::{list_integration_logs, retry_sync};
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

pub fn accounting_routes() -> Router<PgPool> {
    Router::new()
        .route(
            "/organizations/{id}/accounting/logs",
            get(list_integration_logs),
        )
        .route("/accounting/logs/{id}/retry", post(retry_sync))
}
