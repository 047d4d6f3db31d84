use crate::db::queries::document::fetch_document;
use axum::{routing::get, Router};
use sqlx::PgPool;

pub fn document_routes() -> Router<PgPool> {
    Router::new().route("/documents/{*path}", get(fetch_document))
}
