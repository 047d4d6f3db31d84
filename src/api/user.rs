use crate::db::queries::user::{get_me, update_me};
use axum::{routing::get, Router};
use sqlx::PgPool;

pub fn user_routes() -> Router<PgPool> {
    Router::new().route("/users/me", get(get_me).patch(update_me))
}
