use crate::db::queries::organization::{
    add_member, create_organization, get_accounting_config, get_organization, remove_member,
    upsert_accounting_config,
};
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;

pub fn organization_routes() -> Router<PgPool> {
    Router::new()
        .route("/organizations", post(create_organization))
        .route("/organizations/{id}", get(get_organization))
        .route("/organizations/{id}/members", post(add_member))
        .route(
            "/organizations/{id}/members/{user_id}",
            delete(remove_member),
        )
        .route(
            "/organizations/{id}/accounting",
            put(upsert_accounting_config).get(get_accounting_config),
        )
}
