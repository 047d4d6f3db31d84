use crate::db::queries::application::{
    create_application, delete_application, get_application, list_applications,
    submit_application, update_application,
};
use crate::db::queries::business_trip::{get_trip_detail, upsert_trip_detail};
use crate::db::queries::document::generate_document;
use crate::db::queries::expense_item::{
    add_expense_item, delete_expense_item, get_receipt, list_expense_items, update_expense_item,
    upload_receipt,
};
use crate::db::queries::workflow::{decide_application, list_approvals};
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;

pub fn application_routes() -> Router<PgPool> {
    Router::new()
        .route("/applications", post(create_application).get(list_applications))
        .route(
            "/applications/{id}",
            get(get_application)
                .patch(update_application)
                .delete(delete_application),
        )
        .route("/applications/{id}/submit", post(submit_application))
        .route("/applications/{id}/decision", post(decide_application))
        .route("/applications/{id}/approvals", get(list_approvals))
        .route(
            "/applications/{id}/items",
            post(add_expense_item).get(list_expense_items),
        )
        .route(
            "/applications/{id}/items/{item_id}",
            axum::routing::patch(update_expense_item).delete(delete_expense_item),
        )
        .route(
            "/applications/{id}/items/{item_id}/receipt",
            post(upload_receipt).get(get_receipt),
        )
        .route(
            "/applications/{id}/trip",
            put(upsert_trip_detail).get(get_trip_detail),
        )
        .route("/applications/{id}/document", post(generate_document))
}
