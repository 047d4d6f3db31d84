use axum::{
    body::Body,
    extract::{Extension, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use moka::sync::Cache; // ✅ High-performance TTL Cache
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::api::auth::Claims;
use crate::config::Config;
use crate::utils::api_response::ApiResponse;

/// ✅ **Organization permission cache using `moka`**
pub type PermissionCache = Arc<Cache<i32, OrgPermissions>>;

/// ✅ **Initialize the `moka` Cache**
pub fn create_permission_cache() -> PermissionCache {
    Arc::new(
        Cache::builder()
            .time_to_live(Duration::from_secs(600)) // ✅ TTL = 10 minutes
            .build(),
    )
}

/// ✅ **JWT Middleware** (Handles Token Authentication)
pub async fn jwt_middleware(mut req: Request<Body>, next: Next) -> Result<Response, Response> {
    let auth_header = req.headers().get("Authorization").ok_or_else(|| {
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Missing Authorization header", None)
            .into_response()
    })?;

    let token_str = auth_header.to_str().map_err(|_| {
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Invalid Authorization header format",
            None,
        )
        .into_response()
    })?;

    let token = token_str.strip_prefix("Bearer ").ok_or_else(|| {
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Invalid token format (missing 'Bearer ' prefix)",
            None,
        )
        .into_response()
    })?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(Config::get().jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Invalid token",
            Some(json!({ "error": e.to_string() })),
        )
        .into_response()
    })?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// Per-user view of organization membership, cached for the RBAC layer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrgPermissions {
    pub user_id: i32,
    pub global_role: String,
    /// Organization ID -> role (`member`, `approver`, `admin`)
    pub organizations: HashMap<i32, String>,
}

impl OrgPermissions {
    /// ✅ **Check if user is a system-wide administrator**
    pub fn is_admin(&self) -> bool {
        self.global_role == "admin"
    }

    /// ✅ **Check if user belongs to an organization (any role)**
    pub fn is_member(&self, organization_id: i32) -> bool {
        self.is_admin() || self.organizations.contains_key(&organization_id)
    }

    /// ✅ **Check if user administers an organization**
    pub fn is_org_admin(&self, organization_id: i32) -> bool {
        self.is_admin()
            || matches!(self.organizations.get(&organization_id), Some(role) if role == "admin")
    }

    /// ✅ **Check if user may record workflow decisions for an organization**
    pub fn can_decide(&self, organization_id: i32) -> bool {
        self.is_admin()
            || matches!(
                self.organizations.get(&organization_id),
                Some(role) if role == "approver" || role == "admin"
            )
    }
}

/// ✅ **RBAC Middleware with `moka`**
pub async fn rbac_middleware(
    State(db_pool): State<PgPool>,
    Extension(permission_cache): Extension<PermissionCache>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let claims = req.extensions().get::<Claims>().cloned().ok_or_else(|| {
        error!("Missing JWT claims in request");
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Missing JWT claims in request", None)
            .into_response()
    })?;

    let user_id: i32 = claims.sub.parse().map_err(|_| {
        error!("Invalid user ID format in JWT claims");
        ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Invalid user ID format in JWT claims",
            None,
        )
        .into_response()
    })?;

    // ✅ **Check cache first before querying DB**
    if let Some(cached_permissions) = permission_cache.get(&user_id) {
        req.extensions_mut().insert(cached_permissions.clone());
        return Ok(next.run(req).await);
    }

    let permissions = match fetch_org_permissions(user_id, &db_pool).await {
        Ok(permissions) => permissions,
        Err(err) => {
            error!("Database query failed: {:?}", err);
            return Err(ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load user permissions",
                Some(json!({ "error": err.to_string() })),
            )
            .into_response());
        }
    };

    permission_cache.insert(user_id, permissions.clone());
    req.extensions_mut().insert(permissions);
    Ok(next.run(req).await)
}

/// ✅ **Query Database for membership data**
async fn fetch_org_permissions(
    user_id: i32,
    pool: &PgPool,
) -> Result<OrgPermissions, sqlx::Error> {
    let rows: Vec<(String, Option<i32>, Option<String>)> = sqlx::query_as(
        r#"
        SELECT u.role AS global_role, om.organization_id, om.role AS org_role
        FROM users u
        LEFT JOIN organization_members om ON om.user_id = u.id
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let global_role = rows
        .first()
        .map_or("user".to_string(), |(role, _, _)| role.clone());

    let organizations = rows
        .into_iter()
        .filter_map(|(_, org_id, org_role)| Some((org_id?, org_role?)))
        .collect();

    Ok(OrgPermissions {
        user_id,
        global_role,
        organizations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(global_role: &str, orgs: &[(i32, &str)]) -> OrgPermissions {
        OrgPermissions {
            user_id: 1,
            global_role: global_role.to_string(),
            organizations: orgs
                .iter()
                .map(|(id, role)| (*id, role.to_string()))
                .collect(),
        }
    }

    #[test]
    fn approver_can_decide_only_in_own_org() {
        let p = perms("user", &[(10, "approver"), (11, "member")]);
        assert!(p.can_decide(10));
        assert!(!p.can_decide(11));
        assert!(!p.can_decide(12));
        assert!(!p.is_org_admin(10));
    }

    #[test]
    fn global_admin_bypasses_membership() {
        let p = perms("admin", &[]);
        assert!(p.is_member(5));
        assert!(p.can_decide(5));
        assert!(p.is_org_admin(5));
    }
}
