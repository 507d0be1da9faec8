use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;
use wingdesk_core::Permission;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StaffClaims {
    /// Staff user id, recorded as the actor of every mutation.
    pub sub: Uuid,
    pub email: Option<String>,
    pub role: String,
    pub permissions: Vec<String>,
    pub exp: usize,
}

impl StaffClaims {
    pub fn has_permission(&self, permission: Permission) -> bool {
        Permission::parse_all(self.permissions.iter().map(String::as_str)).contains(&permission)
    }

    /// The staff id, if the token carries `permission`.
    pub fn require(&self, permission: Permission) -> Result<Uuid, AppError> {
        if self.has_permission(permission) {
            Ok(self.sub)
        } else {
            warn!(staff = %self.sub, permission = permission.as_str(), "Permission denied");
            Err(AppError::AuthorizationError(format!(
                "missing permission {}",
                permission.as_str()
            )))
        }
    }
}

// ============================================================================
// Staff Authentication Middleware
// ============================================================================

pub async fn staff_auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| AppError::AuthenticationError("missing bearer token".to_string()))?;

    let token_data = decode::<StaffClaims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(format!("invalid token: {}", e)))?;

    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}
