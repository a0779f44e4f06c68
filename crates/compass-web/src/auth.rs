//! Request authentication.
//!
//! Handlers take [`AuthContext`] or [`AdminContext`] as extractors. Both run before the
//! request body is parsed, so a rejected caller never sees validation errors.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::state::SharedState;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_id: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing or invalid authorization header")]
    MissingCredentials,

    #[error("Invalid token")]
    InvalidToken(String),

    #[error("Admin access required")]
    AdminRequired,

    #[error("Failed to verify admin status")]
    AdminCheck(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingCredentials | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::AdminRequired => StatusCode::FORBIDDEN,
            AuthError::AdminCheck(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
    pub exp: usize,
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError>;
}

/// HS256 bearer tokens signed with a shared secret.
pub struct BearerTokenAuth {
    key: DecodingKey,
    validation: Validation,
}

impl BearerTokenAuth {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation }
    }
}

impl Authenticator for BearerTokenAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredentials)?;

        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let claims = data.claims;
        Ok(AuthContext {
            user_id: claims.sub,
            email: claims.email,
            roles: claims.realm_access.map(|r| r.roles).unwrap_or_default(),
        })
    }
}

/// Development mode: the caller names itself with `x-user-id` and `x-user-email`.
pub struct DevHeaderAuth;

impl Authenticator for DevHeaderAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let value = |name: &str| headers.get(name).and_then(|h| h.to_str().ok()).filter(|v| !v.is_empty());
        match (value("x-user-id"), value("x-user-email")) {
            (Some(id), Some(email)) => {
                Ok(AuthContext { user_id: id.to_string(), email: Some(email.to_string()), roles: Vec::new() })
            }
            _ => Err(AuthError::MissingCredentials),
        }
    }
}

/// First strategy to accept wins. A rejected credential is reported in preference to
/// a missing one.
pub struct MultiAuth {
    strategies: Vec<Arc<dyn Authenticator>>,
}

impl MultiAuth {
    pub fn new(strategies: Vec<Arc<dyn Authenticator>>) -> Self {
        Self { strategies }
    }
}

impl Authenticator for MultiAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let mut rejection = AuthError::MissingCredentials;
        for strategy in &self.strategies {
            match strategy.authenticate(headers) {
                Ok(ctx) => return Ok(ctx),
                Err(AuthError::MissingCredentials) => {}
                Err(e) => rejection = e,
            }
        }
        Err(rejection)
    }
}

impl FromRequestParts<SharedState> for AuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        state.authenticator.authenticate(&parts.headers).map_err(|e| {
            if let AuthError::InvalidToken(reason) = &e {
                warn!(reason = %reason, "Token validation failed");
            }
            e
        })
    }
}

/// Admin is a configured admin email, the `admin` realm role, or `is_admin` on the
/// stored user profile.
pub async fn check_admin(state: &SharedState, ctx: &AuthContext) -> Result<(), AuthError> {
    let listed = ctx
        .email
        .as_deref()
        .is_some_and(|email| state.admin_emails.iter().any(|a| a.eq_ignore_ascii_case(email)));
    if listed || ctx.roles.iter().any(|r| r == "admin") {
        return Ok(());
    }

    match state.users.is_admin(&ctx.user_id).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            debug!(user = %ctx.user_id, "Admin access denied");
            Err(AuthError::AdminRequired)
        }
        Err(e) => {
            error!(user = %ctx.user_id, error = %e, "Admin lookup failed");
            Err(AuthError::AdminCheck(e.to_string()))
        }
    }
}

/// An authenticated caller that passed [`check_admin`].
#[derive(Debug, Clone)]
pub struct AdminContext(pub AuthContext);

impl FromRequestParts<SharedState> for AdminContext {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let ctx = AuthContext::from_request_parts(parts, state).await?;
        check_admin(state, &ctx).await?;
        Ok(AdminContext(ctx))
    }
}
