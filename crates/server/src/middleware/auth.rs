//! Caller resolution and operator authentication

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::error::AppError;

/// Header identifying an API caller
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Header authenticating an operator on the admin routes
pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// Resolve `X-API-Key` to a registered user and attach it as the request's actor.
///
/// Requests without the header continue anonymously; an unknown key is rejected.
pub async fn actor_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(raw) = request.headers().get(API_KEY_HEADER) else {
        return next.run(request).await;
    };
    let Ok(key) = raw.to_str() else {
        return AppError::Unauthorized("Malformed API key".to_string()).into_response();
    };

    match state.store.find_user_by_api_key(key).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(user.actor());
            next.run(request).await
        }
        Ok(None) => AppError::Unauthorized("Invalid API key".to_string()).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to resolve API key");
            AppError::Internal("Could not resolve caller".to_string()).into_response()
        }
    }
}

/// Admin key authentication state
#[derive(Clone)]
pub struct AdminAuth {
    api_key: Option<String>,
}

impl AdminAuth {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    /// Open access when no key is configured.
    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        match &self.api_key {
            Some(expected) => headers
                .get(ADMIN_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|provided| provided == expected),
            None => true,
        }
    }
}

/// Middleware guarding the admin routes
pub async fn admin_auth_middleware(request: Request<Body>, next: Next) -> Response {
    let authorized = request
        .extensions()
        .get::<AdminAuth>()
        .is_none_or(|auth| auth.is_authorized(request.headers()));

    if !authorized {
        return AppError::Unauthorized("Missing or invalid admin key".to_string()).into_response();
    }

    next.run(request).await
}
