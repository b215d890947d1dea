//! Caller identity from trusted proxy headers.
//!
//! Token verification happens upstream; by the time a request reaches us
//! the proxy has stamped the verified subject into `X-User-*` headers.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::domain::UserRole;
use crate::models::user::CallerIdentity;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Reads the identity headers. `None` when no subject is present.
#[must_use]
pub fn identity_from_headers(headers: &HeaderMap) -> Option<CallerIdentity> {
    let subject_id = header(headers, USER_ID_HEADER)?;
    Some(CallerIdentity {
        subject_id,
        email: header(headers, USER_EMAIL_HEADER).unwrap_or_default(),
        name: header(headers, USER_NAME_HEADER).unwrap_or_default(),
        role: header(headers, USER_ROLE_HEADER)
            .and_then(|r| r.parse().ok())
            .unwrap_or_default(),
    })
}

/// Rejects anonymous requests and makes the caller available to handlers
/// as `Extension<CallerIdentity>`.
///
/// The stored role is authoritative in addition to the header: a user
/// promoted through the admin API is an admin regardless of the proxy.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(mut identity) = identity_from_headers(request.headers()) else {
        return Err(ApiError::unauthorized("Missing caller identity"));
    };

    let user = state.shared.users.ensure_user(&identity).await?;
    if user.role == UserRole::Admin {
        identity.role = UserRole::Admin;
    }

    tracing::Span::current().record("user_id", identity.subject_id.as_str());
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Must run after [`auth_middleware`].
pub async fn admin_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = request
        .extensions()
        .get::<CallerIdentity>()
        .is_some_and(CallerIdentity::is_admin);

    if !is_admin {
        return Err(ApiError::forbidden("Admin role required"));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("auth0|42"));
        headers.insert(USER_EMAIL_HEADER, HeaderValue::from_static("a@b.c"));
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("Admin"));

        let identity = identity_from_headers(&headers).unwrap();
        assert_eq!(identity.subject_id, "auth0|42");
        assert_eq!(identity.email, "a@b.c");
        assert!(identity.is_admin());
    }

    #[test]
    fn missing_subject_is_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_EMAIL_HEADER, HeaderValue::from_static("a@b.c"));
        assert!(identity_from_headers(&headers).is_none());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        assert!(identity_from_headers(&headers).is_none());
    }

    #[test]
    fn unknown_role_defaults_to_user() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u1"));
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("superuser"));
        assert_eq!(identity_from_headers(&headers).unwrap().role, UserRole::User);
    }
}
