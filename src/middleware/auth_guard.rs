//! Authentication guard middleware for the JSON API.
//!
//! Reads the `session` cookie, resolves it through the auth service (identity
//! provider plus a fresh profile read) and injects the resulting
//! `AuthSession` into the request for downstream handlers.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tower_cookies::{
    cookie::{time::Duration as CookieDuration, SameSite},
    Cookie, Cookies,
};

use crate::{
    auth::{
        cache::{AdvisoryProfile, SNAPSHOT_COOKIE},
        service::AuthError,
    },
    errors::AppError,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "session";

pub fn session_token(cookies: &Cookies) -> Option<String> {
    cookies
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_owned())
        .filter(|v| !v.is_empty())
}

/// Middleware: require a live session whose profile carries a role.
/// On success, inserts `AuthSession` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(&cookies).ok_or(AppError::Unauthorized)?;
    let session = match state.auth.current(&token).await {
        Ok(Some(session)) => session,
        Ok(None) | Err(AuthError::ProfileUnavailable) => return Err(AppError::Unauthorized),
        Err(err) => return Err(err.into()),
    };
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Middleware: like `require_auth`, but anonymous requests pass through
/// without an `AuthSession`.
pub async fn optional_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = session_token(&cookies) {
        match state.auth.current(&token).await {
            Ok(Some(session)) => {
                req.extensions_mut().insert(session);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "Ignoring unusable session"),
        }
    }
    next.run(req).await
}

// ── Cookies ──────────────────────────────────────────────────

/// Lax rather than Strict: the payment provider redirects back to the
/// profile page and that top-level navigation must carry the session.
pub fn set_session_cookie(cookies: &Cookies, token: &str, days: i64) {
    let cookie = Cookie::build((SESSION_COOKIE, token.to_owned()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(CookieDuration::days(days))
        .build();
    cookies.add(cookie);
}

/// Client-readable copy of the advisory snapshot, for optimistic rendering.
pub fn set_snapshot_cookie(cookies: &Cookies, snapshot: &AdvisoryProfile, days: i64) {
    let value = match snapshot.to_cookie_value() {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "Could not encode profile snapshot");
            return;
        }
    };
    let cookie = Cookie::build((SNAPSHOT_COOKIE, value))
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(CookieDuration::days(days))
        .build();
    cookies.add(cookie);
}

pub fn clear_session_cookies(cookies: &Cookies) {
    for name in [SESSION_COOKIE, SNAPSHOT_COOKIE] {
        let cookie = Cookie::build((name, ""))
            .path("/")
            .max_age(CookieDuration::ZERO)
            .build();
        cookies.add(cookie);
    }
}
