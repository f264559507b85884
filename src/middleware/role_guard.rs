//! Role-based authorization guards. Layered after `require_auth`; they only
//! ever look at the role read from the profile store for this request.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};

use crate::{auth::service::AuthSession, errors::AppError, models::UserRole};

/// Middleware: require the `admin` role.
pub async fn require_admin(
    Extension(session): Extension<AuthSession>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !session.role.is(UserRole::Admin) {
        return Err(AppError::Forbidden);
    }
    Ok(next.run(req).await)
}

/// Middleware: require the `vendor` role.
pub async fn require_vendor(
    Extension(session): Extension<AuthSession>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !session.role.is(UserRole::Vendor) {
        return Err(AppError::Forbidden);
    }
    Ok(next.run(req).await)
}
