use axum::{
    extract::{Extension, Path, State},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::service::AuthSession,
    bookings::lifecycle::{can_cancel, can_set_status, can_view},
    errors::{AppError, AppResult},
    models::BookingStatus,
    state::AppState,
};

#[derive(Deserialize)]
struct StatusBody {
    status: BookingStatus,
}

/// Routes behind `require_auth`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings",             get(my_bookings))
        .route("/bookings/{id}",        get(get_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
        .route("/bookings/{id}/status", patch(update_status))
}

/// Routes behind `require_auth` + `require_vendor`.
pub fn vendor_router() -> Router<AppState> {
    Router::new().route("/vendor/bookings", get(vendor_bookings))
}

/// Routes behind `require_auth` + `require_admin`.
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/admin/bookings", get(all_bookings))
}

/// GET /bookings — the caller's bookings, newest first. Never an error.
async fn my_bookings(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> impl IntoResponse {
    Json(state.bookings.user_bookings(session.user.id).await)
}

/// GET /bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let details = state.bookings.booking(id).await?;
    if !can_view(&details, &session) {
        return Err(AppError::Forbidden);
    }
    Ok(Json(details))
}

/// POST /bookings/{id}/cancel — owner or admin.
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let details = state.bookings.booking(id).await?;
    if !can_cancel(&details, &session) {
        return Err(AppError::Forbidden);
    }
    Ok(Json(state.bookings.cancel(id).await?))
}

/// PATCH /bookings/{id}/status — vendor of the service or admin.
async fn update_status(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> AppResult<impl IntoResponse> {
    let details = state.bookings.booking(id).await?;
    if !can_set_status(&details, &session) {
        return Err(AppError::Forbidden);
    }
    Ok(Json(state.bookings.update_status(id, body.status).await?))
}

/// GET /vendor/bookings — bookings of the caller's services.
async fn vendor_bookings(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> impl IntoResponse {
    Json(state.bookings.vendor_bookings(session.user.id).await)
}

/// GET /admin/bookings
async fn all_bookings(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bookings.all_bookings().await)
}
