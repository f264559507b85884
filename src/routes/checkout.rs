use axum::{
    extract::{Extension, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::service::AuthSession,
    errors::{AppError, AppResult},
    state::AppState,
};

#[derive(Deserialize)]
struct CheckoutBody {
    service_id:   Uuid,
    booking_date: Option<NaiveDate>,
}

#[derive(Deserialize, Validate)]
struct ConfirmBody {
    #[validate(length(min = 1, max = 255))]
    session_id:   String,
    service_id:   Uuid,
    booking_date: Option<NaiveDate>,
}

#[derive(Serialize)]
struct ConfirmResponse {
    success:    bool,
    booking_id: Uuid,
    duplicate:  bool,
}

/// Routes behind `optional_auth`: anonymous callers may pay as guests.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/checkout", post(create_checkout))
}

/// Routes behind `require_auth`.
pub fn router() -> Router<AppState> {
    Router::new().route("/checkout/confirm", post(confirm_checkout))
}

/// POST /checkout — open a hosted checkout for one service.
async fn create_checkout(
    State(state): State<AppState>,
    session: Option<Extension<AuthSession>>,
    Json(body): Json<CheckoutBody>,
) -> AppResult<impl IntoResponse> {
    let caller = session.as_ref().map(|Extension(s)| s);
    let started = state
        .checkout
        .create_checkout_session(caller, body.service_id, body.booking_date)
        .await?;
    Ok(Json(started))
}

/// POST /checkout/confirm — success-page fallback when the webhook is late.
async fn confirm_checkout(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<ConfirmBody>,
) -> AppResult<impl IntoResponse> {
    body.validate().map_err(|e| AppError::BadRequest(e.to_string()))?;
    let outcome = state
        .checkout
        .confirm_from_session(&session, &body.session_id, body.service_id, body.booking_date)
        .await?;
    Ok(Json(ConfirmResponse {
        success:    true,
        booking_id: outcome.booking().id,
        duplicate:  outcome.is_duplicate(),
    }))
}
