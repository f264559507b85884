use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::{bookings::WebhookAck, state::AppState};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/stripe/webhook", post(stripe_webhook))
}

/// POST /stripe/webhook — signed provider events. The signature is the only
/// authentication. Non-2xx answers make the provider redeliver, so only store
/// failures answer 500; bad signatures and malformed events answer 400.
async fn stripe_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match state.checkout.handle_webhook(&body, signature, Utc::now()).await {
        Ok(WebhookAck::Ignored { .. }) => Json(json!({ "received": true })).into_response(),
        Ok(WebhookAck::Booked { booking_id, duplicate }) => Json(json!({
            "received":   true,
            "booking_id": booking_id,
            "duplicate":  duplicate,
        }))
        .into_response(),
        Err(err) if err.is_retryable() => {
            tracing::error!(error = %err, "Webhook processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Failed to create booking" })))
                .into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err, "Webhook rejected");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() }))).into_response()
        }
    }
}
