use axum::{
    extract::{Extension, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use validator::Validate;

use crate::{
    auth::{
        cache::AdvisoryProfile,
        service::{AuthSession, PostLoginRedirect, SignUpRequest, SignedIn},
    },
    errors::{AppError, AppResult},
    middleware::auth_guard::{
        clear_session_cookies, session_token, set_session_cookie, set_snapshot_cookie,
    },
    models::{ProfileFields, UserRole},
    state::AppState,
};

// ── Request / response types ──────────────────────────────────

#[derive(Deserialize, Validate)]
struct SignUpBody {
    #[validate(email(message = "Invalid email address"))]
    email:           String,
    #[validate(length(min = 1, message = "Password is required"))]
    password:        String,
    role:            UserRole,
    #[validate(length(max = 200))]
    full_name:       Option<String>,
    #[validate(length(max = 40))]
    phone:           Option<String>,
    #[validate(url)]
    avatar_url:      Option<String>,
    #[serde(rename = "redirectedFrom")]
    redirected_from: Option<String>,
}

#[derive(Deserialize, Validate)]
struct SignInBody {
    #[validate(length(min = 1, message = "Email is required"))]
    email:           String,
    #[validate(length(min = 1, message = "Password is required"))]
    password:        String,
    #[serde(rename = "redirectedFrom")]
    redirected_from: Option<String>,
}

#[derive(Serialize)]
struct AuthResponse {
    success:  bool,
    error:    Option<String>,
    redirect: PostLoginRedirect,
    #[serde(flatten)]
    snapshot: AdvisoryProfile,
}

#[derive(Serialize)]
struct SignOutResponse {
    success:     bool,
    redirect_to: &'static str,
}

#[derive(Serialize)]
struct RefreshResponse {
    success: bool,
    profile: Option<AdvisoryProfile>,
}

// ── Router ────────────────────────────────────────────────────

/// Routes that read the session cookie themselves.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/sign-up",  post(sign_up))
        .route("/auth/sign-in",  post(sign_in))
        .route("/auth/sign-out", post(sign_out))
        .route("/auth/me",       get(me))
}

/// Routes behind `optional_auth`.
pub fn session_router() -> Router<AppState> {
    Router::new().route("/auth/refresh-profile", post(refresh_profile))
}

// ── Handlers ──────────────────────────────────────────────────

/// POST /auth/sign-up — create identity and profile, then sign in. A session
/// this client already held is closed.
async fn sign_up(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(body): Json<SignUpBody>,
) -> AppResult<impl IntoResponse> {
    body.validate().map_err(|e| AppError::BadRequest(e.to_string()))?;

    let request = SignUpRequest {
        email:    body.email,
        password: body.password,
        role:     body.role,
        fields:   ProfileFields {
            full_name:  body.full_name,
            phone:      body.phone,
            avatar_url: body.avatar_url,
        },
    };
    let previous = session_token(&cookies);
    let signed_in = state
        .auth
        .sign_up(request, body.redirected_from.as_deref(), previous.as_deref())
        .await?;
    Ok(Json(establish(&state, &cookies, signed_in)))
}

/// POST /auth/sign-in — email + password. A previous session on this client
/// is closed only once the new one is open.
async fn sign_in(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(body): Json<SignInBody>,
) -> AppResult<impl IntoResponse> {
    body.validate().map_err(|e| AppError::BadRequest(e.to_string()))?;

    let previous = session_token(&cookies);
    let signed_in = state
        .auth
        .sign_in(
            &body.email,
            &body.password,
            body.redirected_from.as_deref(),
            previous.as_deref(),
        )
        .await?;
    Ok(Json(establish(&state, &cookies, signed_in)))
}

/// POST /auth/sign-out — always succeeds, with or without a session.
async fn sign_out(State(state): State<AppState>, cookies: Cookies) -> impl IntoResponse {
    let token = session_token(&cookies);
    let redirect_to = state.auth.sign_out(token.as_deref()).await;
    clear_session_cookies(&cookies);
    Json(SignOutResponse { success: true, redirect_to })
}

/// GET /auth/me — advisory view of the current user. A fresh cached snapshot
/// is answered immediately and reconciled in the background.
async fn me(State(state): State<AppState>, cookies: Cookies) -> AppResult<impl IntoResponse> {
    let token = session_token(&cookies).ok_or(AppError::Unauthorized)?;
    match state.auth.me(&token).await? {
        Some(view) => Ok(Json(view)),
        None => {
            clear_session_cookies(&cookies);
            Err(AppError::Unauthorized)
        }
    }
}

/// POST /auth/refresh-profile — re-read the profile row. No-op without a session.
async fn refresh_profile(
    State(state): State<AppState>,
    cookies: Cookies,
    session: Option<Extension<AuthSession>>,
) -> AppResult<impl IntoResponse> {
    let session = session.map(|Extension(s)| s);
    let profile = state.auth.refresh_profile(session.as_ref()).await?;
    if let Some(snapshot) = &profile {
        set_snapshot_cookie(&cookies, snapshot, state.config.session_days);
    }
    Ok(Json(RefreshResponse { success: true, profile }))
}

fn establish(state: &AppState, cookies: &Cookies, signed_in: SignedIn) -> AuthResponse {
    let days = state.config.session_days;
    set_session_cookie(cookies, &signed_in.session.token, days);
    set_snapshot_cookie(cookies, &signed_in.snapshot, days);
    AuthResponse {
        success:  true,
        error:    None,
        redirect: signed_in.redirect,
        snapshot: signed_in.snapshot,
    }
}
