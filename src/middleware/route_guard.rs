//! Page route guard.
//!
//! `decide` is a pure function of the caller's session state, the requested
//! path and the `redirectedFrom` hint. `route_guard` is the axum middleware
//! that gathers those inputs for every non-API request and turns the decision
//! into a `303 See Other`.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_cookies::Cookies;

use crate::{
    auth::{
        destination::{
            is_under, post_login_destination, role_home, ADMIN_PRE_REGISTER, EXPLORE, FORBIDDEN,
            GUEST_REGISTER, HOME, LOGIN, VENDOR_PRE_REGISTER,
        },
        role::SessionState,
    },
    middleware::auth_guard::{clear_session_cookies, session_token},
    models::UserRole,
    state::AppState,
};

pub const REDIRECTED_FROM_PARAM: &str = "redirectedFrom";

const FRAMEWORK_PREFIXES: [&str; 3] = ["/_next", "/assets", "/favicon.ico"];
const API_PREFIX: &str = "/api";
const SERVICES_PREFIX: &str = "/services";
const ENTRY_PAGES: [&str; 4] = [LOGIN, GUEST_REGISTER, ADMIN_PRE_REGISTER, VENDOR_PRE_REGISTER];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardInput<'a> {
    pub session:         SessionState,
    pub path:            &'a str,
    pub redirected_from: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Anonymous caller on a protected page; the path comes back as `redirectedFrom`.
    RedirectToLogin { redirected_from: String },
    /// Live session without a resolvable role: end it, then log in again.
    SignOutAndLogin,
    Forbidden,
    RedirectTo(String),
}

/// API routes, framework assets and root-level static files are never
/// redirected.
pub fn is_passthrough(path: &str) -> bool {
    is_under(path, API_PREFIX)
        || FRAMEWORK_PREFIXES.iter().any(|p| is_under(path, p))
        || is_root_file(path)
}

/// `/robots.txt`, `/logo.png` and the like, served straight from `STATIC_DIR`.
fn is_root_file(path: &str) -> bool {
    let Some(name) = path.strip_prefix('/') else {
        return false;
    };
    !name.contains('/')
        && name
            .rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
}

pub fn is_public(path: &str) -> bool {
    path == HOME
        || ENTRY_PAGES.contains(&path)
        || is_under(path, SERVICES_PREFIX)
        || is_passthrough(path)
}

pub fn decide(input: &GuardInput<'_>) -> GuardDecision {
    let path = input.path;
    if is_passthrough(path) {
        return GuardDecision::Allow;
    }

    let role = match input.session {
        SessionState::Anonymous if is_public(path) => return GuardDecision::Allow,
        SessionState::Anonymous => {
            return GuardDecision::RedirectToLogin { redirected_from: path.to_owned() };
        }
        SessionState::Unresolvable => return GuardDecision::SignOutAndLogin,
        SessionState::Authenticated(role) => role.role(),
    };

    if is_under(path, "/admin") && !is_under(path, ADMIN_PRE_REGISTER) && role != UserRole::Admin {
        return GuardDecision::Forbidden;
    }
    if is_under(path, "/vendor") && !is_under(path, VENDOR_PRE_REGISTER) && role != UserRole::Vendor {
        return GuardDecision::Forbidden;
    }

    if ENTRY_PAGES.contains(&path) {
        return GuardDecision::RedirectTo(post_login_destination(Some(role), input.redirected_from));
    }

    if matches!(role, UserRole::Admin | UserRole::Vendor) && (path == EXPLORE || path == HOME) {
        return GuardDecision::RedirectTo(role_home(Some(role)).to_owned());
    }

    GuardDecision::Allow
}

fn redirected_from_hint(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == REDIRECTED_FROM_PARAM)
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
}

pub fn login_redirect_target(redirected_from: &str) -> String {
    format!("{LOGIN}?{REDIRECTED_FROM_PARAM}={}", urlencoding::encode(redirected_from))
}

/// Middleware: applies `decide` to every page request.
pub async fn route_guard(
    State(state): State<AppState>,
    cookies: Cookies,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    if is_passthrough(&path) {
        return next.run(req).await;
    }

    let token = session_token(&cookies);
    let session = state.auth.session_state(token.as_deref()).await;
    let hint = redirected_from_hint(req.uri().query());
    let decision = decide(&GuardInput {
        session,
        path: &path,
        redirected_from: hint.as_deref(),
    });

    match decision {
        GuardDecision::Allow => next.run(req).await,
        GuardDecision::RedirectToLogin { redirected_from } => {
            tracing::debug!(%path, "No session, redirecting to login");
            Redirect::to(&login_redirect_target(&redirected_from)).into_response()
        }
        GuardDecision::SignOutAndLogin => {
            tracing::warn!(%path, "Session has no resolvable role, signing out");
            state.auth.sign_out(token.as_deref()).await;
            clear_session_cookies(&cookies);
            Redirect::to(LOGIN).into_response()
        }
        GuardDecision::Forbidden => {
            tracing::debug!(%path, ?session, "Role does not own this path");
            Redirect::to(FORBIDDEN).into_response()
        }
        GuardDecision::RedirectTo(target) => {
            tracing::debug!(%path, %target, "Redirecting authenticated user");
            Redirect::to(&target).into_response()
        }
    }
}
