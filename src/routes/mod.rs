use std::path::Path;

use axum::{middleware, Router};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::{
    middleware::{
        auth_guard::{optional_auth, require_auth},
        role_guard::{require_admin, require_vendor},
        route_guard::route_guard,
    },
    state::AppState,
};

mod auth;
mod bookings;
mod checkout;
mod webhook;

/// Build the `/api` router.
///
/// Auth and webhook routes are unprotected; checkout and profile refresh take
/// an optional session; everything else sits behind [`require_auth`], with
/// vendor and admin listings additionally behind their role guard.
pub fn api_routes(state: AppState) -> Router<AppState> {
    let auth_mw = middleware::from_fn_with_state(state.clone(), require_auth);
    let optional_mw = middleware::from_fn_with_state(state, optional_auth);
    Router::new()
        .merge(auth::router())
        .merge(webhook::router())
        .merge(
            Router::new()
                .merge(auth::session_router())
                .merge(checkout::public_router())
                .route_layer(optional_mw),
        )
        .merge(
            Router::new()
                .merge(checkout::router())
                .merge(bookings::router())
                .merge(bookings::vendor_router().route_layer(middleware::from_fn(require_vendor)))
                .merge(bookings::admin_router().route_layer(middleware::from_fn(require_admin)))
                .route_layer(auth_mw),
        )
}

/// The whole application: `/api`, then the static frontend behind the page
/// route guard.
pub fn app(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();
    let index = Path::new(&static_dir).join("index.html");
    let frontend = ServeDir::new(&static_dir).fallback(ServeFile::new(index));

    Router::new()
        .nest("/api", api_routes(state.clone()))
        .fallback_service(frontend)
        .layer(middleware::from_fn_with_state(state.clone(), route_guard))
        .layer(CookieManagerLayer::new())   // must wrap both guards
        .layer(CorsLayer::permissive())     // tighten in production
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::{
        auth::service::SignUpRequest,
        bookings::lifecycle::tests::booking,
        config::Config,
        models::{BookingStatus, ProfileFields, UserRole},
        payments::{fake::FakeGateway, signature::sign},
        state::Stores,
        store::memory::MemoryStore,
    };

    fn state_with(store: &Arc<MemoryStore>) -> AppState {
        AppState::new(
            Config::for_tests(),
            Stores {
                identity: store.clone(),
                profiles: store.clone(),
                services: store.clone(),
                bookings: store.clone(),
            },
            Arc::new(FakeGateway::default()),
        )
    }

    /// Signs a user up through the service and returns the session cookie.
    async fn signed_up(state: &AppState, email: &str, role: UserRole) -> (Uuid, String) {
        let signed_in = state
            .auth
            .sign_up(
                SignUpRequest {
                    email:    email.into(),
                    password: "Sunset42".into(),
                    role,
                    fields:   ProfileFields::default(),
                },
                None,
                None,
            )
            .await
            .unwrap();
        (signed_in.session.user.id, format!("session={}", signed_in.session.token))
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn send_json(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn location(resp: &Response) -> &str {
        resp.headers().get(header::LOCATION).unwrap().to_str().unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn anonymous_page_request_redirects_to_login() {
        let store = Arc::new(MemoryStore::new());
        let resp = app(state_with(&store)).oneshot(get("/explore", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/login?redirectedFrom=%2Fexplore");
    }

    #[tokio::test]
    async fn guests_are_kept_out_of_admin_pages() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(&store);
        let (_, cookie) = signed_up(&state, "ana@hotel.test", UserRole::Guest).await;

        let resp = app(state.clone()).oneshot(get("/admin/dashboard", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/403");

        let resp = app(state).oneshot(get("/login", Some(&cookie))).await.unwrap();
        assert_eq!(location(&resp), "/explore");
    }

    #[tokio::test]
    async fn session_without_profile_is_signed_out() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(&store);
        let (user_id, cookie) = signed_up(&state, "lost@hotel.test", UserRole::Vendor).await;
        store.remove_profile(user_id);

        let resp = app(state).oneshot(get("/vendor/dashboard", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/login");
        assert_eq!(store.session_count(), 0);
        let cleared: Vec<_> = resp.headers().get_all(header::SET_COOKIE).iter().collect();
        assert!(cleared.iter().any(|c| c.to_str().unwrap().starts_with("session=")));
    }

    #[tokio::test]
    async fn sign_in_sets_cookies_and_redirect() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(&store);
        signed_up(&state, "vendor@hotel.test", UserRole::Vendor).await;

        let resp = app(state)
            .oneshot(send_json(
                "POST",
                "/api/auth/sign-in",
                None,
                json!({
                    "email": "vendor@hotel.test",
                    "password": "Sunset42",
                    "redirectedFrom": "/vendor/services/edit/3",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cookies: Vec<String> = resp
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|c| c.to_str().unwrap().to_owned())
            .collect();
        assert!(cookies.iter().any(|c| c.starts_with("session=") && c.contains("HttpOnly")));
        assert!(cookies.iter().any(|c| c.starts_with("profile_snapshot=")));

        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["redirect"]["to"], "/vendor/services/edit/3");
        assert_eq!(body["redirect"]["delay_ms"], 200);
        assert_eq!(body["profile"]["role"], "vendor");
    }

    #[tokio::test]
    async fn bad_credentials_are_a_structured_401() {
        let store = Arc::new(MemoryStore::new());
        let resp = app(state_with(&store))
            .oneshot(send_json(
                "POST",
                "/api/auth/sign-in",
                None,
                json!({ "email": "nobody@hotel.test", "password": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "invalid_credentials");
    }

    #[tokio::test]
    async fn sign_out_without_session_still_succeeds() {
        let store = Arc::new(MemoryStore::new());
        let resp = app(state_with(&store))
            .oneshot(send_json("POST", "/api/auth/sign-out", None, json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["redirect_to"], "/");
    }

    #[tokio::test]
    async fn api_guards_answer_json_not_redirects() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(&store);

        let resp = app(state.clone()).oneshot(get("/api/bookings", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let (_, cookie) = signed_up(&state, "ana@hotel.test", UserRole::Guest).await;
        let resp = app(state.clone()).oneshot(get("/api/vendor/bookings", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let resp = app(state.clone()).oneshot(get("/api/admin/bookings", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app(state).oneshot(get("/api/bookings", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!([]));
    }

    #[tokio::test]
    async fn webhook_creates_one_booking_per_session() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(&store);
        let (user_id, _) = signed_up(&state, "ana@hotel.test", UserRole::Guest).await;
        let payload = json!({
            "id": "evt_9",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_live_9",
                "payment_intent": "pi_9",
                "amount_total": 5800,
                "currency": "usd",
                "metadata": { "serviceId": Uuid::new_v4(), "userId": user_id },
            }}
        })
        .to_string();
        let deliver = |sig: String| {
            Request::builder()
                .method("POST")
                .uri("/api/stripe/webhook")
                .header("stripe-signature", sig)
                .body(Body::from(payload.clone()))
                .unwrap()
        };
        let signature = sign(payload.as_bytes(), "whsec_test", Utc::now().timestamp());

        let first = app(state.clone()).oneshot(deliver(signature.clone())).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(body_json(first).await["duplicate"], false);

        let second = app(state.clone()).oneshot(deliver(signature)).await.unwrap();
        assert_eq!(body_json(second).await["duplicate"], true);
        assert_eq!(store.booking_count(), 1);

        let forged = app(state).oneshot(deliver("t=1,v1=00".into())).await.unwrap();
        assert_eq!(forged.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.booking_count(), 1);
    }

    #[tokio::test]
    async fn status_changes_follow_the_transition_table() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(&store);
        let (guest_id, guest_cookie) = signed_up(&state, "ana@hotel.test", UserRole::Guest).await;
        let (_, admin_cookie) = signed_up(&state, "boss@hotel.test", UserRole::Admin).await;

        let row = booking(guest_id, Uuid::new_v4(), BookingStatus::Confirmed);
        store.add_booking(row.clone());

        // Guests may not set arbitrary statuses.
        let uri = format!("/api/bookings/{}/status", row.id);
        let resp = app(state.clone())
            .oneshot(send_json("PATCH", &uri, Some(&guest_cookie), json!({ "status": "completed" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app(state.clone())
            .oneshot(send_json("PATCH", &uri, Some(&admin_cookie), json!({ "status": "completed" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "completed");

        let resp = app(state.clone())
            .oneshot(send_json("PATCH", &uri, Some(&admin_cookie), json!({ "status": "pending" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let cancel = format!("/api/bookings/{}/cancel", row.id);
        let resp = app(state)
            .oneshot(send_json("POST", &cancel, Some(&guest_cookie), json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(store.bookings()[0].status, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn owner_can_cancel_an_open_booking() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(&store);
        let (guest_id, cookie) = signed_up(&state, "ana@hotel.test", UserRole::Guest).await;
        let (_, other) = signed_up(&state, "eve@hotel.test", UserRole::Guest).await;
        let row = booking(guest_id, Uuid::new_v4(), BookingStatus::Pending);
        store.add_booking(row.clone());
        let cancel = format!("/api/bookings/{}/cancel", row.id);

        let resp = app(state.clone())
            .oneshot(send_json("POST", &cancel, Some(&other), json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app(state.clone())
            .oneshot(send_json("POST", &cancel, Some(&cookie), json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "canceled");

        let resp = app(state)
            .oneshot(get(&format!("/api/bookings/{}", row.id), Some(&other)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
