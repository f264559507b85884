//! Shared application state, injected into every handler via `axum::extract::State`.

use std::sync::Arc;

use chrono::Duration;

use crate::{
    auth::{
        cache::SessionCache,
        service::{AuthService, AuthSettings},
    },
    bookings::{BookingLifecycle, CheckoutOrchestrator, CheckoutSettings},
    config::Config,
    payments::PaymentGateway,
    store::{BookingStore, IdentityProvider, ProfileStore, ServiceCatalog},
};

/// Every field is `Arc`-backed or small, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config:   Config,
    pub auth:     AuthService,
    pub bookings: BookingLifecycle,
    pub checkout: CheckoutOrchestrator,
}

/// The concrete stores behind the service seams.
pub struct Stores {
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub services: Arc<dyn ServiceCatalog>,
    pub bookings: Arc<dyn BookingStore>,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, gateway: Arc<dyn PaymentGateway>) -> Self {
        let cache = Arc::new(SessionCache::new(Duration::seconds(config.profile_cache_ttl_secs)));
        let auth = AuthService::new(
            stores.identity,
            stores.profiles.clone(),
            cache,
            AuthSettings {
                session_ttl:               Duration::days(config.session_days),
                enforce_password_strength: !config.is_development(),
            },
        );
        let bookings = BookingLifecycle::new(stores.bookings.clone());
        let checkout = CheckoutOrchestrator::new(
            stores.services,
            stores.profiles,
            stores.bookings,
            gateway,
            CheckoutSettings {
                app_base_url:           config.app_base_url.clone(),
                webhook_secret:         config.stripe_webhook_secret.clone(),
                webhook_tolerance_secs: config.stripe_webhook_tolerance_secs,
            },
        );
        Self { config, auth, bookings, checkout }
    }
}
