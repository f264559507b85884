//! Checkout orchestration: one paid checkout session becomes exactly one
//! confirmed booking.
//!
//! The checkout session's metadata is the only channel between the moment a
//! session is opened and the moment it settles, so everything the webhook
//! needs to build the booking is written into it up front.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::service::AuthSession,
    models::{BookingStatus, PaymentStatus},
    payments::{
        signature::{self, SignatureError},
        CheckoutRequest, CheckoutSession, LineItem, PaymentError, PaymentGateway, WebhookEvent,
        CHECKOUT_COMPLETED,
    },
    store::{BookingStore, InsertOutcome, NewBooking, ProfileStore, ServiceCatalog, StoreError},
};

/// `userId` written into the metadata of checkouts opened without a session.
pub const GUEST_SENTINEL: &str = "guest";
pub const DEFAULT_CURRENCY: &str = "usd";
const FALLBACK_METHOD: &str = "fallback_method";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Service not found")]
    ServiceNotFound,
    #[error("Payment not completed")]
    NotPaid,
    #[error("Checkout session does not belong to this booking")]
    SessionMismatch,
    #[error("Checkout session is missing {0}")]
    Incomplete(&'static str),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Webhook signature verification failed: {0}")]
    Signature(#[from] SignatureError),
    #[error("Malformed event: {0}")]
    Malformed(String),
    #[error("Missing {0} in session metadata")]
    MissingMetadata(&'static str),
    #[error("Cannot determine the paying customer")]
    UnknownCustomer,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WebhookError {
    /// Only store failures ask the provider to redeliver.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Store(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookAck {
    Ignored { event_type: String },
    Booked { booking_id: Uuid, duplicate: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutStarted {
    pub session_url: String,
    pub session_id:  String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub app_base_url:           String,
    pub webhook_secret:         String,
    pub webhook_tolerance_secs: i64,
}

#[derive(Clone)]
pub struct CheckoutOrchestrator {
    services: Arc<dyn ServiceCatalog>,
    profiles: Arc<dyn ProfileStore>,
    bookings: Arc<dyn BookingStore>,
    gateway:  Arc<dyn PaymentGateway>,
    settings: CheckoutSettings,
}

impl CheckoutOrchestrator {
    pub fn new(
        services: Arc<dyn ServiceCatalog>,
        profiles: Arc<dyn ProfileStore>,
        bookings: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: CheckoutSettings,
    ) -> Self {
        Self { services, profiles, bookings, gateway, settings }
    }

    // ── Checkout ─────────────────────────────────────────────

    /// Opens a hosted checkout for one unit of the service. Nothing is stored
    /// locally; the booking only appears once the payment settles.
    pub async fn create_checkout_session(
        &self,
        caller: Option<&AuthSession>,
        service_id: Uuid,
        booking_date: Option<NaiveDate>,
    ) -> Result<CheckoutStarted, CheckoutError> {
        let service = self
            .services
            .get(service_id)
            .await?
            .ok_or(CheckoutError::ServiceNotFound)?;

        let currency = service
            .currency
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
            .to_lowercase();
        let base = self.settings.app_base_url.trim_end_matches('/');
        let date = booking_date.map(|d| d.format("%Y-%m-%d").to_string());

        let mut success_url =
            format!("{base}/profile?success=true&tab=bookings&session_id={{CHECKOUT_SESSION_ID}}");
        if let Some(date) = &date {
            success_url.push_str(&format!("&booking_date={date}"));
        }
        let cancel_url = format!("{base}/checkout?serviceId={service_id}&canceled=true");

        let user_id = caller.map_or_else(|| GUEST_SENTINEL.to_string(), |s| s.user.id.to_string());
        let full_name = caller.and_then(|s| s.profile.full_name.clone());

        let mut metadata = BTreeMap::new();
        metadata.insert("serviceId".to_string(), service_id.to_string());
        metadata.insert("userId".to_string(), user_id.clone());
        metadata.insert("serviceName".to_string(), service.name.clone());
        metadata.insert("servicePrice".to_string(), service.price.to_string());
        metadata.insert("serviceCurrency".to_string(), currency.clone());
        if let Some(name) = full_name.filter(|n| !n.is_empty()) {
            metadata.insert("userFullName".to_string(), name);
        }
        if let Some(date) = &date {
            metadata.insert("bookingDate".to_string(), date.clone());
        }
        if let Some(vendor_id) = service.vendor_id {
            metadata.insert("vendorId".to_string(), vendor_id.to_string());
        }

        let request = CheckoutRequest {
            line_item: LineItem {
                name:        service.name.clone(),
                description: service.description.clone(),
                images:      service.images.iter().take(1).cloned().collect(),
                currency,
                unit_amount: (service.price * 100.0).round() as i64,
                quantity:    1,
            },
            success_url,
            cancel_url,
            customer_email: caller.map(|s| s.user.email.clone()),
            metadata,
        };

        let created = self.gateway.create_checkout_session(&request).await?;
        tracing::info!(
            session_id = %created.id,
            %service_id,
            user_id = %user_id,
            "Checkout session created"
        );
        Ok(CheckoutStarted { session_url: created.url, session_id: created.id })
    }

    // ── Webhook ──────────────────────────────────────────────

    /// Verifies and applies one provider event. Every event type other than a
    /// completed checkout is acknowledged without side effects; a redelivered
    /// completed checkout returns the booking it created the first time.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookAck, WebhookError> {
        signature::verify(
            payload,
            signature_header,
            &self.settings.webhook_secret,
            self.settings.webhook_tolerance_secs,
            now.timestamp(),
        )?;

        let event: WebhookEvent =
            serde_json::from_slice(payload).map_err(|e| WebhookError::Malformed(e.to_string()))?;
        if event.kind != CHECKOUT_COMPLETED {
            tracing::debug!(event_id = %event.id, event_type = %event.kind, "Ignoring webhook event");
            return Ok(WebhookAck::Ignored { event_type: event.kind });
        }

        let session: CheckoutSession = serde_json::from_value(event.data.object)
            .map_err(|e| WebhookError::Malformed(e.to_string()))?;

        let service_id = session.meta("serviceId").ok_or_else(|| {
            tracing::warn!(session_id = %session.id, "Webhook session has no serviceId");
            WebhookError::MissingMetadata("serviceId")
        })?;
        let service_id = Uuid::parse_str(service_id)
            .map_err(|_| WebhookError::Malformed(format!("serviceId {service_id:?} is not a UUID")))?;
        let user_id = self.resolve_customer(&session).await?;
        let booking_date = session_booking_date(&session);

        let booking = self
            .new_booking(&session, service_id, user_id, booking_date, None)
            .await;
        let outcome = self.bookings.insert_if_absent(&booking).await.map_err(|err| match err {
            // Redelivery cannot fix a dangling customer reference.
            StoreError::MissingReference(what) => {
                tracing::warn!(session_id = %session.id, %what, "Booking references a missing row");
                WebhookError::UnknownCustomer
            }
            err => {
                tracing::error!(session_id = %session.id, error = %err, "Failed to insert booking");
                WebhookError::Store(err)
            }
        })?;

        log_outcome(&outcome, &session.id);
        Ok(WebhookAck::Booked {
            booking_id: outcome.booking().id,
            duplicate:  outcome.is_duplicate(),
        })
    }

    /// Success-page fallback for when the webhook has not arrived yet. Reads
    /// the session back from the provider and runs the same idempotent insert.
    /// The session must name this service and belong to the caller: by user
    /// id, or for a guest checkout by the customer email.
    pub async fn confirm_from_session(
        &self,
        caller: &AuthSession,
        session_id: &str,
        service_id: Uuid,
        booking_date: Option<NaiveDate>,
    ) -> Result<InsertOutcome, CheckoutError> {
        let session = self.gateway.retrieve_checkout_session(session_id).await?;
        if session.payment_status.as_deref() != Some("paid") {
            return Err(CheckoutError::NotPaid);
        }
        let meta_service = session.meta("serviceId").ok_or(CheckoutError::Incomplete("serviceId"))?;
        if Uuid::parse_str(meta_service).ok() != Some(service_id) {
            return Err(CheckoutError::SessionMismatch);
        }
        let meta_user = session.meta("userId").ok_or(CheckoutError::Incomplete("userId"))?;
        let owned = if meta_user == GUEST_SENTINEL {
            session
                .customer_email()
                .is_some_and(|email| email.eq_ignore_ascii_case(&caller.user.email))
        } else {
            Uuid::parse_str(meta_user).ok() == Some(caller.user.id)
        };
        if !owned {
            tracing::warn!(session_id = %session.id, user_id = %caller.user.id, "Checkout session claimed by another user");
            return Err(CheckoutError::SessionMismatch);
        }
        if session.id.is_empty() {
            return Err(CheckoutError::Incomplete("id"));
        }

        let booking_date = booking_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc())
            .or_else(|| session_booking_date(&session));
        let booking = self
            .new_booking(&session, service_id, caller.user.id, booking_date, Some(FALLBACK_METHOD))
            .await;
        let outcome = self.bookings.insert_if_absent(&booking).await?;
        log_outcome(&outcome, &session.id);
        Ok(outcome)
    }

    // ── Helpers ──────────────────────────────────────────────

    /// A user id from the metadata wins when its profile exists. Otherwise the
    /// customer is found by email, and a guest profile is created for
    /// first-time customers.
    async fn resolve_customer(&self, session: &CheckoutSession) -> Result<Uuid, WebhookError> {
        if let Some(id) = session.meta("userId").and_then(|u| Uuid::parse_str(u).ok()) {
            if self.profiles.get(id).await?.is_some() {
                return Ok(id);
            }
            tracing::warn!(session_id = %session.id, user_id = %id, "No profile for metadata userId; matching by email");
        }

        let email = session
            .customer_email()
            .filter(|e| !e.is_empty())
            .ok_or(WebhookError::UnknownCustomer)?
            .to_lowercase();
        if let Some(profile) = self.profiles.find_by_email(&email).await? {
            return Ok(profile.id);
        }

        let name = session
            .customer_name()
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        let profile = self.profiles.insert_guest(&email, &name).await?;
        tracing::info!(profile_id = %profile.id, "Created guest profile for checkout customer");
        Ok(profile.id)
    }

    /// Metadata `vendorId`, else the service's vendor. A failed lookup leaves
    /// the booking without a vendor rather than failing it.
    async fn resolve_vendor(&self, session: &CheckoutSession, service_id: Uuid) -> Option<Uuid> {
        if let Some(id) = session.meta("vendorId").and_then(|v| Uuid::parse_str(v).ok()) {
            return Some(id);
        }
        match self.services.get(service_id).await {
            Ok(service) => service.and_then(|s| s.vendor_id),
            Err(err) => {
                tracing::warn!(%service_id, error = %err, "Vendor lookup failed");
                None
            }
        }
    }

    async fn new_booking(
        &self,
        session: &CheckoutSession,
        service_id: Uuid,
        user_id: Uuid,
        booking_date: Option<DateTime<Utc>>,
        created_by: Option<&str>,
    ) -> NewBooking {
        let mut metadata = json!({
            "session_id":     session.id,
            "customer_email": session.customer_email(),
            "customer_name":  session.customer_name(),
        });
        if let Some(created_by) = created_by {
            metadata["created_by"] = json!(created_by);
        }

        NewBooking {
            service_id,
            user_id,
            vendor_id: self.resolve_vendor(session, service_id).await,
            status: BookingStatus::Confirmed,
            payment_status: PaymentStatus::Paid,
            payment_intent: session.payment_intent.clone(),
            checkout_session_id: session.id.clone(),
            amount_paid: session.amount_total.map(|cents| cents as f64 / 100.0),
            currency: session.currency.clone(),
            booking_date,
            metadata,
        }
    }
}

fn log_outcome(outcome: &InsertOutcome, session_id: &str) {
    match outcome {
        InsertOutcome::Created(b) => {
            tracing::info!(booking_id = %b.id, %session_id, "Booking created");
        }
        InsertOutcome::AlreadyExists(b) => {
            tracing::info!(booking_id = %b.id, %session_id, "Duplicate checkout delivery; booking already exists");
        }
    }
}

/// Metadata `bookingDate` (date or RFC 3339), else the `booking_date` query
/// parameter of the session's success URL.
fn session_booking_date(session: &CheckoutSession) -> Option<DateTime<Utc>> {
    if let Some(raw) = session.meta("bookingDate") {
        match parse_booking_date(raw) {
            Some(date) => return Some(date),
            None => tracing::warn!(session_id = %session.id, raw, "Invalid booking date in metadata"),
        }
    }
    let url = session.success_url.as_deref()?;
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "booking_date")
        .and_then(|(_, value)| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

fn parse_booking_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}
