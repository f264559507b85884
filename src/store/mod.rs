//! Store seams.
//!
//! Everything the auth flow and the booking lifecycle read or write goes
//! through one of these traits. `postgres` is the production implementation;
//! `memory` backs the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Booking, BookingDetails, BookingStatus, PaymentStatus, Profile, Service, User, UserRole,
};

pub mod postgres;

#[cfg(test)]
pub mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("Referenced row does not exist: {0}")]
    MissingReference(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ── Identity ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user:          User,
    pub password_hash: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_credentials(&self, email: &str) -> StoreResult<Option<UserCredentials>>;

    /// Fails with `StoreError::Conflict` when the email is already registered.
    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User>;

    /// Opens a session and returns its opaque token.
    async fn open_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<String>;

    /// Returns the user of a live (unexpired) session.
    async fn resolve_session(&self, token: &str) -> StoreResult<Option<User>>;

    /// Closing an unknown token is not an error.
    async fn close_session(&self, token: &str) -> StoreResult<()>;

    async fn purge_expired_sessions(&self) -> StoreResult<u64>;
}

// ── Profiles ──────────────────────────────────────────────────

/// Full profile write for sign-up. Stored with a single insert-on-conflict-update.
#[derive(Debug, Clone)]
pub struct ProfileUpsert {
    pub id:         Uuid,
    pub role:       UserRole,
    pub email:      Option<String>,
    pub full_name:  Option<String>,
    pub phone:      Option<String>,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Profile>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Profile>>;

    /// Inserts the profile, or overwrites role and the supplied fields when a
    /// row with the same id already exists. Absent fields keep their value.
    async fn upsert(&self, profile: &ProfileUpsert) -> StoreResult<Profile>;

    /// Creates a `guest` profile for a customer who paid without an account.
    async fn insert_guest(&self, email: &str, full_name: &str) -> StoreResult<Profile>;
}

// ── Services ──────────────────────────────────────────────────

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Service>>;
}

// ── Bookings ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub service_id:          Uuid,
    pub user_id:             Uuid,
    pub vendor_id:           Option<Uuid>,
    pub status:              BookingStatus,
    pub payment_status:      PaymentStatus,
    pub payment_intent:      Option<String>,
    /// Idempotency key: at most one booking exists per checkout session.
    pub checkout_session_id: String,
    pub amount_paid:         Option<f64>,
    pub currency:            Option<String>,
    pub booking_date:        Option<DateTime<Utc>>,
    pub metadata:            serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Created(Booking),
    AlreadyExists(Booking),
}

impl InsertOutcome {
    pub fn booking(&self) -> &Booking {
        match self {
            InsertOutcome::Created(b) | InsertOutcome::AlreadyExists(b) => b,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, InsertOutcome::AlreadyExists(_))
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Inserts unless a booking with the same checkout session id exists, in
    /// which case the existing row is returned untouched.
    async fn insert_if_absent(&self, booking: &NewBooking) -> StoreResult<InsertOutcome>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<BookingDetails>>;

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<BookingDetails>>;

    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<BookingDetails>>;

    async fn list_all(&self) -> StoreResult<Vec<BookingDetails>>;

    /// Compare-and-set on the status column. `None` when the booking is gone
    /// or its status is no longer `from`.
    async fn set_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<Option<Booking>>;
}
