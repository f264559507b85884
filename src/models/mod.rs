use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ── Users / profiles ──────────────────────────────────────────

/// Identity owned by the identity provider. The id never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id:    Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Guest,
    Admin,
    Vendor,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Guest  => "guest",
            UserRole::Admin  => "admin",
            UserRole::Vendor => "vendor",
        }
    }

    /// Unknown strings are treated as "no role", never as a default role.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "guest"  => Some(UserRole::Guest),
            "admin"  => Some(UserRole::Admin),
            "vendor" => Some(UserRole::Vendor),
            _        => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the `profiles` table. `id` equals the owning `User::id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id:         Uuid,
    pub role:       Option<UserRole>,
    pub full_name:  Option<String>,
    pub phone:      Option<String>,
    pub email:      Option<String>,
    pub avatar_url: Option<String>,
}

/// Optional profile fields supplied at sign-up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub full_name:  Option<String>,
    pub phone:      Option<String>,
    pub avatar_url: Option<String>,
}

// ── Services ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id:          Uuid,
    pub vendor_id:   Option<Uuid>,
    pub name:        String,
    pub description: Option<String>,
    pub price:       f64,
    pub currency:    Option<String>,
    pub category:    Option<String>,
    pub duration:    Option<i32>, // minutes
    pub location:    Option<String>,
    pub images:      Vec<String>,
}

// ── Bookings ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Canceled,
    Rescheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("booking cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: BookingStatus,
    pub to:   BookingStatus,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Canceled,
        BookingStatus::Rescheduled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending     => "pending",
            BookingStatus::Confirmed   => "confirmed",
            BookingStatus::Completed   => "completed",
            BookingStatus::Canceled    => "canceled",
            BookingStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Canceled)
    }

    /// Allowed transitions. `completed` and `canceled` accept nothing.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        !self.is_terminal() && matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Canceled)
                | (Confirmed, Completed)
                | (Confirmed, Canceled)
                | (Confirmed, Rescheduled)
                | (Rescheduled, Confirmed)
                | (Rescheduled, Completed)
                | (Rescheduled, Canceled)
        )
    }

    pub fn transition_to(self, next: BookingStatus) -> Result<BookingStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError { from: self, to: next })
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid   => "unpaid",
            PaymentStatus::Paid     => "paid",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed   => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "unpaid"   => Some(PaymentStatus::Unpaid),
            "paid"     => Some(PaymentStatus::Paid),
            "refunded" => Some(PaymentStatus::Refunded),
            "failed"   => Some(PaymentStatus::Failed),
            _          => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id:                  Uuid,
    pub service_id:          Uuid,
    pub user_id:             Uuid,
    pub vendor_id:           Option<Uuid>,
    pub status:              BookingStatus,
    pub payment_status:      PaymentStatus,
    pub payment_intent:      Option<String>,
    pub checkout_session_id: Option<String>,
    pub amount_paid:         Option<f64>,
    pub currency:            Option<String>,
    pub booking_date:        Option<DateTime<Utc>>,
    pub created_at:          DateTime<Utc>,
    pub updated_at:          DateTime<Utc>,
    pub metadata:            serde_json::Value,
}

/// A booking with its service and people joined in and hoisted to the top
/// level. Nested join objects never leave the store layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,

    pub service_name:        Option<String>,
    pub service_description: Option<String>,
    pub service_price:       Option<f64>,
    pub service_currency:    Option<String>,
    pub service_duration:    Option<i32>,
    pub service_category:    Option<String>,
    pub service_location:    Option<String>,
    pub service_images:      Option<Vec<String>>,

    pub vendor_name:         Option<String>,
    pub user_name:           Option<String>,
    pub user_email:          Option<String>,
}
