//! Read paths and status changes for existing bookings.
//!
//! List reads never fail: a store error is logged and answered with an empty
//! list, so callers always have a "no bookings" rendering path. Single-row
//! reads and status writes do surface their errors.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::service::AuthSession,
    models::{Booking, BookingDetails, BookingStatus, TransitionError, UserRole},
    store::{BookingStore, StoreError},
};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Booking not found")]
    NotFound,
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Booking status changed concurrently; reload and retry")]
    Concurrent,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct BookingLifecycle {
    store: Arc<dyn BookingStore>,
}

impl BookingLifecycle {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub async fn user_bookings(&self, user_id: Uuid) -> Vec<BookingDetails> {
        self.store.list_for_user(user_id).await.unwrap_or_else(|err| {
            tracing::error!(%user_id, error = %err, "Failed to list user bookings");
            Vec::new()
        })
    }

    pub async fn vendor_bookings(&self, vendor_id: Uuid) -> Vec<BookingDetails> {
        self.store.list_for_vendor(vendor_id).await.unwrap_or_else(|err| {
            tracing::error!(%vendor_id, error = %err, "Failed to list vendor bookings");
            Vec::new()
        })
    }

    pub async fn all_bookings(&self) -> Vec<BookingDetails> {
        self.store.list_all().await.unwrap_or_else(|err| {
            tracing::error!(error = %err, "Failed to list bookings");
            Vec::new()
        })
    }

    pub async fn booking(&self, id: Uuid) -> Result<BookingDetails, LifecycleError> {
        self.store.get(id).await?.ok_or(LifecycleError::NotFound)
    }

    /// Moves the booking to `next` if the transition table allows it. The write
    /// is a compare-and-set against the status that was checked, so two
    /// concurrent updates cannot both pass validation.
    pub async fn update_status(&self, id: Uuid, next: BookingStatus) -> Result<Booking, LifecycleError> {
        let current = self.booking(id).await?.booking.status;
        current.transition_to(next)?;
        let updated = self
            .store
            .set_status(id, current, next)
            .await?
            .ok_or(LifecycleError::Concurrent)?;
        tracing::info!(booking_id = %id, from = %current, to = %next, "Booking status updated");
        Ok(updated)
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Booking, LifecycleError> {
        self.update_status(id, BookingStatus::Canceled).await
    }
}

// ── Access rules ─────────────────────────────────────────────

fn is_vendor_of(details: &BookingDetails, session: &AuthSession) -> bool {
    session.role.is(UserRole::Vendor) && details.booking.vendor_id == Some(session.user.id)
}

/// Owner, the vendor of the booked service, or an admin.
pub fn can_view(details: &BookingDetails, session: &AuthSession) -> bool {
    session.role.is(UserRole::Admin)
        || details.booking.user_id == session.user.id
        || is_vendor_of(details, session)
}

/// Owner or admin.
pub fn can_cancel(details: &BookingDetails, session: &AuthSession) -> bool {
    session.role.is(UserRole::Admin) || details.booking.user_id == session.user.id
}

/// Vendor of the booked service or admin.
pub fn can_set_status(details: &BookingDetails, session: &AuthSession) -> bool {
    session.role.is(UserRole::Admin) || is_vendor_of(details, session)
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        auth::role::AuthoritativeRole,
        models::{PaymentStatus, Profile, Service, User},
        store::memory::MemoryStore,
    };

    pub(crate) fn booking(user_id: Uuid, service_id: Uuid, status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            service_id,
            user_id,
            vendor_id: None,
            status,
            payment_status: PaymentStatus::Paid,
            payment_intent: Some("pi_1".into()),
            checkout_session_id: Some(format!("cs_{}", Uuid::new_v4().simple())),
            amount_paid: Some(58.0),
            currency: Some("usd".into()),
            booking_date: None,
            created_at: now,
            updated_at: now,
            metadata: serde_json::json!({}),
        }
    }

    pub(crate) fn session(id: Uuid, role: UserRole) -> AuthSession {
        AuthSession {
            user:    User { id, email: format!("{role}@hotel.test") },
            profile: Profile {
                id,
                role:       Some(role),
                full_name:  None,
                phone:      None,
                email:      None,
                avatar_url: None,
            },
            role:    AuthoritativeRole::for_tests(role),
            token:   "token".into(),
        }
    }

    fn spa(vendor_id: Option<Uuid>) -> Service {
        Service {
            id: Uuid::new_v4(),
            vendor_id,
            name: "Spa Treatment".into(),
            description: None,
            price: 58.0,
            currency: Some("usd".into()),
            category: Some("spa".into()),
            duration: Some(60),
            location: Some("Level 2".into()),
            images: vec![],
        }
    }

    fn lifecycle(store: &Arc<MemoryStore>) -> BookingLifecycle {
        BookingLifecycle::new(store.clone())
    }

    #[tokio::test]
    async fn empty_and_failing_lists_are_empty() {
        let store = Arc::new(MemoryStore::new());
        let bookings = lifecycle(&store);
        let user = Uuid::new_v4();

        assert!(bookings.user_bookings(user).await.is_empty());
        assert!(bookings.all_bookings().await.is_empty());

        store.add_booking(booking(user, Uuid::new_v4(), BookingStatus::Confirmed));
        store.fail_bookings(true);
        assert!(bookings.user_bookings(user).await.is_empty());
        assert!(bookings.vendor_bookings(Uuid::new_v4()).await.is_empty());
        assert!(bookings.all_bookings().await.is_empty());
    }

    #[tokio::test]
    async fn lists_are_joined_and_flattened() {
        let store = Arc::new(MemoryStore::new());
        let vendor = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let service = spa(Some(vendor));
        store.add_service(service.clone());
        store.put_profile(Profile {
            id:         vendor,
            role:       Some(UserRole::Vendor),
            full_name:  Some("Blue Lagoon Spa".into()),
            phone:      None,
            email:      None,
            avatar_url: None,
        });
        store.add_booking(booking(guest, service.id, BookingStatus::Confirmed));
        store.add_booking(booking(Uuid::new_v4(), Uuid::new_v4(), BookingStatus::Pending));
        let bookings = lifecycle(&store);

        let mine = bookings.user_bookings(guest).await;
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].service_name.as_deref(), Some("Spa Treatment"));
        assert_eq!(mine[0].service_location.as_deref(), Some("Level 2"));
        assert_eq!(mine[0].vendor_name.as_deref(), Some("Blue Lagoon Spa"));

        let vendor_rows = bookings.vendor_bookings(vendor).await;
        assert_eq!(vendor_rows.len(), 1);
        assert_eq!(vendor_rows[0].booking.vendor_id, Some(vendor));
        assert_eq!(bookings.all_bookings().await.len(), 2);
    }

    #[tokio::test]
    async fn cancel_succeeds_from_every_open_status() {
        let store = Arc::new(MemoryStore::new());
        let bookings = lifecycle(&store);
        for status in [BookingStatus::Pending, BookingStatus::Confirmed, BookingStatus::Rescheduled] {
            let row = booking(Uuid::new_v4(), Uuid::new_v4(), status);
            store.add_booking(row.clone());
            let canceled = bookings.cancel(row.id).await.unwrap();
            assert_eq!(canceled.status, BookingStatus::Canceled, "from {status}");
        }
    }

    #[tokio::test]
    async fn terminal_bookings_reject_changes() {
        let store = Arc::new(MemoryStore::new());
        let bookings = lifecycle(&store);
        let done = booking(Uuid::new_v4(), Uuid::new_v4(), BookingStatus::Completed);
        store.add_booking(done.clone());

        let err = bookings.update_status(done.id, BookingStatus::Pending).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Transition(_)));
        let err = bookings.cancel(done.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Transition(_)));
        assert_eq!(store.bookings()[0].status, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn missing_booking_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = lifecycle(&store).cancel(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound));
    }

    #[test]
    fn access_rules_follow_ownership_and_role() {
        let owner = Uuid::new_v4();
        let vendor = Uuid::new_v4();
        let mut row = booking(owner, Uuid::new_v4(), BookingStatus::Confirmed);
        row.vendor_id = Some(vendor);
        let details = BookingDetails {
            booking:             row,
            service_name:        None,
            service_description: None,
            service_price:       None,
            service_currency:    None,
            service_duration:    None,
            service_category:    None,
            service_location:    None,
            service_images:      None,
            vendor_name:         None,
            user_name:           None,
            user_email:          None,
        };

        let as_owner = session(owner, UserRole::Guest);
        let as_vendor = session(vendor, UserRole::Vendor);
        let as_admin = session(Uuid::new_v4(), UserRole::Admin);
        let stranger = session(Uuid::new_v4(), UserRole::Guest);
        let other_vendor = session(Uuid::new_v4(), UserRole::Vendor);

        assert!(can_view(&details, &as_owner) && can_view(&details, &as_vendor) && can_view(&details, &as_admin));
        assert!(!can_view(&details, &stranger) && !can_view(&details, &other_vendor));

        assert!(can_cancel(&details, &as_owner) && can_cancel(&details, &as_admin));
        assert!(!can_cancel(&details, &as_vendor));

        assert!(can_set_status(&details, &as_vendor) && can_set_status(&details, &as_admin));
        assert!(!can_set_status(&details, &as_owner) && !can_set_status(&details, &other_vendor));
    }
}
