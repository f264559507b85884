//! In-memory stores for unit tests. Joins mirror the Postgres LEFT JOINs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    auth::generate_token,
    models::{Booking, BookingDetails, BookingStatus, Profile, Service, User, UserRole},
};

use super::{
    BookingStore, IdentityProvider, InsertOutcome, NewBooking, ProfileStore, ProfileUpsert,
    ServiceCatalog, StoreError, StoreResult, UserCredentials,
};

#[derive(Default)]
struct Inner {
    users:    HashMap<Uuid, UserCredentials>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    profiles: HashMap<Uuid, Profile>,
    services: HashMap<Uuid, Service>,
    bookings: Vec<Booking>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner:            Mutex<Inner>,
    fail_profiles:    AtomicBool,
    fail_bookings:    AtomicBool,
    fail_session_ops: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service(&self, service: Service) {
        self.inner.lock().services.insert(service.id, service);
    }

    pub fn put_profile(&self, profile: Profile) {
        self.inner.lock().profiles.insert(profile.id, profile);
    }

    pub fn remove_profile(&self, id: Uuid) {
        self.inner.lock().profiles.remove(&id);
    }

    pub fn add_booking(&self, booking: Booking) {
        self.inner.lock().bookings.push(booking);
    }

    pub fn booking_count(&self) -> usize {
        self.inner.lock().bookings.len()
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.inner.lock().bookings.clone()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn expire_all_sessions(&self) {
        let past = Utc::now() - chrono::Duration::seconds(1);
        for (_, expires_at) in self.inner.lock().sessions.values_mut() {
            *expires_at = past;
        }
    }

    pub fn fail_profiles(&self, fail: bool) {
        self.fail_profiles.store(fail, Ordering::SeqCst);
    }

    pub fn fail_bookings(&self, fail: bool) {
        self.fail_bookings.store(fail, Ordering::SeqCst);
    }

    pub fn fail_session_ops(&self, fail: bool) {
        self.fail_session_ops.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::Protocol(format!("{what} store offline"))));
        }
        Ok(())
    }

    fn details(inner: &Inner, booking: &Booking) -> BookingDetails {
        let service = inner.services.get(&booking.service_id);
        let vendor = service
            .and_then(|s| s.vendor_id)
            .and_then(|id| inner.profiles.get(&id));
        let user = inner.profiles.get(&booking.user_id);
        let mut booking = booking.clone();
        booking.vendor_id = booking.vendor_id.or_else(|| service.and_then(|s| s.vendor_id));
        BookingDetails {
            booking,
            service_name:        service.map(|s| s.name.clone()),
            service_description: service.and_then(|s| s.description.clone()),
            service_price:       service.map(|s| s.price),
            service_currency:    service.and_then(|s| s.currency.clone()),
            service_duration:    service.and_then(|s| s.duration),
            service_category:    service.and_then(|s| s.category.clone()),
            service_location:    service.and_then(|s| s.location.clone()),
            service_images:      service.map(|s| s.images.clone()),
            vendor_name:         vendor.and_then(|p| p.full_name.clone()),
            user_name:           user.and_then(|p| p.full_name.clone()),
            user_email:          user.and_then(|p| p.email.clone()),
        }
    }

    fn list_where(&self, keep: impl Fn(&Inner, &Booking) -> bool) -> StoreResult<Vec<BookingDetails>> {
        Self::check(&self.fail_bookings, "booking")?;
        let inner = self.inner.lock();
        let mut rows: Vec<BookingDetails> = inner
            .bookings
            .iter()
            .filter(|b| keep(&inner, b))
            .map(|b| Self::details(&inner, b))
            .collect();
        rows.sort_by(|a, b| b.booking.created_at.cmp(&a.booking.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl IdentityProvider for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.find_credentials(email).await?.map(|c| c.user))
    }

    async fn find_credentials(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        let inner = self.inner.lock();
        Ok(inner.users.values().find(|c| c.user.email == email).cloned())
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let mut inner = self.inner.lock();
        if inner.users.values().any(|c| c.user.email == email) {
            return Err(StoreError::Conflict("users.email".into()));
        }
        let user = User { id: Uuid::new_v4(), email: email.to_owned() };
        inner.users.insert(
            user.id,
            UserCredentials { user: user.clone(), password_hash: password_hash.to_owned() },
        );
        Ok(user)
    }

    async fn open_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<String> {
        Self::check(&self.fail_session_ops, "session")?;
        let token = generate_token();
        self.inner.lock().sessions.insert(token.clone(), (user_id, expires_at));
        Ok(token)
    }

    async fn resolve_session(&self, token: &str) -> StoreResult<Option<User>> {
        Self::check(&self.fail_session_ops, "session")?;
        let inner = self.inner.lock();
        let now = Utc::now();
        Ok(inner
            .sessions
            .get(token)
            .filter(|(_, expires_at)| *expires_at > now)
            .and_then(|(user_id, _)| inner.users.get(user_id))
            .map(|c| c.user.clone()))
    }

    async fn close_session(&self, token: &str) -> StoreResult<()> {
        Self::check(&self.fail_session_ops, "session")?;
        self.inner.lock().sessions.remove(token);
        Ok(())
    }

    async fn purge_expired_sessions(&self) -> StoreResult<u64> {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - inner.sessions.len()) as u64)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        Self::check(&self.fail_profiles, "profile")?;
        Ok(self.inner.lock().profiles.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Profile>> {
        Self::check(&self.fail_profiles, "profile")?;
        let inner = self.inner.lock();
        Ok(inner.profiles.values().find(|p| p.email.as_deref() == Some(email)).cloned())
    }

    async fn upsert(&self, profile: &ProfileUpsert) -> StoreResult<Profile> {
        Self::check(&self.fail_profiles, "profile")?;
        let mut inner = self.inner.lock();
        let row = inner.profiles.entry(profile.id).or_insert_with(|| Profile {
            id:         profile.id,
            role:       None,
            full_name:  None,
            phone:      None,
            email:      None,
            avatar_url: None,
        });
        row.role = Some(profile.role);
        row.email = profile.email.clone().or_else(|| row.email.take());
        row.full_name = profile.full_name.clone().or_else(|| row.full_name.take());
        row.phone = profile.phone.clone().or_else(|| row.phone.take());
        row.avatar_url = profile.avatar_url.clone().or_else(|| row.avatar_url.take());
        Ok(row.clone())
    }

    async fn insert_guest(&self, email: &str, full_name: &str) -> StoreResult<Profile> {
        Self::check(&self.fail_profiles, "profile")?;
        let profile = Profile {
            id:         Uuid::new_v4(),
            role:       Some(UserRole::Guest),
            full_name:  Some(full_name.to_owned()),
            phone:      None,
            email:      Some(email.to_owned()),
            avatar_url: None,
        };
        self.inner.lock().profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }
}

#[async_trait]
impl ServiceCatalog for MemoryStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Service>> {
        Ok(self.inner.lock().services.get(&id).cloned())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_if_absent(&self, booking: &NewBooking) -> StoreResult<InsertOutcome> {
        Self::check(&self.fail_bookings, "booking")?;
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .bookings
            .iter()
            .find(|b| b.checkout_session_id.as_deref() == Some(booking.checkout_session_id.as_str()))
        {
            return Ok(InsertOutcome::AlreadyExists(existing.clone()));
        }
        if !inner.profiles.contains_key(&booking.user_id) {
            return Err(StoreError::MissingReference("bookings.user_id".into()));
        }
        let now = Utc::now();
        let row = Booking {
            id:                  Uuid::new_v4(),
            service_id:          booking.service_id,
            user_id:             booking.user_id,
            vendor_id:           booking.vendor_id,
            status:              booking.status,
            payment_status:      booking.payment_status,
            payment_intent:      booking.payment_intent.clone(),
            checkout_session_id: Some(booking.checkout_session_id.clone()),
            amount_paid:         booking.amount_paid,
            currency:            booking.currency.clone(),
            booking_date:        booking.booking_date,
            created_at:          now,
            updated_at:          now,
            metadata:            booking.metadata.clone(),
        };
        inner.bookings.push(row.clone());
        Ok(InsertOutcome::Created(row))
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<BookingDetails>> {
        Self::check(&self.fail_bookings, "booking")?;
        let inner = self.inner.lock();
        Ok(inner.bookings.iter().find(|b| b.id == id).map(|b| Self::details(&inner, b)))
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<BookingDetails>> {
        self.list_where(|_, b| b.user_id == user_id)
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<BookingDetails>> {
        self.list_where(|inner, b| {
            b.vendor_id == Some(vendor_id)
                || inner.services.get(&b.service_id).and_then(|s| s.vendor_id) == Some(vendor_id)
        })
    }

    async fn list_all(&self) -> StoreResult<Vec<BookingDetails>> {
        self.list_where(|_, _| true)
    }

    async fn set_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<Option<Booking>> {
        Self::check(&self.fail_bookings, "booking")?;
        let mut inner = self.inner.lock();
        let Some(row) = inner.bookings.iter_mut().find(|b| b.id == id && b.status == from) else {
            return Ok(None);
        };
        row.status = to;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }
}
