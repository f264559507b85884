//! Postgres-backed stores (runtime queries — no DATABASE_URL at compile time).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    auth::generate_token,
    db::Db,
    models::{Booking, BookingDetails, BookingStatus, PaymentStatus, Profile, Service, User, UserRole},
};

use super::{
    BookingStore, IdentityProvider, InsertOutcome, NewBooking, ProfileStore, ProfileUpsert,
    ServiceCatalog, StoreError, StoreResult, UserCredentials,
};

/// One pool, every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: Db,
}

impl PgStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }
}

// ── Row types ────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct UserRow {
    id:    Uuid,
    email: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User { id: row.id, email: row.email }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    id:            Uuid,
    email:         String,
    password_hash: String,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id:         Uuid,
    role:       Option<String>,
    full_name:  Option<String>,
    phone:      Option<String>,
    email:      Option<String>,
    avatar_url: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id:         row.id,
            role:       row.role.as_deref().and_then(UserRole::parse),
            full_name:  row.full_name,
            phone:      row.phone,
            email:      row.email,
            avatar_url: row.avatar_url,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id:          Uuid,
    vendor_id:   Option<Uuid>,
    name:        String,
    description: Option<String>,
    price:       f64,
    currency:    Option<String>,
    category:    Option<String>,
    duration:    Option<i32>,
    location:    Option<String>,
    images:      Option<Vec<String>>,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id:                  Uuid,
    service_id:          Uuid,
    user_id:             Uuid,
    vendor_id:           Option<Uuid>,
    status:              String,
    payment_status:      String,
    payment_intent:      Option<String>,
    checkout_session_id: Option<String>,
    amount_paid:         Option<f64>,
    currency:            Option<String>,
    booking_date:        Option<DateTime<Utc>>,
    created_at:          DateTime<Utc>,
    updated_at:          DateTime<Utc>,
    metadata:            serde_json::Value,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("booking {} has status '{}'", row.id, row.status)))?;
        let payment_status = PaymentStatus::parse(&row.payment_status).ok_or_else(|| {
            StoreError::Corrupt(format!("booking {} has payment_status '{}'", row.id, row.payment_status))
        })?;
        Ok(Booking {
            id: row.id,
            service_id: row.service_id,
            user_id: row.user_id,
            vendor_id: row.vendor_id,
            status,
            payment_status,
            payment_intent: row.payment_intent,
            checkout_session_id: row.checkout_session_id,
            amount_paid: row.amount_paid,
            currency: row.currency,
            booking_date: row.booking_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            metadata: row.metadata,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingDetailsRow {
    #[sqlx(flatten)]
    booking: BookingRow,

    service_name:        Option<String>,
    service_description: Option<String>,
    service_price:       Option<f64>,
    service_currency:    Option<String>,
    service_duration:    Option<i32>,
    service_category:    Option<String>,
    service_location:    Option<String>,
    service_images:      Option<Vec<String>>,
    vendor_name:         Option<String>,
    user_name:           Option<String>,
    user_email:          Option<String>,
}

impl TryFrom<BookingDetailsRow> for BookingDetails {
    type Error = StoreError;

    fn try_from(row: BookingDetailsRow) -> Result<Self, Self::Error> {
        Ok(BookingDetails {
            booking:             row.booking.try_into()?,
            service_name:        row.service_name,
            service_description: row.service_description,
            service_price:       row.service_price,
            service_currency:    row.service_currency,
            service_duration:    row.service_duration,
            service_category:    row.service_category,
            service_location:    row.service_location,
            service_images:      row.service_images,
            vendor_name:         row.vendor_name,
            user_name:           row.user_name,
            user_email:          row.user_email,
        })
    }
}

const BOOKING_COLUMNS: &str =
    "id, service_id, user_id, vendor_id, status, payment_status, payment_intent,
     checkout_session_id, amount_paid, currency, booking_date, created_at, updated_at, metadata";

/// Joined booking query; callers append the WHERE clause.
const BOOKING_DETAILS_SELECT: &str =
    "SELECT b.id, b.service_id, b.user_id, COALESCE(b.vendor_id, s.vendor_id) AS vendor_id,
            b.status, b.payment_status, b.payment_intent, b.checkout_session_id,
            b.amount_paid, b.currency, b.booking_date, b.created_at, b.updated_at, b.metadata,
            s.name        AS service_name,
            s.description AS service_description,
            s.price       AS service_price,
            s.currency    AS service_currency,
            s.duration    AS service_duration,
            s.category    AS service_category,
            s.location    AS service_location,
            s.images      AS service_images,
            v.full_name   AS vendor_name,
            u.full_name   AS user_name,
            u.email       AS user_email
     FROM bookings b
     LEFT JOIN services s ON s.id = b.service_id
     LEFT JOIN profiles v ON v.id = s.vendor_id
     LEFT JOIN profiles u ON u.id = b.user_id";

fn map_reference_violation(err: sqlx::Error, what: &str) -> StoreError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            StoreError::MissingReference(what.to_owned())
        }
        other => StoreError::Database(other),
    }
}

fn map_unique_violation(err: sqlx::Error, what: &str) -> StoreError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(what.to_owned())
        }
        other => StoreError::Database(other),
    }
}

fn collect_details(rows: Vec<BookingDetailsRow>) -> StoreResult<Vec<BookingDetails>> {
    rows.into_iter().map(BookingDetails::try_from).collect()
}

// ── Identity ─────────────────────────────────────────────────

#[async_trait]
impl IdentityProvider for PgStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, email FROM users WHERE email = $1 LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_credentials(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            "SELECT id, email, password_hash FROM users WHERE email = $1 LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| UserCredentials {
            user:          User { id: r.id, email: r.email },
            password_hash: r.password_hash,
        }))
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3) RETURNING id, email",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "users.email"))?;
        Ok(row.into())
    }

    async fn open_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<String> {
        let token = generate_token();
        sqlx::query(
            "INSERT INTO user_sessions (id, user_id, token, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(token)
    }

    async fn resolve_session(&self, token: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.email
             FROM user_sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token = $1 AND s.expires_at > NOW()
             LIMIT 1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn close_session(&self, token: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM user_sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired_sessions(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ── Profiles ─────────────────────────────────────────────────

#[async_trait]
impl ProfileStore for PgStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, role, full_name, phone, email, avatar_url FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Profile::from))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, role, full_name, phone, email, avatar_url
             FROM profiles WHERE email = $1
             ORDER BY created_at
             LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Profile::from))
    }

    async fn upsert(&self, profile: &ProfileUpsert) -> StoreResult<Profile> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "INSERT INTO profiles (id, role, email, full_name, phone, avatar_url)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                role       = EXCLUDED.role,
                email      = COALESCE(EXCLUDED.email,      profiles.email),
                full_name  = COALESCE(EXCLUDED.full_name,  profiles.full_name),
                phone      = COALESCE(EXCLUDED.phone,      profiles.phone),
                avatar_url = COALESCE(EXCLUDED.avatar_url, profiles.avatar_url),
                updated_at = NOW()
             RETURNING id, role, full_name, phone, email, avatar_url",
        )
        .bind(profile.id)
        .bind(profile.role.as_str())
        .bind(&profile.email)
        .bind(&profile.full_name)
        .bind(&profile.phone)
        .bind(&profile.avatar_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn insert_guest(&self, email: &str, full_name: &str) -> StoreResult<Profile> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "INSERT INTO profiles (id, role, email, full_name)
             VALUES ($1, 'guest', $2, $3)
             RETURNING id, role, full_name, phone, email, avatar_url",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(full_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }
}

// ── Services ─────────────────────────────────────────────────

#[async_trait]
impl ServiceCatalog for PgStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Service>> {
        let row = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, vendor_id, name, description, price, currency, category, duration, location, images
             FROM services WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Service {
            id:          r.id,
            vendor_id:   r.vendor_id,
            name:        r.name,
            description: r.description,
            price:       r.price,
            currency:    r.currency,
            category:    r.category,
            duration:    r.duration,
            location:    r.location,
            images:      r.images.unwrap_or_default(),
        }))
    }
}

// ── Bookings ─────────────────────────────────────────────────

#[async_trait]
impl BookingStore for PgStore {
    async fn insert_if_absent(&self, booking: &NewBooking) -> StoreResult<InsertOutcome> {
        let inserted = sqlx::query_as::<_, BookingRow>(&format!(
            "INSERT INTO bookings (id, service_id, user_id, vendor_id, status, payment_status,
                                   payment_intent, checkout_session_id, amount_paid, currency,
                                   booking_date, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (checkout_session_id) DO NOTHING
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(booking.service_id)
        .bind(booking.user_id)
        .bind(booking.vendor_id)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(&booking.payment_intent)
        .bind(&booking.checkout_session_id)
        .bind(booking.amount_paid)
        .bind(&booking.currency)
        .bind(booking.booking_date)
        .bind(&booking.metadata)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| map_reference_violation(err, "bookings.user_id"))?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Created(row.try_into()?));
        }

        let existing = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE checkout_session_id = $1"
        ))
        .bind(&booking.checkout_session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(InsertOutcome::AlreadyExists(existing.try_into()?))
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<BookingDetails>> {
        let row = sqlx::query_as::<_, BookingDetailsRow>(&format!(
            "{BOOKING_DETAILS_SELECT} WHERE b.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(BookingDetails::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<BookingDetails>> {
        let rows = sqlx::query_as::<_, BookingDetailsRow>(&format!(
            "{BOOKING_DETAILS_SELECT} WHERE b.user_id = $1 ORDER BY b.created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        collect_details(rows)
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<BookingDetails>> {
        let rows = sqlx::query_as::<_, BookingDetailsRow>(&format!(
            "{BOOKING_DETAILS_SELECT} WHERE s.vendor_id = $1 OR b.vendor_id = $1 ORDER BY b.created_at DESC"
        ))
        .bind(vendor_id)
        .fetch_all(&self.pool)
        .await?;
        collect_details(rows)
    }

    async fn list_all(&self) -> StoreResult<Vec<BookingDetails>> {
        let rows = sqlx::query_as::<_, BookingDetailsRow>(&format!(
            "{BOOKING_DETAILS_SELECT} ORDER BY b.created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect_details(rows)
    }

    async fn set_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Booking::try_from).transpose()
    }
}
