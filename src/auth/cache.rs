//! Advisory session cache.
//!
//! Snapshots here let `/auth/me` answer before the identity provider and the
//! profile store have been consulted. They are never read by a guard.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::models::{Profile, User};

pub const SNAPSHOT_COOKIE: &str = "profile_snapshot";

/// Cached `{user, profile}` pair with the time it was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryProfile {
    pub user:      User,
    pub profile:   Profile,
    pub cached_at: DateTime<Utc>,
}

impl AdvisoryProfile {
    pub fn new(user: User, profile: Profile, now: DateTime<Utc>) -> Self {
        Self { user, profile, cached_at: now }
    }

    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.cached_at < ttl
    }

    /// URL-encoded JSON, safe as a cookie value.
    pub fn to_cookie_value(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(urlencoding::encode(&json).into_owned())
    }

    #[cfg(test)]
    pub fn from_cookie_value(raw: &str) -> Option<Self> {
        let json = urlencoding::decode(raw).ok()?;
        serde_json::from_str(&json).ok()
    }
}

/// Process-local snapshots keyed by session token.
pub struct SessionCache {
    entries: DashMap<String, AdvisoryProfile>,
    ttl:     Duration,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    /// Returns the snapshot only while it is younger than the TTL.
    pub fn fresh(&self, token: &str, now: DateTime<Utc>) -> Option<AdvisoryProfile> {
        self.entries
            .get(token)
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .map(|entry| entry.value().clone())
    }

    pub fn store(&self, token: &str, snapshot: AdvisoryProfile) {
        self.entries.insert(token.to_owned(), snapshot);
    }

    pub fn evict(&self, token: &str) {
        self.entries.remove(token);
    }

    /// Drops every snapshot past the TTL. Returns how many were removed.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(self.ttl, now));
        before.saturating_sub(self.entries.len())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
