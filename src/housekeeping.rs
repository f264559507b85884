//! Periodic session housekeeping: expired identity sessions are deleted and
//! stale advisory snapshots are evicted from the session cache.

use std::time::Duration;

use chrono::Utc;

use crate::auth::service::AuthService;

pub fn spawn_session_sweep(auth: AuthService, minutes: u64) {
    if minutes == 0 {
        tracing::info!("Session sweep job disabled");
        return;
    }

    tracing::info!(minutes, "Session sweep job started");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(minutes.saturating_mul(60)));
        // First immediate tick consumed so subsequent ticks wait the configured interval.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(err) = run_session_sweep(&auth).await {
                tracing::error!(error = %err, "Session sweep failed");
            }
        }
    });
}

pub async fn run_session_sweep(auth: &AuthService) -> anyhow::Result<()> {
    let purged = auth.identity().purge_expired_sessions().await?;
    let evicted = auth.cache().evict_stale(Utc::now());
    if purged > 0 || evicted > 0 {
        tracing::info!(purged, evicted, "Session sweep removed stale entries");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::{
        auth::{
            cache::{AdvisoryProfile, SessionCache},
            service::AuthSettings,
        },
        models::Profile,
        store::{memory::MemoryStore, IdentityProvider},
    };

    #[tokio::test]
    async fn sweep_purges_expired_sessions_and_stale_snapshots() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(SessionCache::new(ChronoDuration::minutes(3)));
        let auth = AuthService::new(
            store.clone(),
            store.clone(),
            cache.clone(),
            AuthSettings { session_ttl: ChronoDuration::days(1), enforce_password_strength: false },
        );

        let user = store.create_user("ana@hotel.test", "hash").await.unwrap();
        store.open_session(user.id, Utc::now() + ChronoDuration::days(1)).await.unwrap();
        store.expire_all_sessions();

        let profile = Profile {
            id:         user.id,
            role:       None,
            full_name:  None,
            phone:      None,
            email:      None,
            avatar_url: None,
        };
        let old = Utc::now() - ChronoDuration::minutes(10);
        cache.store("old", AdvisoryProfile::new(user.clone(), profile.clone(), old));
        cache.store("new", AdvisoryProfile::new(user, profile, Utc::now()));

        run_session_sweep(&auth).await.unwrap();
        assert_eq!(store.session_count(), 0);
        assert_eq!(cache.len(), 1);
    }
}
