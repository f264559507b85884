//! Auth service: sign-up, sign-in, sign-out and profile refresh.
//!
//! Every successful call yields an explicit [`AuthSession`] that handlers pass
//! along; there is no ambient "current user". Every fresh read is written
//! through to the advisory [`SessionCache`].

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::{
    auth::{
        cache::{AdvisoryProfile, SessionCache},
        destination::{post_login_destination, HOME},
        hash_password, normalize_email,
        role::{resolve_role, AuthoritativeRole, SessionState},
        validate_password_strength, verify_password,
    },
    models::{Profile, ProfileFields, User, UserRole},
    store::{IdentityProvider, ProfileStore, ProfileUpsert, StoreError},
};

/// Navigation after sign-in is deferred so dependent client state settles first.
pub const SIGN_IN_REDIRECT_DELAY_MS: u64 = 200;
pub const SIGN_UP_REDIRECT_DELAY_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("A user with this email already exists. Please login instead.")]
    EmailTaken,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Could not fetch user profile")]
    ProfileUnavailable,
    #[error("Internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::EmailTaken         => "email_taken",
            AuthError::InvalidInput(_)    => "invalid_input",
            AuthError::ProfileUnavailable => "profile_unavailable",
            AuthError::Internal(_) | AuthError::Store(_) => "internal",
        }
    }
}

/// The authenticated caller of one request.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user:    User,
    pub profile: Profile,
    pub role:    AuthoritativeRole,
    pub token:   String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostLoginRedirect {
    pub to:       String,
    pub delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SignedIn {
    pub session:  AuthSession,
    pub snapshot: AdvisoryProfile,
    pub redirect: PostLoginRedirect,
}

#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email:    String,
    pub password: String,
    pub role:     UserRole,
    pub fields:   ProfileFields,
}

/// Answer for `/auth/me`. `advisory` is set when it came from the cache.
#[derive(Debug, Clone, Serialize)]
pub struct MeView {
    #[serde(flatten)]
    pub snapshot: AdvisoryProfile,
    pub advisory: bool,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub session_ttl:               Duration,
    pub enforce_password_strength: bool,
}

#[derive(Clone)]
pub struct AuthService {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    cache:    Arc<SessionCache>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        cache: Arc<SessionCache>,
        settings: AuthSettings,
    ) -> Self {
        Self { identity, profiles, cache, settings }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    #[cfg(test)]
    pub fn profiles(&self) -> &dyn ProfileStore {
        self.profiles.as_ref()
    }

    // ── Sign-in / sign-up ────────────────────────────────────

    /// Authenticates and resolves the profile. An identity without a usable
    /// profile (missing row, no role, unreadable) is a failed sign-in, and no
    /// session is opened for it.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        redirected_from: Option<&str>,
        previous_token: Option<&str>,
    ) -> Result<SignedIn, AuthError> {
        let email = normalize_email(email);

        let credentials = self
            .identity
            .find_credentials(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, &credentials.password_hash)?;

        let user = credentials.user;
        let (profile, role) = self.load_profile(&user).await?;
        let token = self.open_session(&user).await?;
        self.replace_previous(previous_token, &token).await;

        tracing::info!(user_id = %user.id, role = %role.role(), "User signed in");
        Ok(self.establish(user, profile, role, token, redirected_from, SIGN_IN_REDIRECT_DELAY_MS))
    }

    /// Creates the identity and its profile, then signs the new user in.
    pub async fn sign_up(
        &self,
        request: SignUpRequest,
        redirected_from: Option<&str>,
        previous_token: Option<&str>,
    ) -> Result<SignedIn, AuthError> {
        let email = normalize_email(&request.email);
        if !email.contains('@') || email.len() < 5 {
            return Err(AuthError::InvalidInput("Invalid email address".into()));
        }
        if self.settings.enforce_password_strength {
            validate_password_strength(&request.password)?;
        }

        if self.identity.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let hash = hash_password(&request.password)?;
        let user = match self.identity.create_user(&email, &hash).await {
            Ok(user) => user,
            // Lost a race with a concurrent sign-up for the same address.
            Err(StoreError::Conflict(_)) => return Err(AuthError::EmailTaken),
            Err(err) => return Err(err.into()),
        };

        let profile = self
            .profiles
            .upsert(&ProfileUpsert {
                id:         user.id,
                role:       request.role,
                email:      Some(email),
                full_name:  request.fields.full_name,
                phone:      request.fields.phone,
                avatar_url: request.fields.avatar_url,
            })
            .await?;
        let role = profile
            .role
            .map(AuthoritativeRole::from_fresh_read)
            .ok_or(AuthError::ProfileUnavailable)?;
        let token = self.open_session(&user).await?;
        self.replace_previous(previous_token, &token).await;

        tracing::info!(user_id = %user.id, role = %role.role(), "User signed up");
        Ok(self.establish(user, profile, role, token, redirected_from, SIGN_UP_REDIRECT_DELAY_MS))
    }

    // ── Sign-out ─────────────────────────────────────────────

    /// Ends the session if there is one. Never fails; returns where the
    /// client goes next.
    pub async fn sign_out(&self, token: Option<&str>) -> &'static str {
        if let Some(token) = token {
            self.discard_session(token).await;
        }
        HOME
    }

    // ── Session resolution ───────────────────────────────────

    /// Authoritative lookup of the session behind `token`. `Ok(None)` when the
    /// token is unknown or expired; `ProfileUnavailable` when the identity is
    /// live but has no usable profile.
    pub async fn current(&self, token: &str) -> Result<Option<AuthSession>, AuthError> {
        let Some(user) = self.identity.resolve_session(token).await? else {
            self.cache.evict(token);
            return Ok(None);
        };
        let (profile, role) = match self.load_profile(&user).await {
            Ok(found) => found,
            Err(err) => {
                self.cache.evict(token);
                return Err(err);
            }
        };
        let session = AuthSession { user, profile, role, token: token.to_owned() };
        self.remember(&session);
        Ok(Some(session))
    }

    /// Session state for the route guard: identity from the provider, role
    /// freshly read from the profile store.
    pub async fn session_state(&self, token: Option<&str>) -> SessionState {
        let Some(token) = token else {
            return SessionState::Anonymous;
        };
        let user = match self.identity.resolve_session(token).await {
            Ok(Some(user)) => user,
            Ok(None) => return SessionState::Anonymous,
            Err(err) => {
                tracing::error!(error = %err, "Session lookup failed");
                return SessionState::Anonymous;
            }
        };
        match resolve_role(self.profiles.as_ref(), user.id).await {
            Some(role) => SessionState::Authenticated(role),
            None => SessionState::Unresolvable,
        }
    }

    /// Re-reads the profile of the signed-in user and replaces the cached
    /// copy. Without a session this is a no-op.
    pub async fn refresh_profile(
        &self,
        session: Option<&AuthSession>,
    ) -> Result<Option<AdvisoryProfile>, AuthError> {
        let Some(session) = session else {
            return Ok(None);
        };
        match self.profiles.get(session.user.id).await? {
            Some(profile) => {
                let snapshot = AdvisoryProfile::new(session.user.clone(), profile, Utc::now());
                self.cache.store(&session.token, snapshot.clone());
                Ok(Some(snapshot))
            }
            None => {
                self.cache.evict(&session.token);
                Err(AuthError::ProfileUnavailable)
            }
        }
    }

    /// Serves a fresh cached snapshot right away and reconciles it in the
    /// background; otherwise reconciles before answering.
    pub async fn me(&self, token: &str) -> Result<Option<MeView>, AuthError> {
        if let Some(cached) = self.cache.fresh(token, Utc::now()) {
            let service = self.clone();
            let token = token.to_owned();
            tokio::spawn(async move {
                if let Err(err) = service.reconcile(&token).await {
                    tracing::warn!(error = %err, "Background session reconciliation failed");
                }
            });
            return Ok(Some(MeView { snapshot: cached, advisory: true }));
        }

        Ok(self
            .reconcile(token)
            .await?
            .map(|snapshot| MeView { snapshot, advisory: false }))
    }

    /// Brings the cache entry for `token` in line with the stores.
    pub async fn reconcile(&self, token: &str) -> Result<Option<AdvisoryProfile>, AuthError> {
        match self.current(token).await {
            Ok(Some(session)) => Ok(Some(self.remember(&session))),
            Ok(None) | Err(AuthError::ProfileUnavailable) => Ok(None),
            Err(err) => Err(err),
        }
    }

    // ── Internal helpers ─────────────────────────────────────

    async fn load_profile(&self, user: &User) -> Result<(Profile, AuthoritativeRole), AuthError> {
        let profile = match self.profiles.get(user.id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::warn!(user_id = %user.id, "No profile row for user");
                return Err(AuthError::ProfileUnavailable);
            }
            Err(err) => {
                tracing::error!(user_id = %user.id, error = %err, "Profile fetch failed");
                return Err(AuthError::ProfileUnavailable);
            }
        };
        let role = profile.role.ok_or_else(|| {
            tracing::warn!(user_id = %user.id, "Profile has no role");
            AuthError::ProfileUnavailable
        })?;
        Ok((profile, AuthoritativeRole::from_fresh_read(role)))
    }

    async fn open_session(&self, user: &User) -> Result<String, AuthError> {
        let expires_at = Utc::now() + self.settings.session_ttl;
        Ok(self.identity.open_session(user.id, expires_at).await?)
    }

    /// Closes the session this client held before a successful sign-in.
    async fn replace_previous(&self, previous: Option<&str>, current: &str) {
        if let Some(previous) = previous.filter(|p| *p != current) {
            self.discard_session(previous).await;
        }
    }

    async fn discard_session(&self, token: &str) {
        self.cache.evict(token);
        if let Err(err) = self.identity.close_session(token).await {
            tracing::warn!(error = %err, "Failed to close session");
        }
    }

    fn remember(&self, session: &AuthSession) -> AdvisoryProfile {
        let snapshot = AdvisoryProfile::new(session.user.clone(), session.profile.clone(), Utc::now());
        self.cache.store(&session.token, snapshot.clone());
        snapshot
    }

    fn establish(
        &self,
        user: User,
        profile: Profile,
        role: AuthoritativeRole,
        token: String,
        redirected_from: Option<&str>,
        delay_ms: u64,
    ) -> SignedIn {
        let session = AuthSession { user, profile, role, token };
        let snapshot = self.remember(&session);
        let redirect = PostLoginRedirect {
            to: post_login_destination(Some(role.role()), redirected_from),
            delay_ms,
        };
        SignedIn { session, snapshot, redirect }
    }
}
