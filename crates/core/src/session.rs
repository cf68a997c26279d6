//! Server-side sessions for the admin panel.
//!
//! A successful login stores the matched account (without its password)
//! under an opaque random id; the HTTP layer carries that id in a cookie.
//! Sessions expire after a fixed lifetime and are removed lazily on lookup
//! or in bulk by [`SessionStore::purge_expired`].

use crate::constants::MAX_SESSION_TTL_HOURS;
use crate::credentials::{CredentialStore, PublicUser};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Debug)]
pub struct Session {
    pub user: PublicUser,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Shared, cloneable session table.
#[derive(Clone, Debug)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    /// Lifetime is clamped to `1..=MAX_SESSION_TTL_HOURS`.
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::hours(ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS)),
        }
    }

    /// Session lifetime in seconds, as sent in the cookie's `Max-Age`.
    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Checks credentials and opens a session.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidCredentials` when no account matches; no
    /// session is created in that case.
    pub fn login(
        &self,
        credentials: &CredentialStore,
        username: &str,
        password: &str,
    ) -> CoreResult<(String, PublicUser)> {
        self.login_at(credentials, username, password, Utc::now())
    }

    pub fn login_at(
        &self,
        credentials: &CredentialStore,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<(String, PublicUser)> {
        let Some(account) = credentials.authenticate(username, password) else {
            tracing::warn!("failed admin login for username {:?}", username);
            return Err(CoreError::InvalidCredentials);
        };

        let user = account.public();
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        self.write().insert(
            session_id.clone(),
            Session {
                user: user.clone(),
                created_at: now,
                expires_at: now + self.ttl,
            },
        );

        tracing::info!("admin login for {}", user.username);
        Ok((session_id, user))
    }

    /// The live session for `session_id`, if any.
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.get_at(session_id, Utc::now())
    }

    pub fn get_at(&self, session_id: &str, now: DateTime<Utc>) -> Option<Session> {
        let session = self.read().get(session_id).cloned()?;
        if session.is_live_at(now) {
            return Some(session);
        }
        self.write().remove(session_id);
        None
    }

    /// Destroys a session. Returns whether one existed.
    pub fn logout(&self, session_id: &str) -> bool {
        self.write().remove(session_id).is_some()
    }

    /// Removes every expired session, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.is_live_at(now));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> CredentialStore {
        CredentialStore::from_reader(
            "username,password,name,language,role,list\nalice,pw1,Alice,en,admin,a\nbob,pw2,Bob,en,staff,b\n"
                .as_bytes(),
        )
        .unwrap()
    }

    fn t0() -> DateTime<Utc> {
        "2025-05-01T08:00:00Z".parse().unwrap()
    }

    #[test]
    fn wrong_password_creates_no_session() {
        let store = SessionStore::new(8);
        let err = store.login(&credentials(), "alice", "nope").unwrap_err();
        assert!(matches!(err, CoreError::InvalidCredentials));
        assert!(store.is_empty());
    }

    #[test]
    fn login_then_lookup_then_logout() {
        let store = SessionStore::new(8);
        let (id, user) = store.login(&credentials(), "bob", "pw2").unwrap();
        assert_eq!(user.username, "bob");
        assert_eq!(id.len(), 32);

        let session = store.get(&id).unwrap();
        assert_eq!(session.user, user);

        assert!(store.logout(&id));
        assert!(store.get(&id).is_none());
        assert!(!store.logout(&id));
    }

    #[test]
    fn lifetime_is_clamped_to_the_accepted_range() {
        assert_eq!(SessionStore::new(8).ttl_secs(), 8 * 3600);
        assert_eq!(SessionStore::new(0).ttl_secs(), 3600);
        assert_eq!(
            SessionStore::new(i64::MAX).ttl_secs(),
            MAX_SESSION_TTL_HOURS * 3600
        );
    }

    #[test]
    fn session_ids_are_unique() {
        let store = SessionStore::new(8);
        let (a, _) = store.login(&credentials(), "bob", "pw2").unwrap();
        let (b, _) = store.login(&credentials(), "bob", "pw2").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn expired_session_is_removed_on_lookup() {
        let store = SessionStore::new(1);
        let (id, _) = store.login_at(&credentials(), "alice", "pw1", t0()).unwrap();

        assert!(store.get_at(&id, t0() + Duration::minutes(59)).is_some());
        assert!(store.get_at(&id, t0() + Duration::hours(1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn purge_drops_only_expired() {
        let store = SessionStore::new(2);
        store.login_at(&credentials(), "alice", "pw1", t0()).unwrap();
        store
            .login_at(&credentials(), "bob", "pw2", t0() + Duration::hours(1))
            .unwrap();

        let removed = store.purge_expired_at(t0() + Duration::minutes(150));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }
}
