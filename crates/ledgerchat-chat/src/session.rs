//! Session tokens mapping to authenticated identities.
//!
//! Tokens are random 32-character hex strings. Issued sessions expire after
//! the configured TTL; seeded sessions never expire. Expired entries are
//! dropped when they are next resolved or on `purge_expired`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, info};

use ledgerchat_core::types::{Identity, UserId};

use crate::error::AuthError;

/// Upper bound on a configured TTL, roughly a century.
const MAX_TTL_MINUTES: u64 = 52_560_000;

/// Generate a random 32-character hex token.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

#[derive(Debug, Clone)]
struct Session {
    identity: Identity,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl_minutes: u64) -> Self {
        Self {
            ttl: Duration::minutes(ttl_minutes.min(MAX_TTL_MINUTES) as i64),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh token for `user`, valid for the configured TTL.
    pub fn issue(&self, user: UserId) -> String {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: UserId, now: DateTime<Utc>) -> String {
        let token = generate_token();
        let session = Session {
            identity: Identity::new(user),
            expires_at: now.checked_add_signed(self.ttl),
        };
        self.lock().insert(token.clone(), session);
        info!("Session issued");
        token
    }

    /// Register a known token that does not expire.
    pub fn insert(&self, token: impl Into<String>, user: UserId) {
        let session = Session {
            identity: Identity::new(user),
            expires_at: None,
        };
        self.lock().insert(token.into(), session);
    }

    pub fn resolve(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        self.resolve_at(token, Utc::now())
    }

    pub fn resolve_at(&self, token: Option<&str>, now: DateTime<Utc>) -> Result<Identity, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let mut sessions = self.lock();
        let session = sessions.get(token).ok_or(AuthError::UnknownToken)?;
        if session.is_expired(now) {
            sessions.remove(token);
            debug!("Expired session rejected");
            return Err(AuthError::Expired);
        }
        Ok(session.identity.clone())
    }

    /// Returns whether the token was known.
    pub fn revoke(&self, token: &str) -> bool {
        self.lock().remove(token).is_some()
    }

    /// Drop every expired session, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, "Purged expired sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        // Sessions hold no invariants a panicking writer could break.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_issue_and_resolve() {
        let store = SessionStore::new(60);
        let token = store.issue(UserId::new("alice"));
        let identity = store.resolve(Some(token.as_str())).unwrap();
        assert_eq!(identity.user_id, UserId::new("alice"));
    }

    #[test]
    fn test_missing_and_unknown_tokens() {
        let store = SessionStore::new(60);
        assert_eq!(store.resolve(None), Err(AuthError::MissingToken));
        assert_eq!(store.resolve(Some("  ")), Err(AuthError::MissingToken));
        assert_eq!(
            store.resolve(Some("0000000000000000")),
            Err(AuthError::UnknownToken)
        );
    }

    #[test]
    fn test_expired_token_rejected_and_removed() {
        let store = SessionStore::new(30);
        let issued = Utc::now();
        let token = store.issue_at(UserId::new("alice"), issued);

        assert!(store
            .resolve_at(Some(token.as_str()), issued + Duration::minutes(29))
            .is_ok());
        assert_eq!(
            store.resolve_at(Some(token.as_str()), issued + Duration::minutes(30)),
            Err(AuthError::Expired)
        );
        assert_eq!(
            store.resolve_at(Some(token.as_str()), issued + Duration::minutes(31)),
            Err(AuthError::UnknownToken)
        );
    }

    #[test]
    fn test_seeded_sessions_never_expire() {
        let store = SessionStore::new(1);
        store.insert("seeded", UserId::new("demo"));
        let far_future = Utc::now() + Duration::days(3650);
        assert!(store.resolve_at(Some("seeded"), far_future).is_ok());
        assert_eq!(store.purge_expired_at(far_future), 0);
    }

    #[test]
    fn test_revoke() {
        let store = SessionStore::new(60);
        let token = store.issue(UserId::new("alice"));
        assert!(store.revoke(&token));
        assert!(!store.revoke(&token));
        assert_eq!(store.resolve(Some(token.as_str())), Err(AuthError::UnknownToken));
    }

    #[test]
    fn test_purge_expired() {
        let store = SessionStore::new(10);
        let now = Utc::now();
        store.issue_at(UserId::new("a"), now - Duration::minutes(20));
        store.issue_at(UserId::new("b"), now - Duration::minutes(15));
        store.issue_at(UserId::new("c"), now);
        assert_eq!(store.len(), 3);
        assert_eq!(store.purge_expired_at(now), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_each_session_gets_its_own_identity() {
        let store = SessionStore::new(60);
        let first = store.issue(UserId::new("alice"));
        let second = store.issue(UserId::new("alice"));
        let a = store.resolve(Some(first.as_str())).unwrap();
        let b = store.resolve(Some(second.as_str())).unwrap();
        assert_eq!(a.user_id, b.user_id);
        assert_ne!(a.session_id, b.session_id);
    }
}
