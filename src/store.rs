// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use lru::LruCache;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::otp::OtpChallenge;

/// Upper bound on concurrently pending challenges. Oldest entries are
/// evicted first, which for ephemeral codes is equivalent to expiry.
const CHALLENGE_CACHE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialLink {
    pub provider: String,
    pub external_id: String,
}

/// A user record. Created on first successful authentication; the admin
/// flag is the only mutable attribute this service touches afterwards.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub social: Option<SocialLink>,
    pub is_admin: bool,
    pub created_at: SystemTime,
}

/// A stored session bound to an identity. The token doubles as the lookup
/// key; deleting the record revokes the session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub token: String,
    pub identity_id: Uuid,
    pub expires_at: SystemTime,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("no such {0}")]
    NotFound(&'static str),
}

/// Persistence adapter boundary for identities, sessions, and pending OTP
/// challenges. Implementations guarantee atomic single-record writes only;
/// no cross-record transactions are assumed. A relational adapter plugs in
/// behind this trait.
pub trait AuthStore: Send + Sync {
    fn upsert_identity(&self, email: &str) -> Result<Identity, StoreError>;
    fn find_identity(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;
    fn link_social(
        &self,
        provider: &str,
        external_id: &str,
        email: &str,
    ) -> Result<Identity, StoreError>;
    fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<Identity, StoreError>;

    /// Stores a challenge, superseding any prior challenge for the same
    /// email. Last writer wins under concurrency.
    fn put_challenge(&self, challenge: OtpChallenge) -> Result<(), StoreError>;
    fn get_challenge(&self, email: &str) -> Result<Option<OtpChallenge>, StoreError>;
    fn delete_challenge(&self, email: &str) -> Result<(), StoreError>;

    fn put_session(&self, session: SessionRecord) -> Result<(), StoreError>;
    fn get_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError>;
    fn delete_session(&self, token: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Inner {
    identities: HashMap<Uuid, Identity>,
    by_email: HashMap<String, Uuid>,
    by_social: HashMap<(String, String), Uuid>,
    sessions: HashMap<String, SessionRecord>,
}

/// In-memory store used in development and tests.
pub struct MemoryAuthStore {
    inner: Arc<RwLock<Inner>>,
    challenges: Mutex<LruCache<String, OtpChallenge>>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            challenges: Mutex::new(LruCache::new(
                NonZeroUsize::new(CHALLENGE_CACHE_CAPACITY).unwrap(),
            )),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn challenges(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, LruCache<String, OtpChallenge>>, StoreError> {
        self.challenges
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryAuthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStore for MemoryAuthStore {
    fn upsert_identity(&self, email: &str) -> Result<Identity, StoreError> {
        let mut inner = self.write()?;
        if let Some(id) = inner.by_email.get(email).copied() {
            return inner
                .identities
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound("identity"));
        }
        let identity = Identity {
            id: Uuid::new_v4(),
            email: email.to_string(),
            social: None,
            is_admin: false,
            created_at: SystemTime::now(),
        };
        debug!(email = %email, id = %identity.id, "created identity");
        inner.by_email.insert(email.to_string(), identity.id);
        inner.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    fn find_identity(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.read()?.identities.get(&id).cloned())
    }

    fn link_social(
        &self,
        provider: &str,
        external_id: &str,
        email: &str,
    ) -> Result<Identity, StoreError> {
        let key = (provider.to_string(), external_id.to_string());
        {
            let inner = self.read()?;
            if let Some(id) = inner.by_social.get(&key).copied() {
                return inner
                    .identities
                    .get(&id)
                    .cloned()
                    .ok_or(StoreError::NotFound("identity"));
            }
        }
        let identity = self.upsert_identity(email)?;
        let mut inner = self.write()?;
        let record = inner
            .identities
            .get_mut(&identity.id)
            .ok_or(StoreError::NotFound("identity"))?;
        record.social = Some(SocialLink {
            provider: provider.to_string(),
            external_id: external_id.to_string(),
        });
        let linked = record.clone();
        inner.by_social.insert(key, linked.id);
        Ok(linked)
    }

    fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<Identity, StoreError> {
        let mut inner = self.write()?;
        let record = inner
            .identities
            .get_mut(&id)
            .ok_or(StoreError::NotFound("identity"))?;
        record.is_admin = is_admin;
        Ok(record.clone())
    }

    fn put_challenge(&self, challenge: OtpChallenge) -> Result<(), StoreError> {
        self.challenges()?.put(challenge.email.clone(), challenge);
        Ok(())
    }

    fn get_challenge(&self, email: &str) -> Result<Option<OtpChallenge>, StoreError> {
        Ok(self.challenges()?.get(email).cloned())
    }

    fn delete_challenge(&self, email: &str) -> Result<(), StoreError> {
        self.challenges()?.pop(email);
        Ok(())
    }

    fn put_session(&self, session: SessionRecord) -> Result<(), StoreError> {
        self.write()?.sessions.insert(session.token.clone(), session);
        Ok(())
    }

    fn get_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.read()?.sessions.get(token).cloned())
    }

    fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        self.write()?.sessions.remove(token);
        Ok(())
    }
}
