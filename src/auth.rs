use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dispatch::{EmailDispatcher, render_otp_body};
use crate::email::EmailConfig;
use crate::error::{AuthError, AuthResult};
use crate::otp::{OtpChallenge, generate_code};
use crate::session;
use crate::store::{AuthStore, Identity, SessionRecord};

/// Capabilities checked through the role hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Admin,
}

/// Fixed extension points around the authentication flow. `before_issue`
/// can veto an OTP request (e.g. an address blocklist), `on_verify` observes
/// each successful authentication, and `role_check` gates capabilities.
pub trait AuthHooks: Send + Sync {
    fn before_issue(&self, _email: &str) -> AuthResult<()> {
        Ok(())
    }

    fn on_verify(&self, _identity: &Identity) {}

    fn role_check(&self, identity: &Identity, capability: Capability) -> bool {
        match capability {
            Capability::Admin => identity.is_admin,
        }
    }
}

/// Hooks with no additional behavior.
pub struct DefaultHooks;

impl AuthHooks for DefaultHooks {}

/// Issues and verifies email one-time passwords, federates social sign-in,
/// and manages sessions and the admin role. Owns the Identity, OtpChallenge
/// and SessionRecord lifecycles; the store is a storage collaborator only.
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    dispatcher: Arc<dyn EmailDispatcher>,
    hooks: Arc<dyn AuthHooks>,
    email: EmailConfig,
    otp_ttl: Duration,
    session_ttl_minutes: u64,
    session_secret: Vec<u8>,
    bootstrap_admins: Vec<String>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        dispatcher: Arc<dyn EmailDispatcher>,
        hooks: Arc<dyn AuthHooks>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            hooks,
            email: config.email.clone(),
            otp_ttl: config.otp_ttl,
            session_ttl_minutes: config.session_ttl_minutes,
            session_secret: config.session_secret.clone(),
            bootstrap_admins: config.bootstrap_admins.clone(),
        }
    }

    /// Issues a fresh challenge for the address and emails the code.
    ///
    /// Any prior unexpired challenge for the same email is superseded. The
    /// challenge is stored before the send, so a dispatch failure leaves it
    /// in place and the caller simply retries. Exactly one email per call,
    /// no retries; the code never travels back to the caller.
    #[instrument(skip(self), fields(email = %email))]
    pub fn request_otp(&self, email: &str) -> AuthResult<()> {
        self.hooks.before_issue(email)?;

        let code = generate_code();
        self.store
            .put_challenge(OtpChallenge::new(email, code.clone(), self.otp_ttl))?;

        let html = render_otp_body(&self.email.body_template, &code);
        self.dispatcher.send(
            &self.email.from_address,
            &self.email.recipients,
            &self.email.subject,
            &html,
        )?;

        info!("otp challenge issued");
        Ok(())
    }

    /// Verifies a submitted code and opens a session.
    ///
    /// Succeeds only against an unexpired challenge with an exact code
    /// match, and consumes the challenge on success. Every failure reads as
    /// `InvalidOrExpiredCode` so callers cannot probe which emails exist.
    /// A wrong code leaves the challenge intact for another attempt.
    #[instrument(skip(self, code), fields(email = %email))]
    pub fn verify_otp(&self, email: &str, code: &str) -> AuthResult<String> {
        let challenge = self
            .store
            .get_challenge(email)?
            .ok_or(AuthError::InvalidOrExpiredCode)?;

        if !challenge.matches(code) {
            if challenge.is_expired() {
                self.store.delete_challenge(email)?;
            } else {
                warn!("otp mismatch");
            }
            return Err(AuthError::InvalidOrExpiredCode);
        }

        self.store.delete_challenge(email)?;
        let identity = self.store.upsert_identity(email)?;
        let identity = self.bootstrap_admin(identity)?;
        self.hooks.on_verify(&identity);
        self.open_session(&identity)
    }

    /// Accepts an already-verified external identity and opens a session.
    /// Provider verification happens upstream; only the provider-issued
    /// identifier and address reach this point.
    #[instrument(skip(self), fields(provider = %provider, email = %email))]
    pub fn social_sign_in(
        &self,
        provider: &str,
        external_id: &str,
        email: &str,
    ) -> AuthResult<String> {
        let identity = self.store.link_social(provider, external_id, email)?;
        let identity = self.bootstrap_admin(identity)?;
        self.hooks.on_verify(&identity);
        self.open_session(&identity)
    }

    /// Resolves a session token to its identity. The token must decode,
    /// be unexpired, and still have a stored session record.
    pub fn authenticate(&self, token: &str) -> AuthResult<Identity> {
        let claims = session::verify_token(token, &self.session_secret)
            .map_err(|_| AuthError::SessionInvalid)?;

        let record = self
            .store
            .get_session(token)?
            .ok_or(AuthError::SessionInvalid)?;
        if SystemTime::now() >= record.expires_at {
            self.store.delete_session(token)?;
            return Err(AuthError::SessionInvalid);
        }

        let id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::SessionInvalid)?;
        self.store
            .find_identity(id)?
            .ok_or(AuthError::SessionInvalid)
    }

    /// Destroys the stored session; the token is dead from here on even
    /// though its JWT expiry may lie in the future.
    #[instrument(skip(self, token))]
    pub fn logout(&self, token: &str) -> AuthResult<()> {
        self.store.delete_session(token)?;
        Ok(())
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id, target = %target))]
    pub fn grant_admin(&self, actor: &Identity, target: Uuid) -> AuthResult<Identity> {
        if !self.hooks.role_check(actor, Capability::Admin) {
            return Err(AuthError::Forbidden);
        }
        let updated = self.store.set_admin(target, true)?;
        info!("admin granted");
        Ok(updated)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id, target = %target))]
    pub fn revoke_admin(&self, actor: &Identity, target: Uuid) -> AuthResult<Identity> {
        if !self.hooks.role_check(actor, Capability::Admin) {
            return Err(AuthError::Forbidden);
        }
        let updated = self.store.set_admin(target, false)?;
        info!("admin revoked");
        Ok(updated)
    }

    /// Elevates addresses on the configured bootstrap list. This is the
    /// superuser path that seeds the first administrator.
    fn bootstrap_admin(&self, identity: Identity) -> AuthResult<Identity> {
        if identity.is_admin {
            return Ok(identity);
        }
        let listed = self
            .bootstrap_admins
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&identity.email));
        if listed {
            return Ok(self.store.set_admin(identity.id, true)?);
        }
        Ok(identity)
    }

    fn open_session(&self, identity: &Identity) -> AuthResult<String> {
        let token = session::create_token(
            identity.id,
            &identity.email,
            self.session_ttl_minutes,
            &self.session_secret,
        )?;
        self.store.put_session(SessionRecord {
            token: token.clone(),
            identity_id: identity.id,
            expires_at: SystemTime::now() + Duration::from_secs(60 * self.session_ttl_minutes),
        })?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAuthStore;
    use std::sync::Mutex;

    struct NullDispatcher;

    impl EmailDispatcher for NullDispatcher {
        fn send(
            &self,
            _from: &str,
            _to: &[String],
            _subject: &str,
            _html_body: &str,
        ) -> Result<(), crate::dispatch::DispatchError> {
            Ok(())
        }
    }

    struct BlockingHooks {
        blocked: String,
        verified: Mutex<Vec<String>>,
    }

    impl AuthHooks for BlockingHooks {
        fn before_issue(&self, email: &str) -> AuthResult<()> {
            if email == self.blocked {
                return Err(AuthError::Forbidden);
            }
            Ok(())
        }

        fn on_verify(&self, identity: &Identity) {
            self.verified.lock().unwrap().push(identity.email.clone());
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::dev_default();
        config.bootstrap_admins = vec!["root@ethiolearners.dev".into()];
        config
    }

    fn service_with_hooks(hooks: Arc<dyn AuthHooks>) -> (AuthService, Arc<MemoryAuthStore>) {
        let store = Arc::new(MemoryAuthStore::new());
        let service = AuthService::new(
            store.clone(),
            Arc::new(NullDispatcher),
            hooks,
            &test_config(),
        );
        (service, store)
    }

    fn issued_code(store: &MemoryAuthStore, email: &str) -> String {
        store.get_challenge(email).unwrap().unwrap().code
    }

    #[test]
    fn before_issue_hook_can_veto() {
        let hooks = Arc::new(BlockingHooks {
            blocked: "spam@b.com".into(),
            verified: Mutex::new(vec![]),
        });
        let (service, _store) = service_with_hooks(hooks);
        assert!(matches!(
            service.request_otp("spam@b.com"),
            Err(AuthError::Forbidden)
        ));
        assert!(service.request_otp("ok@b.com").is_ok());
    }

    #[test]
    fn on_verify_hook_observes_success() {
        let hooks = Arc::new(BlockingHooks {
            blocked: String::new(),
            verified: Mutex::new(vec![]),
        });
        let (service, store) = service_with_hooks(hooks.clone());
        service.request_otp("a@b.com").unwrap();
        let code = issued_code(&store, "a@b.com");
        service.verify_otp("a@b.com", &code).unwrap();
        assert_eq!(*hooks.verified.lock().unwrap(), vec!["a@b.com".to_string()]);
    }

    #[test]
    fn grant_requires_admin_actor() {
        let (service, store) = service_with_hooks(Arc::new(DefaultHooks));
        let actor = store.upsert_identity("user@b.com").unwrap();
        let target = store.upsert_identity("other@b.com").unwrap();
        assert!(matches!(
            service.grant_admin(&actor, target.id),
            Err(AuthError::Forbidden)
        ));

        let actor = store.set_admin(actor.id, true).unwrap();
        let updated = service.grant_admin(&actor, target.id).unwrap();
        assert!(updated.is_admin);

        let updated = service.revoke_admin(&actor, target.id).unwrap();
        assert!(!updated.is_admin);
    }

    #[test]
    fn bootstrap_admin_elevates_on_first_verify() {
        let (service, store) = service_with_hooks(Arc::new(DefaultHooks));
        service.request_otp("root@ethiolearners.dev").unwrap();
        let code = issued_code(&store, "root@ethiolearners.dev");
        let token = service.verify_otp("root@ethiolearners.dev", &code).unwrap();
        let identity = service.authenticate(&token).unwrap();
        assert!(identity.is_admin);
    }

    #[test]
    fn logout_revokes_session() {
        let (service, store) = service_with_hooks(Arc::new(DefaultHooks));
        service.request_otp("a@b.com").unwrap();
        let code = issued_code(&store, "a@b.com");
        let token = service.verify_otp("a@b.com", &code).unwrap();
        assert!(service.authenticate(&token).is_ok());
        service.logout(&token).unwrap();
        assert!(matches!(
            service.authenticate(&token),
            Err(AuthError::SessionInvalid)
        ));
    }

    #[test]
    fn social_sign_in_links_and_opens_session() {
        let (service, _store) = service_with_hooks(Arc::new(DefaultHooks));
        let token = service
            .social_sign_in("github", "4242", "dev@b.com")
            .unwrap();
        let identity = service.authenticate(&token).unwrap();
        assert_eq!(identity.email, "dev@b.com");
        assert_eq!(identity.social.as_ref().unwrap().provider, "github");
    }
}
