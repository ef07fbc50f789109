// SPDX-License-Identifier: Apache-2.0
//! Request-protection policy declarations.
//!
//! This module only *declares* the rule set; evaluation is delegated to the
//! governor middleware wired up in `main`. `LIVE` rules enforce, `DRY_RUN`
//! rules are declared and logged but never block a request.

use std::time::Duration;

use actix_governor::governor::clock::QuantaInstant;
use actix_governor::governor::middleware::NoOpMiddleware;
use actix_governor::{GovernorConfig, GovernorConfigBuilder, KeyExtractor, SimpleKeyExtractionError};
use actix_web::dev::ServiceRequest;
use tracing::info;

/// Enforcement mode for a rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShieldMode {
    /// Actively enforce: suspicious or over-limit requests are rejected.
    Live,
    /// Log what would have been rejected, reject nothing.
    DryRun,
}

impl ShieldMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "LIVE" => Some(ShieldMode::Live),
            "DRY_RUN" | "DRYRUN" => Some(ShieldMode::DryRun),
            _ => None,
        }
    }
}

/// Request attribute used to bucket clients for rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Characteristic {
    /// Derived client fingerprint (ip + user agent).
    Fingerprint,
}

/// A single protection rule. Window rules are translated into governor
/// quotas; the remaining rules are contracts for the upstream engine and
/// carry configuration only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionRule {
    Shield { mode: ShieldMode },
    FixedWindow { max: u32, window: Duration },
    SlidingWindow { max: u32, interval: Duration },
    DetectBot { allow: Vec<String> },
    /// Signup hardening: denied email categories (e.g. "DISPOSABLE",
    /// "INVALID", "NO_MX_RECORDS").
    ProtectSignup { deny_email: Vec<String> },
    /// Denied sensitive entity types in request bodies (e.g.
    /// "CREDIT_CARD_NUMBER").
    SensitiveInfo { deny: Vec<String> },
}

/// Rule builders, exported for reuse by route-level policies.
pub fn shield(mode: ShieldMode) -> ProtectionRule {
    ProtectionRule::Shield { mode }
}

pub fn fixed_window(max: u32, window: Duration) -> ProtectionRule {
    ProtectionRule::FixedWindow { max, window }
}

pub fn sliding_window(max: u32, interval: Duration) -> ProtectionRule {
    ProtectionRule::SlidingWindow { max, interval }
}

pub fn detect_bot(allow: Vec<String>) -> ProtectionRule {
    ProtectionRule::DetectBot { allow }
}

pub fn protect_signup(deny_email: Vec<String>) -> ProtectionRule {
    ProtectionRule::ProtectSignup { deny_email }
}

pub fn sensitive_info(deny: Vec<String>) -> ProtectionRule {
    ProtectionRule::SensitiveInfo { deny }
}

/// Static, process-wide protection configuration. Built once at startup and
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct ProtectionPolicy {
    pub api_key: String,
    pub mode: ShieldMode,
    pub characteristics: Vec<Characteristic>,
    pub rules: Vec<ProtectionRule>,
}

impl ProtectionPolicy {
    /// The base rule set: one shield rule keyed by the client fingerprint.
    pub fn base(api_key: String, mode: ShieldMode) -> Self {
        Self {
            api_key,
            mode,
            characteristics: vec![Characteristic::Fingerprint],
            rules: vec![shield(mode)],
        }
    }

    pub fn with_rule(mut self, rule: ProtectionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn is_enforcing(&self) -> bool {
        self.mode == ShieldMode::Live
    }

    /// Strictest requests-per-window quota declared by any window rule,
    /// normalized to (burst, replenish interval).
    pub fn window_quota(&self) -> Option<(u32, Duration)> {
        self.rules
            .iter()
            .filter_map(|rule| match rule {
                ProtectionRule::FixedWindow { max, window } => Some((*max, *window)),
                ProtectionRule::SlidingWindow { max, interval } => Some((*max, *interval)),
                _ => None,
            })
            .min_by_key(|(max, _)| *max)
    }

    pub fn log_registration(&self) {
        info!(
            mode = ?self.mode,
            rules = self.rules.len(),
            enforcing = self.is_enforcing(),
            "protection policy registered"
        );
    }
}

/// Governor key extractor implementing the fingerprint characteristic:
/// clients are bucketed by a hash of peer ip and user agent.
#[derive(Clone)]
pub struct FingerprintKey;

impl KeyExtractor for FingerprintKey {
    type Key = u64;
    type KeyExtractionError = SimpleKeyExtractionError<&'static str>;

    fn extract(&self, req: &ServiceRequest) -> Result<Self::Key, Self::KeyExtractionError> {
        let info = req.connection_info();
        let ip = info
            .realip_remote_addr()
            .ok_or_else(|| SimpleKeyExtractionError::new("could not determine peer address"))?;
        let user_agent = req
            .headers()
            .get(actix_web::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        Ok(fingerprint(ip, user_agent))
    }
}

/// Derives the fingerprint bucket for a client.
pub fn fingerprint(ip: &str, user_agent: &str) -> u64 {
    fxhash::hash64(&(ip, user_agent))
}

/// Translates the policy's window rules into a governor configuration.
/// Returns `None` when the policy declares no window rule (the base shield
/// policy alone produces no quota).
pub fn governor_config(
    policy: &ProtectionPolicy,
) -> Option<GovernorConfig<FingerprintKey, NoOpMiddleware<QuantaInstant>>> {
    let (max, window) = policy.window_quota()?;
    let replenish_ms = (window.as_millis() as u64 / u64::from(max.max(1))).max(1);
    GovernorConfigBuilder::default()
        .milliseconds_per_request(replenish_ms)
        .burst_size(max)
        .key_extractor(FingerprintKey)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_policy_is_one_shield_rule_on_fingerprint() {
        let policy = ProtectionPolicy::base("ajkey_test".into(), ShieldMode::Live);
        assert_eq!(policy.characteristics, vec![Characteristic::Fingerprint]);
        assert_eq!(policy.rules, vec![shield(ShieldMode::Live)]);
        assert!(policy.is_enforcing());
        assert!(policy.window_quota().is_none());
    }

    #[test]
    fn dry_run_does_not_enforce() {
        let policy = ProtectionPolicy::base("ajkey_test".into(), ShieldMode::DryRun);
        assert!(!policy.is_enforcing());
    }

    #[test]
    fn window_quota_picks_strictest_rule() {
        let policy = ProtectionPolicy::base("ajkey_test".into(), ShieldMode::Live)
            .with_rule(sliding_window(10, Duration::from_secs(60)))
            .with_rule(fixed_window(5, Duration::from_secs(60)));
        assert_eq!(policy.window_quota(), Some((5, Duration::from_secs(60))));
    }

    #[test]
    fn signup_and_sensitive_info_rules_are_config_only() {
        let policy = ProtectionPolicy::base("ajkey_test".into(), ShieldMode::Live)
            .with_rule(protect_signup(vec!["DISPOSABLE".into(), "INVALID".into()]))
            .with_rule(sensitive_info(vec!["CREDIT_CARD_NUMBER".into()]));
        assert_eq!(policy.rules.len(), 3);
        assert!(policy.rules.contains(&ProtectionRule::ProtectSignup {
            deny_email: vec!["DISPOSABLE".into(), "INVALID".into()],
        }));
        assert!(policy.rules.contains(&ProtectionRule::SensitiveInfo {
            deny: vec!["CREDIT_CARD_NUMBER".into()],
        }));
        // Neither rule yields a governor quota
        assert!(policy.window_quota().is_none());
        assert!(governor_config(&policy).is_none());
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!(ShieldMode::parse("live"), Some(ShieldMode::Live));
        assert_eq!(ShieldMode::parse("DRY_RUN"), Some(ShieldMode::DryRun));
        assert_eq!(ShieldMode::parse("off"), None);
    }

    #[test]
    fn fingerprint_is_stable_per_client_and_distinct_across_clients() {
        let a = fingerprint("10.0.0.1", "Mozilla/5.0");
        let b = fingerprint("10.0.0.1", "Mozilla/5.0");
        let c = fingerprint("10.0.0.2", "Mozilla/5.0");
        let d = fingerprint("10.0.0.1", "curl/8.0");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn governor_config_requires_a_window_rule() {
        let base = ProtectionPolicy::base("ajkey_test".into(), ShieldMode::Live);
        assert!(governor_config(&base).is_none());
        let limited = base.with_rule(sliding_window(5, Duration::from_secs(60)));
        assert!(governor_config(&limited).is_some());
    }
}
