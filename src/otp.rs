// SPDX-License-Identifier: Apache-2.0
use std::time::{Duration, SystemTime};

use rand::Rng;

/// Number of digits in a generated code.
pub const OTP_LENGTH: usize = 6;

/// Generates a zero-padded numeric one-time password.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..OTP_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// An ephemeral verification challenge. At most one is active per email:
/// storing a new challenge for the same address supersedes the old one, and
/// a successful verification consumes it.
#[derive(Debug, Clone)]
pub struct OtpChallenge {
    pub email: String,
    pub code: String,
    pub issued_at: SystemTime,
    pub expires_at: SystemTime,
}

impl OtpChallenge {
    pub fn new(email: &str, code: String, ttl: Duration) -> Self {
        let issued_at = SystemTime::now();
        Self {
            email: email.to_string(),
            code,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        // Clock skew reads as expired rather than panicking
        SystemTime::now() >= self.expires_at
    }

    pub fn matches(&self, submitted: &str) -> bool {
        !self.is_expired() && self.code == submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), OTP_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn fresh_challenge_matches_its_own_code() {
        let challenge = OtpChallenge::new("a@b.com", "123456".into(), Duration::from_secs(300));
        assert!(challenge.matches("123456"));
        assert!(!challenge.matches("654321"));
    }

    #[test]
    fn zero_ttl_challenge_is_expired() {
        let challenge = OtpChallenge::new("a@b.com", "123456".into(), Duration::from_secs(0));
        assert!(challenge.is_expired());
        assert!(!challenge.matches("123456"));
    }
}
