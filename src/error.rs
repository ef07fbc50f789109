// SPDX-License-Identifier: Apache-2.0
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::store::StoreError;

pub type AuthResult<T> = Result<T, AuthError>;

/// Error taxonomy for the gateway. Startup errors abort the process before
/// the server binds; request-time errors map onto HTTP responses below.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required configuration key is absent. Fatal at startup.
    #[error("missing required configuration: {0}")]
    ConfigMissing(&'static str),

    /// A configuration value failed type validation. Fatal at startup.
    #[error("invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: &'static str, reason: String },

    /// The OTP email could not be dispatched. The challenge is not rolled
    /// back; the user retries the request.
    #[error("failed to dispatch email: {0}")]
    Dispatch(#[from] DispatchError),

    /// No unexpired challenge matched the submitted code. Deliberately does
    /// not distinguish unknown email from wrong or expired code.
    #[error("invalid or expired code")]
    InvalidOrExpiredCode,

    /// The external identity provider rejected the sign-in.
    #[error("social authentication failed: {0}")]
    SocialAuthFailed(String),

    /// Data-store failure, surfaced generically.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// The caller lacks the admin capability.
    #[error("forbidden")]
    Forbidden,

    /// Missing, expired, or revoked session token.
    #[error("invalid session")]
    SessionInvalid,

    /// Session token could not be minted.
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidOrExpiredCode
            | AuthError::SocialAuthFailed(_)
            | AuthError::SessionInvalid => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::ConfigMissing(_)
            | AuthError::ConfigInvalid { .. }
            | AuthError::Dispatch(_)
            | AuthError::Persistence(_)
            | AuthError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal detail stays in the logs; clients get the generic message.
        let message = match self {
            AuthError::Persistence(_) | AuthError::Token(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_failures_are_unauthorized() {
        assert_eq!(
            AuthError::InvalidOrExpiredCode.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::SessionInvalid.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn persistence_detail_is_not_leaked() {
        let err = AuthError::Persistence(StoreError::LockPoisoned("identities".into()));
        let body = err.error_response();
        assert_eq!(body.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn admin_checks_are_forbidden() {
        assert_eq!(AuthError::Forbidden.status_code(), StatusCode::FORBIDDEN);
    }
}
