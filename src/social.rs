//! GitHub federation. The provider verifies the user; this service only
//! consumes the provider-issued identifier and address.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::GithubConfig;
use crate::error::{AuthError, AuthResult};

pub const GITHUB_PROVIDER: &str = "github";

const ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";

/// What the rest of the service sees after a successful provider exchange.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub external_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    email: Option<String>,
}

impl GithubUser {
    fn address(&self) -> String {
        // GitHub hides the address for users with private email settings
        self.email
            .clone()
            .unwrap_or_else(|| format!("{}@users.noreply.github.com", self.login))
    }
}

pub struct GithubProvider {
    client_id: String,
    client_secret: String,
}

impl GithubProvider {
    pub fn new(config: &GithubConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    /// Exchanges an authorization code for the verified external identity.
    /// Every failure along the way surfaces as `SocialAuthFailed`.
    #[instrument(skip(self, code))]
    pub async fn verify_code(&self, code: &str) -> AuthResult<VerifiedIdentity> {
        let client = awc::ClientBuilder::new()
            .timeout(Duration::from_secs(10))
            .finish();

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
        ];
        let mut token_res = client
            .post(ACCESS_TOKEN_URL)
            .insert_header(("Accept", "application/json"))
            .send_form(&form)
            .await
            .map_err(|e| AuthError::SocialAuthFailed(e.to_string()))?;
        let token: AccessTokenResponse = token_res
            .json()
            .await
            .map_err(|e| AuthError::SocialAuthFailed(e.to_string()))?;
        let access_token = token.access_token.ok_or_else(|| {
            AuthError::SocialAuthFailed(
                token
                    .error_description
                    .unwrap_or_else(|| "no access token returned".to_string()),
            )
        })?;

        let mut user_res = client
            .get(USER_URL)
            .insert_header(("Authorization", format!("Bearer {access_token}")))
            .insert_header(("User-Agent", "learngate"))
            .send()
            .await
            .map_err(|e| AuthError::SocialAuthFailed(e.to_string()))?;
        let user: GithubUser = user_res
            .json()
            .await
            .map_err(|e| AuthError::SocialAuthFailed(e.to_string()))?;

        debug!(external_id = user.id, "github identity verified");
        Ok(VerifiedIdentity {
            external_id: user.id.to_string(),
            email: user.address(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_email_falls_back_to_noreply_address() {
        let user: GithubUser =
            serde_json::from_str(r#"{"id": 4242, "login": "abel", "email": null}"#).unwrap();
        assert_eq!(user.address(), "abel@users.noreply.github.com");
    }

    #[test]
    fn public_email_is_used_directly() {
        let user: GithubUser =
            serde_json::from_str(r#"{"id": 4242, "login": "abel", "email": "abel@b.com"}"#)
                .unwrap();
        assert_eq!(user.address(), "abel@b.com");
    }

    #[test]
    fn token_error_payload_parses() {
        let res: AccessTokenResponse =
            serde_json::from_str(r#"{"error": "bad_verification_code", "error_description": "The code is incorrect."}"#)
                .unwrap();
        assert!(res.access_token.is_none());
        assert_eq!(res.error_description.as_deref(), Some("The code is incorrect."));
    }
}
