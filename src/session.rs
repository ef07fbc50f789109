use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error as JwtError,
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // Identity id
    pub email: String, // Authenticated address
    pub exp: usize,    // Expiration time
    pub iat: usize,    // Issued at time
}

fn unix_now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or(0)
}

/// Mints a session token for an authenticated identity. Tokens carry their
/// own expiry but are only honored while the matching session record exists,
/// so logout can revoke them.
#[instrument(skip(secret), fields(identity = %identity_id, expiry_minutes = %expiry_minutes))]
pub fn create_token(
    identity_id: Uuid,
    email: &str,
    expiry_minutes: u64,
    secret: &[u8],
) -> Result<String, JwtError> {
    let now = unix_now();
    let claims = Claims {
        sub: identity_id.to_string(),
        email: email.to_owned(),
        exp: now + (60 * expiry_minutes as usize),
        iat: now,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

/// Verifies a session token's signature and expiry and returns its claims.
#[instrument(skip(token, secret))]
pub fn verify_token(token: &str, secret: &[u8]) -> Result<Claims, JwtError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
