//! Bearer token minting and verification
//!
//! Stateless JWT bearer tokens signed with an HMAC shared secret (HS256).
//! Claims carry the subject, an admin flag, and the validity window; no
//! server-side session state exists, so a token's lifecycle is its expiry.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Claims carried in a signed bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject the token was issued to
    pub sub: String,

    /// Whether the subject holds the admin role
    pub is_admin: bool,

    /// Issued-at, unix seconds
    pub iat: i64,

    /// Expiry, unix seconds
    pub exp: i64,
}

/// Mints and verifies bearer tokens against a shared secret
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

impl TokenSigner {
    /// Create a signer from the shared secret and a fixed expiry horizon
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    /// Mint a signed token for a subject
    ///
    /// Returns the token and its absolute expiry as unix seconds.
    pub fn mint(&self, subject: &str, is_admin: bool) -> Result<(String, i64), AuthError> {
        let now = Utc::now();
        let expires_at = (now + Duration::hours(self.expiry_hours)).timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            is_admin,
            iat: now.timestamp(),
            exp: expires_at,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))?;

        Ok((token, expires_at))
    }

    /// Verify a token's signature and expiry, returning its claims
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_required_spec_claims(&["exp"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }

    /// The configured expiry horizon in hours
    pub fn expiry_hours(&self) -> i64 {
        self.expiry_hours
    }
}
