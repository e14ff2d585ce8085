//! Operator login gate
//!
//! Verifies the admin password and mints the admin bearer token. The rate
//! limiter is consulted strictly before any password work so that throttled
//! clients learn nothing about the credential check.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::AuthError;

use super::password::verify_password;
use super::ratelimit::RateLimiter;
use super::token::TokenSigner;

/// Subject carried by tokens minted for the operator role
pub const ADMIN_SUBJECT: &str = "admin";

/// A successful login: the bearer token and its absolute expiry (unix seconds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    /// Signed bearer token
    pub token: String,

    /// Absolute expiry of the token, unix seconds
    pub expires_at: i64,
}

/// Password verification and token minting for the operator role
pub struct AdminGate {
    password_hash: Option<String>,
    signer: Arc<TokenSigner>,
    rate_limiter: Arc<RateLimiter>,
}

impl AdminGate {
    /// Create a new gate
    ///
    /// `password_hash` is the stored Argon2id hash; None means the admin
    /// role is not configured and every login fails with a configuration
    /// error.
    pub fn new(
        password_hash: Option<String>,
        signer: Arc<TokenSigner>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            password_hash,
            signer,
            rate_limiter,
        }
    }

    /// Attempt an operator login
    ///
    /// Rate limiting is evaluated before the configuration and password
    /// checks. The failure message for a wrong password does not reveal
    /// whether the identity or the secret was at fault.
    pub fn login(&self, password: &str, client_ip: IpAddr) -> Result<LoginGrant, AuthError> {
        if !self.rate_limiter.allow(client_ip) {
            warn!(ip = %client_ip, "Admin login rate limited");
            return Err(AuthError::RateLimited);
        }

        let hash = self
            .password_hash
            .as_ref()
            .ok_or_else(|| AuthError::NotConfigured("admin password hash not set".to_string()))?;

        if !verify_password(password, hash) {
            warn!(ip = %client_ip, "Admin login failed");
            return Err(AuthError::InvalidCredentials);
        }

        let (token, expires_at) = self.signer.mint(ADMIN_SUBJECT, true)?;
        info!(ip = %client_ip, "Admin login succeeded");

        Ok(LoginGrant { token, expires_at })
    }
}
