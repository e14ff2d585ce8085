//! Application error types for keygate
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Errors from credential (API key) operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KeyError {
    /// The requested key does not exist in the store
    #[error("API key not found")]
    NotFound,

    /// Malformed or out-of-range request input
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The durable write or read of the key store failed
    #[error("Key store persistence failed: {0}")]
    Persistence(String),
}

/// Authentication-related errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// Rate limited due to too many login attempts
    #[error("Rate limited: too many attempts")]
    RateLimited,

    /// Password or user lookup failed; deliberately does not say which
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Bearer token failed signature or expiry verification
    #[error("Invalid or expired token")]
    InvalidToken,

    /// A required secret or password hash is not configured
    #[error("Authentication not configured: {0}")]
    NotConfigured(String),

    /// Token minting failed
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),
}

/// Configuration loading errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config: {0}")]
    FileRead(String),

    /// Failed to parse configuration content
    #[error("Failed to parse config: {0}")]
    Parse(String),
}
