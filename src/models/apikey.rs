//! API key domain model
//!
//! An API key is a long-lived opaque credential of the form `sk-` followed by
//! 40 lowercase hex characters. Keys are created dormant: until the first
//! successful validation they stay valid regardless of the provisional
//! `expires_at`, and activation rebases the expiry window onto the moment of
//! first use.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Prefix for all generated API keys
pub const KEY_PREFIX: &str = "sk-";

/// Number of random bytes behind the hex-encoded key body
pub const KEY_RANDOM_BYTES: usize = 20;

/// An API key record as persisted in the key store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// The opaque key value, `sk-` + 40 lowercase hex characters
    pub key: String,

    /// When the key was created
    pub created_at: DateTime<Utc>,

    /// When the key was first used (None = dormant, never activated)
    pub first_used_at: Option<DateTime<Utc>>,

    /// When the key expires; provisional until activation rebases it
    pub expires_at: DateTime<Utc>,

    /// Validity window in hours, fixed at creation
    pub ttl_hours: i64,

    /// Whether the key is enabled (false = revoked without deletion)
    pub is_enabled: bool,

    /// Free-text description
    pub description: String,
}

impl ApiKey {
    /// Create a new dormant key record
    pub fn new(key: impl Into<String>, ttl_hours: i64, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            created_at: now,
            first_used_at: None,
            expires_at: now + Duration::hours(ttl_hours),
            ttl_hours,
            is_enabled: true,
            description: description.into(),
        }
    }

    /// Check if the key is valid (enabled and not expired)
    ///
    /// A dormant key is valid whenever it is enabled; the stored expiry is a
    /// placeholder until activation.
    pub fn is_valid(&self) -> bool {
        if !self.is_enabled {
            return false;
        }

        // Never used: valid while waiting for first use
        if self.first_used_at.is_none() {
            return true;
        }

        Utc::now() < self.expires_at
    }

    /// Check if the key has expired (dormant keys never count as expired)
    pub fn is_expired(&self) -> bool {
        if self.first_used_at.is_none() {
            return false;
        }

        Utc::now() > self.expires_at
    }

    /// Activate the key on first use
    ///
    /// Sets `first_used_at` and rebases `expires_at` to `now + ttl_hours`.
    /// Returns true only when this call performed the activation; replays
    /// leave the record untouched.
    pub fn activate_if_needed(&mut self) -> bool {
        if self.first_used_at.is_some() {
            return false;
        }

        let now = Utc::now();
        self.first_used_at = Some(now);
        self.expires_at = now + Duration::hours(self.ttl_hours);
        true
    }
}

/// Outcome of one key within a batch operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// The key the result refers to
    pub key: String,

    /// Whether the operation succeeded for this key
    pub success: bool,

    /// Failure description when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemResult {
    /// Record a per-key success
    pub fn ok(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            success: true,
            error: None,
        }
    }

    /// Record a per-key failure
    pub fn failed(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Aggregate result of a batch operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Number of keys the operation succeeded for
    pub succeeded: usize,

    /// Number of keys the operation failed for
    pub failed: usize,

    /// Per-key outcomes, in input order
    pub results: Vec<BatchItemResult>,
}

impl BatchResult {
    /// Build the aggregate from per-key outcomes
    pub fn from_items(results: Vec<BatchItemResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }
}
