//! Request identity model
//!
//! Exactly two kinds of principal exist: a named principal carrying the
//! claims of a verified bearer token, and the anonymous principal behind a
//! validated API key. The role check is a plain boolean claim, not a role
//! hierarchy.

use serde::{Deserialize, Serialize};

/// The identity attached to an authorized request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum Principal {
    /// Named principal from a verified bearer token
    Token {
        /// Subject from the token claims
        subject: String,
        /// Admin claim from the token
        is_admin: bool,
    },

    /// Anonymous principal behind a validated API key
    ApiKey,
}

impl Principal {
    /// Whether this principal carries the admin claim
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Principal::Token { is_admin: true, .. }
        )
    }

    /// The named subject, if any (API-key principals are anonymous)
    pub fn subject(&self) -> Option<&str> {
        match self {
            Principal::Token { subject, .. } => Some(subject),
            Principal::ApiKey => None,
        }
    }
}
