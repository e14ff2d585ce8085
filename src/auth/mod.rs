//! Authentication system for keygate
//!
//! This module provides authentication and authorization functionality:
//! - Bearer token minting and verification
//! - Admin password verification and login
//! - Rate limiting for login attempts

pub mod gate;
pub mod password;
pub mod ratelimit;
pub mod token;

pub use gate::{AdminGate, LoginGrant, ADMIN_SUBJECT};
pub use password::{hash_password, verify_password};
pub use ratelimit::{RateLimitConfig, RateLimiter};
pub use token::{Claims, TokenSigner};
