//! Domain models for keygate
//!
//! This module contains the core domain models used throughout the application.

pub mod apikey;
pub mod identity;

// Re-export commonly used types
pub use apikey::{ApiKey, BatchItemResult, BatchResult, KEY_PREFIX, KEY_RANDOM_BYTES};
pub use identity::Principal;
