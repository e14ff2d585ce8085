//! API key lifecycle: generation, validation, expiry management, and the
//! file-backed store behind them.

pub mod service;
pub mod store;

pub use service::{generate_key_value, is_api_key_format, ApiKeyService, BATCH_MAX};
pub use store::KeyStore;
