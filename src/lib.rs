//! keygate - admission control and API key management for a search
//! aggregation service
//!
//! This crate issues, validates, and revokes long-lived API keys, handles
//! admin and user login with signed bearer tokens, and throttles brute-force
//! login attempts.

pub mod auth;
pub mod config;
pub mod error;
pub mod keys;
pub mod models;
pub mod server;
