//! Vault Object Client.
//!
//! A uniform set of vault operations over whichever [`VaultTransport`] was
//! selected at construction. Ordinary failures (unreachable vault, missing
//! object, rejected update) are logged and come back as `Ok(None)`; only
//! malformed arguments are returned as errors.
//!
//! [`VaultTransport`]: bwkit_transport::VaultTransport

pub mod client;

pub use client::VaultClient;
