//! Session management for the vault tool.
//!
//! [`SessionManager`] owns the authentication state of the vault tool and is
//! the only writer of the shared [`Session`](bwkit_common::Session). In REST
//! mode it also supervises the sidecar started with `bw serve`.

pub mod credentials;
pub mod manager;
pub mod sidecar;

pub use credentials::{ApiKey, Credentials};
pub use manager::SessionManager;
pub use sidecar::{SidecarConfig, SidecarServer, DEFAULT_STARTUP_TIMEOUT};
