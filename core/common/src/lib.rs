//! Common utilities and types shared across the bwkit crates.
//!
//! This module provides the error taxonomy, the opaque vault object model
//! and the session state that every other crate builds on.

pub mod error;
pub mod session;
pub mod types;

pub use error::{Error, Result};
pub use session::{Session, SessionState, SharedSession};
pub use types::{ObjectKind, Secret, SessionToken, VaultObject};
