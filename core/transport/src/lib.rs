//! Transport adapters for talking to the vault.
//!
//! A vault operation is carried either by spawning the vault executable
//! ([`BwCli`]) or by an HTTP call against the sidecar started with
//! `bw serve` ([`RestClient`]). Both are hidden behind [`VaultTransport`],
//! so callers pick a variant once and never branch on the mode again.
//!
//! # Design Principles
//! - Stateless per call: the session token is read when a call starts
//! - Secrets reach child processes through their environment only
//! - Decode failures are reported separately from command failures

pub mod cli;
pub mod memory;
pub mod process;
pub mod provider;
pub mod rest;

pub use cli::{BwCli, CommandOutput, ScopedEnv};
pub use memory::MemoryTransport;
pub use process::ProcessTransport;
pub use provider::{ObjectQuery, VaultTransport};
pub use rest::{unwrap_envelope, RestClient, RestTransport, DEFAULT_HOST, DEFAULT_PORT};
