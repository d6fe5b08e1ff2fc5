//! Vault session state.
//!
//! A session holds the token handed out by the vault after login or unlock.
//! The Session Manager is the only writer; vault operations read the token
//! under the shared lock so no operation overlaps a state transition.

use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::SessionToken;

/// Authentication state of the vault tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not logged in, or the state could not be determined.
    Unauthenticated,
    /// Logged in, vault locked.
    Locked,
    /// Logged in and unlocked.
    Unlocked,
}

impl SessionState {
    /// Map the vault's textual status.
    ///
    /// Anything other than `locked` or `unlocked` collapses to
    /// `Unauthenticated`, including unknown values.
    pub fn from_status(status: &str) -> Self {
        match status {
            "locked" => SessionState::Locked,
            "unlocked" => SessionState::Unlocked,
            _ => SessionState::Unauthenticated,
        }
    }

    /// Logged in, whether locked or not.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, SessionState::Unauthenticated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Locked => "locked",
            SessionState::Unlocked => "unlocked",
        };
        f.write_str(text)
    }
}

/// Session shared between the Session Manager and the transports.
pub type SharedSession = Arc<RwLock<Session>>;

/// Local view of the vault session.
#[derive(Debug, Clone)]
pub struct Session {
    token: Option<SessionToken>,
    state: SessionState,
}

impl Session {
    /// A fresh, unauthenticated session.
    pub fn new() -> Self {
        Self {
            token: None,
            state: SessionState::Unauthenticated,
        }
    }

    /// A session resuming a token obtained elsewhere.
    ///
    /// The state is unknown until the vault is asked, so it starts
    /// unauthenticated; the token is still attached to every call.
    pub fn resume(token: SessionToken) -> Self {
        Self {
            token: Some(token),
            state: SessionState::Unauthenticated,
        }
    }

    /// Wrap into the shared handle.
    pub fn shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    /// Current token, if any.
    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    /// Last state recorded by a transition.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if the session is unlocked.
    pub fn is_unlocked(&self) -> bool {
        self.state == SessionState::Unlocked
    }

    /// Record a successful login or unlock.
    pub fn establish(&mut self, token: SessionToken) {
        self.token = Some(token);
        self.state = SessionState::Unlocked;
    }

    /// Record that the vault is logged in but locked.
    pub fn mark_locked(&mut self) {
        self.token = None;
        self.state = SessionState::Locked;
    }

    /// Drop the token after logout.
    pub fn clear(&mut self) {
        self.token = None;
        self.state = SessionState::Unauthenticated;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
