//! Credentials handed to the Session Manager.

use bwkit_common::Secret;

/// Username and master password.
///
/// Immutable once built. `Debug` never shows the password.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: Secret,
}

impl Credentials {
    /// Create credentials for a user login.
    pub fn new(username: impl Into<String>, password: Secret) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Account name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Master password, also used to unlock.
    pub fn password(&self) -> &Secret {
        &self.password
    }
}

/// Personal API key.
#[derive(Debug, Clone)]
pub struct ApiKey {
    client_id: String,
    client_secret: Secret,
}

impl ApiKey {
    /// Create an API key credential.
    pub fn new(client_id: impl Into<String>, client_secret: Secret) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// Client id, not secret.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client secret.
    pub fn client_secret(&self) -> &Secret {
        &self.client_secret
    }
}
