//! Session Manager: login, unlock, logout and server configuration.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use bwkit_common::{Error, Result, Session, SessionState, SessionToken, SharedSession};
use bwkit_transport::cli::{CLIENT_ID_ENV, CLIENT_SECRET_ENV, PASSWORD_ENV};
use bwkit_transport::{BwCli, ScopedEnv};

use crate::credentials::{ApiKey, Credentials};
use crate::sidecar::{SidecarConfig, SidecarServer};

/// Owner of the vault authentication state.
///
/// Every transition (configure, login, unlock, logout) holds the session
/// write lock until it completes, so vault operations, which take the read
/// lock, never run against a session that is being replaced.
pub struct SessionManager {
    cli: Arc<BwCli>,
    credentials: Option<Credentials>,
    session: SharedSession,
    sidecar_config: Option<SidecarConfig>,
    sidecar: Mutex<Option<SidecarServer>>,
}

impl SessionManager {
    /// Create a manager with a fresh session.
    ///
    /// `sidecar` enables REST mode: the sidecar is started after every
    /// successful login or unlock.
    pub fn new(
        cli: Arc<BwCli>,
        credentials: Option<Credentials>,
        sidecar: Option<SidecarConfig>,
    ) -> Self {
        Self {
            cli,
            credentials,
            session: Session::new().shared(),
            sidecar_config: sidecar,
            sidecar: Mutex::new(None),
        }
    }

    /// Handle on the session, for transports.
    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    /// Adopt a token obtained outside this process, such as an exported
    /// `BW_SESSION`. The state is unknown until the next status check.
    pub async fn resume(&self, token: SessionToken) {
        *self.session.write().await = Session::resume(token);
    }

    /// The vault executable.
    pub fn cli(&self) -> &Arc<BwCli> {
        &self.cli
    }

    /// Sidecar settings, present in REST mode.
    pub fn sidecar_config(&self) -> Option<&SidecarConfig> {
        self.sidecar_config.as_ref()
    }

    /// Ask the vault tool for its state.
    ///
    /// Unknown answers and failures to ask both come back as
    /// `Unauthenticated`; the two cannot be told apart here.
    pub async fn status(&self) -> SessionState {
        let session = self.session.read().await;
        self.query_status(session.token()).await
    }

    /// Currently configured server URL.
    pub async fn server(&self) -> Result<String> {
        let args = vec!["config".to_string(), "server".to_string()];
        let output = self.cli.run_raw(&args, &ScopedEnv::none()).await?;
        Ok(output.trim().to_string())
    }

    /// Point the vault tool at another server.
    ///
    /// # Postconditions
    /// - If the vault was logged in, it has been logged out before the
    ///   server changed, and the local token is gone
    ///
    /// # Errors
    /// - Configuration error for a URL that is not http(s)
    /// - Transport error if logout or the update is refused; the server is
    ///   left unchanged when logout fails
    pub async fn configure(&self, server_url: &str) -> Result<()> {
        let url = Url::parse(server_url)
            .map_err(|e| Error::Configuration(format!("Invalid server URL '{}': {}", server_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "Server URL must use http or https: {}",
                server_url
            )));
        }

        let mut session = self.session.write().await;
        let state = self.query_status(session.token()).await;
        if state.is_authenticated() {
            info!(state = %state, "Logging out before changing server");
            self.logout_with(&mut session).await?;
        }

        let args = vec![
            "config".to_string(),
            "server".to_string(),
            server_url.to_string(),
        ];
        self.cli.run_raw(&args, &ScopedEnv::none()).await?;
        info!(server = %server_url, "Server configured");
        Ok(())
    }

    /// Make sure the vault tool points at `server_url`, reconfiguring it
    /// (and logging out) only when it points elsewhere.
    ///
    /// Returns whether the server was changed.
    pub async fn use_server(&self, server_url: &str) -> Result<bool> {
        let current = self.server().await?;
        if same_server(&current, server_url) {
            debug!(server = %current, "Server already configured");
            return Ok(false);
        }
        info!(from = %current, to = %server_url, "Switching server");
        self.configure(server_url).await?;
        Ok(true)
    }

    /// Log in with username and password.
    ///
    /// Already unlocked is success. A locked vault is unlocked instead; if
    /// that fails the error is returned without attempting a fresh login.
    ///
    /// # Errors
    /// - Auth error if no credentials were supplied or the vault rejects them
    /// - Transport error if the sidecar cannot be started
    pub async fn login_as_user(&self) -> Result<()> {
        let mut session = self.session.write().await;
        match self.query_status(session.token()).await {
            SessionState::Unlocked => {
                info!("Already logged in");
                Self::adopt_unlocked(&mut session);
            }
            SessionState::Locked => {
                info!("Vault is locked, unlocking");
                self.unlock_with(&mut session).await?;
            }
            SessionState::Unauthenticated => {
                let credentials = self.require_credentials()?;
                info!(username = %credentials.username(), "Not authenticated, logging in");
                session.clear();

                let args = vec![
                    "login".to_string(),
                    credentials.username().to_string(),
                    "--passwordenv".to_string(),
                    PASSWORD_ENV.to_string(),
                    "--raw".to_string(),
                ];
                let env = ScopedEnv::none().with_secret(PASSWORD_ENV, credentials.password());
                let token = self.obtain_token(&args, &env, "Login").await?;
                session.establish(token);
                info!("Logged in");
            }
        }
        self.start_sidecar(session.token()).await
    }

    /// Log in with a personal API key.
    ///
    /// An API key login leaves the vault locked; it is unlocked right away
    /// when a password is available. Returns the resulting state.
    ///
    /// # Errors
    /// - Auth error if the key or the password is rejected
    pub async fn login_as_api(&self, key: &ApiKey) -> Result<SessionState> {
        let mut session = self.session.write().await;
        match self.query_status(session.token()).await {
            SessionState::Unlocked => {
                info!("Already logged in");
                Self::adopt_unlocked(&mut session);
            }
            SessionState::Locked => {
                info!("Already logged in, vault is locked");
                session.mark_locked();
            }
            SessionState::Unauthenticated => {
                info!(client_id = %key.client_id(), "Logging in with API key");
                let args = vec![
                    "login".to_string(),
                    "--apikey".to_string(),
                    "--raw".to_string(),
                ];
                let env = ScopedEnv::none()
                    .with_var(CLIENT_ID_ENV, key.client_id())
                    .with_secret(CLIENT_SECRET_ENV, key.client_secret());
                let output = self.cli.run_raw(&args, &env).await.map_err(|e| {
                    error!(error = %e, "Login with API key failed");
                    Error::Auth(format!("Login with API key failed: {}", e))
                })?;
                match SessionToken::from_output(&output) {
                    Some(token) => session.establish(token),
                    None => session.mark_locked(),
                }
                info!("Logged in with API key");
            }
        }

        if session.state() == SessionState::Locked && self.credentials.is_some() {
            self.unlock_with(&mut session).await?;
        }
        if session.is_unlocked() {
            self.start_sidecar(session.token()).await?;
        }
        Ok(session.state())
    }

    /// Unlock a logged-in vault with the master password.
    ///
    /// Failure is reported, never retried.
    pub async fn unlock(&self) -> Result<()> {
        let mut session = self.session.write().await;
        self.unlock_with(&mut session).await?;
        self.start_sidecar(session.token()).await
    }

    /// Log out and stop the sidecar.
    ///
    /// # Postconditions
    /// - On success the local token is cleared
    /// - On failure the local session is untouched
    pub async fn logout(&self) -> Result<()> {
        let mut session = self.session.write().await;
        self.logout_with(&mut session).await
    }

    /// Start the sidecar unless it is already marked running.
    ///
    /// No-op outside REST mode. The running flag is not re-checked against
    /// the process once set.
    pub async fn ensure_server_running(&self) -> Result<()> {
        let session = self.session.read().await;
        self.start_sidecar(session.token()).await
    }

    /// Whether a sidecar has been started and not stopped since.
    pub async fn is_server_running(&self) -> bool {
        self.sidecar.lock().await.is_some()
    }

    /// Process id of the sidecar, if one is running.
    pub async fn server_pid(&self) -> Option<u32> {
        self.sidecar.lock().await.as_ref().and_then(SidecarServer::pid)
    }

    /// Stop the sidecar, if any. Called on exit.
    pub async fn shutdown(&self) {
        self.stop_sidecar().await;
    }

    async fn query_status(&self, token: Option<&SessionToken>) -> SessionState {
        let args = vec!["status".to_string()];
        match self.cli.run_json(&args, &ScopedEnv::session(token)).await {
            Ok(value) => {
                let status = value.get("status").and_then(Value::as_str).unwrap_or_default();
                let state = SessionState::from_status(status);
                debug!(status, state = %state, "Vault status");
                state
            }
            Err(e) => {
                warn!(error = %e, "Could not determine vault status");
                SessionState::Unauthenticated
            }
        }
    }

    /// Record an unlocked vault, keeping the token we hold if any.
    fn adopt_unlocked(session: &mut Session) {
        match session.token().cloned() {
            Some(token) => session.establish(token),
            None => debug!("Vault unlocked without a local token"),
        }
    }

    async fn unlock_with(&self, session: &mut Session) -> Result<()> {
        let credentials = self.require_credentials()?;
        let args = vec![
            "unlock".to_string(),
            "--passwordenv".to_string(),
            PASSWORD_ENV.to_string(),
            "--raw".to_string(),
        ];
        let env = ScopedEnv::none().with_secret(PASSWORD_ENV, credentials.password());
        let token = self.obtain_token(&args, &env, "Unlock").await?;
        session.establish(token);
        info!("Unlocked");
        Ok(())
    }

    async fn logout_with(&self, session: &mut Session) -> Result<()> {
        let args = vec!["logout".to_string()];
        if let Err(e) = self
            .cli
            .run_raw(&args, &ScopedEnv::session(session.token()))
            .await
        {
            error!(error = %e, "Logout failed");
            return Err(e);
        }
        session.clear();
        info!("Logged out");
        self.stop_sidecar().await;
        Ok(())
    }

    async fn obtain_token(&self, args: &[String], env: &ScopedEnv<'_>, what: &str) -> Result<SessionToken> {
        let output = self.cli.run_raw(args, env).await.map_err(|e| {
            error!(error = %e, "{} failed", what);
            Error::Auth(format!("{} failed: {}", what, e))
        })?;
        SessionToken::from_output(&output)
            .ok_or_else(|| Error::Auth(format!("{} returned no session token", what)))
    }

    fn require_credentials(&self) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| Error::Auth("No username and password configured".to_string()))
    }

    async fn start_sidecar(&self, token: Option<&SessionToken>) -> Result<()> {
        let Some(config) = &self.sidecar_config else {
            return Ok(());
        };
        let mut sidecar = self.sidecar.lock().await;
        if sidecar.is_some() {
            debug!("Sidecar already running");
            return Ok(());
        }
        *sidecar = Some(SidecarServer::spawn(&self.cli, config, token).await?);
        Ok(())
    }

    async fn stop_sidecar(&self) {
        if let Some(server) = self.sidecar.lock().await.take() {
            server.shutdown().await;
        }
    }
}

/// Server URLs compare equal regardless of a trailing slash.
fn same_server(a: &str, b: &str) -> bool {
    a.trim().trim_end_matches('/') == b.trim().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_server_ignores_trailing_slash() {
        assert!(same_server("https://vault.bitwarden.com", "https://vault.bitwarden.com/"));
        assert!(same_server(" https://a.example\n", "https://a.example"));
        assert!(!same_server("https://vault.bitwarden.com", "https://vault.bitwarden.eu"));
    }
}
