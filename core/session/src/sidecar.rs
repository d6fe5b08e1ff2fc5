//! Supervision of the `bw serve` sidecar.
//!
//! The sidecar is started in its own process group so that the whole group,
//! including anything the vault tool forks, can be killed at once. Dropping
//! a [`SidecarServer`] kills the group; on Linux the child additionally asks
//! the kernel to kill it when its parent dies, which covers abnormal exits.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use bwkit_common::{Error, Result, SessionToken};
use bwkit_transport::{BwCli, RestClient, ScopedEnv, DEFAULT_HOST, DEFAULT_PORT};

/// Default time allowed for the sidecar to answer its first status probe.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the sidecar listens and how long it may take to come up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarConfig {
    /// Host the sidecar binds to.
    pub host: String,
    /// Port the sidecar binds to.
    pub port: u16,
    /// Readiness probe bound. `None` skips the probe entirely.
    pub startup_timeout: Option<Duration>,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            startup_timeout: Some(DEFAULT_STARTUP_TIMEOUT),
        }
    }
}

impl SidecarConfig {
    /// Create a config for `host:port` with the default startup timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Override the readiness probe bound.
    pub fn with_startup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// HTTP client for this sidecar.
    pub fn client(&self, request_timeout: Option<Duration>) -> Result<RestClient> {
        RestClient::new(&self.host, self.port, request_timeout)
    }
}

/// A running sidecar process.
#[derive(Debug)]
pub struct SidecarServer {
    child: Child,
    /// Process group id, cleared once the group has been killed.
    group: Option<u32>,
}

impl SidecarServer {
    /// Start `bw serve` bound to the configured address.
    ///
    /// The session token is handed to the child through its environment.
    ///
    /// # Postconditions
    /// - If a startup timeout is configured, the sidecar answered `GET /status`
    ///
    /// # Errors
    /// - Transport error if the process cannot be spawned or never becomes ready
    pub async fn spawn(
        cli: &BwCli,
        config: &SidecarConfig,
        token: Option<&SessionToken>,
    ) -> Result<Self> {
        let port = config.port.to_string();
        let mut cmd = Command::new(cli.executable());
        cmd.args(["serve", "--hostname", config.host.as_str(), "--port", port.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        ScopedEnv::session(token).apply(&mut cmd);

        isolate(&mut cmd);

        let child = cmd
            .spawn()
            .map_err(|e| Error::Transport(format!("Failed to start sidecar: {}", e)))?;
        let group = child.id();
        info!(host = %config.host, port = config.port, pid = ?group, "Sidecar started");

        let mut server = Self { child, group };

        if let Some(timeout) = config.startup_timeout {
            let ready = match config.client(None) {
                Ok(client) => client.wait_until_ready(timeout).await,
                Err(e) => Err(e),
            };
            if let Err(e) = ready {
                warn!(error = %e, "Sidecar did not become ready");
                server.kill().await;
                return Err(e);
            }
        }

        Ok(server)
    }

    /// Process id of the sidecar, if it has not been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the sidecar and its descendants and reap it.
    pub async fn shutdown(mut self) {
        self.kill().await;
        info!("Sidecar stopped");
    }

    async fn kill(&mut self) {
        self.kill_group();
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "Sidecar already exited");
        }
    }

    #[cfg(unix)]
    fn kill_group(&mut self) {
        if let Some(group) = self.group.take() {
            // SAFETY: killpg has no memory-safety preconditions.
            unsafe {
                libc::killpg(group as libc::pid_t, libc::SIGKILL);
            }
        }
    }

    // No process groups: only the direct child is killed, its descendants survive.
    #[cfg(not(unix))]
    fn kill_group(&mut self) {
        self.group = None;
    }
}

/// Put the child in its own process group and, on Linux, tie its life to ours.
#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    cmd.process_group(0);
    #[cfg(target_os = "linux")]
    die_with_parent(cmd);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

#[cfg(target_os = "linux")]
fn die_with_parent(cmd: &mut Command) {
    // SAFETY: prctl is async-signal-safe and touches no memory of the parent.
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

impl Drop for SidecarServer {
    fn drop(&mut self) {
        self.kill_group();
    }
}
