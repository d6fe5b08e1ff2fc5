//! Process transport: one invocation of the vault executable per call.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use bwkit_common::{Error, Result, Secret, SessionToken};

/// Environment variable carrying the session token.
pub const SESSION_ENV: &str = "BW_SESSION";
/// Environment variable read through `--passwordenv`.
pub const PASSWORD_ENV: &str = "BW_PASSWORD";
/// API key client id, read by `login --apikey`.
pub const CLIENT_ID_ENV: &str = "BW_CLIENTID";
/// API key client secret, read by `login --apikey`.
pub const CLIENT_SECRET_ENV: &str = "BW_CLIENTSECRET";

/// Default executable name.
#[cfg(windows)]
pub const DEFAULT_EXECUTABLE: &str = "bw.exe";
/// Default executable name.
#[cfg(not(windows))]
pub const DEFAULT_EXECUTABLE: &str = "bw";

/// Environment handed to exactly one child process.
///
/// The values are set on the child's [`Command`] and never on the current
/// process, so nothing lingers once the call returns, whatever the outcome.
/// When no session token is supplied, an inherited `BW_SESSION` is removed
/// from the child's environment.
#[derive(Default)]
pub struct ScopedEnv<'a> {
    session: Option<&'a SessionToken>,
    vars: Vec<(&'static str, &'a str)>,
}

impl<'a> ScopedEnv<'a> {
    /// Nothing beyond the inherited environment.
    pub fn none() -> Self {
        Self::default()
    }

    /// Attach the session token, if there is one.
    pub fn session(token: Option<&'a SessionToken>) -> Self {
        Self {
            session: token,
            vars: Vec::new(),
        }
    }

    /// Add a named secret.
    pub fn with_secret(mut self, name: &'static str, value: &'a Secret) -> Self {
        self.vars.push((name, value.expose()));
        self
    }

    /// Add a named non-secret value (e.g. an API client id).
    pub fn with_var(mut self, name: &'static str, value: &'a str) -> Self {
        self.vars.push((name, value));
        self
    }

    /// Install the variables on a child command.
    pub fn apply(&self, cmd: &mut Command) {
        match self.session {
            Some(token) => {
                cmd.env(SESSION_ENV, token.expose());
            }
            None => {
                cmd.env_remove(SESSION_ENV);
            }
        }
        for (name, value) in &self.vars {
            cmd.env(name, value);
        }
    }
}

/// Captured result of one invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Numeric exit status, `-1` when terminated by a signal.
    pub status: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Exit status zero.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Standard output followed by standard error, for diagnostics.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (false, false) => format!("{}\n{}", stdout, stderr),
            (false, true) => stdout.to_string(),
            (true, _) => stderr.to_string(),
        }
    }

    fn into_success(self, subcommand: &str) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(Error::Transport(format!(
                "`{}` failed with exit code {}: {}",
                subcommand,
                self.status,
                self.combined()
            )))
        }
    }
}

/// Handle on the vault executable.
#[derive(Debug, Clone)]
pub struct BwCli {
    executable: PathBuf,
    timeout: Option<Duration>,
}

impl BwCli {
    /// Locate the vault executable.
    ///
    /// A bare name is looked up on `PATH`; anything containing a path
    /// separator must point at an existing file.
    ///
    /// # Errors
    /// - Returns a configuration error if the executable cannot be found.
    ///   No further operation is possible without it.
    pub fn new(executable: impl AsRef<Path>) -> Result<Self> {
        let executable = resolve_executable(executable.as_ref())?;
        debug!(executable = %executable.display(), "Using vault executable");
        Ok(Self {
            executable,
            timeout: None,
        })
    }

    /// Bound every invocation. A call exceeding the limit is killed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the resolved executable.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Run the executable and capture its output.
    ///
    /// A non-zero exit status is not an error at this level; only failing to
    /// spawn or exceeding the timeout is.
    pub async fn invoke(&self, args: &[String], env: &ScopedEnv<'_>) -> Result<CommandOutput> {
        let subcommand = args.first().map(String::as_str).unwrap_or_default();
        debug!(subcommand, "Running vault command");

        let mut cmd = Command::new(&self.executable);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        env.apply(&mut cmd);

        let output = self.bounded(subcommand, cmd.output()).await?;
        let output = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(subcommand, status = output.status, "Vault command finished");
        Ok(output)
    }

    /// Run a command whose output is JSON.
    ///
    /// # Errors
    /// - Transport error on spawn failure or non-zero exit
    /// - Decode error if the output is not JSON
    pub async fn run_json(&self, args: &[String], env: &ScopedEnv<'_>) -> Result<Value> {
        let subcommand = args.first().cloned().unwrap_or_default();
        let stdout = self.invoke(args, env).await?.into_success(&subcommand)?;
        serde_json::from_str(&stdout).map_err(|e| {
            Error::Decode(format!(
                "`{}` returned output that is not JSON ({}): {}",
                subcommand,
                e,
                stdout.trim()
            ))
        })
    }

    /// Run a command whose output is taken verbatim.
    pub async fn run_raw(&self, args: &[String], env: &ScopedEnv<'_>) -> Result<String> {
        let subcommand = args.first().cloned().unwrap_or_default();
        self.invoke(args, env).await?.into_success(&subcommand)
    }

    /// Encode a single-line JSON payload with the `encode` subcommand.
    ///
    /// The payload is written to the child's stdin; the trimmed output is the
    /// opaque argument `edit` expects.
    pub async fn encode(&self, payload: &str) -> Result<String> {
        if payload.contains('\n') {
            return Err(Error::InvalidInput(
                "Encode payload must be a single line".to_string(),
            ));
        }

        let mut cmd = Command::new(&self.executable);
        cmd.arg("encode")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        ScopedEnv::none().apply(&mut cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Transport(format!("Failed to spawn `encode`: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.shutdown().await?;
        }

        let output = self.bounded("encode", child.wait_with_output()).await?;
        let output = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        let encoded = output.into_success("encode")?;
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(Error::Transport("`encode` produced no output".to_string()));
        }
        Ok(encoded.to_string())
    }

    async fn bounded<F>(&self, subcommand: &str, fut: F) -> Result<std::process::Output>
    where
        F: std::future::Future<Output = std::io::Result<std::process::Output>>,
    {
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                Error::Transport(format!("`{}` timed out after {:?}", subcommand, limit))
            })?,
            None => fut.await,
        };
        result.map_err(|e| Error::Transport(format!("Failed to run `{}`: {}", subcommand, e)))
    }
}

fn resolve_executable(executable: &Path) -> Result<PathBuf> {
    let has_separator = executable.components().count() > 1;
    if has_separator || executable.is_absolute() {
        if executable.is_file() {
            return Ok(executable.to_path_buf());
        }
        return Err(Error::Configuration(format!(
            "Vault executable not found: {}",
            executable.display()
        )));
    }

    let search_path = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&search_path)
        .map(|dir| dir.join(executable))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "Vault executable not found on PATH: {}",
                executable.display()
            ))
        })
}
