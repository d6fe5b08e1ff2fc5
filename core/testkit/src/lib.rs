//! Fake vault executable for integration tests.
//!
//! [`FakeVault`] writes a small POSIX shell script that understands the
//! subcommands bwkit uses and keeps its state in a scratch directory. Every
//! invocation is appended to `calls.log` together with the `BW_SESSION` value
//! the child saw, so tests can check exactly what was run and with which
//! credentials.

#![cfg(unix)]

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;

/// Password the fake vault accepts.
pub const PASSWORD: &str = "correct horse battery staple";
/// API client secret the fake vault accepts.
pub const CLIENT_SECRET: &str = "api-client-secret";
/// Token printed by a successful login or unlock.
pub const TOKEN: &str = "fake-session-token==";
/// Initial server URL.
pub const SERVER: &str = "https://vault.bitwarden.com";

const SCRIPT: &str = r#"#!/bin/sh
DIR="__DIR__"
printf '%s|session=%s\n' "$*" "${BW_SESSION:--}" >> "$DIR/calls.log"
state=$(cat "$DIR/state")
cmd="$1"
if [ -f "$DIR/fail_$cmd" ]; then
  cat "$DIR/fail_$cmd" >&2
  exit 1
fi
case "$cmd" in
  status)
    printf '{"serverUrl":"%s","status":"%s"}\n' "$(cat "$DIR/server")" "$state"
    ;;
  config)
    if [ -n "$3" ]; then
      if [ "$state" != "unauthenticated" ]; then
        echo "Logout required before server config update." >&2
        exit 1
      fi
      printf '%s' "$3" > "$DIR/server"
      echo "Saved setting \`config\`."
    else
      cat "$DIR/server"
      echo
    fi
    ;;
  login)
    if [ "$state" != "unauthenticated" ]; then
      echo "You are already logged in." >&2
      exit 1
    fi
    if [ "$2" = "--apikey" ]; then
      if [ "$BW_CLIENTSECRET" != "$(cat "$DIR/client_secret")" ]; then
        echo "client_id or client_secret is incorrect. Try again." >&2
        exit 1
      fi
      echo locked > "$DIR/state"
      exit 0
    fi
    if [ "$BW_PASSWORD" != "$(cat "$DIR/password")" ]; then
      echo "Username or password is incorrect. Try again." >&2
      exit 1
    fi
    echo unlocked > "$DIR/state"
    cat "$DIR/token"
    ;;
  unlock)
    if [ "$state" = "unauthenticated" ]; then
      echo "You are not logged in." >&2
      exit 1
    fi
    if [ "$BW_PASSWORD" != "$(cat "$DIR/password")" ]; then
      echo "Invalid master password." >&2
      exit 1
    fi
    echo unlocked > "$DIR/state"
    cat "$DIR/token"
    ;;
  logout)
    if [ "$state" = "unauthenticated" ]; then
      echo "You are not logged in." >&2
      exit 1
    fi
    echo unauthenticated > "$DIR/state"
    echo "You have logged out."
    ;;
  encode)
    base64 | tr -d '\n'
    ;;
  list)
    if [ -f "$DIR/objects/list_$2.json" ]; then
      cat "$DIR/objects/list_$2.json"
    else
      echo '[]'
    fi
    ;;
  get)
    if [ -f "$DIR/objects/$2_$3.json" ]; then
      cat "$DIR/objects/$2_$3.json"
    else
      echo "Not found." >&2
      exit 1
    fi
    ;;
  edit)
    for last; do :; done
    if [ ! -f "$DIR/objects/$2_$3.json" ]; then
      echo "Not found." >&2
      exit 1
    fi
    printf '%s' "$last" | base64 -d > "$DIR/objects/$2_$3.json"
    cat "$DIR/objects/$2_$3.json"
    ;;
  serve)
    exec sleep 300
    ;;
  *)
    echo "Invalid command: $cmd" >&2
    exit 1
    ;;
esac
"#;

/// One line of `calls.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Arguments joined by spaces.
    pub args: String,
    /// `BW_SESSION` as seen by the child.
    pub session: Option<String>,
}

impl Invocation {
    /// First argument.
    pub fn subcommand(&self) -> &str {
        self.args.split(' ').next().unwrap_or_default()
    }
}

/// Scripted stand-in for the vault executable.
pub struct FakeVault {
    dir: TempDir,
    executable: PathBuf,
}

impl FakeVault {
    /// Create an unauthenticated fake vault.
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        fs::create_dir(root.join("objects"))?;
        fs::write(root.join("state"), "unauthenticated\n")?;
        fs::write(root.join("server"), SERVER)?;
        fs::write(root.join("password"), PASSWORD)?;
        fs::write(root.join("client_secret"), CLIENT_SECRET)?;
        fs::write(root.join("token"), format!("{}\n", TOKEN))?;
        fs::write(root.join("calls.log"), "")?;

        let executable = root.join("bw");
        let script = SCRIPT.replace("__DIR__", &root.display().to_string());
        fs::write(&executable, script)?;
        fs::set_permissions(&executable, fs::Permissions::from_mode(0o755))?;

        Ok(Self { dir, executable })
    }

    /// Path of the script.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Scratch directory holding the state.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Force the authentication state.
    pub fn set_state(&self, state: &str) {
        self.write("state", &format!("{}\n", state));
    }

    /// Current authentication state.
    pub fn state(&self) -> String {
        self.read("state").trim().to_string()
    }

    /// Currently configured server.
    pub fn server(&self) -> String {
        self.read("server").trim().to_string()
    }

    /// Token printed on the next login or unlock.
    pub fn set_token(&self, token: &str) {
        self.write("token", token);
    }

    /// Make `subcommand` fail with `message` on stderr.
    pub fn fail(&self, subcommand: &str, message: &str) {
        self.write(&format!("fail_{}", subcommand), message);
    }

    /// Undo [`FakeVault::fail`].
    pub fn recover(&self, subcommand: &str) {
        let _ = fs::remove_file(self.dir().join(format!("fail_{}", subcommand)));
    }

    /// Output of `list <list_name>`.
    pub fn put_list(&self, list_name: &str, value: &Value) {
        self.write(&format!("objects/list_{}.json", list_name), &value.to_string());
    }

    /// Raw output of `list <list_name>`, for decode failures.
    pub fn put_raw_list(&self, list_name: &str, raw: &str) {
        self.write(&format!("objects/list_{}.json", list_name), raw);
    }

    /// Object returned by `get <kind> <id>`.
    pub fn put_object(&self, kind: &str, id: &str, value: &Value) {
        self.write(&format!("objects/{}_{}.json", kind, id), &value.to_string());
    }

    /// Stored object, as left by the last `edit`.
    pub fn object(&self, kind: &str, id: &str) -> Option<Value> {
        let raw = fs::read_to_string(self.dir().join(format!("objects/{}_{}.json", kind, id))).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.read("calls.log")
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                let (args, session) = line.rsplit_once("|session=").unwrap_or((line, "-"));
                Invocation {
                    args: args.to_string(),
                    session: (session != "-").then(|| session.to_string()),
                }
            })
            .collect()
    }

    /// Subcommands run so far, in order.
    pub fn subcommands(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| call.subcommand().to_string())
            .collect()
    }

    fn write(&self, name: &str, content: &str) {
        fs::write(self.dir().join(name), content).expect("fake vault state must be writable");
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.dir().join(name)).unwrap_or_default()
    }
}
