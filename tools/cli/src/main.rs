//! bwkit - command line toolkit for vault organizations.
//!
//! Wraps the vault executable to inspect organization collections and to
//! copy a parent collection's permissions onto its child collections.

mod config;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bwkit_client::VaultClient;
use bwkit_common::{Secret, SessionState, SessionToken, VaultObject};
use bwkit_inherit::{
    children_of, find_by_name, InheritanceEngine, InheritanceObserver, PermissionSet,
    TargetOutcome,
};
use bwkit_session::{ApiKey, Credentials, SessionManager};
use bwkit_transport::cli::SESSION_ENV;
use bwkit_transport::BwCli;

use crate::config::{config_path, parse_value, ConfigDocument, ToolkitConfig};

/// Master password, read instead of prompting.
const PASSWORD_VAR: &str = "BWKIT_PASSWORD";
/// API client secret, read instead of prompting.
const CLIENT_SECRET_VAR: &str = "BWKIT_CLIENT_SECRET";

#[derive(Parser)]
#[command(name = "bwkit")]
#[command(about = "bwkit - Vault organization toolkit")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: ./bwkit.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Vault executable, a name on PATH or a path.
    #[arg(long, global = true)]
    bw_executable: Option<String>,

    /// Talk to a `bw serve` sidecar.
    #[arg(long, global = true, overrides_with = "no_rest")]
    rest: bool,

    /// Spawn the vault executable for every call.
    #[arg(long, global = true, overrides_with = "rest")]
    no_rest: bool,

    /// Sidecar host.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Sidecar port.
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether the vault is unauthenticated, locked or unlocked.
    Status,

    /// Show the configured server.
    Server,

    /// Point the vault tool at another server, logging out first.
    Configure {
        /// Server URL.
        url: String,
    },

    /// Log in, or unlock an already logged-in vault.
    Login {
        /// Log in with the API key instead of username and password.
        #[arg(long)]
        apikey: bool,

        /// Print the session token, for reuse through BW_SESSION.
        #[arg(long)]
        show_session: bool,
    },

    /// Log out.
    Logout,

    /// List organizations.
    Organizations {
        /// Search term.
        #[arg(short, long)]
        search: Option<String>,
    },

    /// List the collections of an organization.
    Collections {
        /// Organization id.
        #[arg(short, long)]
        org: String,

        /// Search term.
        #[arg(short, long)]
        search: Option<String>,
    },

    /// List the child collections of a collection.
    Children {
        /// Organization id.
        #[arg(short, long)]
        org: String,

        /// Name of the parent collection.
        #[arg(short, long)]
        parent: String,
    },

    /// Show one collection with its permissions.
    Show {
        /// Organization id.
        #[arg(short, long)]
        org: String,

        /// Collection id.
        #[arg(long)]
        collection: String,
    },

    /// Copy permissions onto every child collection of a parent.
    Inherit {
        /// Organization id.
        #[arg(short, long)]
        org: String,

        /// Name of the parent collection.
        #[arg(short, long)]
        parent: String,

        /// User permissions as a JSON array, or @file (default: the parent's).
        #[arg(long)]
        users: Option<String>,

        /// Group permissions as a JSON array, or @file (default: the parent's).
        #[arg(long)]
        groups: Option<String>,

        /// Show what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Read or edit the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a configuration file with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print a setting, e.g. `admin.server_url`.
    Get {
        /// Dotted path of the setting.
        key: String,
    },

    /// Change a setting. Values are parsed as JSON when possible.
    Set {
        /// Dotted path of the setting.
        key: String,

        /// New value.
        value: String,
    },
}

impl Commands {
    /// Commands that cannot do anything without an unlocked vault.
    fn needs_login(&self) -> bool {
        matches!(
            self,
            Commands::Login { apikey: false, .. }
                | Commands::Organizations { .. }
                | Commands::Collections { .. }
                | Commands::Children { .. }
                | Commands::Show { .. }
                | Commands::Inherit { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let path = config_path(cli.config.clone());
    if let Commands::Config { action } = &cli.command {
        return cmd_config(&path, action);
    }

    let config = load_config(&cli, &path)?;
    let app = App::new(config, &cli.command).await?;

    let result = tokio::select! {
        result = app.run(&cli.command, &path) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("Interrupted")),
    };
    app.manager.shutdown().await;
    result
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Configuration file with command line overrides applied.
fn load_config(cli: &Cli, path: &Path) -> Result<ToolkitConfig> {
    let mut config = ConfigDocument::load(path)?.to_config()?;
    if let Some(executable) = &cli.bw_executable {
        config.admin.bw_executable = executable.clone();
    }
    if cli.rest {
        config.admin.use_rest = true;
    } else if cli.no_rest {
        config.admin.use_rest = false;
    }
    if let Some(host) = &cli.host {
        config.serve.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.serve.port = port;
    }
    debug!(config = ?config, "Configuration loaded");
    Ok(config)
}

fn env_secret(var: &str) -> Option<Secret> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .map(Secret::new)
}

/// Prompt for a secret without echo.
fn prompt_secret(prompt: &str) -> Result<Secret> {
    let value = rpassword::prompt_password(prompt).context("Failed to read password")?;
    if value.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(Secret::new(value))
}

/// Username and password. Prompts only when `interactive`.
fn credentials(config: &ToolkitConfig, interactive: bool) -> Result<Option<Credentials>> {
    let Some(username) = config.admin.username.clone() else {
        if interactive {
            bail!("No username configured; run `bwkit config set admin.username <email>`");
        }
        return Ok(None);
    };
    let password = match env_secret(PASSWORD_VAR) {
        Some(password) => password,
        None if interactive => prompt_secret(&format!("Master password for {}: ", username))?,
        None => return Ok(None),
    };
    Ok(Some(Credentials::new(username, password)))
}

/// API key. Prompts for the secret only when `interactive`.
fn api_key(config: &ToolkitConfig, interactive: bool) -> Result<Option<ApiKey>> {
    let Some(client_id) = config.admin.client_id.clone() else {
        if interactive {
            bail!("No client id configured; run `bwkit config set admin.client_id <id>`");
        }
        return Ok(None);
    };
    let secret = match env_secret(CLIENT_SECRET_VAR) {
        Some(secret) => secret,
        None if interactive => prompt_secret("API client secret: ")?,
        None => return Ok(None),
    };
    Ok(Some(ApiKey::new(client_id, secret)))
}

/// Read `--users`/`--groups`: inline JSON or `@file`.
fn read_permissions(raw: &str) -> Result<PermissionSet> {
    let text = match raw.strip_prefix('@') {
        Some(file) => std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read permissions from {}", file))?,
        None => raw.to_string(),
    };
    PermissionSet::parse(&text).context("Invalid permissions")
}

fn describe(collection: &VaultObject) -> String {
    let count = |field: &str| collection.get_array(field).map(Vec::len).unwrap_or(0);
    format!(
        "{}  {}  (users: {}, groups: {})",
        collection.id().unwrap_or("?"),
        collection.name().unwrap_or("?"),
        count("users"),
        count("groups")
    )
}

/// Prints one line per inheritance target.
struct Progress {
    names: HashMap<String, String>,
}

impl InheritanceObserver for Progress {
    fn on_target(&self, index: usize, total: usize, collection_id: &str, outcome: &TargetOutcome) {
        let name = self
            .names
            .get(collection_id)
            .map(String::as_str)
            .unwrap_or("?");
        let status = match outcome {
            TargetOutcome::Updated => "updated".to_string(),
            TargetOutcome::Skipped => "unchanged (dry run)".to_string(),
            TargetOutcome::Failed(reason) => reason.to_string(),
        };
        println!("[{}/{}] {} ({}): {}", index + 1, total, name, collection_id, status);
    }
}

struct App {
    config: ToolkitConfig,
    cli: Arc<BwCli>,
    manager: SessionManager,
    api_key: Option<ApiKey>,
}

impl App {
    async fn new(config: ToolkitConfig, command: &Commands) -> Result<Self> {
        let cli = BwCli::new(&config.admin.bw_executable)
            .context("Vault executable not available")?
            .with_timeout(config.command_timeout());
        let cli = Arc::new(cli);

        let resumed = std::env::var(SESSION_ENV)
            .ok()
            .and_then(|raw| SessionToken::from_output(&raw));
        let forced_api = matches!(command, Commands::Login { apikey: true, .. });
        let api_key = api_key(&config, forced_api)?;
        let interactive = command.needs_login() && resumed.is_none() && api_key.is_none();
        let credentials = credentials(&config, interactive)?;

        let manager = SessionManager::new(Arc::clone(&cli), credentials, config.sidecar());
        if let Some(token) = resumed {
            info!("Resuming session from {}", SESSION_ENV);
            manager.resume(token).await;
        }

        Ok(Self {
            config,
            cli,
            manager,
            api_key,
        })
    }

    async fn run(&self, command: &Commands, path: &Path) -> Result<()> {
        match command {
            Commands::Status => {
                println!("{}", self.manager.status().await);
                Ok(())
            }
            Commands::Server => {
                println!("{}", self.manager.server().await?);
                Ok(())
            }
            Commands::Configure { url } => self.cmd_configure(url, path).await,
            Commands::Login { show_session, .. } => self.cmd_login(*show_session).await,
            Commands::Logout => {
                self.manager.logout().await.context("Logout failed")?;
                println!("Logged out.");
                Ok(())
            }
            Commands::Organizations { search } => self.cmd_organizations(search.as_deref()).await,
            Commands::Collections { org, search } => {
                self.cmd_collections(org, search.as_deref()).await
            }
            Commands::Children { org, parent } => self.cmd_children(org, parent).await,
            Commands::Show { org, collection } => self.cmd_show(org, collection).await,
            Commands::Inherit {
                org,
                parent,
                users,
                groups,
                dry_run,
            } => {
                self.cmd_inherit(org, parent, users.as_deref(), groups.as_deref(), *dry_run)
                    .await
            }
            Commands::Config { action } => cmd_config(path, action),
        }
    }

    /// Point the vault tool at the configured server, then log in.
    async fn login(&self) -> Result<SessionState> {
        let server = &self.config.admin.server_url;
        if self
            .manager
            .use_server(server)
            .await
            .with_context(|| format!("Failed to switch to server {}", server))?
        {
            info!("Using server {}", server);
        }

        match &self.api_key {
            Some(key) => Ok(self
                .manager
                .login_as_api(key)
                .await
                .context("Login with API key failed")?),
            None => {
                self.manager.login_as_user().await.context("Login failed")?;
                Ok(SessionState::Unlocked)
            }
        }
    }

    /// Log in and build the object client for the configured mode.
    async fn connect(&self) -> Result<VaultClient> {
        if self.login().await? != SessionState::Unlocked {
            bail!("Vault is locked; set {} to unlock it", PASSWORD_VAR);
        }
        match self.manager.sidecar_config() {
            Some(sidecar) => Ok(VaultClient::rest(
                sidecar.client(self.config.command_timeout())?,
                self.manager.session(),
            )),
            None => Ok(VaultClient::process(
                Arc::clone(&self.cli),
                self.manager.session(),
            )),
        }
    }

    async fn cmd_configure(&self, url: &str, path: &Path) -> Result<()> {
        self.manager
            .configure(url)
            .await
            .context("Failed to configure server")?;

        let mut doc = ConfigDocument::load(path)?;
        doc.set("admin.server_url", Value::String(url.to_string()))?;
        doc.save(path)?;

        println!("Server set to {}", url);
        Ok(())
    }

    async fn cmd_login(&self, show_session: bool) -> Result<()> {
        let state = self.login().await?;
        println!("Vault is {}.", state);

        if show_session {
            let session = self.manager.session();
            let session = session.read().await;
            match session.token() {
                Some(token) => println!("{}", token.expose()),
                None => bail!("No session token available"),
            }
        }
        Ok(())
    }

    async fn cmd_organizations(&self, search: Option<&str>) -> Result<()> {
        let client = self.connect().await?;
        let organizations = client
            .organizations(search)
            .await?
            .context("Could not list organizations")?;

        for organization in &organizations {
            println!(
                "{}  {}",
                organization.id().unwrap_or("?"),
                organization.name().unwrap_or("?")
            );
        }
        Ok(())
    }

    async fn cmd_collections(&self, org: &str, search: Option<&str>) -> Result<()> {
        let client = self.connect().await?;
        let collections = client
            .org_collections(org, search)
            .await?
            .context("Could not list collections")?;

        for collection in &collections {
            println!("{}", describe(collection));
        }
        Ok(())
    }

    async fn cmd_children(&self, org: &str, parent: &str) -> Result<()> {
        let client = self.connect().await?;
        let collections = client
            .org_collections(org, None)
            .await?
            .context("Could not list collections")?;

        let children = children_of(&collections, parent);
        if children.is_empty() {
            println!("'{}' has no child collections.", parent);
        }
        for child in children {
            println!("{}", describe(child));
        }
        Ok(())
    }

    async fn cmd_show(&self, org: &str, collection_id: &str) -> Result<()> {
        let client = self.connect().await?;
        let collection = client
            .org_collection(org, collection_id, None)
            .await?
            .with_context(|| format!("Collection {} not found", collection_id))?;

        println!("{}", serde_json::to_string_pretty(collection.as_map())?);
        Ok(())
    }

    async fn cmd_inherit(
        &self,
        org: &str,
        parent: &str,
        users: Option<&str>,
        groups: Option<&str>,
        dry_run: bool,
    ) -> Result<()> {
        let client = self.connect().await?;
        let collections = client
            .org_collections(org, None)
            .await?
            .context("Could not list collections")?;

        let source = find_by_name(&collections, parent)
            .with_context(|| format!("No collection named '{}'", parent))?;
        let users = match users {
            Some(raw) => read_permissions(raw)?,
            None => PermissionSet::from_collection(source, "users"),
        };
        let groups = match groups {
            Some(raw) => read_permissions(raw)?,
            None => PermissionSet::from_collection(source, "groups"),
        };

        let children = children_of(&collections, parent);
        if children.is_empty() {
            println!("'{}' has no child collections.", parent);
            return Ok(());
        }

        let mut targets = Vec::with_capacity(children.len());
        let mut names = HashMap::new();
        for child in &children {
            if let Some(id) = child.id() {
                targets.push(id.to_string());
                names.insert(id.to_string(), child.name().unwrap_or_default().to_string());
            }
        }

        println!(
            "Applying {} user and {} group permissions of '{}' to {} collections",
            users.len(),
            groups.len(),
            parent,
            targets.len()
        );

        let progress = Progress { names };
        let engine = InheritanceEngine::new(client).with_dry_run(dry_run);
        let report = engine
            .run(org, &targets, &users, &groups, Some(&progress))
            .await;

        println!("{}", report);
        if !report.is_success() {
            for failure in &report.failures {
                eprintln!("  {}: {}", failure.collection_id, failure.reason);
            }
            bail!(
                "{} of {} collections were not updated",
                report.failures.len(),
                report.processed
            );
        }
        Ok(())
    }
}

fn cmd_config(path: &Path, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists, use --force to overwrite", path.display());
            }
            ConfigDocument::default().save(path)?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Get { key } => {
            let doc = ConfigDocument::load(path)?;
            let value = doc
                .get(key)
                .with_context(|| format!("No setting '{}'", key))?;
            match value {
                Value::String(text) => println!("{}", text),
                other => println!("{}", serde_json::to_string_pretty(other)?),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut doc = ConfigDocument::load(path)?;
            doc.set(key, parse_value(value))?;
            doc.to_config()
                .with_context(|| format!("Refusing to save invalid value for '{}'", key))?;
            doc.save(path)?;
            println!("{} updated", key);
        }
    }
    Ok(())
}
