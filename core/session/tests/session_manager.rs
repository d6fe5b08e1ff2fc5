//! Session Manager transitions against a scripted vault executable.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use bwkit_common::{Error, ObjectKind, Secret, SessionState, SessionToken};
use bwkit_session::{ApiKey, Credentials, SessionManager, SidecarConfig};
use bwkit_testkit::{FakeVault, CLIENT_SECRET, PASSWORD, SERVER, TOKEN};
use bwkit_transport::{BwCli, ObjectQuery, RestClient, RestTransport, VaultTransport};

fn manager(fake: &FakeVault, password: Option<&str>) -> SessionManager {
    manager_with_sidecar(fake, password, None)
}

fn manager_with_sidecar(
    fake: &FakeVault,
    password: Option<&str>,
    sidecar: Option<SidecarConfig>,
) -> SessionManager {
    let cli = Arc::new(BwCli::new(fake.executable()).unwrap());
    let credentials = password.map(|p| Credentials::new("alice@example.com", Secret::new(p)));
    SessionManager::new(cli, credentials, sidecar)
}

async fn token(manager: &SessionManager) -> Option<String> {
    let session = manager.session();
    let session = session.read().await;
    session.token().map(|t| t.expose().to_string())
}

fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[tokio::test]
async fn test_fresh_login_captures_token() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, Some(PASSWORD));

    manager.login_as_user().await.unwrap();

    assert_eq!(fake.subcommands(), vec!["status", "login"]);
    assert_eq!(token(&manager).await.as_deref(), Some(TOKEN));
    assert_eq!(manager.session().read().await.state(), SessionState::Unlocked);

    let login = &fake.calls()[1];
    assert_eq!(login.args, "login alice@example.com --passwordenv BW_PASSWORD --raw");
    assert!(!login.args.contains(PASSWORD));
}

#[tokio::test]
async fn test_locked_vault_is_unlocked_not_logged_in() {
    let fake = FakeVault::new().unwrap();
    fake.set_state("locked");
    let manager = manager(&fake, Some(PASSWORD));

    manager.login_as_user().await.unwrap();

    assert_eq!(fake.subcommands(), vec!["status", "unlock"]);
    assert_eq!(token(&manager).await.as_deref(), Some(TOKEN));
    assert_eq!(fake.state(), "unlocked");
}

#[tokio::test]
async fn test_failed_unlock_does_not_fall_back_to_login() {
    let fake = FakeVault::new().unwrap();
    fake.set_state("locked");
    let manager = manager(&fake, Some("wrong password"));

    let result = manager.login_as_user().await;

    assert!(matches!(result, Err(Error::Auth(_))));
    assert_eq!(fake.subcommands(), vec!["status", "unlock"]);
    assert!(token(&manager).await.is_none());
}

#[tokio::test]
async fn test_already_unlocked_is_idempotent() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, Some(PASSWORD));
    manager.login_as_user().await.unwrap();

    manager.login_as_user().await.unwrap();

    assert_eq!(fake.subcommands(), vec!["status", "login", "status"]);
    assert_eq!(token(&manager).await.as_deref(), Some(TOKEN));
}

#[tokio::test]
async fn test_rejected_login_and_missing_credentials() {
    let fake = FakeVault::new().unwrap();
    let result = manager(&fake, Some("nope")).login_as_user().await;
    assert!(matches!(result, Err(Error::Auth(_))));
    assert_eq!(fake.state(), "unauthenticated");

    let result = manager(&fake, None).login_as_user().await;
    assert!(matches!(result, Err(Error::Auth(_))));
}

#[tokio::test]
async fn test_status_maps_states_and_failures() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, Some(PASSWORD));

    assert_eq!(manager.status().await, SessionState::Unauthenticated);
    fake.set_state("locked");
    assert_eq!(manager.status().await, SessionState::Locked);
    fake.set_state("unlocked");
    assert_eq!(manager.status().await, SessionState::Unlocked);

    fake.fail("status", "Failed to connect");
    assert_eq!(manager.status().await, SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_configure_while_unlocked_logs_out_first() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, Some(PASSWORD));
    manager.login_as_user().await.unwrap();

    manager.configure("https://vault.example.com").await.unwrap();

    assert_eq!(
        fake.subcommands(),
        vec!["status", "login", "status", "logout", "config"]
    );
    assert!(token(&manager).await.is_none());
    assert_eq!(fake.server(), "https://vault.example.com");
    assert_eq!(manager.server().await.unwrap(), "https://vault.example.com");
}

#[tokio::test]
async fn test_configure_keeps_server_when_logout_fails() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, Some(PASSWORD));
    manager.login_as_user().await.unwrap();
    fake.fail("logout", "Network error");

    let result = manager.configure("https://vault.example.com").await;

    assert!(matches!(result, Err(Error::Transport(_))));
    assert_eq!(fake.server(), SERVER);
    assert_eq!(token(&manager).await.as_deref(), Some(TOKEN));
}

#[tokio::test]
async fn test_configure_rejects_invalid_urls() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, Some(PASSWORD));

    for url in ["not a url", "ftp://vault.example.com"] {
        let result = manager.configure(url).await;
        assert!(matches!(result, Err(Error::Configuration(_))), "{}", url);
    }
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_logout_failure_keeps_local_session() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, Some(PASSWORD));
    manager.login_as_user().await.unwrap();

    fake.fail("logout", "Network error");
    assert!(manager.logout().await.is_err());
    assert_eq!(token(&manager).await.as_deref(), Some(TOKEN));

    fake.recover("logout");
    manager.logout().await.unwrap();
    assert!(token(&manager).await.is_none());
    assert_eq!(
        manager.session().read().await.state(),
        SessionState::Unauthenticated
    );
}

#[tokio::test]
async fn test_api_login_unlocks_when_password_known() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, Some(PASSWORD));
    let key = ApiKey::new("user.1234", Secret::new(CLIENT_SECRET));

    let state = manager.login_as_api(&key).await.unwrap();

    assert_eq!(state, SessionState::Unlocked);
    assert_eq!(fake.subcommands(), vec!["status", "login", "unlock"]);
    assert_eq!(fake.calls()[1].args, "login --apikey --raw");
    assert_eq!(token(&manager).await.as_deref(), Some(TOKEN));
}

#[tokio::test]
async fn test_api_login_without_password_stays_locked() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, None);

    let wrong = ApiKey::new("user.1234", Secret::new("bad"));
    assert!(matches!(manager.login_as_api(&wrong).await, Err(Error::Auth(_))));

    let key = ApiKey::new("user.1234", Secret::new(CLIENT_SECRET));
    let state = manager.login_as_api(&key).await.unwrap();
    assert_eq!(state, SessionState::Locked);
    assert!(token(&manager).await.is_none());

    // Logged in already: no second login.
    let state = manager.login_as_api(&key).await.unwrap();
    assert_eq!(state, SessionState::Locked);
    assert_eq!(fake.subcommands(), vec!["status", "login", "status", "login", "status"]);
}

#[tokio::test]
async fn test_sidecar_started_once_and_stopped_on_shutdown() {
    let fake = FakeVault::new().unwrap();
    let sidecar = SidecarConfig::new("127.0.0.1", 18087).with_startup_timeout(None);
    let manager = manager_with_sidecar(&fake, Some(PASSWORD), Some(sidecar));

    manager.login_as_user().await.unwrap();
    assert!(manager.is_server_running().await);
    let pid = manager.server_pid().await.unwrap();
    assert!(process_alive(pid));

    manager.ensure_server_running().await.unwrap();
    manager.login_as_user().await.unwrap();
    assert_eq!(manager.server_pid().await, Some(pid));

    manager.shutdown().await;
    assert!(!manager.is_server_running().await);
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn test_logout_stops_sidecar() {
    let fake = FakeVault::new().unwrap();
    let sidecar = SidecarConfig::new("127.0.0.1", 18088).with_startup_timeout(None);
    let manager = manager_with_sidecar(&fake, Some(PASSWORD), Some(sidecar));

    manager.login_as_user().await.unwrap();
    let pid = manager.server_pid().await.unwrap();

    manager.logout().await.unwrap();
    assert!(!manager.is_server_running().await);
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn test_no_sidecar_in_process_mode() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, Some(PASSWORD));
    manager.login_as_user().await.unwrap();
    manager.ensure_server_running().await.unwrap();
    assert!(!manager.is_server_running().await);
}

#[tokio::test]
async fn test_resumed_token_skips_login() {
    let fake = FakeVault::new().unwrap();
    fake.set_state("unlocked");
    let manager = manager(&fake, None);

    manager
        .resume(SessionToken::from_output("exported-token").unwrap())
        .await;
    manager.login_as_user().await.unwrap();

    assert_eq!(fake.subcommands(), vec!["status"]);
    assert_eq!(fake.calls()[0].session.as_deref(), Some("exported-token"));
    assert_eq!(token(&manager).await.as_deref(), Some("exported-token"));
    assert_eq!(manager.session().read().await.state(), SessionState::Unlocked);
}

#[tokio::test]
async fn test_use_server_switches_only_when_different() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, Some(PASSWORD));
    manager.login_as_user().await.unwrap();

    assert!(!manager.use_server(&format!("{}/", SERVER)).await.unwrap());
    assert_eq!(fake.state(), "unlocked");

    assert!(manager.use_server("https://vault.example.com").await.unwrap());
    assert_eq!(fake.server(), "https://vault.example.com");
    assert_eq!(fake.state(), "unauthenticated");
    assert!(token(&manager).await.is_none());

    let calls = fake.calls().len();
    assert!(!manager.use_server("https://vault.example.com").await.unwrap());
    assert_eq!(fake.subcommands()[calls..], ["config"]);
}

#[tokio::test]
async fn test_logout_waits_for_in_flight_rest_call() {
    let fake = FakeVault::new().unwrap();
    let manager = manager(&fake, Some(PASSWORD));
    manager.login_as_user().await.unwrap();

    // Accepts connections but never answers.
    let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = silent.local_addr().unwrap().port();
    let client = RestClient::new("127.0.0.1", port, None).unwrap();
    let transport = Arc::new(RestTransport::new(client, manager.session()));

    let pending = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            transport
                .list(ObjectKind::Organization, &ObjectQuery::new())
                .await
        })
    };
    while manager.session().try_write().is_ok() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let logout = tokio::time::timeout(Duration::from_millis(500), manager.logout()).await;
    assert!(logout.is_err());
    assert!(!pending.is_finished());
    assert_eq!(fake.state(), "unlocked");

    pending.abort();
    let _ = pending.await;
    manager.logout().await.unwrap();
    assert_eq!(fake.state(), "unauthenticated");
    drop(silent);
}
