//! End-to-end tests: the core client stack against a live server on an
//! ephemeral port.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lockbox_api::{app_router, AppConfig, AppState, ServerStore};
use lockbox_core::{
    AuthClient, Codec, Error, HttpVaultClient, LocalCache, LockBox, LockBoxInput, Reconciler,
    RemoteVault, Session, SessionPersistence,
};
use pretty_assertions::assert_eq;

const JWT_SECRET: &str = "integration-secret-0123456789abcdefghij";
const KEY: &[u8] = b"0123456789abcdef";

#[derive(Clone, Default)]
struct MemoryStore {
    session: Arc<Mutex<Option<Session>>>,
}

impl SessionPersistence for MemoryStore {
    fn load_session(&self) -> lockbox_core::Result<Option<Session>> {
        Ok(self.session.lock().unwrap().clone())
    }

    fn save_session(&self, session: &Session) -> lockbox_core::Result<()> {
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn clear_session(&self) -> lockbox_core::Result<()> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

struct TestServer {
    base_url: String,
    store: ServerStore,
}

async fn spawn_server() -> TestServer {
    let config = AppConfig::from_lookup(|name| {
        (name == "LOCKBOX_JWT_SECRET").then(|| JWT_SECRET.to_string())
    })
    .unwrap();
    let store = ServerStore::open_in_memory().unwrap();
    let state = AppState::new(Arc::new(config), store.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app_router(state)).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        store,
    }
}

fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn codec() -> Codec {
    Codec::new(KEY).unwrap()
}

fn auth_client(base_url: &str) -> AuthClient<MemoryStore> {
    AuthClient::new(base_url, reqwest::Client::new(), MemoryStore::default()).unwrap()
}

async fn signed_in(server: &TestServer, username: &str) -> Session {
    let auth = auth_client(&server.base_url);
    auth.register(username, "hunter22").await.unwrap();
    auth.login(username, "hunter22").await.unwrap()
}

fn vault_client(base_url: &str) -> HttpVaultClient {
    HttpVaultClient::new(base_url, codec(), Duration::from_secs(2)).unwrap()
}

fn reconciler(base_url: &str, cache: LocalCache) -> Reconciler<HttpVaultClient> {
    Reconciler::new(cache, vault_client(base_url))
}

fn vault1() -> LockBoxInput {
    LockBoxInput::new("vault1")
        .with_url("https://mail.example.com")
        .with_login("alice@example.com")
        .with_password("pw")
        .with_description("mail")
}

#[tokio::test(flavor = "multi_thread")]
async fn register_and_login_flow() {
    let server = spawn_server().await;
    let auth = auth_client(&server.base_url);

    let user_id = auth.register("alice", "hunter22").await.unwrap();
    assert!(!user_id.is_empty());
    assert!(matches!(
        auth.register("alice", "other-pass").await,
        Err(Error::AlreadyExists(name)) if name == "alice"
    ));
    assert!(matches!(
        auth.login("alice", "wrong-pass").await,
        Err(Error::Auth(_))
    ));
    assert_eq!(auth.restore_session().unwrap(), None);

    let session = auth.login("alice", "hunter22").await.unwrap();
    assert_eq!(session.owner(), user_id);
    assert_eq!(auth.restore_session().unwrap(), Some(session));

    auth.logout().unwrap();
    assert_eq!(auth.restore_session().unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn lock_box_routes_require_valid_token() {
    let server = spawn_server().await;
    let forged = Session::new("1", "not-a-jwt").unwrap();
    let result = vault_client(&server.base_url).list_all(&forged).await;
    assert!(matches!(result, Err(Error::Auth(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn create_and_get_with_server_reachable() {
    let server = spawn_server().await;
    let session = signed_in(&server, "alice").await;
    let cache = LocalCache::open_in_memory(codec()).unwrap();
    let reconciler = reconciler(&server.base_url, cache);

    let created = reconciler.create(&session, vault1()).await.unwrap();
    assert!(created.id > 0);

    let fetched = reconciler.get(&session, "vault1").await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.login, "alice@example.com");
    assert_eq!(fetched.password, "pw");

    // The server only holds ciphertext
    let stored = server
        .store
        .get(session.owner(), "vault1")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored.password, "pw");
    assert_eq!(codec().decrypt(&stored.password).unwrap(), "pw");

    let listed = reconciler.list(&session).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].description, "mail");
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_create_converges_after_sync() {
    let server = spawn_server().await;
    let session = signed_in(&server, "alice").await;
    let cache = LocalCache::open_in_memory(codec()).unwrap();

    let offline = reconciler(&unreachable_url(), cache.clone());
    let created = offline.create(&session, vault1()).await.unwrap();
    assert_eq!(created.id, 0);
    let local = offline.get(&session, "vault1").await.unwrap();
    assert_eq!(local.password, "pw");
    assert!(server
        .store
        .get(session.owner(), "vault1")
        .await
        .unwrap()
        .is_none());

    let online = reconciler(&server.base_url, cache.clone());
    let report = online.sync_tick(&session).await.unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(report.failed, 0);

    let server_row = server
        .store
        .get(session.owner(), "vault1")
        .await
        .unwrap()
        .unwrap();
    let cached = cache.get_by_name(&session, "vault1").await.unwrap().unwrap();
    assert_eq!(cached.id, server_row.id);
    assert!(cached.synced_at.is_some());
    assert_eq!(cached.synced_at, server_row.synced_at);
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_twice_yields_same_id_and_content() {
    let server = spawn_server().await;
    let session = signed_in(&server, "alice").await;
    let client = vault_client(&server.base_url);

    let record = LockBox {
        synced_at: Some(1_700_000_000_000),
        ..LockBox::from_input(session.owner(), vault1()).unwrap()
    };
    let first = client.upsert(&session, &record).await.unwrap();
    let after_first = client.get(&session, "vault1").await.unwrap();
    let second = client.upsert(&session, &record).await.unwrap();
    let after_second = client.get(&session, "vault1").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(after_first, after_second);
}

#[tokio::test(flavor = "multi_thread")]
async fn soft_delete_and_restore_follow_deletion_time() {
    let server = spawn_server().await;
    let session = signed_in(&server, "alice").await;
    let client = vault_client(&server.base_url);

    let original = LockBox::from_input(session.owner(), vault1()).unwrap();
    let id = client.create(&session, &original).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    client.delete(&session, "vault1").await.unwrap();
    // Repeat deletes are idempotent
    client.delete(&session, "vault1").await.unwrap();
    assert!(matches!(
        client.get(&session, "vault1").await,
        Err(Error::NotFound(_))
    ));

    // An edit made before the deletion does not resurrect the row
    let stale = LockBox {
        login: "stale".to_string(),
        ..original.clone()
    };
    assert_eq!(client.upsert(&session, &stale).await.unwrap(), id);
    assert!(client.list_all(&session).await.unwrap().is_empty());

    // A newer edit restores it under the same id
    tokio::time::sleep(Duration::from_millis(5)).await;
    let fresh = LockBox::from_input(
        session.owner(),
        LockBoxInput::new("vault1").with_login("fresh"),
    )
    .unwrap();
    assert_eq!(client.upsert(&session, &fresh).await.unwrap(), id);
    let restored = client.get(&session, "vault1").await.unwrap();
    assert_eq!(restored.login, "fresh");
    assert_eq!(restored.password, "pw");
}

#[tokio::test(flavor = "multi_thread")]
async fn create_restores_soft_deleted_name() {
    let server = spawn_server().await;
    let session = signed_in(&server, "alice").await;
    let client = vault_client(&server.base_url);

    let record = LockBox::from_input(session.owner(), vault1()).unwrap();
    let id = client.create(&session, &record).await.unwrap();
    assert!(matches!(
        client.create(&session, &record).await,
        Err(Error::AlreadyExists(name)) if name == "vault1"
    ));

    client.delete(&session, "vault1").await.unwrap();
    assert_eq!(client.create(&session, &record).await.unwrap(), id);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_records_are_not_found() {
    let server = spawn_server().await;
    let session = signed_in(&server, "alice").await;
    let cache = LocalCache::open_in_memory(codec()).unwrap();
    let reconciler = reconciler(&server.base_url, cache);

    assert!(matches!(
        reconciler.get(&session, "ghost").await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        reconciler.delete(&session, "ghost").await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        reconciler
            .update(&session, LockBoxInput::new("ghost").with_password("x"))
            .await,
        Err(Error::NotFound(_))
    ));
    assert!(reconciler.list(&session).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn owners_cannot_see_each_other() {
    let server = spawn_server().await;
    let alice = signed_in(&server, "alice").await;
    let bob = signed_in(&server, "bob").await;
    let client = vault_client(&server.base_url);

    let record = LockBox::from_input(alice.owner(), vault1()).unwrap();
    client.create(&alice, &record).await.unwrap();

    assert!(client.list_all(&bob).await.unwrap().is_empty());
    assert!(matches!(
        client.get(&bob, "vault1").await,
        Err(Error::NotFound(_))
    ));
    // Bob can use the same name independently
    let bobs = LockBox::from_input(bob.owner(), vault1()).unwrap();
    assert!(client.create(&bob, &bobs).await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn update_merges_remotely_and_locally() {
    let server = spawn_server().await;
    let session = signed_in(&server, "alice").await;
    let cache = LocalCache::open_in_memory(codec()).unwrap();
    let reconciler = reconciler(&server.base_url, cache.clone());

    reconciler.create(&session, vault1()).await.unwrap();
    reconciler
        .update(&session, LockBoxInput::new("vault1").with_password("rotated"))
        .await
        .unwrap();

    let remote = reconciler.get(&session, "vault1").await.unwrap();
    assert_eq!(remote.password, "rotated");
    assert_eq!(remote.login, "alice@example.com");

    let cached = cache.get_by_name(&session, "vault1").await.unwrap().unwrap();
    assert_eq!(cached.password, "rotated");
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_server_payload_is_rejected() {
    let server = spawn_server().await;
    let session = signed_in(&server, "alice").await;
    let client = vault_client(&server.base_url);

    let record = LockBox::from_input(session.owner(), vault1()).unwrap();
    client.create(&session, &record).await.unwrap();

    // Well-formed token, but sealed under a different key
    let foreign = Codec::new(b"fedcba9876543210").unwrap();
    let tampered = LockBox {
        name: "vault1".to_string(),
        password: foreign.encrypt("pw").unwrap(),
        ..LockBox::default()
    };
    server
        .store
        .update(session.owner(), &tampered)
        .await
        .unwrap();

    assert!(matches!(
        client.get(&session, "vault1").await,
        Err(Error::Integrity)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn one_undecryptable_record_does_not_block_the_rest() {
    let server = spawn_server().await;
    let session = signed_in(&server, "alice").await;
    let client = vault_client(&server.base_url);

    client
        .create(&session, &LockBox::from_input(session.owner(), vault1()).unwrap())
        .await
        .unwrap();
    let good = LockBoxInput::new("good").with_login("bob").with_password("pw2");
    client
        .create(&session, &LockBox::from_input(session.owner(), good).unwrap())
        .await
        .unwrap();

    let foreign = Codec::new(b"fedcba9876543210").unwrap();
    let tampered = LockBox {
        name: "vault1".to_string(),
        password: foreign.encrypt("pw").unwrap(),
        ..LockBox::default()
    };
    server
        .store
        .update(session.owner(), &tampered)
        .await
        .unwrap();

    let cache = LocalCache::open_in_memory(codec()).unwrap();
    let reconciler = reconciler(&server.base_url, cache.clone());
    let report = reconciler.sync_tick(&session).await.unwrap();
    assert_eq!(report.pulled, 1);
    assert_eq!(report.failed, 1);

    let cached = cache.get_by_name(&session, "good").await.unwrap().unwrap();
    assert_eq!(cached.password, "pw2");
    assert!(cache.get_by_name(&session, "vault1").await.unwrap().is_none());

    let listed = reconciler.list(&session).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "good");

    let entries = client.list_all(&session).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries
        .iter()
        .any(|entry| entry.name == "vault1" && matches!(entry.record, Err(Error::Integrity))));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_user_login_is_unauthorized() {
    let server = spawn_server().await;
    signed_in(&server, "alice").await;
    let auth = auth_client(&server.base_url);

    assert!(matches!(
        auth.login("mallory", "hunter22").await,
        Err(Error::Auth(_))
    ));
    assert!(matches!(
        auth.login("alice", "hunter23").await,
        Err(Error::Auth(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_enforces_credential_and_payload_rules() {
    let server = spawn_server().await;
    let http = reqwest::Client::new();
    for (username, password) in [("al", "hunter22"), ("alice", "12345")] {
        let response = http
            .post(format!("{}/api/users/", server.base_url))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    let session = signed_in(&server, "alice").await;
    let empty = LockBox::from_input(session.owner(), LockBoxInput::new("vault1")).unwrap();
    assert!(matches!(
        vault_client(&server.base_url).create(&session, &empty).await,
        Err(Error::RemoteUnavailable { status: Some(400), .. })
    ));

    let cache = LocalCache::open_in_memory(codec()).unwrap();
    let reconciler = reconciler(&server.base_url, cache.clone());
    assert!(matches!(
        reconciler.create(&session, LockBoxInput::new("vault1")).await,
        Err(Error::DataRequired)
    ));
    assert!(!cache.exists(&session, "vault1").await.unwrap());
}
