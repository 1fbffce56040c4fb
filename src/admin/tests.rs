use super::*;
use crate::auth::models::Identity;
use crate::auth::{AuthError, FirebaseAuth, IdentityProvider};
use crate::config::StaticCredential;
use crate::firestore::{FirebaseFirestore, FirestoreError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

const STATIC_EMAIL: &str = "admin@sekaaltyapi.com";
const STATIC_PASSWORD: &str = "admin123";

// In-memory admin records.
#[derive(Default)]
struct FakeStore {
    records: Mutex<HashMap<String, AdminRecord>>,
    unavailable: AtomicBool,
}

impl FakeStore {
    fn with_record(owner_id: &str, is_admin: bool) -> Self {
        let store = Self::default();
        let mut record = AdminRecord::new(owner_id, "Ayşe Yılmaz");
        record.is_admin = is_admin;
        store
            .records
            .lock()
            .unwrap()
            .insert(owner_id.to_string(), record);
        store
    }

    fn record(&self, owner_id: &str) -> Option<AdminRecord> {
        self.records.lock().unwrap().get(owner_id).cloned()
    }

    fn fail(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    fn recover(&self) {
        self.unavailable.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FirestoreError::ApiError("503 Service Unavailable".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl AdminStore for FakeStore {
    async fn has_any_admin(&self) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.records.lock().unwrap().values().any(|r| r.is_admin))
    }

    async fn get(&self, owner_id: &str) -> Result<Option<AdminRecord>, StoreError> {
        self.check()?;
        Ok(self.record(owner_id))
    }

    async fn put(&self, record: &AdminRecord) -> Result<(), StoreError> {
        self.check()?;
        self.records
            .lock()
            .unwrap()
            .insert(record.owner_id.clone(), record.clone());
        Ok(())
    }

    async fn touch(&self, owner_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(owner_id)
            .ok_or_else(|| FirestoreError::ApiError("NOT_FOUND (code: 404)".to_string()))?;
        record.updated_at = Some(at);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AdminRecord>, StoreError> {
        self.check()?;
        let mut records: Vec<_> = self.records.lock().unwrap().values().cloned().collect();
        records.sort_by(|a, b| a.owner_id.cmp(&b.owner_id));
        Ok(records)
    }
}

struct Account {
    uid: String,
    password: String,
    display_name: Option<String>,
}

// In-memory identity provider that counts every call.
struct FakeProvider {
    accounts: Mutex<HashMap<String, Account>>,
    state: watch::Sender<Option<Identity>>,
    calls: AtomicUsize,
    sign_outs: AtomicUsize,
}

impl FakeProvider {
    fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            state,
            calls: AtomicUsize::new(0),
            sign_outs: AtomicUsize::new(0),
        }
    }

    fn with_account(self, email: &str, uid: &str, password: &str) -> Self {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            Account {
                uid: uid.to_string(),
                password: password.to_string(),
                display_name: None,
            },
        );
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    fn has_account(&self, email: &str) -> bool {
        self.accounts.lock().unwrap().contains_key(email)
    }

    fn password_of(&self, email: &str) -> Option<String> {
        self.accounts
            .lock()
            .unwrap()
            .get(email)
            .map(|a| a.password.clone())
    }

    fn identity(email: &str, account: &Account) -> Identity {
        Identity {
            uid: account.uid.clone(),
            email: email.to_string(),
            display_name: account.display_name.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let identity = {
            let accounts = self.accounts.lock().unwrap();
            match accounts.get(email) {
                Some(account) if account.password == password => Self::identity(email, account),
                _ => return Err(AuthError::InvalidCredentials),
            }
        };
        self.state.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(None);
    }

    async fn reauthenticate(&self, password: &str) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = self.current_user().ok_or(AuthError::NotSignedIn)?;
        match self.password_of(&user.email) {
            Some(current) if current == password => Ok(()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn update_password(&self, new_password: &str) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = self.current_user().ok_or(AuthError::NotSignedIn)?;
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts.get_mut(&user.email).ok_or(AuthError::NotSignedIn)?;
        account.password = new_password.to_string();
        Ok(())
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(AuthError::ApiError("Create account failed: EMAIL_EXISTS".to_string()));
        }
        let account = Account {
            uid: format!("uid-{}", accounts.len() + 1),
            password: password.to_string(),
            display_name: display_name.map(str::to_string),
        };
        let identity = Self::identity(email, &account);
        accounts.insert(email.to_string(), account);
        Ok(identity)
    }

    async fn delete_account(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.get(email) {
            Some(account) if account.password == password => {
                accounts.remove(email);
                Ok(())
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    fn current_user(&self) -> Option<Identity> {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }
}

fn gate(
    store: &Arc<FakeStore>,
    provider: &Arc<FakeProvider>,
) -> AuthenticationGate<FakeStore, FakeProvider> {
    AuthenticationGate::new(
        store.clone(),
        provider.clone(),
        StaticCredential::new(STATIC_EMAIL, STATIC_PASSWORD),
    )
}

#[tokio::test]
async fn test_static_login_without_database_admins() {
    let store = Arc::new(FakeStore::default());
    let provider = Arc::new(FakeProvider::new());
    let mut gate = gate(&store, &provider);

    let principal = gate.attempt_login(STATIC_EMAIL, STATIC_PASSWORD).await.unwrap();

    assert_eq!(principal.role, AdminRole::StaticAdmin);
    assert_eq!(principal.email, STATIC_EMAIL);
    assert_eq!(gate.state(), &GateState::Authenticated(principal));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_static_login_with_wrong_pair() {
    let store = Arc::new(FakeStore::default());
    let provider = Arc::new(FakeProvider::new());
    let mut gate = gate(&store, &provider);

    for (email, password) in [
        (STATIC_EMAIL, "admin1234"),
        ("other@sekaaltyapi.com", STATIC_PASSWORD),
        ("", ""),
    ] {
        let err = gate.attempt_login(email, password).await.unwrap_err();
        assert!(matches!(err, GateError::InvalidCredentials));
        assert_eq!(err.to_string(), "Invalid email or password");
        assert_eq!(gate.state(), &GateState::Rejected(Rejection::InvalidCredentials));
    }
    assert!(gate.principal().is_none());
}

#[tokio::test]
async fn test_static_pair_never_works_once_admins_exist() {
    let store = Arc::new(FakeStore::with_record("u1", true));
    let provider = Arc::new(FakeProvider::new().with_account("ayse@example.com", "u1", "s3cret!"));
    let mut gate = gate(&store, &provider);

    let err = gate
        .attempt_login(STATIC_EMAIL, STATIC_PASSWORD)
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::InvalidCredentials));
    assert_eq!(gate.state(), &GateState::Rejected(Rejection::InvalidCredentials));
    // The attempt went to the provider, not to the static comparison.
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_static_pair_registered_with_provider_but_not_admin() {
    let store = Arc::new(FakeStore::with_record("u1", true));
    let provider = Arc::new(FakeProvider::new().with_account(STATIC_EMAIL, "u9", STATIC_PASSWORD));
    let mut gate = gate(&store, &provider);

    let err = gate
        .attempt_login(STATIC_EMAIL, STATIC_PASSWORD)
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::NotAuthorized));
    assert!(provider.current_user().is_none());
}

#[tokio::test]
async fn test_database_admin_login() {
    let store = Arc::new(FakeStore::with_record("u1", true));
    let provider = Arc::new(FakeProvider::new().with_account("ayse@example.com", "u1", "s3cret!"));
    let mut gate = gate(&store, &provider);

    let principal = gate.attempt_login("ayse@example.com", "s3cret!").await.unwrap();

    assert_eq!(principal.role, AdminRole::DatabaseAdmin);
    assert_eq!(principal.id, "u1");
    assert_eq!(principal.display_name, "Ayşe Yılmaz");
    assert_eq!(provider.current_user().map(|u| u.uid).as_deref(), Some("u1"));
}

#[tokio::test]
async fn test_database_admin_wrong_password() {
    let store = Arc::new(FakeStore::with_record("u1", true));
    let provider = Arc::new(FakeProvider::new().with_account("ayse@example.com", "u1", "s3cret!"));
    let mut gate = gate(&store, &provider);

    let err = gate
        .attempt_login("ayse@example.com", "wrong")
        .await
        .unwrap_err();

    // Same message as a static-path mismatch.
    assert_eq!(err.to_string(), "Invalid email or password");
    assert_eq!(gate.state(), &GateState::Rejected(Rejection::InvalidCredentials));
}

#[tokio::test]
async fn test_identity_without_record_is_signed_out() {
    let store = Arc::new(FakeStore::with_record("u1", true));
    let provider = Arc::new(FakeProvider::new().with_account("mehmet@example.com", "u2", "pa55word"));
    let mut gate = gate(&store, &provider);

    let err = gate
        .attempt_login("mehmet@example.com", "pa55word")
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::NotAuthorized));
    assert_eq!(gate.state(), &GateState::Rejected(Rejection::NotAuthorized));
    assert_eq!(provider.sign_outs(), 1);
    assert!(provider.current_user().is_none());
}

#[tokio::test]
async fn test_record_with_is_admin_false_is_not_authorized() {
    let store = Arc::new(FakeStore::with_record("u1", true));
    store
        .put(&AdminRecord {
            is_admin: false,
            ..AdminRecord::new("u2", "Mehmet")
        })
        .await
        .unwrap();
    let provider = Arc::new(FakeProvider::new().with_account("mehmet@example.com", "u2", "pa55word"));
    let mut gate = gate(&store, &provider);

    let err = gate
        .attempt_login("mehmet@example.com", "pa55word")
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::NotAuthorized));
    assert!(provider.current_user().is_none());
}

#[tokio::test]
async fn test_existence_check_failure_aborts_login() {
    let store = Arc::new(FakeStore::default());
    store.fail();
    let provider = Arc::new(FakeProvider::new());
    let mut gate = gate(&store, &provider);

    // Even the exact static pair must not get through when the existence check fails.
    let err = gate
        .attempt_login(STATIC_EMAIL, STATIC_PASSWORD)
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::ProbeFailed(_)));
    assert_eq!(gate.state(), &GateState::Unauthenticated);
    assert_eq!(provider.calls(), 0);

    let probe = AdminExistenceProbe::new(store.clone());
    assert!(matches!(
        probe.has_any_database_admin().await,
        Err(GateError::ProbeFailed(StoreError::Firestore(FirestoreError::ApiError(_))))
    ));
}

#[tokio::test]
async fn test_change_password_as_static_admin() {
    let store = Arc::new(FakeStore::default());
    let provider = Arc::new(FakeProvider::new());
    let mut gate = gate(&store, &provider);
    gate.attempt_login(STATIC_EMAIL, STATIC_PASSWORD).await.unwrap();

    let err = gate
        .change_password(STATIC_PASSWORD, "new-password")
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::UnsupportedForStaticAdmin));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_change_password_requires_login() {
    let store = Arc::new(FakeStore::default());
    let provider = Arc::new(FakeProvider::new());
    let gate = gate(&store, &provider);

    let err = gate.change_password("old", "new-password").await.unwrap_err();
    assert!(matches!(err, GateError::NotAuthenticated));
}

#[tokio::test]
async fn test_change_password_flow() {
    let store = Arc::new(FakeStore::with_record("u1", true));
    let provider = Arc::new(FakeProvider::new().with_account("ayse@example.com", "u1", "s3cret!"));
    let mut gate = gate(&store, &provider);
    gate.attempt_login("ayse@example.com", "s3cret!").await.unwrap();

    let err = gate.change_password("wrong", "n3w-password").await.unwrap_err();
    assert!(matches!(err, GateError::ReauthenticationFailed));

    let err = gate.change_password("s3cret!", "short").await.unwrap_err();
    assert!(matches!(err, GateError::WeakPassword));

    assert!(store.record("u1").unwrap().updated_at.is_none());
    gate.change_password("s3cret!", "n3w-password").await.unwrap();

    assert_eq!(provider.password_of("ayse@example.com").as_deref(), Some("n3w-password"));
    assert!(store.record("u1").unwrap().updated_at.is_some());
}

#[tokio::test]
async fn test_logout() {
    let store = Arc::new(FakeStore::default());
    let provider = Arc::new(FakeProvider::new().with_account("ayse@example.com", "u1", "s3cret!"));
    let mut gate = gate(&store, &provider);

    // Static admin: no provider session to tear down.
    gate.attempt_login(STATIC_EMAIL, STATIC_PASSWORD).await.unwrap();
    gate.logout().await;
    assert_eq!(gate.state(), &GateState::Unauthenticated);
    assert_eq!(provider.sign_outs(), 0);

    store.put(&AdminRecord::new("u1", "Ayşe")).await.unwrap();
    gate.attempt_login("ayse@example.com", "s3cret!").await.unwrap();
    gate.logout().await;
    assert_eq!(gate.state(), &GateState::Unauthenticated);
    assert_eq!(provider.sign_outs(), 1);
    assert!(provider.current_user().is_none());
}

#[tokio::test]
async fn test_create_admin_closes_static_path() {
    let store = Arc::new(FakeStore::default());
    let provider = Arc::new(FakeProvider::new());
    let mut gate = gate(&store, &provider);

    assert!(matches!(
        gate.create_admin("ayse@example.com", "s3cret!", "Ayşe").await,
        Err(GateError::NotAuthenticated)
    ));

    gate.attempt_login(STATIC_EMAIL, STATIC_PASSWORD).await.unwrap();
    let record = gate
        .create_admin("ayse@example.com", "s3cret!", "Ayşe")
        .await
        .unwrap();
    assert!(record.is_admin);
    assert_eq!(store.record(&record.owner_id), Some(record.clone()));
    assert!(gate.has_any_database_admin().await.unwrap());

    // The running static session ends at the next reconciliation.
    gate.check_auth_state().await.unwrap();
    assert_eq!(gate.state(), &GateState::Unauthenticated);

    let err = gate
        .attempt_login(STATIC_EMAIL, STATIC_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::InvalidCredentials));

    let principal = gate.attempt_login("ayse@example.com", "s3cret!").await.unwrap();
    assert_eq!(principal.id, record.owner_id);
    assert_eq!(principal.role, AdminRole::DatabaseAdmin);
    assert_eq!(gate.list_admins().await.unwrap(), vec![record]);
}

#[tokio::test]
async fn test_create_admin_rejects_weak_password() {
    let store = Arc::new(FakeStore::default());
    let provider = Arc::new(FakeProvider::new());
    let mut gate = gate(&store, &provider);
    gate.attempt_login(STATIC_EMAIL, STATIC_PASSWORD).await.unwrap();

    let err = gate
        .create_admin("ayse@example.com", "123", "Ayşe")
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::WeakPassword));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_check_auth_state_restores_admin_session() {
    let store = Arc::new(FakeStore::with_record("u1", true));
    let provider = Arc::new(FakeProvider::new().with_account("ayse@example.com", "u1", "s3cret!"));
    provider
        .sign_in_with_password("ayse@example.com", "s3cret!")
        .await
        .unwrap();
    let mut gate = gate(&store, &provider);

    let has_database_admins = gate.bootstrap().await.unwrap();

    assert!(has_database_admins);
    assert_eq!(gate.principal().map(|p| p.id.as_str()), Some("u1"));

    // Session lost on the provider side.
    provider.sign_out().await;
    gate.check_auth_state().await.unwrap();
    assert_eq!(gate.state(), &GateState::Unauthenticated);
}

#[tokio::test]
async fn test_check_auth_state_signs_out_non_admin() {
    let store = Arc::new(FakeStore::default());
    store
        .put(&AdminRecord {
            is_admin: false,
            ..AdminRecord::new("u2", "Mehmet")
        })
        .await
        .unwrap();
    let provider = Arc::new(FakeProvider::new().with_account("mehmet@example.com", "u2", "pa55word"));
    provider
        .sign_in_with_password("mehmet@example.com", "pa55word")
        .await
        .unwrap();
    let mut gate = gate(&store, &provider);

    gate.check_auth_state().await.unwrap();

    assert_eq!(gate.state(), &GateState::Rejected(Rejection::NotAuthorized));
    assert!(provider.current_user().is_none());
    assert_eq!(provider.sign_outs(), 1);
}

#[tokio::test]
async fn test_auth_state_notifications() {
    let store = Arc::new(FakeStore::default());
    let provider = Arc::new(FakeProvider::new());
    let mut gate = gate(&store, &provider);
    let mut guard = SessionGuard::new(gate.subscribe(), Default::default());

    assert_eq!(guard.evaluate("/admin"), Decision::Render { loading: true });

    assert!(!gate.bootstrap().await.unwrap());
    assert_eq!(guard.changed().await, Some(AuthState::SignedOut));
    assert_eq!(guard.evaluate("/admin"), Decision::RedirectToLogin);

    let principal = gate.attempt_login(STATIC_EMAIL, STATIC_PASSWORD).await.unwrap();
    assert_eq!(guard.changed().await, Some(AuthState::SignedIn(principal)));
    assert_eq!(guard.evaluate("/admin/login"), Decision::RedirectToApp);

    gate.logout().await;
    assert_eq!(guard.changed().await, Some(AuthState::SignedOut));
    assert_eq!(guard.evaluate("/admin/login"), Decision::Render { loading: false });
}

#[tokio::test]
async fn test_provider_sign_out_ends_admin_session() {
    let store = Arc::new(FakeStore::with_record("u1", true));
    let provider = Arc::new(FakeProvider::new().with_account("ayse@example.com", "u1", "s3cret!"));
    let mut gate = gate(&store, &provider);
    let mut guard = SessionGuard::new(gate.subscribe(), Default::default());

    let principal = gate.attempt_login("ayse@example.com", "s3cret!").await.unwrap();
    assert_eq!(guard.changed().await, Some(AuthState::SignedIn(principal)));

    // Session lost at the provider, e.g. token revoked in another tab.
    provider.sign_out().await;
    gate.provider_changed().await.unwrap().unwrap();

    assert_eq!(gate.state(), &GateState::Unauthenticated);
    assert_eq!(guard.changed().await, Some(AuthState::SignedOut));
    assert_eq!(guard.evaluate("/admin"), Decision::RedirectToLogin);
}

#[tokio::test]
async fn test_provider_sign_in_of_non_admin_is_rejected() {
    let store = Arc::new(FakeStore::with_record("u1", true));
    let provider = Arc::new(FakeProvider::new().with_account("mehmet@example.com", "u2", "pa55word"));
    let mut gate = gate(&store, &provider);
    gate.bootstrap().await.unwrap();

    provider
        .sign_in_with_password("mehmet@example.com", "pa55word")
        .await
        .unwrap();
    gate.provider_changed().await.unwrap().unwrap();

    assert_eq!(gate.state(), &GateState::Rejected(Rejection::NotAuthorized));
    assert!(provider.current_user().is_none());
}

#[tokio::test]
async fn test_create_admin_removes_account_when_record_write_fails() {
    let store = Arc::new(FakeStore::default());
    let provider = Arc::new(FakeProvider::new());
    let mut gate = gate(&store, &provider);
    gate.attempt_login(STATIC_EMAIL, STATIC_PASSWORD).await.unwrap();

    store.fail();
    let err = gate
        .create_admin("ayse@example.com", "s3cret!", "Ayşe")
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::Store(_)));
    assert!(!provider.has_account("ayse@example.com"));

    store.recover();
    assert!(!gate.has_any_database_admin().await.unwrap());
    let record = gate
        .create_admin("ayse@example.com", "s3cret!", "Ayşe")
        .await
        .unwrap();
    assert!(provider.has_account("ayse@example.com"));
    assert_eq!(store.record(&record.owner_id), Some(record));
}

#[tokio::test]
async fn test_password_change_stands_when_record_update_fails() {
    let store = Arc::new(FakeStore::with_record("u1", true));
    let provider = Arc::new(FakeProvider::new().with_account("ayse@example.com", "u1", "s3cret!"));
    let mut gate = gate(&store, &provider);
    gate.attempt_login("ayse@example.com", "s3cret!").await.unwrap();

    store.fail();
    gate.change_password("s3cret!", "n3w-password").await.unwrap();

    assert_eq!(provider.password_of("ayse@example.com").as_deref(), Some("n3w-password"));
    assert!(store.record("u1").unwrap().updated_at.is_none());
}

// Against mocked Firebase endpoints.

const DOCUMENTS: &str = "/v1/projects/p/databases/(default)/documents";

fn firebase(server: &MockServer) -> (Arc<FirestoreAdminStore>, Arc<FirebaseAuth>) {
    let client = ClientBuilder::new(Client::new()).build();
    let firestore = FirebaseFirestore::new_with_client(client.clone(), server.url(DOCUMENTS));
    let auth = FirebaseAuth::new_with_client(client, server.url("/v1"), "test-api-key");
    (Arc::new(FirestoreAdminStore::new(firestore)), Arc::new(auth))
}

fn admin_document(uid: &str, is_admin: bool) -> serde_json::Value {
    json!({
        "name": format!("projects/p/databases/(default)/documents/admins/{}", uid),
        "fields": {
            "ownerId": { "stringValue": uid },
            "isAdmin": { "booleanValue": is_admin },
            "displayName": { "stringValue": "Ayşe Yılmaz" },
            "createdAt": { "timestampValue": "2024-01-01T09:30:00.125Z" }
        },
        "createTime": "2024-01-01T09:30:00.125Z",
        "updateTime": "2024-01-01T09:30:00.125Z"
    })
}

fn mock_admin_query(server: &MockServer, admins: Vec<serde_json::Value>) {
    let mut body: Vec<serde_json::Value> = admins
        .into_iter()
        .map(|doc| json!({ "document": doc, "readTime": "2024-02-01T00:00:00Z" }))
        .collect();
    if body.is_empty() {
        body.push(json!({ "readTime": "2024-02-01T00:00:00Z" }));
    }
    server.mock(move |when, then| {
        when.method(POST).path(format!("{}:runQuery", DOCUMENTS));
        then.status(200).json_body(json!(body));
    });
}

fn mock_sign_in(server: &MockServer, email: &str, uid: &str) {
    let (email, uid) = (email.to_string(), uid.to_string());
    server.mock(move |when, then| {
        when.method(POST)
            .path("/v1/accounts:signInWithPassword")
            .query_param("key", "test-api-key");
        then.status(200).json_body(json!({
            "localId": uid,
            "email": email,
            "idToken": "id-token",
            "refreshToken": "refresh-token",
            "expiresIn": "3600",
            "registered": true
        }));
    });
}

#[tokio::test]
async fn test_firebase_database_admin_login() {
    let server = MockServer::start();
    let (store, auth) = firebase(&server);
    mock_admin_query(&server, vec![admin_document("u1", true)]);
    mock_sign_in(&server, "ayse@example.com", "u1");
    let record = server.mock(|when, then| {
        when.method(GET).path(format!("{}/admins/u1", DOCUMENTS));
        then.status(200).json_body(admin_document("u1", true));
    });

    let mut gate = AuthenticationGate::new(
        store,
        auth.clone(),
        StaticCredential::new(STATIC_EMAIL, STATIC_PASSWORD),
    );
    let principal = gate.attempt_login("ayse@example.com", "s3cret!").await.unwrap();

    assert_eq!(principal.role, AdminRole::DatabaseAdmin);
    assert_eq!(principal.display_name, "Ayşe Yılmaz");
    assert_eq!(auth.current_user().map(|u| u.uid).as_deref(), Some("u1"));
    record.assert();
}

#[tokio::test]
async fn test_firebase_identity_without_record() {
    let server = MockServer::start();
    let (store, auth) = firebase(&server);
    mock_admin_query(&server, vec![admin_document("u1", true)]);
    mock_sign_in(&server, "mehmet@example.com", "u2");
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/admins/u2", DOCUMENTS));
        then.status(404).json_body(json!({
            "error": { "code": 404, "message": "Document not found", "status": "NOT_FOUND" }
        }));
    });

    let mut gate = AuthenticationGate::new(
        store,
        auth.clone(),
        StaticCredential::new(STATIC_EMAIL, STATIC_PASSWORD),
    );
    let err = gate
        .attempt_login("mehmet@example.com", "pa55word")
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::NotAuthorized));
    assert!(auth.current_user().is_none());
}

#[tokio::test]
async fn test_firebase_static_login_on_empty_collection() {
    let server = MockServer::start();
    let (store, auth) = firebase(&server);
    mock_admin_query(&server, vec![]);

    let mut gate = AuthenticationGate::new(
        store,
        auth,
        StaticCredential::new(STATIC_EMAIL, STATIC_PASSWORD),
    );
    let principal = gate.attempt_login(STATIC_EMAIL, STATIC_PASSWORD).await.unwrap();
    assert!(principal.is_static());
}

#[tokio::test]
async fn test_firebase_query_error_is_not_an_empty_collection() {
    let server = MockServer::start();
    let (store, auth) = firebase(&server);
    server.mock(|when, then| {
        when.method(POST).path(format!("{}:runQuery", DOCUMENTS));
        then.status(503).body("backend unavailable");
    });

    let mut gate = AuthenticationGate::new(
        store,
        auth,
        StaticCredential::new(STATIC_EMAIL, STATIC_PASSWORD),
    );
    let err = gate
        .attempt_login(STATIC_EMAIL, STATIC_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::ProbeFailed(StoreError::Firestore(_))));
}

#[tokio::test]
async fn test_firestore_store_put_and_touch() {
    let server = MockServer::start();
    let (store, _) = firebase(&server);

    let put = server.mock(|when, then| {
        when.method(PATCH)
            .path(format!("{}/admins/u9", DOCUMENTS))
            .json_body(json!({
                "fields": {
                    "ownerId": { "stringValue": "u9" },
                    "isAdmin": { "booleanValue": true },
                    "displayName": { "stringValue": "Mehmet" },
                    "createdAt": { "timestampValue": "2024-05-01T10:00:00Z" }
                }
            }));
        then.status(200).json_body(json!({
            "name": "projects/p/databases/(default)/documents/admins/u9"
        }));
    });
    let touch = server.mock(|when, then| {
        when.method(PATCH)
            .path(format!("{}/admins/u9", DOCUMENTS))
            .query_param("updateMask.fieldPaths", "updatedAt")
            .query_param("currentDocument.exists", "true")
            .json_body(json!({
                "fields": { "updatedAt": { "timestampValue": "2024-06-01T08:15:00Z" } }
            }));
        then.status(200).json_body(json!({
            "name": "projects/p/databases/(default)/documents/admins/u9"
        }));
    });

    let record = AdminRecord {
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        ..AdminRecord::new("u9", "Mehmet")
    };
    store.put(&record).await.unwrap();
    store
        .touch("u9", Utc.with_ymd_and_hms(2024, 6, 1, 8, 15, 0).unwrap())
        .await
        .unwrap();

    put.assert();
    touch.assert();
}

#[tokio::test]
async fn test_firestore_store_list_pages() {
    let server = MockServer::start();
    let (store, _) = firebase(&server);

    let second = server.mock(|when, then| {
        when.method(GET)
            .path(format!("{}/admins", DOCUMENTS))
            .query_param("pageToken", "page-2");
        then.status(200).json_body(json!({
            "documents": [admin_document("u2", false)]
        }));
    });
    let first = server.mock(|when, then| {
        when.method(GET)
            .path(format!("{}/admins", DOCUMENTS));
        then.status(200).json_body(json!({
            "documents": [admin_document("u1", true)],
            "nextPageToken": "page-2"
        }));
    });

    let admins = store.list().await.unwrap();

    assert_eq!(admins.len(), 2);
    assert_eq!(admins[0].owner_id, "u1");
    assert!(admins[0].is_admin);
    assert_eq!(admins[1].owner_id, "u2");
    assert!(!admins[1].is_admin);
    first.assert();
    second.assert();
}
