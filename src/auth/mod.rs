//! Firebase Authentication, end-user side.
//!
//! [`FirebaseAuth`] talks to the Identity Toolkit REST API with the project's web
//! API key, the same calls the JavaScript client SDK makes on the login form.
//! It owns the current identity session and publishes every sign-in and
//! sign-out on a `watch` channel.
//!
//! [`IdentityProvider`] is the seam the admin gate depends on, so the decision
//! logic can be exercised against other providers.

pub mod models;

use crate::auth::models::{
    DeleteAccountRequest, Identity, PasswordCredentialRequest, SignInResponse,
    UpdateAccountRequest, UpdateAccountResponse,
};
use crate::core::FirebaseErrorResponse;
use async_trait::async_trait;
use reqwest::{header, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::debug;


const IDENTITY_TOOLKIT_API: &str = "https://identitytoolkit.googleapis.com/v1";

// Error codes meaning "wrong email or password", all reported as
// `AuthError::InvalidCredentials`.
const CREDENTIAL_REJECTIONS: &[&str] = &[
    "EMAIL_NOT_FOUND",
    "INVALID_PASSWORD",
    "INVALID_LOGIN_CREDENTIALS",
    "INVALID_EMAIL",
    "USER_DISABLED",
];

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("No user is signed in")]
    NotSignedIn,
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Password-based identity provider operations used by the admin gate.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies the credentials and makes the returned identity the current user.
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Identity, AuthError>;

    /// Drops the current session. Signing out with no session is a no-op.
    async fn sign_out(&self);

    /// Re-verifies the current user's password before a sensitive operation.
    async fn reauthenticate(&self, password: &str) -> Result<(), AuthError>;

    /// Changes the current user's password.
    async fn update_password(&self, new_password: &str) -> Result<(), AuthError>;

    /// Registers a new account without touching the current session.
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, AuthError>;

    /// Deletes the account with these credentials. Used to roll back a
    /// `create_account` whose follow-up steps failed.
    async fn delete_account(&self, email: &str, password: &str) -> Result<(), AuthError>;

    fn current_user(&self) -> Option<Identity>;

    /// Auth-state notifications. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

struct SessionTokens {
    id_token: String,
    refresh_token: Option<String>,
}

#[derive(Clone)]
pub struct FirebaseAuth {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
    tokens: Arc<Mutex<Option<SessionTokens>>>,
    state: Arc<watch::Sender<Option<Identity>>>,
}

impl FirebaseAuth {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::new_with_url(IDENTITY_TOOLKIT_API.to_string(), api_key)
    }

    /// Creates a client against a custom endpoint, e.g. the Auth emulator
    /// (`http://localhost:9099/identitytoolkit.googleapis.com/v1`).
    pub fn new_with_url(base_url: String, api_key: impl Into<String>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self::new_with_client(client, base_url, api_key)
    }

    pub(crate) fn new_with_client(
        client: ClientWithMiddleware,
        base_url: String,
        api_key: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            client,
            base_url,
            api_key: api_key.into(),
            tokens: Arc::new(Mutex::new(None)),
            state: Arc::new(state),
        }
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        context: &str,
        rejections: &[&str],
    ) -> Result<R, AuthError> {
        let url = format!("{}/accounts:{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(match response.json::<FirebaseErrorResponse>().await {
                Ok(err) if rejections.contains(&err.error_code()) => AuthError::InvalidCredentials,
                Ok(err) => AuthError::ApiError(format!("{} failed: {}", context, err.display_message())),
                Err(_) => AuthError::ApiError(format!("{} failed: {}", context, status)),
            });
        }

        Ok(response.json().await?)
    }

    async fn verify_password(
        &self,
        email: &str,
        password: &str,
        context: &str,
    ) -> Result<SignInResponse, AuthError> {
        let request = PasswordCredentialRequest {
            email,
            password,
            return_secure_token: true,
        };
        self.post("signInWithPassword", &request, context, CREDENTIAL_REJECTIONS)
            .await
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let resp = self.verify_password(email, password, "Sign in").await?;

        let identity = Identity {
            uid: resp.local_id,
            email: resp.email.unwrap_or_else(|| email.to_string()),
            display_name: resp.display_name.filter(|name| !name.is_empty()),
        };

        *self.tokens.lock().await = Some(SessionTokens {
            id_token: resp.id_token,
            refresh_token: resp.refresh_token,
        });
        self.state.send_replace(Some(identity.clone()));

        debug!(uid = %identity.uid, "identity signed in");
        Ok(identity)
    }

    pub async fn sign_out(&self) {
        *self.tokens.lock().await = None;
        if self.state.send_if_modified(|current| current.take().is_some()) {
            debug!("identity signed out");
        }
    }

    pub async fn reauthenticate(&self, password: &str) -> Result<(), AuthError> {
        let user = self.current_user().ok_or(AuthError::NotSignedIn)?;

        let resp = self
            .verify_password(&user.email, password, "Reauthenticate")
            .await?;
        if resp.local_id != user.uid {
            return Err(AuthError::ApiError(
                "Reauthenticate failed: credential belongs to a different user".to_string(),
            ));
        }

        *self.tokens.lock().await = Some(SessionTokens {
            id_token: resp.id_token,
            refresh_token: resp.refresh_token,
        });
        Ok(())
    }

    pub async fn update_password(&self, new_password: &str) -> Result<(), AuthError> {
        let mut tokens = self.tokens.lock().await;
        let session = tokens.as_mut().ok_or(AuthError::NotSignedIn)?;

        let request = UpdateAccountRequest {
            id_token: &session.id_token,
            password: Some(new_password),
            display_name: None,
            return_secure_token: true,
        };
        let resp: UpdateAccountResponse =
            self.post("update", &request, "Update password", &[]).await?;

        // Changing the password revokes the old tokens; keep the fresh ones.
        if let Some(id_token) = resp.id_token {
            session.id_token = id_token;
        }
        if resp.refresh_token.is_some() {
            session.refresh_token = resp.refresh_token;
        }
        Ok(())
    }

    pub async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, AuthError> {
        let request = PasswordCredentialRequest {
            email,
            password,
            return_secure_token: true,
        };
        let created: SignInResponse = self.post("signUp", &request, "Create account", &[]).await?;

        if let Some(name) = display_name {
            let request = UpdateAccountRequest {
                id_token: &created.id_token,
                display_name: Some(name),
                ..Default::default()
            };
            let _: UpdateAccountResponse =
                self.post("update", &request, "Set display name", &[]).await?;
        }

        Ok(Identity {
            uid: created.local_id,
            email: created.email.unwrap_or_else(|| email.to_string()),
            display_name: display_name.map(str::to_string),
        })
    }

    pub async fn delete_account(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let account = self.verify_password(email, password, "Delete account").await?;

        let request = DeleteAccountRequest {
            id_token: &account.id_token,
        };
        let _: IgnoredAny = self
            .post("delete", &request, "Delete account", &[])
            .await?;

        if self
            .current_user()
            .is_some_and(|user| user.uid == account.local_id)
        {
            self.sign_out().await;
        }

        debug!(uid = %account.local_id, "account deleted");
        Ok(())
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }

    #[cfg(test)]
    pub(crate) async fn id_token(&self) -> Option<String> {
        self.tokens.lock().await.as_ref().map(|t| t.id_token.clone())
    }

    #[cfg(test)]
    pub(crate) async fn refresh_token(&self) -> Option<String> {
        self.tokens
            .lock()
            .await
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        FirebaseAuth::sign_in_with_password(self, email, password).await
    }

    async fn sign_out(&self) {
        FirebaseAuth::sign_out(self).await
    }

    async fn reauthenticate(&self, password: &str) -> Result<(), AuthError> {
        FirebaseAuth::reauthenticate(self, password).await
    }

    async fn update_password(&self, new_password: &str) -> Result<(), AuthError> {
        FirebaseAuth::update_password(self, new_password).await
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, AuthError> {
        FirebaseAuth::create_account(self, email, password, display_name).await
    }

    async fn delete_account(&self, email: &str, password: &str) -> Result<(), AuthError> {
        FirebaseAuth::delete_account(self, email, password).await
    }

    fn current_user(&self) -> Option<Identity> {
        FirebaseAuth::current_user(self)
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        FirebaseAuth::subscribe(self)
    }
}
