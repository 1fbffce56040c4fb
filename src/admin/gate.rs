use super::principal::{AdminRole, Principal};
use super::probe::AdminExistenceProbe;
use super::store::{AdminRecord, AdminStore};
use super::GateError;
use crate::auth::models::Identity;
use crate::auth::{AuthError, IdentityProvider};
use crate::config::StaticCredential;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Minimum length the identity provider accepts for a password.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Why a login attempt ended in [`GateState::Rejected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InvalidCredentials,
    NotAuthorized,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let error = match self {
            Rejection::InvalidCredentials => GateError::InvalidCredentials,
            Rejection::NotAuthorized => GateError::NotAuthorized,
        };
        write!(f, "{}", error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Unauthenticated,
    Authenticating,
    Authenticated(Principal),
    Rejected(Rejection),
}

/// What the rest of the application sees of the gate, published on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// The session has not been resolved yet (before `bootstrap`).
    Loading,
    SignedOut,
    SignedIn(Principal),
}

impl AuthState {
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::SignedIn(_))
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthState::SignedIn(principal) => Some(principal),
            _ => None,
        }
    }
}

/// Decides which authentication path applies and whether an authenticated
/// identity is actually an admin.
///
/// Exactly one path is open at a time: the static credential while no
/// database admin exists, the identity provider afterwards. The existence
/// probe is re-run at the start of every login attempt.
pub struct AuthenticationGate<S: ?Sized, P: ?Sized> {
    store: Arc<S>,
    provider: Arc<P>,
    probe: AdminExistenceProbe<S>,
    static_admin: StaticCredential,
    state: GateState,
    events: watch::Sender<AuthState>,
    provider_events: watch::Receiver<Option<Identity>>,
}

impl<S, P> AuthenticationGate<S, P>
where
    S: AdminStore + ?Sized,
    P: IdentityProvider + ?Sized,
{
    pub fn new(store: Arc<S>, provider: Arc<P>, static_admin: StaticCredential) -> Self {
        let (events, _) = watch::channel(AuthState::Loading);
        Self {
            probe: AdminExistenceProbe::new(store.clone()),
            provider_events: provider.subscribe(),
            store,
            provider,
            static_admin,
            state: GateState::Unauthenticated,
            events,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn principal(&self) -> Option<&Principal> {
        match &self.state {
            GateState::Authenticated(principal) => Some(principal),
            _ => None,
        }
    }

    /// Auth-state notifications for session guards. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.events.subscribe()
    }

    /// Fresh read of the admin-existence flag, e.g. to tell the login page
    /// whether the static credential is currently accepted.
    pub async fn has_any_database_admin(&self) -> Result<bool, GateError> {
        self.probe.has_any_database_admin().await
    }

    /// Resolves the initial session on application start and returns the
    /// current `hasDatabaseAdmins` flag.
    pub async fn bootstrap(&mut self) -> Result<bool, GateError> {
        self.check_auth_state().await?;
        self.probe.has_any_database_admin().await
    }

    pub async fn attempt_login(&mut self, email: &str, password: &str) -> Result<Principal, GateError> {
        if self.principal().is_some() {
            self.logout().await;
        }
        self.set_state(GateState::Authenticating);

        let has_database_admins = match self.probe.has_any_database_admin().await {
            Ok(flag) => flag,
            Err(e) => {
                self.set_state(GateState::Unauthenticated);
                return Err(e);
            }
        };

        let result = if has_database_admins {
            debug!("database admins exist, delegating to identity provider");
            self.login_database_admin(email, password).await
        } else {
            debug!("no database admins, checking static credential");
            self.login_static_admin(email, password)
        };

        match result {
            Ok(principal) => {
                info!(id = %principal.id, role = ?principal.role, "admin signed in");
                self.set_state(GateState::Authenticated(principal.clone()));
                Ok(principal)
            }
            Err(e) => {
                warn!(error = %e, "admin login failed");
                let next = match e.rejection() {
                    Some(rejection) => GateState::Rejected(rejection),
                    None => GateState::Unauthenticated,
                };
                self.set_state(next);
                Err(e)
            }
        }
    }

    fn login_static_admin(&self, email: &str, password: &str) -> Result<Principal, GateError> {
        if self.static_admin.matches(email, password) {
            Ok(Principal::static_admin(&self.static_admin))
        } else {
            Err(GateError::InvalidCredentials)
        }
    }

    async fn login_database_admin(&self, email: &str, password: &str) -> Result<Principal, GateError> {
        let identity = self.provider.sign_in_with_password(email, password).await?;

        match self.authorize(&identity).await {
            Ok(principal) => Ok(principal),
            Err(e) => {
                // The provider session must not outlive a failed authorization.
                self.provider.sign_out().await;
                Err(e)
            }
        }
    }

    async fn authorize(&self, identity: &Identity) -> Result<Principal, GateError> {
        match self.store.get(&identity.uid).await? {
            Some(record) if record.is_admin => Ok(Principal::database_admin(identity, &record)),
            _ => Err(GateError::NotAuthorized),
        }
    }

    /// Reconciles the gate with the identity provider's current user. Call it
    /// on start-up and whenever the provider reports an auth-state change.
    pub async fn check_auth_state(&mut self) -> Result<(), GateError> {
        let role = self.principal().map(|p| p.role);

        if role == Some(AdminRole::StaticAdmin) {
            // The static session only stays valid while its path is the open one.
            if self.probe.has_any_database_admin().await? {
                info!("database admin exists, ending static admin session");
                self.set_state(GateState::Unauthenticated);
            }
            return Ok(());
        }

        let Some(identity) = self.provider.current_user() else {
            if role.is_some() {
                info!("identity session lost");
            }
            let next = match self.state {
                GateState::Rejected(rejection) => GateState::Rejected(rejection),
                _ => GateState::Unauthenticated,
            };
            self.set_state(next);
            return Ok(());
        };

        match self.authorize(&identity).await {
            Ok(principal) => {
                self.set_state(GateState::Authenticated(principal));
                Ok(())
            }
            Err(e) => {
                warn!(uid = %identity.uid, error = %e, "signed-in identity is not an admin");
                self.provider.sign_out().await;
                let next = match e.rejection() {
                    Some(rejection) => GateState::Rejected(rejection),
                    None => GateState::Unauthenticated,
                };
                self.set_state(next);
                match e {
                    GateError::NotAuthorized => Ok(()),
                    other => Err(other),
                }
            }
        }
    }

    /// Waits for the identity provider to report a sign-in or sign-out, then
    /// runs [`check_auth_state`](Self::check_auth_state). Returns `None` once the
    /// provider stops publishing.
    ///
    /// Drive it from the application's event loop, typically in a
    /// `tokio::select!` next to incoming commands, so that a session lost at the
    /// provider also ends the admin session.
    pub async fn provider_changed(&mut self) -> Option<Result<(), GateError>> {
        self.provider_events.changed().await.ok()?;
        debug!("identity provider state changed");
        Some(self.check_auth_state().await)
    }

    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<(), GateError> {
        let principal = self.principal().ok_or(GateError::NotAuthenticated)?;
        if principal.is_static() {
            return Err(GateError::UnsupportedForStaticAdmin);
        }
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(GateError::WeakPassword);
        }

        self.provider
            .reauthenticate(current_password)
            .await
            .map_err(|e| match e {
                AuthError::InvalidCredentials => GateError::ReauthenticationFailed,
                other => GateError::Provider(other),
            })?;
        self.provider.update_password(new_password).await?;
        info!(id = %principal.id, "admin password changed");

        // The password is already changed; a failed bookkeeping write is not an error.
        if let Err(e) = self.store.touch(&principal.id, Utc::now()).await {
            warn!(id = %principal.id, error = %e, "failed to record password change");
        }
        Ok(())
    }

    pub async fn logout(&mut self) {
        if let Some(principal) = self.principal().cloned() {
            info!(id = %principal.id, "admin signed out");
        }
        // The static admin holds no provider session.
        if !self.principal().is_some_and(Principal::is_static) {
            self.provider.sign_out().await;
        }
        self.set_state(GateState::Unauthenticated);
    }

    /// Registers a database admin. Once it exists the static credential stops
    /// being accepted.
    ///
    /// If the admin record cannot be written, the new provider account is
    /// deleted again so the same email can be retried.
    pub async fn create_admin(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AdminRecord, GateError> {
        let principal = self.principal().ok_or(GateError::NotAuthenticated)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(GateError::WeakPassword);
        }

        let identity = self
            .provider
            .create_account(email, password, Some(display_name))
            .await
            .map_err(GateError::Provider)?;

        let record = AdminRecord::new(identity.uid, display_name);
        if let Err(e) = self.store.put(&record).await {
            warn!(owner = %record.owner_id, error = %e, "admin record write failed, removing account");
            if let Err(rollback) = self.provider.delete_account(email, password).await {
                warn!(owner = %record.owner_id, error = %rollback, "failed to remove account");
            }
            return Err(e.into());
        }

        info!(owner = %record.owner_id, created_by = %principal.id, "database admin created");
        Ok(record)
    }

    pub async fn list_admins(&self) -> Result<Vec<AdminRecord>, GateError> {
        self.principal().ok_or(GateError::NotAuthenticated)?;
        Ok(self.store.list().await?)
    }

    fn set_state(&mut self, state: GateState) {
        let published = match &state {
            GateState::Authenticating => None,
            GateState::Authenticated(principal) => Some(AuthState::SignedIn(principal.clone())),
            GateState::Unauthenticated | GateState::Rejected(_) => Some(AuthState::SignedOut),
        };

        if let Some(next) = published {
            self.events.send_if_modified(move |current| {
                if *current == next {
                    return false;
                }
                *current = next;
                true
            });
        }
        self.state = state;
    }
}
