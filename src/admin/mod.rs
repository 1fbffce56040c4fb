//! Admin panel authentication and authorization.
//!
//! - [`AdminExistenceProbe`] answers whether any database admin exists.
//! - [`AuthenticationGate`] picks the static-admin or identity-provider path
//!   for a login and checks the resulting identity against its [`AdminRecord`].
//! - [`SessionGuard`] turns the published [`AuthState`] into routing decisions.

pub mod gate;
pub mod guard;
pub mod principal;
pub mod probe;
pub mod store;

#[cfg(test)]
mod tests;

pub use gate::{AuthState, AuthenticationGate, GateState, Rejection};
pub use guard::{decide, Decision, SessionGuard};
pub use principal::{AdminRole, Principal};
pub use probe::AdminExistenceProbe;
pub use store::{AdminRecord, AdminStore, FirestoreAdminStore, StoreError};

use crate::auth::AuthError;
use thiserror::Error;

/// Errors surfaced by the admin gate. Each one is recoverable: the caller shows
/// the message and lets the user retry.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Could not determine whether admin accounts exist: {0}")]
    ProbeFailed(#[source] StoreError),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("This account is not authorized to access the admin panel")]
    NotAuthorized,
    #[error("Password changes are not available for the static admin")]
    UnsupportedForStaticAdmin,
    #[error("Current password is incorrect")]
    ReauthenticationFailed,
    #[error("Password must be at least 6 characters")]
    WeakPassword,
    #[error("No admin is signed in")]
    NotAuthenticated,
    #[error("Identity provider error: {0}")]
    Provider(#[source] AuthError),
    #[error("Admin store error: {0}")]
    Store(#[from] StoreError),
}

impl GateError {
    /// The rejection reason, for errors that end a login in `GateState::Rejected`.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            GateError::InvalidCredentials => Some(Rejection::InvalidCredentials),
            GateError::NotAuthorized => Some(Rejection::NotAuthorized),
            _ => None,
        }
    }
}

impl From<AuthError> for GateError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => GateError::InvalidCredentials,
            other => GateError::Provider(other),
        }
    }
}
