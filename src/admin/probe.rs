use super::store::AdminStore;
use super::GateError;
use std::sync::Arc;
use tracing::warn;

/// Answers "does at least one database admin exist?".
///
/// Nothing is cached: every call is a fresh read, so an admin created between
/// two logins changes the outcome of the very next one.
pub struct AdminExistenceProbe<S: ?Sized> {
    store: Arc<S>,
}

impl<S: AdminStore + ?Sized> AdminExistenceProbe<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// A store failure is [`GateError::ProbeFailed`], never `false`.
    pub async fn has_any_database_admin(&self) -> Result<bool, GateError> {
        self.store.has_any_admin().await.map_err(|e| {
            warn!(error = %e, "admin existence probe failed");
            GateError::ProbeFailed(e)
        })
    }
}
