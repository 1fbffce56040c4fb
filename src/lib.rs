pub mod admin;
pub mod auth;
pub mod config;
pub mod core;
pub mod firestore;

use admin::{AuthenticationGate, FirestoreAdminStore, SessionGuard};
use auth::FirebaseAuth;
use config::AdminConfig;
use core::middleware::AuthMiddleware;
use firestore::FirebaseFirestore;
use std::sync::Arc;
use yup_oauth2::ServiceAccountKey;

/// Gate over the production collaborators.
pub type FirebaseGate = AuthenticationGate<FirestoreAdminStore, FirebaseAuth>;

/// Entry point wiring the Firebase clients into the admin gate.
pub struct SekaApp {
    key: ServiceAccountKey,
    config: AdminConfig,
}

impl SekaApp {
    pub fn new(service_account_key: ServiceAccountKey, config: AdminConfig) -> Self {
        Self {
            key: service_account_key,
            config,
        }
    }

    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    pub fn firestore(&self) -> FirebaseFirestore {
        FirebaseFirestore::new(AuthMiddleware::new(self.key.clone()), &self.config.project_id)
    }

    pub fn auth(&self) -> FirebaseAuth {
        FirebaseAuth::new(self.config.api_key.clone())
    }

    pub fn admin_store(&self) -> FirestoreAdminStore {
        FirestoreAdminStore::new(self.firestore())
    }

    /// A fresh gate in the `Loading` state. Call `bootstrap` before routing.
    pub fn gate(&self) -> FirebaseGate {
        AuthenticationGate::new(
            Arc::new(self.admin_store()),
            Arc::new(self.auth()),
            self.config.static_admin.clone(),
        )
    }

    pub fn session_guard(&self, gate: &FirebaseGate) -> SessionGuard {
        SessionGuard::new(gate.subscribe(), self.config.routes.clone())
    }
}
