use super::store::AdminRecord;
use crate::auth::models::Identity;
use crate::config::StaticCredential;

/// Identifier of the static admin principal; it has no provider account.
pub const STATIC_ADMIN_ID: &str = "static-admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRole {
    StaticAdmin,
    DatabaseAdmin,
}

/// The authenticated actor for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: AdminRole,
}

impl Principal {
    pub(crate) fn static_admin(credential: &StaticCredential) -> Self {
        Self {
            id: STATIC_ADMIN_ID.to_string(),
            email: credential.email.clone(),
            display_name: credential.display_name.clone(),
            role: AdminRole::StaticAdmin,
        }
    }

    pub(crate) fn database_admin(identity: &Identity, record: &AdminRecord) -> Self {
        // The record's name wins; fall back to the provider profile, then the email.
        let display_name = Some(record.display_name.as_str())
            .filter(|name| !name.is_empty())
            .or(identity.display_name.as_deref())
            .unwrap_or(&identity.email)
            .to_string();

        Self {
            id: identity.uid.clone(),
            email: identity.email.clone(),
            display_name,
            role: AdminRole::DatabaseAdmin,
        }
    }

    pub fn is_static(&self) -> bool {
        self.role == AdminRole::StaticAdmin
    }
}
