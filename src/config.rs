//! Runtime configuration.
//!
//! Loaded once at startup, from environment variables or a JSON file, and
//! handed to [`crate::SekaApp`].

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level configuration of the admin panel backend.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Firebase project ID
    pub project_id: String,

    /// Web API key used for end-user sign-in
    pub api_key: String,

    /// Fallback credential, honoured only while no database admin exists
    pub static_admin: StaticCredential,

    #[serde(default)]
    pub routes: RouteConfig,
}

impl AdminConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let static_admin = StaticCredential {
            email: required("SEKA_STATIC_ADMIN_EMAIL")?,
            password: required("SEKA_STATIC_ADMIN_PASSWORD")?,
            display_name: std::env::var("SEKA_STATIC_ADMIN_NAME")
                .unwrap_or_else(|_| default_display_name()),
        };

        let defaults = RouteConfig::default();
        let routes = RouteConfig {
            login_route: std::env::var("SEKA_ADMIN_LOGIN_ROUTE").unwrap_or(defaults.login_route),
            home_route: std::env::var("SEKA_ADMIN_HOME_ROUTE").unwrap_or(defaults.home_route),
        };

        Ok(Self {
            project_id: required("SEKA_FIREBASE_PROJECT_ID")?,
            api_key: required("SEKA_FIREBASE_API_KEY")?,
            static_admin,
            routes,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

/// The static admin's email/password pair.
#[derive(Clone, Deserialize)]
pub struct StaticCredential {
    pub email: String,
    pub password: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

impl StaticCredential {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            display_name: default_display_name(),
        }
    }

    /// Exact comparison, no normalisation of either field.
    pub fn matches(&self, email: &str, password: &str) -> bool {
        self.email == email && self.password == password
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

fn default_display_name() -> String {
    "Admin".to_string()
}

/// Admin panel routes used by the session guard.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    #[serde(default = "default_login_route")]
    pub login_route: String,
    #[serde(default = "default_home_route")]
    pub home_route: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            login_route: default_login_route(),
            home_route: default_home_route(),
        }
    }
}

impl RouteConfig {
    /// Whether `path` is the login page, ignoring a trailing slash and query string.
    pub fn is_login_route(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        normalize(path) == normalize(&self.login_route)
    }
}

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn default_login_route() -> String {
    "/admin/login".to_string()
}

fn default_home_route() -> String {
    "/admin".to_string()
}
