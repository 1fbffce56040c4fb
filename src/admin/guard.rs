use super::gate::AuthState;
use crate::config::RouteConfig;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Render the requested page, or a loading placeholder while the session resolves.
    Render { loading: bool },
    RedirectToLogin,
    RedirectToApp,
}

/// Route gating for the admin panel. Pure; loading always wins.
pub fn decide(is_authenticated: bool, is_loading: bool, is_login_route: bool) -> Decision {
    if is_loading {
        Decision::Render { loading: true }
    } else if !is_authenticated && !is_login_route {
        Decision::RedirectToLogin
    } else if is_authenticated && is_login_route {
        Decision::RedirectToApp
    } else {
        Decision::Render { loading: false }
    }
}

/// Applies [`decide`] to the latest published [`AuthState`].
///
/// Re-evaluate after every [`SessionGuard::changed`] and on every route change.
/// Dropping the guard unsubscribes from the gate.
pub struct SessionGuard {
    auth: watch::Receiver<AuthState>,
    routes: RouteConfig,
}

impl SessionGuard {
    pub fn new(auth: watch::Receiver<AuthState>, routes: RouteConfig) -> Self {
        Self { auth, routes }
    }

    pub fn evaluate(&self, route: &str) -> Decision {
        let state = self.auth.borrow();
        decide(
            state.is_authenticated(),
            state.is_loading(),
            self.routes.is_login_route(route),
        )
    }

    /// Where a redirect decision points to.
    pub fn redirect_target(&self, decision: Decision) -> Option<&str> {
        match decision {
            Decision::RedirectToLogin => Some(&self.routes.login_route),
            Decision::RedirectToApp => Some(&self.routes.home_route),
            Decision::Render { .. } => None,
        }
    }

    pub fn current(&self) -> AuthState {
        self.auth.borrow().clone()
    }

    /// Waits for the next auth-state change. `None` once the gate is gone.
    pub async fn changed(&mut self) -> Option<AuthState> {
        self.auth.changed().await.ok()?;
        Some(self.auth.borrow_and_update().clone())
    }
}
