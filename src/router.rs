//! Route table and navigation guard.
//!
//! Three routes exist: the root (a pure forwarder to login), the login view,
//! and the home view. Every navigation passes through a stateless guard that
//! consults the shared session store: unauthenticated sessions may only
//! reach the login view, everything else redirects there. Authenticated
//! sessions go anywhere, including back to login.

use tracing::debug;

use crate::auth::SessionStore;

/// The navigable views of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Entry point; always forwards to the login view.
    Root,
    Login,
    Home,
}

impl Route {
    /// Display title shown in the title bar.
    pub fn title(&self) -> &'static str {
        match self {
            Route::Root => "Welcome",
            Route::Login => "Login",
            Route::Home => "Home",
        }
    }
}

/// Decide where a transition may land.
///
/// Re-evaluated on every navigation; holds no state of its own.
pub fn guard(destination: Route, authenticated: bool) -> Route {
    if authenticated || destination == Route::Login {
        destination
    } else {
        Route::Login
    }
}

/// Navigator over the route table.
///
/// Remembers only where the last navigation landed; the access decision is
/// delegated to `guard` against the live session state.
pub struct Router {
    session: SessionStore,
    current: Route,
}

impl Router {
    pub fn new(session: SessionStore) -> Self {
        Self {
            session,
            current: Route::Root,
        }
    }

    pub fn current(&self) -> Route {
        self.current
    }

    /// Navigate toward `destination`, applying the root redirect and the
    /// authentication guard. Returns the route actually entered.
    pub async fn navigate(&mut self, destination: Route) -> Route {
        let destination = if destination == Route::Root {
            Route::Login
        } else {
            destination
        };

        let resolved = guard(destination, self.session.is_authenticated().await);
        if resolved != destination {
            debug!(requested = ?destination, "Redirecting unauthenticated navigation to login");
        }

        self.current = resolved;
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_allows_authenticated_everywhere() {
        assert_eq!(guard(Route::Home, true), Route::Home);
        // No redirect away from login for logged-in sessions
        assert_eq!(guard(Route::Login, true), Route::Login);
    }

    #[test]
    fn test_guard_redirects_unauthenticated_to_login() {
        assert_eq!(guard(Route::Home, false), Route::Login);
        assert_eq!(guard(Route::Login, false), Route::Login);
    }

    #[tokio::test]
    async fn test_root_forwards_to_login() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::new(dir.path().to_path_buf());
        let mut router = Router::new(session);

        assert_eq!(router.navigate(Route::Root).await, Route::Login);
        assert_eq!(router.current(), Route::Login);
    }

    #[tokio::test]
    async fn test_navigation_follows_session_state() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::new(dir.path().to_path_buf());
        let mut router = Router::new(session.clone());

        // Logged out: home resolves to login
        assert_eq!(router.navigate(Route::Home).await, Route::Login);

        // Logged in: home is reachable, and login stays reachable too
        session.set_tokens("A1".to_string(), None).await;
        assert_eq!(router.navigate(Route::Home).await, Route::Home);
        assert_eq!(router.navigate(Route::Login).await, Route::Login);

        // The guard re-evaluates on every navigation
        session.clear().await;
        assert_eq!(router.navigate(Route::Home).await, Route::Login);
    }
}
