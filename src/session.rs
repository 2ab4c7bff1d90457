//! Session lifecycle for cookie-authenticated panel access
//!
//! Owns the authentication state exclusively. Privileged calls go through
//! `ensure_valid`, which re-logs-in when the session is missing, cleared or
//! older than the freshness window. The state mutex is held across the login
//! await, so concurrent callers of one client serialize their re-logins.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{PanelError, Result};
use crate::logger::log;
use crate::transport::ApiTransport;

/// Sessions older than this are re-established before the next call
pub const SESSION_MAX_AGE: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
struct Session {
    authenticated: bool,
    cookie: Option<String>,
    last_login: Option<Instant>,
}

/// Authentication state snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct AuthStatus {
    pub authenticated: bool,
    /// Age of the current session, when one is held
    pub session_age: Option<Duration>,
}

pub struct SessionManager {
    transport: Arc<dyn ApiTransport>,
    username: String,
    password: String,
    max_age: Duration,
    state: Mutex<Session>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn ApiTransport>, username: String, password: String) -> Self {
        Self::with_max_age(transport, username, password, SESSION_MAX_AGE)
    }

    pub fn with_max_age(
        transport: Arc<dyn ApiTransport>,
        username: String,
        password: String,
        max_age: Duration,
    ) -> Self {
        Self {
            transport,
            username,
            password,
            max_age,
            state: Mutex::new(Session::default()),
        }
    }

    /// Exchange configured credentials for a fresh session cookie
    pub async fn login(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.do_login(&mut state).await
    }

    async fn do_login(&self, state: &mut Session) -> Result<()> {
        match self.transport.login(&self.username, &self.password).await {
            Ok(cookie) => {
                if cookie.is_empty() {
                    state.authenticated = false;
                    state.cookie = None;
                    return Err(PanelError::Authentication(
                        "login returned an empty session cookie".to_string(),
                    ));
                }
                state.authenticated = true;
                state.cookie = Some(cookie);
                state.last_login = Some(Instant::now());
                log::session("login", true);
                Ok(())
            }
            Err(err) => {
                state.authenticated = false;
                state.cookie = None;
                log::session("login", false);
                Err(err)
            }
        }
    }

    /// Return a valid session cookie, logging in first when the session is
    /// unset, cleared or older than the freshness window.
    pub async fn ensure_valid(&self) -> Result<String> {
        let mut state = self.state.lock().await;

        let fresh = state.authenticated
            && state.cookie.is_some()
            && state
                .last_login
                .map(|at| at.elapsed() < self.max_age)
                .unwrap_or(false);

        if !fresh {
            log::debug!("Session missing or stale, logging in");
            self.do_login(&mut state).await?;
        }

        state
            .cookie
            .clone()
            .ok_or_else(|| PanelError::Authentication("no session cookie held".to_string()))
    }

    /// Clear state after a privileged call was rejected as unauthorized
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.authenticated = false;
        state.cookie = None;
        state.last_login = None;
        log::warn!(event = "invalidate", "Session rejected as unauthorized, cleared");
    }

    /// Clear state unconditionally; calling twice is a no-op the second time
    pub async fn logout(&self) {
        let mut state = self.state.lock().await;
        if state.authenticated || state.cookie.is_some() {
            log::session("logout", true);
        }
        state.authenticated = false;
        state.cookie = None;
        state.last_login = None;
    }

    pub async fn status(&self) -> AuthStatus {
        let state = self.state.lock().await;
        AuthStatus {
            authenticated: state.authenticated,
            session_age: state.last_login.map(|at| at.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::MockTransport;

    fn manager(mock: &Arc<MockTransport>) -> SessionManager {
        SessionManager::new(
            Arc::clone(mock) as Arc<dyn ApiTransport>,
            "admin".to_string(),
            "secret".to_string(),
        )
    }

    #[tokio::test]
    async fn test_login_populates_session() {
        let mock = Arc::new(MockTransport::new());
        mock.push_login(Ok("session=abc".to_string()));
        let session = manager(&mock);

        session.login().await.unwrap();

        let status = session.status().await;
        assert!(status.authenticated);
        assert!(status.session_age.is_some());
    }

    #[tokio::test]
    async fn test_login_failure_clears_state() {
        let mock = Arc::new(MockTransport::new());
        mock.push_login(Err(PanelError::Authentication("bad creds".to_string())));
        let session = manager(&mock);

        assert!(session.login().await.is_err());
        assert!(!session.status().await.authenticated);
    }

    #[tokio::test]
    async fn test_empty_cookie_is_authentication_error() {
        let mock = Arc::new(MockTransport::new());
        mock.push_login(Ok(String::new()));
        let session = manager(&mock);

        let err = session.login().await.unwrap_err();
        assert!(matches!(err, PanelError::Authentication(_)));
        assert!(!session.status().await.authenticated);
    }

    #[tokio::test]
    async fn test_ensure_valid_logs_in_once_when_fresh() {
        let mock = Arc::new(MockTransport::new());
        let session = manager(&mock);

        let cookie = session.ensure_valid().await.unwrap();
        assert_eq!(cookie, "session=mock");
        assert_eq!(mock.login_calls(), 1);

        // Fresh session: no second login
        session.ensure_valid().await.unwrap();
        assert_eq!(mock.login_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_session_triggers_exactly_one_relogin() {
        let mock = Arc::new(MockTransport::new());
        let session = manager(&mock);

        session.ensure_valid().await.unwrap();
        assert_eq!(mock.login_calls(), 1);

        tokio::time::advance(SESSION_MAX_AGE + Duration::from_secs(1)).await;

        session.ensure_valid().await.unwrap();
        assert_eq!(mock.login_calls(), 2);

        // Freshly renewed: no further login
        session.ensure_valid().await.unwrap();
        assert_eq!(mock.login_calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_relogin() {
        let mock = Arc::new(MockTransport::new());
        let session = manager(&mock);

        session.ensure_valid().await.unwrap();
        session.invalidate().await;
        assert!(!session.status().await.authenticated);

        session.ensure_valid().await.unwrap();
        assert_eq!(mock.login_calls(), 2);
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let mock = Arc::new(MockTransport::new());
        let session = manager(&mock);

        session.ensure_valid().await.unwrap();
        session.logout().await;
        session.logout().await;

        let status = session.status().await;
        assert!(!status.authenticated);
        assert!(status.session_age.is_none());
    }
}
