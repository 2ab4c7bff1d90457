//! Single call path for all endpoint operations
//!
//! Every request runs as retry(breaker(ensure_valid + issue)). A 401 on the
//! issued call invalidates the session, re-authenticates once and replays the
//! request exactly once; a second rejection is a terminal authentication
//! error. The 401 path never feeds the breaker counter or the retry
//! predicate, so the two resilience layers only ever see transport health.

use serde_json::Value;
use std::sync::Arc;

use crate::breaker::CircuitBreaker;
use crate::error::{PanelError, Result};
use crate::logger::log;
use crate::models::ApiResponse;
use crate::retry::RetryPolicy;
use crate::session::SessionManager;
use crate::transport::ApiTransport;

pub struct RequestExecutor {
    transport: Arc<dyn ApiTransport>,
    session: SessionManager,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn ApiTransport>,
        session: SessionManager,
        breaker: CircuitBreaker,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            session,
            breaker,
            retry,
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.run(path, None, false).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<ApiResponse> {
        self.run(path, body, true).await
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn run(&self, path: &str, body: Option<Value>, is_post: bool) -> Result<ApiResponse> {
        self.retry
            .execute(|| {
                let body = body.clone();
                async move {
                    self.breaker
                        .call(|| self.attempt(path, body, is_post))
                        .await
                }
            })
            .await
    }

    async fn attempt(
        &self,
        path: &str,
        body: Option<Value>,
        is_post: bool,
    ) -> Result<ApiResponse> {
        let cookie = self.session.ensure_valid().await?;

        match self.issue(path, &cookie, body.clone(), is_post).await {
            Err(err) if err.is_unauthorized() => {
                log::warn!(path = path, "Call rejected as unauthorized, re-authenticating");
                self.session.invalidate().await;
                let cookie = self.session.ensure_valid().await?;

                // Single replay; a second rejection is terminal
                self.issue(path, &cookie, body, is_post)
                    .await
                    .map_err(|err| {
                        if err.is_unauthorized() {
                            PanelError::Authentication(format!(
                                "{} still unauthorized after re-login",
                                path
                            ))
                        } else {
                            err
                        }
                    })
            }
            other => other,
        }
    }

    async fn issue(
        &self,
        path: &str,
        cookie: &str,
        body: Option<Value>,
        is_post: bool,
    ) -> Result<ApiResponse> {
        if is_post {
            self.transport.post(path, cookie, body).await
        } else {
            self.transport.get(path, cookie).await
        }
    }
}

/// Map a `success: false` envelope onto an API error carrying the remote
/// message and the operation context.
pub fn expect_success(response: ApiResponse, context: &str) -> Result<ApiResponse> {
    if response.success {
        Ok(response)
    } else {
        let message = if response.msg.is_empty() {
            "panel reported failure".to_string()
        } else {
            response.msg
        };
        Err(PanelError::Api(format!("{}: {}", context, message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::MockTransport;
    use std::time::Duration;

    fn executor(mock: &Arc<MockTransport>, retries: u32) -> RequestExecutor {
        let transport = Arc::clone(mock) as Arc<dyn ApiTransport>;
        RequestExecutor::new(
            Arc::clone(&transport),
            SessionManager::new(Arc::clone(&transport), "admin".into(), "secret".into()),
            CircuitBreaker::new(),
            RetryPolicy::new(retries, Duration::from_millis(10)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_get_logs_in_first() {
        let mock = Arc::new(MockTransport::new());
        let exec = executor(&mock, 3);

        let response = exec.get("/panel/api/inbounds/list").await.unwrap();
        assert!(response.success);
        assert_eq!(mock.login_calls(), 1);
        assert_eq!(mock.request_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_triggers_single_relogin_and_replay() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(Err(PanelError::network_status(401, "unauthorized")));
        let exec = executor(&mock, 3);

        let response = exec.get("/panel/api/inbounds/list").await.unwrap();
        assert!(response.success);
        // Initial ensure_valid login plus one re-login after the 401
        assert_eq!(mock.login_calls(), 2);
        // Original call plus exactly one replay
        assert_eq!(mock.request_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_unauthorized_is_terminal_authentication() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(Err(PanelError::network_status(401, "unauthorized")));
        mock.push_response(Err(PanelError::network_status(401, "unauthorized")));
        let exec = executor(&mock, 3);

        let err = exec.get("/panel/api/inbounds/list").await.unwrap_err();
        assert!(matches!(err, PanelError::Authentication(_)));
        // No retry layer involvement: exactly two transport calls
        assert_eq!(mock.request_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_are_retried_to_exhaustion() {
        let mock = Arc::new(MockTransport::new());
        for _ in 0..3 {
            mock.push_response(Err(PanelError::network_status(503, "unavailable")));
        }
        let exec = executor(&mock, 2);

        let err = exec.get("/panel/api/inbounds/list").await.unwrap_err();
        assert!(matches!(err, PanelError::Network { status: Some(503), .. }));
        assert_eq!(mock.request_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_fails_fast_after_threshold() {
        let mock = Arc::new(MockTransport::new());
        for _ in 0..5 {
            mock.push_response(Err(PanelError::network_status(500, "down")));
        }

        let transport = Arc::clone(&mock) as Arc<dyn ApiTransport>;
        let exec = RequestExecutor::new(
            Arc::clone(&transport),
            SessionManager::new(Arc::clone(&transport), "admin".into(), "secret".into()),
            CircuitBreaker::with_settings(2, Duration::from_secs(60)),
            RetryPolicy::new(0, Duration::from_millis(10)),
        );

        let _ = exec.get("/a").await;
        let _ = exec.get("/b").await;
        assert_eq!(exec.breaker().status().state, "open");

        let err = exec.get("/c").await.unwrap_err();
        assert!(matches!(err, PanelError::CircuitOpen(_)));
        // Third call never reached the transport
        assert_eq!(mock.request_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_body_is_replayed_on_retry() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(Err(PanelError::network("connection reset")));
        let exec = executor(&mock, 2);

        let body = serde_json::json!({"id": 1});
        let response = exec.post("/panel/api/inbounds/addClient", Some(body)).await;
        assert!(response.is_ok());
        assert_eq!(mock.request_calls(), 2);
    }

    #[tokio::test]
    async fn test_expect_success_maps_envelope_failure() {
        let failure = ApiResponse {
            success: false,
            msg: "record not found".to_string(),
            obj: None,
        };
        let err = expect_success(failure, "delete client u-1").unwrap_err();
        let display = format!("{}", err);
        assert!(display.contains("delete client u-1"));
        assert!(display.contains("record not found"));

        let ok = ApiResponse::empty_ok();
        assert!(expect_success(ok, "noop").is_ok());
    }
}
