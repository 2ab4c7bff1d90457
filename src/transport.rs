//! HTTP transport for the panel API
//!
//! The rest of the crate talks to the panel through the [`ApiTransport`]
//! trait so the resilience layers can be exercised against a mock. The real
//! implementation wraps a reqwest client with a per-call timeout and maps
//! HTTP outcomes onto the error taxonomy: 401/403 are network-class with a
//! status (handled by the session layer), other 4xx are API errors, 5xx and
//! transport failures are retryable network errors.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::error::{PanelError, Result};
use crate::logger::log;
use crate::models::ApiResponse;

/// Generic request-executing collaborator for the panel API
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Exchange credentials for a session cookie
    async fn login(&self, username: &str, password: &str) -> Result<String>;

    /// Issue a GET with the given session cookie
    async fn get(&self, path: &str, cookie: &str) -> Result<ApiResponse>;

    /// Issue a POST with the given session cookie and optional JSON body
    async fn post(&self, path: &str, cookie: &str, body: Option<Value>) -> Result<ApiResponse>;
}

/// reqwest-backed transport with cookie-based session auth
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PanelError::network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(path: &str, err: reqwest::Error) -> PanelError {
        if err.is_timeout() {
            PanelError::network(format!("{} timed out", path))
        } else {
            PanelError::network(format!("{} transport error: {}", path, err))
        }
    }

    /// First name=value pair of the session cookie set by the panel
    fn extract_session_cookie(response: &reqwest::Response) -> Option<String> {
        response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .filter_map(|h| h.split(';').next())
            .map(str::trim)
            .find(|pair| pair.contains('=') && !pair.is_empty())
            .map(str::to_string)
    }

    async fn decode(path: &str, response: reqwest::Response) -> Result<ApiResponse> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PanelError::network_status(
                status.as_u16(),
                format!("{} rejected as unauthorized", path),
            ));
        }
        if status.is_server_error() {
            return Err(PanelError::network_status(
                status.as_u16(),
                format!("{} failed with server error", path),
            ));
        }
        if status.is_client_error() {
            return Err(PanelError::Api(format!(
                "{} failed with status {}",
                path,
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PanelError::network(format!("{} body read error: {}", path, e)))?;

        // A malformed 2xx body must not mask the real outcome with a parse
        // error; treat it as an empty successful envelope.
        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(decoded) => Ok(decoded),
            Err(e) => {
                log::warn!(path = path, error = %e, "Malformed response body, treating as empty");
                Ok(ApiResponse::empty_ok())
            }
        }
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn login(&self, username: &str, password: &str) -> Result<String> {
        let path = "/login";
        let response = self
            .http
            .post(self.url(path))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| Self::map_send_error(path, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PanelError::Authentication(format!(
                "login failed with status {}",
                status.as_u16()
            )));
        }

        let cookie = Self::extract_session_cookie(&response);

        let body = response
            .text()
            .await
            .map_err(|e| PanelError::network(format!("{} body read error: {}", path, e)))?;
        let envelope: ApiResponse =
            serde_json::from_str(&body).unwrap_or_else(|_| ApiResponse::empty_ok());
        if !envelope.success {
            return Err(PanelError::Authentication(format!(
                "login rejected: {}",
                envelope.msg
            )));
        }

        cookie.ok_or_else(|| {
            PanelError::Authentication("login response carried no session cookie".to_string())
        })
    }

    async fn get(&self, path: &str, cookie: &str) -> Result<ApiResponse> {
        let response = self
            .http
            .get(self.url(path))
            .header(reqwest::header::COOKIE, cookie)
            .send()
            .await
            .map_err(|e| Self::map_send_error(path, e))?;

        Self::decode(path, response).await
    }

    async fn post(&self, path: &str, cookie: &str, body: Option<Value>) -> Result<ApiResponse> {
        let mut request = self
            .http
            .post(self.url(path))
            .header(reqwest::header::COOKIE, cookie);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_send_error(path, e))?;

        Self::decode(path, response).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let transport = HttpTransport::new("http://panel:2053/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            transport.url("/panel/api/inbounds/list"),
            "http://panel:2053/panel/api/inbounds/list"
        );
    }

    #[tokio::test]
    async fn test_mock_transport_scripting() {
        use testing::MockTransport;

        let mock = MockTransport::new();
        mock.push_response(Err(PanelError::network_status(500, "boom")));

        let first = mock.get("/a", "c").await;
        assert!(first.is_err());

        let second = mock.get("/b", "c").await.unwrap();
        assert!(second.success);

        assert_eq!(mock.request_calls(), 2);
        assert_eq!(mock.requests(), vec!["GET /a", "GET /b"]);
    }
}
