//! Panel client facade
//!
//! Wires the transport, session manager, circuit breaker and retry policy
//! into one [`RequestExecutor`] and exposes the endpoint operations on top of
//! it. The subscription orchestration lives in `subscription.rs`; this module
//! carries the plain single-endpoint wrappers.

use serde_json::Value;
use std::sync::Arc;

use crate::breaker::{BreakerStatus, CircuitBreaker};
use crate::config::PanelConfig;
use crate::error::{PanelError, Result};
use crate::executor::{expect_success, RequestExecutor};
use crate::logger::log;
use crate::models::{Client, ClientTraffic, Inbound};
use crate::retry::RetryPolicy;
use crate::session::{AuthStatus, SessionManager};
use crate::transport::{ApiTransport, HttpTransport};

const PATH_LIST: &str = "/panel/api/inbounds/list";
const PATH_ADD: &str = "/panel/api/inbounds/add";
const PATH_ADD_CLIENT: &str = "/panel/api/inbounds/addClient";

fn path_get(id: i64) -> String {
    format!("/panel/api/inbounds/get/{}", id)
}

fn path_update(id: i64) -> String {
    format!("/panel/api/inbounds/update/{}", id)
}

fn path_del(id: i64) -> String {
    format!("/panel/api/inbounds/del/{}", id)
}

fn path_del_client(inbound_id: i64, client_key: &str) -> String {
    format!("/panel/api/inbounds/{}/delClient/{}", inbound_id, client_key)
}

fn path_update_client(client_key: &str) -> String {
    format!("/panel/api/inbounds/updateClient/{}", client_key)
}

fn path_client_traffics(email: &str) -> String {
    format!("/panel/api/inbounds/getClientTraffics/{}", email)
}

fn path_reset_client_traffic(inbound_id: i64, email: &str) -> String {
    format!("/panel/api/inbounds/{}/resetClientTraffic/{}", inbound_id, email)
}

/// Client for one remote panel instance.
///
/// Session and circuit breaker state are owned by this instance; multiple
/// clients in one process stay fully independent.
pub struct PanelClient {
    config: PanelConfig,
    executor: RequestExecutor,
}

impl PanelClient {
    /// Build a client with the HTTP transport
    pub fn new(config: PanelConfig) -> Result<Self> {
        config.validate()?;
        let transport: Arc<dyn ApiTransport> = Arc::new(HttpTransport::new(
            config.trimmed_base_url(),
            config.timeout,
        )?);
        Ok(Self::wire(config, transport))
    }

    /// Build a client over a caller-supplied transport
    pub fn with_transport(config: PanelConfig, transport: Arc<dyn ApiTransport>) -> Result<Self> {
        config.validate()?;
        Ok(Self::wire(config, transport))
    }

    fn wire(config: PanelConfig, transport: Arc<dyn ApiTransport>) -> Self {
        let session = SessionManager::new(
            Arc::clone(&transport),
            config.username.clone(),
            config.password.clone(),
        );
        let breaker = CircuitBreaker::new();
        let retry = RetryPolicy::new(config.retry_attempts, config.retry_delay);
        Self {
            config,
            executor: RequestExecutor::new(transport, session, breaker, retry),
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Log in eagerly. Calls that need a session log in on demand, so this is
    /// only required to verify credentials up front.
    pub async fn login(&self) -> Result<()> {
        self.executor.session().login().await
    }

    /// Drop the session; idempotent
    pub async fn logout(&self) {
        self.executor.session().logout().await
    }

    /// Whether the panel is reachable with the configured credentials
    pub async fn check_connection(&self) -> bool {
        match self.list_inbounds().await {
            Ok(_) => true,
            Err(e) => {
                log::warn!(error = %e, "Connection check failed");
                false
            }
        }
    }

    pub async fn auth_status(&self) -> AuthStatus {
        self.executor.session().status().await
    }

    pub fn circuit_breaker_status(&self) -> BreakerStatus {
        self.executor.breaker().status()
    }

    /// Fetch all inbounds. Entries that fail to decode are skipped with a
    /// warning rather than failing the whole listing.
    pub async fn list_inbounds(&self) -> Result<Vec<Inbound>> {
        let response = expect_success(self.executor.get(PATH_LIST).await?, "list inbounds")?;

        let Some(Value::Array(entries)) = response.obj else {
            return Ok(Vec::new());
        };

        let mut inbounds = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<Inbound>(entry) {
                Ok(inbound) => inbounds.push(inbound),
                Err(e) => log::warn!(error = %e, "Skipping undecodable inbound entry"),
            }
        }
        Ok(inbounds)
    }

    pub async fn get_inbound(&self, id: i64) -> Result<Inbound> {
        let response = expect_success(
            self.executor.get(&path_get(id)).await?,
            &format!("get inbound {}", id),
        )?;

        let obj = response
            .obj
            .ok_or_else(|| PanelError::Api(format!("get inbound {}: empty response", id)))?;
        serde_json::from_value(obj)
            .map_err(|e| PanelError::Api(format!("get inbound {}: undecodable response: {}", id, e)))
    }

    pub async fn add_inbound(&self, inbound_json: Value) -> Result<()> {
        expect_success(
            self.executor.post(PATH_ADD, Some(inbound_json)).await?,
            "add inbound",
        )?;
        Ok(())
    }

    pub async fn update_inbound(&self, id: i64, inbound_json: Value) -> Result<()> {
        expect_success(
            self.executor.post(&path_update(id), Some(inbound_json)).await?,
            &format!("update inbound {}", id),
        )?;
        Ok(())
    }

    pub async fn delete_inbound(&self, id: i64) -> Result<()> {
        expect_success(
            self.executor.post(&path_del(id), None).await?,
            &format!("delete inbound {}", id),
        )?;
        Ok(())
    }

    /// Attach one client to an inbound
    pub async fn add_client(&self, inbound_id: i64, client: &Client) -> Result<()> {
        let body = client_payload(inbound_id, client)?;
        expect_success(
            self.executor.post(PATH_ADD_CLIENT, Some(body)).await?,
            &format!("add client {} to inbound {}", client.email, inbound_id),
        )?;
        Ok(())
    }

    pub async fn update_client(
        &self,
        inbound_id: i64,
        client_key: &str,
        client: &Client,
    ) -> Result<()> {
        let body = client_payload(inbound_id, client)?;
        expect_success(
            self.executor
                .post(&path_update_client(client_key), Some(body))
                .await?,
            &format!("update client {} on inbound {}", client_key, inbound_id),
        )?;
        Ok(())
    }

    pub async fn delete_client(&self, inbound_id: i64, client_key: &str) -> Result<()> {
        expect_success(
            self.executor
                .post(&path_del_client(inbound_id, client_key), None)
                .await?,
            &format!("delete client {} from inbound {}", client_key, inbound_id),
        )?;
        Ok(())
    }

    /// Traffic counters for a client, `None` when the panel has no record
    pub async fn get_client_traffic(&self, email: &str) -> Result<Option<ClientTraffic>> {
        let response = expect_success(
            self.executor.get(&path_client_traffics(email)).await?,
            &format!("get traffic for {}", email),
        )?;

        match response.obj {
            None | Some(Value::Null) => Ok(None),
            Some(obj) => match serde_json::from_value(obj) {
                Ok(traffic) => Ok(Some(traffic)),
                Err(e) => {
                    log::warn!(email = email, error = %e, "Undecodable traffic record");
                    Ok(None)
                }
            },
        }
    }

    pub async fn reset_client_traffic(&self, inbound_id: i64, email: &str) -> Result<()> {
        expect_success(
            self.executor
                .post(&path_reset_client_traffic(inbound_id, email), None)
                .await?,
            &format!("reset traffic for {} on inbound {}", email, inbound_id),
        )?;
        Ok(())
    }
}

/// The panel expects the client wrapped in a settings blob serialized as text
fn client_payload(inbound_id: i64, client: &Client) -> Result<Value> {
    let settings = serde_json::json!({ "clients": [client.to_value()] });
    let settings_text = serde_json::to_string(&settings)
        .map_err(|e| PanelError::Api(format!("failed to serialize client settings: {}", e)))?;
    Ok(serde_json::json!({
        "id": inbound_id,
        "settings": settings_text,
    }))
}
