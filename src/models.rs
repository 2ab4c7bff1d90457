//! Panel data model
//!
//! Wire types for the remote panel: the response envelope, inbound listeners
//! and the protocol-specific client records embedded in an inbound's settings
//! blob. Decoding is deliberately defensive: the panel stores settings as
//! JSON-in-a-string and omits fields freely, so missing values become
//! zero/empty defaults and malformed stream settings degrade to defaults with
//! a logged warning instead of failing the whole scan.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PanelError, Result};
use crate::logger::log;

/// Decoded response envelope returned by every panel endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub obj: Option<Value>,
}

impl ApiResponse {
    /// Empty successful envelope, used when a 2xx body fails to decode
    pub fn empty_ok() -> Self {
        Self {
            success: true,
            msg: String::new(),
            obj: None,
        }
    }
}

/// Inbound protocol tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    /// Any protocol tag this client does not manage
    #[serde(other)]
    #[default]
    Unknown,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream transport settings relevant to client synthesis
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamSettings {
    pub network: String,
    pub security: String,
}

impl StreamSettings {
    /// Decode stream settings from either a pre-parsed object or embedded
    /// JSON text. Malformed input degrades to defaults with a warning.
    pub fn from_value(value: &Value) -> Self {
        let parsed = match value {
            Value::String(raw) if !raw.trim().is_empty() => {
                serde_json::from_str::<StreamSettings>(raw).ok()
            }
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => Some(StreamSettings::default()),
        };

        parsed.unwrap_or_else(|| {
            log::warn!("Malformed stream settings, using defaults");
            StreamSettings::default()
        })
    }
}

/// A remote inbound listener
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    /// Settings blob: a JSON object or JSON text holding the client list
    #[serde(default)]
    pub settings: Value,
    #[serde(default)]
    pub stream_settings: Value,
}

impl Inbound {
    /// Parse the settings blob into its client list.
    ///
    /// Tolerates a pre-parsed object or embedded JSON text; a missing or
    /// empty `clients` array is an empty list. Unparsable embedded text is an
    /// error so the caller can decide to skip this inbound.
    pub fn clients(&self) -> Result<Vec<Client>> {
        let settings = match &self.settings {
            Value::String(raw) => {
                if raw.trim().is_empty() {
                    return Ok(Vec::new());
                }
                serde_json::from_str::<Value>(raw).map_err(|e| {
                    PanelError::Api(format!(
                        "inbound {} has malformed settings: {}",
                        self.id, e
                    ))
                })?
            }
            Value::Null => return Ok(Vec::new()),
            other => other.clone(),
        };

        let Some(entries) = settings.get("clients").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        Ok(entries
            .iter()
            .map(|entry| Client::from_value(self.protocol, entry))
            .collect())
    }

    /// Decoded stream transport settings
    pub fn stream(&self) -> StreamSettings {
        StreamSettings::from_value(&self.stream_settings)
    }
}

/// Protocol-specific client fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolFields {
    Vmess { alter_id: u32, security: String },
    Vless { flow: String },
    Trojan { password: String },
    Shadowsocks { method: String, password: String },
}

/// An end-user client attached to one inbound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Identifier: UUID for vmess/vless, email-derived for shadowsocks
    pub id: String,
    /// Display/lookup key, unique within the remote system
    pub email: String,
    pub enable: bool,
    /// Concurrent IP limit, 0 = unlimited
    pub limit_ip: u32,
    /// Traffic quota in bytes, 0 = unlimited
    pub total_bytes: i64,
    /// Expiry timestamp in epoch milliseconds, 0 = never
    pub expiry_time: i64,
    /// Subscription group identifier; absent means ungrouped
    pub sub_id: Option<String>,
    /// Traffic reset marker (day of month, 0 = never)
    pub reset: i64,
    pub protocol: ProtocolFields,
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn u64_field(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or_default()
}

fn i64_field(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or_default()
}

impl Client {
    /// Decode a client record with zero/empty defaults for missing fields.
    ///
    /// The field set is directed by the owning inbound's protocol tag; an
    /// unknown tag is read as a vless-shaped record so existing clients can
    /// still be listed and grouped (creating one is rejected by the factory).
    pub fn from_value(protocol: Protocol, value: &Value) -> Self {
        let protocol_fields = match protocol {
            Protocol::Vmess => ProtocolFields::Vmess {
                alter_id: u64_field(value, "alterId") as u32,
                security: {
                    let s = str_field(value, "security");
                    if s.is_empty() { "auto".to_string() } else { s }
                },
            },
            Protocol::Trojan => ProtocolFields::Trojan {
                password: str_field(value, "password"),
            },
            Protocol::Shadowsocks => ProtocolFields::Shadowsocks {
                method: str_field(value, "method"),
                password: str_field(value, "password"),
            },
            Protocol::Vless | Protocol::Unknown => ProtocolFields::Vless {
                flow: str_field(value, "flow"),
            },
        };

        let sub_id = match str_field(value, "subId") {
            s if s.is_empty() => None,
            s => Some(s),
        };

        Self {
            id: str_field(value, "id"),
            email: str_field(value, "email"),
            enable: value.get("enable").and_then(Value::as_bool).unwrap_or(true),
            limit_ip: u64_field(value, "limitIp") as u32,
            total_bytes: i64_field(value, "totalGB"),
            expiry_time: i64_field(value, "expiryTime"),
            sub_id,
            reset: i64_field(value, "reset"),
            protocol: protocol_fields,
        }
    }

    /// Protocol tag implied by the field set
    pub fn protocol_tag(&self) -> Protocol {
        match &self.protocol {
            ProtocolFields::Vmess { .. } => Protocol::Vmess,
            ProtocolFields::Vless { .. } => Protocol::Vless,
            ProtocolFields::Trojan { .. } => Protocol::Trojan,
            ProtocolFields::Shadowsocks { .. } => Protocol::Shadowsocks,
        }
    }

    /// The key the panel expects when deleting this client: identifier for
    /// vmess/vless, password for trojan, email for shadowsocks.
    pub fn delete_key(&self) -> &str {
        match &self.protocol {
            ProtocolFields::Vmess { .. } | ProtocolFields::Vless { .. } => &self.id,
            ProtocolFields::Trojan { password } => password,
            ProtocolFields::Shadowsocks { .. } => &self.email,
        }
    }

    /// Serialize to the flat camelCase JSON the panel expects
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("id".to_string(), Value::from(self.id.clone()));
        map.insert("email".to_string(), Value::from(self.email.clone()));
        map.insert("enable".to_string(), Value::from(self.enable));
        map.insert("limitIp".to_string(), Value::from(self.limit_ip));
        map.insert("totalGB".to_string(), Value::from(self.total_bytes));
        map.insert("expiryTime".to_string(), Value::from(self.expiry_time));
        map.insert(
            "subId".to_string(),
            Value::from(self.sub_id.clone().unwrap_or_default()),
        );
        map.insert("reset".to_string(), Value::from(self.reset));

        match &self.protocol {
            ProtocolFields::Vmess { alter_id, security } => {
                map.insert("alterId".to_string(), Value::from(*alter_id));
                map.insert("security".to_string(), Value::from(security.clone()));
            }
            ProtocolFields::Vless { flow } => {
                map.insert("flow".to_string(), Value::from(flow.clone()));
            }
            ProtocolFields::Trojan { password } => {
                map.insert("password".to_string(), Value::from(password.clone()));
            }
            ProtocolFields::Shadowsocks { method, password } => {
                map.insert("method".to_string(), Value::from(method.clone()));
                map.insert("password".to_string(), Value::from(password.clone()));
            }
        }

        Value::Object(map)
    }
}

/// Per-client traffic counters reported by the panel
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientTraffic {
    pub id: i64,
    pub inbound_id: i64,
    pub enable: bool,
    pub email: String,
    pub up: i64,
    pub down: i64,
    pub total: i64,
    pub expiry_time: i64,
}
