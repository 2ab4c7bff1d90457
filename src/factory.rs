//! Protocol-specific client synthesis
//!
//! Builds the client record for a mass-creation request against one inbound,
//! deriving identifiers, emails and the protocol-specific field set from the
//! inbound's protocol tag and stream-transport settings.

use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use crate::error::{PanelError, Result};
use crate::models::{Client, Inbound, Protocol, ProtocolFields, StreamSettings};

/// Length of generated client emails
const GENERATED_EMAIL_LEN: usize = 8;

/// A numeric bound or the explicit "no limit" sentinel, which the remote
/// system encodes as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    #[default]
    Unlimited,
    Fixed(u64),
}

impl Limit {
    pub fn as_remote(self) -> u64 {
        match self {
            Limit::Unlimited => 0,
            Limit::Fixed(n) => n,
        }
    }
}

/// Traffic quota unit accepted in mass-creation requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficUnit {
    Mb,
    Gb,
    Tb,
}

impl TrafficUnit {
    pub fn bytes(self) -> i64 {
        match self {
            TrafficUnit::Mb => 1024 * 1024,
            TrafficUnit::Gb => 1024 * 1024 * 1024,
            TrafficUnit::Tb => 1024 * 1024 * 1024 * 1024,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MB" => Some(TrafficUnit::Mb),
            "GB" => Some(TrafficUnit::Gb),
            "TB" => Some(TrafficUnit::Tb),
            _ => None,
        }
    }
}

/// Traffic quota: unlimited or a sized value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrafficLimit {
    #[default]
    Unlimited,
    Size { value: u64, unit: TrafficUnit },
}

impl TrafficLimit {
    /// Quota in bytes, or `None` when the size does not fit the remote's
    /// signed 64-bit byte field.
    pub fn to_bytes(self) -> Option<i64> {
        match self {
            TrafficLimit::Unlimited => Some(0),
            TrafficLimit::Size { value, unit } => i64::try_from(value)
                .ok()
                .and_then(|v| v.checked_mul(unit.bytes())),
        }
    }
}

/// A request to create one client on each target inbound
#[derive(Debug, Clone, Default)]
pub struct MassClientRequest {
    /// Subscription group; one fresh id is generated for the whole batch when absent
    pub sub_id: Option<String>,
    /// Explicit email; a short random string is generated per client when absent
    pub email: Option<String>,
    pub limit_ip: Limit,
    pub traffic: TrafficLimit,
    /// Expiry timestamp in epoch milliseconds
    pub expiry_time: Limit,
    /// vless flow override
    pub flow: Option<String>,
    /// vmess alterId override
    pub alter_id: Option<u32>,
    /// vmess security override
    pub security: Option<String>,
    /// trojan/shadowsocks password override
    pub password: Option<String>,
    /// shadowsocks method override
    pub method: Option<String>,
}

impl MassClientRequest {
    /// Validate the request before any network call is made
    pub fn validate(&self) -> Result<()> {
        if let TrafficLimit::Size { value, .. } = self.traffic {
            if value == 0 {
                return Err(PanelError::Validation(
                    "traffic size must be positive".to_string(),
                ));
            }
            if self.traffic.to_bytes().is_none() {
                return Err(PanelError::Validation(
                    "traffic quota exceeds the representable byte range".to_string(),
                ));
            }
        }
        if let Limit::Fixed(n) = self.limit_ip {
            if u32::try_from(n).is_err() {
                return Err(PanelError::Validation(format!(
                    "limit_ip {} exceeds the representable range",
                    n
                )));
            }
        }
        if let Limit::Fixed(n) = self.expiry_time {
            if i64::try_from(n).is_err() {
                return Err(PanelError::Validation(format!(
                    "expiry time {} exceeds the representable range",
                    n
                )));
            }
        }
        Ok(())
    }

    /// Subscription id shared by the entire batch: the request's own, or one
    /// freshly generated id. Called once per mass operation, never per
    /// inbound, so the batch stays grouped into a single subscription.
    pub fn resolve_sub_id(&self) -> String {
        self.sub_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

/// Short random email for a generated client. Collision risk is accepted;
/// callers needing stronger uniqueness supply explicit emails.
pub fn random_email() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_EMAIL_LEN)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

/// Derive the vless flow value from an inbound's stream-transport settings.
/// Flow is non-empty only under XTLS security.
pub fn derive_vless_flow(stream: &StreamSettings) -> String {
    match (stream.network.as_str(), stream.security.as_str()) {
        (_, "xtls") => "xtls-rprx-vision",
        (_, "tls") | (_, "reality") => "",
        ("tcp", "") | ("tcp", "none") => "",
        ("ws", _) | ("grpc", _) | ("h2", _) | ("httpupgrade", _) => "",
        _ => "",
    }
    .to_string()
}

/// Synthesize the client record for one inbound from a mass-creation request.
///
/// `sub_id` is the batch-wide subscription id resolved by the caller. An
/// inbound with an unmanaged protocol tag is rejected outright rather than
/// silently shaped as vless, so configuration errors surface in the per-item
/// report.
pub fn build_client(
    inbound: &Inbound,
    request: &MassClientRequest,
    sub_id: &str,
) -> Result<Client> {
    let email = request
        .email
        .clone()
        .filter(|e| !e.is_empty())
        .unwrap_or_else(random_email);

    let protocol = match inbound.protocol {
        Protocol::Vmess => ProtocolFields::Vmess {
            alter_id: request.alter_id.unwrap_or(0),
            security: request
                .security
                .clone()
                .unwrap_or_else(|| "auto".to_string()),
        },
        Protocol::Vless => ProtocolFields::Vless {
            flow: request
                .flow
                .clone()
                .unwrap_or_else(|| derive_vless_flow(&inbound.stream())),
        },
        Protocol::Trojan => ProtocolFields::Trojan {
            password: request
                .password
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        },
        Protocol::Shadowsocks => ProtocolFields::Shadowsocks {
            method: request
                .method
                .clone()
                .unwrap_or_else(|| "aes-256-gcm".to_string()),
            password: request
                .password
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        },
        Protocol::Unknown => {
            return Err(PanelError::Validation(format!(
                "inbound {} ({}) has an unsupported protocol",
                inbound.id, inbound.remark
            )))
        }
    };

    // Shadowsocks clients are keyed by email remotely; every other protocol
    // gets a fresh UUID identifier.
    let id = if inbound.protocol == Protocol::Shadowsocks {
        email.clone()
    } else {
        Uuid::new_v4().to_string()
    };

    // Narrowing to the remote field widths must never wrap: a truncated
    // limit_ip of 0 would read as the "unlimited" sentinel.
    let limit_ip = u32::try_from(request.limit_ip.as_remote()).map_err(|_| {
        PanelError::Validation(format!(
            "limit_ip {} exceeds the representable range",
            request.limit_ip.as_remote()
        ))
    })?;
    let total_bytes = request.traffic.to_bytes().ok_or_else(|| {
        PanelError::Validation("traffic quota exceeds the representable byte range".to_string())
    })?;
    let expiry_time = i64::try_from(request.expiry_time.as_remote()).map_err(|_| {
        PanelError::Validation(format!(
            "expiry time {} exceeds the representable range",
            request.expiry_time.as_remote()
        ))
    })?;

    Ok(Client {
        id,
        email,
        enable: true,
        limit_ip,
        total_bytes,
        expiry_time,
        sub_id: Some(sub_id.to_string()),
        reset: 0,
        protocol,
    })
}
