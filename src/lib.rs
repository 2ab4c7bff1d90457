//! Resilient client for 3x-ui style proxy panels
//!
//! Layered architecture:
//! - `transport`: HTTP seam (`ApiTransport`) with cookie-based session auth
//! - `session` / `breaker` / `retry`: resilience layers composed by `executor`
//! - `factory`: protocol-specific client synthesis (vmess/vless/trojan/shadowsocks)
//! - `subscription`: cross-inbound grouping and sequential mass operations
//! - `client`: the `PanelClient` facade tying it all together

pub mod breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod factory;
pub mod logger;
pub mod models;
pub mod retry;
pub mod session;
pub mod subscription;
pub mod transport;

pub use breaker::{BreakerStatus, CircuitBreaker};
pub use client::PanelClient;
pub use config::PanelConfig;
pub use error::{PanelError, Result};
pub use factory::{Limit, MassClientRequest, TrafficLimit, TrafficUnit};
pub use models::{Client, ClientTraffic, Inbound, Protocol, ProtocolFields, StreamSettings};
pub use session::AuthStatus;
pub use subscription::{InboundOpResult, MassOperationReport, Subscription, SubscriptionMember};
