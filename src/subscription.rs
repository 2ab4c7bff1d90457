//! Subscription orchestration
//!
//! A subscription is a derived view: the set of clients across all inbounds
//! that carry the same subscription id. It is recomputed on every query by
//! scanning the inbound list, never cached. Mass operations iterate their
//! targets sequentially, one call in flight at a time, and record each
//! outcome independently; partial completion is the only terminal shape.

use std::collections::HashMap;

use crate::client::PanelClient;
use crate::error::Result;
use crate::factory::{build_client, MassClientRequest};
use crate::logger::log;
use crate::models::{Client, Inbound, Protocol};

/// One client's membership in a subscription group
#[derive(Debug, Clone)]
pub struct SubscriptionMember {
    pub client: Client,
    pub inbound_id: i64,
    pub inbound_remark: String,
    pub protocol: Protocol,
}

/// A subscription group, ordered by first-seen inbound and in-inbound client order
#[derive(Debug, Clone)]
pub struct Subscription {
    pub sub_id: String,
    pub members: Vec<SubscriptionMember>,
}

/// Outcome for a single target of a mass operation
#[derive(Debug, Clone)]
pub struct InboundOpResult {
    pub inbound_id: i64,
    pub remark: String,
    pub protocol: Protocol,
    pub success: bool,
    pub error: Option<String>,
}

/// Aggregate report of a mass operation, results in target-iteration order
#[derive(Debug, Clone, Default)]
pub struct MassOperationReport {
    pub success: usize,
    pub failed: usize,
    pub results: Vec<InboundOpResult>,
}

impl MassOperationReport {
    fn record_success(&mut self, inbound_id: i64, remark: String, protocol: Protocol) {
        self.success += 1;
        self.results.push(InboundOpResult {
            inbound_id,
            remark,
            protocol,
            success: true,
            error: None,
        });
    }

    fn record_failure(
        &mut self,
        inbound_id: i64,
        remark: String,
        protocol: Protocol,
        error: String,
    ) {
        self.failed += 1;
        self.results.push(InboundOpResult {
            inbound_id,
            remark,
            protocol,
            success: false,
            error: Some(error),
        });
    }
}

impl PanelClient {
    /// Group every client carrying a non-empty subscription id, across all
    /// inbounds. An inbound whose settings blob fails to parse is skipped
    /// with a warning; the scan itself never aborts.
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let inbounds = self.list_inbounds().await?;

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<SubscriptionMember>> = HashMap::new();

        for inbound in &inbounds {
            let clients = match inbound.clients() {
                Ok(clients) => clients,
                Err(e) => {
                    log::warn!(
                        inbound_id = inbound.id,
                        error = %e,
                        "Skipping inbound with malformed settings"
                    );
                    continue;
                }
            };

            for client in clients {
                let Some(sub_id) = client.sub_id.clone().filter(|s| !s.is_empty()) else {
                    continue;
                };
                if !groups.contains_key(&sub_id) {
                    order.push(sub_id.clone());
                }
                groups.entry(sub_id).or_default().push(SubscriptionMember {
                    inbound_id: inbound.id,
                    inbound_remark: inbound.remark.clone(),
                    protocol: inbound.protocol,
                    client,
                });
            }
        }

        Ok(order
            .into_iter()
            .map(|sub_id| {
                let members = groups.remove(&sub_id).unwrap_or_default();
                Subscription { sub_id, members }
            })
            .collect())
    }

    /// Linear lookup over [`list_subscriptions`](Self::list_subscriptions)
    pub async fn get_subscription(&self, sub_id: &str) -> Result<Option<Subscription>> {
        Ok(self
            .list_subscriptions()
            .await?
            .into_iter()
            .find(|s| s.sub_id == sub_id))
    }

    /// Create one client per target inbound, all sharing one subscription id.
    ///
    /// Targets are processed sequentially; one inbound's failure is recorded
    /// and never aborts the remaining targets. When `target_inbound_ids` is
    /// absent, every inbound is a target.
    pub async fn mass_create(
        &self,
        request: &MassClientRequest,
        target_inbound_ids: Option<&[i64]>,
    ) -> Result<MassOperationReport> {
        request.validate()?;

        // One id for the whole batch keeps it grouped into a single subscription
        let sub_id = request.resolve_sub_id();
        let inbounds = self.list_inbounds().await?;

        let mut report = MassOperationReport::default();

        match target_inbound_ids {
            Some(ids) => {
                for &id in ids {
                    match inbounds.iter().find(|i| i.id == id) {
                        Some(inbound) => {
                            self.create_on_inbound(inbound, request, &sub_id, &mut report)
                                .await
                        }
                        None => report.record_failure(
                            id,
                            String::new(),
                            Protocol::Unknown,
                            format!("inbound {} not found", id),
                        ),
                    }
                }
            }
            None => {
                for inbound in &inbounds {
                    self.create_on_inbound(inbound, request, &sub_id, &mut report)
                        .await;
                }
            }
        }

        log::info!(
            sub_id = %sub_id,
            success = report.success,
            failed = report.failed,
            "Mass create finished"
        );
        Ok(report)
    }

    async fn create_on_inbound(
        &self,
        inbound: &Inbound,
        request: &MassClientRequest,
        sub_id: &str,
        report: &mut MassOperationReport,
    ) {
        let client = match build_client(inbound, request, sub_id) {
            Ok(client) => client,
            Err(e) => {
                log::mass_op("create", inbound.id, false, Some(&e.to_string()));
                report.record_failure(
                    inbound.id,
                    inbound.remark.clone(),
                    inbound.protocol,
                    e.to_string(),
                );
                return;
            }
        };

        match self.add_client(inbound.id, &client).await {
            Ok(()) => {
                log::mass_op("create", inbound.id, true, None);
                report.record_success(inbound.id, inbound.remark.clone(), inbound.protocol);
            }
            Err(e) => {
                log::mass_op("create", inbound.id, false, Some(&e.to_string()));
                report.record_failure(
                    inbound.id,
                    inbound.remark.clone(),
                    inbound.protocol,
                    e.to_string(),
                );
            }
        }
    }

    /// Delete every member of a subscription, deriving the protocol-correct
    /// delete key per client. A subscription with no members is a no-op
    /// success with an empty report.
    pub async fn delete_by_subscription(&self, sub_id: &str) -> Result<MassOperationReport> {
        let mut report = MassOperationReport::default();

        let Some(subscription) = self.get_subscription(sub_id).await? else {
            log::info!(sub_id = sub_id, "Subscription has no members, nothing to delete");
            return Ok(report);
        };

        for member in &subscription.members {
            let key = member.client.delete_key();
            if key.is_empty() {
                report.record_failure(
                    member.inbound_id,
                    member.inbound_remark.clone(),
                    member.protocol,
                    format!(
                        "client {} has no usable delete key",
                        member.client.email
                    ),
                );
                continue;
            }

            match self.delete_client(member.inbound_id, key).await {
                Ok(()) => {
                    log::mass_op("delete", member.inbound_id, true, None);
                    report.record_success(
                        member.inbound_id,
                        member.inbound_remark.clone(),
                        member.protocol,
                    );
                }
                Err(e) => {
                    log::mass_op("delete", member.inbound_id, false, Some(&e.to_string()));
                    report.record_failure(
                        member.inbound_id,
                        member.inbound_remark.clone(),
                        member.protocol,
                        e.to_string(),
                    );
                }
            }
        }

        log::info!(
            sub_id = sub_id,
            success = report.success,
            failed = report.failed,
            "Mass delete finished"
        );
        Ok(report)
    }
}
