//! Isolation engine
//!
//! Keeps the persisted blacklist and the switch's drop rules in step. Each
//! MAC is either `Included` (no rule, not listed) or `Isolated` (drop rule
//! installed, listed). Transitions happen only when the controller accepted
//! the rule change; the blacklist file is then updated. If the file update
//! fails, the rule change is reverted on the controller before the error is
//! returned.
//!
//! The persisted blacklist is the source of truth for `list_isolated`. The
//! live flow table is only consulted by `audit`. File access runs on the
//! blocking pool while the engine lock is held.

use crate::controller::{require_switch_dpid, FlowController, FlowRule};
use crate::error::{IsolatorError, Result};
use crate::store::BlacklistStore;
use crate::types::MacAddress;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Isolation state of a single MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationState {
    Included,
    Isolated,
}

/// Result of a successful `isolate` or `include`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub mac: MacAddress,
    pub state: IsolationState,
    /// False when the MAC was already in the requested state
    pub changed: bool,
}

/// Blacklist vs. live flow table comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub dpid: u64,
    /// Blacklisted MACs without a drop rule on the switch
    pub missing_rules: Vec<MacAddress>,
    /// Drop rules on the switch for MACs that are not blacklisted
    pub orphan_rules: Vec<String>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_rules.is_empty() && self.orphan_rules.is_empty()
    }
}

/// Run a blocking store operation off the async workers
async fn on_store<T, F>(store: &BlacklistStore, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&BlacklistStore) -> Result<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| IsolatorError::State(format!("Blacklist task failed: {}", e)))?
}

/// Owns the blacklist and applies isolation rules through a `FlowController`
pub struct IsolationEngine {
    controller: Arc<dyn FlowController>,
    store: Mutex<BlacklistStore>,
    default_dpid: u64,
}

impl IsolationEngine {
    pub fn new(controller: Arc<dyn FlowController>, store: BlacklistStore, default_dpid: u64) -> Self {
        Self {
            controller,
            store: Mutex::new(store),
            default_dpid,
        }
    }

    /// Install a drop rule for `mac` and record it in the blacklist
    ///
    /// Multicast and broadcast addresses are rejected before any controller
    /// call since they never appear as a frame source.
    pub async fn isolate(&self, mac: MacAddress) -> Result<Outcome> {
        if mac.is_multicast() {
            return Err(IsolatorError::InvalidMac(format!(
                "{} is a multicast address",
                mac
            )));
        }

        let store = self.store.lock().await;
        let was_isolated = on_store(&store, move |s| s.contains(&mac)).await?;

        let dpid = require_switch_dpid(self.controller.as_ref(), self.default_dpid).await?;
        let rule = FlowRule::isolation(dpid, &mac);

        if let Err(e) = self.controller.add_flow(&rule).await {
            error!(%mac, dpid, error = %e, "Failed to isolate");
            return Err(e);
        }

        match on_store(&store, move |s| s.insert(mac)).await {
            Ok(changed) => {
                if changed {
                    info!(%mac, dpid, "Added to the blacklist");
                } else {
                    info!(%mac, dpid, "Already on the blacklist");
                }
                Ok(Outcome {
                    mac,
                    state: IsolationState::Isolated,
                    changed,
                })
            }
            Err(e) => {
                error!(%mac, error = %e, "Rule installed but blacklist not updated");
                if !was_isolated {
                    if let Err(undo) = self.controller.delete_flow_strict(&rule.for_delete()).await {
                        warn!(%mac, error = %undo, "Failed to revert isolation rule");
                    }
                }
                Err(e)
            }
        }
    }

    /// Remove the drop rule for `mac` and drop it from the blacklist
    pub async fn include(&self, mac: MacAddress) -> Result<Outcome> {
        let store = self.store.lock().await;
        let was_isolated = on_store(&store, move |s| s.contains(&mac)).await?;

        let dpid = require_switch_dpid(self.controller.as_ref(), self.default_dpid).await?;
        let rule = FlowRule::isolation(dpid, &mac);

        if let Err(e) = self.controller.delete_flow_strict(&rule.clone().for_delete()).await {
            error!(%mac, dpid, error = %e, "Failed to include");
            return Err(e);
        }

        match on_store(&store, move |s| s.remove(&mac)).await {
            Ok(changed) => {
                if changed {
                    info!(%mac, dpid, "Removed from the blacklist");
                } else {
                    info!(%mac, dpid, "Was not blacklisted");
                }
                Ok(Outcome {
                    mac,
                    state: IsolationState::Included,
                    changed,
                })
            }
            Err(e) => {
                error!(%mac, error = %e, "Rule deleted but blacklist not updated");
                if was_isolated {
                    if let Err(undo) = self.controller.add_flow(&rule).await {
                        warn!(%mac, error = %undo, "Failed to restore isolation rule");
                    }
                }
                Err(e)
            }
        }
    }

    /// Isolated MACs in insertion order, from the persisted blacklist
    pub async fn list_isolated(&self) -> Result<Vec<MacAddress>> {
        let store = self.store.lock().await;
        on_store(&store, BlacklistStore::load).await
    }

    /// Compare the blacklist with the drop rules actually on the switch
    pub async fn audit(&self) -> Result<AuditReport> {
        let store = self.store.lock().await;
        let blacklist = on_store(&store, BlacklistStore::load).await?;

        let dpid = require_switch_dpid(self.controller.as_ref(), self.default_dpid).await?;
        let flows = self.controller.get_flows(dpid).await?;

        let ruled: Vec<String> = flows
            .iter()
            .filter(|entry| entry.is_isolation_rule())
            .filter_map(|entry| entry.source())
            .collect();

        let ruled_macs: Vec<MacAddress> =
            ruled.iter().filter_map(|source| source.parse().ok()).collect();

        let missing_rules = blacklist
            .iter()
            .filter(|mac| !ruled_macs.contains(mac))
            .copied()
            .collect();

        let orphan_rules = ruled
            .into_iter()
            .filter(|source| match source.parse::<MacAddress>() {
                Ok(mac) => !blacklist.contains(&mac),
                Err(_) => true,
            })
            .collect();

        let report = AuditReport {
            dpid,
            missing_rules,
            orphan_rules,
        };

        if !report.is_consistent() {
            warn!(
                dpid,
                missing = report.missing_rules.len(),
                orphans = report.orphan_rules.len(),
                "Blacklist and flow table disagree"
            );
        }

        Ok(report)
    }
}
