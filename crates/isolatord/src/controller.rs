//! Ryu `ofctl_rest` client
//!
//! The SDN controller owns the lifecycle of every flow rule; this module only
//! issues list/add/delete requests against its REST API:
//!
//! | Method | Path                          |
//! |--------|-------------------------------|
//! | GET    | /stats/switches               |
//! | GET    | /stats/flow/{dpid}            |
//! | POST   | /stats/flowentry/add          |
//! | POST   | /stats/flowentry/delete_strict|

use crate::config::ControllerConfig;
use crate::error::{IsolatorError, Result};
use crate::types::MacAddress;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Priority of isolation drop rules
pub const ISOLATION_PRIORITY: u16 = 1000;

/// Cookie tagging isolation drop rules
pub const ISOLATION_COOKIE: u64 = 1;

/// Match keys that carry a source MAC (OpenFlow 1.0 and 1.3 spellings)
const SOURCE_KEYS: [&str; 2] = ["dl_src", "eth_src"];

/// Match keys that carry a destination MAC
const DESTINATION_KEYS: [&str; 2] = ["dl_dst", "eth_dst"];

/// Flow rule body accepted by `/stats/flowentry/*`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRule {
    pub dpid: u64,
    pub cookie: u64,
    pub cookie_mask: u64,
    pub table_id: u8,
    pub priority: u16,
    #[serde(rename = "match")]
    pub match_fields: BTreeMap<String, Value>,
    /// Empty list drops matching traffic
    pub actions: Vec<Value>,
}

impl FlowRule {
    /// Drop rule for all traffic sourced from `mac`
    pub fn isolation(dpid: u64, mac: &MacAddress) -> Self {
        let mut match_fields = BTreeMap::new();
        match_fields.insert("dl_src".to_string(), Value::String(mac.to_string()));

        Self {
            dpid,
            cookie: ISOLATION_COOKIE,
            cookie_mask: 0,
            table_id: 0,
            priority: ISOLATION_PRIORITY,
            match_fields,
            actions: Vec::new(),
        }
    }

    /// Same rule, with the cookie mask set so a delete only touches rules we installed
    pub fn for_delete(mut self) -> Self {
        self.cookie_mask = u64::MAX;
        self
    }
}

/// One entry of the flow table returned by `/stats/flow/{dpid}`
///
/// Counters and timeouts are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FlowEntry {
    #[serde(default)]
    pub priority: u16,
    #[serde(default)]
    pub cookie: u64,
    #[serde(default)]
    pub table_id: u8,
    #[serde(default, rename = "match")]
    pub match_fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub actions: Vec<Value>,
}

impl FlowEntry {
    fn field(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|key| self.match_fields.get(*key))
            .and_then(|value| value.as_str())
            .map(str::to_string)
    }

    /// Source address from the match, if any
    pub fn source(&self) -> Option<String> {
        self.field(&SOURCE_KEYS)
    }

    /// Destination address from the match, if any
    pub fn destination(&self) -> Option<String> {
        self.field(&DESTINATION_KEYS)
    }

    /// Returns true if this entry looks like a rule installed by `isolate`
    pub fn is_isolation_rule(&self) -> bool {
        self.cookie == ISOLATION_COOKIE && self.actions.is_empty() && self.source().is_some()
    }
}

/// Flow-table operations the daemon needs from the SDN controller
#[async_trait]
pub trait FlowController: Send + Sync {
    /// DPIDs of the connected switches
    async fn list_switches(&self) -> Result<Vec<u64>>;

    /// Flow table of one switch
    async fn get_flows(&self, dpid: u64) -> Result<Vec<FlowEntry>>;

    /// Install a rule
    async fn add_flow(&self, rule: &FlowRule) -> Result<()>;

    /// Remove the rule with exactly this match and priority
    async fn delete_flow_strict(&self, rule: &FlowRule) -> Result<()>;
}

/// Resolve the DPID to operate on
///
/// First connected switch, or `default_dpid` if the controller reports none.
/// `None` when the controller could not be asked at all.
pub async fn get_switch_dpid(controller: &dyn FlowController, default_dpid: u64) -> Option<u64> {
    match controller.list_switches().await {
        Ok(switches) => Some(switches.first().copied().unwrap_or(default_dpid)),
        Err(e) => {
            warn!(error = %e, "Failed to list switches");
            None
        }
    }
}

/// Resolve the DPID or fail with a configuration error
pub async fn require_switch_dpid(controller: &dyn FlowController, default_dpid: u64) -> Result<u64> {
    get_switch_dpid(controller, default_dpid)
        .await
        .ok_or_else(|| IsolatorError::Config("no DPID found".to_string()))
}

/// `FlowController` backed by Ryu's REST API
pub struct RyuClient {
    http: reqwest::Client,
    base_url: String,
}

impl RyuClient {
    /// Build a client; the configured timeout applies to every call
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        Self::with_base_url(config.base_url(), config.timeout())
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_rule(&self, path: &str, rule: &FlowRule) -> Result<()> {
        let url = self.url(path);
        debug!(%url, dpid = rule.dpid, "POST flow rule");
        let response = self.http.post(&url).json(rule).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into `IsolatorError::Upstream`
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(IsolatorError::Upstream {
        url,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl FlowController for RyuClient {
    async fn list_switches(&self) -> Result<Vec<u64>> {
        let url = self.url("/stats/switches");
        debug!(%url, "GET switches");
        let response = ensure_success(self.http.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn get_flows(&self, dpid: u64) -> Result<Vec<FlowEntry>> {
        let url = self.url(&format!("/stats/flow/{}", dpid));
        debug!(%url, dpid, "GET flow table");
        let response = ensure_success(self.http.get(&url).send().await?).await?;
        let mut tables: HashMap<String, Vec<FlowEntry>> = response.json().await?;
        Ok(tables.remove(&dpid.to_string()).unwrap_or_default())
    }

    async fn add_flow(&self, rule: &FlowRule) -> Result<()> {
        self.post_rule("/stats/flowentry/add", rule).await
    }

    async fn delete_flow_strict(&self, rule: &FlowRule) -> Result<()> {
        self.post_rule("/stats/flowentry/delete_strict", rule).await
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory controller used by unit tests

    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct FakeController {
        pub switches: Mutex<Vec<u64>>,
        pub flows: Mutex<Vec<FlowRule>>,
        pub fail_switches: Mutex<bool>,
        pub fail_writes: Mutex<bool>,
        pub add_calls: Mutex<usize>,
        pub delete_calls: Mutex<usize>,
    }

    impl FakeController {
        pub fn with_switches(switches: Vec<u64>) -> Self {
            let fake = Self::default();
            *fake.switches.lock() = switches;
            fake
        }

        pub fn set_fail_writes(&self, fail: bool) {
            *self.fail_writes.lock() = fail;
        }

        fn upstream_error(path: &str) -> IsolatorError {
            IsolatorError::Upstream {
                url: format!("http://fake{}", path),
                status: 500,
                body: "simulated failure".to_string(),
            }
        }
    }

    #[async_trait]
    impl FlowController for FakeController {
        async fn list_switches(&self) -> Result<Vec<u64>> {
            if *self.fail_switches.lock() {
                return Err(Self::upstream_error("/stats/switches"));
            }
            Ok(self.switches.lock().clone())
        }

        async fn get_flows(&self, dpid: u64) -> Result<Vec<FlowEntry>> {
            Ok(self
                .flows
                .lock()
                .iter()
                .filter(|rule| rule.dpid == dpid)
                .map(|rule| FlowEntry {
                    priority: rule.priority,
                    cookie: rule.cookie,
                    table_id: rule.table_id,
                    match_fields: rule.match_fields.clone(),
                    actions: rule.actions.clone(),
                })
                .collect())
        }

        async fn add_flow(&self, rule: &FlowRule) -> Result<()> {
            *self.add_calls.lock() += 1;
            if *self.fail_writes.lock() {
                return Err(Self::upstream_error("/stats/flowentry/add"));
            }
            let mut flows = self.flows.lock();
            flows.retain(|r| !(r.match_fields == rule.match_fields && r.priority == rule.priority));
            flows.push(rule.clone());
            Ok(())
        }

        async fn delete_flow_strict(&self, rule: &FlowRule) -> Result<()> {
            *self.delete_calls.lock() += 1;
            if *self.fail_writes.lock() {
                return Err(Self::upstream_error("/stats/flowentry/delete_strict"));
            }
            self.flows
                .lock()
                .retain(|r| !(r.match_fields == rule.match_fields && r.priority == rule.priority));
            Ok(())
        }
    }
}
