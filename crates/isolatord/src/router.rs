//! Device lister backed by the OpenWrt LuCI JSON-RPC API
//!
//! A session is opened per call (`/cgi-bin/luci/rpc/auth`, method `login`),
//! then the neighbour table is read from `/cgi-bin/luci/rpc/ip` (`neighbors`)
//! or, on routers without that endpoint, from `/cgi-bin/luci/rpc/sys`
//! (`net.arptable`). Hostnames come from `net.host_hints` when available.
//! Unreachable neighbours are reported too.

use crate::config::RouterConfig;
use crate::controller::ensure_success;
use crate::error::{IsolatorError, Result};
use crate::types::{DeviceRecord, MacAddress};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// ARP flag value for a completed (reachable) entry
const ARP_FLAG_COMPLETE: &str = "0x2";

/// Source of the router's device associations
#[async_trait]
pub trait DeviceSource: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    id: u32,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

/// LuCI JSON-RPC client
pub struct LuciClient {
    http: reqwest::Client,
    base_url: String,
    host: String,
    username: String,
    password: String,
}

impl LuciClient {
    pub fn new(config: &RouterConfig) -> Result<Self> {
        let mut client = Self::with_base_url(
            config.base_url(),
            &config.username,
            &config.password,
            config.timeout(),
        )?;
        client.host = config.host.clone();
        Ok(client)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let host = base_url
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .to_string();
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            host,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    async fn call(&self, endpoint: &str, token: Option<&str>, method: &str, params: Value) -> Result<Value> {
        let url = format!("{}/cgi-bin/luci/rpc/{}", self.base_url, endpoint);
        debug!(%url, method, "LuCI RPC call");

        let mut request = self.http.post(&url).json(&RpcRequest {
            id: 1,
            method,
            params,
        });
        if let Some(token) = token {
            request = request.query(&[("auth", token)]);
        }

        let response = ensure_success(request.send().await?).await?;
        let body: RpcResponse = response.json().await?;
        if !body.error.is_null() {
            return Err(IsolatorError::Rpc(format!("{}: {}", method, body.error)));
        }
        Ok(body.result)
    }

    async fn login(&self) -> Result<String> {
        let result = self
            .call("auth", None, "login", json!([self.username, self.password]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| IsolatorError::Rpc("login refused".to_string()))
    }

    async fn neighbours(&self, token: &str) -> Result<Vec<DeviceRecord>> {
        match self
            .call("ip", Some(token), "neighbors", json!([{"family": 4}]))
            .await
        {
            Ok(result) => Ok(parse_neighbors(&result, &self.host)),
            Err(e @ (IsolatorError::Rpc(_) | IsolatorError::Upstream { .. })) => {
                debug!(error = %e, "ip.neighbors unavailable, falling back to net.arptable");
                let result = self
                    .call("sys", Some(token), "net.arptable", json!([]))
                    .await?;
                Ok(parse_arptable(&result, &self.host))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl DeviceSource for LuciClient {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        let token = self.login().await?;
        let mut devices = self.neighbours(&token).await?;

        match self
            .call("sys", Some(&token), "net.host_hints", json!([]))
            .await
        {
            Ok(hints) => apply_host_hints(&mut devices, &hints),
            Err(e) => warn!(error = %e, "Host hints unavailable, hostnames omitted"),
        }

        debug!(count = devices.len(), "Devices listed");
        Ok(devices)
    }
}

fn str_field(entry: &Value, key: &str) -> Option<String> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Map `ip.neighbors` entries (`dest`, `mac`, `dev`, `reachable`)
///
/// Older luci-lib-ip builds report the hardware address as `lladdr`.
pub fn parse_neighbors(result: &Value, host: &str) -> Vec<DeviceRecord> {
    result
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| {
            let raw = str_field(entry, "mac").or_else(|| str_field(entry, "lladdr"))?;
            let mac: MacAddress = raw.parse().ok()?;
            Some(DeviceRecord {
                mac,
                ip: str_field(entry, "dest"),
                hostname: None,
                interface: str_field(entry, "dev"),
                reachable: entry
                    .get("reachable")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                host: host.to_string(),
            })
        })
        .collect()
}

/// Map `net.arptable` entries (`IP address`, `HW address`, `Flags`, `Device`)
pub fn parse_arptable(result: &Value, host: &str) -> Vec<DeviceRecord> {
    result
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| {
            let mac: MacAddress = str_field(entry, "HW address")?.parse().ok()?;
            Some(DeviceRecord {
                mac,
                ip: str_field(entry, "IP address"),
                hostname: None,
                interface: str_field(entry, "Device"),
                reachable: str_field(entry, "Flags").as_deref() == Some(ARP_FLAG_COMPLETE),
                host: host.to_string(),
            })
        })
        .collect()
}

/// Fill hostnames from `net.host_hints` (object keyed by MAC)
pub fn apply_host_hints(devices: &mut [DeviceRecord], hints: &Value) {
    let Some(hints) = hints.as_object() else {
        return;
    };

    for (key, hint) in hints {
        let Ok(mac) = key.parse::<MacAddress>() else {
            continue;
        };
        let Some(name) = str_field(hint, "name") else {
            continue;
        };
        for device in devices.iter_mut().filter(|d| d.mac == mac) {
            device.hostname = Some(name.clone());
        }
    }
}
