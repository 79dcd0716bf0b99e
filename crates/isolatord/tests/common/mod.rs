//! Fake collaborators for integration tests
//!
//! Both fakes are real HTTP servers bound to 127.0.0.1:0, so the production
//! reqwest clients are exercised end to end.

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ovs_isolatord::{
    AppState, BlacklistStore, FlowInspector, IsolationEngine, LuciClient, RyuClient,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const ROUTER_USER: &str = "root";
pub const ROUTER_PASSWORD: &str = "hunter2";
pub const ROUTER_TOKEN: &str = "0123456789abcdef";

/// Bind an ephemeral port and serve `app` in the background
pub async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

/// Recorded state of the fake Ryu controller
#[derive(Default)]
pub struct RyuState {
    pub switches: Vec<u64>,
    /// Flow table as raw JSON entries
    pub flows: Vec<Value>,
    pub fail_writes: bool,
    /// Flow table reads answer 500
    pub fail_reads: bool,
    /// (path, body) of every POST received
    pub posts: Vec<(String, Value)>,
}

pub type SharedRyu = Arc<Mutex<RyuState>>;

fn same_rule(a: &Value, b: &Value) -> bool {
    a["match"] == b["match"] && a["priority"] == b["priority"]
}

async fn ryu_switches(State(state): State<SharedRyu>) -> Json<Vec<u64>> {
    Json(state.lock().switches.clone())
}

async fn ryu_flows(State(state): State<SharedRyu>, Path(dpid): Path<u64>) -> Response {
    let state = state.lock();
    if state.fail_reads {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }
    let mut table = serde_json::Map::new();
    table.insert(dpid.to_string(), Value::Array(state.flows.clone()));
    Json(Value::Object(table)).into_response()
}

async fn ryu_add(State(state): State<SharedRyu>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock();
    state.posts.push(("/stats/flowentry/add".to_string(), body.clone()));
    if state.fail_writes {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }
    state.flows.retain(|rule| !same_rule(rule, &body));
    state.flows.push(body);
    StatusCode::OK.into_response()
}

async fn ryu_delete_strict(State(state): State<SharedRyu>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock();
    state
        .posts
        .push(("/stats/flowentry/delete_strict".to_string(), body.clone()));
    if state.fail_writes {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }
    state.flows.retain(|rule| !same_rule(rule, &body));
    StatusCode::OK.into_response()
}

/// Start a fake Ryu `ofctl_rest` server
pub async fn spawn_ryu(switches: Vec<u64>) -> (SocketAddr, SharedRyu) {
    let state: SharedRyu = Arc::new(Mutex::new(RyuState {
        switches,
        ..Default::default()
    }));

    let app = Router::new()
        .route("/stats/switches", get(ryu_switches))
        .route("/stats/flow/{dpid}", get(ryu_flows))
        .route("/stats/flowentry/add", post(ryu_add))
        .route("/stats/flowentry/delete_strict", post(ryu_delete_strict))
        .with_state(state.clone());

    (spawn(app).await, state)
}

fn rpc_result(result: Value) -> Json<Value> {
    Json(json!({ "id": 1, "result": result, "error": null }))
}

async fn luci_auth(Json(body): Json<Value>) -> Json<Value> {
    if body["method"] == "login" && body["params"] == json!([ROUTER_USER, ROUTER_PASSWORD]) {
        rpc_result(json!(ROUTER_TOKEN))
    } else {
        rpc_result(Value::Null)
    }
}

fn authorized(query: &HashMap<String, String>) -> bool {
    query.get("auth").map(String::as_str) == Some(ROUTER_TOKEN)
}

/// How the fake router answers the calls that may be missing on older builds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LuciMode {
    /// `ip.neighbors` and `net.host_hints` both answer
    #[default]
    Full,
    /// `/rpc/ip` is not installed (HTTP 404)
    NoIpLibrary,
    /// `ip.neighbors` answers with a JSON-RPC error
    NeighborsRpcError,
    /// Neighbours answer but `net.host_hints` fails
    NoHostHints,
}

fn rpc_error(message: &str) -> Response {
    Json(json!({"id": 1, "result": null, "error": message})).into_response()
}

async fn luci_ip(
    State(mode): State<LuciMode>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&query) {
        return StatusCode::FORBIDDEN.into_response();
    }
    match mode {
        LuciMode::NoIpLibrary => return StatusCode::NOT_FOUND.into_response(),
        LuciMode::NeighborsRpcError => return rpc_error("Method not found"),
        LuciMode::Full | LuciMode::NoHostHints => {}
    }
    if body["method"] != "neighbors" {
        return rpc_error("Method not found");
    }
    rpc_result(json!([
        {"dest": "192.168.1.20", "mac": "aa:bb:cc:dd:ee:ff", "dev": "br-lan", "reachable": true},
        {"dest": "192.168.1.21", "mac": "11:22:33:44:55:66", "dev": "br-lan", "stale": true}
    ]))
    .into_response()
}

async fn luci_sys(
    State(mode): State<LuciMode>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&query) {
        return StatusCode::FORBIDDEN.into_response();
    }
    match body["method"].as_str() {
        Some("net.host_hints") if mode == LuciMode::NoHostHints => {
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Some("net.host_hints") => rpc_result(json!({
            "AA:BB:CC:DD:EE:FF": {"name": "thermostat", "ipv4": "192.168.1.20"}
        }))
        .into_response(),
        Some("net.arptable") => rpc_result(json!([
            {"IP address": "192.168.1.20", "HW address": "aa:bb:cc:dd:ee:ff", "Flags": "0x2", "Device": "br-lan"},
            {"IP address": "192.168.1.21", "HW address": "11:22:33:44:55:66", "Flags": "0x0", "Device": "br-lan"}
        ]))
        .into_response(),
        _ => rpc_error("Method not found"),
    }
}

/// Start a fake OpenWrt LuCI JSON-RPC server
pub async fn spawn_luci() -> SocketAddr {
    spawn_luci_with(LuciMode::Full).await
}

pub async fn spawn_luci_with(mode: LuciMode) -> SocketAddr {
    let app = Router::new()
        .route("/cgi-bin/luci/rpc/auth", post(luci_auth))
        .route("/cgi-bin/luci/rpc/ip", post(luci_ip))
        .route("/cgi-bin/luci/rpc/sys", post(luci_sys))
        .with_state(mode);
    spawn(app).await
}

/// A running isolatord wired to fresh fakes
pub struct Harness {
    pub base_url: String,
    pub ryu: SharedRyu,
    pub blacklist_path: PathBuf,
    pub http: reqwest::Client,
    _dir: TempDir,
}

impl Harness {
    pub async fn start(switches: Vec<u64>) -> Self {
        Self::start_with_password(switches, ROUTER_PASSWORD).await
    }

    pub async fn start_with_password(switches: Vec<u64>, password: &str) -> Self {
        let (ryu_addr, ryu) = spawn_ryu(switches).await;
        let luci_addr = spawn_luci().await;

        let dir = TempDir::new().expect("tempdir");
        let blacklist_path = dir.path().join("blacklist.json");
        let timeout = Duration::from_secs(5);

        let controller = Arc::new(
            RyuClient::with_base_url(format!("http://{}", ryu_addr), timeout).expect("ryu client"),
        );
        let devices = Arc::new(
            LuciClient::with_base_url(
                format!("http://{}", luci_addr),
                ROUTER_USER,
                password,
                timeout,
            )
            .expect("luci client"),
        );

        let state = AppState {
            engine: Arc::new(IsolationEngine::new(
                controller.clone(),
                BlacklistStore::new(blacklist_path.clone()),
                1,
            )),
            inspector: Arc::new(FlowInspector::new(controller, 1)),
            devices,
        };
        let addr = spawn(ovs_isolatord::api_router(state)).await;

        Self {
            base_url: format!("http://{}", addr),
            ryu,
            blacklist_path,
            http: reqwest::Client::new(),
            _dir: dir,
        }
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("request");
        let status = response.status().as_u16();
        (status, response.json().await.expect("json body"))
    }

    pub async fn post(&self, path: &str) -> (u16, Value) {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("request");
        let status = response.status().as_u16();
        (status, response.json().await.expect("json body"))
    }

    /// Blacklist file contents, empty if the file does not exist yet
    pub fn blacklist(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.blacklist_path) {
            Ok(raw) => serde_json::from_str(&raw).expect("blacklist json"),
            Err(_) => Vec::new(),
        }
    }
}
