//! Host isolation relay for OpenWrt routers and Ryu-managed switches
//!
//! isolatord sits between a network dashboard and two collaborators:
//!
//! - the router's LuCI JSON-RPC API, from which it lists connected devices;
//! - a Ryu SDN controller, whose `ofctl_rest` API it uses to read the switch
//!   flow table and to install or remove per-host drop rules.
//!
//! Isolated hosts are identified by MAC address and recorded in a JSON
//! blacklist file, which is the authoritative answer to "who is isolated".
//!
//! # Architecture
//!
//! ```text
//!  dashboard ──HTTP──▶ rest_api ──▶ router::LuciClient ──▶ OpenWrt LuCI RPC
//!                         │
//!                         ├──────▶ flows::FlowInspector ─┐
//!                         │                              ├──▶ controller::RyuClient ──▶ Ryu
//!                         └──────▶ isolation::IsolationEngine
//!                                        │
//!                                        └──▶ store::BlacklistStore (JSON file)
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod flows;
pub mod isolation;
pub mod rest_api;
pub mod router;
pub mod store;
pub mod types;

pub use config::IsolatorConfig;
pub use controller::{FlowController, FlowEntry, FlowRule, RyuClient};
pub use error::{IsolatorError, Result};
pub use flows::FlowInspector;
pub use isolation::{AuditReport, IsolationEngine, IsolationState, Outcome};
pub use rest_api::{router as api_router, serve, AppState};
pub use router::{DeviceSource, LuciClient};
pub use store::BlacklistStore;
pub use types::{Communication, DeviceRecord, MacAddress};
