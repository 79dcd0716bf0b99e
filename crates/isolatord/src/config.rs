//! Configuration file support for isolatord
//!
//! Loads and validates isolatord configuration from TOML files.
//! Default location: /etc/isolatord/isolatord.toml
//!
//! Secrets and addresses can be overridden from the environment so that no
//! credentials have to live in the file.

use crate::error::{IsolatorError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/isolatord/isolatord.toml";

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port to bind
    #[serde(default = "default_server_port")]
    pub port: u16,
}

/// OpenWrt router (LuCI JSON-RPC) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Router address, host or host:port
    #[serde(default = "default_router_host")]
    pub host: String,

    /// Login user
    #[serde(default = "default_router_user")]
    pub username: String,

    /// Login password
    #[serde(default)]
    pub password: String,

    /// Timeout applied to every RPC call, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Ryu controller (ofctl_rest) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller host
    #[serde(default = "default_controller_host")]
    pub host: String,

    /// Controller REST port
    #[serde(default = "default_controller_port")]
    pub port: u16,

    /// DPID used when the controller reports no connected switches
    #[serde(default = "default_dpid")]
    pub default_dpid: u64,

    /// Timeout applied to every REST call, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Persisted blacklist configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistConfig {
    /// JSON file holding the isolated MAC addresses
    #[serde(default = "default_blacklist_path")]
    pub path: PathBuf,
}

/// Complete isolatord configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IsolatorConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub blacklist: BlacklistConfig,
}

// Default functions
fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    5000
}

fn default_router_host() -> String {
    "192.168.1.1".to_string()
}

fn default_router_user() -> String {
    "root".to_string()
}

fn default_controller_host() -> String {
    "127.0.0.1".to_string()
}

fn default_controller_port() -> u16 {
    8080
}

fn default_dpid() -> u64 {
    1
}

fn default_timeout() -> u64 {
    5
}

fn default_blacklist_path() -> PathBuf {
    PathBuf::from("/var/lib/isolatord/blacklist.json")
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_server_port(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: default_router_host(),
            username: default_router_user(),
            password: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: default_controller_host(),
            port: default_controller_port(),
            default_dpid: default_dpid(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            path: default_blacklist_path(),
        }
    }
}

impl ControllerConfig {
    /// Base URL of the controller REST API
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RouterConfig {
    /// Base URL of the router web interface
    pub fn base_url(&self) -> String {
        format!("http://{}", self.host)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl IsolatorConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| {
                IsolatorError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(IsolatorError::Io(e)),
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| IsolatorError::Config(e.to_string()))
    }

    /// Load from file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `ISOLATORD_*` overrides through the given lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ISOLATORD_ROUTER_HOST") {
            self.router.host = host;
        }
        if let Some(user) = lookup("ISOLATORD_ROUTER_USER") {
            self.router.username = user;
        }
        if let Some(password) = lookup("ISOLATORD_ROUTER_PASSWORD") {
            self.router.password = password;
        }
        if let Some(host) = lookup("ISOLATORD_CONTROLLER_HOST") {
            self.controller.host = host;
        }
        if let Some(port) = lookup("ISOLATORD_CONTROLLER_PORT") {
            match port.parse() {
                Ok(port) => self.controller.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid ISOLATORD_CONTROLLER_PORT"),
            }
        }
        if let Some(path) = lookup("ISOLATORD_BLACKLIST_PATH") {
            self.blacklist.path = PathBuf::from(path);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(IsolatorError::Config("server.port must be > 0".to_string()));
        }

        if self.controller.port == 0 {
            return Err(IsolatorError::Config(
                "controller.port must be > 0".to_string(),
            ));
        }

        if self.router.host.trim().is_empty() || self.controller.host.trim().is_empty() {
            return Err(IsolatorError::Config(
                "router.host and controller.host must not be empty".to_string(),
            ));
        }

        if self.router.timeout_secs == 0 || self.controller.timeout_secs == 0 {
            return Err(IsolatorError::Config(
                "timeouts must be at least one second".to_string(),
            ));
        }

        if self.router.password.is_empty() {
            info!("router.password is empty; set ISOLATORD_ROUTER_PASSWORD for authenticated routers");
        }

        Ok(())
    }
}
