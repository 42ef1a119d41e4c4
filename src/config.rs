//! # Orchestration Configuration
//!
//! Settings shared by workers and clients. Values come from, lowest to highest
//! precedence: built-in defaults, an optional TOML file, `ORCH_*` environment
//! variables.
//!
//! ```rust,no_run
//! use orch_core::config::OrchConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchConfig::load(None)?;
//! println!("protocol {} (rpc timeout {:?})", config.protocol_version, config.rpc_timeout());
//! # Ok(())
//! # }
//! ```

use crate::constants::{DEFAULT_RPC_TIMEOUT_MS, PROTOCOL_VERSION};
use crate::error::{OrchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default location of the optional configuration file (extension omitted)
pub const DEFAULT_CONFIG_FILE: &str = "config/orch";

/// Environment variable prefix (`ORCH_RPC_TIMEOUT_MS`, ...)
pub const ENV_PREFIX: &str = "ORCH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchConfig {
    /// Version stamped on tasks; must match between clients and workers
    pub protocol_version: String,
    /// Request the next delivery right after each handler turn
    pub automatic_flow: bool,
    /// Allow `Client::rpc`
    pub enable_rpc: bool,
    /// Default RPC timeout in milliseconds
    pub rpc_timeout_ms: u64,
    /// Fixed client id; generated when absent
    pub client_id: Option<String>,
    /// Capacity of the worker event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for OrchConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            automatic_flow: true,
            enable_rpc: false,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            client_id: None,
            event_channel_capacity: 1000,
        }
    }
}

impl OrchConfig {
    /// Defaults with `ORCH_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(version) = std::env::var("ORCH_PROTOCOL_VERSION") {
            config.protocol_version = version;
        }

        if let Ok(automatic_flow) = std::env::var("ORCH_AUTOMATIC_FLOW") {
            config.automatic_flow = automatic_flow.parse().map_err(|e| {
                OrchError::Configuration(format!("Invalid automatic_flow: {e}"))
            })?;
        }

        if let Ok(enable_rpc) = std::env::var("ORCH_ENABLE_RPC") {
            config.enable_rpc = enable_rpc
                .parse()
                .map_err(|e| OrchError::Configuration(format!("Invalid enable_rpc: {e}")))?;
        }

        if let Ok(timeout) = std::env::var("ORCH_RPC_TIMEOUT_MS") {
            config.rpc_timeout_ms = timeout
                .parse()
                .map_err(|e| OrchError::Configuration(format!("Invalid rpc_timeout_ms: {e}")))?;
        }

        if let Ok(client_id) = std::env::var("ORCH_CLIENT_ID") {
            config.client_id = Some(client_id);
        }

        if let Ok(capacity) = std::env::var("ORCH_EVENT_CHANNEL_CAPACITY") {
            config.event_channel_capacity = capacity.parse().map_err(|e| {
                OrchError::Configuration(format!("Invalid event_channel_capacity: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Layered load: defaults, then the TOML file at `path` (or the optional
    /// `config/orch.toml`), then `ORCH_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())?;

        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let loaded: Self = config::Config::builder()
            .add_source(defaults)
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        debug!(config = ?loaded, "Loaded orchestration configuration");
        Ok(loaded)
    }

    /// Reject settings that would make the protocol unusable
    pub fn validate(&self) -> Result<()> {
        if self.protocol_version.trim().is_empty() {
            return Err(OrchError::Configuration(
                "protocol_version cannot be empty".to_string(),
            ));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(OrchError::Configuration(
                "rpc_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(OrchError::Configuration(
                "event_channel_capacity must be greater than zero".to_string(),
            ));
        }
        if let Some(client_id) = &self.client_id {
            if client_id.is_empty() {
                return Err(OrchError::Configuration(
                    "client_id cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn with_rpc(mut self, enabled: bool) -> Self {
        self.enable_rpc = enabled;
        self
    }

    pub fn with_automatic_flow(mut self, enabled: bool) -> Self {
        self.automatic_flow = enabled;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}
