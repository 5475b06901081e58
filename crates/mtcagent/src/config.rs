// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Agent configuration - single source of truth.
//!
//! Level 1: compile-time constants (ports, buffer capacities, backoff bounds).
//! **NEVER hardcode these elsewhere!**
//!
//! Level 2: `AgentConfig`, loaded from a TOML file or built programmatically.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

// =======================================================================
// Constants
// =======================================================================

/// Default HTTP listener port for MTConnect requests.
pub const DEFAULT_HTTP_PORT: u16 = 7000;

/// Default observation ring capacity (spec default: 10,000 observations).
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Default asset snapshot ring capacity.
pub const DEFAULT_ASSET_CAPACITY: usize = 1_024;

/// Default `count` for `/sample` when the client omits it.
pub const DEFAULT_SAMPLE_COUNT: usize = 100;

/// Initial adapter reconnect backoff.
pub const BACKOFF_INITIAL_MS: u64 = 100;

/// Reconnect backoff ceiling.
pub const BACKOFF_MAX_MS: u64 = 30_000;

/// MTConnect schema versions the agent accepts in device XML.
pub const SUPPORTED_SCHEMA_VERSIONS: [&str; 3] = ["1.1", "1.2", "1.3"];

/// MTConnect version advertised in response headers.
pub const MTCONNECT_VERSION: &str = "1.3";

// =======================================================================
// Configuration errors
// =======================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =======================================================================
// AgentConfig
// =======================================================================

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Sender name reported in MTConnect response headers.
    #[serde(default = "default_sender")]
    pub sender: String,

    /// HTTP bind address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// HTTP listener port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Observation ring capacity.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Asset snapshot ring capacity.
    #[serde(default = "default_asset_capacity")]
    pub asset_capacity: usize,

    /// External XSD validator command. Invoked as `<validator> <xml-file>`;
    /// a non-zero exit rejects the device. `None` skips the external check.
    #[serde(default)]
    pub validator: Option<String>,

    /// Devices served by this agent.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// One device entry: schema source plus its adapter endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Path to the pre-parsed device schema JSON.
    pub schema: PathBuf,

    /// Optional device XML checked against the XSD validator before ingest.
    #[serde(default)]
    pub xml: Option<PathBuf>,

    /// SHDR adapter endpoint for this device.
    #[serde(default)]
    pub adapter: Option<AdapterConfig>,
}

/// SHDR adapter connection info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub host: String,
    pub port: u16,
}

fn default_sender() -> String {
    "mtcagent".to_string()
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_asset_capacity() -> usize {
    DEFAULT_ASSET_CAPACITY
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            sender: default_sender(),
            bind: default_bind(),
            port: DEFAULT_HTTP_PORT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            asset_capacity: DEFAULT_ASSET_CAPACITY,
            validator: None,
            devices: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer_capacity must be non-zero".into(),
            ));
        }
        if self.asset_capacity == 0 {
            return Err(ConfigError::Invalid(
                "asset_capacity must be non-zero".into(),
            ));
        }
        if self.devices.is_empty() {
            return Err(ConfigError::Invalid("no devices configured".into()));
        }
        Ok(())
    }
}
