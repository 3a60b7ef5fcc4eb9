//! Configuration system for fanout.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $FANOUT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/fanout/config.toml
//!   3. ~/.config/fanout/config.toml
//!
//! Window and packet sizing are protocol constants in `wire`, not
//! configuration; every peer must agree on them at compile time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{MULTICAST_GROUP, MULTICAST_PORT};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    pub network: NetworkConfig,
    pub repair: RepairConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// IPv4 multicast group for the data channel.
    pub multicast_group: String,
    /// UDP port for the data channel.
    pub multicast_port: u16,
    /// Address the sender binds its TCP control listener to.
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// How long a receiver waits for a NACKed packet before re-sending
    /// the NACK.
    pub timeout_ms: u64,
    /// Repair rounds with no full window before the peer is declared
    /// lost. 0 = retry forever.
    pub max_rounds: u32,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            repair: RepairConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            multicast_group: MULTICAST_GROUP.to_string(),
            multicast_port: MULTICAST_PORT,
            bind_addr: "0.0.0.0".to_string(),
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            max_rounds: 100,
        }
    }
}

impl RepairConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("fanout")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl FanoutConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            FanoutConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("FANOUT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply FANOUT_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FANOUT_NETWORK__MULTICAST_GROUP") {
            self.network.multicast_group = v;
        }
        if let Ok(v) = std::env::var("FANOUT_NETWORK__MULTICAST_PORT") {
            if let Ok(p) = v.parse() {
                self.network.multicast_port = p;
            }
        }
        if let Ok(v) = std::env::var("FANOUT_NETWORK__BIND_ADDR") {
            self.network.bind_addr = v;
        }
        if let Ok(v) = std::env::var("FANOUT_REPAIR__TIMEOUT_MS") {
            if let Ok(t) = v.parse() {
                self.repair.timeout_ms = t;
            }
        }
        if let Ok(v) = std::env::var("FANOUT_REPAIR__MAX_ROUNDS") {
            if let Ok(r) = v.parse() {
                self.repair.max_rounds = r;
            }
        }
    }
}
