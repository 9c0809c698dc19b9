//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KIRANA_SHOP_ID=shop-42                                             │
//! │     KIRANA_GATEWAY_URL=wss://sync.example.com/ws                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/kirana-pos/sync.toml (Linux)                             │
//! │     ~/Library/Application Support/com.kirana.pos/sync.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated device id, no gateway (offline-only)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Counter 1"
//!
//! [shop]
//! id = "shop-42"
//! name = "Sri Ganesh Stores"
//!
//! [sync]
//! gateway_url = "wss://sync.example.com/ws"
//! recent_bills_cap = 500
//! max_attempts = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name (e.g., "Counter 1", "Back Office").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Register".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Shop Configuration
// =============================================================================

/// Configuration for the shop this device belongs to.
///
/// The shop id is supplied by the auth/session layer after login; an empty
/// id here just means "not logged in yet" and the engine refuses to start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopConfig {
    /// Tenant partition key for every query and document.
    #[serde(default)]
    pub id: String,

    /// Human-readable shop name.
    #[serde(default)]
    pub name: String,
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// WebSocket URL of the remote document gateway.
    /// None = offline-only operation (mutations queue up locally).
    #[serde(default)]
    pub gateway_url: Option<String>,

    /// How many recent bills a bulk resync pulls down.
    #[serde(default = "default_recent_bills_cap")]
    pub recent_bills_cap: u32,

    /// Delivery attempts before a mutation is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Per-request timeout against the gateway (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Initial backoff duration (milliseconds) for reconnection.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds) for reconnection.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Ping keepalive interval (seconds).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

fn default_recent_bills_cap() -> u32 {
    500
}
fn default_max_attempts() -> i64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_ping_interval() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            gateway_url: None,
            recent_bills_cap: default_recent_bills_cap(),
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            ping_interval_secs: default_ping_interval(),
        }
    }
}

impl SyncSettings {
    /// Per-request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device-specific configuration.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Shop configuration.
    #[serde(default)]
    pub shop: ShopConfig,

    /// Sync behavior settings.
    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.is_empty() {
            return Err(SyncError::InvalidConfig("device id must not be empty".into()));
        }

        if let Some(ref url) = self.sync.gateway_url {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(SyncError::InvalidUrl(format!(
                    "Gateway URL must start with ws:// or wss://, got: {}",
                    url
                )));
            }
        }

        if self.sync.max_attempts <= 0 {
            return Err(SyncError::InvalidConfig(
                "max_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("KIRANA_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("KIRANA_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Ok(id) = std::env::var("KIRANA_SHOP_ID") {
            debug!(shop_id = %id, "Overriding shop ID from environment");
            self.shop.id = id;
        }

        if let Ok(url) = std::env::var("KIRANA_GATEWAY_URL") {
            debug!(url = %url, "Overriding gateway URL from environment");
            self.sync.gateway_url = Some(url);
        }

        if let Ok(cap) = std::env::var("KIRANA_RECENT_BILLS_CAP") {
            if let Ok(n) = cap.parse::<u32>() {
                self.sync.recent_bills_cap = n;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "kirana", "pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Returns the shop ID.
    pub fn shop_id(&self) -> &str {
        &self.shop.id
    }

    /// Returns the gateway URL if configured.
    pub fn gateway_url(&self) -> Option<&str> {
        self.sync.gateway_url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.device.id.is_empty()); // Auto-generated
        assert_eq!(config.sync.recent_bills_cap, 500);
        assert_eq!(config.sync.max_attempts, 10);
        assert!(config.sync.gateway_url.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        // Empty device ID should fail
        config.device.id = String::new();
        assert!(config.validate().is_err());

        // Invalid URL should fail
        config.device.id = "test".to_string();
        config.sync.gateway_url = Some("http://invalid".to_string());
        assert!(config.validate().is_err());

        // Valid WebSocket URL should pass
        config.sync.gateway_url = Some("wss://sync.example.com/ws".to_string());
        assert!(config.validate().is_ok());

        // Zero attempts budget should fail
        config.sync.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[sync]"));
    }
}
