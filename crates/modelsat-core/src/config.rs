//! Persistent mission configuration
//!
//! Stored as a JSON file. Every field has a default so a partial file
//! (or no file at all) still yields a usable configuration.

use crate::error::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_base_dir() -> PathBuf {
    PathBuf::from("blackbox")
}

fn default_record_file() -> String {
    "packet_count.txt".to_string()
}

fn default_csv_file() -> String {
    "telemetry.csv".to_string()
}

fn default_backup_dir() -> String {
    "backup".to_string()
}

fn default_log_file() -> String {
    "telemetry.log".to_string()
}

fn default_cycle_interval_ms() -> u64 {
    1000
}

fn default_producer_interval_ms() -> u64 {
    200
}

fn default_recovery_window_secs() -> u64 {
    crate::DEFAULT_RECOVERY_WINDOW_SECS
}

fn default_mission_id() -> u32 {
    crate::DEFAULT_MISSION_ID
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9003
}

/// Network settings for the data and command channels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

/// Mission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionConfig {
    /// Directory holding the record file, CSV log, backups, and log file
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_record_file")]
    pub record_file: String,
    #[serde(default = "default_csv_file")]
    pub csv_file: String,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    /// Delay between telemetry cycles
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
    /// Delay between producer samples
    #[serde(default = "default_producer_interval_ms")]
    pub producer_interval_ms: u64,
    #[serde(default = "default_recovery_window_secs")]
    pub recovery_window_secs: u64,
    #[serde(default = "default_mission_id")]
    pub mission_id: u32,
    /// Use simulated producers instead of hardware sources
    #[serde(default)]
    pub simulate: bool,
    /// Line source for the navigation board (None = no hardware source)
    #[serde(default)]
    pub serial_device: Option<PathBuf>,
    /// Re-evaluate the altitude difference alarm every cycle instead of latching it
    #[serde(default)]
    pub recheck_altitude_difference: bool,
    #[serde(default)]
    pub server: ServerSettings,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            record_file: default_record_file(),
            csv_file: default_csv_file(),
            backup_dir: default_backup_dir(),
            log_file: default_log_file(),
            cycle_interval_ms: default_cycle_interval_ms(),
            producer_interval_ms: default_producer_interval_ms(),
            recovery_window_secs: default_recovery_window_secs(),
            mission_id: default_mission_id(),
            simulate: false,
            serial_device: None,
            recheck_altitude_difference: false,
            server: ServerSettings::default(),
        }
    }
}

impl MissionConfig {
    /// Load config from disk, falling back to defaults on any error
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TelemetryError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| TelemetryError::io(path, e))?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Reject settings the cycle cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cycle_interval_ms == 0 {
            return Err(TelemetryError::InvalidConfig(
                "cycle_interval_ms must be positive".into(),
            ));
        }
        if self.record_file.is_empty() || self.csv_file.is_empty() {
            return Err(TelemetryError::InvalidConfig(
                "record_file and csv_file must be named".into(),
            ));
        }
        Ok(())
    }

    pub fn record_path(&self) -> PathBuf {
        self.base_dir.join(&self.record_file)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.base_dir.join(&self.csv_file)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.base_dir.join(&self.backup_dir)
    }

    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join(&self.log_file)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn producer_interval(&self) -> Duration {
        Duration::from_millis(self.producer_interval_ms)
    }

    pub fn recovery_window(&self) -> Duration {
        Duration::from_secs(self.recovery_window_secs)
    }
}
