// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::views::Role;
use crate::zones::{ZoneBoundaries, ZoneRange};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name, shown in the startup banner
    pub app_name: String,

    /// Log level
    pub log_level: String,

    /// Enable demo mode (simulated players)
    pub demo_mode: bool,

    /// Role used when the session has none
    pub role: Role,

    /// Session clock configuration
    pub session: SessionConfig,

    /// Roster storage configuration
    pub storage: StorageConfig,

    /// Default heart-rate zones
    pub zones: ZoneConfig,

    /// Roster display configuration
    pub roster: RosterConfig,

    /// Device configuration
    pub devices: DeviceConfig,

    /// Event bus configuration
    pub events: EventConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "SquadPulse".to_string(),
            log_level: "info".to_string(),
            demo_mode: false,
            role: Role::Coach,
            session: SessionConfig::default(),
            storage: StorageConfig::default(),
            zones: ZoneConfig::default(),
            roster: RosterConfig::default(),
            devices: DeviceConfig::default(),
            events: EventConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("squadpulse"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Keep the roster database under `data_dir`
    pub fn relocate_data(&mut self, data_dir: &Path) {
        self.storage.path = data_dir.join("squadpulse.db");
    }
}

/// Session clock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Tick period in milliseconds. Each tick credits one second.
    pub tick_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// Roster storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Database path
    pub path: PathBuf,

    /// Key the roster snapshot is stored under
    pub roster_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("./data/squadpulse.db"),
            roster_key: "players".to_string(),
        }
    }
}

/// Zones given to athletes added without their own
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub z1: ZoneRange,
    pub z2: ZoneRange,
    pub z3: ZoneRange,
    pub z4: ZoneRange,
}

impl ZoneConfig {
    pub fn boundaries(&self) -> ZoneBoundaries {
        ZoneBoundaries {
            z1: self.z1,
            z2: self.z2,
            z3: self.z3,
            z4: self.z4,
        }
    }
}

impl Default for ZoneConfig {
    fn default() -> Self {
        let defaults = ZoneBoundaries::default();
        Self {
            z1: defaults.z1,
            z2: defaults.z2,
            z3: defaults.z3,
            z4: defaults.z4,
        }
    }
}

/// Roster display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// Max HR for percent-of-max when an athlete has none
    pub default_max_hr: u16,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self { default_max_hr: 190 }
    }
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Use simulated straps instead of a Bluetooth adapter
    pub simulated: bool,

    /// Interval between simulated samples
    pub sample_interval_ms: u64,

    pub resting_bpm: f64,

    pub peak_bpm: f64,

    /// Standard deviation of the simulated noise
    pub noise_bpm: f64,

    /// Length of one simulated rest/effort cycle
    pub cycle_secs: u64,

    /// How long a live pairing scans for a strap
    pub scan_window_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            simulated: true,
            sample_interval_ms: 1000,
            resting_bpm: 75.0,
            peak_bpm: 175.0,
            noise_bpm: 3.0,
            cycle_secs: 240,
            scan_window_ms: 5000,
        }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Broadcast channel capacity
    pub capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}
