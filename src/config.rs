//! Configuration management for Helios
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{HeliosError, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Powerwall gateway connection
    pub powerwall: PowerwallConfig,

    /// EVSE vendor account
    pub evse: EvseConfig,

    /// Vehicle SOC source selection and credentials
    pub vehicle: VehicleConfig,

    /// Charging decision parameters
    pub charging: ChargingConfig,

    /// Telemetry cache TTLs
    pub cache: CacheConfig,

    /// Geographic coordinates for sun-event computation
    pub location: LocationConfig,

    /// Daily schedule boundaries
    pub schedule: ScheduleConfig,

    /// Polling interval in seconds
    pub poll_interval_secs: u64,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Powerwall gateway connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerwallConfig {
    /// Hostname or IP of the local gateway
    pub host: String,

    /// Account email used by the gateway login
    pub user: String,

    /// Customer password
    pub password: String,
}

/// EVSE vendor account parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvseConfig {
    /// Account username
    pub user: String,

    /// Account password
    pub password: String,

    /// Path of the cached vendor token file
    pub token_file: String,
}

/// Which SOC source is authoritative for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SocSourceKind {
    /// Dedicated vehicle telemetry API (FordConnect)
    #[default]
    Primary,

    /// Charger vendor's vehicle endpoint
    Secondary,
}

/// Vehicle SOC source configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VehicleConfig {
    /// Source selection; the configured source is authoritative
    pub source: SocSourceKind,

    /// FordConnect credentials (required when source = primary)
    pub fordconnect: Option<FordConnectConfig>,
}

/// FordConnect API credentials
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FordConnectConfig {
    pub client_id: String,
    pub client_secret: String,

    /// Long-lived refresh token obtained out of band
    pub refresh_token: String,

    /// Specific vehicle ID; first listed vehicle when empty
    pub vehicle_id: String,

    /// Path of the cached vendor token file
    pub token_file: String,
}

/// Charging decision parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargingConfig {
    /// Fraction of excess power converted into charge current
    pub ratio: f64,

    /// SOC ceiling for grid charging, percent
    pub soc_ceiling: u32,

    /// Minimum charge rate in amperes
    pub min_rate: u32,

    /// Maximum charge rate in amperes
    pub max_rate: u32,

    /// Circuit voltage used for amp/watt conversion
    pub voltage: u32,

    /// Minimum dwell between charger relay transitions, seconds
    pub protection_interval_secs: u64,
}

/// Telemetry cache TTLs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Charger status cache TTL, seconds
    pub charger_ttl_secs: u64,

    /// Vehicle SOC refresh interval, seconds (vendor rate limits)
    pub soc_refresh_secs: u64,
}

/// Geographic coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
}

/// Daily schedule boundaries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// IANA timezone name for local boundaries
    pub timezone: String,

    /// Utility peak-hour start, HH:MM local
    pub peak_start: String,

    /// Stop boundary: "sunset" or an explicit HH:MM local time
    pub stop_time: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file or directory
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for PowerwallConfig {
    fn default() -> Self {
        Self {
            host: "powerwall.local".to_string(),
            user: String::new(),
            password: String::new(),
        }
    }
}

impl Default for EvseConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            token_file: "/data/helios_evse_tokens.json".to_string(),
        }
    }
}

impl Default for ChargingConfig {
    fn default() -> Self {
        Self {
            ratio: 0.98,
            soc_ceiling: 60,
            min_rate: 6,
            max_rate: 40,
            voltage: 240,
            protection_interval_secs: 300,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            charger_ttl_secs: 60,
            soc_refresh_secs: 300,
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: 37.32,
            longitude: -122.03,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: "America/Los_Angeles".to_string(),
            peak_start: "15:00".to_string(),
            stop_time: "sunset".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/helios.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            powerwall: PowerwallConfig::default(),
            evse: EvseConfig::default(),
            vehicle: VehicleConfig::default(),
            charging: ChargingConfig::default(),
            cache: CacheConfig::default(),
            location: LocationConfig::default(),
            schedule: ScheduleConfig::default(),
            poll_interval_secs: 15,
            logging: LoggingConfig::default(),
        }
    }
}

impl ScheduleConfig {
    /// Parse the configured peak-hour start
    pub fn peak_start_time(&self) -> Result<NaiveTime> {
        parse_hhmm("schedule.peak_start", &self.peak_start)
    }

    /// Parse the configured stop boundary; `None` means sunset
    pub fn stop_time_override(&self) -> Result<Option<NaiveTime>> {
        if self.stop_time.eq_ignore_ascii_case("sunset") {
            return Ok(None);
        }
        parse_hhmm("schedule.stop_time", &self.stop_time).map(Some)
    }
}

fn parse_hhmm(field: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| HeliosError::validation(field, &format!("{}: {}", value, e)))
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("HELIOS_CONFIG") {
            return Self::from_file(path);
        }

        let default_paths = [
            "helios.yaml",
            "/data/helios.yaml",
            "/etc/helios/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.charging.ratio > 0.0 && self.charging.ratio <= 1.0) {
            return Err(HeliosError::validation(
                "charging.ratio",
                "Must be in (0, 1]",
            ));
        }

        if self.charging.min_rate == 0 || self.charging.min_rate > self.charging.max_rate {
            return Err(HeliosError::validation(
                "charging.min_rate",
                "Must be positive and not exceed max_rate",
            ));
        }

        if self.charging.max_rate > 80 {
            return Err(HeliosError::validation(
                "charging.max_rate",
                "Must not exceed 80 A",
            ));
        }

        if self.charging.voltage == 0 {
            return Err(HeliosError::validation(
                "charging.voltage",
                "Must be greater than 0",
            ));
        }

        if self.charging.soc_ceiling > 100 {
            return Err(HeliosError::validation(
                "charging.soc_ceiling",
                "Must be a percentage",
            ));
        }

        if self.location.latitude.abs() > 90.0 {
            return Err(HeliosError::validation(
                "location.latitude",
                "Must be within [-90, 90]",
            ));
        }

        if self.location.longitude.abs() > 180.0 {
            return Err(HeliosError::validation(
                "location.longitude",
                "Must be within [-180, 180]",
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(HeliosError::validation(
                "poll_interval_secs",
                "Must be greater than 0",
            ));
        }

        if self.schedule.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(HeliosError::validation(
                "schedule.timezone",
                "Unknown IANA timezone",
            ));
        }

        self.schedule.peak_start_time()?;
        self.schedule.stop_time_override()?;

        if self.vehicle.source == SocSourceKind::Primary && self.vehicle.fordconnect.is_none() {
            return Err(HeliosError::validation(
                "vehicle.fordconnect",
                "Required when vehicle.source = primary",
            ));
        }

        Ok(())
    }
}
