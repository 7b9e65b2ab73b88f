//! Configuration management for Sunward
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{Result, SunwardError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Inverter Modbus TCP connection configuration
    pub inverter: InverterConfig,

    /// Vehicle API configuration
    pub vehicle: VehicleConfig,

    /// Daily charging window
    pub window: WindowConfig,

    /// Home battery and vehicle state-of-charge thresholds
    pub thresholds: ThresholdsConfig,

    /// Managed charging current limits
    pub charging: ChargingConfig,

    /// Poll cadence while managing vs. idle
    pub polling: PollingConfig,

    /// Home coordinates and presence tolerance
    pub home: HomeLocationConfig,

    /// Bounded retry policy for collaborator calls
    pub retry: RetryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Timezone used to evaluate the charging window
    pub timezone: String,
}

/// Inverter Modbus TCP connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterConfig {
    /// IP address of the inverter
    pub host: String,

    /// TCP port (typically 502)
    pub port: u16,

    /// Modbus unit/slave ID
    pub unit_id: u8,

    /// Input register addresses
    pub registers: RegisterMap,
}

/// Inverter input register addresses
///
/// Addresses are absolute; the whole block `[input_base, input_base + input_count)`
/// is read in one request per cycle and fields are decoded at their offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterMap {
    /// First register of the telemetry block
    pub input_base: u16,

    /// Number of registers in the telemetry block
    pub input_count: u16,

    /// Battery state of charge (percent)
    pub battery_percent: u16,

    /// Battery power flow (signed W, negative = charging)
    pub battery_power: u16,

    /// Battery voltage (centivolts)
    pub battery_voltage: u16,

    /// House load demand (W)
    pub load_demand: u16,

    /// PV string 1 power (W)
    pub pv1_power: u16,

    /// PV string 2 power (W)
    pub pv2_power: u16,

    /// Grid export power (signed W, positive = exporting)
    pub grid_export: u16,
}

/// Vehicle API connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// API base URL
    pub base_url: String,

    /// OAuth bearer token
    pub access_token: String,

    /// Vehicle identifier used in API paths
    pub vehicle_id: u64,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// Max summary polls while waiting for the vehicle to wake
    pub wake_attempts: u32,

    /// Delay between wake polls in seconds
    pub wake_delay_seconds: u64,
}

/// Daily charging window, hours in the configured timezone
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// First hour of the window (inclusive)
    pub start_hour: u32,

    /// End hour of the window (exclusive)
    pub stop_hour: u32,
}

/// Hysteresis thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// Home battery percentage above which surplus charging may start
    pub home_battery_high: f64,

    /// Home battery percentage below which managed charging stops
    pub home_battery_low: f64,

    /// Charge limit set on the vehicle when a managed session starts
    pub vehicle_soc_cap: u32,
}

/// Managed charging current limits, integer amps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargingConfig {
    /// Lowest current the ramp may set
    pub min_amps: u32,

    /// Highest current the ramp may set
    pub max_amps: u32,

    /// Setpoint used when a managed session starts
    pub initial_amps: u32,

    /// Current handed back to the vehicle's own charge manager on stop/release
    pub default_amps: u32,
}

/// Poll cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Sleep between cycles while a session is managed
    pub short_seconds: u64,

    /// Sleep between cycles while idle
    pub long_seconds: u64,
}

/// Home coordinates and presence tolerance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeLocationConfig {
    /// Home latitude in degrees
    pub latitude: f64,

    /// Home longitude in degrees
    pub longitude: f64,

    /// L1 distance in raw degrees below which the vehicle counts as home
    pub tolerance_deg: f64,
}

/// Bounded retry policy for collaborator calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Max attempts per operation
    pub max_attempts: u32,

    /// Delay between attempts in seconds
    pub delay_seconds: f64,
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

impl Default for InverterConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.141".to_string(),
            port: 502,
            unit_id: 1,
            registers: RegisterMap::default(),
        }
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            input_base: 1000,
            input_count: 40,
            battery_percent: 1014,
            battery_power: 1021,
            battery_voltage: 1020,
            load_demand: 1028,
            pv1_power: 1010,
            pv2_power: 1011,
            grid_export: 1030,
        }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://owner-api.teslamotors.com".to_string(),
            access_token: String::new(),
            vehicle_id: 0,
            timeout_seconds: 15,
            wake_attempts: 12,
            wake_delay_seconds: 5,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start_hour: 10,
            stop_hour: 18,
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            home_battery_high: 97.0,
            home_battery_low: 87.0,
            vehicle_soc_cap: 90,
        }
    }
}

impl Default for ChargingConfig {
    fn default() -> Self {
        Self {
            min_amps: 5,
            max_amps: 32,
            initial_amps: 8,
            default_amps: 64,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            short_seconds: 60,
            long_seconds: 300,
        }
    }
}

impl Default for HomeLocationConfig {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            tolerance_deg: 0.01,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_seconds: 0.5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/var/log/sunward".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "sunward_config.yaml",
            "/data/sunward_config.yaml",
            "/etc/sunward/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
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
        if self.inverter.host.is_empty() {
            return Err(SunwardError::validation(
                "inverter.host",
                "Host cannot be empty",
            ));
        }
        if self.inverter.port == 0 {
            return Err(SunwardError::validation(
                "inverter.port",
                "Port must be greater than 0",
            ));
        }
        self.inverter.registers.validate()?;

        if self.vehicle.base_url.is_empty() {
            return Err(SunwardError::validation(
                "vehicle.base_url",
                "Base URL cannot be empty",
            ));
        }
        if self.vehicle.timeout_seconds == 0 {
            return Err(SunwardError::validation(
                "vehicle.timeout_seconds",
                "Must be greater than 0",
            ));
        }

        if self.window.start_hour > 23 || self.window.stop_hour > 24 {
            return Err(SunwardError::validation(
                "window",
                "Hours must be within a day",
            ));
        }
        if self.window.start_hour >= self.window.stop_hour {
            return Err(SunwardError::validation(
                "window",
                "start_hour must be before stop_hour",
            ));
        }

        if !(0.0..=100.0).contains(&self.thresholds.home_battery_high)
            || !(0.0..=100.0).contains(&self.thresholds.home_battery_low)
        {
            return Err(SunwardError::validation(
                "thresholds",
                "Battery thresholds must be percentages",
            ));
        }
        if self.thresholds.home_battery_low >= self.thresholds.home_battery_high {
            return Err(SunwardError::validation(
                "thresholds",
                "home_battery_low must be below home_battery_high",
            ));
        }
        if self.thresholds.vehicle_soc_cap == 0 || self.thresholds.vehicle_soc_cap > 100 {
            return Err(SunwardError::validation(
                "thresholds.vehicle_soc_cap",
                "Must be in 1..=100",
            ));
        }

        if self.charging.min_amps == 0 {
            return Err(SunwardError::validation(
                "charging.min_amps",
                "Must be at least 1",
            ));
        }
        if self.charging.min_amps > self.charging.max_amps {
            return Err(SunwardError::validation(
                "charging",
                "min_amps must not exceed max_amps",
            ));
        }
        if self.charging.initial_amps < self.charging.min_amps
            || self.charging.initial_amps > self.charging.max_amps
        {
            return Err(SunwardError::validation(
                "charging.initial_amps",
                "Must be within [min_amps, max_amps]",
            ));
        }
        if self.charging.default_amps == 0 {
            return Err(SunwardError::validation(
                "charging.default_amps",
                "Must be at least 1",
            ));
        }

        if self.polling.short_seconds == 0 || self.polling.long_seconds == 0 {
            return Err(SunwardError::validation(
                "polling",
                "Poll intervals must be greater than 0",
            ));
        }

        if self.home.tolerance_deg <= 0.0 {
            return Err(SunwardError::validation(
                "home.tolerance_deg",
                "Must be positive",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(SunwardError::validation(
                "retry.max_attempts",
                "Must be at least 1",
            ));
        }

        if self.timezone().is_none() {
            return Err(SunwardError::validation(
                "timezone",
                "Not a recognized IANA timezone",
            ));
        }

        Ok(())
    }

    /// The configured timezone, if it parses
    pub fn timezone(&self) -> Option<chrono_tz::Tz> {
        let name = if self.timezone.is_empty() {
            "UTC"
        } else {
            self.timezone.as_str()
        };
        name.parse().ok()
    }
}

impl RegisterMap {
    /// Check that every field address falls inside the read block
    pub fn validate(&self) -> Result<()> {
        let end = self.input_base.saturating_add(self.input_count);
        for (name, addr) in [
            ("battery_percent", self.battery_percent),
            ("battery_power", self.battery_power),
            ("battery_voltage", self.battery_voltage),
            ("load_demand", self.load_demand),
            ("pv1_power", self.pv1_power),
            ("pv2_power", self.pv2_power),
            ("grid_export", self.grid_export),
        ] {
            if addr < self.input_base || addr >= end {
                return Err(SunwardError::validation(
                    format!("inverter.registers.{}", name),
                    format!("Address {} outside block {}..{}", addr, self.input_base, end),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.inverter.port, 502);
        assert_eq!(config.window.start_hour, 10);
        assert_eq!(config.window.stop_hour, 18);
        assert_eq!(config.charging.initial_amps, 8);
        assert_eq!(config.polling.short_seconds, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.inverter.host = String::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.window.start_hour = 18;
        config.window.stop_hour = 10;
        assert!(config.validate().is_err());

        config = Config::default();
        config.thresholds.home_battery_low = 99.0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.charging.initial_amps = 40;
        assert!(config.validate().is_err());

        config = Config::default();
        config.timezone = "Mars/Olympus_Mons".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_register_map_bounds() {
        let mut map = RegisterMap::default();
        assert!(map.validate().is_ok());
        map.grid_export = map.input_base + map.input_count;
        assert!(map.validate().is_err());
    }

    #[test]
    fn test_timezone_parsing() {
        let mut config = Config::default();
        assert_eq!(config.timezone(), Some(chrono_tz::UTC));
        config.timezone = "Europe/London".to_string();
        assert_eq!(config.timezone(), Some(chrono_tz::Europe::London));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.inverter.port, deserialized.inverter.port);
        assert_eq!(config.charging.max_amps, deserialized.charging.max_amps);
    }
}
