//! Telemetry data model for Sunward
//!
//! Immutable per-cycle snapshots of the home energy system and the vehicle,
//! plus the single piece of state carried across cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One cycle's view of the home energy system
#[derive(Debug, Clone, PartialEq)]
pub struct HomeSnapshot {
    /// When the readings were taken
    pub timestamp: DateTime<Utc>,

    /// Home battery state of charge, 0-100
    pub battery_percent: f64,

    /// Home battery power flow in W, negative = charging the battery
    pub battery_power_w: f64,

    /// Home battery voltage in V
    pub battery_voltage: f64,

    /// House load demand in W
    pub load_w: f64,

    /// Solar generation in W, sum of all PV strings
    pub solar_w: f64,

    /// Grid export power in W, positive = exporting
    pub grid_export_w: f64,
}

impl HomeSnapshot {
    /// Power available beyond what the home battery is already absorbing.
    ///
    /// Derived on every call rather than stored, so it can never go stale
    /// relative to the readings it came from.
    pub fn spare_power_w(&self) -> f64 {
        self.grid_export_w - self.battery_power_w
    }
}

/// Vehicle charging state as reported by the vendor API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingState {
    /// Cable plugged in but the charger itself is unpowered
    NoPower,
    /// No cable connected
    Disconnected,
    /// Actively charging
    Charging,
    /// Reached its charge limit
    Complete,
    /// Session stopped (by the vehicle, the app, or us)
    Stopped,
    /// Anything the API reports that we do not model
    Other,
}

impl ChargingState {
    /// Map a wire tag onto a state; unknown tags degrade to `Other`
    /// rather than failing the cycle.
    pub fn from_label(s: &str) -> Self {
        match s {
            "NoPower" => Self::NoPower,
            "Disconnected" => Self::Disconnected,
            "Charging" => Self::Charging,
            "Complete" => Self::Complete,
            "Stopped" => Self::Stopped,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoPower => "NoPower",
            Self::Disconnected => "Disconnected",
            Self::Charging => "Charging",
            Self::Complete => "Complete",
            Self::Stopped => "Stopped",
            Self::Other => "Other",
        }
    }
}

/// A coordinate pair in raw degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

/// One cycle's view of the vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    /// Display name reported by the API
    pub display_name: String,

    /// Vehicle battery state of charge, 0-100
    pub battery_percent: f64,

    /// Current charging state
    pub charging_state: ChargingState,

    /// Last reported position; absent when the vehicle reports no
    /// drive state (asleep, or the summary endpoint was used)
    pub location: Option<LatLon>,
}

/// The cheap per-cycle vehicle reading
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSummary {
    /// Display name reported by the API
    pub display_name: String,

    /// Whether the vehicle is awake and reachable
    pub online: bool,

    /// Vehicle battery state of charge, 0-100
    pub battery_percent: f64,

    /// Current charging state
    pub charging_state: ChargingState,
}

impl VehicleSummary {
    /// Promote a summary to a full snapshot, carrying a location obtained
    /// elsewhere (typically the previous full refresh).
    pub fn into_snapshot(self, location: Option<LatLon>) -> VehicleSnapshot {
        VehicleSnapshot {
            display_name: self.display_name,
            battery_percent: self.battery_percent,
            charging_state: self.charging_state,
            location,
        }
    }
}

/// State carried from one cycle to the next.
///
/// Owned by the decision state machine: every cycle consumes the previous
/// value and produces a successor, and nothing else writes to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    /// Whether this process is currently driving the vehicle's charge session
    pub managed: bool,

    /// Managed charging current setpoint in amps, within the configured bounds
    pub amps: u32,

    /// Last presence verdict from a cycle that actually had a location
    pub last_home: bool,
}

impl ControlState {
    /// Initial state before the first cycle
    pub fn new(initial_amps: u32) -> Self {
        Self {
            managed: false,
            amps: initial_amps,
            last_home: false,
        }
    }
}
