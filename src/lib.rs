//! # Sunward - Surplus-solar EV charging supervisor
//!
//! Sunward balances a stationary home battery against an EV's onboard
//! battery: once per polling cycle it reads the home energy system and the
//! vehicle, then decides whether the vehicle should be charging and at what
//! current, so the car charges preferentially from exported solar power
//! rather than from the grid.
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of
//! concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `telemetry`: Immutable per-cycle snapshots and the control state
//! - `signals`: Derived hysteresis signals and the presence check
//! - `controls`: The charge decision state machine, ramp, gatekeeper and
//!   polling scheduler
//! - `inverter`: Modbus TCP telemetry from the hybrid inverter
//! - `vehicle`: Vehicle vendor API integration
//! - `supervisor`: The poll-decide-act-sleep loop

pub mod config;
pub mod controls;
pub mod error;
pub mod inverter;
pub mod logging;
pub mod signals;
pub mod supervisor;
pub mod telemetry;
pub mod vehicle;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SunwardError};
pub use supervisor::ChargeSupervisor;
