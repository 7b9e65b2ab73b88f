//! Derived hysteresis signals and the presence check
//!
//! Pure functions from the latest home snapshot and configuration to the
//! boolean signals the decision state machine consumes. Nothing here touches
//! the network or mutates state.

use crate::config::Config;
use crate::error::{Result, SunwardError};
use crate::telemetry::{HomeSnapshot, LatLon};
use chrono::{Timelike, Utc};

/// Boolean signals derived from one home snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdSignals {
    /// The home battery is absorbing power
    pub battery_charging: bool,

    /// Home battery at or above the high threshold
    pub battery_over_threshold: bool,

    /// Home battery at or below the low threshold
    pub battery_under_threshold: bool,

    /// The current hour falls inside the charging window
    pub in_window: bool,
}

/// Derive the hysteresis signals for one cycle.
///
/// Readings exactly at a threshold count as crossed; strictly between the two
/// thresholds neither signal asserts, which is the dead band that stops the
/// decision machine from chattering at the boundary.
pub fn evaluate(home: &HomeSnapshot, config: &Config, hour: u32) -> Result<ThresholdSignals> {
    if !home.battery_percent.is_finite() {
        return Err(SunwardError::validation(
            "battery_percent",
            "non-finite reading",
        ));
    }
    if !home.battery_power_w.is_finite() {
        return Err(SunwardError::validation(
            "battery_power_w",
            "non-finite reading",
        ));
    }

    let thresholds = &config.thresholds;
    Ok(ThresholdSignals {
        battery_charging: home.battery_power_w < 0.0,
        battery_over_threshold: home.battery_percent >= thresholds.home_battery_high,
        battery_under_threshold: home.battery_percent <= thresholds.home_battery_low,
        in_window: config.window.start_hour <= hour && hour < config.window.stop_hour,
    })
}

/// Coarse presence test: L1 distance in raw coordinate degrees.
///
/// Not geodesic. At neighborhood scale the error against a proper
/// distance is irrelevant, and it costs two subtractions.
pub fn is_at_home(location: &LatLon, config: &Config) -> bool {
    let home = &config.home;
    let distance = (location.latitude - home.latitude).abs()
        + (location.longitude - home.longitude).abs();
    distance < home.tolerance_deg
}

/// Current wall-clock hour in the configured timezone
pub fn local_hour(config: &Config) -> Result<u32> {
    let tz = config
        .timezone()
        .ok_or_else(|| SunwardError::config(format!("Invalid timezone: {}", config.timezone)))?;
    Ok(Utc::now().with_timezone(&tz).hour())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(percent: f64, battery_power: f64) -> HomeSnapshot {
        HomeSnapshot {
            timestamp: Utc::now(),
            battery_percent: percent,
            battery_power_w: battery_power,
            battery_voltage: 51.0,
            load_w: 300.0,
            solar_w: 2000.0,
            grid_export_w: 800.0,
        }
    }

    #[test]
    fn thresholds_form_a_dead_band() {
        let config = Config::default(); // high 97, low 87

        let sig = evaluate(&snapshot(98.0, 0.0), &config, 12).unwrap();
        assert!(sig.battery_over_threshold);
        assert!(!sig.battery_under_threshold);

        let sig = evaluate(&snapshot(92.0, 0.0), &config, 12).unwrap();
        assert!(!sig.battery_over_threshold);
        assert!(!sig.battery_under_threshold);

        let sig = evaluate(&snapshot(80.0, 0.0), &config, 12).unwrap();
        assert!(!sig.battery_over_threshold);
        assert!(sig.battery_under_threshold);
    }

    #[test]
    fn readings_exactly_at_thresholds_count_as_crossed() {
        let config = Config::default();
        let sig = evaluate(&snapshot(97.0, 0.0), &config, 12).unwrap();
        assert!(sig.battery_over_threshold);
        let sig = evaluate(&snapshot(87.0, 0.0), &config, 12).unwrap();
        assert!(sig.battery_under_threshold);
    }

    #[test]
    fn battery_charging_follows_power_sign() {
        let config = Config::default();
        assert!(evaluate(&snapshot(50.0, -250.0), &config, 12).unwrap().battery_charging);
        assert!(!evaluate(&snapshot(50.0, 0.0), &config, 12).unwrap().battery_charging);
        assert!(!evaluate(&snapshot(50.0, 400.0), &config, 12).unwrap().battery_charging);
    }

    #[test]
    fn window_is_half_open() {
        let config = Config::default(); // 10..18
        assert!(!evaluate(&snapshot(50.0, 0.0), &config, 9).unwrap().in_window);
        assert!(evaluate(&snapshot(50.0, 0.0), &config, 10).unwrap().in_window);
        assert!(evaluate(&snapshot(50.0, 0.0), &config, 17).unwrap().in_window);
        assert!(!evaluate(&snapshot(50.0, 0.0), &config, 18).unwrap().in_window);
    }

    #[test]
    fn non_finite_readings_fail_the_cycle() {
        let config = Config::default();
        assert!(evaluate(&snapshot(f64::NAN, 0.0), &config, 12).is_err());
        assert!(evaluate(&snapshot(50.0, f64::INFINITY), &config, 12).is_err());
    }

    #[test]
    fn presence_is_an_l1_test() {
        let mut config = Config::default();
        config.home.latitude = 51.5000;
        config.home.longitude = -0.1000;
        config.home.tolerance_deg = 0.01;

        let near = LatLon {
            latitude: 51.5040,
            longitude: -0.0970,
        };
        assert!(is_at_home(&near, &config));

        // Each axis within tolerance but the L1 sum is not
        let diagonal = LatLon {
            latitude: 51.5060,
            longitude: -0.0940,
        };
        assert!(!is_at_home(&diagonal, &config));

        // Exactly at tolerance is away (strict less-than)
        let edge = LatLon {
            latitude: 51.5100,
            longitude: -0.1000,
        };
        assert!(!is_at_home(&edge, &config));
    }
}
