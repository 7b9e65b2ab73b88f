//! Charge decision logic for Sunward
//!
//! This module is the core of the supervisor: the priority-ordered decision
//! state machine, the one-amp-per-cycle ramp, the vehicle-refresh gatekeeper,
//! and the polling scheduler. Everything here is a pure function of its
//! inputs; issuing the resulting commands and committing the successor state
//! is the supervisor's job.

use crate::config::Config;
use crate::signals::{self, ThresholdSignals};
use crate::telemetry::{ChargingState, ControlState, HomeSnapshot, VehicleSnapshot};
use std::time::Duration;

/// The single action a cycle produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeAction {
    /// Do nothing this cycle
    None,

    /// Begin a managed session: set current and charge limit, then start
    Start { amps: u32, limit_percent: u32 },

    /// Stop the managed session and hand the default current back
    Stop,

    /// Hand control back to the vehicle's own charge manager without
    /// stopping anything (the session already ended on its side)
    Release,

    /// Nudge the managed current by one amp
    Adjust { amps: u32 },
}

/// Outcome of one evaluation of the decision state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// What to do
    pub action: ChargeAction,

    /// Successor control state, to be committed if the action sticks
    pub state: ControlState,

    /// Why, for the cycle log
    pub reason: &'static str,
}

impl Decision {
    fn new(action: ChargeAction, state: ControlState, reason: &'static str) -> Self {
        Self {
            action,
            state,
            reason,
        }
    }
}

/// Evaluate the priority-ordered decision rules for one cycle.
///
/// The rules form a priority list, not independent triggers: the first match
/// fires and everything below it is skipped. Presence is recomputed from the
/// snapshot's location when one is present; without a location the sticky
/// `last_home` flag is reused, never an assumption in either direction.
pub fn decide(
    home: &HomeSnapshot,
    vehicle: &VehicleSnapshot,
    sig: &ThresholdSignals,
    state: &ControlState,
    config: &Config,
) -> Decision {
    let spare_w = home.spare_power_w();

    let mut next = *state;
    if let Some(loc) = &vehicle.location {
        next.last_home = signals::is_at_home(loc, config);
    }
    let at_home = next.last_home;

    // 1. Away vehicles are observed, never commanded.
    if !at_home {
        return Decision::new(ChargeAction::None, next, "vehicle is not at home");
    }

    // 2-3. A dead or unplugged charger makes every command a no-op.
    if vehicle.charging_state == ChargingState::NoPower {
        next.managed = false;
        return Decision::new(ChargeAction::None, next, "charger has no power");
    }
    if vehicle.charging_state == ChargingState::Disconnected {
        next.managed = false;
        return Decision::new(ChargeAction::None, next, "charger is not connected");
    }

    // 4. The session ended on the vehicle's side (limit reached, or stopped
    // from the app); restore the default current and step aside.
    if state.managed
        && matches!(
            vehicle.charging_state,
            ChargingState::Complete | ChargingState::Stopped
        )
    {
        next.managed = false;
        return Decision::new(
            ChargeAction::Release,
            next,
            "vehicle finished or stopped on its own, handing back",
        );
    }

    // 5. Someone else started a charge. Inside the window we adopt and
    // steward it; outside the window it was deliberate, leave it alone.
    if !state.managed && vehicle.charging_state == ChargingState::Charging {
        if sig.in_window {
            next.managed = true;
            return Decision::new(
                ChargeAction::None,
                next,
                "adopting charge already in progress",
            );
        }
        return Decision::new(
            ChargeAction::None,
            next,
            "charging outside the window, leaving it alone",
        );
    }

    // 6. Conditions for a surplus charge. Presence is re-validated at the
    // transition itself, not taken from an earlier judgment.
    if !state.managed
        && sig.in_window
        && spare_w > 0.0
        && sig.battery_over_threshold
        && vehicle.battery_percent < f64::from(config.thresholds.vehicle_soc_cap)
    {
        if at_home {
            next.managed = true;
            return Decision::new(
                ChargeAction::Start {
                    amps: state.amps,
                    limit_percent: config.thresholds.vehicle_soc_cap,
                },
                next,
                "surplus available, starting managed charge",
            );
        }
        return Decision::new(ChargeAction::None, next, "vehicle moved away, not starting");
    }

    // 7. Stop conditions. If presence cannot be confirmed the session stays
    // marked managed: claiming otherwise without confirming the stop
    // physically happened would be a lie we act on next cycle.
    if state.managed && (sig.battery_under_threshold || !sig.in_window) {
        if at_home {
            next.managed = false;
            return Decision::new(
                ChargeAction::Stop,
                next,
                "home battery low or window closed, stopping",
            );
        }
        return Decision::new(
            ChargeAction::None,
            next,
            "cannot confirm presence, leaving session managed",
        );
    }

    // 8. Steady state of a managed session: track spare power one amp at a time.
    if state.managed {
        return match ramp_step(
            spare_w,
            state.amps,
            config.charging.min_amps,
            config.charging.max_amps,
        ) {
            Some(amps) => {
                next.amps = amps;
                let reason = if amps < state.amps {
                    "spare power negative, ramping down"
                } else {
                    "spare power available, ramping up"
                };
                Decision::new(ChargeAction::Adjust { amps }, next, reason)
            }
            None => Decision::new(ChargeAction::None, next, "holding current"),
        };
    }

    Decision::new(ChargeAction::None, next, "nothing to do")
}

/// One-amp-per-cycle proportional step, bounded to `[min, max]`.
///
/// Returns the new setpoint, or `None` when no change is warranted. Bounding
/// the step to a single amp keeps noisy instantaneous power readings from
/// swinging the setpoint.
pub fn ramp_step(spare_power_w: f64, amps: u32, min: u32, max: u32) -> Option<u32> {
    if spare_power_w < 0.0 && amps > min {
        Some(amps - 1)
    } else if spare_power_w > 0.0 && amps < max {
        Some(amps + 1)
    } else {
        None
    }
}

/// Whether this cycle warrants the expensive full vehicle refresh.
///
/// Full data (which may wake a sleeping vehicle) is only worth fetching when
/// we are already managing a session, or when conditions look like one could
/// start. Every other cycle runs off the cheap summary plus the cached
/// location.
pub fn needs_full_refresh(
    state: &ControlState,
    sig: &ThresholdSignals,
    spare_power_w: f64,
) -> bool {
    state.managed || (sig.in_window && spare_power_w > 0.0 && sig.battery_over_threshold)
}

/// Next cycle's sleep: tight while shaping a session, relaxed while idle
pub fn poll_interval(state: &ControlState, config: &Config) -> Duration {
    if state.managed {
        Duration::from_secs(config.polling.short_seconds)
    } else {
        Duration::from_secs(config.polling.long_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_decrements_on_negative_spare() {
        assert_eq!(ramp_step(-50.0, 8, 5, 32), Some(7));
    }

    #[test]
    fn ramp_increments_on_positive_spare() {
        assert_eq!(ramp_step(120.0, 8, 5, 32), Some(9));
    }

    #[test]
    fn ramp_holds_at_bounds() {
        // Setpoint exactly at min: negative spare must not go below
        assert_eq!(ramp_step(-300.0, 5, 5, 32), None);
        // Setpoint exactly at max: positive spare must not go above
        assert_eq!(ramp_step(300.0, 32, 5, 32), None);
    }

    #[test]
    fn ramp_holds_on_zero_spare() {
        assert_eq!(ramp_step(0.0, 8, 5, 32), None);
    }

    #[test]
    fn scheduler_is_a_fixed_two_value_schedule() {
        let config = Config::default();
        let mut state = ControlState::new(8);
        assert_eq!(
            poll_interval(&state, &config),
            Duration::from_secs(config.polling.long_seconds)
        );
        state.managed = true;
        assert_eq!(
            poll_interval(&state, &config),
            Duration::from_secs(config.polling.short_seconds)
        );
    }
}
