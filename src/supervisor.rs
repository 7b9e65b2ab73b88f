//! Cycle orchestration for Sunward
//!
//! The supervisor owns the poll-decide-act-sleep loop: it refreshes both
//! telemetry sources, runs the decision state machine, issues the resulting
//! vehicle commands, and commits the successor control state. It is the only
//! place `ControlState` is ever written, once per cycle, strictly
//! sequentially.

use crate::config::Config;
use crate::controls::{self, ChargeAction, Decision};
use crate::error::Result;
use crate::inverter::{HomeTelemetry, InverterConnectionManager};
use crate::logging::get_logger;
use crate::signals::{self, ThresholdSignals};
use crate::telemetry::{ControlState, LatLon, VehicleSnapshot};
use crate::vehicle::{TeslaClient, VehicleApi, VehicleCommand};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use uuid::Uuid;

/// Main supervisor for Sunward
pub struct ChargeSupervisor {
    /// Configuration
    config: Config,

    /// Home energy telemetry source
    home: Box<dyn HomeTelemetry>,

    /// Vehicle telematics source
    vehicle: Box<dyn VehicleApi>,

    /// The state carried between cycles
    state: ControlState,

    /// Location from the last full refresh that reported one
    cached_location: Option<LatLon>,

    /// Correlation id for the current managed episode
    session_id: Option<Uuid>,

    /// Shutdown signal
    shutdown_tx: mpsc::UnboundedSender<()>,

    /// Shutdown receiver
    shutdown_rx: mpsc::UnboundedReceiver<()>,

    /// Logger with context
    logger: crate::logging::StructuredLogger,
}

impl ChargeSupervisor {
    /// Create a supervisor against the real inverter and vehicle API.
    ///
    /// Both collaborators are probed once; an unreachable inverter or
    /// vehicle at startup is fatal, per the startup error policy.
    pub async fn new(config: Config) -> Result<Self> {
        let retry_delay = Duration::from_secs_f64(config.retry.delay_seconds);
        let home = InverterConnectionManager::new(
            &config.inverter,
            config.retry.max_attempts,
            retry_delay,
        );
        let vehicle = TeslaClient::new(&config.vehicle, &config.retry)?;
        let mut supervisor = Self::with_collaborators(config, Box::new(home), Box::new(vehicle));

        let snapshot = supervisor.home.refresh().await?;
        supervisor.logger.info(&format!(
            "Inverter reachable, home battery at {:.0}%",
            snapshot.battery_percent
        ));
        let summary = supervisor.vehicle.summary().await?;
        supervisor.logger.info(&format!(
            "Vehicle '{}' reachable at {:.0}% SoC",
            summary.display_name, summary.battery_percent
        ));

        Ok(supervisor)
    }

    /// Create a supervisor with injected collaborators (no startup probe)
    pub fn with_collaborators(
        config: Config,
        home: Box<dyn HomeTelemetry>,
        vehicle: Box<dyn VehicleApi>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let state = ControlState::new(config.charging.initial_amps);
        let logger = get_logger("supervisor");
        Self {
            config,
            home,
            vehicle,
            state,
            cached_location: None,
            session_id: None,
            shutdown_tx,
            shutdown_rx,
            logger,
        }
    }

    /// Sender half of the shutdown channel, for signal handlers
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    /// Current control state
    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// Run the poll-decide-act-sleep loop until shutdown
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting charge supervisor main loop");

        loop {
            if let Err(e) = self.poll_cycle().await {
                // Every cycle recomputes the decision from fresh snapshots,
                // so a failed cycle is skipped, never patched over.
                self.logger
                    .warn(&format!("Cycle skipped, no decision taken: {}", e));
            }

            let wait = controls::poll_interval(&self.state, &self.config);
            tokio::select! {
                _ = sleep(wait) => {}
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.logger.info("Charge supervisor shutdown complete");
        Ok(())
    }

    /// Single polling cycle
    pub async fn poll_cycle(&mut self) -> Result<()> {
        let home = self.home.refresh().await?;
        let hour = signals::local_hour(&self.config)?;
        let sig = signals::evaluate(&home, &self.config, hour)?;
        let spare_w = home.spare_power_w();

        self.logger.info(&format!(
            "Home: battery {:.0}% ({:+.0} W), solar {:.0} W, load {:.0} W, export {:+.0} W, spare {:+.0} W",
            home.battery_percent,
            home.battery_power_w,
            home.solar_w,
            home.load_w,
            home.grid_export_w,
            spare_w
        ));
        self.logger.debug(&format!(
            "Signals: charging={} over={} under={} in_window={} (hour {})",
            sig.battery_charging,
            sig.battery_over_threshold,
            sig.battery_under_threshold,
            sig.in_window,
            hour
        ));

        let vehicle = self.vehicle_snapshot(&sig, spare_w).await?;
        self.logger.info(&format!(
            "Vehicle: {} at {:.0}% SoC, {:?}, location {}",
            vehicle.display_name,
            vehicle.battery_percent,
            vehicle.charging_state,
            match &vehicle.location {
                Some(_) => "reported",
                None => "unavailable",
            }
        ));

        let decision = controls::decide(&home, &vehicle, &sig, &self.state, &self.config);
        let committed = self.execute(&decision.action).await;
        if committed {
            self.note_transitions(&decision);
            self.state = decision.state;
        }

        self.logger
            .info(&format!("Action: {:?} ({})", decision.action, decision.reason));

        if self.state.managed && !self.state.last_home {
            // The open hazard in the stop rule: a managed session we cannot
            // currently place at home. Keep it loud until it resolves.
            self.logger
                .warn("Managing a session but cannot place the vehicle at home");
        }

        Ok(())
    }

    /// Fetch this cycle's vehicle snapshot, full or cheap per the gatekeeper
    async fn vehicle_snapshot(
        &mut self,
        sig: &ThresholdSignals,
        spare_w: f64,
    ) -> Result<VehicleSnapshot> {
        if controls::needs_full_refresh(&self.state, sig, spare_w) {
            let snap = self.vehicle.full_data().await?;
            if snap.location.is_some() {
                self.cached_location = snap.location;
            }
            Ok(snap)
        } else {
            let summary = self.vehicle.summary().await?;
            Ok(summary.into_snapshot(self.cached_location))
        }
    }

    /// Issue the commands for one action.
    ///
    /// Returns whether the successor state may be committed. A failed STOP,
    /// START or RELEASE leaves the previous state in place so the rule
    /// re-fires next cycle; a failed ADJUST commits optimistically since a
    /// missed one-amp step self-corrects on the next reading.
    async fn execute(&mut self, action: &ChargeAction) -> bool {
        let default_amps = self.config.charging.default_amps;
        match action {
            ChargeAction::None => true,

            ChargeAction::Adjust { amps } => {
                if let Err(e) = self.issue(&[VehicleCommand::SetCurrent(*amps)]).await {
                    self.logger
                        .warn(&format!("Current adjustment failed: {}", e));
                }
                true
            }

            ChargeAction::Start {
                amps,
                limit_percent,
            } => {
                let commands = [
                    VehicleCommand::SetCurrent(*amps),
                    VehicleCommand::SetChargeLimit(*limit_percent),
                    VehicleCommand::StartCharge,
                ];
                match self.issue(&commands).await {
                    Ok(()) => true,
                    Err(e) => {
                        self.logger
                            .error(&format!("Start sequence failed, staying unmanaged: {}", e));
                        false
                    }
                }
            }

            ChargeAction::Stop => {
                let commands = [
                    VehicleCommand::StopCharge,
                    VehicleCommand::SetCurrent(default_amps),
                ];
                match self.issue(&commands).await {
                    Ok(()) => true,
                    Err(e) => {
                        self.logger.error(&format!(
                            "Stop failed, session stays managed for retry next cycle: {}",
                            e
                        ));
                        false
                    }
                }
            }

            ChargeAction::Release => {
                match self
                    .issue(&[VehicleCommand::SetCurrent(default_amps)])
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        self.logger
                            .error(&format!("Release failed, will retry next cycle: {}", e));
                        false
                    }
                }
            }
        }
    }

    /// Wake once, then issue a command batch in order
    async fn issue(&self, commands: &[VehicleCommand]) -> Result<()> {
        self.vehicle.wake().await?;
        for command in commands {
            self.vehicle.command(*command).await?;
        }
        Ok(())
    }

    /// Log managed-episode boundaries and rotate the session id
    fn note_transitions(&mut self, decision: &Decision) {
        if decision.state.managed && !self.state.managed {
            let id = Uuid::new_v4();
            self.logger
                .info(&format!("Managing charge session {}", id));
            self.session_id = Some(id);
        } else if !decision.state.managed
            && self.state.managed
            && let Some(id) = self.session_id.take()
        {
            self.logger
                .info(&format!("Finished managing charge session {}", id));
        }
    }
}
