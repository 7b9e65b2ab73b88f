use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sunward::config::Config;
use sunward::inverter::HomeTelemetry;
use sunward::supervisor::ChargeSupervisor;
use sunward::telemetry::{ChargingState, HomeSnapshot, LatLon, VehicleSnapshot, VehicleSummary};
use sunward::vehicle::{VehicleApi, VehicleCommand};
use sunward::{Result, SunwardError};

fn test_config() -> Config {
    let mut config = Config::default();
    // Full-day window keeps the tests independent of the wall clock
    config.window.start_hour = 0;
    config.window.stop_hour = 24;
    config
}

fn home(battery_percent: f64, grid_export_w: f64) -> HomeSnapshot {
    HomeSnapshot {
        timestamp: Utc::now(),
        battery_percent,
        battery_power_w: 0.0,
        battery_voltage: 51.0,
        load_w: 300.0,
        solar_w: 2500.0,
        grid_export_w,
    }
}

fn car(charging_state: ChargingState, battery_percent: f64) -> VehicleSnapshot {
    VehicleSnapshot {
        display_name: "ember".to_string(),
        battery_percent,
        charging_state,
        // Default home coordinates are the origin
        location: Some(LatLon {
            latitude: 0.0,
            longitude: 0.0,
        }),
    }
}

struct MockHome {
    results: VecDeque<Result<HomeSnapshot>>,
}

impl MockHome {
    fn with(results: Vec<Result<HomeSnapshot>>) -> Self {
        Self {
            results: results.into(),
        }
    }
}

#[async_trait::async_trait]
impl HomeTelemetry for MockHome {
    async fn refresh(&mut self) -> Result<HomeSnapshot> {
        self.results
            .pop_front()
            .unwrap_or_else(|| Err(SunwardError::inverter("no more scripted snapshots")))
    }
}

struct MockVehicleInner {
    snapshot: Mutex<VehicleSnapshot>,
    fail_commands: AtomicBool,
    commands: Mutex<Vec<VehicleCommand>>,
    summary_calls: AtomicUsize,
    full_calls: AtomicUsize,
}

#[derive(Clone)]
struct MockVehicle {
    inner: Arc<MockVehicleInner>,
}

impl MockVehicle {
    fn new(snapshot: VehicleSnapshot) -> Self {
        Self {
            inner: Arc::new(MockVehicleInner {
                snapshot: Mutex::new(snapshot),
                fail_commands: AtomicBool::new(false),
                commands: Mutex::new(Vec::new()),
                summary_calls: AtomicUsize::new(0),
                full_calls: AtomicUsize::new(0),
            }),
        }
    }

    fn set_snapshot(&self, snapshot: VehicleSnapshot) {
        *self.inner.snapshot.lock().unwrap() = snapshot;
    }

    fn fail_commands(&self, fail: bool) {
        self.inner.fail_commands.store(fail, Ordering::SeqCst);
    }

    fn commands(&self) -> Vec<VehicleCommand> {
        self.inner.commands.lock().unwrap().clone()
    }

    fn summary_calls(&self) -> usize {
        self.inner.summary_calls.load(Ordering::SeqCst)
    }

    fn full_calls(&self) -> usize {
        self.inner.full_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VehicleApi for MockVehicle {
    async fn summary(&self) -> Result<VehicleSummary> {
        self.inner.summary_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.inner.snapshot.lock().unwrap().clone();
        Ok(VehicleSummary {
            display_name: snapshot.display_name,
            online: true,
            battery_percent: snapshot.battery_percent,
            charging_state: snapshot.charging_state,
        })
    }

    async fn full_data(&self) -> Result<VehicleSnapshot> {
        self.inner.full_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.snapshot.lock().unwrap().clone())
    }

    async fn wake(&self) -> Result<()> {
        Ok(())
    }

    async fn command(&self, command: VehicleCommand) -> Result<()> {
        self.inner.commands.lock().unwrap().push(command);
        if self.inner.fail_commands.load(Ordering::SeqCst) {
            Err(SunwardError::vehicle("command rejected"))
        } else {
            Ok(())
        }
    }
}

fn supervisor_with(
    config: Config,
    home: MockHome,
    vehicle: &MockVehicle,
) -> ChargeSupervisor {
    ChargeSupervisor::with_collaborators(config, Box::new(home), Box::new(vehicle.clone()))
}

#[tokio::test]
async fn ripe_cycle_takes_full_refresh_and_issues_start_sequence() {
    let vehicle = MockVehicle::new(car(ChargingState::Stopped, 60.0));
    let home = MockHome::with(vec![Ok(home(98.0, 500.0))]);
    let mut supervisor = supervisor_with(test_config(), home, &vehicle);

    supervisor.poll_cycle().await.unwrap();

    assert_eq!(vehicle.full_calls(), 1);
    assert_eq!(vehicle.summary_calls(), 0);
    assert_eq!(
        vehicle.commands(),
        vec![
            VehicleCommand::SetCurrent(8),
            VehicleCommand::SetChargeLimit(90),
            VehicleCommand::StartCharge,
        ]
    );
    assert!(supervisor.state().managed);
    assert_eq!(supervisor.state().amps, 8);
}

#[tokio::test]
async fn idle_cycle_stays_on_the_cheap_summary() {
    let vehicle = MockVehicle::new(car(ChargingState::Stopped, 60.0));
    // Home battery in the dead band: no reason to wake the vehicle
    let home = MockHome::with(vec![Ok(home(50.0, 500.0))]);
    let mut supervisor = supervisor_with(test_config(), home, &vehicle);

    supervisor.poll_cycle().await.unwrap();

    assert_eq!(vehicle.summary_calls(), 1);
    assert_eq!(vehicle.full_calls(), 0);
    assert!(vehicle.commands().is_empty());
    assert!(!supervisor.state().managed);
}

#[tokio::test]
async fn failed_stop_keeps_the_session_managed() {
    let vehicle = MockVehicle::new(car(ChargingState::Charging, 60.0));
    let home = MockHome::with(vec![
        Ok(home(98.0, 500.0)), // cycle 1: adopt the running charge
        Ok(home(80.0, 500.0)), // cycle 2: battery under threshold, stop
    ]);
    let mut supervisor = supervisor_with(test_config(), home, &vehicle);

    supervisor.poll_cycle().await.unwrap();
    assert!(supervisor.state().managed);
    assert!(vehicle.commands().is_empty());

    vehicle.fail_commands(true);
    supervisor.poll_cycle().await.unwrap();

    // The stop was attempted but not confirmed; we must not pretend the
    // session ended.
    assert_eq!(vehicle.commands(), vec![VehicleCommand::StopCharge]);
    assert!(supervisor.state().managed);
}

#[tokio::test]
async fn successful_stop_restores_default_current() {
    let vehicle = MockVehicle::new(car(ChargingState::Charging, 60.0));
    let home = MockHome::with(vec![
        Ok(home(98.0, 500.0)),
        Ok(home(80.0, 500.0)),
    ]);
    let mut supervisor = supervisor_with(test_config(), home, &vehicle);

    supervisor.poll_cycle().await.unwrap();
    supervisor.poll_cycle().await.unwrap();

    assert_eq!(
        vehicle.commands(),
        vec![
            VehicleCommand::StopCharge,
            VehicleCommand::SetCurrent(64),
        ]
    );
    assert!(!supervisor.state().managed);
    // The managed setpoint survives for the next session
    assert_eq!(supervisor.state().amps, 8);
}

#[tokio::test]
async fn failed_adjust_commits_optimistically() {
    let vehicle = MockVehicle::new(car(ChargingState::Charging, 60.0));
    let home = MockHome::with(vec![
        Ok(home(98.0, 500.0)),  // adopt
        Ok(home(92.0, -200.0)), // dead band, negative spare: ramp down
    ]);
    let mut supervisor = supervisor_with(test_config(), home, &vehicle);

    supervisor.poll_cycle().await.unwrap();
    vehicle.fail_commands(true);
    supervisor.poll_cycle().await.unwrap();

    assert_eq!(vehicle.commands(), vec![VehicleCommand::SetCurrent(7)]);
    // A missed one-amp step self-corrects next cycle, so the setpoint advances
    assert_eq!(supervisor.state().amps, 7);
    assert!(supervisor.state().managed);
}

#[tokio::test]
async fn ramp_adjustment_issues_one_set_current() {
    let vehicle = MockVehicle::new(car(ChargingState::Charging, 60.0));
    let home = MockHome::with(vec![
        Ok(home(98.0, 500.0)),  // adopt
        Ok(home(92.0, -200.0)), // ramp down 8 -> 7
    ]);
    let mut supervisor = supervisor_with(test_config(), home, &vehicle);

    supervisor.poll_cycle().await.unwrap();
    supervisor.poll_cycle().await.unwrap();

    assert_eq!(vehicle.commands(), vec![VehicleCommand::SetCurrent(7)]);
    assert_eq!(supervisor.state().amps, 7);
}

#[tokio::test]
async fn telemetry_failure_skips_the_cycle_without_touching_state() {
    let vehicle = MockVehicle::new(car(ChargingState::Charging, 60.0));
    let home = MockHome::with(vec![Err(SunwardError::timeout("inverter unreachable"))]);
    let mut supervisor = supervisor_with(test_config(), home, &vehicle);

    let before = *supervisor.state();
    assert!(supervisor.poll_cycle().await.is_err());

    assert_eq!(*supervisor.state(), before);
    assert_eq!(vehicle.summary_calls(), 0);
    assert_eq!(vehicle.full_calls(), 0);
    assert!(vehicle.commands().is_empty());
}

#[tokio::test]
async fn summary_cycles_reuse_the_cached_location() {
    let vehicle = MockVehicle::new(car(ChargingState::Charging, 60.0));
    let home = MockHome::with(vec![
        Ok(home(98.0, 500.0)), // full refresh, caches the home location
        Ok(home(98.0, 500.0)), // managed now, still full
    ]);
    let mut supervisor = supervisor_with(test_config(), home, &vehicle);

    supervisor.poll_cycle().await.unwrap();
    assert!(supervisor.state().managed);
    assert!(supervisor.state().last_home);

    // The vehicle stops reporting drive state (asleep); presence must come
    // from the sticky flag, not flip to away.
    let mut asleep = car(ChargingState::Charging, 60.0);
    asleep.location = None;
    vehicle.set_snapshot(asleep);

    supervisor.poll_cycle().await.unwrap();
    assert!(supervisor.state().managed);
    assert!(supervisor.state().last_home);
}
