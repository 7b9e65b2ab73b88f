//! Vehicle API integration for Sunward
//!
//! This module talks to the vehicle vendor's HTTP API: the cheap summary
//! endpoint, the full data endpoint (which may wake the vehicle), wake-up,
//! and the charging commands. Retry and wake sequencing live here so the
//! decision logic only ever sees succeeded-or-failed results.

use crate::config::{RetryConfig, VehicleConfig};
use crate::error::{Result, SunwardError};
use crate::logging::get_logger;
use crate::telemetry::{ChargingState, LatLon, VehicleSnapshot, VehicleSummary};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;

/// Commands the supervisor can issue to the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleCommand {
    /// Set the charging current in amps
    SetCurrent(u32),

    /// Set the charge limit percentage
    SetChargeLimit(u32),

    /// Start a charge session
    StartCharge,

    /// Stop the active charge session
    StopCharge,
}

impl VehicleCommand {
    /// Command endpoint name in the vendor API
    pub fn endpoint(&self) -> &'static str {
        match self {
            VehicleCommand::SetCurrent(_) => "set_charging_amps",
            VehicleCommand::SetChargeLimit(_) => "set_charge_limit",
            VehicleCommand::StartCharge => "charge_start",
            VehicleCommand::StopCharge => "charge_stop",
        }
    }

    /// JSON body for the command request
    pub fn body(&self) -> serde_json::Value {
        match self {
            VehicleCommand::SetCurrent(amps) => serde_json::json!({ "charging_amps": amps }),
            VehicleCommand::SetChargeLimit(percent) => serde_json::json!({ "percent": percent }),
            VehicleCommand::StartCharge | VehicleCommand::StopCharge => serde_json::json!({}),
        }
    }
}

/// Vehicle telematics client trait
#[async_trait::async_trait]
pub trait VehicleApi: Send + Sync {
    /// Cheap reading: state of charge and charging state, no location
    async fn summary(&self) -> Result<VehicleSummary>;

    /// Full reading including drive state; may wake a sleeping vehicle
    async fn full_data(&self) -> Result<VehicleSnapshot>;

    /// Wake the vehicle and wait until it reports online
    async fn wake(&self) -> Result<()>;

    /// Issue a charging command; fire-and-forget beyond the vendor's ack
    async fn command(&self, command: VehicleCommand) -> Result<()>;
}

// Wire types for the vendor API

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Debug, Deserialize)]
struct SummaryData {
    display_name: String,
    state: String,
    charge_state: ChargeStateData,
}

#[derive(Debug, Deserialize)]
struct VehicleData {
    display_name: String,
    charge_state: ChargeStateData,
    #[serde(default)]
    drive_state: Option<DriveStateData>,
}

#[derive(Debug, Deserialize)]
struct ChargeStateData {
    battery_level: f64,
    charging_state: String,
}

#[derive(Debug, Deserialize)]
struct DriveStateData {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct CommandResult {
    result: bool,
    #[serde(default)]
    reason: String,
}

/// Tesla-style vehicle client
pub struct TeslaClient {
    http: reqwest::Client,
    config: VehicleConfig,
    retry: RetryConfig,
    logger: crate::logging::StructuredLogger,
}

impl TeslaClient {
    /// Create a new vehicle client
    pub fn new(config: &VehicleConfig, retry: &RetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let logger = get_logger("vehicle");
        Ok(Self {
            http,
            config: config.clone(),
            retry: retry.clone(),
            logger,
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/api/1/vehicles/{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.vehicle_id,
            suffix
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.request_with_retry(|| self.http.get(url).bearer_auth(&self.config.access_token))
            .await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        self.request_with_retry(|| {
            self.http
                .post(url)
                .bearer_auth(&self.config.access_token)
                .json(body)
        })
        .await
    }

    /// Bounded retry for one request. Network failures and server-side
    /// errors are retried; client-side rejections are not.
    async fn request_with_retry<T, F>(&self, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = self.send_once(build()).await;
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let retryable = matches!(
                        e,
                        SunwardError::Network { .. } | SunwardError::Timeout { .. }
                    );
                    if !retryable || attempts >= self.retry.max_attempts {
                        return Err(e);
                    }
                    self.logger
                        .warn(&format!("Vehicle API attempt {} failed: {}", attempts, e));
                    sleep(Duration::from_secs_f64(self.retry.delay_seconds)).await;
                }
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SunwardError::auth(format!(
                "Vehicle API rejected credentials: {}",
                status
            )));
        }
        if status.is_server_error() {
            return Err(SunwardError::network(format!(
                "Vehicle API server error: {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(SunwardError::vehicle(format!(
                "Vehicle API request failed: {}",
                status
            )));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait::async_trait]
impl VehicleApi for TeslaClient {
    async fn summary(&self) -> Result<VehicleSummary> {
        let data: Envelope<SummaryData> = self.get_json(&self.url("")).await?;
        let summary = data.response;
        Ok(VehicleSummary {
            online: summary.state == "online",
            display_name: summary.display_name,
            battery_percent: summary.charge_state.battery_level,
            charging_state: ChargingState::from_label(&summary.charge_state.charging_state),
        })
    }

    async fn full_data(&self) -> Result<VehicleSnapshot> {
        let data: Envelope<VehicleData> = self.get_json(&self.url("/vehicle_data")).await?;
        let vehicle = data.response;
        Ok(VehicleSnapshot {
            display_name: vehicle.display_name,
            battery_percent: vehicle.charge_state.battery_level,
            charging_state: ChargingState::from_label(&vehicle.charge_state.charging_state),
            location: vehicle.drive_state.map(|d| LatLon {
                latitude: d.latitude,
                longitude: d.longitude,
            }),
        })
    }

    async fn wake(&self) -> Result<()> {
        let _: Envelope<serde_json::Value> = self
            .post_json(&self.url("/wake_up"), &serde_json::json!({}))
            .await?;

        // The wake call returns immediately; poll the summary until the
        // vehicle actually comes online, bounded by configuration.
        for attempt in 1..=self.config.wake_attempts {
            let summary = self.summary().await?;
            if summary.online {
                self.logger
                    .debug(&format!("Vehicle online after {} wake polls", attempt));
                return Ok(());
            }
            sleep(Duration::from_secs(self.config.wake_delay_seconds)).await;
        }
        Err(SunwardError::timeout(format!(
            "Vehicle did not wake after {} polls",
            self.config.wake_attempts
        )))
    }

    async fn command(&self, command: VehicleCommand) -> Result<()> {
        let url = self.url(&format!("/command/{}", command.endpoint()));
        self.logger.debug(&format!("Issuing {:?}", command));
        let data: Envelope<CommandResult> = self.post_json(&url, &command.body()).await?;
        if data.response.result {
            Ok(())
        } else {
            Err(SunwardError::vehicle(format!(
                "Command {} rejected: {}",
                command.endpoint(),
                data.response.reason
            )))
        }
    }
}
