//! Modbus TCP client for the home energy system
//!
//! This module reads the hybrid inverter's input register block once per
//! cycle and decodes it into a [`HomeSnapshot`]. The link is read-only:
//! all actuation in this system goes through the vehicle API.

use crate::config::{InverterConfig, RegisterMap};
use crate::error::{Result, SunwardError};
use crate::logging::get_logger;
use crate::telemetry::HomeSnapshot;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_modbus::client::tcp;
use tokio_modbus::prelude::*;

/// Source of per-cycle home energy snapshots
#[async_trait::async_trait]
pub trait HomeTelemetry: Send {
    /// Take a fresh reading of the home energy system
    async fn refresh(&mut self) -> Result<HomeSnapshot>;
}

/// Modbus TCP client for the inverter
pub struct InverterClient {
    /// Modbus TCP client connection
    client: Option<tokio_modbus::client::Context>,

    /// Configuration
    config: InverterConfig,

    /// Connection timeout
    connection_timeout: Duration,

    /// Operation timeout
    operation_timeout: Duration,

    /// Logger
    logger: crate::logging::StructuredLogger,
}

impl InverterClient {
    /// Create a new inverter client
    pub fn new(config: &InverterConfig) -> Self {
        let logger = get_logger("inverter");
        Self {
            client: None,
            config: config.clone(),
            connection_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(2),
            logger,
        }
    }

    /// Connect to the inverter
    pub async fn connect(&mut self) -> Result<()> {
        let address = format!("{}:{}", self.config.host, self.config.port);

        self.logger
            .info(&format!("Connecting to inverter at {}", address));

        let socket_addr: std::net::SocketAddr = address
            .parse()
            .map_err(|e| SunwardError::inverter(format!("Invalid socket address: {}", e)))?;

        let slave = Slave(self.config.unit_id);
        match timeout(self.connection_timeout, tcp::connect_slave(socket_addr, slave)).await {
            Ok(Ok(client)) => {
                self.client = Some(client);
                self.logger.info("Successfully connected to inverter");
                Ok(())
            }
            Ok(Err(e)) => {
                let error_msg = format!("Failed to connect to inverter: {}", e);
                self.logger.error(&error_msg);
                Err(SunwardError::inverter(error_msg))
            }
            Err(_) => {
                let error_msg = "Connection timeout".to_string();
                self.logger.error(&error_msg);
                Err(SunwardError::timeout(error_msg))
            }
        }
    }

    /// Disconnect from the inverter
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(_client) = self.client.take() {
            self.logger.info("Disconnecting from inverter");
            // The client will be dropped automatically
        }
        Ok(())
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Read input registers
    pub async fn read_input_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        let timeout_duration = self.operation_timeout;

        // Log before borrowing client
        self.logger.debug(&format!(
            "Reading {} input registers from address {}",
            count, address
        ));

        let client = self.get_client()?;
        let request = client.read_input_registers(address, count);

        match timeout(timeout_duration, request).await {
            Ok(Ok(Ok(response))) => {
                self.logger
                    .trace(&format!("Read {} registers", response.len()));
                Ok(response)
            }
            Ok(Ok(Err(exception))) => {
                let error_msg = format!("Modbus exception: {}", exception);
                self.logger.error(&error_msg);
                Err(SunwardError::inverter(error_msg))
            }
            Ok(Err(e)) => {
                let error_msg = format!("Failed to read input registers: {}", e);
                self.logger.error(&error_msg);
                Err(SunwardError::inverter(error_msg))
            }
            Err(_) => {
                let error_msg = "Read operation timeout".to_string();
                self.logger.error(&error_msg);
                Err(SunwardError::timeout(error_msg))
            }
        }
    }

    /// Get client reference or error if not connected
    fn get_client(&mut self) -> Result<&mut tokio_modbus::client::Context> {
        self.client
            .as_mut()
            .ok_or_else(|| SunwardError::inverter("Not connected to inverter"))
    }
}

/// Utility functions for register decoding

/// Reinterpret a register word as a signed 16-bit value
pub fn as_signed(word: u16) -> i16 {
    word as i16
}

/// Fetch the word at an absolute address out of a block read at `base`
pub fn word_at(block: &[u16], base: u16, address: u16) -> Result<u16> {
    let offset = address
        .checked_sub(base)
        .ok_or_else(|| SunwardError::inverter(format!("Address {} below block base", address)))?;
    block.get(offset as usize).copied().ok_or_else(|| {
        SunwardError::inverter(format!("Address {} beyond end of block", address))
    })
}

/// Decode one register block into a [`HomeSnapshot`]
pub fn snapshot_from_block(
    block: &[u16],
    map: &RegisterMap,
    timestamp: DateTime<Utc>,
) -> Result<HomeSnapshot> {
    let base = map.input_base;
    let battery_percent = f64::from(word_at(block, base, map.battery_percent)?);
    let battery_power_w = f64::from(as_signed(word_at(block, base, map.battery_power)?));
    // Battery voltage arrives in centivolts
    let battery_voltage = f64::from(word_at(block, base, map.battery_voltage)?) / 100.0;
    let load_w = f64::from(word_at(block, base, map.load_demand)?);
    let solar_w = f64::from(word_at(block, base, map.pv1_power)?)
        + f64::from(word_at(block, base, map.pv2_power)?);
    let grid_export_w = f64::from(as_signed(word_at(block, base, map.grid_export)?));

    Ok(HomeSnapshot {
        timestamp,
        battery_percent,
        battery_power_w,
        battery_voltage,
        load_w,
        solar_w,
        grid_export_w,
    })
}

/// Connection manager with bounded retries and automatic reconnection
pub struct InverterConnectionManager {
    client: InverterClient,
    registers: RegisterMap,
    max_retry_attempts: u32,
    retry_delay: Duration,
    logger: crate::logging::StructuredLogger,
}

impl InverterConnectionManager {
    /// Create a new connection manager
    pub fn new(config: &InverterConfig, max_retry_attempts: u32, retry_delay: Duration) -> Self {
        let logger = get_logger("inverter_manager");
        Self {
            client: InverterClient::new(config),
            registers: config.registers.clone(),
            max_retry_attempts,
            retry_delay,
            logger,
        }
    }

    /// Read the telemetry block, reconnecting on connection errors.
    ///
    /// Retries are bounded; the decision logic above this only ever sees one
    /// succeeded-or-failed result per cycle.
    pub async fn read_telemetry_block(&mut self) -> Result<Vec<u16>> {
        let base = self.registers.input_base;
        let count = self.registers.input_count;
        let mut attempts = 0;

        loop {
            // Ensure we're connected
            if !self.client.is_connected() {
                if let Err(e) = self.client.connect().await {
                    attempts += 1;
                    if attempts >= self.max_retry_attempts {
                        return Err(e);
                    }
                    self.logger
                        .warn(&format!("Connection attempt {} failed: {}", attempts, e));
                    sleep(self.retry_delay).await;
                    continue;
                }
            }

            match self.client.read_input_registers(base, count).await {
                Ok(block) => return Ok(block),
                Err(e) => {
                    // A connection-level failure is worth a reconnect; a
                    // Modbus exception is not, the request itself is wrong.
                    if Self::is_connection_error(&e) {
                        self.logger
                            .warn(&format!("Read failed due to connection error: {}", e));
                        self.client.disconnect().await.ok();
                        attempts += 1;
                        if attempts >= self.max_retry_attempts {
                            return Err(e);
                        }
                        sleep(self.retry_delay).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Check if an error is a connection-related error
    fn is_connection_error(error: &SunwardError) -> bool {
        match error {
            SunwardError::Inverter { message } => {
                message.contains("connection")
                    || message.contains("Connection")
                    || message.contains("timeout")
                    || message.contains("disconnected")
            }
            SunwardError::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl HomeTelemetry for InverterConnectionManager {
    async fn refresh(&mut self) -> Result<HomeSnapshot> {
        let block = self.read_telemetry_block().await?;
        snapshot_from_block(&block, &self.registers, Utc::now())
    }
}
