//! CGM Controller Module
//!
//! The single dispatch point between the caller, the codec, and the
//! transport.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      CgmController                        │
//! │  (owns SessionContext, the op tracker, and the transfer   │
//! │   coordinator; drives the transport; emits CgmEvents)     │
//! └──────────┬──────────────────┬──────────────────┬─────────┘
//!            │                  │                  │
//!            ▼                  ▼                  ▼
//!     ┌────────────┐    ┌──────────────┐    ┌────────────┐
//!     │    ops     │    │  retrieval   │    │  protocol  │
//!     │ single-    │    │ RACP bulk    │    │ decode /   │
//!     │ flight     │    │ transfers    │    │ encode     │
//!     └────────────┘    └──────────────┘    └────────────┘
//! ```
//!
//! All sequencing state lives on this struct and is touched by exactly
//! one task: submission methods take `&mut self`, and [`CgmController::run`]
//! (or repeated [`CgmController::step`] calls) consume transport events on
//! the same task. There is no locking anywhere.
//!
//! ## Modules
//!
//! - [`ops`] - control-point operation state machine
//! - [`retrieval`] - bulk stored-record transfer coordinator

pub mod ops;
pub mod retrieval;

use chrono::{DateTime, FixedOffset, Local};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::domain::feature::CgmFeatures;
use crate::domain::measurement::MeasurementRecord;
use crate::domain::session::{SessionContext, SessionRunTime, SessionStartTime};
use crate::domain::status::StatusRecord;
use crate::domain::types::{FluidType, SampleLocation};
use crate::error::{DecodeError, OperationError};
use crate::protocol::cgmcp::{
    self, AlertKind, CgmcpCommand, CALIBRATION_RECORD_MOST_RECENT, COMM_INTERVAL_DISABLED,
    COMM_INTERVAL_FASTEST,
};
use crate::protocol::decode;
use crate::protocol::racp::{self, RacpCommand};
use crate::protocol::uuid::CharacteristicId;
use crate::transport::{ConnectionState, GattTransport};

use ops::{CgmcpOutcome, OperationTracker};
use retrieval::{RetrievalCoordinator, TransferOutcome};

/// Everything the controller reports to its observer.
#[derive(Debug, Clone, PartialEq)]
pub enum CgmEvent {
    Connection(ConnectionState),
    Features(CgmFeatures),
    SessionStartTime(SessionStartTime),
    SessionRunTime(SessionRunTime),
    Status(StatusRecord),
    /// A live measurement (not part of a bulk transfer).
    Measurement(MeasurementRecord),
    ControlPoint(CgmcpOutcome),
    Transfer(TransferOutcome),
    /// An inbound payload failed to decode and was rejected.
    DecodeRejected {
        characteristic: CharacteristicId,
        error: DecodeError,
    },
}

/// Orchestrates one connected CGM sensor.
pub struct CgmController<T: GattTransport> {
    transport: T,
    config: CollectorConfig,
    events: mpsc::UnboundedSender<CgmEvent>,
    context: SessionContext,
    ops: OperationTracker,
    transfers: RetrievalCoordinator,
    measurement_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    cgmcp_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    racp_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    connection_rx: watch::Receiver<ConnectionState>,
    cgmcp_deadline: Option<Instant>,
    racp_deadline: Option<Instant>,
}

impl<T: GattTransport> CgmController<T> {
    /// Create a controller over a connected transport. Events are
    /// delivered to `events`; the caller keeps the receiving end.
    pub fn new(
        transport: T,
        config: CollectorConfig,
        events: mpsc::UnboundedSender<CgmEvent>,
    ) -> Self {
        let connection_rx = transport.connection_state();
        Self {
            transport,
            config,
            events,
            context: SessionContext::new(),
            ops: OperationTracker::new(),
            transfers: RetrievalCoordinator::new(),
            measurement_rx: None,
            cgmcp_rx: None,
            racp_rx: None,
            connection_rx,
            cgmcp_deadline: None,
            racp_deadline: None,
        }
    }

    /// Snapshot of the negotiated session context.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Subscribe the control-point indication streams and seed the
    /// session context from the Feature and Session Start Time
    /// characteristics.
    pub async fn connect(&mut self) -> Result<(), OperationError> {
        info!("Connecting to CGM service");
        let cgmcp_rx = self
            .transport
            .subscribe(CharacteristicId::SpecificOpsControlPoint)
            .await?;
        let racp_rx = self
            .transport
            .subscribe(CharacteristicId::RecordAccessControlPoint)
            .await?;
        self.cgmcp_rx = Some(cgmcp_rx);
        self.racp_rx = Some(racp_rx);

        self.read_features().await?;
        self.read_session_start_time().await?;

        let _ = self
            .events
            .send(CgmEvent::Connection(ConnectionState::Connected));
        Ok(())
    }

    // --- characteristic reads / writes ----------------------------------

    /// Surface a decode failure as a rejected read, both as an event and
    /// to the caller.
    fn reject_on_error<V>(
        &self,
        characteristic: CharacteristicId,
        result: Result<V, DecodeError>,
    ) -> Result<V, OperationError> {
        result.map_err(|error| {
            let _ = self.events.send(CgmEvent::DecodeRejected {
                characteristic,
                error: error.clone(),
            });
            OperationError::Decode(error)
        })
    }

    /// Read and adopt the supported feature set.
    pub async fn read_features(&mut self) -> Result<CgmFeatures, OperationError> {
        let bytes = self.transport.read(CharacteristicId::Feature).await?;
        let features = self.reject_on_error(
            CharacteristicId::Feature,
            decode::decode_feature(&bytes),
        )?;
        self.context.adopt_features(features);
        info!(
            crc_supported = self.context.crc_supported(),
            "Read CGM features"
        );
        let _ = self.events.send(CgmEvent::Features(features));
        Ok(features)
    }

    /// Read and adopt the session start time.
    pub async fn read_session_start_time(&mut self) -> Result<SessionStartTime, OperationError> {
        let bytes = self
            .transport
            .read(CharacteristicId::SessionStartTime)
            .await?;
        let start_time = self.reject_on_error(
            CharacteristicId::SessionStartTime,
            decode::decode_session_start_time(&bytes, &self.context),
        )?;
        self.context.adopt_session_start_time(start_time);
        let _ = self.events.send(CgmEvent::SessionStartTime(start_time));
        Ok(start_time)
    }

    /// Read the session run time.
    pub async fn read_session_run_time(&mut self) -> Result<SessionRunTime, OperationError> {
        let bytes = self
            .transport
            .read(CharacteristicId::SessionRunTime)
            .await?;
        let run_time = self.reject_on_error(
            CharacteristicId::SessionRunTime,
            decode::decode_session_run_time(&bytes, &self.context),
        )?;
        let _ = self.events.send(CgmEvent::SessionRunTime(run_time));
        Ok(run_time)
    }

    /// Read the current sensor status.
    pub async fn read_status(&mut self) -> Result<StatusRecord, OperationError> {
        let bytes = self.transport.read(CharacteristicId::Status).await?;
        let status = self.reject_on_error(
            CharacteristicId::Status,
            decode::decode_status(&bytes, &self.context),
        )?;
        let _ = self.events.send(CgmEvent::Status(status));
        Ok(status)
    }

    /// Write a timestamp to the Session Start Time characteristic, then
    /// re-read it to pick up the sensor's resulting start time.
    pub async fn send_time(
        &mut self,
        date_time: DateTime<FixedOffset>,
    ) -> Result<SessionStartTime, OperationError> {
        let payload = SessionStartTime::from_date_time(date_time).to_wire_bytes();
        self.transport
            .write(CharacteristicId::SessionStartTime, &payload)
            .await?;
        self.read_session_start_time().await
    }

    /// Send the collector's wall-clock time. Required at least once after
    /// a new session is started.
    pub async fn send_current_time(&mut self) -> Result<SessionStartTime, OperationError> {
        self.send_time(Local::now().fixed_offset()).await
    }

    /// Opt in or out of the measurement notification stream.
    pub async fn enable_measurement_notifications(
        &mut self,
        enable: bool,
    ) -> Result<(), OperationError> {
        if enable {
            let rx = self
                .transport
                .subscribe(CharacteristicId::Measurement)
                .await?;
            self.measurement_rx = Some(rx);
        } else {
            // Dropping the receiver unsubscribes at the transport.
            self.measurement_rx = None;
        }
        Ok(())
    }

    // --- control-point operations ---------------------------------------

    /// Submit a control-point command. The outcome arrives later as a
    /// [`CgmEvent::ControlPoint`]; only submission failures are returned
    /// here. Rejected with `OperationInProgress` while another command is
    /// outstanding — nothing reaches the transport in that case.
    pub async fn submit(&mut self, command: CgmcpCommand) -> Result<(), OperationError> {
        if self.ops.is_busy() {
            return Err(OperationError::OperationInProgress);
        }
        let payload = command.encode(&self.context)?;
        self.ops
            .begin(command.op_code(), command.expected_response())?;
        if let Err(error) = self
            .transport
            .write(CharacteristicId::SpecificOpsControlPoint, &payload)
            .await
        {
            self.ops.abandon();
            return Err(error.into());
        }
        debug!(op_code = command.op_code(), "Submitted control-point command");
        self.cgmcp_deadline = Some(Instant::now() + self.config.op_timeout());
        Ok(())
    }

    pub async fn start_session(&mut self) -> Result<(), OperationError> {
        self.submit(CgmcpCommand::StartSession).await
    }

    pub async fn stop_session(&mut self) -> Result<(), OperationError> {
        self.submit(CgmcpCommand::StopSession).await
    }

    pub async fn reset_device_specific_alert(&mut self) -> Result<(), OperationError> {
        self.submit(CgmcpCommand::ResetDeviceSpecificAlert).await
    }

    pub async fn set_communication_interval(&mut self, minutes: u8) -> Result<(), OperationError> {
        self.submit(CgmcpCommand::SetCommunicationInterval { minutes })
            .await
    }

    /// Disable periodic communication entirely.
    pub async fn disable_periodic_communication(&mut self) -> Result<(), OperationError> {
        self.set_communication_interval(COMM_INTERVAL_DISABLED).await
    }

    /// Ask for the fastest interval the sensor supports.
    pub async fn set_fastest_communication_interval(&mut self) -> Result<(), OperationError> {
        self.set_communication_interval(COMM_INTERVAL_FASTEST).await
    }

    pub async fn get_communication_interval(&mut self) -> Result<(), OperationError> {
        self.submit(CgmcpCommand::GetCommunicationInterval).await
    }

    /// Calibrate against a reference measurement taken at `date`.
    pub async fn set_calibration(
        &mut self,
        value: f64,
        fluid_type: FluidType,
        sample_location: SampleLocation,
        date: DateTime<FixedOffset>,
    ) -> Result<(), OperationError> {
        self.submit(CgmcpCommand::SetCalibration {
            value,
            fluid_type,
            sample_location,
            date,
        })
        .await
    }

    pub async fn get_calibration_record(
        &mut self,
        record_number: u16,
    ) -> Result<(), OperationError> {
        self.submit(CgmcpCommand::GetCalibration { record_number })
            .await
    }

    pub async fn get_most_recent_calibration_record(&mut self) -> Result<(), OperationError> {
        self.get_calibration_record(CALIBRATION_RECORD_MOST_RECENT)
            .await
    }

    pub async fn set_alert_level(
        &mut self,
        alert: AlertKind,
        level: f64,
    ) -> Result<(), OperationError> {
        self.submit(CgmcpCommand::SetAlertLevel { alert, level })
            .await
    }

    pub async fn get_alert_level(&mut self, alert: AlertKind) -> Result<(), OperationError> {
        self.submit(CgmcpCommand::GetAlertLevel { alert }).await
    }

    // --- stored-record retrieval ----------------------------------------

    /// Open a retrieval procedure. Records stream in as measurement
    /// notifications and the procedure closes with a
    /// [`CgmEvent::Transfer`]. Rejected with `OperationInProgress` while
    /// another procedure is open.
    pub async fn submit_retrieval(&mut self, command: RacpCommand) -> Result<(), OperationError> {
        if self.transfers.is_active() {
            return Err(OperationError::OperationInProgress);
        }
        let payload = command.encode(&self.context)?;
        self.transfers
            .begin(command.op_code(), command.streams_records())?;
        if let Err(error) = self
            .transport
            .write(CharacteristicId::RecordAccessControlPoint, &payload)
            .await
        {
            self.transfers.abandon();
            return Err(error.into());
        }
        debug!(op_code = command.op_code(), "Submitted retrieval procedure");
        self.racp_deadline = Some(Instant::now() + self.config.op_timeout());
        Ok(())
    }

    pub async fn get_all_stored_records(&mut self) -> Result<(), OperationError> {
        self.submit_retrieval(RacpCommand::ReportAllRecords).await
    }

    pub async fn get_stored_records_since(
        &mut self,
        since: DateTime<FixedOffset>,
    ) -> Result<(), OperationError> {
        self.submit_retrieval(RacpCommand::ReportRecordsSince { since })
            .await
    }

    pub async fn get_stored_record_count(&mut self) -> Result<(), OperationError> {
        self.submit_retrieval(RacpCommand::ReportRecordCount).await
    }

    pub async fn get_stored_record_count_since(
        &mut self,
        since: DateTime<FixedOffset>,
    ) -> Result<(), OperationError> {
        self.submit_retrieval(RacpCommand::ReportRecordCountSince { since })
            .await
    }

    // --- event dispatch --------------------------------------------------

    /// Consume transport events until the link drops.
    pub async fn run(&mut self) -> Result<(), OperationError> {
        while self.step().await? {}
        Ok(())
    }

    /// Wait for and dispatch one transport event. Returns `false` once
    /// the link is gone and every outstanding operation has been resolved
    /// with `ConnectionLost`.
    pub async fn step(&mut self) -> Result<bool, OperationError> {
        let cgmcp_deadline = self.cgmcp_deadline;
        let racp_deadline = self.racp_deadline;

        tokio::select! {
            biased;

            changed = self.connection_rx.changed() => {
                let state = match changed {
                    Ok(()) => *self.connection_rx.borrow_and_update(),
                    // Transport dropped its sender; treat as link loss.
                    Err(_) => ConnectionState::Disconnected,
                };
                if state == ConnectionState::Disconnected {
                    self.handle_disconnected();
                    return Ok(false);
                }
                let _ = self.events.send(CgmEvent::Connection(state));
            }

            received = recv_from(&mut self.cgmcp_rx) => {
                match received {
                    Some(bytes) => self.handle_cgmcp_indication(&bytes),
                    None => self.cgmcp_rx = None,
                }
            }

            received = recv_from(&mut self.racp_rx) => {
                match received {
                    Some(bytes) => self.handle_racp_indication(&bytes),
                    None => self.racp_rx = None,
                }
            }

            received = recv_from(&mut self.measurement_rx) => {
                match received {
                    Some(bytes) => self.handle_measurement(&bytes),
                    None => self.measurement_rx = None,
                }
            }

            _ = tokio::time::sleep_until(cgmcp_deadline.unwrap_or_else(Instant::now)),
                if cgmcp_deadline.is_some() =>
            {
                self.cgmcp_deadline = None;
                if let Some(outcome) = self.ops.on_timeout() {
                    warn!(op_code = outcome.op_code(), "Control-point operation timed out");
                    let _ = self.events.send(CgmEvent::ControlPoint(outcome));
                }
            }

            _ = tokio::time::sleep_until(racp_deadline.unwrap_or_else(Instant::now)),
                if racp_deadline.is_some() =>
            {
                self.racp_deadline = None;
                if let Some(outcome) = self.transfers.on_timeout() {
                    warn!("Retrieval procedure timed out");
                    let _ = self.events.send(CgmEvent::Transfer(outcome));
                }
            }
        }

        Ok(true)
    }

    fn handle_cgmcp_indication(&mut self, bytes: &[u8]) {
        match cgmcp::parse_indication(bytes, &self.context) {
            Ok(indication) => {
                if indication.crc_failed == Some(true) {
                    warn!("control-point indication failed CRC verification");
                }
                if let Some(outcome) = self.ops.on_indication(&indication.response) {
                    self.cgmcp_deadline = None;
                    let _ = self.events.send(CgmEvent::ControlPoint(outcome));
                }
            }
            Err(error) => {
                let _ = self.events.send(CgmEvent::DecodeRejected {
                    characteristic: CharacteristicId::SpecificOpsControlPoint,
                    error,
                });
            }
        }
    }

    fn handle_racp_indication(&mut self, bytes: &[u8]) {
        match racp::parse_indication(bytes) {
            Ok(response) => {
                if let Some(outcome) = self.transfers.on_indication(&response) {
                    self.racp_deadline = None;
                    let _ = self.events.send(CgmEvent::Transfer(outcome));
                }
            }
            Err(error) => {
                let _ = self.events.send(CgmEvent::DecodeRejected {
                    characteristic: CharacteristicId::RecordAccessControlPoint,
                    error,
                });
            }
        }
    }

    fn handle_measurement(&mut self, bytes: &[u8]) {
        match decode::decode_measurement(bytes, &self.context) {
            Ok(record) => {
                if record.crc_failed == Some(true) {
                    warn!(
                        time_offset = record.time_offset,
                        "measurement failed CRC verification"
                    );
                }
                if let Some(live) = self.transfers.on_measurement(record) {
                    let _ = self.events.send(CgmEvent::Measurement(live));
                }
            }
            Err(error) => {
                let _ = self.events.send(CgmEvent::DecodeRejected {
                    characteristic: CharacteristicId::Measurement,
                    error,
                });
            }
        }
    }

    fn handle_disconnected(&mut self) {
        info!("Transport disconnected");
        self.cgmcp_deadline = None;
        self.racp_deadline = None;
        if let Some(outcome) = self.ops.on_disconnect() {
            let _ = self.events.send(CgmEvent::ControlPoint(outcome));
        }
        if let Some(outcome) = self.transfers.on_disconnect() {
            let _ = self.events.send(CgmEvent::Transfer(outcome));
        }
        self.measurement_rx = None;
        self.cgmcp_rx = None;
        self.racp_rx = None;
        let _ = self
            .events
            .send(CgmEvent::Connection(ConnectionState::Disconnected));
    }
}

/// Receive from an optional stream; an absent stream never yields.
async fn recv_from(
    stream: &mut Option<mpsc::UnboundedReceiver<Vec<u8>>>,
) -> Option<Vec<u8>> {
    match stream {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
