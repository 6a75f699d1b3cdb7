//! Application-layer codec and command orchestration for the BLE
//! Continuous Glucose Monitoring profile.
//!
//! This crate turns raw byte buffers from the CGM GATT characteristics
//! into structured glucose telemetry, encodes high-level requests into
//! control-point writes, and correlates the sensor's asynchronous
//! indications back to the request that caused them. The BLE stack itself
//! stays outside: platforms implement [`transport::GattTransport`] and
//! hand it to a [`controller::CgmController`].
//!
//! # Quick Start
//!
//! ```no_run
//! use cgm_collector::config::CollectorConfig;
//! use cgm_collector::controller::{CgmController, CgmEvent};
//! use tokio::sync::mpsc;
//!
//! # async fn example(transport: impl cgm_collector::transport::GattTransport) {
//! let (events_tx, mut events_rx) = mpsc::unbounded_channel();
//! let mut controller = CgmController::new(transport, CollectorConfig::default(), events_tx);
//!
//! controller.connect().await.unwrap();
//! controller.enable_measurement_notifications(true).await.unwrap();
//! controller.start_session().await.unwrap();
//!
//! tokio::spawn(async move {
//!     while let Some(event) = events_rx.recv().await {
//!         if let CgmEvent::Measurement(record) = event {
//!             println!("glucose: {:?} mg/dl", record.glucose_mg_dl());
//!         }
//!     }
//! });
//!
//! controller.run().await.unwrap();
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod transport;

// Core exports
pub use config::{CollectorConfig, ConfigService, LogConfig};
pub use controller::{CgmController, CgmEvent};
pub use controller::ops::CgmcpOutcome;
pub use controller::retrieval::TransferOutcome;
pub use domain::calibration::CalibrationRecord;
pub use domain::feature::CgmFeatures;
pub use domain::measurement::MeasurementRecord;
pub use domain::session::{SessionContext, SessionRunTime, SessionStartTime};
pub use domain::status::{SensorStatus, StatusRecord};
pub use domain::types::{DstOffset, FluidType, SampleLocation};
pub use error::{DecodeError, EncodeError, OperationError};
pub use protocol::cgmcp::{AlertKind, CgmcpCommand, CgmcpResponse, CgmcpResponseCode};
pub use protocol::racp::{RacpCommand, RacpResponse};
pub use protocol::sfloat::Sfloat;
pub use protocol::uuid::CharacteristicId;
pub use transport::{ConnectionState, GattTransport, TransportError};
