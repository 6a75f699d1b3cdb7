//! Bulk stored-record retrieval coordinator.
//!
//! A retrieval procedure is: one RACP write, zero or more measurement
//! notifications, one terminal RACP indication. Measurements arriving
//! while a record-streaming transfer is open belong to that transfer, in
//! arrival order; at any other time they are live readings and pass
//! through to the caller. The count variant streams nothing and resolves
//! with a single number.

use tracing::{debug, warn};

use crate::domain::measurement::MeasurementRecord;
use crate::error::OperationError;
use crate::protocol::racp::{self, RacpResponse};

/// Terminal outcome of a retrieval procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// The transfer closed successfully with the streamed records.
    Completed {
        op_code: u8,
        records: Vec<MeasurementRecord>,
    },
    Count { count: u16 },
    Failed { op_code: u8, response_code: u8 },
    TimedOut { op_code: u8 },
    ConnectionLost { op_code: u8 },
}

#[derive(Debug)]
enum TransferState {
    Idle,
    Active {
        op_code: u8,
        streams_records: bool,
        records: Vec<MeasurementRecord>,
    },
}

/// Tracks the single open retrieval procedure.
#[derive(Debug)]
pub struct RetrievalCoordinator {
    state: TransferState,
}

impl Default for RetrievalCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrievalCoordinator {
    pub fn new() -> Self {
        Self {
            state: TransferState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, TransferState::Active { .. })
    }

    /// Open a transfer. Rejected without side effects while another one
    /// is open.
    pub fn begin(&mut self, op_code: u8, streams_records: bool) -> Result<(), OperationError> {
        if self.is_active() {
            return Err(OperationError::OperationInProgress);
        }
        self.state = TransferState::Active {
            op_code,
            streams_records,
            records: Vec::new(),
        };
        Ok(())
    }

    /// Release the claim after a transport write failed.
    pub fn abandon(&mut self) {
        self.state = TransferState::Idle;
    }

    /// Route a decoded measurement. Returns the record when it is a live
    /// reading; `None` when it was absorbed into the open transfer.
    pub fn on_measurement(&mut self, record: MeasurementRecord) -> Option<MeasurementRecord> {
        match &mut self.state {
            TransferState::Active {
                streams_records: true,
                records,
                ..
            } => {
                records.push(record);
                None
            }
            _ => Some(record),
        }
    }

    /// Feed a parsed RACP indication. `None` means it did not belong to
    /// the open transfer.
    pub fn on_indication(&mut self, response: &RacpResponse) -> Option<TransferOutcome> {
        let TransferState::Active { op_code, .. } = &self.state else {
            warn!("unsolicited RACP indication: {response:?}");
            return None;
        };
        let op_code = *op_code;

        match response {
            RacpResponse::NumberOfRecords(count) => {
                if op_code != racp::op::REPORT_NUMBER_OF_STORED_RECORDS {
                    debug!("discarding record count nobody asked for");
                    return None;
                }
                self.state = TransferState::Idle;
                Some(TransferOutcome::Count { count: *count })
            }
            RacpResponse::ResponseCode {
                request_op_code,
                response_code,
            } => {
                if *request_op_code != op_code {
                    debug!(
                        "stale RACP response for opcode {request_op_code:#04x} \
                         while awaiting {op_code:#04x}"
                    );
                    return None;
                }
                let records = match std::mem::replace(&mut self.state, TransferState::Idle) {
                    TransferState::Active { records, .. } => records,
                    TransferState::Idle => Vec::new(),
                };
                if *response_code == racp::response_code::SUCCESS {
                    Some(TransferOutcome::Completed { op_code, records })
                } else {
                    Some(TransferOutcome::Failed {
                        op_code,
                        response_code: *response_code,
                    })
                }
            }
        }
    }

    pub fn on_timeout(&mut self) -> Option<TransferOutcome> {
        let TransferState::Active { op_code, .. } = &self.state else {
            return None;
        };
        let op_code = *op_code;
        self.state = TransferState::Idle;
        Some(TransferOutcome::TimedOut { op_code })
    }

    pub fn on_disconnect(&mut self) -> Option<TransferOutcome> {
        let TransferState::Active { op_code, .. } = &self.state else {
            return None;
        };
        let op_code = *op_code;
        self.state = TransferState::Idle;
        Some(TransferOutcome::ConnectionLost { op_code })
    }
}
