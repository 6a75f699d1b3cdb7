//! Control-point operation state machine.
//!
//! One control-point operation may be outstanding at a time. The machine
//! is transport-free: the controller feeds it parsed indications, timeout
//! ticks, and disconnects, and it answers with at most one outcome per
//! outstanding operation before returning to idle. Stale indications —
//! general responses echoing a different request opcode, or direct values
//! of the wrong family — are discarded and the operation keeps waiting.

use tracing::{debug, warn};

use crate::domain::calibration::CalibrationRecord;
use crate::error::OperationError;
use crate::protocol::cgmcp::{CgmcpResponse, CgmcpResponseCode, ResponseShape};
use crate::protocol::sfloat::Sfloat;

/// Terminal outcome of a control-point operation.
#[derive(Debug, Clone, PartialEq)]
pub enum CgmcpOutcome {
    /// The sensor acknowledged the operation with a success response.
    Completed { op_code: u8 },
    CommunicationInterval { op_code: u8, minutes: u8 },
    AlertLevel { op_code: u8, level: Sfloat },
    Calibration { op_code: u8, record: CalibrationRecord },
    /// The sensor answered with a failure response code.
    Failed {
        op_code: u8,
        response_code: CgmcpResponseCode,
    },
    TimedOut { op_code: u8 },
    ConnectionLost { op_code: u8 },
}

impl CgmcpOutcome {
    /// Opcode of the operation this outcome belongs to.
    pub fn op_code(&self) -> u8 {
        match self {
            Self::Completed { op_code }
            | Self::CommunicationInterval { op_code, .. }
            | Self::AlertLevel { op_code, .. }
            | Self::Calibration { op_code, .. }
            | Self::Failed { op_code, .. }
            | Self::TimedOut { op_code }
            | Self::ConnectionLost { op_code } => *op_code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OpState {
    Idle,
    Awaiting { op_code: u8, expected: ResponseShape },
}

/// Tracks the single outstanding control-point operation.
#[derive(Debug)]
pub struct OperationTracker {
    state: OpState,
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTracker {
    pub fn new() -> Self {
        Self { state: OpState::Idle }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, OpState::Awaiting { .. })
    }

    pub fn pending_op_code(&self) -> Option<u8> {
        match self.state {
            OpState::Awaiting { op_code, .. } => Some(op_code),
            OpState::Idle => None,
        }
    }

    /// Claim the machine for a new operation. Rejected without side
    /// effects while another operation is outstanding.
    pub fn begin(&mut self, op_code: u8, expected: ResponseShape) -> Result<(), OperationError> {
        if self.is_busy() {
            return Err(OperationError::OperationInProgress);
        }
        self.state = OpState::Awaiting { op_code, expected };
        Ok(())
    }

    /// Release the claim after a transport write failed; nothing is
    /// outstanding on the device in that case.
    pub fn abandon(&mut self) {
        self.state = OpState::Idle;
    }

    /// Feed a parsed indication. `None` means the indication did not
    /// belong to the outstanding operation and the machine keeps waiting.
    pub fn on_indication(&mut self, response: &CgmcpResponse) -> Option<CgmcpOutcome> {
        let OpState::Awaiting { op_code, expected } = self.state else {
            warn!("unsolicited control-point indication: {response:?}");
            return None;
        };

        let outcome = match response {
            CgmcpResponse::General {
                request_op_code,
                response_code,
            } => {
                if *request_op_code != op_code {
                    debug!(
                        "stale general response for opcode {request_op_code:#04x} \
                         while awaiting {op_code:#04x}"
                    );
                    return None;
                }
                if *response_code == CgmcpResponseCode::Success {
                    CgmcpOutcome::Completed { op_code }
                } else {
                    CgmcpOutcome::Failed {
                        op_code,
                        response_code: *response_code,
                    }
                }
            }
            CgmcpResponse::CommunicationInterval(minutes) => {
                if expected
                    != (ResponseShape::Value {
                        response_op: crate::protocol::cgmcp::op::COMM_INTERVAL_RESPONSE,
                    })
                {
                    debug!("discarding communication interval response nobody asked for");
                    return None;
                }
                CgmcpOutcome::CommunicationInterval {
                    op_code,
                    minutes: *minutes,
                }
            }
            CgmcpResponse::AlertLevel { response_op, level } => {
                if expected != (ResponseShape::Value { response_op: *response_op }) {
                    debug!(
                        "discarding alert level response {response_op:#04x} \
                         while awaiting {op_code:#04x}"
                    );
                    return None;
                }
                CgmcpOutcome::AlertLevel {
                    op_code,
                    level: *level,
                }
            }
            CgmcpResponse::Calibration(record) => {
                if expected != ResponseShape::Calibration {
                    debug!("discarding calibration response nobody asked for");
                    return None;
                }
                CgmcpOutcome::Calibration {
                    op_code,
                    record: *record,
                }
            }
        };

        self.state = OpState::Idle;
        Some(outcome)
    }

    /// The configured deadline expired.
    pub fn on_timeout(&mut self) -> Option<CgmcpOutcome> {
        let OpState::Awaiting { op_code, .. } = self.state else {
            return None;
        };
        self.state = OpState::Idle;
        Some(CgmcpOutcome::TimedOut { op_code })
    }

    /// The transport disconnected.
    pub fn on_disconnect(&mut self) -> Option<CgmcpOutcome> {
        let OpState::Awaiting { op_code, .. } = self.state else {
            return None;
        };
        self.state = OpState::Idle;
        Some(CgmcpOutcome::ConnectionLost { op_code })
    }
}
