//! Record Access Control Point.
//!
//! The opcode, operator, and response-code spaces are profile-wide
//! constants shared with the other glucose services; retrieval filters on
//! the CGM service use the time-offset operand. Stored records themselves
//! arrive as ordinary measurement notifications; only the procedure
//! bookkeeping travels over this characteristic. RACP payloads carry no
//! E2E-CRC.

use chrono::{DateTime, FixedOffset};

use crate::domain::session::SessionContext;
use crate::error::{DecodeError, EncodeError};
use crate::protocol::layout::FieldRange;

/// RACP opcodes.
pub mod op {
    pub const REPORT_STORED_RECORDS: u8 = 0x01;
    pub const DELETE_STORED_RECORDS: u8 = 0x02;
    pub const ABORT_OPERATION: u8 = 0x03;
    pub const REPORT_NUMBER_OF_STORED_RECORDS: u8 = 0x04;
    pub const NUMBER_OF_STORED_RECORDS_RESPONSE: u8 = 0x05;
    pub const RESPONSE_CODE: u8 = 0x06;
}

/// RACP operators.
pub mod operator {
    pub const NULL: u8 = 0x00;
    pub const ALL_RECORDS: u8 = 0x01;
    pub const LESS_THAN_OR_EQUAL: u8 = 0x02;
    pub const GREATER_THAN_OR_EQUAL: u8 = 0x03;
    pub const WITHIN_RANGE: u8 = 0x04;
    pub const FIRST_RECORD: u8 = 0x05;
    pub const LAST_RECORD: u8 = 0x06;
}

/// Operand filter types.
pub mod filter {
    pub const TIME_OFFSET: u8 = 0x01;
}

/// RACP response code values.
pub mod response_code {
    pub const SUCCESS: u8 = 0x01;
    pub const OP_CODE_NOT_SUPPORTED: u8 = 0x02;
    pub const INVALID_OPERATOR: u8 = 0x03;
    pub const OPERATOR_NOT_SUPPORTED: u8 = 0x04;
    pub const INVALID_OPERAND: u8 = 0x05;
    pub const NO_RECORDS_FOUND: u8 = 0x06;
    pub const ABORT_UNSUCCESSFUL: u8 = 0x07;
    pub const PROCEDURE_NOT_COMPLETED: u8 = 0x08;
    pub const OPERAND_NOT_SUPPORTED: u8 = 0x09;
}

const RESPONSE_REQUEST_OP: FieldRange = FieldRange { offset: 2, len: 1 };
const RESPONSE_CODE_VALUE: FieldRange = FieldRange { offset: 3, len: 1 };
const RECORD_COUNT: FieldRange = FieldRange { offset: 2, len: 2 };

/// A record-retrieval procedure request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RacpCommand {
    ReportAllRecords,
    /// Records with a time offset at or after the given date.
    ReportRecordsSince { since: DateTime<FixedOffset> },
    ReportRecordCount,
    ReportRecordCountSince { since: DateTime<FixedOffset> },
    AbortOperation,
}

impl RacpCommand {
    pub fn op_code(&self) -> u8 {
        match self {
            Self::ReportAllRecords | Self::ReportRecordsSince { .. } => op::REPORT_STORED_RECORDS,
            Self::ReportRecordCount | Self::ReportRecordCountSince { .. } => {
                op::REPORT_NUMBER_OF_STORED_RECORDS
            }
            Self::AbortOperation => op::ABORT_OPERATION,
        }
    }

    /// Whether this procedure streams measurement records before its
    /// terminal response.
    pub fn streams_records(&self) -> bool {
        matches!(self, Self::ReportAllRecords | Self::ReportRecordsSince { .. })
    }

    /// Produce the exact outgoing write buffer. Date filters become
    /// minute offsets relative to the session start time.
    pub fn encode(&self, context: &SessionContext) -> Result<Vec<u8>, EncodeError> {
        let buffer = match self {
            Self::ReportAllRecords => vec![op::REPORT_STORED_RECORDS, operator::ALL_RECORDS],
            Self::ReportRecordCount => {
                vec![op::REPORT_NUMBER_OF_STORED_RECORDS, operator::ALL_RECORDS]
            }
            Self::AbortOperation => vec![op::ABORT_OPERATION, operator::NULL],
            Self::ReportRecordsSince { since } | Self::ReportRecordCountSince { since } => {
                let offset = context.time_offset_for(*since)?;
                let mut buffer = vec![
                    self.op_code(),
                    operator::GREATER_THAN_OR_EQUAL,
                    filter::TIME_OFFSET,
                ];
                buffer.extend_from_slice(&offset.to_le_bytes());
                buffer
            }
        };
        Ok(buffer)
    }
}

/// A parsed RACP indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacpResponse {
    /// Terminal response for a procedure.
    ResponseCode {
        request_op_code: u8,
        response_code: u8,
    },
    /// Answer to a number-of-records request.
    NumberOfRecords(u16),
}

impl RacpResponse {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RacpResponse::ResponseCode {
                response_code: response_code::SUCCESS,
                ..
            } | RacpResponse::NumberOfRecords(_)
        )
    }
}

/// Parse an inbound RACP indication.
pub fn parse_indication(bytes: &[u8]) -> Result<RacpResponse, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::TooShort { needed: 1, got: 0 });
    }

    match bytes[0] {
        op::RESPONSE_CODE => {
            if bytes.len() < RESPONSE_CODE_VALUE.end() {
                return Err(DecodeError::TooShort {
                    needed: RESPONSE_CODE_VALUE.end(),
                    got: bytes.len(),
                });
            }
            Ok(RacpResponse::ResponseCode {
                request_op_code: bytes[RESPONSE_REQUEST_OP.offset],
                response_code: bytes[RESPONSE_CODE_VALUE.offset],
            })
        }
        op::NUMBER_OF_STORED_RECORDS_RESPONSE => {
            if bytes.len() < RECORD_COUNT.end() {
                return Err(DecodeError::TooShort {
                    needed: RECORD_COUNT.end(),
                    got: bytes.len(),
                });
            }
            Ok(RacpResponse::NumberOfRecords(u16::from_le_bytes([
                bytes[RECORD_COUNT.offset],
                bytes[RECORD_COUNT.offset + 1],
            ])))
        }
        other => Err(DecodeError::UnknownOpCode(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::SessionStartTime;
    use crate::domain::types::DstOffset;
    use chrono::TimeZone;

    fn context_with_start() -> SessionContext {
        let mut context = SessionContext::new();
        context.adopt_session_start_time(SessionStartTime {
            year: Some(2015),
            month: Some(3),
            day: Some(2),
            hour: 9,
            minute: 0,
            second: 0,
            time_zone_quarters: Some(0),
            dst: DstOffset::StandardTime,
            crc_failed: None,
        });
        context
    }

    #[test]
    fn encodes_all_records_request() {
        let buffer = RacpCommand::ReportAllRecords
            .encode(&SessionContext::new())
            .unwrap();
        assert_eq!(buffer, vec![0x01, 0x01]);
    }

    #[test]
    fn encodes_count_request() {
        let buffer = RacpCommand::ReportRecordCount
            .encode(&SessionContext::new())
            .unwrap();
        assert_eq!(buffer, vec![0x04, 0x01]);
    }

    #[test]
    fn encodes_since_filter_as_time_offset() {
        let since = chrono::FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2015, 3, 2, 11, 0, 0)
            .unwrap();
        let buffer = RacpCommand::ReportRecordsSince { since }
            .encode(&context_with_start())
            .unwrap();
        assert_eq!(buffer, vec![0x01, 0x03, 0x01, 0x78, 0x00]);
    }

    #[test]
    fn since_filter_needs_a_session_reference() {
        let since = chrono::FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2015, 3, 2, 11, 0, 0)
            .unwrap();
        assert_eq!(
            RacpCommand::ReportRecordsSince { since }.encode(&SessionContext::new()),
            Err(EncodeError::NoSessionReference)
        );
    }

    #[test]
    fn parses_terminal_response() {
        let response = parse_indication(&[0x06, 0x00, 0x01, 0x01]).unwrap();
        assert_eq!(
            response,
            RacpResponse::ResponseCode {
                request_op_code: op::REPORT_STORED_RECORDS,
                response_code: response_code::SUCCESS,
            }
        );
        assert!(response.is_success());
    }

    #[test]
    fn parses_record_count() {
        let response = parse_indication(&[0x05, 0x00, 0x2A, 0x00]).unwrap();
        assert_eq!(response, RacpResponse::NumberOfRecords(42));
    }

    #[test]
    fn rejects_request_opcodes_inbound() {
        assert_eq!(
            parse_indication(&[0x01, 0x01]),
            Err(DecodeError::UnknownOpCode(0x01))
        );
    }
}
