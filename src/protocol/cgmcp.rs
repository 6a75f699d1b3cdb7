//! Specific Ops Control Point: opcodes, command encoding, and response
//! parsing.
//!
//! Commands are written to the control point; the sensor answers with an
//! indication that is either a general response (request opcode + response
//! code), a direct value response, or a calibration record. Outgoing
//! buffers never carry the E2E-CRC; inbound indications do when the
//! session context says so.

use chrono::{DateTime, FixedOffset};

use crate::domain::calibration::CalibrationRecord;
use crate::domain::session::SessionContext;
use crate::domain::types::{join_type_location, split_type_location, FluidType, SampleLocation};
use crate::error::{DecodeError, EncodeError};
use crate::protocol::crc;
use crate::protocol::layout::{self, CRC_FIELD_SIZE};
use crate::protocol::sfloat::Sfloat;

/// CGMCP opcodes.
pub mod op {
    pub const COMM_INTERVAL_SET: u8 = 0x01;
    pub const COMM_INTERVAL_GET: u8 = 0x02;
    pub const COMM_INTERVAL_RESPONSE: u8 = 0x03;
    pub const CALIBRATION_SET: u8 = 0x04;
    pub const CALIBRATION_GET: u8 = 0x05;
    pub const CALIBRATION_RESPONSE: u8 = 0x06;
    pub const ALERT_PATIENT_HIGH_SET: u8 = 0x07;
    pub const ALERT_PATIENT_HIGH_GET: u8 = 0x08;
    pub const ALERT_PATIENT_HIGH_RESPONSE: u8 = 0x09;
    pub const ALERT_PATIENT_LOW_SET: u8 = 0x0A;
    pub const ALERT_PATIENT_LOW_GET: u8 = 0x0B;
    pub const ALERT_PATIENT_LOW_RESPONSE: u8 = 0x0C;
    pub const ALERT_HYPO_SET: u8 = 0x0D;
    pub const ALERT_HYPO_GET: u8 = 0x0E;
    pub const ALERT_HYPO_RESPONSE: u8 = 0x0F;
    pub const ALERT_HYPER_SET: u8 = 0x10;
    pub const ALERT_HYPER_GET: u8 = 0x11;
    pub const ALERT_HYPER_RESPONSE: u8 = 0x12;
    pub const ALERT_RATE_DECREASE_SET: u8 = 0x13;
    pub const ALERT_RATE_DECREASE_GET: u8 = 0x14;
    pub const ALERT_RATE_DECREASE_RESPONSE: u8 = 0x15;
    pub const ALERT_RATE_INCREASE_SET: u8 = 0x16;
    pub const ALERT_RATE_INCREASE_GET: u8 = 0x17;
    pub const ALERT_RATE_INCREASE_RESPONSE: u8 = 0x18;
    pub const DEVICE_SPECIFIC_ALERT_RESET: u8 = 0x19;
    pub const SESSION_START: u8 = 0x1A;
    pub const SESSION_STOP: u8 = 0x1B;
    pub const RESPONSE: u8 = 0x1C;
}

/// Communication interval operand for disabling periodic communication.
pub const COMM_INTERVAL_DISABLED: u8 = 0x00;
/// Communication interval operand selecting the fastest supported rate.
pub const COMM_INTERVAL_FASTEST: u8 = 0xFF;

/// Record number addressing the most recent calibration record.
pub const CALIBRATION_RECORD_MOST_RECENT: u16 = 0xFFFF;

/// Response code carried in a general response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CgmcpResponseCode {
    Success = 1,
    OpCodeNotSupported = 2,
    InvalidOperand = 3,
    ProcedureNotCompleted = 4,
    ParameterOutOfRange = 5,
}

impl TryFrom<u8> for CgmcpResponseCode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            1 => Self::Success,
            2 => Self::OpCodeNotSupported,
            3 => Self::InvalidOperand,
            4 => Self::ProcedureNotCompleted,
            5 => Self::ParameterOutOfRange,
            _ => {
                return Err(DecodeError::InvalidEnumValue {
                    field: "response code",
                    value,
                })
            }
        };
        Ok(code)
    }
}

/// The six settable/readable alert levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    PatientHigh,
    PatientLow,
    Hypo,
    Hyper,
    RateDecrease,
    RateIncrease,
}

impl AlertKind {
    pub fn set_op(&self) -> u8 {
        match self {
            Self::PatientHigh => op::ALERT_PATIENT_HIGH_SET,
            Self::PatientLow => op::ALERT_PATIENT_LOW_SET,
            Self::Hypo => op::ALERT_HYPO_SET,
            Self::Hyper => op::ALERT_HYPER_SET,
            Self::RateDecrease => op::ALERT_RATE_DECREASE_SET,
            Self::RateIncrease => op::ALERT_RATE_INCREASE_SET,
        }
    }

    pub fn get_op(&self) -> u8 {
        self.set_op() + 1
    }

    pub fn response_op(&self) -> u8 {
        self.set_op() + 2
    }
}

/// How the sensor is expected to answer an outstanding command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// A general response echoing the request opcode.
    General,
    /// A direct value response with the given response opcode (a general
    /// response still signals failure).
    Value { response_op: u8 },
    /// A calibration record (or a general response on failure).
    Calibration,
}

/// An encodable control-point command.
#[derive(Debug, Clone, PartialEq)]
pub enum CgmcpCommand {
    SetCommunicationInterval {
        minutes: u8,
    },
    GetCommunicationInterval,
    SetCalibration {
        /// Glucose concentration in mg/dl.
        value: f64,
        fluid_type: FluidType,
        sample_location: SampleLocation,
        /// When the calibration measurement was taken; converted to a
        /// minute offset from the session start time.
        date: DateTime<FixedOffset>,
    },
    GetCalibration {
        record_number: u16,
    },
    SetAlertLevel {
        alert: AlertKind,
        /// mg/dl for the level alerts, (mg/dl)/min for the rate alerts.
        level: f64,
    },
    GetAlertLevel {
        alert: AlertKind,
    },
    ResetDeviceSpecificAlert,
    StartSession,
    StopSession,
}

impl CgmcpCommand {
    pub fn op_code(&self) -> u8 {
        match self {
            Self::SetCommunicationInterval { .. } => op::COMM_INTERVAL_SET,
            Self::GetCommunicationInterval => op::COMM_INTERVAL_GET,
            Self::SetCalibration { .. } => op::CALIBRATION_SET,
            Self::GetCalibration { .. } => op::CALIBRATION_GET,
            Self::SetAlertLevel { alert, .. } => alert.set_op(),
            Self::GetAlertLevel { alert } => alert.get_op(),
            Self::ResetDeviceSpecificAlert => op::DEVICE_SPECIFIC_ALERT_RESET,
            Self::StartSession => op::SESSION_START,
            Self::StopSession => op::SESSION_STOP,
        }
    }

    pub fn expected_response(&self) -> ResponseShape {
        match self {
            Self::GetCommunicationInterval => ResponseShape::Value {
                response_op: op::COMM_INTERVAL_RESPONSE,
            },
            Self::GetAlertLevel { alert } => ResponseShape::Value {
                response_op: alert.response_op(),
            },
            Self::GetCalibration { .. } => ResponseShape::Calibration,
            _ => ResponseShape::General,
        }
    }

    /// Produce the exact outgoing write buffer.
    pub fn encode(&self, context: &SessionContext) -> Result<Vec<u8>, EncodeError> {
        let mut buffer = vec![self.op_code()];
        match self {
            Self::SetCommunicationInterval { minutes } => buffer.push(*minutes),
            Self::GetCommunicationInterval
            | Self::ResetDeviceSpecificAlert
            | Self::StartSession
            | Self::StopSession
            | Self::GetAlertLevel { .. } => {}
            Self::SetCalibration {
                value,
                fluid_type,
                sample_location,
                date,
            } => {
                let time_offset = context.time_offset_for(*date)?;
                buffer.extend_from_slice(&glucose_sfloat_bytes(*value)?);
                buffer.extend_from_slice(&time_offset.to_le_bytes());
                buffer.push(join_type_location(*fluid_type, *sample_location));
                // Next calibration time, record number, and status are
                // assigned by the sensor; zero on the way out.
                buffer.extend_from_slice(&0u16.to_le_bytes());
                buffer.extend_from_slice(&0u16.to_le_bytes());
                buffer.push(0);
            }
            Self::GetCalibration { record_number } => {
                buffer.extend_from_slice(&record_number.to_le_bytes());
            }
            Self::SetAlertLevel { level, .. } => {
                buffer.extend_from_slice(&glucose_sfloat_bytes(*level)?);
            }
        }
        Ok(buffer)
    }
}

/// Encode a glucose-scaled value, preferring integer resolution and
/// falling back to tenths.
fn glucose_sfloat_bytes(value: f64) -> Result<[u8; 2], EncodeError> {
    let exponent = if value.fract() == 0.0 { 0 } else { -1 };
    Sfloat::Value(value).to_le_bytes(exponent)
}

/// A parsed control-point indication.
#[derive(Debug, Clone, PartialEq)]
pub enum CgmcpResponse {
    General {
        request_op_code: u8,
        response_code: CgmcpResponseCode,
    },
    CommunicationInterval(u8),
    AlertLevel {
        response_op: u8,
        level: Sfloat,
    },
    Calibration(CalibrationRecord),
}

/// A control-point indication plus its CRC verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct CgmcpIndication {
    pub response: CgmcpResponse,
    pub crc_failed: Option<bool>,
}

/// Parse an inbound CGMCP indication under the session context.
pub fn parse_indication(
    bytes: &[u8],
    context: &SessionContext,
) -> Result<CgmcpIndication, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::TooShort { needed: 1, got: 0 });
    }

    let op_code = bytes[layout::CGMCP_OP_CODE.offset];
    let body_len = match op_code {
        op::RESPONSE => layout::CGMCP_RESPONSE_CODE.end(),
        op::COMM_INTERVAL_RESPONSE => layout::CGMCP_COMM_INTERVAL.end(),
        op::ALERT_PATIENT_HIGH_RESPONSE
        | op::ALERT_PATIENT_LOW_RESPONSE
        | op::ALERT_HYPO_RESPONSE
        | op::ALERT_HYPER_RESPONSE
        | op::ALERT_RATE_DECREASE_RESPONSE
        | op::ALERT_RATE_INCREASE_RESPONSE => layout::CGMCP_SFLOAT_OPERAND.end(),
        op::CALIBRATION_RESPONSE => layout::CGMCP_CALIBRATION_STATUS.end(),
        _ => return Err(DecodeError::UnknownOpCode(op_code)),
    };

    let record_len = if context.crc_supported() {
        body_len + CRC_FIELD_SIZE
    } else {
        body_len
    };
    if bytes.len() < record_len {
        return Err(DecodeError::TooShort {
            needed: record_len,
            got: bytes.len(),
        });
    }

    let crc_failed = context
        .crc_supported()
        .then(|| !crc::verify(&bytes[..record_len]));

    let response = match op_code {
        op::RESPONSE => CgmcpResponse::General {
            request_op_code: bytes[layout::CGMCP_REQUEST_OP_CODE.offset],
            response_code: CgmcpResponseCode::try_from(bytes[layout::CGMCP_RESPONSE_CODE.offset])?,
        },
        op::COMM_INTERVAL_RESPONSE => {
            CgmcpResponse::CommunicationInterval(bytes[layout::CGMCP_COMM_INTERVAL.offset])
        }
        op::CALIBRATION_RESPONSE => CgmcpResponse::Calibration(parse_calibration_operand(bytes)?),
        response_op => CgmcpResponse::AlertLevel {
            response_op,
            level: Sfloat::from_le_bytes([
                bytes[layout::CGMCP_SFLOAT_OPERAND.offset],
                bytes[layout::CGMCP_SFLOAT_OPERAND.offset + 1],
            ]),
        },
    };

    Ok(CgmcpIndication {
        response,
        crc_failed,
    })
}

fn parse_calibration_operand(bytes: &[u8]) -> Result<CalibrationRecord, DecodeError> {
    let (fluid_type, sample_location) =
        split_type_location(bytes[layout::CGMCP_CALIBRATION_TYPE_LOCATION.offset])?;
    Ok(CalibrationRecord {
        glucose: Sfloat::from_le_bytes([
            bytes[layout::CGMCP_CALIBRATION_GLUCOSE.offset],
            bytes[layout::CGMCP_CALIBRATION_GLUCOSE.offset + 1],
        ]),
        time_offset: read_u16(bytes, layout::CGMCP_CALIBRATION_TIME),
        fluid_type,
        sample_location,
        next_calibration_offset: read_u16(bytes, layout::CGMCP_CALIBRATION_TIME_NEXT),
        record_number: read_u16(bytes, layout::CGMCP_CALIBRATION_RECORD_NUMBER),
        status: bytes[layout::CGMCP_CALIBRATION_STATUS.offset],
    })
}

fn read_u16(bytes: &[u8], range: layout::FieldRange) -> u16 {
    u16::from_le_bytes([bytes[range.offset], bytes[range.offset + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::SessionStartTime;
    use crate::domain::types::DstOffset;
    use chrono::TimeZone;

    fn context() -> SessionContext {
        SessionContext::new()
    }

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
    fn encodes_fixed_shape_commands() {
        let context = context();
        assert_eq!(
            CgmcpCommand::SetCommunicationInterval { minutes: 5 }
                .encode(&context)
                .unwrap(),
            vec![0x01, 0x05]
        );
        assert_eq!(
            CgmcpCommand::GetCommunicationInterval
                .encode(&context)
                .unwrap(),
            vec![0x02]
        );
        assert_eq!(
            CgmcpCommand::StartSession.encode(&context).unwrap(),
            vec![0x1A]
        );
        assert_eq!(
            CgmcpCommand::StopSession.encode(&context).unwrap(),
            vec![0x1B]
        );
        assert_eq!(
            CgmcpCommand::ResetDeviceSpecificAlert
                .encode(&context)
                .unwrap(),
            vec![0x19]
        );
    }

    #[test]
    fn encodes_alert_levels_as_sfloat() {
        let buffer = CgmcpCommand::SetAlertLevel {
            alert: AlertKind::Hyper,
            level: 180.0,
        }
        .encode(&context())
        .unwrap();
        assert_eq!(buffer, vec![0x10, 0xB4, 0x00]);

        let buffer = CgmcpCommand::SetAlertLevel {
            alert: AlertKind::RateIncrease,
            level: 3.5,
        }
        .encode(&context())
        .unwrap();
        assert_eq!(buffer, vec![0x16, 0x23, 0xF0]);
    }

    #[test]
    fn encodes_get_calibration_record_number() {
        let buffer = CgmcpCommand::GetCalibration {
            record_number: CALIBRATION_RECORD_MOST_RECENT,
        }
        .encode(&context())
        .unwrap();
        assert_eq!(buffer, vec![0x05, 0xFF, 0xFF]);
    }

    #[test]
    fn calibration_set_converts_date_to_offset() {
        let context = context_with_start();
        let date = chrono::FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2015, 3, 2, 10, 0, 0)
            .unwrap();
        let buffer = CgmcpCommand::SetCalibration {
            value: 102.0,
            fluid_type: FluidType::CapillaryWholeBlood,
            sample_location: SampleLocation::Finger,
            date,
        }
        .encode(&context)
        .unwrap();
        assert_eq!(
            buffer,
            vec![0x04, 0x66, 0x00, 0x3C, 0x00, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn calibration_set_without_session_start_fails() {
        let date = chrono::FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2015, 3, 2, 10, 0, 0)
            .unwrap();
        let result = CgmcpCommand::SetCalibration {
            value: 102.0,
            fluid_type: FluidType::CapillaryWholeBlood,
            sample_location: SampleLocation::Finger,
            date,
        }
        .encode(&context());
        assert_eq!(result, Err(EncodeError::NoSessionReference));
    }

    #[test]
    fn expected_responses_follow_the_opcode_family() {
        assert_eq!(
            CgmcpCommand::StartSession.expected_response(),
            ResponseShape::General
        );
        assert_eq!(
            CgmcpCommand::GetCommunicationInterval.expected_response(),
            ResponseShape::Value {
                response_op: op::COMM_INTERVAL_RESPONSE
            }
        );
        assert_eq!(
            CgmcpCommand::GetAlertLevel {
                alert: AlertKind::Hypo
            }
            .expected_response(),
            ResponseShape::Value {
                response_op: op::ALERT_HYPO_RESPONSE
            }
        );
        assert_eq!(
            CgmcpCommand::GetCalibration { record_number: 1 }.expected_response(),
            ResponseShape::Calibration
        );
    }

    #[test]
    fn parses_general_response() {
        let indication = parse_indication(&[0x1C, 0x01, 0x01], &context()).unwrap();
        assert_eq!(
            indication.response,
            CgmcpResponse::General {
                request_op_code: op::COMM_INTERVAL_SET,
                response_code: CgmcpResponseCode::Success,
            }
        );
        assert_eq!(indication.crc_failed, None);
    }

    #[test]
    fn parses_comm_interval_response() {
        let indication = parse_indication(&[0x03, 0x05], &context()).unwrap();
        assert_eq!(
            indication.response,
            CgmcpResponse::CommunicationInterval(5)
        );
    }

    #[test]
    fn parses_alert_level_response() {
        let indication = parse_indication(&[0x12, 0xB4, 0x00], &context()).unwrap();
        assert_eq!(
            indication.response,
            CgmcpResponse::AlertLevel {
                response_op: op::ALERT_HYPER_RESPONSE,
                level: Sfloat::Value(180.0),
            }
        );
    }

    #[test]
    fn parses_calibration_response() {
        let bytes = [
            0x06, 0x66, 0x00, 0x3C, 0x00, 0x11, 0xA4, 0x05, 0x02, 0x00, 0x00,
        ];
        let indication = parse_indication(&bytes, &context()).unwrap();
        let CgmcpResponse::Calibration(record) = indication.response else {
            panic!("expected calibration response");
        };
        assert_eq!(record.glucose, Sfloat::Value(102.0));
        assert_eq!(record.time_offset, 60);
        assert_eq!(record.fluid_type, FluidType::CapillaryWholeBlood);
        assert_eq!(record.sample_location, SampleLocation::Finger);
        assert_eq!(record.next_calibration_offset, 1444);
        assert_eq!(record.record_number, 2);
        assert!(record.was_accepted());
    }

    #[test]
    fn unknown_inbound_opcode_is_rejected() {
        assert_eq!(
            parse_indication(&[0x01, 0x05], &context()),
            Err(DecodeError::UnknownOpCode(0x01))
        );
    }

    #[test]
    fn crc_context_checks_the_trailer() {
        let mut context = SessionContext::new();
        let feature_bytes = {
            let mut bytes = vec![0x00, 0x10, 0x00, 0x11];
            bytes.extend_from_slice(&crc::checksum(&bytes).to_le_bytes());
            bytes
        };
        context.adopt_features(crate::protocol::decode::decode_feature(&feature_bytes).unwrap());

        let mut bytes = vec![0x1C, 0x1A, 0x01];
        bytes.extend_from_slice(&crc::checksum(&bytes).to_le_bytes());
        let indication = parse_indication(&bytes, &context).unwrap();
        assert_eq!(indication.crc_failed, Some(false));

        // Without the trailer the indication is short.
        assert_eq!(
            parse_indication(&[0x1C, 0x1A, 0x01], &context),
            Err(DecodeError::TooShort { needed: 5, got: 3 })
        );
    }
}
