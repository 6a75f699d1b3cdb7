//! Characteristic payload decoders.
//!
//! Every decoder validates the buffer against the minimum length implied
//! by the characteristic and the session context before touching an
//! optional field, then reads fields in the profile-fixed order from the
//! layout tables. CRC verification never fails a decode: the record comes
//! back with `crc_failed = Some(true)` and the receiver decides.

use tracing::debug;

use crate::domain::feature::CgmFeatures;
use crate::domain::measurement::MeasurementRecord;
use crate::domain::session::{
    SessionContext, SessionRunTime, SessionStartTime, TIME_ZONE_UNKNOWN,
};
use crate::domain::status::{SensorStatus, StatusRecord};
use crate::domain::types::{split_type_location, DstOffset};
use crate::error::DecodeError;
use crate::protocol::cgmcp::{self, CgmcpIndication};
use crate::protocol::crc;
use crate::protocol::layout::{
    self, measurement_flags, MeasurementField, CRC_FIELD_SIZE, CRC_UNSUPPORTED_SENTINEL,
    MEASUREMENT_OPTIONAL_FIELDS,
};
use crate::protocol::racp::{self, RacpResponse};
use crate::protocol::sfloat::Sfloat;
use crate::protocol::uuid::CharacteristicId;

/// A decoded payload from any characteristic of the service.
#[derive(Debug, Clone, PartialEq)]
pub enum CgmRecord {
    Measurement(MeasurementRecord),
    Feature(CgmFeatures),
    Status(StatusRecord),
    SessionStartTime(SessionStartTime),
    SessionRunTime(SessionRunTime),
    ControlPoint(CgmcpIndication),
    RecordAccess(RacpResponse),
}

/// Decode a raw buffer read or notified from `kind` under `context`.
pub fn decode_characteristic(
    kind: CharacteristicId,
    bytes: &[u8],
    context: &SessionContext,
) -> Result<CgmRecord, DecodeError> {
    match kind {
        CharacteristicId::Measurement => {
            decode_measurement(bytes, context).map(CgmRecord::Measurement)
        }
        CharacteristicId::Feature => decode_feature(bytes).map(CgmRecord::Feature),
        CharacteristicId::Status => decode_status(bytes, context).map(CgmRecord::Status),
        CharacteristicId::SessionStartTime => {
            decode_session_start_time(bytes, context).map(CgmRecord::SessionStartTime)
        }
        CharacteristicId::SessionRunTime => {
            decode_session_run_time(bytes, context).map(CgmRecord::SessionRunTime)
        }
        CharacteristicId::SpecificOpsControlPoint => {
            cgmcp::parse_indication(bytes, context).map(CgmRecord::ControlPoint)
        }
        CharacteristicId::RecordAccessControlPoint => {
            racp::parse_indication(bytes).map(CgmRecord::RecordAccess)
        }
    }
}

fn ensure_len(bytes: &[u8], needed: usize) -> Result<(), DecodeError> {
    if bytes.len() < needed {
        return Err(DecodeError::TooShort {
            needed,
            got: bytes.len(),
        });
    }
    Ok(())
}

fn read_u16(bytes: &[u8], range: layout::FieldRange) -> u16 {
    u16::from_le_bytes([bytes[range.offset], bytes[range.offset + 1]])
}

fn read_sfloat(bytes: &[u8], range: layout::FieldRange) -> Sfloat {
    Sfloat::from_le_bytes([bytes[range.offset], bytes[range.offset + 1]])
}

/// Decode a CGM Measurement payload.
pub fn decode_measurement(
    bytes: &[u8],
    context: &SessionContext,
) -> Result<MeasurementRecord, DecodeError> {
    let fixed_len = layout::MEASUREMENT_TIME_OFFSET.end();
    ensure_len(bytes, fixed_len)?;

    let flags = bytes[layout::MEASUREMENT_FLAGS.offset];
    if flags & measurement_flags::RESERVED_MASK != 0 {
        return Err(DecodeError::ReservedFieldNonZero(flags));
    }

    // Total length implied by this record's own flags and the context,
    // before any optional field is read.
    let record_len: usize = fixed_len
        + MEASUREMENT_OPTIONAL_FIELDS
            .iter()
            .filter(|field| (field.present)(flags, context.crc_supported()))
            .map(|field| field.len)
            .sum::<usize>();
    ensure_len(bytes, record_len)?;

    let crc_failed = if context.crc_supported() {
        Some(!crc::verify(&bytes[..record_len]))
    } else {
        None
    };

    let glucose = read_sfloat(bytes, layout::MEASUREMENT_GLUCOSE);
    let time_offset = read_u16(bytes, layout::MEASUREMENT_TIME_OFFSET);

    let mut sensor_status = SensorStatus::default();
    let mut trend = None;
    let mut quality = None;
    let mut cursor = fixed_len;
    for field in MEASUREMENT_OPTIONAL_FIELDS {
        if !(field.present)(flags, context.crc_supported()) {
            continue;
        }
        match field.field {
            MeasurementField::StatusOctet => sensor_status.status = Some(bytes[cursor]),
            MeasurementField::CalTempOctet => sensor_status.cal_temp = Some(bytes[cursor]),
            MeasurementField::WarningOctet => sensor_status.warning = Some(bytes[cursor]),
            MeasurementField::Trend => {
                trend = Some(Sfloat::from_le_bytes([bytes[cursor], bytes[cursor + 1]]));
            }
            MeasurementField::Quality => {
                quality = Some(Sfloat::from_le_bytes([bytes[cursor], bytes[cursor + 1]]));
            }
            MeasurementField::Crc => {}
        }
        cursor += field.len;
    }

    Ok(MeasurementRecord {
        glucose,
        time_offset,
        trend,
        quality,
        sensor_status: (!sensor_status.is_empty()).then_some(sensor_status),
        crc_failed,
    })
}

/// Decode the CGM Feature payload. The trailing 16-bit field is always
/// present; it holds the CRC when bit 12 says so and 0xFFFF otherwise.
pub fn decode_feature(bytes: &[u8]) -> Result<CgmFeatures, DecodeError> {
    ensure_len(bytes, layout::FEATURE_CRC.end())?;

    let flags_range = layout::FEATURE_FLAGS;
    let bits = u32::from_le_bytes([
        bytes[flags_range.offset],
        bytes[flags_range.offset + 1],
        bytes[flags_range.offset + 2],
        0,
    ]);
    let (fluid_type, sample_location) =
        split_type_location(bytes[layout::FEATURE_TYPE_LOCATION.offset])?;

    let crc_supported = bits & crate::domain::feature::feature_flags::E2E_CRC != 0;
    let crc_failed = if crc_supported {
        Some(!crc::verify(&bytes[..layout::FEATURE_CRC.end()]))
    } else {
        if read_u16(bytes, layout::FEATURE_CRC) != CRC_UNSUPPORTED_SENTINEL {
            debug!("feature CRC field is not the unsupported sentinel");
        }
        None
    };

    Ok(CgmFeatures::new(bits, fluid_type, sample_location, crc_failed))
}

/// Decode the CGM Status payload; all three annunciation octets are
/// mandatory here.
pub fn decode_status(bytes: &[u8], context: &SessionContext) -> Result<StatusRecord, DecodeError> {
    let mut record_len = layout::STATUS_ANNUNCIATION.end();
    if context.crc_supported() {
        record_len += CRC_FIELD_SIZE;
    }
    ensure_len(bytes, record_len)?;

    let crc_failed = context
        .crc_supported()
        .then(|| !crc::verify(&bytes[..record_len]));

    let octets = layout::STATUS_ANNUNCIATION.offset;
    Ok(StatusRecord {
        time_offset: read_u16(bytes, layout::STATUS_TIME_OFFSET),
        sensor_status: SensorStatus {
            status: Some(bytes[octets]),
            cal_temp: Some(bytes[octets + 1]),
            warning: Some(bytes[octets + 2]),
        },
        crc_failed,
    })
}

/// Decode the CGM Session Start Time payload.
pub fn decode_session_start_time(
    bytes: &[u8],
    context: &SessionContext,
) -> Result<SessionStartTime, DecodeError> {
    let mut record_len = layout::SESSION_START_DST.end();
    if context.crc_supported() {
        record_len += CRC_FIELD_SIZE;
    }
    ensure_len(bytes, record_len)?;

    let crc_failed = context
        .crc_supported()
        .then(|| !crc::verify(&bytes[..record_len]));

    let year = read_u16(bytes, layout::SESSION_START_YEAR);
    let month = bytes[layout::SESSION_START_MONTH.offset];
    let day = bytes[layout::SESSION_START_DAY.offset];
    let hour = bytes[layout::SESSION_START_HOUR.offset];
    let minute = bytes[layout::SESSION_START_MINUTE.offset];
    let second = bytes[layout::SESSION_START_SECOND.offset];

    if month > 12 {
        return Err(DecodeError::InvalidEnumValue {
            field: "month",
            value: month,
        });
    }
    if day > 31 {
        return Err(DecodeError::InvalidEnumValue {
            field: "day",
            value: day,
        });
    }
    if hour > 23 {
        return Err(DecodeError::InvalidEnumValue {
            field: "hour",
            value: hour,
        });
    }
    if minute > 59 {
        return Err(DecodeError::InvalidEnumValue {
            field: "minute",
            value: minute,
        });
    }
    if second > 59 {
        return Err(DecodeError::InvalidEnumValue {
            field: "second",
            value: second,
        });
    }

    let time_zone_raw = bytes[layout::SESSION_START_TIME_ZONE.offset] as i8;
    let time_zone_quarters = if time_zone_raw == TIME_ZONE_UNKNOWN {
        None
    } else if (-48..=56).contains(&time_zone_raw) {
        Some(time_zone_raw)
    } else {
        return Err(DecodeError::InvalidEnumValue {
            field: "time zone",
            value: time_zone_raw as u8,
        });
    };

    let dst = DstOffset::try_from(bytes[layout::SESSION_START_DST.offset])?;

    Ok(SessionStartTime {
        year: (year != 0).then_some(year),
        month: (month != 0).then_some(month),
        day: (day != 0).then_some(day),
        hour,
        minute,
        second,
        time_zone_quarters,
        dst,
        crc_failed,
    })
}

/// Decode the CGM Session Run Time payload.
pub fn decode_session_run_time(
    bytes: &[u8],
    context: &SessionContext,
) -> Result<SessionRunTime, DecodeError> {
    let mut record_len = layout::SESSION_RUN_TIME.end();
    if context.crc_supported() {
        record_len += CRC_FIELD_SIZE;
    }
    ensure_len(bytes, record_len)?;

    let crc_failed = context
        .crc_supported()
        .then(|| !crc::verify(&bytes[..record_len]));

    Ok(SessionRunTime {
        hours: read_u16(bytes, layout::SESSION_RUN_TIME),
        crc_failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{FluidType, SampleLocation};

    fn context_without_crc() -> SessionContext {
        SessionContext::new()
    }

    fn context_with_crc() -> SessionContext {
        let mut context = SessionContext::new();
        let feature_bytes = {
            let mut bytes = vec![0x00, 0x10, 0x00, 0x11]; // bit 12 set
            bytes.extend_from_slice(&crc::checksum(&bytes).to_le_bytes());
            bytes
        };
        context.adopt_features(decode_feature(&feature_bytes).unwrap());
        context
    }

    #[test]
    fn decodes_minimal_measurement() {
        // size, flags=0, glucose 75 mg/dl, time offset 5
        let bytes = [0x06, 0x00, 0x4B, 0x00, 0x05, 0x00];
        let record = decode_measurement(&bytes, &context_without_crc()).unwrap();
        assert_eq!(record.glucose, Sfloat::Value(75.0));
        assert_eq!(record.time_offset, 5);
        assert_eq!(record.trend, None);
        assert_eq!(record.quality, None);
        assert_eq!(record.sensor_status, None);
        assert_eq!(record.crc_failed, None);
    }

    #[test]
    fn missing_flagged_byte_is_too_short() {
        // Trend flagged but only one of its two bytes present.
        let bytes = [0x07, 0x01, 0x4B, 0x00, 0x05, 0x00, 0x23];
        assert_eq!(
            decode_measurement(&bytes, &context_without_crc()),
            Err(DecodeError::TooShort { needed: 8, got: 7 })
        );
    }

    #[test]
    fn warning_octet_alone_leaves_others_absent() {
        let flags = measurement_flags::WARNING_OCTET_PRESENT;
        let bytes = [0x07, flags, 0x4B, 0x00, 0x05, 0x00, 0x0A];
        let record = decode_measurement(&bytes, &context_without_crc()).unwrap();
        let status = record.sensor_status.unwrap();
        assert_eq!(status.status, None);
        assert_eq!(status.cal_temp, None);
        assert_eq!(status.warning, Some(0x0A));
        assert_eq!(status.above_patient_high(), Some(true));
        assert_eq!(status.above_hyper_level(), Some(true));
    }

    #[test]
    fn octets_and_operands_read_in_wire_order() {
        let flags = measurement_flags::STATUS_OCTET_PRESENT
            | measurement_flags::WARNING_OCTET_PRESENT
            | measurement_flags::TREND_PRESENT
            | measurement_flags::QUALITY_PRESENT;
        // status octet 0x02, warning octet 0x08, trend 3.5, quality 95 %
        let bytes = [
            0x0C, flags, 0x4B, 0x00, 0x05, 0x00, 0x02, 0x08, 0x23, 0xF0, 0x5F, 0x00,
        ];
        let record = decode_measurement(&bytes, &context_without_crc()).unwrap();
        let status = record.sensor_status.unwrap();
        assert_eq!(status.status, Some(0x02));
        assert_eq!(status.cal_temp, None);
        assert_eq!(status.warning, Some(0x08));
        assert_eq!(record.trend, Some(Sfloat::Value(3.5)));
        assert_eq!(record.quality, Some(Sfloat::Value(95.0)));
    }

    #[test]
    fn reserved_flag_bits_are_rejected() {
        let bytes = [0x06, 0x04, 0x4B, 0x00, 0x05, 0x00];
        assert_eq!(
            decode_measurement(&bytes, &context_without_crc()),
            Err(DecodeError::ReservedFieldNonZero(0x04))
        );
    }

    #[test]
    fn crc_mismatch_marks_the_record() {
        let context = context_with_crc();
        let mut bytes = vec![0x08, 0x00, 0x4B, 0x00, 0x05, 0x00];
        let crc = crc::checksum(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        let good = decode_measurement(&bytes, &context).unwrap();
        assert_eq!(good.crc_failed, Some(false));

        bytes[2] ^= 0xFF;
        let bad = decode_measurement(&bytes, &context).unwrap();
        // Corrupted records still come back, flagged; the receiver decides.
        assert_eq!(bad.crc_failed, Some(true));
        assert_eq!(bad.time_offset, 5);
    }

    #[test]
    fn crc_context_requires_the_trailing_field() {
        let context = context_with_crc();
        let bytes = [0x06, 0x00, 0x4B, 0x00, 0x05, 0x00];
        assert_eq!(
            decode_measurement(&bytes, &context),
            Err(DecodeError::TooShort { needed: 8, got: 6 })
        );
    }

    #[test]
    fn decodes_feature_without_crc_support() {
        let bytes = [0x03, 0x00, 0x00, 0x95, 0xFF, 0xFF];
        let features = decode_feature(&bytes).unwrap();
        assert!(features.calibration_supported());
        assert!(features.patient_high_low_alerts_supported());
        assert!(!features.hypo_alerts_supported());
        assert!(!features.e2e_crc_supported());
        assert_eq!(features.fluid_type, FluidType::InterstitialFluid);
        assert_eq!(features.sample_location, SampleLocation::SubcutaneousTissue);
        assert_eq!(features.crc_failed, None);
        assert_eq!(features.bits(), 0x03);
    }

    #[test]
    fn feature_with_crc_bit_verifies_the_checksum() {
        let mut bytes = vec![0x00, 0x10, 0x00, 0x11];
        bytes.extend_from_slice(&crc::checksum(&bytes).to_le_bytes());
        let features = decode_feature(&bytes).unwrap();
        assert!(features.e2e_crc_supported());
        assert_eq!(features.crc_failed, Some(false));
    }

    #[test]
    fn decodes_status_record() {
        let bytes = [0x05, 0x00, 0x02, 0x04, 0x0A];
        let record = decode_status(&bytes, &context_without_crc()).unwrap();
        assert_eq!(record.time_offset, 5);
        assert_eq!(record.sensor_status.device_battery_low(), Some(true));
        assert_eq!(record.sensor_status.calibration_recommended(), Some(true));
        assert_eq!(record.sensor_status.above_patient_high(), Some(true));
        assert_eq!(record.sensor_status.above_hyper_level(), Some(true));
    }

    #[test]
    fn decodes_session_start_time() {
        // 2015-01-27 13:30:00, UTC-5:00, standard time
        let bytes = [0xDF, 0x07, 0x01, 0x1B, 0x0D, 0x1E, 0x00, 0xEC, 0x00];
        let start = decode_session_start_time(&bytes, &context_without_crc()).unwrap();
        assert_eq!(start.year, Some(2015));
        assert_eq!(start.month, Some(1));
        assert_eq!(start.day, Some(27));
        assert_eq!(start.time_zone_quarters, Some(-20));
        assert_eq!(start.dst, DstOffset::StandardTime);
        assert!(start.to_date_time().is_some());
    }

    #[test]
    fn zero_month_decodes_as_unknown() {
        let bytes = [0xDF, 0x07, 0x00, 0x1B, 0x0D, 0x1E, 0x00, 0xEC, 0x00];
        let start = decode_session_start_time(&bytes, &context_without_crc()).unwrap();
        assert_eq!(start.month, None);
        assert_eq!(start.to_date_time(), None);
    }

    #[test]
    fn unrecognized_dst_is_an_error() {
        let bytes = [0xDF, 0x07, 0x01, 0x1B, 0x0D, 0x1E, 0x00, 0xEC, 0x07];
        assert_eq!(
            decode_session_start_time(&bytes, &context_without_crc()),
            Err(DecodeError::InvalidEnumValue {
                field: "DST offset",
                value: 7,
            })
        );
    }

    #[test]
    fn unknown_time_zone_decodes_as_none() {
        let bytes = [0xDF, 0x07, 0x01, 0x1B, 0x0D, 0x1E, 0x00, 0x80, 0x00];
        let start = decode_session_start_time(&bytes, &context_without_crc()).unwrap();
        assert_eq!(start.time_zone_quarters, None);
        assert_eq!(start.to_date_time(), None);
    }

    #[test]
    fn decodes_session_run_time() {
        let record = decode_session_run_time(&[0xA8, 0x00], &context_without_crc()).unwrap();
        assert_eq!(record.hours, 168);
    }

    #[test]
    fn dispatch_covers_every_characteristic() {
        let context = context_without_crc();
        let record = decode_characteristic(
            CharacteristicId::Measurement,
            &[0x06, 0x00, 0x4B, 0x00, 0x05, 0x00],
            &context,
        )
        .unwrap();
        assert!(matches!(record, CgmRecord::Measurement(_)));

        let record = decode_characteristic(
            CharacteristicId::Feature,
            &[0x03, 0x00, 0x00, 0x95, 0xFF, 0xFF],
            &context,
        )
        .unwrap();
        assert!(matches!(record, CgmRecord::Feature(_)));
    }
}
