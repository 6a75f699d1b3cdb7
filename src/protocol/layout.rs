//! Field layout tables for every characteristic payload.
//!
//! Pure data, no behavior: byte ranges for the fixed-offset mandatory
//! fields, flag constants, and an ordered table of conditionally-present
//! fields for the measurement record. The decoder walks these tables in
//! order, which keeps the profile's field-ordering contract auditable in
//! one place.

/// A fixed byte range inside a characteristic payload.
#[derive(Debug, Clone, Copy)]
pub struct FieldRange {
    pub offset: usize,
    pub len: usize,
}

impl FieldRange {
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }
}

pub const CRC_FIELD_SIZE: usize = 2;

/// Value of a mandatory CRC field when E2E-CRC is unsupported.
pub const CRC_UNSUPPORTED_SENTINEL: u16 = 0xFFFF;

// --- CGM Measurement -----------------------------------------------------

pub const MEASUREMENT_SIZE: FieldRange = FieldRange { offset: 0, len: 1 };
pub const MEASUREMENT_FLAGS: FieldRange = FieldRange { offset: 1, len: 1 };
pub const MEASUREMENT_GLUCOSE: FieldRange = FieldRange { offset: 2, len: 2 };
pub const MEASUREMENT_TIME_OFFSET: FieldRange = FieldRange { offset: 4, len: 2 };

/// Measurement flags byte.
pub mod measurement_flags {
    pub const TREND_PRESENT: u8 = 1 << 0;
    pub const QUALITY_PRESENT: u8 = 1 << 1;
    pub const WARNING_OCTET_PRESENT: u8 = 1 << 5;
    pub const CAL_TEMP_OCTET_PRESENT: u8 = 1 << 6;
    pub const STATUS_OCTET_PRESENT: u8 = 1 << 7;
    /// Bits 2-4 are reserved and must be zero.
    pub const RESERVED_MASK: u8 = 0b0001_1100;
}

/// A conditionally-present measurement field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementField {
    StatusOctet,
    CalTempOctet,
    WarningOctet,
    Trend,
    Quality,
    Crc,
}

pub struct OptionalField {
    pub field: MeasurementField,
    pub len: usize,
    pub present: fn(flags: u8, crc_supported: bool) -> bool,
}

/// The optional measurement fields in their profile-fixed wire order:
/// annunciation octets first (Status, Cal/Temp, Warning — only the flagged
/// octets, packed contiguously), then Trend, then Quality, then the CRC.
pub const MEASUREMENT_OPTIONAL_FIELDS: &[OptionalField] = &[
    OptionalField {
        field: MeasurementField::StatusOctet,
        len: 1,
        present: |flags, _| flags & measurement_flags::STATUS_OCTET_PRESENT != 0,
    },
    OptionalField {
        field: MeasurementField::CalTempOctet,
        len: 1,
        present: |flags, _| flags & measurement_flags::CAL_TEMP_OCTET_PRESENT != 0,
    },
    OptionalField {
        field: MeasurementField::WarningOctet,
        len: 1,
        present: |flags, _| flags & measurement_flags::WARNING_OCTET_PRESENT != 0,
    },
    OptionalField {
        field: MeasurementField::Trend,
        len: 2,
        present: |flags, _| flags & measurement_flags::TREND_PRESENT != 0,
    },
    OptionalField {
        field: MeasurementField::Quality,
        len: 2,
        present: |flags, _| flags & measurement_flags::QUALITY_PRESENT != 0,
    },
    OptionalField {
        field: MeasurementField::Crc,
        len: CRC_FIELD_SIZE,
        present: |_, crc_supported| crc_supported,
    },
];

// --- CGM Feature ---------------------------------------------------------

pub const FEATURE_FLAGS: FieldRange = FieldRange { offset: 0, len: 3 };
pub const FEATURE_TYPE_LOCATION: FieldRange = FieldRange { offset: 3, len: 1 };
pub const FEATURE_CRC: FieldRange = FieldRange { offset: 4, len: 2 };

// --- CGM Status ----------------------------------------------------------

pub const STATUS_TIME_OFFSET: FieldRange = FieldRange { offset: 0, len: 2 };
pub const STATUS_ANNUNCIATION: FieldRange = FieldRange { offset: 2, len: 3 };
pub const STATUS_CRC: FieldRange = FieldRange { offset: 5, len: 2 };

// --- CGM Session Start Time ----------------------------------------------

pub const SESSION_START_YEAR: FieldRange = FieldRange { offset: 0, len: 2 };
pub const SESSION_START_MONTH: FieldRange = FieldRange { offset: 2, len: 1 };
pub const SESSION_START_DAY: FieldRange = FieldRange { offset: 3, len: 1 };
pub const SESSION_START_HOUR: FieldRange = FieldRange { offset: 4, len: 1 };
pub const SESSION_START_MINUTE: FieldRange = FieldRange { offset: 5, len: 1 };
pub const SESSION_START_SECOND: FieldRange = FieldRange { offset: 6, len: 1 };
pub const SESSION_START_TIME_ZONE: FieldRange = FieldRange { offset: 7, len: 1 };
pub const SESSION_START_DST: FieldRange = FieldRange { offset: 8, len: 1 };
pub const SESSION_START_CRC: FieldRange = FieldRange { offset: 9, len: 2 };

// --- CGM Session Run Time ------------------------------------------------

pub const SESSION_RUN_TIME: FieldRange = FieldRange { offset: 0, len: 2 };
pub const SESSION_RUN_TIME_CRC: FieldRange = FieldRange { offset: 2, len: 2 };

// --- Specific Ops Control Point ------------------------------------------

pub const CGMCP_OP_CODE: FieldRange = FieldRange { offset: 0, len: 1 };
pub const CGMCP_REQUEST_OP_CODE: FieldRange = FieldRange { offset: 1, len: 1 };
pub const CGMCP_RESPONSE_CODE: FieldRange = FieldRange { offset: 2, len: 1 };
pub const CGMCP_COMM_INTERVAL: FieldRange = FieldRange { offset: 1, len: 1 };
pub const CGMCP_SFLOAT_OPERAND: FieldRange = FieldRange { offset: 1, len: 2 };
pub const CGMCP_CALIBRATION_GLUCOSE: FieldRange = FieldRange { offset: 1, len: 2 };
pub const CGMCP_CALIBRATION_TIME: FieldRange = FieldRange { offset: 3, len: 2 };
pub const CGMCP_CALIBRATION_TYPE_LOCATION: FieldRange = FieldRange { offset: 5, len: 1 };
pub const CGMCP_CALIBRATION_TIME_NEXT: FieldRange = FieldRange { offset: 6, len: 2 };
pub const CGMCP_CALIBRATION_RECORD_NUMBER: FieldRange = FieldRange { offset: 8, len: 2 };
pub const CGMCP_CALIBRATION_STATUS: FieldRange = FieldRange { offset: 10, len: 1 };
