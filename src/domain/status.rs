//! Sensor status annunciation.
//!
//! The annunciation is a 24-bit field split into three octets. Inside a
//! measurement only the flagged octets are transmitted; an untransmitted
//! octet is reported as absent, never as zero, so "no warning" and
//! "warning unknown" stay distinguishable. The predicates therefore
//! return `Option<bool>`: `None` when the octet was not transmitted.

use chrono::{DateTime, FixedOffset};

use crate::domain::session::SessionContext;

/// Status-octet bits.
pub mod status_bits {
    pub const SESSION_STOPPED: u8 = 1 << 0;
    pub const DEVICE_BATTERY_LOW: u8 = 1 << 1;
    pub const SENSOR_TYPE_INCORRECT: u8 = 1 << 2;
    pub const SENSOR_MALFUNCTION: u8 = 1 << 3;
    pub const DEVICE_SPECIFIC_ALERT: u8 = 1 << 4;
    pub const GENERAL_DEVICE_FAULT: u8 = 1 << 5;
}

/// Cal/Temp-octet bits.
pub mod cal_temp_bits {
    pub const TIME_SYNC_REQUIRED: u8 = 1 << 0;
    pub const CALIBRATION_NOT_ALLOWED: u8 = 1 << 1;
    pub const CALIBRATION_RECOMMENDED: u8 = 1 << 2;
    pub const CALIBRATION_REQUIRED: u8 = 1 << 3;
    pub const TEMP_TOO_HIGH: u8 = 1 << 4;
    pub const TEMP_TOO_LOW: u8 = 1 << 5;
}

/// Warning-octet bits.
pub mod warning_bits {
    pub const BELOW_PATIENT_LOW: u8 = 1 << 0;
    pub const ABOVE_PATIENT_HIGH: u8 = 1 << 1;
    pub const BELOW_HYPO: u8 = 1 << 2;
    pub const ABOVE_HYPER: u8 = 1 << 3;
    pub const RATE_DECREASE_EXCEEDED: u8 = 1 << 4;
    pub const RATE_INCREASE_EXCEEDED: u8 = 1 << 5;
    pub const BELOW_DEVICE_RANGE: u8 = 1 << 6;
    pub const ABOVE_DEVICE_RANGE: u8 = 1 << 7;
}

/// The three annunciation octets, each independently absent or present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorStatus {
    pub status: Option<u8>,
    pub cal_temp: Option<u8>,
    pub warning: Option<u8>,
}

impl SensorStatus {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.cal_temp.is_none() && self.warning.is_none()
    }

    fn status_bit(&self, bit: u8) -> Option<bool> {
        self.status.map(|octet| octet & bit != 0)
    }

    fn cal_temp_bit(&self, bit: u8) -> Option<bool> {
        self.cal_temp.map(|octet| octet & bit != 0)
    }

    fn warning_bit(&self, bit: u8) -> Option<bool> {
        self.warning.map(|octet| octet & bit != 0)
    }

    pub fn session_stopped(&self) -> Option<bool> {
        self.status_bit(status_bits::SESSION_STOPPED)
    }

    pub fn device_battery_low(&self) -> Option<bool> {
        self.status_bit(status_bits::DEVICE_BATTERY_LOW)
    }

    pub fn sensor_type_incorrect(&self) -> Option<bool> {
        self.status_bit(status_bits::SENSOR_TYPE_INCORRECT)
    }

    pub fn sensor_malfunction(&self) -> Option<bool> {
        self.status_bit(status_bits::SENSOR_MALFUNCTION)
    }

    pub fn device_specific_alert(&self) -> Option<bool> {
        self.status_bit(status_bits::DEVICE_SPECIFIC_ALERT)
    }

    pub fn general_device_fault(&self) -> Option<bool> {
        self.status_bit(status_bits::GENERAL_DEVICE_FAULT)
    }

    pub fn time_sync_required(&self) -> Option<bool> {
        self.cal_temp_bit(cal_temp_bits::TIME_SYNC_REQUIRED)
    }

    pub fn calibration_not_allowed(&self) -> Option<bool> {
        self.cal_temp_bit(cal_temp_bits::CALIBRATION_NOT_ALLOWED)
    }

    pub fn calibration_recommended(&self) -> Option<bool> {
        self.cal_temp_bit(cal_temp_bits::CALIBRATION_RECOMMENDED)
    }

    pub fn calibration_required(&self) -> Option<bool> {
        self.cal_temp_bit(cal_temp_bits::CALIBRATION_REQUIRED)
    }

    pub fn sensor_temp_too_high(&self) -> Option<bool> {
        self.cal_temp_bit(cal_temp_bits::TEMP_TOO_HIGH)
    }

    pub fn sensor_temp_too_low(&self) -> Option<bool> {
        self.cal_temp_bit(cal_temp_bits::TEMP_TOO_LOW)
    }

    pub fn below_patient_low(&self) -> Option<bool> {
        self.warning_bit(warning_bits::BELOW_PATIENT_LOW)
    }

    pub fn above_patient_high(&self) -> Option<bool> {
        self.warning_bit(warning_bits::ABOVE_PATIENT_HIGH)
    }

    pub fn below_hypo_level(&self) -> Option<bool> {
        self.warning_bit(warning_bits::BELOW_HYPO)
    }

    pub fn above_hyper_level(&self) -> Option<bool> {
        self.warning_bit(warning_bits::ABOVE_HYPER)
    }

    pub fn rate_decrease_exceeded(&self) -> Option<bool> {
        self.warning_bit(warning_bits::RATE_DECREASE_EXCEEDED)
    }

    pub fn rate_increase_exceeded(&self) -> Option<bool> {
        self.warning_bit(warning_bits::RATE_INCREASE_EXCEEDED)
    }

    pub fn below_device_range(&self) -> Option<bool> {
        self.warning_bit(warning_bits::BELOW_DEVICE_RANGE)
    }

    pub fn above_device_range(&self) -> Option<bool> {
        self.warning_bit(warning_bits::ABOVE_DEVICE_RANGE)
    }
}

/// Decoded CGM Status characteristic: all three octets are mandatory
/// there, unlike inside a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRecord {
    /// Minutes since the session start time.
    pub time_offset: u16,
    pub sensor_status: SensorStatus,
    pub crc_failed: Option<bool>,
}

impl StatusRecord {
    /// Absolute time of this status, derivable only when the session
    /// start time and its timezone are fully known.
    pub fn status_date_time(&self, context: &SessionContext) -> Option<DateTime<FixedOffset>> {
        context.absolute_time(self.time_offset)
    }
}
