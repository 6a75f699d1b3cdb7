//! CGM Feature characteristic contents.
//!
//! The feature set is negotiated once per connection: the 24-bit flag
//! field says which optional capabilities the sensor implements, and bit
//! 12 (E2E-CRC) decides whether every subsequent CRC-capable payload
//! carries a trailing checksum.

use crate::domain::types::{FluidType, SampleLocation};

/// Feature flag bit positions within the 24-bit field.
pub mod feature_flags {
    pub const CALIBRATION: u32 = 1 << 0;
    pub const PATIENT_HIGH_LOW_ALERTS: u32 = 1 << 1;
    pub const HYPO_ALERTS: u32 = 1 << 2;
    pub const HYPER_ALERTS: u32 = 1 << 3;
    pub const RATE_ALERTS: u32 = 1 << 4;
    pub const DEVICE_SPECIFIC_ALERT: u32 = 1 << 5;
    pub const SENSOR_MALFUNCTION_DETECTION: u32 = 1 << 6;
    pub const SENSOR_TEMP_HIGH_LOW_DETECTION: u32 = 1 << 7;
    pub const SENSOR_RESULT_HIGH_LOW_DETECTION: u32 = 1 << 8;
    pub const LOW_BATTERY_DETECTION: u32 = 1 << 9;
    pub const SENSOR_TYPE_ERROR_DETECTION: u32 = 1 << 10;
    pub const GENERAL_DEVICE_FAULT: u32 = 1 << 11;
    pub const E2E_CRC: u32 = 1 << 12;
    pub const MULTIPLE_BOND: u32 = 1 << 13;
    pub const MULTIPLE_SESSION: u32 = 1 << 14;
    pub const TREND_INFORMATION: u32 = 1 << 15;
    pub const QUALITY: u32 = 1 << 16;
}

/// Decoded CGM Feature characteristic. Immutable once read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgmFeatures {
    bits: u32,
    pub fluid_type: FluidType,
    pub sample_location: SampleLocation,
    /// `Some(true)` when the characteristic carried a CRC that failed
    /// verification; `None` when the sensor does not support E2E-CRC.
    pub crc_failed: Option<bool>,
}

impl CgmFeatures {
    pub fn new(
        bits: u32,
        fluid_type: FluidType,
        sample_location: SampleLocation,
        crc_failed: Option<bool>,
    ) -> Self {
        Self {
            bits,
            fluid_type,
            sample_location,
            crc_failed,
        }
    }

    /// Raw 24-bit flag field.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn supports(&self, flag: u32) -> bool {
        self.bits & flag != 0
    }

    pub fn calibration_supported(&self) -> bool {
        self.supports(feature_flags::CALIBRATION)
    }

    pub fn patient_high_low_alerts_supported(&self) -> bool {
        self.supports(feature_flags::PATIENT_HIGH_LOW_ALERTS)
    }

    pub fn hypo_alerts_supported(&self) -> bool {
        self.supports(feature_flags::HYPO_ALERTS)
    }

    pub fn hyper_alerts_supported(&self) -> bool {
        self.supports(feature_flags::HYPER_ALERTS)
    }

    pub fn rate_alerts_supported(&self) -> bool {
        self.supports(feature_flags::RATE_ALERTS)
    }

    pub fn device_specific_alert_supported(&self) -> bool {
        self.supports(feature_flags::DEVICE_SPECIFIC_ALERT)
    }

    pub fn sensor_malfunction_detection_supported(&self) -> bool {
        self.supports(feature_flags::SENSOR_MALFUNCTION_DETECTION)
    }

    pub fn sensor_temp_detection_supported(&self) -> bool {
        self.supports(feature_flags::SENSOR_TEMP_HIGH_LOW_DETECTION)
    }

    pub fn sensor_result_detection_supported(&self) -> bool {
        self.supports(feature_flags::SENSOR_RESULT_HIGH_LOW_DETECTION)
    }

    pub fn low_battery_detection_supported(&self) -> bool {
        self.supports(feature_flags::LOW_BATTERY_DETECTION)
    }

    pub fn sensor_type_error_detection_supported(&self) -> bool {
        self.supports(feature_flags::SENSOR_TYPE_ERROR_DETECTION)
    }

    pub fn general_device_fault_supported(&self) -> bool {
        self.supports(feature_flags::GENERAL_DEVICE_FAULT)
    }

    pub fn e2e_crc_supported(&self) -> bool {
        self.supports(feature_flags::E2E_CRC)
    }

    pub fn multiple_bond_supported(&self) -> bool {
        self.supports(feature_flags::MULTIPLE_BOND)
    }

    pub fn multiple_session_supported(&self) -> bool {
        self.supports(feature_flags::MULTIPLE_SESSION)
    }

    pub fn trend_information_supported(&self) -> bool {
        self.supports(feature_flags::TREND_INFORMATION)
    }

    pub fn quality_supported(&self) -> bool {
        self.supports(feature_flags::QUALITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_reflect_flag_bits() {
        let features = CgmFeatures::new(
            feature_flags::CALIBRATION | feature_flags::PATIENT_HIGH_LOW_ALERTS,
            FluidType::InterstitialFluid,
            SampleLocation::SubcutaneousTissue,
            None,
        );
        assert!(features.calibration_supported());
        assert!(features.patient_high_low_alerts_supported());
        assert!(!features.hypo_alerts_supported());
        assert!(!features.e2e_crc_supported());
        assert!(!features.quality_supported());
    }
}
