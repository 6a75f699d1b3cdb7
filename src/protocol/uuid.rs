//! CGM service and characteristic assigned numbers.
//!
//! These are wire-format constants fixed by the profile, not
//! configuration. The 16-bit assigned numbers expand into the Bluetooth
//! base UUID for transports that want the full 128-bit form.

/// CGM Service
pub const SERVICE_UUID: u16 = 0x181F;

pub const MEASUREMENT_UUID: u16 = 0x2AA7;
pub const FEATURE_UUID: u16 = 0x2AA8;
pub const STATUS_UUID: u16 = 0x2AA9;
pub const SESSION_START_TIME_UUID: u16 = 0x2AAA;
pub const SESSION_RUN_TIME_UUID: u16 = 0x2AAB;
pub const RECORD_ACCESS_CONTROL_POINT_UUID: u16 = 0x2A52;
pub const SPECIFIC_OPS_CONTROL_POINT_UUID: u16 = 0x2AAC;

/// The characteristics this crate reads, writes, or subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicId {
    Measurement,
    Feature,
    Status,
    SessionStartTime,
    SessionRunTime,
    RecordAccessControlPoint,
    SpecificOpsControlPoint,
}

impl CharacteristicId {
    pub fn uuid16(&self) -> u16 {
        match self {
            Self::Measurement => MEASUREMENT_UUID,
            Self::Feature => FEATURE_UUID,
            Self::Status => STATUS_UUID,
            Self::SessionStartTime => SESSION_START_TIME_UUID,
            Self::SessionRunTime => SESSION_RUN_TIME_UUID,
            Self::RecordAccessControlPoint => RECORD_ACCESS_CONTROL_POINT_UUID,
            Self::SpecificOpsControlPoint => SPECIFIC_OPS_CONTROL_POINT_UUID,
        }
    }

    /// Full 128-bit UUID string on the Bluetooth base UUID.
    pub fn uuid(&self) -> String {
        format!("0000{:04x}-0000-1000-8000-00805f9b34fb", self.uuid16())
    }
}

impl std::fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Measurement => "CGM Measurement",
            Self::Feature => "CGM Feature",
            Self::Status => "CGM Status",
            Self::SessionStartTime => "CGM Session Start Time",
            Self::SessionRunTime => "CGM Session Run Time",
            Self::RecordAccessControlPoint => "Record Access Control Point",
            Self::SpecificOpsControlPoint => "CGM Specific Ops Control Point",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_to_base_uuid() {
        assert_eq!(
            CharacteristicId::Measurement.uuid(),
            "00002aa7-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            CharacteristicId::RecordAccessControlPoint.uuid(),
            "00002a52-0000-1000-8000-00805f9b34fb"
        );
    }
}
