//! Shared profile enumerations.

use crate::error::DecodeError;

/// Fluid type of a glucose sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FluidType {
    CapillaryWholeBlood = 1,
    CapillaryPlasma = 2,
    VenousWholeBlood = 3,
    VenousPlasma = 4,
    ArterialWholeBlood = 5,
    ArterialPlasma = 6,
    UndeterminedWholeBlood = 7,
    UndeterminedPlasma = 8,
    InterstitialFluid = 9,
    ControlSolution = 10,
}

impl TryFrom<u8> for FluidType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let fluid_type = match value {
            1 => Self::CapillaryWholeBlood,
            2 => Self::CapillaryPlasma,
            3 => Self::VenousWholeBlood,
            4 => Self::VenousPlasma,
            5 => Self::ArterialWholeBlood,
            6 => Self::ArterialPlasma,
            7 => Self::UndeterminedWholeBlood,
            8 => Self::UndeterminedPlasma,
            9 => Self::InterstitialFluid,
            10 => Self::ControlSolution,
            _ => {
                return Err(DecodeError::InvalidEnumValue {
                    field: "fluid type",
                    value,
                })
            }
        };
        Ok(fluid_type)
    }
}

/// Body location of a glucose sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SampleLocation {
    Finger = 1,
    AlternateSiteTest = 2,
    Earlobe = 3,
    ControlSolution = 4,
    SubcutaneousTissue = 5,
    NotAvailable = 15,
}

impl TryFrom<u8> for SampleLocation {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let location = match value {
            1 => Self::Finger,
            2 => Self::AlternateSiteTest,
            3 => Self::Earlobe,
            4 => Self::ControlSolution,
            5 => Self::SubcutaneousTissue,
            15 => Self::NotAvailable,
            _ => {
                return Err(DecodeError::InvalidEnumValue {
                    field: "sample location",
                    value,
                })
            }
        };
        Ok(location)
    }
}

/// Split the shared type/location byte: fluid type in the high nibble,
/// sample location in the low nibble.
pub fn split_type_location(byte: u8) -> Result<(FluidType, SampleLocation), DecodeError> {
    let fluid_type = FluidType::try_from(byte >> 4)?;
    let location = SampleLocation::try_from(byte & 0x0F)?;
    Ok((fluid_type, location))
}

/// Pack a fluid type and sample location into the shared byte.
pub fn join_type_location(fluid_type: FluidType, location: SampleLocation) -> u8 {
    ((fluid_type as u8) << 4) | (location as u8)
}

/// Daylight-saving offset of the session start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DstOffset {
    StandardTime = 0,
    HalfHourDaylight = 2,
    OneHourDaylight = 4,
    TwoHoursDaylight = 8,
    Unknown = 255,
}

impl DstOffset {
    /// Offset in minutes, or `None` when unknown.
    pub fn minutes(&self) -> Option<i32> {
        match self {
            Self::StandardTime => Some(0),
            Self::HalfHourDaylight => Some(30),
            Self::OneHourDaylight => Some(60),
            Self::TwoHoursDaylight => Some(120),
            Self::Unknown => None,
        }
    }
}

impl TryFrom<u8> for DstOffset {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let dst = match value {
            0 => Self::StandardTime,
            2 => Self::HalfHourDaylight,
            4 => Self::OneHourDaylight,
            8 => Self::TwoHoursDaylight,
            255 => Self::Unknown,
            // Everything else is reserved; refusing beats defaulting.
            _ => {
                return Err(DecodeError::InvalidEnumValue {
                    field: "DST offset",
                    value,
                })
            }
        };
        Ok(dst)
    }
}
