//! Session start time, run time, and the per-connection decode context.
//!
//! Every stored record carries only a minute offset; turning that into an
//! absolute timestamp needs the session start time, and decoding most
//! payloads needs to know whether the sensor appends an E2E-CRC. Both
//! live here. The context is owned by the controller's dispatch loop and
//! mutated only after successful Feature / Session Start Time reads;
//! decoders get a read-only snapshot.

use chrono::{DateTime, Datelike, FixedOffset, Offset, TimeZone, Timelike};

use crate::domain::feature::CgmFeatures;
use crate::domain::types::DstOffset;
use crate::error::EncodeError;

/// Raw value marking an unknown timezone offset.
pub const TIME_ZONE_UNKNOWN: i8 = -128;

/// Timezone offsets are carried in 15-minute steps.
pub const TIME_ZONE_STEP_MINUTES: i32 = 15;

/// Decoded CGM Session Start Time characteristic.
///
/// Year, month, and day are individually unknowable (raw 0), as is the
/// timezone (raw -128). A calendar date is derivable only when all of
/// year/month/day and the timezone are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStartTime {
    pub year: Option<u16>,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Offset from UTC in 15-minute steps, `None` when unknown.
    pub time_zone_quarters: Option<i8>,
    pub dst: DstOffset,
    pub crc_failed: Option<bool>,
}

impl SessionStartTime {
    /// Best-effort absolute start time. `None` unless year, month, day,
    /// and timezone are all known. An unknown DST offset is treated as
    /// standard time.
    pub fn to_date_time(&self) -> Option<DateTime<FixedOffset>> {
        let year = self.year?;
        let month = self.month?;
        let day = self.day?;
        let quarters = self.time_zone_quarters?;

        let offset_minutes =
            quarters as i32 * TIME_ZONE_STEP_MINUTES + self.dst.minutes().unwrap_or(0);
        let offset = FixedOffset::east_opt(offset_minutes * 60)?;
        offset
            .with_ymd_and_hms(
                year as i32,
                month as u32,
                day as u32,
                self.hour as u32,
                self.minute as u32,
                self.second as u32,
            )
            .single()
    }

    /// Build from an absolute timestamp, quantizing the UTC offset to the
    /// profile's 15-minute steps. Used when writing the collector's
    /// current time to the sensor.
    pub fn from_date_time(date_time: DateTime<FixedOffset>) -> Self {
        let offset_minutes = date_time.offset().fix().local_minus_utc() / 60;
        Self {
            year: Some(date_time.year() as u16),
            month: Some(date_time.month() as u8),
            day: Some(date_time.day() as u8),
            hour: date_time.hour() as u8,
            minute: date_time.minute() as u8,
            second: date_time.second() as u8,
            time_zone_quarters: Some((offset_minutes / TIME_ZONE_STEP_MINUTES) as i8),
            dst: DstOffset::StandardTime,
            crc_failed: None,
        }
    }

    /// Serialize to the nine-byte wire layout (no CRC; outgoing checksums
    /// are a transport concern).
    pub fn to_wire_bytes(&self) -> [u8; 9] {
        let year = self.year.unwrap_or(0).to_le_bytes();
        let time_zone = self.time_zone_quarters.unwrap_or(TIME_ZONE_UNKNOWN) as u8;
        [
            year[0],
            year[1],
            self.month.unwrap_or(0),
            self.day.unwrap_or(0),
            self.hour,
            self.minute,
            self.second,
            time_zone,
            self.dst as u8,
        ]
    }
}

/// Decoded CGM Session Run Time characteristic: hours from the session
/// start until the sensor should be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRunTime {
    pub hours: u16,
    pub crc_failed: Option<bool>,
}

/// Per-connection decode context.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    crc_supported: bool,
    session_start_time: Option<SessionStartTime>,
    features: Option<CgmFeatures>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether CRC-capable payloads carry the trailing checksum. False
    /// until a Feature read says otherwise.
    pub fn crc_supported(&self) -> bool {
        self.crc_supported
    }

    pub fn features(&self) -> Option<&CgmFeatures> {
        self.features.as_ref()
    }

    pub fn session_start_time(&self) -> Option<&SessionStartTime> {
        self.session_start_time.as_ref()
    }

    /// Adopt a freshly-read feature set; CRC support follows its bit 12.
    pub fn adopt_features(&mut self, features: CgmFeatures) {
        self.crc_supported = features.e2e_crc_supported();
        self.features = Some(features);
    }

    pub fn adopt_session_start_time(&mut self, start_time: SessionStartTime) {
        self.session_start_time = Some(start_time);
    }

    /// Absolute time for a record's minute offset. `None` whenever the
    /// session start time is missing or not fully known; the caller gets
    /// "unavailable", never a guess.
    pub fn absolute_time(&self, time_offset_minutes: u16) -> Option<DateTime<FixedOffset>> {
        let start = self.session_start_time?.to_date_time()?;
        Some(start + chrono::Duration::minutes(time_offset_minutes as i64))
    }

    /// Minute offset of an absolute timestamp relative to the session
    /// start, for commands that transmit dates as offsets.
    pub fn time_offset_for(&self, date_time: DateTime<FixedOffset>) -> Result<u16, EncodeError> {
        let start = self
            .session_start_time
            .and_then(|start| start.to_date_time())
            .ok_or(EncodeError::NoSessionReference)?;
        let minutes = (date_time - start).num_minutes();
        u16::try_from(minutes).map_err(|_| EncodeError::OffsetOutOfRange { minutes })
    }
}
