//! Decoded CGM measurements.

use chrono::{DateTime, FixedOffset};

use crate::domain::session::SessionContext;
use crate::domain::status::SensorStatus;
use crate::protocol::sfloat::Sfloat;

/// One glucose measurement, live or replayed from device storage.
///
/// Presence of trend, quality, and the annunciation octets is governed by
/// the record's own flags byte; the CRC marker is governed by the session
/// context under which the record was decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementRecord {
    /// Glucose concentration in mg/dl.
    pub glucose: Sfloat,
    /// Minutes since the session start time. Wraps at 65536 minutes.
    pub time_offset: u16,
    /// Rate of change in (mg/dl)/min, when transmitted.
    pub trend: Option<Sfloat>,
    /// Measurement quality in percent, when transmitted.
    pub quality: Option<Sfloat>,
    /// Annunciation octets; `None` when no octet was transmitted.
    pub sensor_status: Option<SensorStatus>,
    pub crc_failed: Option<bool>,
}

impl MeasurementRecord {
    /// Glucose concentration as a plain number, unless the sensor sent a
    /// sentinel state.
    pub fn glucose_mg_dl(&self) -> Option<f64> {
        self.glucose.value()
    }

    /// Absolute measurement time. `None` whenever the session start time
    /// or its timezone is not fully known.
    pub fn measurement_date_time(&self, context: &SessionContext) -> Option<DateTime<FixedOffset>> {
        context.absolute_time(self.time_offset)
    }
}
