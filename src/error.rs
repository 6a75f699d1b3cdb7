//! Error types shared across the crate.
//!
//! Decode errors are always local and never retried: a malformed buffer is
//! surfaced to the caller as a rejected read. Encode errors are rejected
//! before anything reaches the transport. Operation-level failures
//! (device response codes, timeout, connection loss) are delivered as
//! operation outcomes, not as `Err` values.

use thiserror::Error;

use crate::transport::TransportError;

/// Failure to decode an inbound characteristic payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer is shorter than the minimum length implied by the
    /// characteristic, its flags byte, and the session context.
    #[error("payload too short: need {needed} bytes, got {got}")]
    TooShort { needed: usize, got: usize },

    /// Reserved bits in a flags byte were nonzero.
    #[error("reserved flag bits set: {0:#04x}")]
    ReservedFieldNonZero(u8),

    /// A field carried a value outside its defined enumeration.
    #[error("invalid {field} value: {value}")]
    InvalidEnumValue { field: &'static str, value: u8 },

    /// An opcode byte outside the defined opcode space.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpCode(u8),
}

/// Failure to encode an outgoing command or value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    /// The value does not fit the SFLOAT mantissa at the requested exponent.
    #[error("value {value} not representable at exponent {exponent}")]
    ValueOutOfRange { value: f64, exponent: i8 },

    /// The requested exponent is outside the 4-bit two's-complement range.
    #[error("exponent {0} outside [-8, 7]")]
    ExponentOutOfRange(i8),

    /// A command needs a time offset relative to the session start time,
    /// but no fully-known session start time is available.
    #[error("no known session start time to reference")]
    NoSessionReference,

    /// A derived time offset does not fit the uint16 minute counter.
    #[error("time offset of {minutes} minutes outside the uint16 range")]
    OffsetOutOfRange { minutes: i64 },
}

/// Failure to carry out a request against the sensor.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Another control-point operation is already outstanding. Nothing was
    /// sent; queuing is the caller's responsibility.
    #[error("another control-point operation is outstanding")]
    OperationInProgress,

    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// A read produced a malformed payload; the read is rejected.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
