//! Wire Protocol Module
//!
//! Everything that touches raw bytes: the SFLOAT numeric codec, the field
//! layout tables, the per-characteristic decoders, the CGMCP/RACP command
//! encoders and response parsers, and the E2E-CRC.
//!
//! ## Modules
//!
//! - [`sfloat`] - 16-bit SFLOAT numeric codec
//! - [`uuid`] - service and characteristic assigned numbers
//! - [`layout`] - byte ranges and conditional-presence tables
//! - [`crc`] - E2E-CRC computation and verification
//! - [`decode`] - characteristic payload decoders
//! - [`cgmcp`] - Specific Ops Control Point commands and responses
//! - [`racp`] - Record Access Control Point constants and commands

pub mod cgmcp;
pub mod crc;
pub mod decode;
pub mod layout;
pub mod racp;
pub mod sfloat;
pub mod uuid;
