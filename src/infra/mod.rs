//! Infrastructure shared by the protocol engines: CRC-16 for sector
//! verification and the gated debug/event sink.
pub mod crc;
pub mod debug;
