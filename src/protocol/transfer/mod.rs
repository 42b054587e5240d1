//! Reliable bulk-transfer engines: sector-windowed SD reads from modules
//! and chunked WEB4 key reception from the VCU.
pub mod sector;
pub mod web4;
