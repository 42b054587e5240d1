//! `packlink` library: the CAN module-management engine of a battery pack
//! controller. The crate discovers up to 31 battery module controllers on a
//! 29-bit extended-frame CAN bus, assigns them stable identifiers, polls
//! them for telemetry, broadcasts the cooperative state ceiling, and runs
//! the two reliable bulk-transfer protocols (sector-windowed SD reads and
//! WEB4 key-chunk distribution). The crate exposes the infrastructure
//! modules (CRC, gated event sink), the protocol logic (wire codec, module
//! registry, transfer engines, pack manager), and the trait seams a host
//! must implement (CAN bus, timer, key store).
#![no_std]
//==================================================================================
/// Runtime configuration: debug masks, timeouts, and scheduler periods.
pub mod config;
/// Domain and low-level errors (frame decoding, registration, transfers,
/// key reception, and related issues).
pub mod error;
/// Support modules shared by the protocol engines: CRC-16 and the gated
/// debug/event sink.
pub mod infra;
/// Pack protocol implementation: wire codec, module registry, transfer
/// engines, and the pack manager with its async supervisor.
pub mod protocol;
//==================================================================================
