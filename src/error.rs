//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (frame decoding, module
//! registration, bulk transfers, key reception, etc.).
use thiserror_no_std::Error;

#[derive(Error, Debug, PartialEq, Eq)]
/// Errors that can occur while decoding an inbound CAN frame.
pub enum DecodeError {
    /// Payload is shorter than the message layout requires.
    #[error("Truncated payload: expected {expected}, got {actual}")]
    Truncated { expected: usize, actual: usize },
    /// Base identifier is not part of the module protocol set.
    #[error("Unknown base id: {base_id:#05X}")]
    UnknownId { base_id: u16 },
    /// Module id field carries a value outside {0x00, 0x01..0x1F, 0xFF}.
    #[error("Invalid module id field: {field:#04X}")]
    InvalidModuleId { field: u8 },
    /// A field decoded to a value the protocol does not define.
    #[error("Invalid value {value} for field {field}")]
    InvalidValue { field: &'static str, value: u8 },
}

#[derive(Error, Debug, PartialEq, Eq)]
/// Errors raised by the module registry.
pub enum RegistryError {
    /// Every one of the 31 slots is already bound to a distinct serial.
    #[error("Registry full: all 31 slots occupied")]
    RegistryFull,
    /// The referenced slot is not registered.
    #[error("Module {0} is not registered")]
    NotRegistered(u8),
}

#[derive(Error, Debug, PartialEq, Eq)]
/// Errors raised by the sector transfer engine.
pub enum TransferError {
    /// The module already has a non-idle transfer in progress.
    #[error("Module {0} already has an active transfer")]
    Busy(u8),
    /// All transfer ids (2-bit space) are in use.
    #[error("No free transfer slot")]
    PoolExhausted,
    /// Transfer aborted because the CAN link went down.
    #[error("Link down")]
    LinkDown,
    /// Final CRC reported by the module does not match the received data.
    #[error("CRC mismatch: expected {expected:#06X}, computed {computed:#06X}")]
    CrcMismatch { expected: u16, computed: u16 },
    /// The module reported a failure status code.
    #[error("Module reported status {0:#04X}")]
    ModuleStatus(u8),
}

#[derive(Error, Debug, PartialEq, Eq)]
/// Errors raised while receiving WEB4 key material.
pub enum KeyError {
    /// Chunk payload length is not exactly eight bytes.
    #[error("Invalid chunk length {0}")]
    InvalidLength(usize),
    /// Chunk index is outside 0..8.
    #[error("Chunk index {0} out of sequence")]
    SequenceError(u8),
    /// XOR checksum over the assembled key failed.
    #[error("Key checksum mismatch: computed {computed:#04X}, stored {stored:#04X}")]
    ChecksumMismatch { computed: u8, stored: u8 },
    /// Reception stalled for longer than the chunk timeout.
    #[error("Key reception timeout")]
    ReceptionTimeout,
}
