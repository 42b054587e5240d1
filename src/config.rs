//! Runtime configuration for the pack controller engine.
//!
//! The defaults mirror the shipping firmware: 500 kbit/s bus, 100 ms status
//! polling, 200 ms heartbeat, 5 s module loss declaration. Hosts override
//! individual fields before constructing the controller.

use crate::infra::debug::{flags, levels};

/// Supported CAN bit rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaudRate {
    Baud125k,
    Baud250k,
    #[default]
    Baud500k,
    Baud1M,
}

/// Engine configuration. All durations are milliseconds of the monotonic
/// host tick.
#[derive(Debug, Clone)]
pub struct PackConfig {
    /// Bus bit rate, forwarded to the CAN driver by the host.
    pub baud: BaudRate,
    /// Driver channel index, forwarded to the CAN driver by the host.
    pub channel: u8,

    /// Active debug level mask (see [`levels`]).
    pub debug_level: u8,
    /// Active debug message flag mask (see [`flags`]).
    pub debug_flags: u32,
    /// Flags that emit once per boot until [`reset_once_only`] is called.
    ///
    /// [`reset_once_only`]: crate::infra::debug::EventLog::reset_once_only
    pub debug_once_mask: u32,

    /// No traffic at all from a registered module for this long declares it
    /// lost and deregisters the slot.
    pub module_hard_timeout_ms: u32,
    /// Status reply gate: a pending status request older than this releases
    /// the slot for the next poll round.
    pub status_request_timeout_ms: u32,
    /// Cell detail reply gate.
    pub cell_detail_timeout_ms: u32,

    /// MaxState heartbeat broadcast period.
    pub heartbeat_period_ms: u32,
    /// SetTime broadcast period.
    pub time_sync_period_ms: u32,
    /// Announce-request broadcast period while discovery is active.
    pub announce_period_ms: u32,
    /// Round-robin status poll period.
    pub status_poll_period_ms: u32,

    /// Per-window deadline of a sector transfer before a retry ACK.
    pub sector_window_timeout_ms: u32,
    /// Whole-sector deadline.
    pub sector_timeout_ms: u32,
    /// Retry ACKs per window before the transfer is declared failed.
    pub sector_max_retries: u8,
    /// WEB4 key reception inactivity timeout.
    pub key_timeout_ms: u32,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            baud: BaudRate::default(),
            channel: 0,
            debug_level: levels::ERRORS,
            debug_flags: flags::REGISTRATION_GROUP
                | flags::DEREGISTER
                | flags::DEREGISTER_ALL
                | flags::TIMEOUT
                | flags::STATUS1,
            debug_once_mask: 0,
            module_hard_timeout_ms: 5_000,
            status_request_timeout_ms: 500,
            cell_detail_timeout_ms: 200,
            heartbeat_period_ms: 200,
            time_sync_period_ms: 5_000,
            announce_period_ms: 5_000,
            status_poll_period_ms: 100,
            sector_window_timeout_ms: 200,
            sector_timeout_ms: 2_000,
            sector_max_retries: 3,
            key_timeout_ms: 5_000,
        }
    }
}
