//! Wire layer: CAN frame representation, 29-bit identifier management,
//! per-message byte layouts, numeric scaling, and the bus/timer/store
//! abstraction traits.
//!
//! All module-protocol frames are 29-bit extended. The identifier packs an
//! 11-bit base id in bits 18..28 and the module id field in bits 0..7;
//! SD data chunks and WEB4 key chunks additionally carry sub-fields in the
//! middle bits (see [`ext_id`]).

pub mod can_frame;
pub mod ext_id;
pub mod ids;
pub mod messages;
pub mod scale;
pub mod traits;

/// Service cadence of the outbound command queue: at most one queued frame
/// is transmitted per tick to avoid flooding the transceiver FIFO.
pub const SERVICE_TICK_MS: u32 = 10;

/// Cadence of the timeout/failure sweep.
pub const TIMEOUT_SWEEP_MS: u32 = 1_000;
