//! In-memory representation of a 29-bit extended CAN frame.
use crate::protocol::wire::ext_id::ExtId;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Raw frame as read from or written to the CAN bus.
pub struct CanFrame {
    /// Full 29-bit extended identifier stored inside a `u32`.
    pub id: ExtId,
    /// Payload buffer. Classic CAN frames always provide eight bytes.
    pub data: [u8; 8],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub len: usize,
}

impl CanFrame {
    /// Build a frame from a payload slice (at most eight bytes used).
    pub fn new(id: ExtId, payload: &[u8]) -> Self {
        let len = payload.len().min(8);
        let mut data = [0u8; 8];
        data[..len].copy_from_slice(&payload[..len]);
        Self { id, data, len }
    }

    /// Valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }
}
