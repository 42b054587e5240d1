//! Nonvolatile storage seam for the WEB4 key material.
use crate::protocol::keys::StoredKeys;

/// Byte-addressable nonvolatile store holding the WEB4 keys (~196 bytes).
///
/// Implementations own the layout, with two obligations: the three key
/// blocks must be recoverable independently, and a partial write must never
/// surface a corrupted validity flag (write the payload before the flag).
/// Access is serialized by the engine, at most one write outstanding.
pub trait KeyStore {
    type Error: core::fmt::Debug;

    /// Load the persisted keys, `None` when the store is blank.
    fn load(&mut self) -> Result<Option<StoredKeys>, Self::Error>;

    /// Persist the full key block.
    fn save(&mut self, keys: &StoredKeys) -> Result<(), Self::Error>;
}
