//! WEB4 key material: two 64-byte device-key halves and the component id
//! pair, with per-block validity flags.
//!
//! The blocks are loaded from the nonvolatile store at boot, mutated only
//! by a completed key reception, and persisted the moment all three
//! validity flags hold.

/// Bytes per key half (512 bits).
pub const KEY_SIZE: usize = 64;
/// Bytes per component id. The 64-byte ComponentIds blob splits evenly
/// between pack and app.
pub const COMPONENT_ID_SIZE: usize = 32;

/// The three kinds of key material moved over the WEB4 side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Pack controller's device key half.
    PackDevice,
    /// App's device key half.
    AppDevice,
    /// Component ids (pack + app, 32 bytes each).
    ComponentIds,
}

impl KeyType {
    /// Stable discriminant for event logging.
    pub fn discriminant(self) -> u8 {
        match self {
            KeyType::PackDevice => 0,
            KeyType::AppDevice => 1,
            KeyType::ComponentIds => 2,
        }
    }
}

/// Persisted key block.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredKeys {
    pub pack_device: [u8; KEY_SIZE],
    pub app_device: [u8; KEY_SIZE],
    pub pack_component_id: [u8; COMPONENT_ID_SIZE],
    pub app_component_id: [u8; COMPONENT_ID_SIZE],
    pub pack_key_valid: bool,
    pub app_key_valid: bool,
    pub component_ids_valid: bool,
}

impl Default for StoredKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl StoredKeys {
    pub const fn new() -> Self {
        Self {
            pack_device: [0; KEY_SIZE],
            app_device: [0; KEY_SIZE],
            pack_component_id: [0; COMPONENT_ID_SIZE],
            app_component_id: [0; COMPONENT_ID_SIZE],
            pack_key_valid: false,
            app_key_valid: false,
            component_ids_valid: false,
        }
    }

    /// True once every block has been received and verified.
    pub fn all_valid(&self) -> bool {
        self.pack_key_valid && self.app_key_valid && self.component_ids_valid
    }

    /// Store a verified 64-byte blob into the slot for `key_type` and set
    /// its validity flag. Component ids split between pack and app halves.
    pub fn store(&mut self, key_type: KeyType, blob: &[u8; KEY_SIZE]) {
        match key_type {
            KeyType::PackDevice => {
                self.pack_device.copy_from_slice(blob);
                self.pack_key_valid = true;
            }
            KeyType::AppDevice => {
                self.app_device.copy_from_slice(blob);
                self.app_key_valid = true;
            }
            KeyType::ComponentIds => {
                self.pack_component_id
                    .copy_from_slice(&blob[..COMPONENT_ID_SIZE]);
                self.app_component_id
                    .copy_from_slice(&blob[COMPONENT_ID_SIZE..]);
                self.component_ids_valid = true;
            }
        }
    }

    /// Device key half for encryption use, `None` until valid.
    pub fn device_key(&self, key_type: KeyType) -> Option<&[u8; KEY_SIZE]> {
        match key_type {
            KeyType::PackDevice if self.pack_key_valid => Some(&self.pack_device),
            KeyType::AppDevice if self.app_key_valid => Some(&self.app_device),
            _ => None,
        }
    }
}

impl core::fmt::Debug for StoredKeys {
    // Key material stays out of logs; only the validity flags print.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoredKeys")
            .field("pack_key_valid", &self.pack_key_valid)
            .field("app_key_valid", &self.app_key_valid)
            .field("component_ids_valid", &self.component_ids_valid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_ids_split_between_halves() {
        let mut keys = StoredKeys::new();
        let mut blob = [0u8; KEY_SIZE];
        blob[..32].fill(0xAA);
        blob[32..].fill(0xBB);
        keys.store(KeyType::ComponentIds, &blob);
        assert!(keys.component_ids_valid);
        assert_eq!(keys.pack_component_id, [0xAA; 32]);
        assert_eq!(keys.app_component_id, [0xBB; 32]);
    }

    #[test]
    fn all_valid_requires_three_blocks() {
        let mut keys = StoredKeys::new();
        keys.store(KeyType::PackDevice, &[1; KEY_SIZE]);
        keys.store(KeyType::AppDevice, &[2; KEY_SIZE]);
        assert!(!keys.all_valid());
        keys.store(KeyType::ComponentIds, &[3; KEY_SIZE]);
        assert!(keys.all_valid());
    }

    #[test]
    fn device_key_gated_on_validity() {
        let mut keys = StoredKeys::new();
        assert!(keys.device_key(KeyType::PackDevice).is_none());
        keys.store(KeyType::PackDevice, &[7; KEY_SIZE]);
        assert_eq!(keys.device_key(KeyType::PackDevice), Some(&[7; KEY_SIZE]));
    }
}
