//! Creation and extraction of the 29-bit extended CAN identifiers used by
//! the module-management protocol.
//!
//! The common layout is `(base_id << 18) | module_id_field`: an 11-bit
//! message type in bits 18..28 and the module id field in bits 0..7, with
//! the middle bits reserved zero. Two message families repurpose the middle
//! bits: SD data chunks ([`SdChunkId`]) and WEB4 key chunks
//! ([`Web4ChunkId`]).
use crate::error::DecodeError;
use crate::protocol::wire::ids;

//==================================================================================EXT_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Encapsulates an extended CAN identifier (29 bits) and exposes accessors
/// for the base id and the module id field.
pub struct ExtId(pub u32);

impl ExtId {
    /// Compose an identifier with zeroed middle bits.
    pub fn new(base_id: u16, module_field: u8) -> Self {
        Self((((base_id & 0x7FF) as u32) << 18) | module_field as u32)
    }

    /// 11-bit message type (bits 18..28).
    pub fn base_id(&self) -> u16 {
        ((self.0 >> 18) & 0x7FF) as u16
    }

    /// Raw module id field (bits 0..7).
    pub fn module_field(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Classify the module id field per the addressing scheme.
    pub fn address(&self) -> Result<ModuleAddress, DecodeError> {
        ModuleAddress::from_field(self.module_field())
    }
}

//==================================================================================MODULE_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Assigned module identifier, guaranteed inside 0x01..=0x1F.
pub struct ModuleId(u8);

impl ModuleId {
    /// Validate a raw id field as an assigned module id.
    pub fn new(raw: u8) -> Option<Self> {
        (ids::MODULE_ID_MIN..=ids::MODULE_ID_MAX)
            .contains(&raw)
            .then_some(Self(raw))
    }

    /// Raw wire value.
    pub fn raw(self) -> u8 {
        self.0
    }

    /// Zero-based registry slot index.
    pub(crate) fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// Iterate every assignable id in ascending order.
    pub fn all() -> impl Iterator<Item = ModuleId> {
        (ids::MODULE_ID_MIN..=ids::MODULE_ID_MAX).map(ModuleId)
    }
}

impl core::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Interpretation of the module id field of an extended identifier.
pub enum ModuleAddress {
    /// 0x00: pack → every registered module.
    Broadcast,
    /// 0x01..=0x1F: a specific assigned module.
    Assigned(ModuleId),
    /// 0xFF: unregistered sentinel (announcements, registration traffic).
    Unregistered,
}

impl ModuleAddress {
    /// Classify a raw field value; anything outside the three defined
    /// ranges is a protocol violation.
    pub fn from_field(field: u8) -> Result<Self, DecodeError> {
        match field {
            ids::MODULE_ID_BROADCAST => Ok(Self::Broadcast),
            ids::MODULE_ID_UNREGISTERED => Ok(Self::Unregistered),
            raw => ModuleId::new(raw)
                .map(Self::Assigned)
                .ok_or(DecodeError::InvalidModuleId { field: raw }),
        }
    }
}

//==================================================================================SD_CHUNK_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Extended-id view of an SD data chunk (base 0x3F1).
///
/// This is the one message family where bits 10..17 carry protocol
/// information:
///
/// | bits  | field       |
/// |-------|-------------|
/// | 0..7  | module id   |
/// | 8..9  | transfer id |
/// | 10..13| chunk (0-15)|
/// | 14..15| window (0-3)|
/// | 16    | last chunk  |
/// | 17    | mode (1 = data transfer) |
/// | 18..28| base 0x3F1  |
pub struct SdChunkId(pub u32);

impl SdChunkId {
    /// Compose a chunk identifier from its sub-fields.
    pub fn compose(
        module_id: u8,
        transfer_id: u8,
        chunk_num: u8,
        window_id: u8,
        last_chunk: bool,
    ) -> Self {
        let id = ((ids::SD_DATA_CHUNK as u32) << 18)
            | (1 << 17)
            | ((last_chunk as u32) << 16)
            | (((window_id & 0x03) as u32) << 14)
            | (((chunk_num & 0x0F) as u32) << 10)
            | (((transfer_id & 0x03) as u32) << 8)
            | module_id as u32;
        Self(id)
    }

    pub fn module_field(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn transfer_id(&self) -> u8 {
        ((self.0 >> 8) & 0x03) as u8
    }

    pub fn chunk_num(&self) -> u8 {
        ((self.0 >> 10) & 0x0F) as u8
    }

    pub fn window_id(&self) -> u8 {
        ((self.0 >> 14) & 0x03) as u8
    }

    pub fn last_chunk(&self) -> bool {
        (self.0 >> 16) & 0x01 != 0
    }

    pub fn mode(&self) -> bool {
        (self.0 >> 17) & 0x01 != 0
    }

    pub fn base_id(&self) -> u16 {
        ((self.0 >> 18) & 0x7FF) as u16
    }
}

impl From<ExtId> for SdChunkId {
    fn from(id: ExtId) -> Self {
        Self(id.0)
    }
}

//==================================================================================WEB4_CHUNK_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Extended-id view of a WEB4 key chunk (bases 0x407..0x409).
///
/// The chunk index sits in bits 8..10, below the base id in bits 18..28,
/// following the same low-bits-metadata scheme as the SD chunks.
pub struct Web4ChunkId(pub u32);

impl Web4ChunkId {
    /// Compose a chunk identifier for a key base id.
    pub fn compose(base_id: u16, chunk_num: u8) -> Self {
        Self((((base_id & 0x7FF) as u32) << 18) | (((chunk_num & 0x07) as u32) << 8))
    }

    pub fn base_id(&self) -> u16 {
        ((self.0 >> 18) & 0x7FF) as u16
    }

    /// 3-bit chunk index (0..8).
    pub fn chunk_num(&self) -> u8 {
        ((self.0 >> 8) & 0x07) as u8
    }
}

impl From<ExtId> for Web4ChunkId {
    fn from(id: ExtId) -> Self {
        Self(id.0)
    }
}
