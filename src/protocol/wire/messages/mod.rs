//! Typed message structures and their byte layouts.
//!
//! Every frame of the module-management protocol is eight bytes or less and
//! has a fixed layout; multi-byte integers are little-endian unless a field
//! is explicitly marked otherwise. Decoders validate the payload length and
//! fail with [`DecodeError::Truncated`] on short frames; the state machine
//! never advances on a malformed frame.
use crate::error::DecodeError;
use crate::protocol::wire::can_frame::CanFrame;
use crate::protocol::wire::ext_id::{ExtId, Web4ChunkId};
use crate::protocol::wire::ids;

fn require(frame: &CanFrame, expected: usize) -> Result<(), DecodeError> {
    if frame.len < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: frame.len,
        });
    }
    Ok(())
}

fn u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

//==================================================================================MODULE → PACK

/// 0x500: unregistered module announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Announcement {
    pub fw_version: u16,
    pub mfg_id: u8,
    pub part_id: u8,
    pub unique_id: u32,
}

impl Announcement {
    pub fn decode(frame: &CanFrame) -> Result<Self, DecodeError> {
        require(frame, 8)?;
        Ok(Self {
            fw_version: u16_le(&frame.data, 0),
            mfg_id: frame.data[2],
            part_id: frame.data[3],
            unique_id: u32_le(&frame.data, 4),
        })
    }

    /// Announcements always carry the unregistered sentinel.
    pub fn encode(&self) -> CanFrame {
        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&self.fw_version.to_le_bytes());
        data[2] = self.mfg_id;
        data[3] = self.part_id;
        data[4..8].copy_from_slice(&self.unique_id.to_le_bytes());
        CanFrame::new(
            ExtId::new(ids::MODULE_ANNOUNCEMENT, ids::MODULE_ID_UNREGISTERED),
            &data,
        )
    }
}

/// 0x501: hardware capability report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hardware {
    pub max_charge_a: u16,
    pub max_discharge_a: u16,
    pub max_charge_v: u16,
    pub hw_version: u16,
}

impl Hardware {
    pub fn decode(frame: &CanFrame) -> Result<Self, DecodeError> {
        require(frame, 8)?;
        Ok(Self {
            max_charge_a: u16_le(&frame.data, 0),
            max_discharge_a: u16_le(&frame.data, 2),
            max_charge_v: u16_le(&frame.data, 4),
            hw_version: u16_le(&frame.data, 6),
        })
    }
}

/// 0x502: primary status: state, SOC/SOH, cell count, current, voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status1 {
    /// Low nibble of byte 0: operational state.
    pub state: u8,
    /// High nibble of byte 0: fault/status bits.
    pub status: u8,
    pub soc_raw: u8,
    pub soh_raw: u8,
    pub cell_count: u8,
    pub current_raw: u16,
    pub voltage_raw: u16,
}

impl Status1 {
    pub fn decode(frame: &CanFrame) -> Result<Self, DecodeError> {
        require(frame, 8)?;
        Ok(Self {
            state: frame.data[0] & 0x0F,
            status: frame.data[0] >> 4,
            soc_raw: frame.data[1],
            soh_raw: frame.data[2],
            cell_count: frame.data[3],
            current_raw: u16_le(&frame.data, 4),
            voltage_raw: u16_le(&frame.data, 6),
        })
    }

    pub fn encode(&self, module_id: u8) -> CanFrame {
        let mut data = [0u8; 8];
        data[0] = (self.status << 4) | (self.state & 0x0F);
        data[1] = self.soc_raw;
        data[2] = self.soh_raw;
        data[3] = self.cell_count;
        data[4..6].copy_from_slice(&self.current_raw.to_le_bytes());
        data[6..8].copy_from_slice(&self.voltage_raw.to_le_bytes());
        CanFrame::new(ExtId::new(ids::MODULE_STATUS_1, module_id), &data)
    }
}

/// 0x503: cell voltage aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status2 {
    pub cell_lo_raw: u16,
    pub cell_hi_raw: u16,
    pub cell_avg_raw: u16,
    pub cell_total_raw: u16,
}

impl Status2 {
    pub fn decode(frame: &CanFrame) -> Result<Self, DecodeError> {
        require(frame, 8)?;
        Ok(Self {
            cell_lo_raw: u16_le(&frame.data, 0),
            cell_hi_raw: u16_le(&frame.data, 2),
            cell_avg_raw: u16_le(&frame.data, 4),
            cell_total_raw: u16_le(&frame.data, 6),
        })
    }
}

/// 0x504: cell temperature aggregates (bytes 6..8 reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status3 {
    pub temp_lo_raw: u16,
    pub temp_hi_raw: u16,
    pub temp_avg_raw: u16,
}

impl Status3 {
    pub fn decode(frame: &CanFrame) -> Result<Self, DecodeError> {
        require(frame, 6)?;
        Ok(Self {
            temp_lo_raw: u16_le(&frame.data, 0),
            temp_hi_raw: u16_le(&frame.data, 2),
            temp_avg_raw: u16_le(&frame.data, 4),
        })
    }
}

/// 0x505: per-cell detail reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detail {
    pub cell_id: u8,
    pub cell_count_expected: u8,
    pub temp_raw: u16,
    pub volt_raw: u16,
    pub cell_soc_raw: u8,
    pub cell_soh_raw: u8,
}

impl Detail {
    pub fn decode(frame: &CanFrame) -> Result<Self, DecodeError> {
        require(frame, 8)?;
        Ok(Self {
            cell_id: frame.data[0],
            cell_count_expected: frame.data[1],
            temp_raw: u16_le(&frame.data, 2),
            volt_raw: u16_le(&frame.data, 4),
            cell_soc_raw: frame.data[6],
            cell_soh_raw: frame.data[7],
        })
    }
}

/// 0x507: cell string communication statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellCommStatus1 {
    pub cell_count_min: u8,
    pub cell_count_max: u8,
    pub i2c_errors: u16,
    pub mc_rx_framing_errs: u8,
    pub first_err_cell: u8,
}

impl CellCommStatus1 {
    pub fn decode(frame: &CanFrame) -> Result<Self, DecodeError> {
        require(frame, 6)?;
        Ok(Self {
            cell_count_min: frame.data[0],
            cell_count_max: frame.data[1],
            i2c_errors: u16_le(&frame.data, 2),
            mc_rx_framing_errs: frame.data[4],
            first_err_cell: frame.data[5],
        })
    }
}

//==================================================================================PACK → MODULE

/// 0x510: registration acknowledgement, addressed by assigned id and
/// matched by the module on the echoed unique id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub assigned_id: u8,
    pub mfg_id: u8,
    pub part_id: u8,
    pub unique_id: u32,
}

/// Controller id carried in every registration frame (pack controller = 1).
pub const CONTROLLER_ID: u8 = 0x01;

impl Registration {
    pub fn encode(&self) -> CanFrame {
        let mut data = [0u8; 8];
        data[0] = self.assigned_id;
        data[1] = CONTROLLER_ID;
        data[2] = self.mfg_id;
        data[3] = self.part_id;
        data[4..8].copy_from_slice(&self.unique_id.to_le_bytes());
        CanFrame::new(ExtId::new(ids::MODULE_REGISTRATION, self.assigned_id), &data)
    }

    pub fn decode(frame: &CanFrame) -> Result<Self, DecodeError> {
        require(frame, 8)?;
        Ok(Self {
            assigned_id: frame.data[0],
            mfg_id: frame.data[2],
            part_id: frame.data[3],
            unique_id: u32_le(&frame.data, 4),
        })
    }
}

/// 0x512: status request ("request all" marker byte).
pub fn status_request(module_id: u8) -> CanFrame {
    CanFrame::new(ExtId::new(ids::MODULE_STATUS_REQUEST, module_id), &[0x01])
}

/// 0x511: hardware capability request.
pub fn hardware_request(module_id: u8) -> CanFrame {
    CanFrame::new(ExtId::new(ids::MODULE_HARDWARE_REQUEST, module_id), &[])
}

/// 0x514: commanded state change, module-specific or broadcast (0x00).
pub fn state_change(module_field: u8, state: u8) -> CanFrame {
    CanFrame::new(ExtId::new(ids::MODULE_STATE_CHANGE, module_field), &[state])
}

/// 0x515: per-cell detail request.
pub fn detail_request(module_id: u8, cell_id: u8) -> CanFrame {
    CanFrame::new(
        ExtId::new(ids::MODULE_DETAIL_REQUEST, module_id),
        &[cell_id],
    )
}

/// 0x516: time sync broadcast: marker byte then big-endian seconds since
/// boot. (A BCD wall-clock variant exists in the field; this deployment
/// emits the timestamp form.)
pub fn set_time(seconds: u32) -> CanFrame {
    let mut data = [0u8; 5];
    data[0] = 0xFF;
    data[1..5].copy_from_slice(&seconds.to_be_bytes());
    CanFrame::new(
        ExtId::new(ids::MODULE_SET_TIME, ids::MODULE_ID_BROADCAST),
        &data,
    )
}

/// 0x517: MaxState heartbeat broadcast.
pub fn max_state(state: u8) -> CanFrame {
    CanFrame::new(
        ExtId::new(ids::MODULE_MAX_STATE, ids::MODULE_ID_BROADCAST),
        &[state],
    )
}

/// 0x518: single-module deregister.
pub fn deregister(module_id: u8) -> CanFrame {
    CanFrame::new(ExtId::new(ids::MODULE_DEREGISTER, module_id), &[])
}

/// 0x51D: announce request to every unregistered module.
pub fn announce_request() -> CanFrame {
    CanFrame::new(
        ExtId::new(ids::MODULE_ANNOUNCE_REQUEST, ids::MODULE_ID_UNREGISTERED),
        &[],
    )
}

/// 0x51E: broadcast deregister.
pub fn all_deregister() -> CanFrame {
    CanFrame::new(
        ExtId::new(ids::MODULE_ALL_DEREGISTER, ids::MODULE_ID_BROADCAST),
        &[],
    )
}

/// 0x51F: broadcast isolate (open relays).
pub fn all_isolate() -> CanFrame {
    CanFrame::new(
        ExtId::new(ids::MODULE_ALL_ISOLATE, ids::MODULE_ID_BROADCAST),
        &[],
    )
}

//==================================================================================SD TRANSFER

/// SD transfer command bytes.
pub const SD_CMD_READ_SECTOR: u8 = 0x01;
pub const SD_CMD_WINDOW_ACK: u8 = 0x02;
pub const SD_CMD_TRANSFER_STATUS: u8 = 0x03;

/// Window ACK status byte.
pub const SD_ACK_OK: u8 = 0x00;
pub const SD_ACK_RETRY: u8 = 0x01;
pub const SD_ACK_ABORT: u8 = 0xFF;

/// 0x3F0: sector read request with XOR integrity byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorRequest {
    pub transfer_id: u8,
    pub sector_num: u32,
    pub options: u8,
}

impl SectorRequest {
    pub fn encode(&self, module_id: u8) -> CanFrame {
        let mut data = [0u8; 8];
        data[0] = SD_CMD_READ_SECTOR;
        data[1] = self.transfer_id;
        data[2..6].copy_from_slice(&self.sector_num.to_le_bytes());
        data[6] = self.options;
        data[7] = xor_checksum(&data[0..7]);
        CanFrame::new(ExtId::new(ids::SD_SECTOR_REQUEST, module_id), &data)
    }

    pub fn decode(frame: &CanFrame) -> Result<Self, DecodeError> {
        require(frame, 8)?;
        if frame.data[7] != xor_checksum(&frame.data[0..7]) {
            return Err(DecodeError::InvalidValue {
                field: "checksum",
                value: frame.data[7],
            });
        }
        Ok(Self {
            transfer_id: frame.data[1],
            sector_num: u32_le(&frame.data, 2),
            options: frame.data[6],
        })
    }
}

/// 0x3F2: per-window acknowledgement carrying the received-chunk bitmap
/// and the running CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAck {
    pub transfer_id: u8,
    pub window_id: u8,
    pub bitmap: u16,
    pub status: u8,
    pub crc16: u16,
}

impl WindowAck {
    pub fn encode(&self, module_id: u8) -> CanFrame {
        let mut data = [0u8; 8];
        data[0] = SD_CMD_WINDOW_ACK;
        data[1] = self.transfer_id;
        data[2] = self.window_id;
        data[3..5].copy_from_slice(&self.bitmap.to_le_bytes());
        data[5] = self.status;
        data[6..8].copy_from_slice(&self.crc16.to_le_bytes());
        CanFrame::new(ExtId::new(ids::SD_WINDOW_ACK, module_id), &data)
    }

    pub fn decode(frame: &CanFrame) -> Result<Self, DecodeError> {
        require(frame, 8)?;
        Ok(Self {
            transfer_id: frame.data[1],
            window_id: frame.data[2],
            bitmap: u16_le(&frame.data, 3),
            status: frame.data[5],
            crc16: u16_le(&frame.data, 6),
        })
    }
}

/// 0x3F3: end-of-sector status from the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStatus {
    pub transfer_id: u8,
    pub status_code: u8,
    pub windows_done: u8,
    pub final_crc: u16,
    pub time_ms: u16,
}

impl TransferStatus {
    pub fn decode(frame: &CanFrame) -> Result<Self, DecodeError> {
        require(frame, 8)?;
        Ok(Self {
            transfer_id: frame.data[1],
            status_code: frame.data[2],
            windows_done: frame.data[3],
            final_crc: u16_le(&frame.data, 4),
            time_ms: u16_le(&frame.data, 6),
        })
    }

    pub fn encode(&self, module_id: u8) -> CanFrame {
        let mut data = [0u8; 8];
        data[0] = SD_CMD_TRANSFER_STATUS;
        data[1] = self.transfer_id;
        data[2] = self.status_code;
        data[3] = self.windows_done;
        data[4..6].copy_from_slice(&self.final_crc.to_le_bytes());
        data[6..8].copy_from_slice(&self.time_ms.to_le_bytes());
        CanFrame::new(ExtId::new(ids::SD_TRANSFER_STATUS, module_id), &data)
    }
}

/// XOR of a byte run, used by the sector request and the WEB4 key blobs.
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &b| acc ^ b)
}

//==================================================================================WEB4

/// WEB4 chunk acknowledgement payload: chunk index then status code.
pub fn web4_ack(ack_base: u16, chunk_num: u8, status: u8) -> CanFrame {
    let mut data = [0u8; 8];
    data[0] = chunk_num;
    data[1] = status;
    CanFrame::new(ExtId::new(ack_base, 0x00), &data)
}

/// Key chunk forwarded to a module during key distribution: same
/// low-bits chunk scheme as the VCU side, plus the module id field.
pub fn module_key_chunk(module_id: u8, chunk_num: u8, chunk: &[u8; 8]) -> CanFrame {
    let id = Web4ChunkId::compose(ids::MODULE_KEY_CHUNK, chunk_num);
    CanFrame::new(ExtId(id.0 | module_id as u32), chunk)
}

//==================================================================================TESTS
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
