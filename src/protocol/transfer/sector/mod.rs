//! Sector transfer engine: reliable 512-byte reads from a module's SD
//! storage.
//!
//! A sector moves as 4 windows × 16 chunks × 8 bytes. Chunks ride SD data
//! frames whose extended id carries transfer/window/chunk metadata
//! ([`SdChunkId`]); the pack acknowledges each window with a received-chunk
//! bitmap so the module retransmits only what is missing. A CRC-16 runs
//! over completed windows in order and is checked against the module's
//! final CRC.
//!
//! The engine owns a fixed pool of four transfer contexts, one per 2-bit
//! transfer id, with at most one active transfer per module.
use heapless::Vec;

use crate::error::TransferError;
use crate::infra::crc;
use crate::infra::debug::{DebugSink, EventLog, MessageId};
use crate::protocol::wire::can_frame::CanFrame;
use crate::protocol::wire::ext_id::{ModuleId, SdChunkId};
use crate::protocol::wire::messages::{
    SectorRequest, TransferStatus, WindowAck, SD_ACK_ABORT, SD_ACK_OK, SD_ACK_RETRY,
};

pub const SECTOR_SIZE: usize = 512;
pub const CHUNK_SIZE: usize = 8;
pub const CHUNKS_PER_WINDOW: usize = 16;
pub const WINDOW_SIZE: usize = 128;
pub const WINDOWS_PER_SECTOR: usize = 4;

/// Concurrent transfers overall, bounded by the 2-bit transfer id space.
pub const MAX_TRANSFERS: usize = 4;

/// Bitmap value of a fully received window.
const WINDOW_FULL: u16 = 0xFFFF;

/// Transfer status codes reported on 0x3F3.
pub mod status {
    pub const COMPLETE: u8 = 0x00;
    pub const IN_PROGRESS: u8 = 0x01;
    pub const SD_ERROR: u8 = 0x10;
    pub const OUT_OF_RANGE: u8 = 0x11;
    pub const BUSY: u8 = 0x12;
    pub const CRC_ERROR: u8 = 0x20;
    pub const UNKNOWN: u8 = 0xFF;
}

/// Lifecycle of one transfer context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    /// Request sent, no chunk seen yet.
    Requesting,
    Receiving,
    Complete,
    Error,
    Timeout,
}

/// One pooled transfer context. The pool index doubles as the wire
/// transfer id.
struct SectorTransfer {
    module: Option<ModuleId>,
    transfer_id: u8,
    sector_num: u32,
    state: TransferState,
    buffer: [u8; SECTOR_SIZE],
    chunk_bitmap: [u16; WINDOWS_PER_SECTOR],
    current_window: u8,
    running_crc: u16,
    expected_crc: u16,
    start_tick: u32,
    window_deadline_tick: u32,
    retry_count: u8,
    /// Last status code the module reported, `status::IN_PROGRESS` until
    /// the 0x3F3 frame arrives.
    module_status: u8,
}

impl SectorTransfer {
    const fn new(transfer_id: u8) -> Self {
        Self {
            module: None,
            transfer_id,
            sector_num: 0,
            state: TransferState::Idle,
            buffer: [0; SECTOR_SIZE],
            chunk_bitmap: [0; WINDOWS_PER_SECTOR],
            current_window: 0,
            running_crc: crc::CRC16_INIT,
            expected_crc: 0,
            start_tick: 0,
            window_deadline_tick: 0,
            retry_count: 0,
            module_status: status::IN_PROGRESS,
        }
    }

    fn active(&self) -> bool {
        matches!(self.state, TransferState::Requesting | TransferState::Receiving)
    }

    fn all_windows_full(&self) -> bool {
        self.chunk_bitmap.iter().all(|&b| b == WINDOW_FULL)
    }

    fn module_raw(&self) -> u8 {
        self.module.map(ModuleId::raw).unwrap_or(0)
    }

    fn window_ack(&self, status: u8) -> CanFrame {
        WindowAck {
            transfer_id: self.transfer_id,
            window_id: self.current_window,
            bitmap: self.chunk_bitmap[self.current_window as usize],
            status,
            crc16: self.running_crc,
        }
        .encode(self.module_raw())
    }

    fn request_frame(&self) -> CanFrame {
        SectorRequest {
            transfer_id: self.transfer_id,
            sector_num: self.sector_num,
            options: 0,
        }
        .encode(self.module_raw())
    }
}

/// True when `deadline` lies at or before `now` under wrapping arithmetic.
fn deadline_passed(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) < 0x8000_0000
}

/// Pool of transfer contexts plus the deadline policy.
pub struct SectorEngine {
    transfers: [SectorTransfer; MAX_TRANSFERS],
    window_timeout_ms: u32,
    sector_timeout_ms: u32,
    max_retries: u8,
}

impl SectorEngine {
    pub fn new(window_timeout_ms: u32, sector_timeout_ms: u32, max_retries: u8) -> Self {
        Self {
            transfers: [
                SectorTransfer::new(0),
                SectorTransfer::new(1),
                SectorTransfer::new(2),
                SectorTransfer::new(3),
            ],
            window_timeout_ms,
            sector_timeout_ms,
            max_retries,
        }
    }

    /// Begin reading `sector_num` from `module`. Returns the request frame
    /// to transmit. A module with a non-idle transfer is rejected; a
    /// finished transfer must be [`release`](Self::release)d first.
    pub fn start<S: DebugSink>(
        &mut self,
        now: u32,
        module: ModuleId,
        sector_num: u32,
        log: &EventLog<S>,
    ) -> Result<CanFrame, TransferError> {
        if self
            .transfers
            .iter()
            .any(|t| t.module == Some(module) && t.state != TransferState::Idle)
        {
            return Err(TransferError::Busy(module.raw()));
        }
        let slot = self
            .transfers
            .iter_mut()
            .find(|t| t.state == TransferState::Idle)
            .ok_or(TransferError::PoolExhausted)?;

        let transfer_id = slot.transfer_id;
        *slot = SectorTransfer::new(transfer_id);
        slot.module = Some(module);
        slot.sector_num = sector_num;
        slot.state = TransferState::Requesting;
        slot.start_tick = now;
        slot.window_deadline_tick = now.wrapping_add(self.window_timeout_ms);

        log.emit(
            MessageId::SdTransferStart,
            &[module.raw() as u32, sector_num, transfer_id as u32],
        );
        Ok(slot.request_frame())
    }

    /// Ingest one SD data chunk. Returns a window ACK when the chunk
    /// completes the current window.
    pub fn handle_chunk(&mut self, now: u32, frame: &CanFrame) -> Option<CanFrame> {
        if frame.len != CHUNK_SIZE {
            return None;
        }
        let cid = SdChunkId::from(frame.id);
        let module = ModuleId::new(cid.module_field())?;
        let transfer = self
            .transfers
            .iter_mut()
            .find(|t| t.module == Some(module) && t.transfer_id == cid.transfer_id() && t.active())?;

        transfer.state = TransferState::Receiving;

        let window = cid.window_id();
        if window != transfer.current_window {
            if window < transfer.current_window {
                // The module missed our ACK and is resending a finished
                // window; the running CRC already covers it.
                return Some(
                    WindowAck {
                        transfer_id: transfer.transfer_id,
                        window_id: window,
                        bitmap: WINDOW_FULL,
                        status: SD_ACK_OK,
                        crc16: transfer.running_crc,
                    }
                    .encode(transfer.module_raw()),
                );
            }
            return None;
        }

        let chunk = cid.chunk_num();
        let offset = window as usize * WINDOW_SIZE + chunk as usize * CHUNK_SIZE;
        transfer.buffer[offset..offset + CHUNK_SIZE].copy_from_slice(&frame.data);
        transfer.chunk_bitmap[window as usize] |= 1 << chunk;

        if transfer.chunk_bitmap[window as usize] != WINDOW_FULL {
            return None;
        }

        // Window complete: fold it into the running CRC in order, then
        // acknowledge and advance.
        let start = window as usize * WINDOW_SIZE;
        transfer.running_crc =
            crc::update_slice(transfer.running_crc, &transfer.buffer[start..start + WINDOW_SIZE]);

        let ack = transfer.window_ack(SD_ACK_OK);
        if (window as usize) < WINDOWS_PER_SECTOR - 1 {
            transfer.current_window += 1;
            transfer.retry_count = 0;
            transfer.window_deadline_tick = now.wrapping_add(self.window_timeout_ms);
        }
        Some(ack)
    }

    /// Ingest the module's end-of-transfer status report.
    pub fn handle_status<S: DebugSink>(
        &mut self,
        module: ModuleId,
        report: &TransferStatus,
        log: &EventLog<S>,
    ) {
        let Some(transfer) = self
            .transfers
            .iter_mut()
            .find(|t| t.module == Some(module) && t.transfer_id == report.transfer_id && t.active())
        else {
            return;
        };

        transfer.module_status = report.status_code;
        if report.status_code != status::COMPLETE {
            log.emit(
                MessageId::SdModuleStatus,
                &[module.raw() as u32, report.status_code as u32],
            );
            transfer.state = TransferState::Error;
            return;
        }

        transfer.expected_crc = report.final_crc;
        if !transfer.all_windows_full() || report.final_crc != transfer.running_crc {
            log.emit(
                MessageId::SdCrcError,
                &[
                    module.raw() as u32,
                    report.final_crc as u32,
                    transfer.running_crc as u32,
                ],
            );
            transfer.module_status = status::CRC_ERROR;
            transfer.state = TransferState::Error;
            return;
        }

        transfer.state = TransferState::Complete;
        log.emit(
            MessageId::SdTransferComplete,
            &[
                module.raw() as u32,
                transfer.sector_num,
                transfer.running_crc as u32,
            ],
        );
    }

    /// Drive deadlines forward. Emits retry/abort ACKs or request resends
    /// into `out`. Call on every service tick.
    pub fn poll<S: DebugSink, const N: usize>(
        &mut self,
        now: u32,
        log: &EventLog<S>,
        out: &mut Vec<CanFrame, N>,
    ) {
        for transfer in self.transfers.iter_mut().filter(|t| t.active()) {
            if deadline_passed(now, transfer.start_tick.wrapping_add(self.sector_timeout_ms)) {
                log.emit(
                    MessageId::SdTransferTimeout,
                    &[transfer.module_raw() as u32, transfer.sector_num],
                );
                transfer.state = TransferState::Timeout;
                continue;
            }

            if !deadline_passed(now, transfer.window_deadline_tick) {
                continue;
            }
            let window = transfer.current_window as usize;
            if transfer.chunk_bitmap[window] == WINDOW_FULL {
                // Window done, waiting on the 0x3F3 report; the sector
                // deadline covers a module that never sends it.
                continue;
            }

            transfer.retry_count += 1;
            if transfer.retry_count > self.max_retries {
                log.emit(
                    MessageId::SdTransferAborted,
                    &[transfer.module_raw() as u32, transfer.current_window as u32],
                );
                if transfer.state == TransferState::Receiving {
                    let _ = out.push(transfer.window_ack(SD_ACK_ABORT));
                }
                transfer.state = TransferState::Error;
                continue;
            }

            transfer.window_deadline_tick = now.wrapping_add(self.window_timeout_ms);
            match transfer.state {
                TransferState::Requesting => {
                    // No chunk yet: the request itself may have been lost.
                    let _ = out.push(transfer.request_frame());
                }
                TransferState::Receiving => {
                    log.emit(
                        MessageId::SdWindowRetry,
                        &[
                            transfer.module_raw() as u32,
                            transfer.current_window as u32,
                            transfer.chunk_bitmap[window] as u32,
                        ],
                    );
                    let _ = out.push(transfer.window_ack(SD_ACK_RETRY));
                }
                _ => {}
            }
        }
    }

    /// Last status code the module reported for its bound transfer
    /// (`status::IN_PROGRESS` until the 0x3F3 report lands).
    pub fn module_status(&self, module: ModuleId) -> Option<u8> {
        self.transfers
            .iter()
            .find(|t| t.module == Some(module) && t.state != TransferState::Idle)
            .map(|t| t.module_status)
    }

    /// State and sector of the transfer bound to `module`, if any.
    pub fn transfer_state(&self, module: ModuleId) -> Option<(TransferState, u32)> {
        self.transfers
            .iter()
            .find(|t| t.module == Some(module) && t.state != TransferState::Idle)
            .map(|t| (t.state, t.sector_num))
    }

    /// Completed sector payload for `module`.
    pub fn sector_data(&self, module: ModuleId) -> Option<&[u8; SECTOR_SIZE]> {
        self.transfers
            .iter()
            .find(|t| t.module == Some(module) && t.state == TransferState::Complete)
            .map(|t| &t.buffer)
    }

    /// Per-window received-chunk bitmaps of the transfer bound to `module`.
    pub fn chunk_bitmaps(&self, module: ModuleId) -> Option<[u16; WINDOWS_PER_SECTOR]> {
        self.transfers
            .iter()
            .find(|t| t.module == Some(module) && t.state != TransferState::Idle)
            .map(|t| t.chunk_bitmap)
    }

    /// Return the context bound to `module` to the pool.
    pub fn release(&mut self, module: ModuleId) {
        for transfer in self.transfers.iter_mut() {
            if transfer.module == Some(module) {
                let id = transfer.transfer_id;
                *transfer = SectorTransfer::new(id);
            }
        }
    }

    /// Abort every active transfer (link down).
    pub fn abort_all<S: DebugSink>(&mut self, log: &EventLog<S>) {
        for transfer in self.transfers.iter_mut().filter(|t| t.active()) {
            log.emit(
                MessageId::SdTransferAborted,
                &[transfer.module_raw() as u32, transfer.current_window as u32],
            );
            transfer.state = TransferState::Error;
        }
    }
}
