//! WEB4 key-chunk reception engine.
//!
//! A 64-byte key half arrives as eight 8-byte chunks; the chunk index rides
//! in the extended identifier. Every chunk is acknowledged individually on
//! the matching ACK id, byte 63 of the assembled blob is an XOR checksum of
//! bytes 0..62, and a completed blob lands in [`StoredKeys`]. At most one
//! reception is in flight; a chunk for a different key type restarts the
//! state machine.
use crate::infra::debug::{DebugSink, EventLog, MessageId};
use crate::protocol::keys::{KeyType, StoredKeys, KEY_SIZE};
use crate::protocol::wire::can_frame::CanFrame;
use crate::protocol::wire::ext_id::Web4ChunkId;
use crate::protocol::wire::ids;
use crate::protocol::wire::messages::{web4_ack, xor_checksum};

/// Chunk payload size on the wire.
pub const CHUNK_SIZE: usize = 8;
/// Chunks per key blob.
pub const NUM_CHUNKS: u8 = 8;

/// ACK/NAK status codes.
pub mod ack {
    pub const SUCCESS: u8 = 0x00;
    pub const CHECKSUM_ERROR: u8 = 0x01;
    pub const SEQUENCE_ERROR: u8 = 0x02;
    pub const STORAGE_ERROR: u8 = 0x03;
    pub const TIMEOUT: u8 = 0x04;
}

fn key_type_of(base_id: u16) -> Option<KeyType> {
    match base_id {
        ids::WEB4_PACK_KEY_HALF => Some(KeyType::PackDevice),
        ids::WEB4_APP_KEY_HALF => Some(KeyType::AppDevice),
        ids::WEB4_COMPONENT_IDS => Some(KeyType::ComponentIds),
        _ => None,
    }
}

fn ack_base_of(key_type: KeyType) -> u16 {
    match key_type {
        KeyType::PackDevice => ids::WEB4_PACK_KEY_ACK,
        KeyType::AppDevice => ids::WEB4_APP_KEY_ACK,
        KeyType::ComponentIds => ids::WEB4_COMPONENT_ACK,
    }
}

/// In-progress reception of one key blob.
struct KeyReception {
    buffer: [u8; KEY_SIZE],
    /// Bit `i` set once chunk `i` landed.
    chunks_received: u8,
    expected_chunks: u8,
    current_key_type: KeyType,
    last_chunk_tick: u32,
    active: bool,
}

impl KeyReception {
    const fn new() -> Self {
        Self {
            buffer: [0; KEY_SIZE],
            chunks_received: 0,
            expected_chunks: 0,
            current_key_type: KeyType::PackDevice,
            last_chunk_tick: 0,
            active: false,
        }
    }

    fn reset(&mut self) {
        self.active = false;
        self.chunks_received = 0;
        self.expected_chunks = 0;
        // The buffer is overwritten by the next reception.
    }
}

/// Key reception engine plus the live key block.
pub struct Web4Engine {
    rx: KeyReception,
    keys: StoredKeys,
    /// Set when all three blocks become valid; the host drains it with
    /// [`take_persist_request`](Self::take_persist_request).
    persist_pending: bool,
    timeout_ms: u32,
}

impl Web4Engine {
    pub fn new(timeout_ms: u32) -> Self {
        Self {
            rx: KeyReception::new(),
            keys: StoredKeys::new(),
            persist_pending: false,
            timeout_ms,
        }
    }

    /// Install the key block recovered from the nonvolatile store at boot.
    pub fn load_keys(&mut self, keys: StoredKeys) {
        self.keys = keys;
    }

    pub fn keys(&self) -> &StoredKeys {
        &self.keys
    }

    /// True while a reception is in flight.
    pub fn receiving(&self) -> bool {
        self.rx.active
    }

    /// When a persist was requested, hand out a copy of the keys to write.
    pub fn take_persist_request(&mut self) -> Option<StoredKeys> {
        self.persist_pending.then(|| {
            self.persist_pending = false;
            self.keys.clone()
        })
    }

    /// Ingest one key chunk frame. Returns the ACK/NAK to transmit, or
    /// `None` when the frame is dropped without acknowledgement.
    pub fn handle_chunk<S: DebugSink>(
        &mut self,
        now: u32,
        frame: &CanFrame,
        log: &EventLog<S>,
    ) -> Option<CanFrame> {
        let chunk_id = Web4ChunkId::from(frame.id);
        let key_type = key_type_of(chunk_id.base_id())?;
        let chunk_num = chunk_id.chunk_num();

        if frame.len != CHUNK_SIZE {
            // Malformed frame: no acknowledgement, the sender retries.
            log.emit(MessageId::Web4InvalidLength, &[frame.len as u32]);
            return None;
        }

        // Web4ChunkId only exposes three bits, so the range check guards
        // against future id-layout changes rather than live traffic.
        if chunk_num >= NUM_CHUNKS {
            log.emit(MessageId::Web4InvalidChunk, &[chunk_num as u32]);
            return Some(web4_ack(
                ack_base_of(key_type),
                chunk_num,
                ack::SEQUENCE_ERROR,
            ));
        }

        // A different key type mid-reception abandons the pending blob.
        if !self.rx.active || self.rx.current_key_type != key_type {
            self.rx.reset();
            self.rx.active = true;
            self.rx.current_key_type = key_type;
            self.rx.expected_chunks = NUM_CHUNKS;
            log.emit(
                MessageId::Web4ReceptionStart,
                &[key_type.discriminant() as u32],
            );
        }

        let bit = 1u8 << chunk_num;
        if self.rx.chunks_received & bit != 0 {
            // Duplicate: acknowledge again, leave the buffer alone.
            log.emit(MessageId::Web4DuplicateChunk, &[chunk_num as u32]);
            return Some(web4_ack(ack_base_of(key_type), chunk_num, ack::SUCCESS));
        }

        let offset = chunk_num as usize * CHUNK_SIZE;
        self.rx.buffer[offset..offset + CHUNK_SIZE].copy_from_slice(&frame.data);
        self.rx.chunks_received |= bit;
        self.rx.last_chunk_tick = now;
        log.emit(
            MessageId::Web4ChunkReceived,
            &[chunk_num as u32, self.rx.chunks_received as u32],
        );

        if self.rx.chunks_received == 0xFF {
            return Some(self.finish(key_type, log));
        }

        Some(web4_ack(ack_base_of(key_type), chunk_num, ack::SUCCESS))
    }

    /// All eight chunks landed: verify the checksum and store the blob.
    fn finish<S: DebugSink>(&mut self, key_type: KeyType, log: &EventLog<S>) -> CanFrame {
        let computed = xor_checksum(&self.rx.buffer[..KEY_SIZE - 1]);
        let stored = self.rx.buffer[KEY_SIZE - 1];
        if computed != stored {
            log.emit(
                MessageId::Web4ChecksumError,
                &[computed as u32, stored as u32],
            );
            self.rx.reset();
            return web4_ack(
                ack_base_of(key_type),
                NUM_CHUNKS - 1,
                ack::CHECKSUM_ERROR,
            );
        }

        let buffer = self.rx.buffer;
        self.keys.store(key_type, &buffer);
        log.emit(
            MessageId::Web4KeyStored,
            &[key_type.discriminant() as u32],
        );

        if self.keys.all_valid() {
            self.persist_pending = true;
            log.emit(MessageId::Web4KeysComplete, &[]);
        }

        self.rx.reset();
        web4_ack(ack_base_of(key_type), NUM_CHUNKS - 1, ack::SUCCESS)
    }

    /// Reset a stalled reception. Call from the slow timeout sweep.
    pub fn check_timeout<S: DebugSink>(&mut self, now: u32, log: &EventLog<S>) {
        if !self.rx.active {
            return;
        }
        if now.wrapping_sub(self.rx.last_chunk_tick) > self.timeout_ms {
            log.emit(
                MessageId::Web4ReceptionTimeout,
                &[
                    self.rx.current_key_type.discriminant() as u32,
                    self.rx.chunks_received as u32,
                ],
            );
            self.rx.reset();
        }
    }

    /// Abandon any in-flight reception (link down).
    pub fn abort(&mut self) {
        self.rx.reset();
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
