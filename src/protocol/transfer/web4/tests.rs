use super::*;
use crate::infra::debug::NullSink;
use crate::protocol::wire::ext_id::ExtId;

fn log() -> EventLog<NullSink> {
    EventLog::new(0, 0, 0, NullSink)
}

fn chunk_frame(base: u16, chunk: u8, payload: [u8; 8]) -> CanFrame {
    CanFrame::new(ExtId(Web4ChunkId::compose(base, chunk).0), &payload)
}

/// Key blob whose byte 63 satisfies the XOR rule.
fn blob(fill: u8) -> [u8; KEY_SIZE] {
    let mut blob = [fill; KEY_SIZE];
    blob[KEY_SIZE - 1] = xor_checksum(&blob[..KEY_SIZE - 1]);
    blob
}

fn deliver_blob(
    engine: &mut Web4Engine,
    base: u16,
    blob: &[u8; KEY_SIZE],
) -> heapless::Vec<CanFrame, 8> {
    let log = log();
    let mut acks = heapless::Vec::new();
    for chunk in 0..NUM_CHUNKS {
        let mut payload = [0u8; 8];
        payload.copy_from_slice(&blob[chunk as usize * 8..chunk as usize * 8 + 8]);
        if let Some(ack) = engine.handle_chunk(100, &chunk_frame(base, chunk, payload), &log) {
            let _ = acks.push(ack);
        }
    }
    acks
}

#[test]
fn full_reception_stores_key_and_acks_each_chunk() {
    let mut engine = Web4Engine::new(5_000);
    let blob = blob(0x5A);
    let acks = deliver_blob(&mut engine, ids::WEB4_PACK_KEY_HALF, &blob);

    assert_eq!(acks.len(), 8);
    for (i, ack) in acks.iter().enumerate() {
        assert_eq!(ack.id.base_id(), ids::WEB4_PACK_KEY_ACK);
        assert_eq!(ack.data[0], i as u8);
        assert_eq!(ack.data[1], ack::SUCCESS);
    }

    assert!(engine.keys().pack_key_valid);
    assert_eq!(engine.keys().pack_device, blob);
    // XOR over the stored 64 bytes is zero when the checksum held.
    assert_eq!(xor_checksum(&engine.keys().pack_device), 0);
    assert!(!engine.receiving());
}

#[test]
fn duplicate_chunk_is_acked_without_overwrite() {
    let mut engine = Web4Engine::new(5_000);
    let log = log();
    let frame = chunk_frame(ids::WEB4_PACK_KEY_HALF, 0, [0x11; 8]);
    engine.handle_chunk(10, &frame, &log).unwrap();

    // Same chunk again with different bytes: ACK SUCCESS, buffer untouched.
    let dup = chunk_frame(ids::WEB4_PACK_KEY_HALF, 0, [0x22; 8]);
    let ack = engine.handle_chunk(11, &dup, &log).unwrap();
    assert_eq!(ack.data[1], ack::SUCCESS);
    assert_eq!(&engine.rx.buffer[..8], &[0x11; 8]);
}

#[test]
fn wrong_length_is_dropped_without_ack() {
    let mut engine = Web4Engine::new(5_000);
    let log = log();
    let mut frame = chunk_frame(ids::WEB4_PACK_KEY_HALF, 0, [0; 8]);
    frame.len = 4;
    assert!(engine.handle_chunk(10, &frame, &log).is_none());
    assert!(!engine.receiving());
}

#[test]
fn checksum_mismatch_naks_and_resets() {
    let mut engine = Web4Engine::new(5_000);
    let mut bad = blob(0x5A);
    bad[KEY_SIZE - 1] ^= 0xFF;
    let acks = deliver_blob(&mut engine, ids::WEB4_PACK_KEY_HALF, &bad);

    let last = acks.last().unwrap();
    assert_eq!(last.data[0], NUM_CHUNKS - 1);
    assert_eq!(last.data[1], ack::CHECKSUM_ERROR);
    assert!(!engine.keys().pack_key_valid);
    assert!(!engine.receiving());
}

#[test]
fn key_type_switch_restarts_reception() {
    let mut engine = Web4Engine::new(5_000);
    let log = log();
    engine
        .handle_chunk(10, &chunk_frame(ids::WEB4_PACK_KEY_HALF, 0, [1; 8]), &log)
        .unwrap();
    assert!(engine.receiving());

    // A chunk of a different key type abandons the pending blob.
    engine
        .handle_chunk(20, &chunk_frame(ids::WEB4_APP_KEY_HALF, 3, [2; 8]), &log)
        .unwrap();
    assert_eq!(engine.rx.current_key_type, KeyType::AppDevice);
    assert_eq!(engine.rx.chunks_received, 1 << 3);
}

#[test]
fn all_three_blocks_trigger_persist() {
    let mut engine = Web4Engine::new(5_000);
    deliver_blob(&mut engine, ids::WEB4_PACK_KEY_HALF, &blob(0x01));
    assert!(engine.take_persist_request().is_none());
    deliver_blob(&mut engine, ids::WEB4_APP_KEY_HALF, &blob(0x02));
    assert!(engine.take_persist_request().is_none());
    deliver_blob(&mut engine, ids::WEB4_COMPONENT_IDS, &blob(0x03));

    let keys = engine.take_persist_request().expect("persist requested");
    assert!(keys.all_valid());
    // Request is edge-triggered.
    assert!(engine.take_persist_request().is_none());
}

#[test]
fn stalled_reception_times_out() {
    let mut engine = Web4Engine::new(5_000);
    let log = log();
    engine
        .handle_chunk(1_000, &chunk_frame(ids::WEB4_PACK_KEY_HALF, 0, [1; 8]), &log)
        .unwrap();

    engine.check_timeout(5_900, &log);
    assert!(engine.receiving());

    engine.check_timeout(6_100, &log);
    assert!(!engine.receiving());
}

#[test]
fn timeout_survives_tick_wraparound() {
    let mut engine = Web4Engine::new(5_000);
    let log = log();
    let near_wrap = u32::MAX - 1_000;
    engine
        .handle_chunk(near_wrap, &chunk_frame(ids::WEB4_PACK_KEY_HALF, 0, [1; 8]), &log)
        .unwrap();

    // 2 s later the counter has wrapped; no spurious timeout.
    engine.check_timeout(near_wrap.wrapping_add(2_000), &log);
    assert!(engine.receiving());

    engine.check_timeout(near_wrap.wrapping_add(5_100), &log);
    assert!(!engine.receiving());
}
