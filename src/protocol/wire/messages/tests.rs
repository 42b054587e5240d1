use super::*;
use crate::error::DecodeError;

#[test]
fn announcement_decode_matches_wire_example() {
    // ext_id 0x140000FF, payload 01 00 42 07 78 56 34 12.
    let frame = CanFrame::new(
        ExtId(0x1400_00FF),
        &[0x01, 0x00, 0x42, 0x07, 0x78, 0x56, 0x34, 0x12],
    );
    let ann = Announcement::decode(&frame).unwrap();
    assert_eq!(ann.fw_version, 0x0001);
    assert_eq!(ann.mfg_id, 0x42);
    assert_eq!(ann.part_id, 0x07);
    assert_eq!(ann.unique_id, 0x1234_5678);
}

#[test]
fn announcement_round_trip() {
    let ann = Announcement {
        fw_version: 0x0203,
        mfg_id: 0x42,
        part_id: 0x07,
        unique_id: 0xDEAD_BEEF,
    };
    let frame = ann.encode();
    assert_eq!(frame.id.base_id(), 0x500);
    assert_eq!(frame.id.module_field(), 0xFF);
    assert_eq!(Announcement::decode(&frame).unwrap(), ann);
}

#[test]
fn announcement_truncated() {
    let frame = CanFrame::new(ExtId(0x1400_00FF), &[0x01, 0x00, 0x42]);
    assert_eq!(
        Announcement::decode(&frame),
        Err(DecodeError::Truncated {
            expected: 8,
            actual: 3
        })
    );
}

#[test]
fn registration_encode_matches_wire_example() {
    // Expected: ext_id (0x510<<18)|1 = 0x14400001, payload 01 01 42 07 78 56 34 12.
    let frame = Registration {
        assigned_id: 1,
        mfg_id: 0x42,
        part_id: 0x07,
        unique_id: 0x1234_5678,
    }
    .encode();
    assert_eq!(frame.id.0, 0x1440_0001);
    assert_eq!(
        frame.data,
        [0x01, 0x01, 0x42, 0x07, 0x78, 0x56, 0x34, 0x12]
    );
    assert_eq!(frame.len, 8);
}

#[test]
fn status1_decode_matches_wire_example() {
    // Payload 31 C8 C8 0E C0 27 80 0C: state=1 (standby), status=3,
    // soc=100 %, soh=100 %, cells=14, current raw 0x27C0, voltage raw 0x0C80.
    let frame = CanFrame::new(
        ExtId::new(ids::MODULE_STATUS_1, 0x01),
        &[0x31, 0xC8, 0xC8, 0x0E, 0xC0, 0x27, 0x80, 0x0C],
    );
    let s = Status1::decode(&frame).unwrap();
    assert_eq!(s.state, 1);
    assert_eq!(s.status, 3);
    assert_eq!(s.soc_raw, 200);
    assert_eq!(s.soh_raw, 200);
    assert_eq!(s.cell_count, 14);
    assert_eq!(s.current_raw, 0x27C0);
    assert_eq!(s.voltage_raw, 0x0C80);
}

#[test]
fn status1_round_trip() {
    let s = Status1 {
        state: 3,
        status: 0x0A,
        soc_raw: 150,
        soh_raw: 190,
        cell_count: 14,
        current_raw: 0x8000,
        voltage_raw: 0x0C80,
    };
    let frame = s.encode(5);
    assert_eq!(Status1::decode(&frame).unwrap(), s);
}

#[test]
fn status2_status3_layouts() {
    let frame = CanFrame::new(
        ExtId::new(ids::MODULE_STATUS_2, 2),
        &[0x10, 0x0C, 0xE8, 0x0C, 0x7C, 0x0C, 0x80, 0x0C],
    );
    let s2 = Status2::decode(&frame).unwrap();
    assert_eq!(s2.cell_lo_raw, 0x0C10);
    assert_eq!(s2.cell_hi_raw, 0x0CE8);
    assert_eq!(s2.cell_avg_raw, 0x0C7C);
    assert_eq!(s2.cell_total_raw, 0x0C80);

    let frame = CanFrame::new(
        ExtId::new(ids::MODULE_STATUS_3, 2),
        &[0x63, 0x1F, 0x9B, 0x1F, 0x7F, 0x1F, 0x00, 0x00],
    );
    let s3 = Status3::decode(&frame).unwrap();
    assert_eq!(s3.temp_lo_raw, 0x1F63);
    assert_eq!(s3.temp_hi_raw, 0x1F9B);
    assert_eq!(s3.temp_avg_raw, 0x1F7F);
}

#[test]
fn detail_layout() {
    let frame = CanFrame::new(
        ExtId::new(ids::MODULE_DETAIL, 4),
        &[0x03, 0x0E, 0x63, 0x1F, 0xE4, 0x0C, 0xC8, 0xC0],
    );
    let d = Detail::decode(&frame).unwrap();
    assert_eq!(d.cell_id, 3);
    assert_eq!(d.cell_count_expected, 14);
    assert_eq!(d.temp_raw, 0x1F63);
    assert_eq!(d.volt_raw, 0x0CE4);
    assert_eq!(d.cell_soc_raw, 0xC8);
    assert_eq!(d.cell_soh_raw, 0xC0);
}

#[test]
fn plain_request_frames() {
    let f = status_request(7);
    assert_eq!(f.id.0, (0x512 << 18) | 7);
    assert_eq!(f.payload(), &[0x01]);

    let f = state_change(0x00, 3);
    assert_eq!(f.id.0, 0x1450_0000);
    assert_eq!(f.payload(), &[3]);

    let f = detail_request(2, 9);
    assert_eq!(f.id.0, (0x515 << 18) | 2);
    assert_eq!(f.payload(), &[9]);

    let f = max_state(2);
    assert_eq!(f.id.0, (0x517 << 18));
    assert_eq!(f.payload(), &[2]);

    let f = deregister(3);
    assert_eq!(f.id.0, (0x518 << 18) | 3);
    assert_eq!(f.len, 0);

    let f = announce_request();
    assert_eq!(f.id.0, (0x51D << 18) | 0xFF);

    assert_eq!(all_deregister().id.0, 0x51E << 18);
    assert_eq!(all_isolate().id.0, 0x51F << 18);
}

#[test]
fn set_time_is_marker_plus_be_seconds() {
    let f = set_time(0x0102_0304);
    assert_eq!(f.id.0, 0x516 << 18);
    assert_eq!(f.payload(), &[0xFF, 0x01, 0x02, 0x03, 0x04]);
}

#[test]
fn sector_request_checksum_round_trip() {
    let req = SectorRequest {
        transfer_id: 0,
        sector_num: 100,
        options: 0,
    };
    let frame = req.encode(3);
    assert_eq!(frame.id.0, (0x3F0 << 18) | 3);
    assert_eq!(frame.data[0], SD_CMD_READ_SECTOR);
    assert_eq!(frame.data[2..6], 100u32.to_le_bytes());
    assert_eq!(frame.data[7], xor_checksum(&frame.data[0..7]));
    assert_eq!(SectorRequest::decode(&frame).unwrap(), req);
}

#[test]
fn sector_request_rejects_bad_checksum() {
    let mut frame = SectorRequest {
        transfer_id: 1,
        sector_num: 7,
        options: 0,
    }
    .encode(3);
    frame.data[7] ^= 0xFF;
    assert!(SectorRequest::decode(&frame).is_err());
}

#[test]
fn window_ack_round_trip() {
    let ack = WindowAck {
        transfer_id: 2,
        window_id: 1,
        bitmap: 0xABCD,
        status: SD_ACK_RETRY,
        crc16: 0x1234,
    };
    let frame = ack.encode(5);
    assert_eq!(frame.id.0, (0x3F2 << 18) | 5);
    assert_eq!(WindowAck::decode(&frame).unwrap(), ack);
}

#[test]
fn transfer_status_round_trip() {
    let st = TransferStatus {
        transfer_id: 1,
        status_code: 0x00,
        windows_done: 4,
        final_crc: 0xBEEF,
        time_ms: 480,
    };
    let frame = st.encode(3);
    assert_eq!(frame.id.0, (0x3F3 << 18) | 3);
    assert_eq!(TransferStatus::decode(&frame).unwrap(), st);
}

#[test]
fn web4_ack_layout() {
    let f = web4_ack(ids::WEB4_PACK_KEY_ACK, 5, 0x00);
    assert_eq!(f.id.0, 0x4A7 << 18);
    assert_eq!(f.len, 8);
    assert_eq!(f.data[0], 5);
    assert_eq!(f.data[1], 0x00);
}

#[test]
fn module_key_chunk_carries_chunk_and_module() {
    let payload = [9u8; 8];
    let f = module_key_chunk(0x05, 6, &payload);
    assert_eq!(f.id.0, (0x260 << 18) | (6 << 8) | 0x05);
    assert_eq!(f.id.base_id(), ids::MODULE_KEY_CHUNK);
    assert_eq!(f.id.module_field(), 0x05);
    assert_eq!(Web4ChunkId::from(f.id).chunk_num(), 6);
    assert_eq!(f.payload(), &payload);
}
