//! Windowed sector transfer over the wire: request, chunk streaming,
//! per-window bitmap acknowledgement, retry, and final CRC.
mod helpers;

use helpers::{expect_frame, spawn_pack, MemKeyStore, MockCanBus};
use packlink::infra::crc;
use packlink::protocol::manager::supervisor::PackCommand;
use packlink::protocol::wire::can_frame::CanFrame;
use packlink::protocol::wire::ext_id::{ExtId, ModuleId, SdChunkId};
use packlink::protocol::wire::ids;
use packlink::protocol::wire::traits::can_bus::CanBus;
use packlink::protocol::wire::messages::{
    Announcement, SectorRequest, TransferStatus, WindowAck, SD_ACK_OK, SD_ACK_RETRY,
};

async fn register_module(host: &mut MockCanBus, unique_id: u32) -> u8 {
    host.send(
        &Announcement {
            fw_version: 0x0001,
            mfg_id: 0x42,
            part_id: 0x07,
            unique_id,
        }
        .encode(),
    )
    .await
    .unwrap();
    let reg = expect_frame(host, |f| f.id.base_id() == ids::MODULE_REGISTRATION).await;
    reg.data[0]
}

fn sector_byte(offset: usize) -> u8 {
    (offset as u8).wrapping_mul(13).wrapping_add(5)
}

fn chunk_frame(module_id: u8, transfer_id: u8, window: u8, chunk: u8) -> CanFrame {
    let mut payload = [0u8; 8];
    let base = window as usize * 128 + chunk as usize * 8;
    for (i, b) in payload.iter_mut().enumerate() {
        *b = sector_byte(base + i);
    }
    let id = SdChunkId::compose(
        module_id,
        transfer_id,
        chunk,
        window,
        window == 3 && chunk == 15,
    );
    CanFrame::new(ExtId(id.0), &payload)
}

#[tokio::test(start_paused = true)]
async fn full_sector_transfer_acks_every_window() {
    let (mut host, commands) = spawn_pack(MemKeyStore::new());
    let module_id = register_module(&mut host, 0x3333).await;

    commands
        .send(PackCommand::ReadSector {
            module: ModuleId::new(module_id).unwrap(),
            sector: 100,
        })
        .await;

    let request = expect_frame(&mut host, |f| f.id.base_id() == ids::SD_SECTOR_REQUEST).await;
    assert_eq!(request.id.module_field(), module_id);
    let request = SectorRequest::decode(&request).unwrap();
    assert_eq!(request.sector_num, 100);

    let mut running = crc::CRC16_INIT;
    for window in 0..4u8 {
        for chunk in 0..16u8 {
            host.send(&chunk_frame(module_id, request.transfer_id, window, chunk))
                .await
                .unwrap();
        }
        let ack = expect_frame(&mut host, |f| f.id.base_id() == ids::SD_WINDOW_ACK).await;
        let ack = WindowAck::decode(&ack).unwrap();
        assert_eq!(ack.transfer_id, request.transfer_id);
        assert_eq!(ack.window_id, window);
        assert_eq!(ack.bitmap, 0xFFFF);
        assert_eq!(ack.status, SD_ACK_OK);

        let mut window_bytes = [0u8; 128];
        for (i, b) in window_bytes.iter_mut().enumerate() {
            *b = sector_byte(window as usize * 128 + i);
        }
        running = crc::update_slice(running, &window_bytes);
        assert_eq!(ack.crc16, running);
    }

    // Final report closes the transfer; nothing more is expected on the
    // SD ids.
    host.send(
        &TransferStatus {
            transfer_id: request.transfer_id,
            status_code: 0x00,
            windows_done: 4,
            final_crc: running,
            time_ms: 480,
        }
        .encode(module_id),
    )
    .await
    .unwrap();

    helpers::expect_absence(&mut host, 1_000, |f| {
        f.id.base_id() == ids::SD_WINDOW_ACK || f.id.base_id() == ids::SD_SECTOR_REQUEST
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn missing_chunks_are_renegotiated_with_bitmap() {
    let (mut host, commands) = spawn_pack(MemKeyStore::new());
    let module_id = register_module(&mut host, 0x4444).await;

    commands
        .send(PackCommand::ReadSector {
            module: ModuleId::new(module_id).unwrap(),
            sector: 9,
        })
        .await;
    let request = expect_frame(&mut host, |f| f.id.base_id() == ids::SD_SECTOR_REQUEST).await;
    let request = SectorRequest::decode(&request).unwrap();

    // Deliver window 0 with chunks 3 and 7 missing.
    for chunk in (0..16u8).filter(|c| *c != 3 && *c != 7) {
        host.send(&chunk_frame(module_id, request.transfer_id, 0, chunk))
            .await
            .unwrap();
    }

    // The window deadline elapses and the pack asks for the missing two.
    let ack = expect_frame(&mut host, |f| f.id.base_id() == ids::SD_WINDOW_ACK).await;
    let ack = WindowAck::decode(&ack).unwrap();
    assert_eq!(ack.status, SD_ACK_RETRY);
    assert_eq!(ack.bitmap, !((1u16 << 3) | (1u16 << 7)));

    // Retransmit the missing chunks: the window completes normally.
    for chunk in [3u8, 7] {
        host.send(&chunk_frame(module_id, request.transfer_id, 0, chunk))
            .await
            .unwrap();
    }
    let ack = expect_frame(&mut host, |f| f.id.base_id() == ids::SD_WINDOW_ACK).await;
    let ack = WindowAck::decode(&ack).unwrap();
    assert_eq!(ack.status, SD_ACK_OK);
    assert_eq!(ack.bitmap, 0xFFFF);
    assert_eq!(ack.window_id, 0);
}

#[tokio::test(start_paused = true)]
async fn lost_request_is_retried_on_deadline() {
    let (mut host, commands) = spawn_pack(MemKeyStore::new());
    let module_id = register_module(&mut host, 0x5555).await;

    commands
        .send(PackCommand::ReadSector {
            module: ModuleId::new(module_id).unwrap(),
            sector: 7,
        })
        .await;

    // The original request plus at least one deadline-driven resend.
    let first = expect_frame(&mut host, |f| f.id.base_id() == ids::SD_SECTOR_REQUEST).await;
    let second = expect_frame(&mut host, |f| f.id.base_id() == ids::SD_SECTOR_REQUEST).await;
    assert_eq!(
        SectorRequest::decode(&first).unwrap(),
        SectorRequest::decode(&second).unwrap()
    );
}
