//! Round-robin polling and heartbeat cadence over the wire.
mod helpers;

use helpers::{expect_absence, expect_frame, spawn_pack, MemKeyStore, MockCanBus};
use packlink::protocol::wire::can_frame::CanFrame;
use packlink::protocol::wire::ids;
use packlink::protocol::wire::messages::{Announcement, Status1};
use packlink::protocol::wire::traits::can_bus::CanBus;

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

fn status1_reply(module_id: u8) -> CanFrame {
    Status1 {
        state: 1,
        status: 0,
        soc_raw: 200,
        soh_raw: 200,
        cell_count: 14,
        current_raw: 0x8000,
        voltage_raw: 0x0C80,
    }
    .encode(module_id)
}

#[tokio::test(start_paused = true)]
async fn registered_module_is_status_polled() {
    let (mut host, _commands) = spawn_pack(MemKeyStore::new());
    let id = register_module(&mut host, 0x1111).await;

    let req = expect_frame(&mut host, |f| f.id.base_id() == ids::MODULE_STATUS_REQUEST).await;
    assert_eq!(req.id.module_field(), id);
    assert_eq!(req.payload(), &[0x01]);
}

#[tokio::test(start_paused = true)]
async fn reply_gate_blocks_duplicate_requests_until_answered() {
    let (mut host, _commands) = spawn_pack(MemKeyStore::new());
    let id = register_module(&mut host, 0x1111).await;

    expect_frame(&mut host, |f| f.id.base_id() == ids::MODULE_STATUS_REQUEST).await;

    // No reply: the gate holds for the soft timeout window.
    expect_absence(&mut host, 400, |f| {
        f.id.base_id() == ids::MODULE_STATUS_REQUEST
    })
    .await;

    // Reply clears the gate; the next round polls again.
    host.send(&status1_reply(id)).await.unwrap();
    expect_frame(&mut host, |f| f.id.base_id() == ids::MODULE_STATUS_REQUEST).await;
}

#[tokio::test(start_paused = true)]
async fn poll_round_robins_across_modules() {
    let (mut host, _commands) = spawn_pack(MemKeyStore::new());
    let first = register_module(&mut host, 0x0101).await;
    let second = register_module(&mut host, 0x0202).await;

    let req_a = expect_frame(&mut host, |f| f.id.base_id() == ids::MODULE_STATUS_REQUEST).await;
    host.send(&status1_reply(req_a.id.module_field())).await.unwrap();
    let req_b = expect_frame(&mut host, |f| f.id.base_id() == ids::MODULE_STATUS_REQUEST).await;

    let polled = [req_a.id.module_field(), req_b.id.module_field()];
    assert!(polled.contains(&first));
    assert!(polled.contains(&second));
    assert_ne!(polled[0], polled[1]);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_runs_only_with_registered_modules() {
    let (mut host, _commands) = spawn_pack(MemKeyStore::new());

    // Empty pack: no MaxState broadcast.
    expect_absence(&mut host, 1_000, |f| {
        f.id.base_id() == ids::MODULE_MAX_STATE
    })
    .await;

    register_module(&mut host, 0x1111).await;
    let hb = expect_frame(&mut host, |f| f.id.base_id() == ids::MODULE_MAX_STATE).await;
    assert_eq!(hb.id.module_field(), 0x00);
    // Freshly registered modules are commanded Off.
    assert_eq!(hb.payload(), &[0]);
}

#[tokio::test(start_paused = true)]
async fn time_sync_broadcast_carries_marker_and_seconds() {
    let (mut host, _commands) = spawn_pack(MemKeyStore::new());
    register_module(&mut host, 0x1111).await;

    let sync = expect_frame(&mut host, |f| f.id.base_id() == ids::MODULE_SET_TIME).await;
    assert_eq!(sync.len, 5);
    assert_eq!(sync.data[0], 0xFF);
}
