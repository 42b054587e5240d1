//! Timeout and failure monitor.
//!
//! Runs on the slow sweep: releases stale reply gates, declares silent
//! modules lost (deregister-in-place, identity retained), expires stalled
//! key receptions, and scans registered slots for electrical faults.
//! Fault findings are events plus an `error_count` bump. The monitor
//! never forces a slot's state; modules report their own fault status in
//! the Status_1 high nibble.
use heapless::Vec;

use crate::config::PackConfig;
use crate::infra::debug::{DebugSink, EventLog, MessageId};
use crate::protocol::registry::{ModuleRegistry, MAX_MODULES};
use crate::protocol::transfer::web4::Web4Engine;
use crate::protocol::wire::ext_id::ModuleId;
use crate::protocol::wire::scale;

/// Any cell below this (in volts) while above the open-circuit floor is an
/// undervoltage finding.
const CELL_UV_V: f32 = 2.5;
/// Readings below this are treated as a disconnected tap, not a fault.
const CELL_FLOOR_V: f32 = 0.1;
const CELL_OV_V: f32 = 4.2;
const OVERTEMP_C: f32 = 60.0;

/// One pass over the registry and the key engine.
pub(crate) fn sweep<S: DebugSink>(
    now: u32,
    cfg: &PackConfig,
    registry: &mut ModuleRegistry,
    web4: &mut Web4Engine,
    log: &EventLog<S>,
) {
    let mut lost: Vec<ModuleId, MAX_MODULES> = Vec::new();

    for id in ModuleId::all() {
        let slot = registry.slot_mut(id);
        if !slot.registered {
            continue;
        }

        // Release reply gates that outlived their deadline so polling can
        // move on; the request is considered lost.
        if slot.awaiting_status_reply
            && now.wrapping_sub(slot.status_request_tick) > cfg.status_request_timeout_ms
        {
            slot.awaiting_status_reply = false;
            slot.responding = false;
            slot.error_count = slot.error_count.wrapping_add(1);
            log.emit(MessageId::StatusGateReleased, &[id.raw() as u32]);
        }
        if slot.awaiting_cell_reply
            && now.wrapping_sub(slot.cell_request_tick) > cfg.cell_detail_timeout_ms
        {
            slot.awaiting_cell_reply = false;
        }

        // Hard declaration of loss: nothing heard at all.
        let silent_ms = now.wrapping_sub(slot.last_rx_tick);
        if silent_ms >= cfg.module_hard_timeout_ms {
            log.emit(MessageId::TimeoutWarning, &[id.raw() as u32, silent_ms]);
            let _ = lost.push(id);
            continue;
        }

        scan_faults(id, registry, log);
    }

    for id in lost {
        let unique_id = registry.slot(id).unique_id;
        log.emit(MessageId::ModuleRemoved, &[id.raw() as u32, unique_id]);
        registry.deregister(id);
    }

    web4.check_timeout(now, log);
}

/// Electrical fault scan for one registered slot.
fn scan_faults<S: DebugSink>(id: ModuleId, registry: &mut ModuleRegistry, log: &EventLog<S>) {
    let slot = registry.slot_mut(id);
    let mut violations: u32 = 0;

    for (cell, &raw) in slot.cell_voltages.iter().enumerate() {
        let volts = scale::cell_voltage(raw);
        if volts > CELL_FLOOR_V && volts < CELL_UV_V {
            log.emit(
                MessageId::FaultUndervoltage,
                &[id.raw() as u32, cell as u32],
            );
            violations += 1;
        }
        if volts > CELL_OV_V {
            log.emit(MessageId::FaultOvervoltage, &[id.raw() as u32, cell as u32]);
            violations += 1;
        }
    }

    if slot.temp_hi > OVERTEMP_C {
        log.emit(MessageId::FaultOvertemperature, &[id.raw() as u32]);
        violations += 1;
    }

    if !slot.responding {
        log.emit(MessageId::FaultNotResponding, &[id.raw() as u32]);
        violations += 1;
    }

    slot.error_count = slot.error_count.wrapping_add(violations);
}
