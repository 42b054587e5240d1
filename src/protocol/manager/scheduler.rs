//! Periodic scheduling: MaxState heartbeat, time sync, announce requests,
//! round-robin status polling, and the operator-driven cell-detail poller.
//!
//! All deadlines use wrapping tick arithmetic so a 32-bit rollover of the
//! millisecond counter does not fire spurious periods.
use crate::config::PackConfig;
use crate::protocol::manager::requests::PendingRequests;
use crate::protocol::registry::ModuleRegistry;
use crate::protocol::wire::ext_id::ModuleId;

/// True when `deadline` lies at or before `now` under wrapping arithmetic.
pub(crate) fn deadline_passed(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) < 0x8000_0000
}

/// Cell-detail poller state: active only while the operator is viewing the
/// cell surface of one module.
#[derive(Debug, Clone, Copy)]
struct CellPoll {
    module: ModuleId,
    next_cell: u8,
}

/// Timer state of the periodic schedulers.
pub struct Scheduler {
    next_heartbeat: u32,
    next_time_sync: u32,
    next_announce: u32,
    next_poll: u32,
    /// Raw id of the module considered on the previous poll tick.
    poll_cursor: u8,
    discovery_active: bool,
    cell_view: Option<CellPoll>,
}

impl Scheduler {
    pub fn new(now: u32) -> Self {
        Self {
            next_heartbeat: now,
            next_time_sync: now,
            next_announce: now,
            next_poll: now,
            poll_cursor: 0,
            discovery_active: false,
            cell_view: None,
        }
    }

    /// Restart every period from `now` (link re-up).
    pub fn reset(&mut self, now: u32) {
        self.next_heartbeat = now;
        self.next_time_sync = now;
        self.next_announce = now;
        self.next_poll = now;
        self.poll_cursor = 0;
    }

    pub fn start_discovery(&mut self, now: u32) {
        self.discovery_active = true;
        self.next_announce = now;
    }

    pub fn stop_discovery(&mut self) {
        self.discovery_active = false;
    }

    pub fn discovery_active(&self) -> bool {
        self.discovery_active
    }

    /// Switch the cell-detail poller to `module` (or off).
    pub fn select_cell_view(&mut self, module: Option<ModuleId>) {
        self.cell_view = module.map(|module| CellPoll {
            module,
            next_cell: 0,
        });
    }

    /// Module currently under cell-detail polling.
    pub fn cell_view(&self) -> Option<ModuleId> {
        self.cell_view.map(|cp| cp.module)
    }

    /// A detail request for `cell` went out: advance to the next cell,
    /// wrapping over the module's reported string length.
    pub fn cell_sent(&mut self, registry: &ModuleRegistry, cell: u8) {
        if let Some(cp) = self.cell_view.as_mut() {
            let count = registry.slot(cp.module).cell_count_expected.max(1);
            cp.next_cell = cell.wrapping_add(1) % count;
        }
    }

    /// A detail request failed to transmit: retry the same cell index.
    pub fn cell_resend(&mut self, cell: u8) {
        if let Some(cp) = self.cell_view.as_mut() {
            cp.next_cell = cell;
        }
    }

    /// Latch every request whose period elapsed.
    pub fn service(
        &mut self,
        now: u32,
        cfg: &PackConfig,
        registry: &ModuleRegistry,
        requests: &mut PendingRequests,
    ) {
        if deadline_passed(now, self.next_heartbeat) {
            self.next_heartbeat = now.wrapping_add(cfg.heartbeat_period_ms);
            // Silent when the pack is empty.
            if registry.registered_count() > 0 {
                requests.heartbeat = true;
            }
        }

        if deadline_passed(now, self.next_time_sync) {
            self.next_time_sync = now.wrapping_add(cfg.time_sync_period_ms);
            if registry.registered_count() > 0 {
                requests.time_sync = true;
            }
        }

        if deadline_passed(now, self.next_announce) {
            self.next_announce = now.wrapping_add(cfg.announce_period_ms);
            if self.discovery_active {
                requests.announce_request = true;
            }
        }

        if deadline_passed(now, self.next_poll) {
            self.next_poll = now.wrapping_add(cfg.status_poll_period_ms);
            self.poll_status(registry, requests);
        }

        self.poll_cells(registry, requests);
    }

    /// Round-robin status polling. One module is considered per poll tick;
    /// a request goes out only when its reply gate is clear, so at most one
    /// status request is outstanding per module.
    fn poll_status(&mut self, registry: &ModuleRegistry, requests: &mut PendingRequests) {
        let Some(id) = Self::next_registered_after(registry, self.poll_cursor) else {
            return;
        };
        self.poll_cursor = id.raw();
        if !registry.slot(id).awaiting_status_reply {
            requests.status_request = Some(id);
        }
    }

    /// Smallest registered id strictly after `cursor`, wrapping.
    fn next_registered_after(registry: &ModuleRegistry, cursor: u8) -> Option<ModuleId> {
        ModuleId::all()
            .filter(|id| id.raw() > cursor)
            .chain(ModuleId::all())
            .find(|id| registry.slot(*id).registered)
    }

    /// Cell-detail poller: one request at a time toward the selected
    /// module, gated on the tighter detail reply deadline.
    fn poll_cells(&mut self, registry: &ModuleRegistry, requests: &mut PendingRequests) {
        let Some(cp) = self.cell_view else {
            return;
        };
        let slot = registry.slot(cp.module);
        if !slot.registered || slot.cell_count_expected == 0 {
            return;
        }
        if slot.awaiting_cell_reply || requests.cell_detail.is_some() {
            return;
        }
        requests.cell_detail = Some((cp.module, cp.next_cell));
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
