//! Pack manager: inbound frame dispatcher, outbound command queue, and the
//! periodic machinery tying the registry and transfer engines together.
//!
//! [`PackController`] is sans-io: the host (normally the
//! [`supervisor`]) feeds it received frames via
//! [`handle_frame`](PackController::handle_frame) and drains outbound
//! traffic via [`service`](PackController::service) on a 10 ms tick.
//! Timeouts are the only event source besides frame arrival and host
//! commands.
pub mod requests;
pub mod supervisor;

mod monitor;
mod scheduler;

use heapless::Vec;

use crate::config::PackConfig;
use crate::error::{DecodeError, RegistryError, TransferError};
use crate::infra::debug::{DebugSink, EventLog, MessageId};
use crate::protocol::keys::StoredKeys;
use crate::protocol::registry::{ModuleRegistry, ModuleState};
use crate::protocol::transfer::sector::{SectorEngine, TransferState, SECTOR_SIZE};
use crate::protocol::transfer::web4::Web4Engine;
use crate::protocol::wire::can_frame::CanFrame;
use crate::protocol::wire::ext_id::{ModuleAddress, ModuleId};
use crate::protocol::wire::messages::{
    self, Announcement, CellCommStatus1, Detail, Hardware, Registration, Status1, Status2,
    Status3, TransferStatus,
};
use crate::protocol::wire::{ids, TIMEOUT_SWEEP_MS};
use requests::{PendingRequests, RegistrationAck, RequestKind, StateCommand};
use scheduler::{deadline_passed, Scheduler};

/// Broadcast or single-module target of a state command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTarget {
    Module(ModuleId),
    All,
}

/// Frame handed to the host for transmission. `kind` identifies the
/// command-queue latch to re-assert when the driver rejects the send;
/// transfer ACKs carry `None` and rely on their own deadline machinery.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub frame: CanFrame,
    pub kind: Option<RequestKind>,
}

/// Bus traffic counters for the host status surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkStats {
    pub rx_frames: u32,
    pub tx_frames: u32,
    pub tx_errors: u32,
}

/// Upper bound on frames one service tick can produce (transfer retries
/// plus one queued command).
pub const MAX_OUTBOUND_PER_TICK: usize = 8;

/// The pack controller engine.
pub struct PackController<S: DebugSink> {
    cfg: PackConfig,
    log: EventLog<S>,
    registry: ModuleRegistry,
    requests: PendingRequests,
    scheduler: Scheduler,
    sectors: SectorEngine,
    web4: Web4Engine,
    link_up: bool,
    stats: LinkStats,
    next_sweep: u32,
    /// Copy of the last built request, kept for failure re-assertion.
    last_request: Option<SavedRequest>,
    /// Millisecond tick at which the engine came up; time-sync broadcasts
    /// carry seconds relative to this.
    boot_tick: u32,
}

/// Enough of a built request to re-latch it after a failed transmit.
#[derive(Debug, Clone, Copy)]
enum SavedRequest {
    StateChange(StateCommand),
    Heartbeat,
    CellDetail(ModuleId, u8),
    StatusRequest(ModuleId),
    RegistrationAck(RegistrationAck),
    TimeSync,
    AnnounceRequest,
}

impl<S: DebugSink> PackController<S> {
    pub fn new(cfg: PackConfig, sink: S) -> Self {
        let log = EventLog::new(cfg.debug_level, cfg.debug_flags, cfg.debug_once_mask, sink);
        let sectors = SectorEngine::new(
            cfg.sector_window_timeout_ms,
            cfg.sector_timeout_ms,
            cfg.sector_max_retries,
        );
        let web4 = Web4Engine::new(cfg.key_timeout_ms);
        Self {
            cfg,
            log,
            registry: ModuleRegistry::new(),
            requests: PendingRequests::default(),
            scheduler: Scheduler::new(0),
            sectors,
            web4,
            link_up: false,
            stats: LinkStats::default(),
            next_sweep: 0,
            last_request: None,
            boot_tick: 0,
        }
    }

    //==================================================================================ACCESS

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn log(&self) -> &EventLog<S> {
        &self.log
    }

    pub fn keys(&self) -> &StoredKeys {
        self.web4.keys()
    }

    /// Install the key block recovered from the nonvolatile store at boot.
    pub fn load_keys(&mut self, keys: StoredKeys) {
        self.web4.load_keys(keys);
    }

    /// Drain the persist request raised when all three key blocks became
    /// valid. The host writes the returned block to the nonvolatile store.
    pub fn take_keys_for_persist(&mut self) -> Option<StoredKeys> {
        self.web4.take_persist_request()
    }

    pub fn sector_state(&self, module: ModuleId) -> Option<(TransferState, u32)> {
        self.sectors.transfer_state(module)
    }

    /// Module-reported status code of the transfer bound to `module`.
    pub fn sector_module_status(&self, module: ModuleId) -> Option<u8> {
        self.sectors.module_status(module)
    }

    pub fn discovery_active(&self) -> bool {
        self.scheduler.discovery_active()
    }

    /// Module currently under cell-detail polling.
    pub fn cell_view(&self) -> Option<ModuleId> {
        self.scheduler.cell_view()
    }

    pub fn sector_data(&self, module: ModuleId) -> Option<&[u8; SECTOR_SIZE]> {
        self.sectors.sector_data(module)
    }

    pub fn release_sector(&mut self, module: ModuleId) {
        self.sectors.release(module)
    }

    //==================================================================================COMMANDS

    /// Command one module into `state`. The commanded intent is recorded
    /// immediately so the next heartbeat reflects it.
    pub fn set_state(&mut self, target: StateTarget, state: ModuleState) {
        match target {
            StateTarget::Module(id) => {
                if self.registry.slot(id).registered {
                    self.registry.slot_mut(id).commanded_state = state;
                }
                self.requests.state_change = Some(StateCommand::Set {
                    target: Some(id),
                    state,
                });
            }
            StateTarget::All => {
                let ids: Vec<ModuleId, 31> = self.registry.registered_ids().collect();
                for id in ids {
                    self.registry.slot_mut(id).commanded_state = state;
                }
                self.requests.state_change = Some(StateCommand::Set {
                    target: None,
                    state,
                });
            }
        }
    }

    /// Deregister one module: the slot releases immediately, the frame
    /// follows at the next service tick.
    pub fn deregister_module(&mut self, id: ModuleId) {
        let unique_id = self.registry.slot(id).unique_id;
        self.log
            .emit(MessageId::ModuleRemoved, &[id.raw() as u32, unique_id]);
        self.registry.deregister(id);
        self.requests.state_change = Some(StateCommand::Deregister(id));
    }

    pub fn deregister_all(&mut self) {
        self.registry.deregister_all();
        self.requests.state_change = Some(StateCommand::DeregisterAll);
    }

    /// Broadcast relay-open. Commanded states drop to Off.
    pub fn isolate_all(&mut self) {
        let ids: Vec<ModuleId, 31> = self.registry.registered_ids().collect();
        for id in ids {
            self.registry.slot_mut(id).commanded_state = ModuleState::Off;
        }
        self.requests.state_change = Some(StateCommand::IsolateAll);
    }

    pub fn start_discovery(&mut self, now: u32) {
        self.scheduler.start_discovery(now);
    }

    pub fn stop_discovery(&mut self) {
        self.scheduler.stop_discovery();
    }

    /// One-shot announce request outside of discovery mode.
    pub fn request_announce(&mut self) {
        self.requests.announce_request = true;
    }

    /// Select (or clear) the module whose cells the operator is viewing.
    pub fn select_cell_view(&mut self, module: Option<ModuleId>) {
        self.scheduler.select_cell_view(module);
    }

    /// Operator-driven registration: re-latch the acknowledgement for a
    /// slot whose module already announced (covers a module that lost the
    /// original ACK without waiting for its re-announcement).
    pub fn register_module(&mut self, id: ModuleId) -> Result<(), RegistryError> {
        let slot = self.registry.slot(id);
        if slot.unique_id == 0 {
            return Err(RegistryError::NotRegistered(id.raw()));
        }
        self.requests.registration_ack = Some(RegistrationAck {
            assigned_id: id,
            mfg_id: slot.mfg_id,
            part_id: slot.part_id,
            unique_id: slot.unique_id,
        });
        Ok(())
    }

    /// Distribute WEB4 key halves to a registered module: the material is
    /// recorded in the slot and the device key half is handed back as
    /// eight chunk frames for the caller to transmit.
    pub fn distribute_keys(
        &mut self,
        module: ModuleId,
        device_key: [u8; 64],
        lct_key: [u8; 64],
        out: &mut Vec<CanFrame, 8>,
    ) -> Result<(), RegistryError> {
        self.registry.store_web4_keys(module, device_key, lct_key)?;
        for chunk in 0..8u8 {
            let mut payload = [0u8; 8];
            let offset = chunk as usize * 8;
            payload.copy_from_slice(&device_key[offset..offset + 8]);
            self.stats.tx_frames = self.stats.tx_frames.wrapping_add(1);
            let _ = out.push(messages::module_key_chunk(module.raw(), chunk, &payload));
        }
        self.log
            .emit(MessageId::Web4KeysDistributed, &[module.raw() as u32]);
        Ok(())
    }

    /// Record a module's component id (storage only, no wire traffic).
    pub fn store_component_id(
        &mut self,
        module: ModuleId,
        component_id: [u8; 32],
    ) -> Result<(), RegistryError> {
        self.registry.store_web4_component(module, component_id)
    }

    /// Build a hardware-capability request for the host to transmit.
    pub fn request_hardware(&mut self, module: ModuleId) -> Option<CanFrame> {
        if !self.link_up || !self.registry.slot(module).registered {
            return None;
        }
        self.log
            .emit(MessageId::TxHardwareRequest, &[module.raw() as u32]);
        self.stats.tx_frames = self.stats.tx_frames.wrapping_add(1);
        Some(messages::hardware_request(module.raw()))
    }

    /// Start a sector read; the returned request frame must be
    /// transmitted by the caller.
    pub fn read_sector(
        &mut self,
        now: u32,
        module: ModuleId,
        sector: u32,
    ) -> Result<CanFrame, TransferError> {
        if !self.link_up {
            return Err(TransferError::LinkDown);
        }
        let frame = self.sectors.start(now, module, sector, &self.log)?;
        self.stats.tx_frames = self.stats.tx_frames.wrapping_add(1);
        Ok(frame)
    }

    //==================================================================================LINK

    /// The CAN link came up (driver connected / bus recovered). Periods
    /// restart and a fresh announce request goes out.
    pub fn link_up(&mut self, now: u32) {
        self.link_up = true;
        self.boot_tick = now;
        self.scheduler.reset(now);
        self.next_sweep = now.wrapping_add(TIMEOUT_SWEEP_MS);
        self.requests.clear();
        self.requests.announce_request = true;
        self.log.emit(MessageId::LinkUp, &[]);
    }

    /// The CAN link dropped: every pending request is cancelled, in-flight
    /// gates reset, and all transfers abort.
    pub fn link_down(&mut self) {
        self.link_up = false;
        self.requests.clear();
        self.last_request = None;
        self.sectors.abort_all(&self.log);
        self.web4.abort();
        for id in ModuleId::all() {
            let slot = self.registry.slot_mut(id);
            slot.awaiting_status_reply = false;
            slot.awaiting_cell_reply = false;
        }
        self.log.emit(MessageId::LinkDown, &[]);
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    //==================================================================================RX

    /// Dispatch one received frame. Returns an immediate response frame
    /// (transfer or key-chunk acknowledgement) when the protocol calls for
    /// one; queue-managed replies go through the request latches instead.
    pub fn handle_frame(&mut self, now: u32, frame: &CanFrame) -> Option<CanFrame> {
        self.stats.rx_frames = self.stats.rx_frames.wrapping_add(1);
        let base_id = frame.id.base_id();

        let response = match base_id {
            ids::MODULE_ANNOUNCEMENT => self.on_announcement(now, frame, false),
            // Known module firmware bug: announcements arrive on base
            // 0x000; accepted with a warning.
            0x000 => self.on_announcement(now, frame, true),
            ids::MODULE_HARDWARE
            | ids::MODULE_STATUS_1
            | ids::MODULE_STATUS_2
            | ids::MODULE_STATUS_3
            | ids::MODULE_DETAIL
            | ids::MODULE_TIME_REQUEST
            | ids::MODULE_CELL_COMM_STATUS_1 => {
                self.on_module_frame(now, frame);
                None
            }
            ids::SD_DATA_CHUNK => self.sectors.handle_chunk(now, frame),
            ids::SD_TRANSFER_STATUS => {
                self.on_transfer_status(frame);
                None
            }
            _ if ids::is_web4_chunk(base_id) => self.web4.handle_chunk(now, frame, &self.log),
            _ => {
                self.log_decode_error(frame, &DecodeError::UnknownId { base_id });
                None
            }
        };

        if response.is_some() {
            self.stats.tx_frames = self.stats.tx_frames.wrapping_add(1);
        }
        response
    }

    /// Announcement → registration handshake. Idempotent under lost
    /// frames: every (re-)announcement latches a fresh acknowledgement
    /// with the stable assigned id.
    fn on_announcement(&mut self, now: u32, frame: &CanFrame, zero_base: bool) -> Option<CanFrame> {
        let ann = match Announcement::decode(frame) {
            Ok(ann) => ann,
            Err(err) => {
                self.log_decode_error(frame, &err);
                return None;
            }
        };
        if zero_base {
            self.log
                .emit(MessageId::RxAnnouncementZeroId, &[ann.unique_id]);
        } else {
            self.log.emit(
                MessageId::RxAnnouncement,
                &[ann.fw_version as u32, ann.unique_id],
            );
        }

        match self.registry.register(ann.unique_id) {
            Ok((id, known)) => {
                let slot = self.registry.slot_mut(id);
                slot.last_rx_tick = now;
                slot.responding = true;
                slot.mfg_id = ann.mfg_id;
                slot.part_id = ann.part_id;
                slot.message_count = slot.message_count.wrapping_add(1);
                if known {
                    self.log
                        .emit(MessageId::ModuleReregistered, &[id.raw() as u32]);
                } else {
                    self.log.emit(
                        MessageId::NewModuleRegistered,
                        &[id.raw() as u32, ann.unique_id],
                    );
                }
                self.requests.registration_ack = Some(RegistrationAck {
                    assigned_id: id,
                    mfg_id: ann.mfg_id,
                    part_id: ann.part_id,
                    unique_id: ann.unique_id,
                });
            }
            Err(_) => {
                // No acknowledgement; the module stays unregistered and
                // may re-announce.
                self.log.emit(MessageId::RegistryFull, &[ann.unique_id]);
            }
        }
        None
    }

    /// Telemetry and request traffic from an assigned module id.
    fn on_module_frame(&mut self, now: u32, frame: &CanFrame) {
        let id = match frame.id.address() {
            Ok(ModuleAddress::Assigned(id)) => id,
            _ => {
                self.log
                    .emit(MessageId::RxUnregistered, &[frame.id.module_field() as u32]);
                return;
            }
        };
        if !self.registry.slot(id).registered {
            self.log
                .emit(MessageId::RxUnregistered, &[id.raw() as u32]);
            return;
        }

        let result = match frame.id.base_id() {
            ids::MODULE_STATUS_1 => Status1::decode(frame).map(|msg| {
                self.registry.apply_status1(id, &msg, now);
                self.log.emit(
                    MessageId::RxStatus1,
                    &[id.raw() as u32, msg.state as u32, msg.soc_raw as u32 / 2],
                );
            }),
            ids::MODULE_STATUS_2 => Status2::decode(frame).map(|msg| {
                self.registry.apply_status2(id, &msg, now);
                self.log.emit(MessageId::RxStatus2, &[id.raw() as u32]);
            }),
            ids::MODULE_STATUS_3 => Status3::decode(frame).map(|msg| {
                self.registry.apply_status3(id, &msg, now);
                self.log.emit(MessageId::RxStatus3, &[id.raw() as u32]);
            }),
            ids::MODULE_HARDWARE => Hardware::decode(frame).map(|msg| {
                self.registry.apply_hardware(id, &msg, now);
                self.log.emit(MessageId::RxHardware, &[id.raw() as u32]);
            }),
            ids::MODULE_DETAIL => Detail::decode(frame).map(|msg| {
                self.registry.apply_detail(id, &msg, now);
                self.log.emit(
                    MessageId::RxDetail,
                    &[id.raw() as u32, msg.cell_id as u32],
                );
            }),
            ids::MODULE_CELL_COMM_STATUS_1 => CellCommStatus1::decode(frame).map(|msg| {
                self.registry.apply_cell_comm(id, &msg, now);
                self.log.emit(
                    MessageId::RxCellComm,
                    &[id.raw() as u32, msg.i2c_errors as u32],
                );
            }),
            ids::MODULE_TIME_REQUEST => {
                // The module wants wall-clock now rather than at the next
                // periodic sync.
                self.log.emit(MessageId::RxTimeRequest, &[id.raw() as u32]);
                self.requests.time_sync = true;
                let slot = self.registry.slot_mut(id);
                slot.last_rx_tick = now;
                slot.message_count = slot.message_count.wrapping_add(1);
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(err) = result {
            self.log_decode_error(frame, &err);
        }
    }

    fn on_transfer_status(&mut self, frame: &CanFrame) {
        let Ok(ModuleAddress::Assigned(id)) = frame.id.address() else {
            return;
        };
        match TransferStatus::decode(frame) {
            Ok(report) => self.sectors.handle_status(id, &report, &self.log),
            Err(err) => self.log_decode_error(frame, &err),
        }
    }

    /// Frame-layer errors are logged and the frame dropped; state never
    /// advances on malformed input.
    fn log_decode_error(&self, frame: &CanFrame, err: &DecodeError) {
        match err {
            DecodeError::UnknownId { base_id } => {
                self.log.emit(MessageId::RxUnknownId, &[*base_id as u32]);
            }
            _ => {
                self.log.emit(
                    MessageId::RxMalformed,
                    &[frame.id.base_id() as u32, frame.len as u32],
                );
            }
        }
    }

    //==================================================================================TX

    /// One service tick: transfer deadlines, the slow timeout sweep, the
    /// periodic schedulers, then at most one frame from the command queue.
    pub fn service(&mut self, now: u32, out: &mut Vec<Outbound, MAX_OUTBOUND_PER_TICK>) {
        if !self.link_up {
            return;
        }

        // Transfer retries and aborts bypass the command queue; their
        // cadence is the window deadline, not the tick.
        let mut transfer_frames: Vec<CanFrame, 4> = Vec::new();
        self.sectors.poll(now, &self.log, &mut transfer_frames);
        for frame in transfer_frames {
            self.stats.tx_frames = self.stats.tx_frames.wrapping_add(1);
            let _ = out.push(Outbound { frame, kind: None });
        }

        if deadline_passed(now, self.next_sweep) {
            self.next_sweep = now.wrapping_add(TIMEOUT_SWEEP_MS);
            monitor::sweep(now, &self.cfg, &mut self.registry, &mut self.web4, &self.log);
        }

        self.scheduler
            .service(now, &self.cfg, &self.registry, &mut self.requests);

        if let Some(outbound) = self.build_next_request(now) {
            self.stats.tx_frames = self.stats.tx_frames.wrapping_add(1);
            let _ = out.push(outbound);
        }
    }

    /// Pop the highest-priority latch and build its frame, applying the
    /// transmit-time side effects (reply gates, registration completion).
    fn build_next_request(&mut self, now: u32) -> Option<Outbound> {
        loop {
            let kind = self.requests.next_kind()?;
            let frame = match kind {
                RequestKind::StateChange => {
                    let cmd = self.requests.state_change.take()?;
                    self.last_request = Some(SavedRequest::StateChange(cmd));
                    match cmd {
                        StateCommand::Set { target, state } => {
                            let field = target.map(ModuleId::raw).unwrap_or(0x00);
                            self.log.emit(
                                MessageId::TxStateChange,
                                &[field as u32, state.raw() as u32],
                            );
                            messages::state_change(field, state.raw())
                        }
                        StateCommand::Deregister(id) => {
                            self.log
                                .emit(MessageId::TxDeregister, &[id.raw() as u32]);
                            messages::deregister(id.raw())
                        }
                        StateCommand::DeregisterAll => {
                            self.log.emit(MessageId::TxDeregisterAll, &[]);
                            messages::all_deregister()
                        }
                        StateCommand::IsolateAll => {
                            self.log.emit(MessageId::TxIsolateAll, &[]);
                            messages::all_isolate()
                        }
                    }
                }
                RequestKind::Heartbeat => {
                    self.requests.heartbeat = false;
                    // The pack may have emptied since the latch was set.
                    let Some(max) = self.registry.max_commanded_state() else {
                        continue;
                    };
                    self.last_request = Some(SavedRequest::Heartbeat);
                    self.log
                        .emit(MessageId::TxMaxState, &[max.raw() as u32]);
                    messages::max_state(max.raw())
                }
                RequestKind::CellDetail => {
                    let (id, cell) = self.requests.cell_detail.take()?;
                    self.last_request = Some(SavedRequest::CellDetail(id, cell));
                    let slot = self.registry.slot_mut(id);
                    slot.awaiting_cell_reply = true;
                    slot.cell_request_tick = now;
                    self.scheduler.cell_sent(&self.registry, cell);
                    self.log.emit(
                        MessageId::TxDetailRequest,
                        &[id.raw() as u32, cell as u32],
                    );
                    messages::detail_request(id.raw(), cell)
                }
                RequestKind::StatusRequest => {
                    let id = self.requests.status_request.take()?;
                    self.last_request = Some(SavedRequest::StatusRequest(id));
                    let slot = self.registry.slot_mut(id);
                    slot.awaiting_status_reply = true;
                    slot.status_request_tick = now;
                    self.log
                        .emit(MessageId::TxStatusRequest, &[id.raw() as u32]);
                    messages::status_request(id.raw())
                }
                RequestKind::RegistrationAck => {
                    let ack = self.requests.registration_ack.take()?;
                    self.last_request = Some(SavedRequest::RegistrationAck(ack));
                    self.registry.mark_registered(ack.assigned_id, now);
                    self.log.emit(
                        MessageId::TxRegistration,
                        &[ack.assigned_id.raw() as u32, ack.unique_id],
                    );
                    Registration {
                        assigned_id: ack.assigned_id.raw(),
                        mfg_id: ack.mfg_id,
                        part_id: ack.part_id,
                        unique_id: ack.unique_id,
                    }
                    .encode()
                }
                RequestKind::TimeSync => {
                    self.requests.time_sync = false;
                    self.last_request = Some(SavedRequest::TimeSync);
                    let seconds = now.wrapping_sub(self.boot_tick) / 1_000;
                    self.log.emit(MessageId::TxSetTime, &[seconds]);
                    messages::set_time(seconds)
                }
                RequestKind::AnnounceRequest => {
                    self.requests.announce_request = false;
                    self.last_request = Some(SavedRequest::AnnounceRequest);
                    self.log.emit(MessageId::TxAnnounceRequest, &[]);
                    messages::announce_request()
                }
            };
            return Some(Outbound {
                frame,
                kind: Some(kind),
            });
        }
    }

    /// The driver rejected a queued frame. Latched requests re-assert for
    /// the next tick; periodic one-shots log and drop (their next period
    /// retries anyway).
    pub fn transmit_failed(&mut self, kind: RequestKind) {
        self.stats.tx_errors = self.stats.tx_errors.wrapping_add(1);
        self.log
            .emit(MessageId::TxFailed, &[kind.discriminant() as u32]);

        match self.last_request.take() {
            Some(SavedRequest::StateChange(cmd)) if kind == RequestKind::StateChange => {
                if self.requests.state_change.is_none() {
                    self.requests.state_change = Some(cmd);
                }
            }
            Some(SavedRequest::Heartbeat) if kind == RequestKind::Heartbeat => {
                self.requests.heartbeat = true;
            }
            Some(SavedRequest::CellDetail(id, cell)) if kind == RequestKind::CellDetail => {
                let slot = self.registry.slot_mut(id);
                slot.awaiting_cell_reply = false;
                self.scheduler.cell_resend(cell);
                if self.requests.cell_detail.is_none() {
                    self.requests.cell_detail = Some((id, cell));
                }
            }
            Some(SavedRequest::StatusRequest(id)) if kind == RequestKind::StatusRequest => {
                let slot = self.registry.slot_mut(id);
                slot.awaiting_status_reply = false;
                if self.requests.status_request.is_none() {
                    self.requests.status_request = Some(id);
                }
            }
            Some(SavedRequest::RegistrationAck(ack)) if kind == RequestKind::RegistrationAck => {
                // Harmless overshoot: the slot already reads registered;
                // the re-sent acknowledgement is idempotent.
                if self.requests.registration_ack.is_none() {
                    self.requests.registration_ack = Some(ack);
                }
            }
            _ => {
                // TimeSync / AnnounceRequest, or a stale save: drop.
            }
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
