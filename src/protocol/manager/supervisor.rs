//! Async supervisor driving the [`PackController`].
//!
//! The runner owns the controller and multiplexes three event sources:
//! frames from the [`CanBus`], operator commands from an optional
//! pre-allocated [`embassy_sync::channel::Channel`], and the 10 ms service
//! tick from the [`PackTimer`]. Firmware decides which features it needs by
//! providing the channel (or not); no allocation is performed by the
//! library and there is no dependency on a particular BSP.
use core::fmt::Debug;

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, Sender},
};
use futures_util::future::{select, Either};
use futures_util::pin_mut;
use heapless::Vec;

use crate::infra::debug::{DebugSink, MessageId};
use crate::protocol::manager::{PackController, StateTarget, MAX_OUTBOUND_PER_TICK};
use crate::protocol::registry::ModuleState;
use crate::protocol::wire::can_frame::CanFrame;
use crate::protocol::wire::ext_id::ModuleId;
use crate::protocol::wire::traits::{can_bus::CanBus, key_store::KeyStore, pack_timer::PackTimer};
use crate::protocol::wire::SERVICE_TICK_MS;

/// Operator surface: every command maps onto the controller's latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackCommand {
    SetState {
        target: StateTarget,
        state: ModuleState,
    },
    /// Re-issue the registration acknowledgement for a known slot.
    Register(ModuleId),
    Deregister(ModuleId),
    DeregisterAll,
    IsolateAll,
    StartDiscovery,
    StopDiscovery,
    RequestAnnounce,
    ReadSector {
        module: ModuleId,
        sector: u32,
    },
    SelectCells(Option<ModuleId>),
    /// Provision WEB4 key halves to a module (device half streams out as
    /// chunk frames).
    DistributeKeys {
        module: ModuleId,
        device_key: [u8; 64],
        lct_key: [u8; 64],
    },
    /// Record a module's component id.
    StoreComponentId {
        module: ModuleId,
        component_id: [u8; 32],
    },
    LinkUp,
    LinkDown,
}

/// Errors that terminate the supervisor loop.
#[derive(Debug)]
pub enum PackServiceError<E: Debug> {
    /// The bus receive path failed hard (driver gone).
    Receive(E),
}

/// Transmission handle for producer tasks.
pub struct PackHandle<'a, const CMD_CAP: usize> {
    sender: Sender<'a, CriticalSectionRawMutex, PackCommand, CMD_CAP>,
}

impl<'a, const CMD_CAP: usize> PackHandle<'a, CMD_CAP> {
    pub async fn send(&self, command: PackCommand) {
        self.sender.send(command).await;
    }
}

/// Service assembling the supervisor components.
pub struct PackService<'a, C, T, K, S, const CMD_CAP: usize>
where
    C: CanBus,
    C::Error: Debug,
    T: PackTimer,
    K: KeyStore,
    S: DebugSink,
{
    controller: PackController<S>,
    bus: C,
    timer: T,
    key_store: K,
    commands: Option<&'a Channel<CriticalSectionRawMutex, PackCommand, CMD_CAP>>,
}

impl<'a, C, T, K, S, const CMD_CAP: usize> PackService<'a, C, T, K, S, CMD_CAP>
where
    C: CanBus,
    C::Error: Debug,
    T: PackTimer,
    K: KeyStore,
    S: DebugSink,
{
    pub fn new(
        controller: PackController<S>,
        bus: C,
        timer: T,
        key_store: K,
        commands: Option<&'a Channel<CriticalSectionRawMutex, PackCommand, CMD_CAP>>,
    ) -> Self {
        Self {
            controller,
            bus,
            timer,
            key_store,
            commands,
        }
    }

    /// Command handle bound to the provided channel.
    pub fn handle(&self) -> Option<PackHandle<'a, CMD_CAP>> {
        self.commands.map(|channel| PackHandle {
            sender: channel.sender(),
        })
    }

    /// Drive the controller until the bus fails. Boot sequence: recover the
    /// persisted keys, bring the link up, then loop over frame RX, command
    /// intake, and the service tick.
    pub async fn run(self) -> Result<(), PackServiceError<C::Error>> {
        let Self {
            mut controller,
            mut bus,
            mut timer,
            mut key_store,
            commands,
        } = self;

        match key_store.load() {
            Ok(Some(keys)) => controller.load_keys(keys),
            Ok(None) => {}
            Err(_) => controller.log().emit(MessageId::KeyStoreFailed, &[]),
        }
        controller.link_up(timer.now_ms());

        loop {
            // Timestamps inside the tick window carry its resolution; the
            // tick future holds the timer until it fires.
            let now = timer.now_ms();
            {
                let tick = timer.delay_ms(SERVICE_TICK_MS);
                pin_mut!(tick);

                'within: loop {
                    // Resolve the select into an owned event first so the
                    // pending futures (and their bus borrow) are gone
                    // before the event is acted upon.
                    let event = {
                        let recv = bus.recv();
                        pin_mut!(recv);

                        match commands {
                            Some(cmd_ch) => {
                                let cmd = cmd_ch.receive();
                                pin_mut!(cmd);

                                match select(tick.as_mut(), select(recv, cmd)).await {
                                    Either::Left(_) => Event::Tick,
                                    Either::Right((Either::Left((frame, pending_cmd)), _)) => {
                                        drop(pending_cmd);
                                        Event::Frame(frame)
                                    }
                                    Either::Right((Either::Right((command, pending_recv)), _)) => {
                                        drop(pending_recv);
                                        Event::Command(command)
                                    }
                                }
                            }
                            None => match select(tick.as_mut(), recv).await {
                                Either::Left(_) => Event::Tick,
                                Either::Right((frame, _)) => Event::Frame(frame),
                            },
                        }
                    };

                    match event {
                        Event::Tick => break 'within,
                        Event::Frame(frame) => {
                            let frame = frame.map_err(PackServiceError::Receive)?;
                            dispatch_frame(&mut controller, &mut bus, now, &frame).await;
                        }
                        Event::Command(command) => {
                            dispatch_command(&mut controller, &mut bus, now, command).await;
                        }
                    }
                }
            }

            let now = timer.now_ms();
            let mut out: Vec<_, MAX_OUTBOUND_PER_TICK> = Vec::new();
            controller.service(now, &mut out);
            for outbound in out {
                if bus.send(&outbound.frame).await.is_err() {
                    if let Some(kind) = outbound.kind {
                        controller.transmit_failed(kind);
                    }
                }
            }

            if let Some(keys) = controller.take_keys_for_persist() {
                if key_store.save(&keys).is_err() {
                    controller.log().emit(MessageId::KeyStoreFailed, &[]);
                }
            }
        }
    }
}

/// Owned outcome of one select round.
enum Event<E> {
    Tick,
    Frame(Result<CanFrame, E>),
    Command(PackCommand),
}

/// Route one received frame and push out any immediate response.
async fn dispatch_frame<C: CanBus, S: DebugSink>(
    controller: &mut PackController<S>,
    bus: &mut C,
    now: u32,
    frame: &CanFrame,
) {
    if let Some(response) = controller.handle_frame(now, frame) {
        // Transfer and key acknowledgements retry through their own
        // deadline machinery, so a failed send is not re-queued here.
        let _ = bus.send(&response).await;
    }
}

async fn dispatch_command<C: CanBus, S: DebugSink>(
    controller: &mut PackController<S>,
    bus: &mut C,
    now: u32,
    command: PackCommand,
) {
    match command {
        PackCommand::SetState { target, state } => controller.set_state(target, state),
        PackCommand::Register(id) => {
            let _ = controller.register_module(id);
        }
        PackCommand::Deregister(id) => controller.deregister_module(id),
        PackCommand::DeregisterAll => controller.deregister_all(),
        PackCommand::IsolateAll => controller.isolate_all(),
        PackCommand::StartDiscovery => controller.start_discovery(now),
        PackCommand::StopDiscovery => controller.stop_discovery(),
        PackCommand::RequestAnnounce => controller.request_announce(),
        PackCommand::ReadSector { module, sector } => {
            if let Ok(request) = controller.read_sector(now, module, sector) {
                let _ = bus.send(&request).await;
            }
        }
        PackCommand::SelectCells(module) => controller.select_cell_view(module),
        PackCommand::DistributeKeys {
            module,
            device_key,
            lct_key,
        } => {
            let mut chunks: Vec<CanFrame, 8> = Vec::new();
            if controller
                .distribute_keys(module, device_key, lct_key, &mut chunks)
                .is_ok()
            {
                for frame in chunks {
                    let _ = bus.send(&frame).await;
                }
            }
        }
        PackCommand::StoreComponentId {
            module,
            component_id,
        } => {
            let _ = controller.store_component_id(module, component_id);
        }
        PackCommand::LinkUp => controller.link_up(now),
        PackCommand::LinkDown => controller.link_down(),
    }
}
