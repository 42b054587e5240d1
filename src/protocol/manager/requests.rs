//! Outbound command latches with strict seven-priority arbitration.
//!
//! Each request is a latched flag plus parameters, not a queue: repeated
//! sets before service coalesce into one transmission (latest parameters
//! win). The manager drains at most one latch per service tick, highest
//! priority first, so a pending state change is never starved by
//! lower-priority traffic.
use crate::protocol::registry::ModuleState;
use crate::protocol::wire::ext_id::ModuleId;

/// Request classes in strict priority order (1 = transmitted first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// 1. Safety-critical state traffic: state change, deregister, isolate.
    StateChange,
    /// 2. MaxState heartbeat broadcast.
    Heartbeat,
    /// 3. Per-cell detail request.
    CellDetail,
    /// 4. Round-robin status request.
    StatusRequest,
    /// 5. Registration acknowledgement.
    RegistrationAck,
    /// 6. Time sync broadcast.
    TimeSync,
    /// 7. Announce request.
    AnnounceRequest,
}

impl RequestKind {
    /// Stable discriminant for event logging.
    pub fn discriminant(self) -> u8 {
        match self {
            RequestKind::StateChange => 1,
            RequestKind::Heartbeat => 2,
            RequestKind::CellDetail => 3,
            RequestKind::StatusRequest => 4,
            RequestKind::RegistrationAck => 5,
            RequestKind::TimeSync => 6,
            RequestKind::AnnounceRequest => 7,
        }
    }
}

/// Parameters of the priority-1 latch. Deregistration and isolation share
/// the safety-critical slot with plain state commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCommand {
    /// Commanded state for one module, or broadcast when `target` is
    /// `None`.
    Set {
        target: Option<ModuleId>,
        state: ModuleState,
    },
    Deregister(ModuleId),
    DeregisterAll,
    IsolateAll,
}

/// Parameters of a pending registration acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationAck {
    pub assigned_id: ModuleId,
    pub mfg_id: u8,
    pub part_id: u8,
    pub unique_id: u32,
}

/// The seven latches.
#[derive(Debug, Default)]
pub struct PendingRequests {
    pub state_change: Option<StateCommand>,
    pub heartbeat: bool,
    pub cell_detail: Option<(ModuleId, u8)>,
    pub status_request: Option<ModuleId>,
    pub registration_ack: Option<RegistrationAck>,
    pub time_sync: bool,
    pub announce_request: bool,
}

impl PendingRequests {
    /// Drop every pending request (link down).
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Highest-priority latched request, if any.
    pub fn next_kind(&self) -> Option<RequestKind> {
        if self.state_change.is_some() {
            Some(RequestKind::StateChange)
        } else if self.heartbeat {
            Some(RequestKind::Heartbeat)
        } else if self.cell_detail.is_some() {
            Some(RequestKind::CellDetail)
        } else if self.status_request.is_some() {
            Some(RequestKind::StatusRequest)
        } else if self.registration_ack.is_some() {
            Some(RequestKind::RegistrationAck)
        } else if self.time_sync {
            Some(RequestKind::TimeSync)
        } else if self.announce_request {
            Some(RequestKind::AnnounceRequest)
        } else {
            None
        }
    }
}
