//! Gated debug/event sink.
//!
//! Every protocol event is identified by a [`MessageId`] with a static
//! definition: required debug level, message flag, a verbose format and an
//! optional compact token emitted when the `MINIMAL` flag is active. A
//! message is rendered only when its level bit and its flag bit are both
//! enabled; flags listed in the once-per-boot mask are suppressed after
//! their first emission until [`EventLog::reset_once_only`].
//!
//! The log is callable from any context (`emit` takes `&self`, the masks
//! are atomics); ordering across contexts is not guaranteed.

use core::fmt::Write as _;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use heapless::String;

/// Debug level bits. A message is eligible when `level & required != 0`.
pub mod levels {
    pub const DISABLED: u8 = 0x00;
    pub const ERRORS: u8 = 0x01;
    pub const COMMS: u8 = 0x02;
    pub const MCU: u8 = 0x08;
    pub const VCU: u8 = 0x10;
    pub const VERBOSE: u8 = 0x80;
    pub const ALL: u8 = 0xFF;
}

/// Per-message flag bits, individually switchable.
pub mod flags {
    pub const NONE: u32 = 0x0000_0000;
    pub const ANNOUNCE_REQ: u32 = 0x0000_0001;
    pub const ANNOUNCE: u32 = 0x0000_0002;
    pub const REGISTRATION: u32 = 0x0000_0004;
    pub const STATUS_REQ: u32 = 0x0000_0008;
    pub const STATUS1: u32 = 0x0000_0010;
    pub const STATUS2: u32 = 0x0000_0020;
    pub const STATUS3: u32 = 0x0000_0040;
    pub const STATE_CHANGE: u32 = 0x0000_0080;
    pub const HARDWARE_REQ: u32 = 0x0000_0100;
    pub const HARDWARE: u32 = 0x0000_0200;
    pub const CELL_DETAIL: u32 = 0x0000_0400;
    pub const CELL_STATUS: u32 = 0x0000_0800;
    pub const TIME_REQ: u32 = 0x0000_2000;
    pub const SET_TIME: u32 = 0x0000_4000;
    pub const MAX_STATE: u32 = 0x0000_8000;
    pub const DEREGISTER: u32 = 0x0001_0000;
    pub const ISOLATE_ALL: u32 = 0x0002_0000;
    pub const DEREGISTER_ALL: u32 = 0x0004_0000;
    pub const POLLING: u32 = 0x0008_0000;
    pub const TIMEOUT: u32 = 0x0010_0000;
    /// Compact status pulse output (selects the minimal format strings).
    pub const MINIMAL: u32 = 0x0020_0000;
    pub const WEB4: u32 = 0x0040_0000;
    pub const SD_TRANSFER: u32 = 0x0080_0000;
    pub const CAN_ERRORS: u32 = 0x0100_0000;
    pub const REG_EVENTS: u32 = 0x0200_0000;
    pub const LINK: u32 = 0x0400_0000;
    pub const ALL: u32 = 0xFFFF_FFFF;

    pub const REGISTRATION_GROUP: u32 = ANNOUNCE_REQ | ANNOUNCE | REGISTRATION;
    pub const STATUS_GROUP: u32 = STATUS_REQ | STATUS1 | STATUS2 | STATUS3;
    pub const CELL_GROUP: u32 = CELL_DETAIL | CELL_STATUS;
}

/// Static definition of one debug message.
pub struct DebugMessageDef {
    /// Required level bit(s).
    pub level: u8,
    /// Required flag bit(s); also the once-per-boot key.
    pub flag: u32,
    /// Verbose format. Placeholders: `{N}`, `{N:x}`, `{N:02x}`, `{N:04x}`,
    /// `{N:08x}` where N indexes into the argument slice.
    pub full: &'static str,
    /// Compact token rendered instead when `MINIMAL` is enabled.
    pub minimal: Option<&'static str>,
}

/// Every event the engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    TxAnnounceRequest,
    TxRegistration,
    TxStatusRequest,
    TxStateChange,
    TxHardwareRequest,
    TxDetailRequest,
    TxSetTime,
    TxMaxState,
    TxDeregister,
    TxDeregisterAll,
    TxIsolateAll,
    TxFailed,
    RxAnnouncement,
    RxAnnouncementZeroId,
    RxHardware,
    RxStatus1,
    RxStatus2,
    RxStatus3,
    RxDetail,
    RxTimeRequest,
    RxCellComm,
    RxUnknownId,
    RxMalformed,
    RxUnregistered,
    NewModuleRegistered,
    ModuleReregistered,
    RegistryFull,
    TimeoutWarning,
    ModuleRemoved,
    StatusGateReleased,
    FaultUndervoltage,
    FaultOvervoltage,
    FaultOvertemperature,
    FaultNotResponding,
    SdTransferStart,
    SdWindowRetry,
    SdTransferAborted,
    SdTransferComplete,
    SdTransferTimeout,
    SdCrcError,
    SdModuleStatus,
    Web4ReceptionStart,
    Web4ChunkReceived,
    Web4DuplicateChunk,
    Web4InvalidLength,
    Web4InvalidChunk,
    Web4ChecksumError,
    Web4KeyStored,
    Web4KeysComplete,
    Web4KeysDistributed,
    Web4ReceptionTimeout,
    KeyStoreFailed,
    LinkDown,
    LinkUp,
}

impl MessageId {
    /// Static definition backing this message.
    pub fn def(self) -> &'static DebugMessageDef {
        use flags as f;
        use levels as l;
        use MessageId::*;
        match self {
            TxAnnounceRequest => &DebugMessageDef {
                level: l::COMMS,
                flag: f::ANNOUNCE_REQ,
                full: "TX 0x51D Request module announcements",
                minimal: None,
            },
            TxRegistration => &DebugMessageDef {
                level: l::COMMS,
                flag: f::REGISTRATION,
                full: "TX 0x510 Registration: ID={0:02x}, UID={1:08x}",
                minimal: None,
            },
            TxStatusRequest => &DebugMessageDef {
                level: l::COMMS,
                flag: f::STATUS_REQ,
                full: "TX 0x512 Request Status: ID={0:02x}",
                minimal: Some(".{0}-"),
            },
            TxStateChange => &DebugMessageDef {
                level: l::COMMS,
                flag: f::STATE_CHANGE,
                full: "TX 0x514 State Change: ID={0:02x}, State={1}",
                minimal: None,
            },
            TxHardwareRequest => &DebugMessageDef {
                level: l::COMMS,
                flag: f::HARDWARE_REQ,
                full: "TX 0x511 Hardware Request: ID={0:02x}",
                minimal: None,
            },
            TxDetailRequest => &DebugMessageDef {
                level: l::COMMS,
                flag: f::CELL_DETAIL,
                full: "TX 0x515 Detail Request: ID={0:02x}, Cell={1}",
                minimal: None,
            },
            TxSetTime => &DebugMessageDef {
                level: l::COMMS,
                flag: f::SET_TIME,
                full: "TX 0x516 Set Time: {0}s",
                minimal: None,
            },
            TxMaxState => &DebugMessageDef {
                level: l::COMMS,
                flag: f::MAX_STATE,
                full: "TX 0x517 Max State={0}",
                minimal: None,
            },
            TxDeregister => &DebugMessageDef {
                level: l::COMMS,
                flag: f::DEREGISTER,
                full: "TX 0x518 De-Register module ID={0:02x}",
                minimal: None,
            },
            TxDeregisterAll => &DebugMessageDef {
                level: l::COMMS,
                flag: f::DEREGISTER_ALL,
                full: "TX 0x51E De-Register All Modules",
                minimal: None,
            },
            TxIsolateAll => &DebugMessageDef {
                level: l::COMMS,
                flag: f::ISOLATE_ALL,
                full: "TX 0x51F Isolate All Modules",
                minimal: None,
            },
            TxFailed => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::CAN_ERRORS,
                full: "ERROR - TX failed for request kind {0}",
                minimal: None,
            },
            RxAnnouncement => &DebugMessageDef {
                level: l::COMMS,
                flag: f::ANNOUNCE,
                full: "RX 0x500 Announcement: FW={0:04x}, UID={1:08x}",
                minimal: None,
            },
            RxAnnouncementZeroId => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::ANNOUNCE,
                full: "WARN - Announcement on base 0x000 (module firmware bug), UID={0:08x}",
                minimal: None,
            },
            RxHardware => &DebugMessageDef {
                level: l::COMMS,
                flag: f::HARDWARE,
                full: "RX 0x501 Hardware: ID={0:02x}",
                minimal: None,
            },
            RxStatus1 => &DebugMessageDef {
                level: l::COMMS,
                flag: f::STATUS1,
                full: "RX 0x502 Status #1: ID={0:02x}, State={1}, SOC={2}%",
                minimal: Some("{0}"),
            },
            RxStatus2 => &DebugMessageDef {
                level: l::COMMS,
                flag: f::STATUS2,
                full: "RX 0x503 Status #2: ID={0:02x}",
                minimal: None,
            },
            RxStatus3 => &DebugMessageDef {
                level: l::COMMS,
                flag: f::STATUS3,
                full: "RX 0x504 Status #3: ID={0:02x}",
                minimal: None,
            },
            RxDetail => &DebugMessageDef {
                level: l::COMMS,
                flag: f::CELL_DETAIL,
                full: "RX 0x505 Detail: ID={0:02x}, Cell={1}",
                minimal: None,
            },
            RxTimeRequest => &DebugMessageDef {
                level: l::COMMS,
                flag: f::TIME_REQ,
                full: "RX 0x506 Time Request from ID={0:02x}",
                minimal: None,
            },
            RxCellComm => &DebugMessageDef {
                level: l::COMMS,
                flag: f::CELL_STATUS,
                full: "RX 0x507 Cell Comm: ID={0:02x}, I2C errs={1}",
                minimal: None,
            },
            RxUnknownId => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::CAN_ERRORS,
                full: "ERROR - Unknown CAN base id: {0:03x}",
                minimal: None,
            },
            RxMalformed => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::CAN_ERRORS,
                full: "ERROR - Malformed frame on base {0:03x}: {1} bytes",
                minimal: None,
            },
            RxUnregistered => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::REG_EVENTS,
                full: "ERROR - Traffic from unregistered module: ID={0:02x}",
                minimal: None,
            },
            NewModuleRegistered => &DebugMessageDef {
                level: l::MCU,
                flag: f::REG_EVENTS,
                full: "INFO - New module registered: ID={0:02x}, UID={1:08x}",
                minimal: None,
            },
            ModuleReregistered => &DebugMessageDef {
                level: l::MCU,
                flag: f::REG_EVENTS,
                full: "INFO - Module re-registered: ID={0:02x}",
                minimal: None,
            },
            RegistryFull => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::REG_EVENTS,
                full: "WARN - Registry full, announcement ignored: UID={0:08x}",
                minimal: None,
            },
            TimeoutWarning => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::TIMEOUT,
                full: "TIMEOUT - Module ID={0:02x}, silent for {1} ms",
                minimal: Some("{0}T"),
            },
            ModuleRemoved => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::DEREGISTER,
                full: "INFO - Removing module from pack: ID={0:02x}, UID={1:08x}",
                minimal: Some("{0}D"),
            },
            StatusGateReleased => &DebugMessageDef {
                level: l::MCU,
                flag: f::POLLING,
                full: "DEBUG - Status reply gate released: ID={0:02x}",
                minimal: None,
            },
            FaultUndervoltage => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::TIMEOUT,
                full: "FAULT - Module ID={0:02x} cell {1} undervoltage",
                minimal: None,
            },
            FaultOvervoltage => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::TIMEOUT,
                full: "FAULT - Module ID={0:02x} cell {1} overvoltage",
                minimal: None,
            },
            FaultOvertemperature => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::TIMEOUT,
                full: "FAULT - Module ID={0:02x} overtemperature",
                minimal: None,
            },
            FaultNotResponding => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::TIMEOUT,
                full: "FAULT - Module ID={0:02x} not responding",
                minimal: None,
            },
            SdTransferStart => &DebugMessageDef {
                level: l::COMMS,
                flag: f::SD_TRANSFER,
                full: "TX 0x3F0 Sector request: ID={0:02x}, sector={1}, xfer={2}",
                minimal: None,
            },
            SdWindowRetry => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::SD_TRANSFER,
                full: "SD - Window {1} retry on ID={0:02x}, bitmap={2:04x}",
                minimal: None,
            },
            SdTransferAborted => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::SD_TRANSFER,
                full: "SD - Transfer aborted on ID={0:02x}, window {1}",
                minimal: None,
            },
            SdTransferComplete => &DebugMessageDef {
                level: l::COMMS,
                flag: f::SD_TRANSFER,
                full: "SD - Sector {1} complete from ID={0:02x}, CRC={2:04x}",
                minimal: None,
            },
            SdTransferTimeout => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::SD_TRANSFER,
                full: "SD - Transfer timeout on ID={0:02x}, sector={1}",
                minimal: None,
            },
            SdCrcError => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::SD_TRANSFER,
                full: "SD - CRC mismatch on ID={0:02x}: theirs={1:04x}, ours={2:04x}",
                minimal: None,
            },
            SdModuleStatus => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::SD_TRANSFER,
                full: "SD - Module ID={0:02x} reported status {1:02x}",
                minimal: None,
            },
            Web4ReceptionStart => &DebugMessageDef {
                level: l::VCU,
                flag: f::WEB4,
                full: "WEB4 - Key reception started, type={0}",
                minimal: None,
            },
            Web4ChunkReceived => &DebugMessageDef {
                level: l::VCU,
                flag: f::WEB4,
                full: "WEB4 - Chunk {0} received, mask={1:02x}",
                minimal: None,
            },
            Web4DuplicateChunk => &DebugMessageDef {
                level: l::VCU,
                flag: f::WEB4,
                full: "WEB4 - Duplicate chunk {0}, re-ACK",
                minimal: None,
            },
            Web4InvalidLength => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::WEB4,
                full: "WEB4 - Invalid chunk length {0}",
                minimal: None,
            },
            Web4InvalidChunk => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::WEB4,
                full: "WEB4 - Chunk index {0} out of range",
                minimal: None,
            },
            Web4ChecksumError => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::WEB4,
                full: "WEB4 - Checksum error: computed={0:02x}, stored={1:02x}",
                minimal: None,
            },
            Web4KeyStored => &DebugMessageDef {
                level: l::VCU,
                flag: f::WEB4,
                full: "WEB4 - Key type {0} stored",
                minimal: None,
            },
            Web4KeysComplete => &DebugMessageDef {
                level: l::VCU,
                flag: f::WEB4,
                full: "WEB4 - All keys valid, persisting",
                minimal: None,
            },
            Web4KeysDistributed => &DebugMessageDef {
                level: l::VCU,
                flag: f::WEB4,
                full: "WEB4 - Keys distributed to module ID={0:02x}",
                minimal: None,
            },
            Web4ReceptionTimeout => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::WEB4,
                full: "WEB4 - Reception timeout, type={0}, mask={1:02x}",
                minimal: None,
            },
            KeyStoreFailed => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::WEB4,
                full: "ERROR - Nonvolatile key store access failed",
                minimal: None,
            },
            LinkDown => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::LINK,
                full: "LINK - CAN link down, cancelling all activity",
                minimal: None,
            },
            LinkUp => &DebugMessageDef {
                level: l::ERRORS,
                flag: f::LINK,
                full: "LINK - CAN link up",
                minimal: None,
            },
        }
    }
}

/// Output transport for rendered messages. Implementations must tolerate
/// calls from any execution context.
pub trait DebugSink {
    /// Emit one complete line.
    fn write_line(&self, line: &str);
    /// Emit a compact token with no line terminator (minimal pulse mode).
    fn write_token(&self, token: &str) {
        self.write_line(token);
    }
}

/// Sink that discards everything.
#[derive(Default)]
pub struct NullSink;

impl DebugSink for NullSink {
    fn write_line(&self, _line: &str) {}
}

/// Sink forwarding to `defmt`.
#[cfg(feature = "defmt")]
#[derive(Default)]
pub struct DefmtSink;

#[cfg(feature = "defmt")]
impl DebugSink for DefmtSink {
    fn write_line(&self, line: &str) {
        defmt::info!("{=str}", line);
    }
}

/// Longest rendered line.
const LINE_CAP: usize = 160;

/// Level/flag-gated, once-per-boot-throttled event log.
pub struct EventLog<S: DebugSink> {
    level: AtomicU8,
    flags: AtomicU32,
    once_mask: AtomicU32,
    once_shown: AtomicU32,
    sink: S,
}

impl<S: DebugSink> EventLog<S> {
    pub fn new(level: u8, flags: u32, once_mask: u32, sink: S) -> Self {
        Self {
            level: AtomicU8::new(level),
            flags: AtomicU32::new(flags),
            once_mask: AtomicU32::new(once_mask),
            once_shown: AtomicU32::new(0),
            sink,
        }
    }

    pub fn set_level(&self, level: u8) {
        self.level.store(level, Ordering::Relaxed);
    }

    pub fn set_flags(&self, flags: u32) {
        self.flags.store(flags, Ordering::Relaxed);
    }

    /// Allow once-per-boot messages to show again.
    pub fn reset_once_only(&self) {
        self.once_shown.store(0, Ordering::Relaxed);
    }

    /// Emit a message if its level and flag bits are enabled.
    pub fn emit(&self, id: MessageId, args: &[u32]) {
        let def = id.def();

        if self.level.load(Ordering::Relaxed) & def.level == 0 {
            return;
        }
        let flags = self.flags.load(Ordering::Relaxed);
        if flags & def.flag == 0 {
            return;
        }

        if self.once_mask.load(Ordering::Relaxed) & def.flag != 0 {
            let prev = self.once_shown.fetch_or(def.flag, Ordering::Relaxed);
            if prev & def.flag != 0 {
                return;
            }
        }

        let mut line: String<LINE_CAP> = String::new();
        let minimal = flags & flags::MINIMAL != 0;
        if minimal {
            if let Some(token) = def.minimal {
                render(token, args, &mut line);
                self.sink.write_token(&line);
                return;
            }
        }
        render(def.full, args, &mut line);
        self.sink.write_line(&line);
    }
}

/// Render a template into `out`, substituting `{N}` placeholders from
/// `args`. Supported conversions: decimal (default), `x`, `02x`, `03x`,
/// `04x`, `08x`. Malformed placeholders and out-of-range indices render
/// as `?`. Output silently truncates at the line capacity.
fn render(template: &str, args: &[u32], out: &mut String<LINE_CAP>) {
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '{' {
            let _ = out.push(c);
            continue;
        }

        let mut index: Option<usize> = None;
        let mut conv: String<8> = String::new();
        let mut in_conv = false;
        for c in chars.by_ref() {
            match c {
                '}' => break,
                ':' if !in_conv => in_conv = true,
                '0'..='9' if !in_conv => {
                    index = Some(index.unwrap_or(0) * 10 + (c as usize - '0' as usize));
                }
                _ if in_conv => {
                    let _ = conv.push(c);
                }
                _ => {}
            }
        }

        let value = index.and_then(|i| args.get(i).copied());
        let _ = match (value, conv.as_str()) {
            (Some(v), "") => write!(out, "{}", v),
            (Some(v), "x") => write!(out, "{:x}", v),
            (Some(v), "02x") => write!(out, "{:02x}", v),
            (Some(v), "03x") => write!(out, "{:03x}", v),
            (Some(v), "04x") => write!(out, "{:04x}", v),
            (Some(v), "08x") => write!(out, "{:08x}", v),
            _ => out.push('?').map_err(|_| core::fmt::Error),
        };
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
