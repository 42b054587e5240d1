use super::*;
use core::cell::RefCell;

/// Sink capturing rendered lines for assertions.
struct CaptureSink {
    lines: RefCell<heapless::Vec<String<LINE_CAP>, 16>>,
}

impl CaptureSink {
    fn new() -> Self {
        Self {
            lines: RefCell::new(heapless::Vec::new()),
        }
    }
}

impl DebugSink for CaptureSink {
    fn write_line(&self, line: &str) {
        let mut owned = String::new();
        let _ = owned.push_str(line);
        let _ = self.lines.borrow_mut().push(owned);
    }
}

fn log_with(level: u8, flag_mask: u32, once: u32) -> EventLog<CaptureSink> {
    EventLog::new(level, flag_mask, once, CaptureSink::new())
}

#[test]
fn render_substitutes_decimal_and_hex() {
    let mut out: String<LINE_CAP> = String::new();
    render("id={0:02x} n={1} raw={2:08x}", &[0x5, 42, 0x12345678], &mut out);
    assert_eq!(out.as_str(), "id=05 n=42 raw=12345678");
}

#[test]
fn render_out_of_range_is_placeholder() {
    let mut out: String<LINE_CAP> = String::new();
    render("v={3}", &[1], &mut out);
    assert_eq!(out.as_str(), "v=?");
}

#[test]
fn emit_requires_level_and_flag() {
    let log = log_with(levels::COMMS, flags::STATUS_REQ, 0);
    log.emit(MessageId::TxStatusRequest, &[1]);
    assert_eq!(log.sink.lines.borrow().len(), 1);

    // Wrong level.
    let log = log_with(levels::ERRORS, flags::STATUS_REQ, 0);
    log.emit(MessageId::TxStatusRequest, &[1]);
    assert!(log.sink.lines.borrow().is_empty());

    // Flag disabled.
    let log = log_with(levels::COMMS, flags::NONE, 0);
    log.emit(MessageId::TxStatusRequest, &[1]);
    assert!(log.sink.lines.borrow().is_empty());
}

#[test]
fn once_per_boot_suppresses_repeats() {
    let log = log_with(levels::ERRORS, flags::TIMEOUT, flags::TIMEOUT);
    log.emit(MessageId::TimeoutWarning, &[2, 5000]);
    log.emit(MessageId::TimeoutWarning, &[2, 6000]);
    assert_eq!(log.sink.lines.borrow().len(), 1);

    log.reset_once_only();
    log.emit(MessageId::TimeoutWarning, &[2, 7000]);
    assert_eq!(log.sink.lines.borrow().len(), 2);
}

#[test]
fn minimal_mode_uses_token_when_available() {
    let log = log_with(levels::COMMS, flags::STATUS_REQ | flags::MINIMAL, 0);
    log.emit(MessageId::TxStatusRequest, &[7]);
    let lines = log.sink.lines.borrow();
    assert_eq!(lines[0].as_str(), ".7-");
}

#[test]
fn minimal_mode_falls_back_to_full_form() {
    // TxDeregisterAll has no minimal token.
    let log = log_with(levels::COMMS, flags::DEREGISTER_ALL | flags::MINIMAL, 0);
    log.emit(MessageId::TxDeregisterAll, &[]);
    let lines = log.sink.lines.borrow();
    assert!(lines[0].as_str().contains("0x51E"));
}
