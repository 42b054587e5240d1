/// Test doubles simulating the CAN bus, the timer, and the nonvolatile
/// key store during integration tests.
use std::sync::{Arc, Mutex as StdMutex};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use packlink::config::PackConfig;
use packlink::infra::debug::NullSink;
use packlink::protocol::keys::StoredKeys;
use packlink::protocol::manager::supervisor::{PackCommand, PackService};
use packlink::protocol::manager::PackController;
use packlink::protocol::wire::can_frame::CanFrame;
use packlink::protocol::wire::traits::{
    can_bus::CanBus, key_store::KeyStore, pack_timer::PackTimer,
};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Duration, Instant};

#[derive(Clone)]
#[allow(dead_code)]
/// In-memory CAN bus reproducing the `CanBus` trait behavior.
pub struct MockCanBus {
    tx: mpsc::UnboundedSender<CanFrame>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<CanFrame>>>,
}

#[allow(dead_code)]
impl MockCanBus {
    /// Construct a pair of interconnected buses (DUT ↔ host).
    pub fn create_pair() -> (Self, Self) {
        let (dut_tx, host_rx) = mpsc::unbounded_channel();
        let (host_tx, dut_rx) = mpsc::unbounded_channel();

        let dut_bus = Self {
            tx: dut_tx,
            rx: Arc::new(Mutex::new(dut_rx)),
        };

        let host_bus = Self {
            tx: host_tx,
            rx: Arc::new(Mutex::new(host_rx)),
        };

        (dut_bus, host_bus)
    }
}

impl CanBus for MockCanBus {
    type Error = ();

    async fn send<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), Self::Error> {
        self.tx.send(frame.clone()).map_err(|_| ())?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(())
    }
}

#[allow(dead_code)]
/// Timer over the (pausable) tokio clock.
pub struct MockTimer {
    start: Instant,
}

#[allow(dead_code)]
impl MockTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl PackTimer for MockTimer {
    async fn delay_ms(&mut self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }

    fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

#[derive(Clone, Default)]
#[allow(dead_code)]
/// Key store backed by shared memory so tests can observe persists.
pub struct MemKeyStore {
    pub slot: Arc<StdMutex<Option<StoredKeys>>>,
}

#[allow(dead_code)]
impl MemKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Option<StoredKeys> {
        self.slot.lock().unwrap().clone()
    }
}

impl KeyStore for MemKeyStore {
    type Error = ();

    fn load(&mut self) -> Result<Option<StoredKeys>, Self::Error> {
        Ok(self.slot.lock().unwrap().clone())
    }

    fn save(&mut self, keys: &StoredKeys) -> Result<(), Self::Error> {
        *self.slot.lock().unwrap() = Some(keys.clone());
        Ok(())
    }
}

/// Operator command channel with the capacity the firmware uses.
pub type CommandChannel = Channel<CriticalSectionRawMutex, PackCommand, 8>;

/// Spawn a full pack service over a mock bus pair and return the host end
/// plus the command channel.
#[allow(dead_code)]
pub fn spawn_pack(key_store: MemKeyStore) -> (MockCanBus, &'static CommandChannel) {
    let (dut_bus, host_bus) = MockCanBus::create_pair();
    let commands: &'static CommandChannel = Box::leak(Box::new(Channel::new()));
    let controller = PackController::new(PackConfig::default(), NullSink);
    let service = PackService::new(controller, dut_bus, MockTimer::new(), key_store, Some(commands));
    tokio::spawn(async move {
        let _ = service.run().await;
    });
    (host_bus, commands)
}

/// Scan host-side traffic until `pred` matches, bounded by a scan limit so
/// periodic broadcasts cannot loop a failing test forever.
#[allow(dead_code)]
pub async fn expect_frame<F>(host: &mut MockCanBus, mut pred: F) -> CanFrame
where
    F: FnMut(&CanFrame) -> bool,
{
    for _ in 0..400 {
        let frame = tokio::time::timeout(Duration::from_secs(30), host.recv())
            .await
            .expect("bus went silent while waiting for a frame")
            .expect("bus closed");
        if pred(&frame) {
            return frame;
        }
    }
    panic!("expected frame not seen within the scan limit");
}

/// Assert that no frame matching `pred` shows up within `window_ms` of
/// virtual time.
#[allow(dead_code)]
pub async fn expect_absence<F>(host: &mut MockCanBus, window_ms: u64, mut pred: F)
where
    F: FnMut(&CanFrame) -> bool,
{
    let deadline = Instant::now() + Duration::from_millis(window_ms);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        match tokio::time::timeout(remaining, host.recv()).await {
            Ok(Ok(frame)) => {
                assert!(!pred(&frame), "unexpected frame: {frame:?}");
            }
            Ok(Err(_)) => return,
            Err(_) => return,
        }
    }
}
