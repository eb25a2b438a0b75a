#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

use synklinx_link::config::session_config::SessionConfig;
use synklinx_link::core::bluetooth::{
    Advertisement, AdvertisementStream, BleError, BleTransport, BluetoothManager, DisconnectStream,
    NotificationStream, PeripheralLink, SessionEvent, unbounded_channel_stream,
};
use synklinx_link::state::SessionState;

type ScanSender = mpsc::UnboundedSender<Result<Advertisement, BleError>>;

/// In-memory BLE stack driven by the test
#[derive(Default)]
pub struct MockTransport {
    scan_calls: AtomicUsize,
    scan_senders: Mutex<Vec<ScanSender>>,
    fail_next_scan: Mutex<Option<BleError>>,
    connect_failure: Mutex<Option<BleError>>,
    stall_connect: AtomicBool,
    discovery_failure: Mutex<Option<BleError>>,
    subscribe_failures: Mutex<HashSet<Uuid>>,
    links: Mutex<HashMap<String, Arc<MockLink>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    /// Delivers an advertisement to the most recent scan
    pub fn advertise(&self, id: &str, name: Option<&str>) {
        let senders = self.scan_senders.lock().unwrap();
        if let Some(tx) = senders.last() {
            let _ = tx.send(Ok(Advertisement::new(id, name)));
        }
    }

    /// Makes the running scan report a platform error
    pub fn break_scan(&self, reason: &str) {
        let senders = self.scan_senders.lock().unwrap();
        if let Some(tx) = senders.last() {
            let _ = tx.send(Err(BleError::Platform(reason.to_string())));
        }
    }

    pub fn fail_next_scan(&self, error: BleError) {
        *self.fail_next_scan.lock().unwrap() = Some(error);
    }

    pub fn fail_connect(&self, error: BleError) {
        *self.connect_failure.lock().unwrap() = Some(error);
    }

    /// Makes every following connect hang until it is timed out
    pub fn stall_connect(&self) {
        self.stall_connect.store(true, Ordering::SeqCst);
    }

    pub fn fail_discovery(&self, error: BleError) {
        *self.discovery_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_subscribe(&self, characteristic: Uuid) {
        self.subscribe_failures.lock().unwrap().insert(characteristic);
    }

    pub fn has_link(&self, device_id: &str) -> bool {
        self.links.lock().unwrap().contains_key(device_id)
    }

    pub fn link(&self, device_id: &str) -> Arc<MockLink> {
        self.links
            .lock()
            .unwrap()
            .get(device_id)
            .cloned()
            .expect("device was never connected")
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn scan(&self) -> Result<AdvertisementStream, BleError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_next_scan.lock().unwrap().take() {
            return Err(error);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.scan_senders.lock().unwrap().push(tx);
        Ok(unbounded_channel_stream(rx))
    }

    async fn connect(&self, device_id: &str) -> Result<Arc<dyn PeripheralLink>, BleError> {
        if let Some(error) = self.connect_failure.lock().unwrap().take() {
            return Err(error);
        }
        if self.stall_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let link = Arc::new(MockLink {
            id: device_id.to_string(),
            discovery_failure: self.discovery_failure.lock().unwrap().take(),
            subscribe_failures: self.subscribe_failures.lock().unwrap().clone(),
            notifiers: Mutex::new(HashMap::new()),
            disconnect_tx: Mutex::new(None),
            disconnect_calls: AtomicUsize::new(0),
        });
        self.links.lock().unwrap().insert(device_id.to_string(), link.clone());
        Ok(link)
    }
}

pub struct MockLink {
    id: String,
    discovery_failure: Option<BleError>,
    subscribe_failures: HashSet<Uuid>,
    notifiers: Mutex<HashMap<Uuid, mpsc::UnboundedSender<Result<Vec<u8>, BleError>>>>,
    disconnect_tx: Mutex<Option<mpsc::UnboundedSender<()>>>,
    disconnect_calls: AtomicUsize,
}

impl MockLink {
    /// Pushes a characteristic value notification
    pub fn notify(&self, characteristic: Uuid, value: &[u8]) {
        let notifiers = self.notifiers.lock().unwrap();
        let tx = notifiers.get(&characteristic).expect("characteristic not subscribed");
        let _ = tx.send(Ok(value.to_vec()));
    }

    pub fn notify_error(&self, characteristic: Uuid, reason: &str) {
        let notifiers = self.notifiers.lock().unwrap();
        let tx = notifiers.get(&characteristic).expect("characteristic not subscribed");
        let _ = tx.send(Err(BleError::Platform(reason.to_string())));
    }

    pub fn is_subscribed(&self, characteristic: Uuid) -> bool {
        self.notifiers
            .lock()
            .unwrap()
            .get(&characteristic)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Reports an unsolicited link loss
    pub fn drop_link(&self) {
        if let Some(tx) = self.disconnect_tx.lock().unwrap().as_ref() {
            let _ = tx.send(());
        }
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeripheralLink for MockLink {
    fn device_id(&self) -> &str {
        &self.id
    }

    async fn discover_services(&self) -> Result<(), BleError> {
        match &self.discovery_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn subscribe(&self, _service: Uuid, characteristic: Uuid) -> Result<NotificationStream, BleError> {
        if self.subscribe_failures.contains(&characteristic) {
            return Err(BleError::CharacteristicNotFound(characteristic));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.notifiers.lock().unwrap().insert(characteristic, tx);
        Ok(unbounded_channel_stream(rx))
    }

    async fn disconnect_events(&self) -> Result<DisconnectStream, BleError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.disconnect_tx.lock().unwrap() = Some(tx);
        Ok(unbounded_channel_stream(rx))
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn manager_with(config: SessionConfig) -> (BluetoothManager, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let manager = BluetoothManager::new(transport.clone(), config);
    (manager, transport)
}

pub fn manager() -> (BluetoothManager, Arc<MockTransport>) {
    manager_with(SessionConfig::default())
}

/// Waits (in virtual time) until the session state satisfies `predicate`
pub async fn wait_for_state(
    rx: &mut watch::Receiver<SessionState>,
    predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    within(rx.wait_for(predicate))
        .await
        .expect("session state task stopped")
        .clone()
}

/// Receives events until one matches `predicate`
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<SessionEvent>,
    mut predicate: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    within(async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
}

/// Lets every spawned task run until it blocks
pub async fn run_pending_tasks() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Drains every event already queued
pub fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(120), future)
        .await
        .expect("timed out waiting for the session")
}
