use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::DEFAULT_SCAN_TIMEOUT_MS;
use crate::core::bluetooth::error::{BleError, ScanError};
use crate::core::bluetooth::events::{EventEmitter, SessionEvent};
use crate::core::bluetooth::transport::{AdvertisementStream, BleTransport};
use crate::core::bluetooth::types::{Advertisement, DiscoveredDevice};
use crate::state::{SessionStore, StateUpdate};

/// How a scan session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Start another round when a round times out with nothing found
    pub auto_retry: bool,
    /// Length of one scan round
    pub timeout: Duration,
    /// Upper bound on rounds per session, `None` keeps hunting until stopped
    pub max_rounds: Option<u32>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            auto_retry: true,
            timeout: Duration::from_millis(DEFAULT_SCAN_TIMEOUT_MS),
            max_rounds: None,
        }
    }
}

enum RoundOutcome {
    TimedOut,
    Cancelled,
    Failed(BleError),
}

struct ActiveScan {
    id: u64,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveScan {
    fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled() && !self.handle.is_finished()
    }
}

struct ScannerInner {
    transport: Arc<dyn BleTransport>,
    store: SessionStore,
    events: EventEmitter,
    name_filter: String,
    /// Candidates of the current scan session, first-seen order
    devices: Mutex<Vec<DiscoveredDevice>>,
    active: Mutex<Option<ActiveScan>>,
    next_scan_id: AtomicU64,
}

/// Discovers SynkLinx bands. Cloning shares the same scanner.
#[derive(Clone)]
pub struct BluetoothScanner {
    inner: Arc<ScannerInner>,
}

impl BluetoothScanner {
    pub fn new(
        transport: Arc<dyn BleTransport>,
        store: SessionStore,
        events: EventEmitter,
        name_filter: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(ScannerInner {
                transport,
                store,
                events,
                name_filter: name_filter.into(),
                devices: Mutex::new(Vec::new()),
                active: Mutex::new(None),
                next_scan_id: AtomicU64::new(1),
            }),
        }
    }

    /// Starts a scan session unless one is already running
    pub async fn start_scan(&self, options: ScanOptions) -> Result<(), ScanError> {
        let mut active = self.inner.active.lock().await;
        if active.as_ref().is_some_and(ActiveScan::is_running) {
            debug!("Scan already in progress, ignoring start request.");
            return Ok(());
        }

        let scan_id = self.inner.next_scan_id.fetch_add(1, Ordering::Relaxed);
        self.inner.begin_round(scan_id).await;

        let stream = match self.inner.transport.scan().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to start Bluetooth scan: {}", e);
                self.inner.end_round(scan_id);
                self.inner.events.emit(SessionEvent::ScanFailed { reason: e.to_string() });
                *active = None;
                return Err(ScanError(e));
            }
        };

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(Self::scan_task(
            self.inner.clone(),
            scan_id,
            options,
            stream,
            cancel_token.clone(),
        ));
        *active = Some(ActiveScan {
            id: scan_id,
            cancel_token,
            handle,
        });

        info!("Device scan {} started.", scan_id);
        Ok(())
    }

    /// Stops the running scan session and any pending retry. Safe to call at any time.
    pub async fn stop_scan(&self) {
        let Some(scan) = self.inner.active.lock().await.take() else {
            debug!("No active scan to stop.");
            return;
        };

        let was_running = scan.is_running();
        scan.cancel_token.cancel();
        self.inner.end_round(scan.id);
        if was_running {
            info!("Stopped Bluetooth scan {}.", scan.id);
            self.inner.events.emit(SessionEvent::ScanStopped);
        }
    }

    pub async fn is_scanning(&self) -> bool {
        self.inner.active.lock().await.as_ref().is_some_and(ActiveScan::is_running)
    }

    /// Looks a device up among the candidates of the current scan session
    pub async fn resolve(&self, device_id: &str) -> Option<DiscoveredDevice> {
        let devices = self.inner.devices.lock().await;
        devices.iter().find(|d| d.id == device_id).cloned()
    }

    pub async fn discovered(&self) -> Vec<DiscoveredDevice> {
        self.inner.devices.lock().await.clone()
    }

    /// Runs scan rounds until a round finds something, fails, or the session is cancelled
    async fn scan_task(
        inner: Arc<ScannerInner>,
        scan_id: u64,
        options: ScanOptions,
        first_stream: AdvertisementStream,
        cancel_token: CancellationToken,
    ) {
        let mut next_stream = Some(first_stream);
        let mut round: u32 = 1;

        loop {
            let stream = match next_stream.take() {
                Some(stream) => stream,
                None => match inner.transport.scan().await {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Failed to restart Bluetooth scan: {}", e);
                        inner.end_round(scan_id);
                        inner.events.emit(SessionEvent::ScanFailed { reason: e.to_string() });
                        return;
                    }
                },
            };

            let outcome = inner.run_round(scan_id, stream, options.timeout, &cancel_token).await;
            inner.end_round(scan_id);

            match outcome {
                RoundOutcome::Cancelled => {
                    debug!("Scan {} cancelled.", scan_id);
                    return;
                }
                RoundOutcome::Failed(e) => {
                    error!("Bluetooth scan {} failed: {}", scan_id, e);
                    inner.events.emit(SessionEvent::ScanFailed { reason: e.to_string() });
                    return;
                }
                RoundOutcome::TimedOut => {
                    info!("Scan {} round {} timed out.", scan_id, round);
                    inner.events.emit(SessionEvent::ScanStopped);
                }
            }

            if !options.auto_retry || !inner.devices.lock().await.is_empty() {
                return;
            }
            if options.max_rounds.is_some_and(|max| round >= max) {
                warn!("No devices found after {} scan rounds, giving up.", round);
                return;
            }

            round += 1;
            {
                let mut devices = inner.devices.lock().await;
                if cancel_token.is_cancelled() {
                    return;
                }
                info!("No devices found, retrying scan (round {}).", round);
                devices.clear();
                inner.store.apply(StateUpdate::ScanStarted { scan: scan_id });
            }
            inner.events.emit(SessionEvent::ScanStarted);
        }
    }
}

impl ScannerInner {
    async fn begin_round(&self, scan_id: u64) {
        self.devices.lock().await.clear();
        self.store.apply(StateUpdate::ScanStarted { scan: scan_id });
        self.events.emit(SessionEvent::ScanStarted);
    }

    fn end_round(&self, scan_id: u64) {
        self.store.apply(StateUpdate::ScanStopped { scan: scan_id });
    }

    async fn run_round(
        &self,
        scan_id: u64,
        mut stream: AdvertisementStream,
        timeout: Duration,
        cancel_token: &CancellationToken,
    ) -> RoundOutcome {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => return RoundOutcome::Cancelled,
                _ = &mut deadline => return RoundOutcome::TimedOut,
                result = stream.next() => match result {
                    Some(Ok(advertisement)) => self.handle_advertisement(scan_id, advertisement).await,
                    Some(Err(e)) => return RoundOutcome::Failed(e),
                    None => {
                        debug!("Advertisement stream ended before the scan timeout.");
                        break;
                    }
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => RoundOutcome::Cancelled,
            _ = &mut deadline => RoundOutcome::TimedOut,
        }
    }

    async fn handle_advertisement(&self, scan_id: u64, advertisement: Advertisement) {
        debug!(
            "Found device - ID: {}, Name: {:?}, RSSI: {:?}",
            advertisement.id, advertisement.name, advertisement.rssi
        );
        let Some(device) = advertisement.candidate(&self.name_filter) else {
            return;
        };

        {
            let mut devices = self.devices.lock().await;
            if devices.iter().any(|d| d.id == device.id) {
                return;
            }
            devices.push(device.clone());
        }

        info!("Found SynkLinx device: ID: {}, Name: {:?}", device.id, device.name);
        self.store.apply(StateUpdate::DeviceDiscovered {
            scan: scan_id,
            device: device.clone(),
        });
        self.events.emit(SessionEvent::DeviceFound { device });
    }
}
