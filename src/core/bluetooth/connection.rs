//! Bluetooth connection handling for the SynkLinx band
//! This module supervises the single link: connecting, streaming, explicit
//! teardown, and recovery from links the band drops on its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::{CONNECT_SETTLE_DELAY_MS, DISCONNECT_COOLDOWN_MS};
use crate::core::bluetooth::error::ConnectError;
use crate::core::bluetooth::events::{EventEmitter, SessionEvent};
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::scanner::{BluetoothScanner, ScanOptions};
use crate::core::bluetooth::transport::{BleTransport, DisconnectStream, PeripheralLink};
use crate::core::bluetooth::types::DiscoveredDevice;
use crate::state::{ConnectionState, SessionStore, StateUpdate};

/// The one live link of the session
struct ActiveLink {
    id: u64,
    device: DiscoveredDevice,
    link: Arc<dyn PeripheralLink>,
    /// Stops the disconnect listener of this link
    watch_token: CancellationToken,
}

struct ConnectionInner {
    transport: Arc<dyn BleTransport>,
    store: SessionStore,
    events: EventEmitter,
    scanner: BluetoothScanner,
    notification_handler: NotificationHandler,
    connect_timeout: Option<Duration>,
    /// Options of the scan restarted after a lost link
    recovery_scan: ScanOptions,
    link: Mutex<Option<ActiveLink>>,
    connecting: Mutex<()>,
    /// Pending recovery cool-down; occupied means link losses are debounced
    recovery: Mutex<Option<CancellationToken>>,
    next_link_id: AtomicU64,
}

/// Rolls the session back to idle when a connection attempt is dropped before it completes
struct PendingConnect {
    store: SessionStore,
    link: Option<Arc<dyn PeripheralLink>>,
    done: bool,
}

impl PendingConnect {
    fn new(store: SessionStore) -> Self {
        Self {
            store,
            link: None,
            done: false,
        }
    }

    /// Closes `link` too if the attempt is abandoned
    fn hold(&mut self, link: Arc<dyn PeripheralLink>) {
        self.link = Some(link);
    }

    fn complete(&mut self) {
        self.done = true;
        self.link = None;
    }
}

impl Drop for PendingConnect {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        warn!("Connection attempt abandoned, returning to idle");
        self.store.apply(StateUpdate::Idle);
        if let (Some(link), Ok(handle)) = (self.link.take(), tokio::runtime::Handle::try_current()) {
            handle.spawn(async move {
                if let Err(e) = link.disconnect().await {
                    debug!("Closing abandoned link failed: {}", e);
                }
            });
        }
    }
}

/// Connection supervisor for the band. Cloning shares the same supervisor.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnectionInner>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn BleTransport>,
        store: SessionStore,
        events: EventEmitter,
        scanner: BluetoothScanner,
        connect_timeout: Option<Duration>,
        recovery_scan: ScanOptions,
    ) -> Self {
        let notification_handler = NotificationHandler::new(store.clone(), events.clone());
        Self {
            inner: Arc::new(ConnectionInner {
                transport,
                store,
                events,
                scanner,
                notification_handler,
                connect_timeout,
                recovery_scan,
                link: Mutex::new(None),
                connecting: Mutex::new(()),
                recovery: Mutex::new(None),
                next_link_id: AtomicU64::new(1),
            }),
        }
    }

    /// Connects to a device found by the current scan session.
    /// A device the scanner no longer knows is ignored and the session stays idle.
    pub async fn connect(&self, device: &DiscoveredDevice) -> Result<(), ConnectError> {
        let Ok(_connecting) = self.inner.connecting.try_lock() else {
            warn!("Connection to {} rejected, another attempt is in progress", device.id);
            return Err(ConnectError::InProgress);
        };

        self.cancel_recovery().await;
        self.inner.scanner.stop_scan().await;

        let Some(device) = self.inner.scanner.resolve(&device.id).await else {
            warn!("Device {} is not part of the current scan results, ignoring", device.id);
            return Ok(());
        };

        self.release_link().await;

        info!("Device details - ID: {}, Name: {:?}", device.id, device.name);
        self.inner.store.apply(StateUpdate::Connecting { device: device.clone() });
        let mut attempt = PendingConnect::new(self.inner.store.clone());

        let link = match self.establish(&device).await {
            Ok(link) => link,
            Err(e) => {
                error!("Connection to {} failed: {}", device.id, e);
                attempt.complete();
                self.inner.store.apply(StateUpdate::Idle);
                self.inner.events.emit(SessionEvent::ConnectFailed {
                    device,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };
        attempt.hold(link.clone());

        sleep(Duration::from_millis(CONNECT_SETTLE_DELAY_MS)).await;

        let link_id = self.inner.next_link_id.fetch_add(1, Ordering::Relaxed);
        let watch_token = CancellationToken::new();
        {
            let mut slot = self.inner.link.lock().await;
            self.inner.store.apply(StateUpdate::Connected {
                link: link_id,
                device: device.clone(),
            });
            *slot = Some(ActiveLink {
                id: link_id,
                device: device.clone(),
                link: link.clone(),
                watch_token: watch_token.clone(),
            });
        }
        // the link slot owns the connection from here on
        attempt.complete();

        let failures = self
            .inner
            .notification_handler
            .start_streaming(link.clone(), link_id)
            .await;
        if !failures.is_empty() {
            warn!("{} of the vital streams could not be started", failures.len());
        }

        match link.disconnect_events().await {
            Ok(disconnects) => {
                tokio::spawn(self.clone().watch_link(link_id, disconnects, watch_token));
            }
            Err(e) => warn!("Could not register disconnect listener for {}: {}", device.id, e),
        }

        if !self.is_current(link_id).await {
            debug!("Link {} was released during setup", link_id);
            self.inner.notification_handler.stop_streaming().await;
            return Ok(());
        }

        info!("Connection and setup process completed successfully");
        self.inner.events.emit(SessionEvent::Connected { device });
        Ok(())
    }

    /// Tears the current link down. Does nothing when no device is connected.
    pub async fn disconnect(&self) {
        let Some(active) = self.inner.link.lock().await.take() else {
            self.inner.notification_handler.stop_streaming().await;
            // An abandoned attempt may have left the session in Connecting
            if self.inner.connecting.try_lock().is_ok()
                && self.inner.store.snapshot().connection_state == ConnectionState::Connecting
            {
                self.inner.store.apply(StateUpdate::Idle);
            }
            debug!("No device connected");
            return;
        };

        info!("Disconnecting from device {}", active.device.id);
        self.inner.store.apply(StateUpdate::Disconnecting);
        active.watch_token.cancel();
        self.inner.notification_handler.stop_streaming().await;

        if let Err(e) = active.link.disconnect().await {
            warn!("Failed to disconnect from {} cleanly: {}", active.device.id, e);
        }

        self.inner.store.apply(StateUpdate::Idle);
        info!("Successfully disconnected");
        self.inner.events.emit(SessionEvent::Disconnected { device: active.device });
    }

    pub async fn connected_device(&self) -> Option<DiscoveredDevice> {
        let slot = self.inner.link.lock().await;
        slot.as_ref().map(|active| active.device.clone())
    }

    /// Whether a connection attempt is running or a link is held
    pub async fn is_active(&self) -> bool {
        self.inner.connecting.try_lock().is_err() || self.inner.link.lock().await.is_some()
    }

    pub fn notification_handler(&self) -> &NotificationHandler {
        &self.inner.notification_handler
    }

    /// Opens the link and discovers its services, bounded by the connect timeout
    async fn establish(&self, device: &DiscoveredDevice) -> Result<Arc<dyn PeripheralLink>, ConnectError> {
        let attempt = async {
            info!("Initiating connection to {}...", device.id);
            let link = self
                .inner
                .transport
                .connect(&device.id)
                .await
                .map_err(ConnectError::Link)?;

            info!("Connection successful, discovering services...");
            if let Err(e) = link.discover_services().await {
                if let Err(close_err) = link.disconnect().await {
                    debug!("Closing half-open link failed: {}", close_err);
                }
                return Err(ConnectError::Discovery(e));
            }
            Ok::<_, ConnectError>(link)
        };

        match self.inner.connect_timeout {
            Some(limit) => timeout(limit, attempt)
                .await
                .map_err(|_| ConnectError::Timeout(limit))?,
            None => attempt.await,
        }
    }

    async fn is_current(&self, link_id: u64) -> bool {
        let slot = self.inner.link.lock().await;
        slot.as_ref().is_some_and(|active| active.id == link_id)
    }

    /// Drops a leftover link before a new one is opened
    async fn release_link(&self) {
        let Some(active) = self.inner.link.lock().await.take() else {
            return;
        };
        info!("Releasing previous link to {}", active.device.id);
        active.watch_token.cancel();
        self.inner.notification_handler.stop_streaming().await;
        if let Err(e) = active.link.disconnect().await {
            warn!("Failed to close previous link to {}: {}", active.device.id, e);
        }
        self.inner.store.apply(StateUpdate::Idle);
    }

    async fn cancel_recovery(&self) {
        if let Some(token) = self.inner.recovery.lock().await.take() {
            debug!("Cancelling pending recovery cool-down");
            token.cancel();
        }
    }

    async fn watch_link(self, link_id: u64, mut disconnects: DisconnectStream, watch_token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = watch_token.cancelled() => break,
                event = disconnects.next() => match event {
                    Some(()) => self.handle_link_lost(link_id).await,
                    None => break,
                }
            }
        }
        debug!("Disconnect listener for link {} stopped", link_id);
    }

    /// Processes the first report of a lost link and schedules the return to scanning
    async fn handle_link_lost(&self, link_id: u64) {
        let mut slot = self.inner.link.lock().await;
        if slot.as_ref().map(|active| active.id) != Some(link_id) {
            debug!("Ignoring disconnect report for superseded link {}", link_id);
            return;
        }

        let mut recovery = self.inner.recovery.lock().await;
        if recovery.as_ref().is_some_and(|token| !token.is_cancelled()) {
            debug!("Recovery already pending, ignoring duplicate disconnect report");
            return;
        }
        let token = CancellationToken::new();
        *recovery = Some(token.clone());
        drop(recovery);

        let Some(active) = slot.take() else {
            return;
        };
        drop(slot);

        warn!("SynkLinx device {} lost connection", active.device.id);
        active.watch_token.cancel();
        self.inner.events.emit(SessionEvent::LinkLost {
            device: active.device.clone(),
        });
        self.inner.store.apply(StateUpdate::Idle);
        self.inner.notification_handler.stop_streaming().await;

        let manager = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Recovery cool-down cancelled"),
                _ = sleep(Duration::from_millis(DISCONNECT_COOLDOWN_MS)) => {
                    manager.finish_recovery(token).await;
                }
            }
        });
    }

    async fn finish_recovery(&self, token: CancellationToken) {
        {
            let mut recovery = self.inner.recovery.lock().await;
            if token.is_cancelled() {
                return;
            }
            *recovery = None;
        }

        // Hold the connect lock so a connection cannot start underneath the scan
        let Ok(_connecting) = self.inner.connecting.try_lock() else {
            debug!("Connection attempt in progress, skipping recovery scan");
            return;
        };
        info!("Restarting scan after lost connection");
        if let Err(e) = self.inner.scanner.start_scan(self.inner.recovery_scan).await {
            error!("Failed to restart scanning after lost connection: {}", e);
        }
    }
}
