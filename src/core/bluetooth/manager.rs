//! Bluetooth manager for the SynkLinx session
//! This module provides the public interface collaborators drive the session through

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{broadcast, watch};

use crate::config::session_config::SessionConfig;
use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::error::{ConnectError, ScanError};
use crate::core::bluetooth::events::{EventEmitter, SessionEvent};
use crate::core::bluetooth::scanner::{BluetoothScanner, ScanOptions};
use crate::core::bluetooth::transport::BleTransport;
use crate::core::bluetooth::types::DiscoveredDevice;
use crate::state::{SessionState, SessionStore};

/// Manages the Bluetooth session with one SynkLinx band
pub struct BluetoothManager {
    /// Owner of the observable session state
    store: SessionStore,
    /// Session event fan-out
    events: EventEmitter,
    /// Bluetooth scanner
    scanner: BluetoothScanner,
    /// Connection supervisor
    connection_manager: ConnectionManager,
    config: SessionConfig,
}

impl BluetoothManager {
    /// Creates a manager on top of `transport`. Must be called inside a tokio runtime.
    pub fn new(transport: Arc<dyn BleTransport>, config: SessionConfig) -> Self {
        let store = SessionStore::spawn();
        let events = EventEmitter::new();
        let scanner = BluetoothScanner::new(
            transport.clone(),
            store.clone(),
            events.clone(),
            config.device_name_filter.clone(),
        );
        let connection_manager = ConnectionManager::new(
            transport,
            store.clone(),
            events.clone(),
            scanner.clone(),
            config.connect_timeout(),
            config.scan_options(),
        );

        Self {
            store,
            events,
            scanner,
            connection_manager,
            config,
        }
    }

    /// Creates a manager on the system's default Bluetooth adapter
    #[cfg(feature = "platform-ble")]
    pub async fn with_default_adapter(config: SessionConfig) -> anyhow::Result<Self> {
        let transport = crate::core::bluetooth::BluestTransport::default_adapter().await?;
        info!("Bluetooth adapter is available.");
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Starts discovering bands. A no-op while a scan is already running, or while a
    /// device is connecting or connected.
    pub async fn start_scan(&self, options: ScanOptions) -> Result<(), ScanError> {
        if self.connection_manager.is_active().await {
            debug!("A device is connecting or connected, ignoring scan request.");
            return Ok(());
        }
        self.scanner.start_scan(options).await
    }

    /// Starts discovering bands with the configured scan options
    pub async fn scan(&self) -> Result<(), ScanError> {
        self.start_scan(self.config.scan_options()).await
    }

    pub async fn stop_scan(&self) {
        self.scanner.stop_scan().await
    }

    /// Connects to a device from the current scan results
    pub async fn connect_to_device(&self, device: &DiscoveredDevice) -> Result<(), ConnectError> {
        self.connection_manager.connect(device).await?;
        info!("Device connect request for {} completed.", device.id);
        Ok(())
    }

    /// Disconnects from the current device, if any
    pub async fn disconnect(&self) {
        self.connection_manager.disconnect().await
    }

    /// Current session snapshot
    pub fn state(&self) -> SessionState {
        self.store.snapshot()
    }

    /// Receiver notified on every session state change
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Waits until every state update issued so far is visible in [`BluetoothManager::state`]
    pub async fn settle(&self) {
        self.store.flush().await
    }

    pub async fn is_scanning(&self) -> bool {
        self.scanner.is_scanning().await
    }

    /// Returns the device of the current link
    pub async fn connected_device(&self) -> Option<DiscoveredDevice> {
        self.connection_manager.connected_device().await
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
