//! bluest backend of the transport seam
//! Platform streams borrow the adapter or characteristic they come from, so each
//! one is driven by its own task and forwarded over a channel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, ConnectionEvent, Device};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc, oneshot};
use uuid::Uuid;

use crate::core::bluetooth::error::BleError;
use crate::core::bluetooth::registry::ScanRegistry;
use crate::core::bluetooth::transport::{
    AdvertisementStream, BleTransport, DisconnectStream, NotificationStream, PeripheralLink, channel_stream,
};
use crate::core::bluetooth::types::Advertisement;

const FORWARD_CHANNEL_CAPACITY: usize = 64;

/// Central-role access to a local adapter through bluest
pub struct BluestTransport {
    adapter: Adapter,
    /// Devices reported by the latest scan, keyed by id
    devices: Arc<Mutex<ScanRegistry<Device>>>,
}

impl BluestTransport {
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            devices: Arc::new(Mutex::new(ScanRegistry::new())),
        }
    }

    /// Opens the system's default adapter and waits until it is powered
    pub async fn default_adapter() -> Result<Self, BleError> {
        let adapter = Adapter::default().await.ok_or(BleError::AdapterNotAvailable)?;
        adapter.wait_available().await?;
        Ok(Self::new(adapter))
    }
}

#[async_trait]
impl BleTransport for BluestTransport {
    async fn scan(&self) -> Result<AdvertisementStream, BleError> {
        let (tx, rx) = mpsc::channel(FORWARD_CHANNEL_CAPACITY);
        let (started_tx, started_rx) = oneshot::channel();
        let adapter = self.adapter.clone();
        let devices = self.devices.clone();
        let generation = self.devices.lock().await.begin_scan();

        tokio::spawn(async move {
            let mut scan_stream = match adapter.scan(&[]).await {
                Ok(stream) => {
                    let _ = started_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = started_tx.send(Err(BleError::from(e)));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    found = scan_stream.next() => {
                        let Some(found) = found else {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        };
                        let id = found.device.id().to_string();
                        let advertisement = Advertisement {
                            id: id.clone(),
                            name: found.adv_data.local_name.clone().or_else(|| found.device.name().ok()),
                            rssi: found.rssi,
                        };
                        devices.lock().await.insert(generation, id, found.device);
                        if tx.send(Ok(advertisement)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Platform scan forwarder stopped");
        });

        match started_rx.await {
            Ok(Ok(())) => Ok(channel_stream(rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BleError::Platform("scan task ended before starting".to_string())),
        }
    }

    async fn connect(&self, device_id: &str) -> Result<Arc<dyn PeripheralLink>, BleError> {
        let device = {
            let devices = self.devices.lock().await;
            devices
                .get(device_id)
                .ok_or_else(|| BleError::DeviceNotFound(device_id.to_string()))?
        };

        if !device.is_connected().await {
            info!("Initiating connection to {}...", device_id);
            self.adapter.connect_device(&device).await?;
        }

        Ok(Arc::new(BluestLink {
            adapter: self.adapter.clone(),
            device,
            id: device_id.to_string(),
            characteristics: Mutex::new(HashMap::new()),
        }))
    }
}

struct BluestLink {
    adapter: Adapter,
    device: Device,
    id: String,
    /// Characteristics found by service discovery, keyed by (service, characteristic)
    characteristics: Mutex<HashMap<(Uuid, Uuid), Characteristic>>,
}

#[async_trait]
impl PeripheralLink for BluestLink {
    fn device_id(&self) -> &str {
        &self.id
    }

    async fn discover_services(&self) -> Result<(), BleError> {
        let services = self.device.discover_services().await?;
        let mut found = HashMap::new();
        for service in &services {
            debug!("Available service: {}", service.uuid());
            for characteristic in service.discover_characteristics().await? {
                found.insert((service.uuid(), characteristic.uuid()), characteristic);
            }
        }
        info!("Discovered {} characteristics on {}", found.len(), self.id);
        *self.characteristics.lock().await = found;
        Ok(())
    }

    async fn subscribe(&self, service: Uuid, characteristic: Uuid) -> Result<NotificationStream, BleError> {
        let characteristic = {
            let characteristics = self.characteristics.lock().await;
            if !characteristics.keys().any(|(s, _)| *s == service) {
                return Err(BleError::ServiceNotFound(service));
            }
            characteristics
                .get(&(service, characteristic))
                .cloned()
                .ok_or(BleError::CharacteristicNotFound(characteristic))?
        };

        let (tx, rx) = mpsc::channel(FORWARD_CHANNEL_CAPACITY);
        let (started_tx, started_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut notifications = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = started_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = started_tx.send(Err(BleError::from(e)));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    value = notifications.next() => {
                        let Some(value) = value else { break };
                        if tx.send(value.map_err(BleError::from)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Notification forwarder for {} stopped", characteristic.uuid());
        });

        match started_rx.await {
            Ok(Ok(())) => Ok(channel_stream(rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BleError::Platform("notification task ended before starting".to_string())),
        }
    }

    async fn disconnect_events(&self) -> Result<DisconnectStream, BleError> {
        let (tx, rx) = mpsc::channel(4);
        let (started_tx, started_rx) = oneshot::channel();
        let adapter = self.adapter.clone();
        let device = self.device.clone();

        tokio::spawn(async move {
            let mut events = match adapter.device_connection_events(&device).await {
                Ok(stream) => {
                    let _ = started_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = started_tx.send(Err(BleError::from(e)));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = events.next() => match event {
                        Some(ConnectionEvent::Disconnected) => {
                            if tx.send(()).await.is_err() {
                                break;
                            }
                        }
                        Some(ConnectionEvent::Connected) => {}
                        None => break,
                    }
                }
            }
        });

        match started_rx.await {
            Ok(Ok(())) => Ok(channel_stream(rx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BleError::Platform("connection event task ended before starting".to_string())),
        }
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        if self.device.is_connected().await {
            info!("Disconnecting from device {}", self.id);
            self.adapter.disconnect_device(&self.device).await?;
        } else {
            warn!("Device {} not connected", self.id);
        }
        Ok(())
    }
}
