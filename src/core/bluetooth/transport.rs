//! Platform BLE seam
//! The session manager only talks to the Bluetooth stack through these traits,
//! so the platform backend and the in-memory test double are interchangeable.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::error::BleError;
use crate::core::bluetooth::types::Advertisement;

/// Advertisement reports of one scan; dropping it stops the scan
pub type AdvertisementStream = BoxStream<'static, Result<Advertisement, BleError>>;

/// Characteristic values delivered by one subscription; dropping it unsubscribes
pub type NotificationStream = BoxStream<'static, Result<Vec<u8>, BleError>>;

/// Yields once per link loss reported by the platform
pub type DisconnectStream = BoxStream<'static, ()>;

/// Central-role primitives of the platform BLE stack
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Starts listening for advertisements
    async fn scan(&self) -> Result<AdvertisementStream, BleError>;

    /// Opens a link to a device previously reported by [`BleTransport::scan`].
    /// The platform must not reconnect on its own.
    async fn connect(&self, device_id: &str) -> Result<Arc<dyn PeripheralLink>, BleError>;
}

/// A live link to one peripheral
#[async_trait]
pub trait PeripheralLink: Send + Sync {
    fn device_id(&self) -> &str;

    /// Discovers all services and characteristics
    async fn discover_services(&self) -> Result<(), BleError>;

    /// Subscribes to value notifications of one characteristic
    async fn subscribe(&self, service: Uuid, characteristic: Uuid) -> Result<NotificationStream, BleError>;

    /// Reports unsolicited disconnects of this link
    async fn disconnect_events(&self) -> Result<DisconnectStream, BleError>;

    async fn disconnect(&self) -> Result<(), BleError>;
}

/// Adapts the receiving half of a tokio channel into a boxed stream
pub fn channel_stream<T: Send + 'static>(rx: mpsc::Receiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

/// Same as [`channel_stream`] for unbounded channels
pub fn unbounded_channel_stream<T: Send + 'static>(rx: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}
