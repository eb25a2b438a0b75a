//! Bluetooth functionality for the SynkLinx session
//! This module handles all bluetooth operations including scanning,
//! connecting, and streaming vitals from the SynkLinx band.

#[cfg(feature = "platform-ble")]
mod bluest_transport;
mod connection;
mod constants;
mod demo_transport;
mod error;
mod events;
mod manager;
mod notification;
#[cfg_attr(not(feature = "platform-ble"), allow(dead_code))]
mod registry;
mod scanner;
mod transport;
mod types;

// Re-export types that should be publicly accessible
#[cfg(feature = "platform-ble")]
pub use bluest_transport::BluestTransport;
pub use connection::ConnectionManager;
pub use constants::*; // Re-export all constants
pub use demo_transport::{DEMO_DEVICE_ID, DEMO_DEVICE_NAME, DemoTransport};
pub use error::{BleError, ConnectError, ScanError, SubscribeError};
pub use events::{EventEmitter, SessionEvent};
pub use manager::BluetoothManager;
pub use notification::NotificationHandler;
pub use scanner::{BluetoothScanner, ScanOptions};
pub use transport::{
    AdvertisementStream, BleTransport, DisconnectStream, NotificationStream, PeripheralLink, channel_stream,
    unbounded_channel_stream,
};
pub use types::{Advertisement, DiscoveredDevice};
