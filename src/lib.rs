//! SynkLinx link library
//! BLE central session manager for the SynkLinx wearable: discovery, a single
//! supervised connection, and the three streamed vital signs.

// Module declarations
pub mod config;
pub mod core;
pub mod logging;
pub mod state;

pub use crate::config::AppConfig;
pub use crate::core::bluetooth::{
    BleError, BleTransport, BluetoothManager, ConnectError, DiscoveredDevice, PeripheralLink, ScanError,
    ScanOptions, SessionEvent,
};
pub use crate::core::vitals::{VitalKind, VitalSample};
pub use crate::state::{ConnectionState, SessionState};
