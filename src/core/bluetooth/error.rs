//! Error types for the session manager

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::core::vitals::VitalKind;

/// Failures reported by the platform BLE stack
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BleError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    #[error("Bluetooth error: {0}")]
    Platform(String),
}

#[cfg(feature = "platform-ble")]
impl From<bluest::Error> for BleError {
    fn from(err: bluest::Error) -> Self {
        BleError::Platform(err.to_string())
    }
}

/// A scan could not be started or aborted mid-way
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Scan failed: {0}")]
pub struct ScanError(#[from] pub BleError);

/// A connection attempt failed; the session is back to idle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Failed to connect to device: {0}")]
    Link(BleError),

    #[error("Failed to discover services: {0}")]
    Discovery(BleError),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection already in progress")]
    InProgress,
}

/// One characteristic could not be subscribed; the other streams keep running
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to subscribe to {kind} notifications: {source}")]
pub struct SubscribeError {
    pub kind: VitalKind,
    pub source: BleError,
}
