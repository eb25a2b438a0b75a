//! Core functionality for the SynkLinx session manager
//! This module contains the BLE session, the vital-sign decoder and the alert monitor

pub mod alerts;
pub mod bluetooth;
pub mod vitals;

// Re-export commonly used types
pub use alerts::{AlertSeverity, VitalAlert, VitalAlertMonitor};
pub use bluetooth::BluetoothManager;
pub use vitals::{TemperatureUnit, VitalKind, VitalReading, VitalSample};
