use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::{
    BLUETOOTH_OPERATION_TIMEOUT_SECS, DEFAULT_SCAN_TIMEOUT_MS, DEVICE_NAME_FILTER, ScanOptions,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Substring a device name must contain (case-insensitive) to be offered.
    pub device_name_filter: String,

    /// Length of one scan round in milliseconds.
    pub scan_timeout_ms: u64,

    /// Keep scanning while nothing has been found.
    pub auto_retry: bool,

    /// Upper bound on scan rounds, `None` retries until stopped.
    pub max_scan_rounds: Option<u32>,

    /// Limit for link establishment plus service discovery, `None` waits forever.
    pub connect_timeout_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            device_name_filter: DEVICE_NAME_FILTER.to_string(),
            scan_timeout_ms: DEFAULT_SCAN_TIMEOUT_MS,
            auto_retry: true,
            max_scan_rounds: None,
            connect_timeout_ms: Some(BLUETOOTH_OPERATION_TIMEOUT_SECS * 1000),
        }
    }
}

impl SessionConfig {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            auto_retry: self.auto_retry,
            timeout: Duration::from_millis(self.scan_timeout_ms),
            max_rounds: self.max_scan_rounds,
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}
