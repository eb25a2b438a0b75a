//! Defines shared data structures for the Bluetooth module.

use serde::{Deserialize, Serialize};

/// A SynkLinx band found during the current scan session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Platform-specific identifier, stable for the scan session
    pub id: String,
    /// The advertised name as received
    pub name: String,
}

impl DiscoveredDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One advertisement report from the platform scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Platform-specific identifier of the advertiser
    pub id: String,
    /// The advertised local name, if any
    pub name: Option<String>,
    /// The signal strength (RSSI), if reported
    pub rssi: Option<i16>,
}

impl Advertisement {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
            rssi: None,
        }
    }

    /// Returns the advertiser as a candidate device when its trimmed, case-folded
    /// name contains `name_filter`
    pub fn candidate(&self, name_filter: &str) -> Option<DiscoveredDevice> {
        let name = self.name.as_deref()?;
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() || !normalized.contains(&name_filter.to_lowercase()) {
            return None;
        }
        Some(DiscoveredDevice::new(self.id.clone(), name))
    }
}
