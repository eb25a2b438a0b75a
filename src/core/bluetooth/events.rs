//! Session events pushed to collaborators (UI, alerting)

use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::bluetooth::types::DiscoveredDevice;
use crate::core::vitals::VitalKind;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something a collaborator may want to react to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    ScanStarted,
    DeviceFound { device: DiscoveredDevice },
    ScanStopped,
    ScanFailed { reason: String },
    Connected { device: DiscoveredDevice },
    ConnectFailed { device: DiscoveredDevice, reason: String },
    StreamingFailed { kind: VitalKind, reason: String },
    Disconnected { device: DiscoveredDevice },
    /// Unsolicited link loss; collaborators raise the haptic + notification alert
    LinkLost { device: DiscoveredDevice },
}

/// Broadcasts [`SessionEvent`]s to every subscriber
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("No listener for session event: {:?}", e.0);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
