//! Session state management
//! This module defines the observable session aggregate and the single task
//! that owns it. Every mutation is a message; every reader gets a snapshot.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};

use crate::core::bluetooth::DiscoveredDevice;
use crate::core::vitals::{VitalReading, VitalSample};

/// Where the session is in its connection lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
    Disconnecting,
}

/// Snapshot of the session as seen by collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub connection_state: ConnectionState,
    /// Devices found by the current scan session, in first-seen order
    pub discovered: Vec<DiscoveredDevice>,
    /// The device of the current connection, if any
    pub connected_device: Option<DiscoveredDevice>,
    pub latest: VitalSample,
    pub scanning_active: bool,
}

/// A mutation request. Scan and link ids tie an update to the cycle that produced it.
#[derive(Debug)]
pub(crate) enum StateUpdate {
    ScanStarted { scan: u64 },
    DeviceDiscovered { scan: u64, device: DiscoveredDevice },
    ScanStopped { scan: u64 },
    Connecting { device: DiscoveredDevice },
    Connected { link: u64, device: DiscoveredDevice },
    Disconnecting,
    Idle,
    Vital { link: u64, reading: VitalReading },
    Flush(oneshot::Sender<()>),
}

/// The state together with the ids of the cycles currently allowed to touch it
#[derive(Debug, Default)]
pub(crate) struct SessionLedger {
    state: SessionState,
    scan: Option<u64>,
    link: Option<u64>,
}

impl SessionLedger {
    pub(crate) fn state(&self) -> &SessionState {
        &self.state
    }

    /// Applies one update and reports whether the snapshot changed
    pub(crate) fn apply(&mut self, update: StateUpdate) -> bool {
        let before = self.state.clone();
        match update {
            StateUpdate::ScanStarted { scan } => {
                self.scan = Some(scan);
                self.state.discovered.clear();
                self.state.scanning_active = true;
                if self.state.connection_state == ConnectionState::Idle {
                    self.state.connection_state = ConnectionState::Scanning;
                }
            }
            StateUpdate::DeviceDiscovered { scan, device } => {
                if self.scan != Some(scan) || !self.state.scanning_active {
                    debug!("Dropping discovery of {} from finished scan {}", device.id, scan);
                } else if !self.state.discovered.iter().any(|d| d.id == device.id) {
                    self.state.discovered.push(device);
                }
            }
            StateUpdate::ScanStopped { scan } => {
                if self.scan == Some(scan) {
                    self.state.scanning_active = false;
                    if self.state.connection_state == ConnectionState::Scanning {
                        self.state.connection_state = ConnectionState::Idle;
                    }
                }
            }
            StateUpdate::Connecting { device } => {
                self.link = None;
                self.state.connection_state = ConnectionState::Connecting;
                self.state.connected_device = Some(device);
            }
            StateUpdate::Connected { link, device } => {
                self.link = Some(link);
                self.state.connection_state = ConnectionState::Connected;
                self.state.connected_device = Some(device);
                self.state.latest.reset();
            }
            StateUpdate::Disconnecting => {
                self.state.connection_state = ConnectionState::Disconnecting;
            }
            StateUpdate::Idle => {
                self.link = None;
                self.state.connected_device = None;
                self.state.latest.reset();
                self.state.connection_state = if self.state.scanning_active {
                    ConnectionState::Scanning
                } else {
                    ConnectionState::Idle
                };
            }
            StateUpdate::Vital { link, reading } => {
                if self.link == Some(link) {
                    self.state.latest.apply(reading);
                } else {
                    debug!("Dropping {} reading from stale link {}", reading.kind(), link);
                }
            }
            StateUpdate::Flush(done) => {
                let _ = done.send(());
            }
        }
        self.state != before
    }
}

/// Handle to the task owning [`SessionState`]
#[derive(Clone)]
pub struct SessionStore {
    tx: mpsc::UnboundedSender<StateUpdate>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionStore {
    /// Spawns the owning task on the current tokio runtime
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StateUpdate>();
        let (state_tx, state_rx) = watch::channel(SessionState::default());

        tokio::spawn(async move {
            let mut ledger = SessionLedger::default();
            while let Some(update) = rx.recv().await {
                if ledger.apply(update) {
                    state_tx.send_replace(ledger.state().clone());
                }
            }
            debug!("Session state task finished");
        });

        Self { tx, state_rx }
    }

    pub(crate) fn apply(&self, update: StateUpdate) {
        if let Err(e) = self.tx.send(update) {
            warn!("Session state task is gone, dropping update: {:?}", e.0);
        }
    }

    /// Resolves once every update queued before this call has been applied
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.apply(StateUpdate::Flush(done_tx));
        let _ = done_rx.await;
    }

    pub fn snapshot(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }
}
