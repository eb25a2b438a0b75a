//! Notification handling for the SynkLinx band
//! This module keeps the three vital-sign subscriptions of a link alive and
//! feeds every validated reading into the session state.

use std::sync::Arc;

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::core::bluetooth::constants::UUID_VITALS_SERVICE;
use crate::core::bluetooth::error::SubscribeError;
use crate::core::bluetooth::events::{EventEmitter, SessionEvent};
use crate::core::bluetooth::transport::{NotificationStream, PeripheralLink};
use crate::core::vitals::VitalKind;
use crate::state::{SessionStore, StateUpdate};

/// One live characteristic subscription. Dropping it ends the stream task.
struct SubscriptionHandle {
    kind: VitalKind,
    task: JoinHandle<()>,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Owns the vital-sign subscriptions of the current link
#[derive(Clone)]
pub struct NotificationHandler {
    store: SessionStore,
    events: EventEmitter,
    subscriptions: Arc<Mutex<Vec<SubscriptionHandle>>>,
}

impl NotificationHandler {
    pub fn new(store: SessionStore, events: EventEmitter) -> Self {
        Self {
            store,
            events,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribes to all three vitals on `link`, replacing any previous subscriptions.
    /// Returns the characteristics that could not be subscribed.
    pub async fn start_streaming(&self, link: Arc<dyn PeripheralLink>, link_id: u64) -> Vec<SubscribeError> {
        let mut subscriptions = self.subscriptions.lock().await;
        subscriptions.clear();

        let mut failures = Vec::new();
        for kind in VitalKind::ALL {
            info!("Subscribing to {} notifications...", kind);
            match link.subscribe(UUID_VITALS_SERVICE, kind.characteristic_uuid()).await {
                Ok(stream) => {
                    let store = self.store.clone();
                    let task = tokio::spawn(Self::process_notifications(kind, stream, store, link_id));
                    subscriptions.push(SubscriptionHandle { kind, task });
                }
                Err(source) => {
                    error!("Failed to subscribe to {} notifications: {}", kind, source);
                    let failure = SubscribeError { kind, source };
                    self.events.emit(SessionEvent::StreamingFailed {
                        kind,
                        reason: failure.to_string(),
                    });
                    failures.push(failure);
                }
            }
        }

        failures
    }

    /// Releases every subscription. Idempotent.
    pub async fn stop_streaming(&self) {
        let mut subscriptions = self.subscriptions.lock().await;
        for subscription in subscriptions.drain(..) {
            debug!("Releasing {} subscription", subscription.kind);
        }
    }

    pub async fn active_subscriptions(&self) -> Vec<VitalKind> {
        let subscriptions = self.subscriptions.lock().await;
        subscriptions.iter().map(|s| s.kind).collect()
    }

    /// Decodes the values of one characteristic until its stream ends
    async fn process_notifications(
        kind: VitalKind,
        mut notifications: NotificationStream,
        store: SessionStore,
        link_id: u64,
    ) {
        info!("Listening for {} notifications...", kind);

        while let Some(result) = notifications.next().await {
            match result {
                Ok(value) => match kind.decode(&value) {
                    Some(reading) => {
                        debug!("Received {:?}", reading);
                        store.apply(StateUpdate::Vital { link: link_id, reading });
                    }
                    None => debug!("Dropped {} payload outside the valid range: {:?}", kind, value),
                },
                Err(e) => warn!("Error in {} notification stream: {}", kind, e),
            }
        }

        info!("{} notification stream ended", kind);
    }
}
