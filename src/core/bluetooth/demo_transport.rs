//! Hardware-free transport for demos
//! Advertises one band and streams fixed, in-range vitals once per interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use log::info;
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    UUID_HEART_RATE_CHAR, UUID_O2_SAT_CHAR, UUID_TEMPERATURE_CHAR, UUID_VITALS_SERVICE,
};
use crate::core::bluetooth::error::BleError;
use crate::core::bluetooth::transport::{
    AdvertisementStream, BleTransport, DisconnectStream, NotificationStream, PeripheralLink,
};
use crate::core::bluetooth::types::Advertisement;

pub const DEMO_DEVICE_ID: &str = "wearable";
pub const DEMO_DEVICE_NAME: &str = "SynkLinx Demo";

const DEMO_HEART_RATE_BPM: u8 = 70;
const DEMO_O2_SAT_PERCENT: u8 = 99;
/// 37.00 °C in hundredths
const DEMO_TEMPERATURE_CENTI_CELSIUS: i16 = 3700;

const DEFAULT_NOTIFY_INTERVAL: Duration = Duration::from_secs(1);

/// Simulated band, always in range
pub struct DemoTransport {
    interval: Duration,
}

impl DemoTransport {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_NOTIFY_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for DemoTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BleTransport for DemoTransport {
    async fn scan(&self) -> Result<AdvertisementStream, BleError> {
        let advertisement = Advertisement::new(DEMO_DEVICE_ID, Some(DEMO_DEVICE_NAME));
        // keep the scan open until it is stopped or times out
        Ok(stream::iter([Ok(advertisement)]).chain(stream::pending()).boxed())
    }

    async fn connect(&self, device_id: &str) -> Result<Arc<dyn PeripheralLink>, BleError> {
        if device_id != DEMO_DEVICE_ID {
            return Err(BleError::DeviceNotFound(device_id.to_string()));
        }
        info!("Connected to demo band");
        Ok(Arc::new(DemoLink {
            interval: self.interval,
        }))
    }
}

struct DemoLink {
    interval: Duration,
}

fn demo_payload(characteristic: Uuid) -> Option<Vec<u8>> {
    match characteristic {
        UUID_HEART_RATE_CHAR => Some(vec![DEMO_HEART_RATE_BPM]),
        UUID_O2_SAT_CHAR => Some(vec![DEMO_O2_SAT_PERCENT]),
        UUID_TEMPERATURE_CHAR => Some(DEMO_TEMPERATURE_CENTI_CELSIUS.to_le_bytes().to_vec()),
        _ => None,
    }
}

#[async_trait]
impl PeripheralLink for DemoLink {
    fn device_id(&self) -> &str {
        DEMO_DEVICE_ID
    }

    async fn discover_services(&self) -> Result<(), BleError> {
        Ok(())
    }

    async fn subscribe(&self, service: Uuid, characteristic: Uuid) -> Result<NotificationStream, BleError> {
        if service != UUID_VITALS_SERVICE {
            return Err(BleError::ServiceNotFound(service));
        }
        let payload = demo_payload(characteristic).ok_or(BleError::CharacteristicNotFound(characteristic))?;
        let interval = self.interval;

        Ok(stream::unfold(payload, move |payload| async move {
            tokio::time::sleep(interval).await;
            Some((Ok(payload.clone()), payload))
        })
        .boxed())
    }

    async fn disconnect_events(&self) -> Result<DisconnectStream, BleError> {
        Ok(stream::pending::<()>().boxed())
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        info!("Disconnected from demo band");
        Ok(())
    }
}
