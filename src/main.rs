//! Headless SynkLinx monitor: scans, connects to the first band found and logs
//! its vitals until Ctrl-C.
//!
//! Usage: `synklinx-monitor [--demo] [CONFIG_PATH]`

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use synklinx_link::config::session_config::SessionConfig;
use synklinx_link::core::bluetooth::DemoTransport;
use synklinx_link::core::{TemperatureUnit, VitalAlertMonitor};
use synklinx_link::logging::SessionLogger;
use synklinx_link::{AppConfig, BluetoothManager, ConnectionState, SessionEvent};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = SessionLogger::init("info") {
        eprintln!("Failed to install logger: {}", e);
    }

    let mut demo = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        if arg == "--demo" {
            demo = true;
        } else {
            config_path = Some(arg);
        }
    }

    let config = match config_path {
        Some(path) => AppConfig::load(path).await?,
        None => AppConfig::default(),
    };

    let manager = if demo {
        info!("Using the simulated demo band");
        BluetoothManager::new(Arc::new(DemoTransport::new()), config.session.clone())
    } else {
        platform_manager(config.session.clone()).await?
    };
    let mut events = manager.subscribe_events();
    let mut state_rx = manager.watch_state();
    let mut alert_monitor = VitalAlertMonitor::new(config.alerts.clone());

    manager.scan().await?;
    info!("Scanning for SynkLinx devices...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                manager.stop_scan().await;
                manager.disconnect().await;
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::DeviceFound { device }) => {
                    if manager.connected_device().await.is_some() {
                        continue;
                    }
                    if let Err(e) = manager.connect_to_device(&device).await {
                        error!("Failed to connect to SynkLinx device: {}", e);
                        manager.scan().await?;
                    }
                }
                Ok(SessionEvent::LinkLost { device }) => warn!("{} lost connection", device.name),
                Ok(SessionEvent::StreamingFailed { reason, .. }) => warn!("Streaming error: {}", reason),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} session events", skipped),
                Err(RecvError::Closed) => break,
            },
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                if state.connection_state != ConnectionState::Connected {
                    continue;
                }
                info!(
                    "HR: {:?} bpm, SpO2: {:?} %, Temp: {:?} °C",
                    state.latest.heart_rate, state.latest.o2_sat, state.latest.temperature
                );
                for alert in alert_monitor.evaluate(&state.latest, TemperatureUnit::Celsius, Instant::now()) {
                    warn!("{:?} {}: {}", alert.severity, alert.title, alert.description);
                }
            }
        }
    }

    Ok(())
}

#[cfg(feature = "platform-ble")]
async fn platform_manager(config: SessionConfig) -> Result<BluetoothManager> {
    BluetoothManager::with_default_adapter(config).await
}

#[cfg(not(feature = "platform-ble"))]
async fn platform_manager(_config: SessionConfig) -> Result<BluetoothManager> {
    anyhow::bail!("built without the `platform-ble` feature, run with --demo")
}
