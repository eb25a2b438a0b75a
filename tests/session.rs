mod common;

use std::sync::Arc;
use std::time::Duration;

use synklinx_link::config::session_config::SessionConfig;
use synklinx_link::core::bluetooth::{
    UUID_HEART_RATE_CHAR, UUID_O2_SAT_CHAR, UUID_TEMPERATURE_CHAR, UUID_VITALS_SERVICE,
};
use synklinx_link::{
    BleError, BluetoothManager, ConnectError, ConnectionState, DiscoveredDevice, SessionEvent, VitalKind,
};

use common::{
    MockLink, MockTransport, drain_events, manager, manager_with, run_pending_tasks, wait_for_event, wait_for_state,
};

fn single_round() -> SessionConfig {
    SessionConfig {
        auto_retry: false,
        ..SessionConfig::default()
    }
}

/// Scans until `id` is listed and returns it
async fn discover(manager: &BluetoothManager, transport: &MockTransport, id: &str, name: &str) -> DiscoveredDevice {
    let mut state = manager.watch_state();
    manager.scan().await.unwrap();
    transport.advertise(id, Some(name));
    let snapshot = wait_for_state(&mut state, |s| s.discovered.iter().any(|d| d.id == id)).await;
    snapshot.discovered.into_iter().find(|d| d.id == id).unwrap()
}

async fn connect(manager: &BluetoothManager, transport: &MockTransport) -> (DiscoveredDevice, Arc<MockLink>) {
    let device = discover(manager, transport, "A", "SynkLinx-1").await;
    manager.connect_to_device(&device).await.unwrap();
    manager.settle().await;
    (device, transport.link("A"))
}

#[tokio::test(start_paused = true)]
async fn connect_streams_validated_vitals() {
    let (manager, transport) = manager();
    let mut events = manager.subscribe_events();
    let mut state = manager.watch_state();

    let (device, link) = connect(&manager, &transport).await;

    let snapshot = manager.state();
    assert_eq!(snapshot.connection_state, ConnectionState::Connected);
    assert_eq!(snapshot.connected_device, Some(device.clone()));
    assert!(snapshot.latest.is_unknown());
    assert!(!snapshot.scanning_active);
    assert!(!manager.is_scanning().await);
    assert_eq!(manager.connected_device().await, Some(device.clone()));
    assert!(drain_events(&mut events).contains(&SessionEvent::Connected { device }));

    link.notify(UUID_HEART_RATE_CHAR, &[72]);
    link.notify(UUID_O2_SAT_CHAR, &[45]);
    link.notify(UUID_TEMPERATURE_CHAR, &3_680i16.to_le_bytes());
    let snapshot = wait_for_state(&mut state, |s| s.latest.heart_rate.is_some() && s.latest.temperature.is_some()).await;
    run_pending_tasks().await;

    assert_eq!(snapshot.latest.heart_rate, Some(72));
    assert_eq!(snapshot.latest.temperature, Some(36.8));
    assert_eq!(manager.state().latest.o2_sat, None);

    link.notify(UUID_O2_SAT_CHAR, &[97]);
    link.notify(UUID_HEART_RATE_CHAR, &[250]);
    link.notify_error(UUID_HEART_RATE_CHAR, "bad frame");
    link.notify(UUID_HEART_RATE_CHAR, &[]);
    let snapshot = wait_for_state(&mut state, |s| s.latest.o2_sat == Some(97)).await;
    run_pending_tasks().await;

    assert_eq!(snapshot.latest.o2_sat, Some(97));
    assert_eq!(manager.state().latest.heart_rate, Some(72));
}

#[tokio::test(start_paused = true)]
async fn disconnect_releases_link_and_forgets_vitals() {
    let (manager, transport) = manager();
    let mut state = manager.watch_state();
    let (device, link) = connect(&manager, &transport).await;
    let mut events = manager.subscribe_events();

    link.notify(UUID_HEART_RATE_CHAR, &[80]);
    wait_for_state(&mut state, |s| s.latest.heart_rate == Some(80)).await;

    manager.disconnect().await;
    manager.settle().await;

    let snapshot = manager.state();
    assert_eq!(snapshot.connection_state, ConnectionState::Idle);
    assert_eq!(snapshot.connected_device, None);
    assert!(snapshot.latest.is_unknown());
    assert_eq!(link.disconnect_calls(), 1);
    assert_eq!(manager.connected_device().await, None);
    assert_eq!(drain_events(&mut events), vec![SessionEvent::Disconnected { device }]);

    run_pending_tasks().await;
    assert!(!link.is_subscribed(UUID_HEART_RATE_CHAR));

    // an explicit disconnect never schedules a re-scan
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.scan_calls(), 1);

    manager.disconnect().await;
    assert_eq!(link.disconnect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn link_loss_is_debounced_into_one_rescan() {
    let (manager, transport) = manager_with(single_round());
    let mut state = manager.watch_state();
    let (device, link) = connect(&manager, &transport).await;
    let mut events = manager.subscribe_events();

    link.notify(UUID_HEART_RATE_CHAR, &[90]);
    wait_for_state(&mut state, |s| s.latest.heart_rate == Some(90)).await;

    link.drop_link();
    link.drop_link();
    wait_for_event(&mut events, |e| matches!(e, SessionEvent::LinkLost { .. })).await;
    manager.settle().await;

    let snapshot = manager.state();
    assert_eq!(snapshot.connection_state, ConnectionState::Idle);
    assert!(snapshot.latest.is_unknown());
    assert_eq!(manager.connected_device().await, None);
    assert_eq!(transport.scan_calls(), 1);

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    manager.settle().await;
    assert_eq!(transport.scan_calls(), 2);
    assert_eq!(manager.state().connection_state, ConnectionState::Scanning);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.scan_calls(), 2);

    let lost = drain_events(&mut events)
        .into_iter()
        .filter(|e| *e == SessionEvent::LinkLost { device: device.clone() })
        .count();
    assert_eq!(lost, 1);
}

#[tokio::test(start_paused = true)]
async fn connect_during_cooldown_cancels_rescan() {
    let (manager, transport) = manager_with(single_round());
    let mut events = manager.subscribe_events();
    let (device, link) = connect(&manager, &transport).await;

    link.drop_link();
    wait_for_event(&mut events, |e| matches!(e, SessionEvent::LinkLost { .. })).await;

    manager.connect_to_device(&device).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    manager.settle().await;

    assert_eq!(transport.scan_calls(), 1);
    assert_eq!(manager.state().connection_state, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn loss_of_a_replaced_link_is_ignored() {
    let (manager, transport) = manager_with(single_round());
    let mut state = manager.watch_state();
    let (device, first_link) = connect(&manager, &transport).await;

    manager.connect_to_device(&device).await.unwrap();
    manager.settle().await;
    assert_eq!(first_link.disconnect_calls(), 1);
    let second_link = transport.link("A");
    assert!(!Arc::ptr_eq(&first_link, &second_link));

    first_link.drop_link();
    tokio::time::sleep(Duration::from_secs(5)).await;
    manager.settle().await;

    let snapshot = manager.state();
    assert_eq!(snapshot.connection_state, ConnectionState::Connected);
    assert_eq!(snapshot.connected_device, Some(device));
    assert_eq!(transport.scan_calls(), 1);

    second_link.notify(UUID_O2_SAT_CHAR, &[96]);
    wait_for_state(&mut state, |s| s.latest.o2_sat == Some(96)).await;
}

#[tokio::test(start_paused = true)]
async fn scan_is_refused_while_connected() {
    let (manager, transport) = manager_with(single_round());
    let (device, _link) = connect(&manager, &transport).await;

    manager.scan().await.unwrap();
    manager.settle().await;

    assert_eq!(transport.scan_calls(), 1);
    assert!(!manager.is_scanning().await);
    let snapshot = manager.state();
    assert_eq!(snapshot.connection_state, ConnectionState::Connected);
    assert!(!snapshot.scanning_active);
    assert_eq!(snapshot.discovered, vec![device]);

    manager.disconnect().await;
    manager.scan().await.unwrap();
    assert_eq!(transport.scan_calls(), 2);
    assert!(manager.is_scanning().await);
}

#[tokio::test(start_paused = true)]
async fn scan_is_refused_while_connecting() {
    let (manager, transport) = manager();
    let device = discover(&manager, &transport, "A", "SynkLinx-1").await;
    transport.stall_connect();

    let (result, ()) = tokio::join!(manager.connect_to_device(&device), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        manager.scan().await.unwrap();
        assert!(!manager.is_scanning().await);
    });

    assert!(matches!(result, Err(ConnectError::Timeout(_))));
    assert_eq!(transport.scan_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn subscriptions_wait_for_the_settle_delay() {
    let (manager, transport) = manager();
    let device = discover(&manager, &transport, "A", "SynkLinx-1").await;

    let started = tokio::time::Instant::now();
    let (result, ()) = tokio::join!(manager.connect_to_device(&device), async {
        tokio::time::sleep(Duration::from_millis(450)).await;
        let link = transport.link("A");
        assert!(!link.is_subscribed(UUID_HEART_RATE_CHAR));
        assert!(!link.is_subscribed(UUID_O2_SAT_CHAR));
        assert!(!link.is_subscribed(UUID_TEMPERATURE_CHAR));
        assert_eq!(manager.state().connection_state, ConnectionState::Connecting);
    });

    result.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(500));
    let link = transport.link("A");
    assert!(link.is_subscribed(UUID_HEART_RATE_CHAR));
    assert!(link.is_subscribed(UUID_O2_SAT_CHAR));
    assert!(link.is_subscribed(UUID_TEMPERATURE_CHAR));
}

#[tokio::test(start_paused = true)]
async fn abandoned_connect_returns_to_idle() {
    let (manager, transport) = manager_with(SessionConfig {
        connect_timeout_ms: None,
        ..SessionConfig::default()
    });
    let device = discover(&manager, &transport, "A", "SynkLinx-1").await;

    // dropped during the settle delay, after the link was opened
    let attempt = tokio::time::timeout(Duration::from_millis(200), manager.connect_to_device(&device)).await;
    assert!(attempt.is_err());
    manager.settle().await;
    run_pending_tasks().await;

    let snapshot = manager.state();
    assert_eq!(snapshot.connection_state, ConnectionState::Idle);
    assert_eq!(snapshot.connected_device, None);
    assert_eq!(transport.link("A").disconnect_calls(), 1);

    manager.disconnect().await;
    manager.settle().await;
    assert_eq!(manager.state().connection_state, ConnectionState::Idle);

    manager.connect_to_device(&device).await.unwrap();
    manager.settle().await;
    assert_eq!(manager.state().connection_state, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn abandoned_stalled_connect_can_be_retried() {
    let (manager, transport) = manager_with(SessionConfig {
        connect_timeout_ms: None,
        ..SessionConfig::default()
    });
    let device = discover(&manager, &transport, "A", "SynkLinx-1").await;
    transport.stall_connect();

    let attempt = tokio::time::timeout(Duration::from_secs(5), manager.connect_to_device(&device)).await;
    assert!(attempt.is_err());
    manager.disconnect().await;
    manager.settle().await;

    let snapshot = manager.state();
    assert_eq!(snapshot.connection_state, ConnectionState::Idle);
    assert_eq!(snapshot.connected_device, None);

    manager.scan().await.unwrap();
    assert!(manager.is_scanning().await);
}

#[tokio::test(start_paused = true)]
async fn unknown_device_is_ignored() {
    let (manager, transport) = manager_with(single_round());
    discover(&manager, &transport, "A", "SynkLinx-1").await;

    let stale = DiscoveredDevice::new("Z", "SynkLinx-9");
    assert_eq!(manager.connect_to_device(&stale).await, Ok(()));
    manager.settle().await;

    assert!(!transport.has_link("Z"));
    assert_eq!(manager.state().connection_state, ConnectionState::Idle);
    assert!(!manager.is_scanning().await);
}

#[tokio::test(start_paused = true)]
async fn device_from_a_previous_scan_is_ignored() {
    let (manager, transport) = manager_with(single_round());
    let old = discover(&manager, &transport, "A", "SynkLinx-1").await;
    manager.stop_scan().await;
    manager.scan().await.unwrap();

    assert_eq!(manager.connect_to_device(&old).await, Ok(()));
    manager.settle().await;

    assert!(!transport.has_link("A"));
    assert_eq!(manager.state().connection_state, ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn link_failure_returns_to_idle() {
    let (manager, transport) = manager();
    let device = discover(&manager, &transport, "A", "SynkLinx-1").await;
    let mut events = manager.subscribe_events();
    transport.fail_connect(BleError::Platform("refused".to_string()));

    let result = manager.connect_to_device(&device).await;
    manager.settle().await;

    assert_eq!(result, Err(ConnectError::Link(BleError::Platform("refused".to_string()))));
    let snapshot = manager.state();
    assert_eq!(snapshot.connection_state, ConnectionState::Idle);
    assert_eq!(snapshot.connected_device, None);
    let event = wait_for_event(&mut events, |e| matches!(e, SessionEvent::ConnectFailed { .. })).await;
    assert_eq!(
        event,
        SessionEvent::ConnectFailed {
            device: device.clone(),
            reason: "Failed to connect to device: Bluetooth error: refused".to_string(),
        }
    );

    // the scan results survive, so the same device can be retried
    manager.connect_to_device(&device).await.unwrap();
    manager.settle().await;
    assert_eq!(manager.state().connection_state, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn discovery_failure_closes_the_link() {
    let (manager, transport) = manager();
    let device = discover(&manager, &transport, "A", "SynkLinx-1").await;
    transport.fail_discovery(BleError::ServiceNotFound(UUID_VITALS_SERVICE));

    let result = manager.connect_to_device(&device).await;
    manager.settle().await;

    assert!(matches!(result, Err(ConnectError::Discovery(BleError::ServiceNotFound(_)))));
    assert_eq!(transport.link("A").disconnect_calls(), 1);
    assert_eq!(manager.state().connection_state, ConnectionState::Idle);
    assert_eq!(manager.connected_device().await, None);
}

#[tokio::test(start_paused = true)]
async fn subscribe_failure_leaves_other_streams_running() {
    let (manager, transport) = manager();
    let mut state = manager.watch_state();
    let mut events = manager.subscribe_events();
    transport.fail_subscribe(UUID_O2_SAT_CHAR);

    let (_, link) = connect(&manager, &transport).await;

    assert_eq!(manager.state().connection_state, ConnectionState::Connected);
    let failure = wait_for_event(&mut events, |e| matches!(e, SessionEvent::StreamingFailed { .. })).await;
    assert!(matches!(failure, SessionEvent::StreamingFailed { kind: VitalKind::O2Sat, .. }));
    assert!(!link.is_subscribed(UUID_O2_SAT_CHAR));
    assert!(link.is_subscribed(UUID_HEART_RATE_CHAR));
    assert!(link.is_subscribed(UUID_TEMPERATURE_CHAR));

    link.notify(UUID_HEART_RATE_CHAR, &[64]);
    let snapshot = wait_for_state(&mut state, |s| s.latest.heart_rate == Some(64)).await;
    assert_eq!(snapshot.latest.o2_sat, None);
}

#[tokio::test(start_paused = true)]
async fn stalled_connect_times_out() {
    let (manager, transport) = manager();
    let device = discover(&manager, &transport, "A", "SynkLinx-1").await;
    transport.stall_connect();

    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(manager.connect_to_device(&device), manager.connect_to_device(&device));
    manager.settle().await;

    assert_eq!(first, Err(ConnectError::Timeout(Duration::from_secs(10))));
    assert_eq!(second, Err(ConnectError::InProgress));
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(manager.state().connection_state, ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn connect_waits_forever_without_timeout() {
    let (manager, transport) = manager_with(SessionConfig {
        connect_timeout_ms: None,
        ..SessionConfig::default()
    });
    let device = discover(&manager, &transport, "A", "SynkLinx-1").await;
    transport.stall_connect();

    let attempt = tokio::time::timeout(Duration::from_secs(60), manager.connect_to_device(&device)).await;

    assert!(attempt.is_err());
    assert!(!transport.has_link("A"));
}
