//! Integration tests for the hub through its public API.
//!
//! # Purpose
//!
//! These tests drive the [`Hub`] exactly the way its two callers do:
//!
//! - The socket layer attaches connections and feeds them decoded frames.
//! - The rental layer calls `send_command`, `query_status`,
//!   `list_online_module_ids` and `pair`.
//!
//! No sockets are opened.  Each simulated connection is a
//! [`ConnectionHandle`] whose outbound channel the test reads directly, so
//! every frame the hub would have written is visible.
//!
//! # Time
//!
//! [`ManualClock`] implements the public `Clock` trait over an atomic
//! counter so eviction scenarios can jump forward without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio_test::{assert_err, assert_ok};

use locker_core::{ClientHint, ConnectionRole, InboundMsg, LockAction, LockState, OutboundMsg};
use locker_hub::application::{default_locker_ids, Clock, DispatchError, Hub, PairingError};
use locker_hub::domain::{ConnectionHandle, ConnectionId, HubConfig, HubEvent, OutboundFrame};

// ── Helpers ───────────────────────────────────────────────────────────────────

struct ManualClock(AtomicU64);

impl ManualClock {
    fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A simulated peer: the handle the hub holds plus the channel its writer
/// task would drain.
struct Peer {
    handle: ConnectionHandle,
    rx: Receiver<OutboundFrame>,
}

impl Peer {
    fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Every message queued so far.
    fn drain(&mut self) -> Vec<OutboundMsg> {
        let mut out = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let OutboundFrame::Message(msg) = frame {
                out.push(msg);
            }
        }
        out
    }

    /// `true` if a Close frame is waiting.
    fn was_closed(&mut self) -> bool {
        let mut closed = false;
        while let Ok(frame) = self.rx.try_recv() {
            closed |= matches!(frame, OutboundFrame::Close { .. });
        }
        closed
    }
}

fn hub_at(ms: u64, config: HubConfig) -> (Arc<Hub>, Receiver<HubEvent>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock(AtomicU64::new(ms)));
    let (hub, events) = Hub::with_clock(config, clock.clone());
    (hub, events, clock)
}

async fn connect(hub: &Hub, hint: ClientHint) -> Peer {
    let (handle, rx) = ConnectionHandle::new(None);
    hub.attach(handle.clone(), hint).await;
    Peer { handle, rx }
}

/// A peer whose outbound queue holds at most `queue` messages.
async fn connect_with_queue(hub: &Hub, hint: ClientHint, queue: usize) -> Peer {
    let (handle, rx) = ConnectionHandle::with_capacity(None, queue);
    hub.attach(handle.clone(), hint).await;
    Peer { handle, rx }
}

async fn send(hub: &Hub, peer: &Peer, msg: InboundMsg) {
    hub.handle_message(peer.id(), msg).await;
}

fn announce(mac: &str) -> InboundMsg {
    InboundMsg::Announce {
        mac_address: mac.to_string(),
        device_info: "esp32-2door".to_string(),
        version: "1.4.0".to_string(),
        capabilities: 3,
    }
}

fn register(module_id: &str) -> InboundMsg {
    InboundMsg::Register {
        module_id: module_id.to_string(),
    }
}

fn occupancy(module_id: &str, locker_id: &str, occupied: bool, seq: Option<u64>) -> InboundMsg {
    InboundMsg::OccupancyReport {
        module_id: module_id.to_string(),
        locker_id: locker_id.to_string(),
        occupied,
        seq,
    }
}

fn drain_events(events: &mut Receiver<HubEvent>) -> Vec<HubEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

// ── End-to-end scenarios ──────────────────────────────────────────────────────

/// Announce, pair, register, command, disconnect, command again.
#[tokio::test]
async fn test_pair_register_command_disconnect_scenario() {
    // Arrange
    let (hub, _events, _clock) = hub_at(1_000, HubConfig::default());
    let mut device = connect(&hub, ClientHint::Unspecified).await;
    let mut dashboard = connect(&hub, ClientHint::Observer).await;

    // The device announces itself.
    send(&hub, &device, announce("AA:BB")).await;
    assert_eq!(hub.available_devices().await.len(), 1);

    // Pairing sends the configuration and empties the available list.
    assert_ok!(hub.pair("AA:BB", "mod-1", default_locker_ids(2)).await);
    assert!(hub.available_devices().await.is_empty());
    assert!(device.drain().contains(&OutboundMsg::Configure {
        module_id: "mod-1".to_string(),
        mac_address: "AA:BB".to_string(),
        locker_ids: vec!["L01".to_string(), "L02".to_string()],
    }));
    let pushes = dashboard.drain();
    assert_eq!(
        pushes.last(),
        Some(&OutboundMsg::AvailableDevicesChanged { devices: vec![] })
    );

    // The device registers under its new identity.
    send(&hub, &device, register("mod-1")).await;
    assert!(hub.is_online("mod-1").await);
    assert_eq!(
        device.drain(),
        vec![OutboundMsg::RegisteredAck {
            module_id: "mod-1".to_string(),
            timestamp: 1_000,
        }]
    );

    // A command is delivered to the module's connection.
    assert!(hub.send_command("mod-1", "L01", LockAction::Unlock).await);
    assert_eq!(
        device.drain(),
        vec![OutboundMsg::Unlock {
            locker_id: "L01".to_string(),
            timestamp: 1_000,
        }]
    );

    // Act: the module disconnects.
    hub.detach(device.id()).await;

    // Assert
    assert!(!hub.list_online_module_ids().await.contains("mod-1"));
    assert!(!hub.send_command("mod-1", "L01", LockAction::Unlock).await);
}

/// One occupancy report reaches every observer exactly once, after the
/// cache already holds it.
#[tokio::test]
async fn test_status_change_broadcast_once_to_each_observer() {
    // Arrange
    let (hub, _events, _clock) = hub_at(5_000, HubConfig::default());
    let module = connect(&hub, ClientHint::Module).await;
    let mut first = connect(&hub, ClientHint::Observer).await;
    let mut second = connect(&hub, ClientHint::Unspecified).await;
    send(&hub, &module, register("mod-1")).await;
    first.drain();
    second.drain();

    // Act
    send(&hub, &module, occupancy("mod-1", "L01", true, None)).await;

    // Assert
    let expected = OutboundMsg::StatusChanged {
        module_id: "mod-1".to_string(),
        locker_id: "L01".to_string(),
        occupied: Some(true),
        lock_state: None,
        timestamp: 5_000,
    };
    assert_eq!(first.drain(), vec![expected.clone()]);
    assert_eq!(second.drain(), vec![expected]);

    let cached = hub.query_status(Some("mod-1")).await;
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].occupied, Some(true));
}

#[tokio::test]
async fn test_send_command_to_offline_module_has_no_side_effect() {
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());

    assert!(!hub.send_command("ghost", "L01", LockAction::Lock).await);
    assert!(hub.query_status(None).await.is_empty());
}

#[tokio::test]
async fn test_dispatch_reports_reason() {
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let command = locker_core::Command::new("ghost", "L01", LockAction::Lock, 0);

    let err = assert_err!(hub.dispatch(&command).await);

    assert_eq!(err, DispatchError::ModuleOffline("ghost".to_string()));
}

// ── Registry invariants ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_detach_twice_is_noop_and_broadcasts_once() {
    // Arrange
    let (hub, mut events, _clock) = hub_at(0, HubConfig::default());
    let device = connect(&hub, ClientHint::Module).await;
    let mut dashboard = connect(&hub, ClientHint::Observer).await;
    send(&hub, &device, announce("AA:BB")).await;
    dashboard.drain();
    drain_events(&mut events);

    // Act
    let first = hub.detach(device.id()).await;
    let second = hub.detach(device.id()).await;

    // Assert
    assert_eq!(first.removed_macs, vec!["AA:BB".to_string()]);
    assert!(second.is_noop());
    assert_eq!(
        dashboard.drain(),
        vec![OutboundMsg::AvailableDevicesChanged { devices: vec![] }]
    );
    assert_eq!(
        drain_events(&mut events),
        vec![HubEvent::DeviceLost {
            mac_address: "AA:BB".to_string()
        }]
    );
}

#[tokio::test]
async fn test_duplicate_register_supersedes_and_closes_old_connection() {
    // Arrange
    let (hub, mut events, _clock) = hub_at(0, HubConfig::default());
    let mut old = connect(&hub, ClientHint::Module).await;
    let mut new = connect(&hub, ClientHint::Module).await;
    send(&hub, &old, register("mod-1")).await;
    old.drain();

    // Act
    send(&hub, &new, register("mod-1")).await;

    // Assert: one binding, on the new connection; the old one is told to close
    assert_eq!(hub.list_online_module_ids().await.len(), 1);
    assert!(old.was_closed());
    assert!(new.drain().iter().any(|m| matches!(m, OutboundMsg::RegisteredAck { .. })));
    assert!(hub.send_command("mod-1", "L02", LockAction::Lock).await);
    assert!(drain_events(&mut events).contains(&HubEvent::ModuleSuperseded {
        module_id: "mod-1".to_string(),
        connection_id: old.id(),
    }));

    // Detaching the superseded connection does not take the module offline.
    hub.detach(old.id()).await;
    assert!(hub.is_online("mod-1").await);
}

#[tokio::test]
async fn test_superseded_connection_left_open_when_configured() {
    let config = HubConfig {
        close_superseded: false,
        ..HubConfig::default()
    };
    let (hub, _events, _clock) = hub_at(0, config);
    let mut old = connect(&hub, ClientHint::Module).await;
    let new = connect(&hub, ClientHint::Module).await;
    send(&hub, &old, register("mod-1")).await;

    send(&hub, &new, register("mod-1")).await;

    assert!(!old.was_closed());
    assert!(old.handle.is_open());
}

#[tokio::test]
async fn test_announce_from_registered_connection_is_ignored() {
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let module = connect(&hub, ClientHint::Module).await;
    send(&hub, &module, register("mod-1")).await;

    send(&hub, &module, announce("AA:BB")).await;

    assert!(hub.available_devices().await.is_empty());
}

#[tokio::test]
async fn test_announce_with_empty_mac_is_rejected_without_state_change() {
    // Arrange
    let (hub, mut events, _clock) = hub_at(0, HubConfig::default());
    let mut device = connect(&hub, ClientHint::Module).await;
    let mut dashboard = connect(&hub, ClientHint::Observer).await;
    drain_events(&mut events);

    // Act
    send(&hub, &device, announce("")).await;

    // Assert
    let replies = device.drain();
    assert_eq!(replies.len(), 1);
    assert!(matches!(replies[0], OutboundMsg::Error { .. }));
    assert!(hub.available_devices().await.is_empty());
    assert!(dashboard.drain().is_empty());
    assert!(!drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, HubEvent::DeviceDiscovered { .. })));
    assert!(matches!(
        hub.pair("", "mod-1", default_locker_ids(1)).await,
        Err(PairingError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_register_promotes_announced_device_atomically() {
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let device = connect(&hub, ClientHint::Unspecified).await;
    send(&hub, &device, announce("AA:BB")).await;

    send(&hub, &device, register("mod-1")).await;

    assert!(hub.available_devices().await.is_empty());
    assert!(hub.is_online("mod-1").await);
}

// ── Classification and routing ────────────────────────────────────────────────

#[tokio::test]
async fn test_observer_reclassified_by_announce_stops_receiving_broadcasts() {
    // Arrange: no hint, so the connection starts as an observer
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let mut device = connect(&hub, ClientHint::Unspecified).await;
    assert_eq!(hub.role(device.id()).await, Some(ConnectionRole::Observer));

    // Act
    send(&hub, &device, announce("AA:BB")).await;

    // Assert
    assert_eq!(hub.role(device.id()).await, Some(ConnectionRole::Module));
    assert_eq!(hub.observer_count().await, 0);
    assert!(device.drain().is_empty());
}

#[tokio::test]
async fn test_observer_request_from_module_is_dropped() {
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let mut module = connect(&hub, ClientHint::Module).await;
    send(&hub, &module, register("mod-1")).await;
    module.drain();

    send(&hub, &module, InboundMsg::QueryStatus { module_id: None }).await;

    assert!(module.drain().is_empty());
}

#[tokio::test]
async fn test_admin_unlock_from_observer_reaches_module() {
    // Arrange
    let (hub, _events, _clock) = hub_at(42, HubConfig::default());
    let mut module = connect(&hub, ClientHint::Module).await;
    let mut dashboard = connect(&hub, ClientHint::Observer).await;
    send(&hub, &module, register("mod-1")).await;
    module.drain();

    // Act
    send(
        &hub,
        &dashboard,
        InboundMsg::AdminUnlock {
            module_id: "mod-1".to_string(),
            locker_id: "L03".to_string(),
        },
    )
    .await;

    // Assert
    assert_eq!(
        module.drain(),
        vec![OutboundMsg::Unlock {
            locker_id: "L03".to_string(),
            timestamp: 42,
        }]
    );
    assert_eq!(
        dashboard.drain(),
        vec![OutboundMsg::CommandResult {
            module_id: "mod-1".to_string(),
            locker_id: "L03".to_string(),
            action: LockAction::Unlock,
            delivered: true,
        }]
    );
}

#[tokio::test]
async fn test_malformed_frame_answered_with_error_only_to_sender() {
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let mut sender = connect(&hub, ClientHint::Observer).await;
    let mut bystander = connect(&hub, ClientHint::Observer).await;

    hub.handle_frame(sender.id(), "{not json").await;

    let replies = sender.drain();
    assert_eq!(replies.len(), 1);
    assert!(matches!(replies[0], OutboundMsg::Error { .. }));
    assert!(bystander.drain().is_empty());
}

#[tokio::test]
async fn test_unknown_kind_is_dropped_silently() {
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let mut sender = connect(&hub, ClientHint::Observer).await;

    hub.handle_frame(sender.id(), r#"{"type":"firmware-update","url":"x"}"#)
        .await;

    assert!(sender.drain().is_empty());
    assert_eq!(hub.role(sender.id()).await, Some(ConnectionRole::Observer));
}

#[tokio::test]
async fn test_query_available_devices_replies_to_observer() {
    let (hub, _events, _clock) = hub_at(7, HubConfig::default());
    let device = connect(&hub, ClientHint::Module).await;
    let mut dashboard = connect(&hub, ClientHint::Observer).await;
    send(&hub, &device, announce("AA:BB")).await;
    dashboard.drain();

    hub.handle_frame(dashboard.id(), r#"{"type":"query-available-devices"}"#)
        .await;

    match dashboard.drain().as_slice() {
        [OutboundMsg::AvailableDevices { devices }] => {
            assert_eq!(devices.len(), 1);
            assert_eq!(devices[0].mac_address, "AA:BB");
            assert_eq!(devices[0].discovered_at, 7);
        }
        other => panic!("unexpected replies: {other:?}"),
    }
}

#[tokio::test]
async fn test_stalled_observer_is_cut_off_while_others_keep_receiving() {
    // Arrange
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let module = connect(&hub, ClientHint::Module).await;
    send(&hub, &module, register("mod-1")).await;
    let mut stalled = connect_with_queue(&hub, ClientHint::Observer, 4).await;
    let mut healthy = connect_with_queue(&hub, ClientHint::Observer, 4).await;
    assert_eq!(hub.observer_count().await, 2);

    // Act: only the healthy observer's writer keeps up
    let mut delivered = 0;
    for i in 0..10 {
        send(&hub, &module, occupancy("mod-1", "L01", i % 2 == 0, None)).await;
        delivered += healthy.drain().len();
    }

    // Assert
    assert_eq!(delivered, 10);
    assert!(healthy.handle.is_open());
    assert!(!stalled.handle.is_open());
    assert_eq!(hub.observer_count().await, 1);
    let mut frames = Vec::new();
    while let Ok(frame) = stalled.rx.try_recv() {
        frames.push(frame);
    }
    assert_eq!(frames.len(), 5);
    assert!(frames[..4]
        .iter()
        .all(|f| matches!(f, OutboundFrame::Message(OutboundMsg::StatusChanged { .. }))));
    assert_eq!(
        frames[4],
        OutboundFrame::Close {
            reason: "slow consumer".to_string()
        }
    );
}

// ── Status ordering ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reordered_telemetry_is_ignored_and_not_broadcast() {
    // Arrange
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let module = connect(&hub, ClientHint::Module).await;
    let mut dashboard = connect(&hub, ClientHint::Observer).await;
    send(&hub, &module, register("mod-1")).await;
    send(&hub, &module, occupancy("mod-1", "L01", true, Some(8))).await;
    dashboard.drain();

    // Act: an older report arrives late
    send(&hub, &module, occupancy("mod-1", "L01", false, Some(7))).await;

    // Assert
    assert!(dashboard.drain().is_empty());
    assert_eq!(hub.query_status(None).await[0].occupied, Some(true));
}

#[tokio::test]
async fn test_reregistration_resets_sequence_guard() {
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let module = connect(&hub, ClientHint::Module).await;
    send(&hub, &module, register("mod-1")).await;
    send(&hub, &module, occupancy("mod-1", "L01", true, Some(90))).await;

    // The device reboots and its counter restarts.
    let rebooted = connect(&hub, ClientHint::Module).await;
    send(&hub, &rebooted, register("mod-1")).await;
    send(&hub, &rebooted, occupancy("mod-1", "L01", false, Some(1))).await;

    assert_eq!(hub.query_status(Some("mod-1")).await[0].occupied, Some(false));
}

#[tokio::test]
async fn test_telemetry_for_another_module_is_rejected() {
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let module = connect(&hub, ClientHint::Module).await;
    send(&hub, &module, register("mod-1")).await;

    send(
        &hub,
        &module,
        InboundMsg::Telemetry {
            module_id: "mod-2".to_string(),
            locker_id: "L01".to_string(),
            lock_state: LockState::Unlocked,
            seq: None,
        },
    )
    .await;

    assert!(hub.query_status(None).await.is_empty());
}

#[tokio::test]
async fn test_record_status_broadcasts_to_observers() {
    let (hub, _events, _clock) = hub_at(9, HubConfig::default());
    let mut dashboard = connect(&hub, ClientHint::Observer).await;

    let status = hub.record_status("mod-1", "L05", true).await;

    assert_eq!(status.last_update, 9);
    assert_eq!(dashboard.drain(), vec![status.to_change_frame()]);
}

// ── Pairing ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pair_unknown_mac_fails_without_state_change() {
    let (hub, mut events, _clock) = hub_at(0, HubConfig::default());

    let err = assert_err!(hub.pair("FF:FF", "mod-1", default_locker_ids(1)).await);

    assert_eq!(err, PairingError::NotAvailable("FF:FF".to_string()));
    assert!(drain_events(&mut events).is_empty());
}

#[tokio::test]
async fn test_pair_with_closed_connection_keeps_device_listed() {
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());
    let device = connect(&hub, ClientHint::Module).await;
    send(&hub, &device, announce("AA:BB")).await;
    let Peer { handle: _handle, rx } = device;
    drop(rx);

    let err = assert_err!(hub.pair("AA:BB", "mod-1", default_locker_ids(2)).await);

    assert_eq!(err, PairingError::ConnectionClosed("AA:BB".to_string()));
    assert_eq!(hub.available_devices().await.len(), 1);
}

#[tokio::test]
async fn test_pair_rejects_empty_locker_list() {
    let (hub, _events, _clock) = hub_at(0, HubConfig::default());

    let err = assert_err!(hub.pair("AA:BB", "mod-1", Vec::new()).await);

    assert!(matches!(err, PairingError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_config_ack_confirms_pairing() {
    // Arrange
    let (hub, mut events, _clock) = hub_at(0, HubConfig::default());
    let device = connect(&hub, ClientHint::Module).await;
    send(&hub, &device, announce("AA:BB")).await;
    assert_ok!(hub.pair("AA:BB", "mod-1", default_locker_ids(2)).await);
    drain_events(&mut events);

    // Act
    send(
        &hub,
        &device,
        InboundMsg::ConfigAck {
            module_id: "mod-1".to_string(),
            mac_address: "AA:BB".to_string(),
        },
    )
    .await;

    // Assert
    assert_eq!(
        drain_events(&mut events),
        vec![HubEvent::PairingConfirmed {
            mac_address: "AA:BB".to_string(),
            module_id: "mod-1".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_config_error_rejects_pairing() {
    let (hub, mut events, _clock) = hub_at(0, HubConfig::default());
    let device = connect(&hub, ClientHint::Module).await;
    send(&hub, &device, announce("AA:BB")).await;
    assert_ok!(hub.pair("AA:BB", "mod-1", default_locker_ids(2)).await);
    drain_events(&mut events);

    send(
        &hub,
        &device,
        InboundMsg::ConfigError {
            module_id: "mod-1".to_string(),
            mac_address: "AA:BB".to_string(),
            reason: Some("mac mismatch".to_string()),
        },
    )
    .await;

    assert_eq!(
        drain_events(&mut events),
        vec![HubEvent::PairingRejected {
            mac_address: "AA:BB".to_string(),
            module_id: "mod-1".to_string(),
            reason: Some("mac mismatch".to_string()),
        }]
    );
}

// ── Liveness ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_heartbeat_eviction_happens_on_next_tick_only() {
    // Arrange
    let config = HubConfig {
        heartbeat_interval: Duration::from_secs(30),
        heartbeat_timeout: Duration::from_secs(120),
        ..HubConfig::default()
    };
    let (hub, _events, clock) = hub_at(0, config);
    let mut module = connect(&hub, ClientHint::Module).await;
    send(&hub, &module, register("mod-1")).await;

    // Act: the window has passed but no tick has run yet
    clock.set(150_000);
    let before_tick = hub.list_online_module_ids().await;
    let report = hub.heartbeat_tick().await;

    // Assert
    assert!(before_tick.contains("mod-1"));
    assert_eq!(report.evicted, vec!["mod-1".to_string()]);
    assert!(hub.list_online_module_ids().await.is_empty());
    assert!(module.was_closed());
}

#[tokio::test]
async fn test_module_heartbeat_ping_is_answered_and_refreshes() {
    let (hub, _events, clock) = hub_at(0, HubConfig::default());
    let mut module = connect(&hub, ClientHint::Module).await;
    send(&hub, &module, register("mod-1")).await;
    module.drain();

    clock.set(100_000);
    send(
        &hub,
        &module,
        InboundMsg::HeartbeatPing {
            module_id: "mod-1".to_string(),
        },
    )
    .await;
    clock.set(200_000);
    let report = hub.heartbeat_tick().await;

    assert!(report.evicted.is_empty());
    let frames = module.drain();
    assert_eq!(
        frames.first(),
        Some(&OutboundMsg::HeartbeatPong { timestamp: 100_000 })
    );
    assert_eq!(
        frames.last(),
        Some(&OutboundMsg::HeartbeatPing { timestamp: 200_000 })
    );
}

#[tokio::test]
async fn test_stale_device_absent_from_next_snapshot() {
    let (hub, mut events, clock) = hub_at(0, HubConfig::default());
    let device = connect(&hub, ClientHint::Module).await;
    send(&hub, &device, announce("AA:BB")).await;
    drain_events(&mut events);

    clock.set(30_001);
    hub.discovery_sweep().await;

    assert!(hub.available_devices().await.is_empty());
    assert_eq!(
        drain_events(&mut events),
        vec![HubEvent::DeviceExpired {
            mac_address: "AA:BB".to_string()
        }]
    );
}
