#![allow(clippy::unwrap_used)]
// Integration tests for `BleDevice` operations against the scripted bridge.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use pretty_assertions::assert_eq;
use tokio::time::{Instant, sleep};

use bluelane_core::bridge::{DescriptorWrittenEvent, DiscoveredServicesEvent, MtuEvent, RssiEvent};
use bluelane_core::lock::{DISCONNECT_LOCK, GLOBAL_LOCK};
use bluelane_core::model::{
    CLIENT_CHARACTERISTIC_CONFIG, GENERIC_ATTRIBUTE_SERVICE, SERVICES_CHANGED_CHARACTERISTIC,
    ble_uuid,
};
use bluelane_core::{
    AdapterState, BleError, BondOptions, BondState, BridgeCommand, BridgeError, BridgeEvent,
    ConnectOptions, ConnectionPriority, DeviceId, DisconnectOptions, DiscoverOptions, ErrorKind,
    MtuOptions, NativeStatus, Operation, PhyCoding, PhySet, Platform, TimeoutOptions,
};

use common::{HEART_RATE_SERVICE, bond, device_id, disconnected, sample_services, setup};

fn no_mtu() -> ConnectOptions {
    ConnectOptions {
        mtu: None,
        ..ConnectOptions::default()
    }
}

fn assert_platform_error(err: &BleError, operation: Operation, code: i32, message: &str) {
    match err {
        BleError::Platform {
            operation: op,
            code: c,
            message: m,
        } => {
            assert_eq!(*op, operation);
            assert_eq!(*c, code);
            assert_eq!(m, message);
        }
        other => panic!("expected a platform error, got {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Platform);
}

// ── Serialization ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn radio_operations_never_overlap() {
    let (central, bridge) = setup(Platform::Linux);
    let devices: Vec<_> = (1..=4).map(|n| central.device(device_id(n))).collect();

    let connects = join_all(devices.iter().map(|d| d.connect(ConnectOptions::default()))).await;
    assert!(connects.iter().all(Result::is_ok));

    let reads = join_all(devices.iter().map(|d| d.read_rssi(TimeoutOptions::default()))).await;
    assert!(reads.iter().all(|r| matches!(r, Ok(-60))));

    assert_eq!(bridge.max_in_flight(), 1);
    assert_eq!(central.connected_devices().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn locks_are_released_after_every_outcome() {
    let (central, bridge) = setup(Platform::Linux);
    let device = central.device(device_id(1));

    bridge.fail(Operation::Connect, BridgeError::with_code(1, "busy"));
    let err = device.connect(ConnectOptions::default()).await.unwrap_err();
    assert!(matches!(err, BleError::Bridge { .. }));
    assert_eq!(err.operation(), Operation::Connect);

    assert!(!central.locks().is_locked(GLOBAL_LOCK));
    assert!(!central.locks().is_locked(DISCONNECT_LOCK));

    device.connect(ConnectOptions::default()).await.unwrap();
    assert!(device.is_connected());
}

// ── Connect / disconnect ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unqueued_disconnect_cancels_pending_connect() {
    let (central, bridge) = setup(Platform::Linux);
    let device = central.device(device_id(1));
    bridge.silence(Operation::Connect);

    let connecting = tokio::spawn({
        let device = device.clone();
        async move { device.connect(ConnectOptions::default()).await }
    });
    sleep(Duration::from_millis(1)).await;
    assert!(central.locks().is_locked(GLOBAL_LOCK));

    device
        .disconnect(DisconnectOptions::immediate())
        .await
        .unwrap();

    let err = connecting.await.unwrap().unwrap_err();
    assert!(matches!(err, BleError::ConnectionCanceled { .. }));
    assert!(device.is_disconnected());
    assert!(!central.locks().is_locked(GLOBAL_LOCK));
}

#[tokio::test(start_paused = true)]
async fn fast_response_is_not_lost() {
    let (central, bridge) = setup(Platform::Linux);
    bridge.respond_inline();
    let device = central.device(device_id(1));

    device.connect(ConnectOptions::default()).await.unwrap();
    assert!(device.is_connected());

    let services = device.discover_services(DiscoverOptions::default()).await.unwrap();
    assert_eq!(services.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn second_disconnect_returns_without_waiting() {
    let (central, bridge) = setup(Platform::Linux);
    let device = central.device(device_id(1));

    device.connect(ConnectOptions::default()).await.unwrap();
    device.disconnect(DisconnectOptions::default()).await.unwrap();
    assert!(device.is_disconnected());

    let start = Instant::now();
    device.disconnect(DisconnectOptions::default()).await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(1));
    assert_eq!(bridge.count(Operation::Disconnect), 2);
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_cancels_and_releases_locks() {
    let (central, bridge) = setup(Platform::Linux);
    let device = central.device(device_id(1));
    bridge.silence(Operation::Connect);

    let start = Instant::now();
    let err = device
        .connect(ConnectOptions {
            timeout: Some(Duration::from_secs(1)),
            ..ConnectOptions::default()
        })
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout());
    assert_eq!(err.operation(), Operation::Connect);
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1010));

    assert!(!central.locks().is_locked(GLOBAL_LOCK));
    assert!(!central.locks().is_locked(DISCONNECT_LOCK));
    assert_eq!(bridge.count(Operation::Disconnect), 1);

    // The queue is free again.
    device.disconnect(DisconnectOptions::default()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn native_disconnect_reason_fails_connect() {
    let (central, bridge) = setup(Platform::Linux);
    let id = device_id(1);
    let device = central.device(id.clone());
    bridge.script(
        Operation::Connect,
        true,
        vec![disconnected(&id, 133, "GATT_ERROR")],
    );

    let err = device.connect(ConnectOptions::default()).await.unwrap_err();
    match err {
        BleError::Platform { code, message, .. } => {
            assert_eq!(code, 133);
            assert_eq!(message, "GATT_ERROR");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(device.disconnect_reason().unwrap().code, 133);
}

#[tokio::test]
async fn auto_connect_rejects_mtu() {
    let (central, bridge) = setup(Platform::Android);
    let device = central.device(device_id(1));

    let err = device
        .connect(ConnectOptions {
            auto_connect: true,
            mtu: Some(247),
            timeout: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BleError::InvalidArgument { .. }));
    assert!(bridge.commands().is_empty());
    assert!(central.locks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn android_connect_negotiates_mtu_and_spaces_disconnect() {
    let (central, bridge) = setup(Platform::Android);
    let device = central.device(device_id(1));
    let start = Instant::now();

    device.connect(ConnectOptions::default()).await.unwrap();
    // The post-connect MTU request skips the predelay.
    assert!(start.elapsed() < Duration::from_millis(350));
    assert_eq!(device.mtu_now(), 512);
    assert!(bridge.commands().iter().any(|c| matches!(
        c,
        BridgeCommand::RequestMtu(request) if request.mtu == 512
    )));

    device.disconnect(DisconnectOptions::default()).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert_eq!(device.mtu_now(), 23);
}

#[tokio::test(start_paused = true)]
async fn web_ids_stay_distinct_and_reach_the_bridge_verbatim() {
    let (central, bridge) = setup(Platform::Web);
    let first = central.device(DeviceId::new("aB3+x/Q=="));
    let second = central.device(DeviceId::new("Ab3+X/q=="));

    first.connect(ConnectOptions::default()).await.unwrap();
    assert!(first.is_connected());
    assert!(second.is_disconnected());

    let sent: Vec<_> = bridge
        .commands()
        .iter()
        .filter_map(|c| match c {
            BridgeCommand::Connect(request) => Some(request.device.as_str().to_owned()),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec!["aB3+x/Q==".to_owned()]);
}

// ── Preconditions ───────────────────────────────────────────────────

#[tokio::test]
async fn request_mtu_off_android_takes_no_lock() {
    let (central, bridge) = setup(Platform::Linux);
    let device = central.device(device_id(1));

    let err = device.request_mtu(247, MtuOptions::default()).await.unwrap_err();
    assert!(matches!(err, BleError::Unsupported { .. }));
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(err.operation(), Operation::RequestMtu);
    assert!(central.locks().is_empty());
    assert!(bridge.commands().is_empty());
}

#[tokio::test]
async fn post_connection_operations_require_a_link() {
    let (central, bridge) = setup(Platform::Android);
    let device = central.device(device_id(1));

    let err = device
        .discover_services(DiscoverOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BleError::NotConnected { .. }));

    let err = device.request_mtu(247, MtuOptions::default()).await.unwrap_err();
    assert!(matches!(err, BleError::NotConnected { .. }));

    let err = device.create_bond(BondOptions::default()).await.unwrap_err();
    assert!(matches!(err, BleError::NotConnected { .. }));

    assert!(central.locks().is_empty());
    assert!(bridge.commands().is_empty());
}

#[tokio::test]
async fn rssi_is_unavailable_on_web() {
    let (central, _bridge) = setup(Platform::Web);
    let err = central
        .device(device_id(1))
        .read_rssi(TimeoutOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BleError::Unsupported { .. }));
}

// ── Guards ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn adapter_off_beats_late_response() {
    let (central, bridge) = setup(Platform::Linux);
    let device = central.device(device_id(1));
    device.connect(ConnectOptions::default()).await.unwrap();

    bridge.set_delay(Operation::DiscoverServices, Duration::from_millis(100));
    let sink = bridge.sink();
    tokio::spawn(async move {
        sleep(Duration::from_millis(90)).await;
        sink.set_adapter_state(AdapterState::Off);
    });

    let start = Instant::now();
    let err = device
        .discover_services(DiscoverOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BleError::AdapterIsOff { .. }));
    assert_eq!(err.operation(), Operation::DiscoverServices);
    assert!(start.elapsed() < Duration::from_millis(100));
    assert!(!central.locks().is_locked(GLOBAL_LOCK));
}

#[tokio::test(start_paused = true)]
async fn link_loss_fails_outstanding_discovery() {
    let (central, bridge) = setup(Platform::Linux);
    let id = device_id(1);
    let device = central.device(id.clone());
    device.connect(ConnectOptions::default()).await.unwrap();
    bridge.silence(Operation::DiscoverServices);

    let dropper = Arc::clone(&bridge);
    tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        dropper.drop_link(&id);
    });

    let err = device
        .discover_services(DiscoverOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BleError::DeviceIsDisconnected { .. }));
    assert_eq!(err.kind(), ErrorKind::DeviceDisconnected);
}

#[tokio::test(start_paused = true)]
async fn link_loss_fails_outstanding_bond() {
    let (central, bridge) = setup(Platform::Android);
    let id = device_id(1);
    let device = central.device(id.clone());
    device.connect(no_mtu()).await.unwrap();
    bridge.silence(Operation::CreateBond);

    let dropper = Arc::clone(&bridge);
    tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        dropper.drop_link(&id);
    });

    let start = Instant::now();
    let err = device.create_bond(BondOptions::default()).await.unwrap_err();
    assert!(matches!(err, BleError::DeviceIsDisconnected { .. }));
    assert_eq!(err.operation(), Operation::CreateBond);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!central.locks().is_locked(GLOBAL_LOCK));
    assert_eq!(device.bond_state_now(), BondState::None);
}

// ── Failed native status ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failed_discovery_leaves_service_cache_alone() {
    let (central, bridge) = setup(Platform::Linux);
    let id = device_id(1);
    let device = central.device(id.clone());
    device.connect(ConnectOptions::default()).await.unwrap();

    bridge.script(
        Operation::DiscoverServices,
        true,
        vec![BridgeEvent::DiscoveredServices(DiscoveredServicesEvent {
            device: id.clone(),
            services: sample_services(),
            status: NativeStatus::failed(129, "GATT_INTERNAL_ERROR"),
        })],
    );
    let err = device
        .discover_services(DiscoverOptions::default())
        .await
        .unwrap_err();
    assert_platform_error(&err, Operation::DiscoverServices, 129, "GATT_INTERNAL_ERROR");

    assert!(central.registry().services(&id).is_none());
    assert!(device.services_list().is_empty());
    assert_eq!(bridge.count(Operation::SetNotifyValue), 0);
    assert!(!central.locks().is_locked(GLOBAL_LOCK));
}

#[tokio::test(start_paused = true)]
async fn failed_mtu_response_keeps_the_old_mtu() {
    let (central, bridge) = setup(Platform::Android);
    let id = device_id(1);
    let device = central.device(id.clone());
    device.connect(no_mtu()).await.unwrap();

    bridge.script(
        Operation::RequestMtu,
        true,
        vec![BridgeEvent::Mtu(MtuEvent {
            device: id.clone(),
            mtu: 247,
            status: NativeStatus::failed(4, "GATT_INVALID_PDU"),
        })],
    );
    let err = device.request_mtu(247, MtuOptions::default()).await.unwrap_err();
    assert_platform_error(&err, Operation::RequestMtu, 4, "GATT_INVALID_PDU");

    assert_eq!(device.mtu_now(), 23);
    assert!(!central.locks().is_locked(GLOBAL_LOCK));
}

#[tokio::test(start_paused = true)]
async fn failed_rssi_read_is_a_platform_error() {
    let (central, bridge) = setup(Platform::Linux);
    let id = device_id(1);
    let device = central.device(id.clone());
    device.connect(ConnectOptions::default()).await.unwrap();

    bridge.script(
        Operation::ReadRssi,
        true,
        vec![BridgeEvent::Rssi(RssiEvent {
            device: id.clone(),
            rssi: 0,
            status: NativeStatus::failed(133, "GATT_ERROR"),
        })],
    );
    let err = device.read_rssi(TimeoutOptions::default()).await.unwrap_err();
    assert_platform_error(&err, Operation::ReadRssi, 133, "GATT_ERROR");
    assert!(!central.locks().is_locked(GLOBAL_LOCK));

    // The next read goes through.
    assert_eq!(device.read_rssi(TimeoutOptions::default()).await.unwrap(), -60);
}

#[tokio::test(start_paused = true)]
async fn failed_descriptor_write_leaves_notifications_off() {
    let (central, bridge) = setup(Platform::Linux);
    let id = device_id(1);
    let device = central.device(id.clone());
    device.connect(ConnectOptions::default()).await.unwrap();

    bridge.script(
        Operation::SetNotifyValue,
        true,
        vec![BridgeEvent::DescriptorWritten(DescriptorWrittenEvent {
            device: id.clone(),
            service: GENERIC_ATTRIBUTE_SERVICE,
            characteristic: SERVICES_CHANGED_CHARACTERISTIC,
            descriptor: CLIENT_CHARACTERISTIC_CONFIG,
            value: vec![0x02, 0x00],
            status: NativeStatus::failed(3, "GATT_WRITE_NOT_PERMITTED"),
        })],
    );
    let err = device
        .discover_services(DiscoverOptions::default())
        .await
        .unwrap_err();
    assert_platform_error(&err, Operation::SetNotifyValue, 3, "GATT_WRITE_NOT_PERMITTED");

    assert!(!central.registry().is_notifying(&id, SERVICES_CHANGED_CHARACTERISTIC));
    assert!(!central.locks().is_locked(GLOBAL_LOCK));

    // The next discovery retries the subscription.
    device.discover_services(DiscoverOptions::default()).await.unwrap();
    assert_eq!(bridge.count(Operation::SetNotifyValue), 2);
    assert!(central.registry().is_notifying(&id, SERVICES_CHANGED_CHARACTERISTIC));
}

// ── Services ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn services_list_round_trips_primary_services() {
    let (central, bridge) = setup(Platform::Linux);
    let device = central.device(device_id(1));
    device.connect(ConnectOptions::default()).await.unwrap();
    assert!(device.services_list().is_empty());

    let discovered = device.discover_services(DiscoverOptions::default()).await.unwrap();
    let uuids: Vec<_> = discovered.iter().map(|s| s.uuid).collect();
    assert_eq!(uuids, vec![GENERIC_ATTRIBUTE_SERVICE, ble_uuid(HEART_RATE_SERVICE)]);
    assert_eq!(device.services_list(), discovered);
    assert_eq!(device.services_list(), discovered);

    let again = device.discover_services(DiscoverOptions::default()).await.unwrap();
    assert_eq!(again, discovered);

    // Subscribed once; the second discovery sees it already notifying.
    assert_eq!(bridge.count(Operation::SetNotifyValue), 1);
}

#[tokio::test(start_paused = true)]
async fn services_changed_subscription_can_be_skipped() {
    let (central, bridge) = setup(Platform::Linux);
    let device = central.device(device_id(1));
    device.connect(ConnectOptions::default()).await.unwrap();

    device
        .discover_services(DiscoverOptions {
            subscribe_to_services_changed: Some(false),
            timeout: None,
        })
        .await
        .unwrap();
    assert_eq!(bridge.count(Operation::SetNotifyValue), 0);
}

#[tokio::test(start_paused = true)]
async fn apple_stacks_subscribe_to_services_changed_themselves() {
    let (central, bridge) = setup(Platform::Ios);
    let device = central.device(device_id(1));
    device.connect(ConnectOptions::default()).await.unwrap();
    device.discover_services(DiscoverOptions::default()).await.unwrap();
    assert_eq!(bridge.count(Operation::SetNotifyValue), 0);
}

// ── Android link tuning ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn android_link_hints_are_dispatched() {
    let (central, bridge) = setup(Platform::Android);
    let device = central.device(device_id(1));
    device.connect(no_mtu()).await.unwrap();

    device
        .request_connection_priority(ConnectionPriority::High)
        .await
        .unwrap();
    device
        .set_preferred_phy(PhySet::LE_2M, PhySet::LE_2M, PhyCoding::NoPreferred)
        .await
        .unwrap();
    device.clear_gatt_cache().await.unwrap();

    assert_eq!(bridge.count(Operation::RequestConnectionPriority), 1);
    assert_eq!(bridge.count(Operation::SetPreferredPhy), 1);
    assert_eq!(bridge.count(Operation::ClearGattCache), 1);

    let err = device
        .set_preferred_phy(PhySet::default(), PhySet::LE_1M, PhyCoding::NoPreferred)
        .await
        .unwrap_err();
    assert!(matches!(err, BleError::InvalidArgument { .. }));
}

#[tokio::test(start_paused = true)]
async fn explicit_mtu_request_waits_out_predelay() {
    let (central, _bridge) = setup(Platform::Android);
    let device = central.device(device_id(1));
    device.connect(no_mtu()).await.unwrap();
    assert_eq!(device.mtu_now(), 23);

    let start = Instant::now();
    let mtu = device
        .request_mtu(
            247,
            MtuOptions {
                predelay: Some(Duration::from_millis(100)),
                timeout: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(mtu, 247);
    assert_eq!(device.mtu_now(), 247);
    assert!(start.elapsed() >= Duration::from_millis(100));
}

// ── Bonding ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn create_bond_resolves_on_terminal_state() {
    let (central, bridge) = setup(Platform::Android);
    let device = central.device(device_id(1));
    device.connect(no_mtu()).await.unwrap();

    device.create_bond(BondOptions::default()).await.unwrap();
    assert_eq!(device.bond_state_now(), BondState::Bonded);
    assert_eq!(device.prev_bond_state(), Some(BondState::Bonding));

    // Already bonded: the bridge reports no change and nothing is awaited.
    device.create_bond(BondOptions::default()).await.unwrap();
    assert_eq!(bridge.count(Operation::CreateBond), 2);
}

#[tokio::test(start_paused = true)]
async fn create_bond_reports_unexpected_terminal_state() {
    let (central, bridge) = setup(Platform::Android);
    let id = device_id(1);
    let device = central.device(id.clone());
    device.connect(no_mtu()).await.unwrap();

    bridge.script(
        Operation::CreateBond,
        true,
        vec![bond(&id, BondState::Bonding), bond(&id, BondState::None)],
    );
    let err = device.create_bond(BondOptions::default()).await.unwrap_err();
    assert!(matches!(
        err,
        BleError::BondFailed {
            state: BondState::None,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn create_bond_is_android_only() {
    let (central, _bridge) = setup(Platform::MacOs);
    let device = central.device(device_id(1));
    device.connect(ConnectOptions::default()).await.unwrap();
    let err = device.create_bond(BondOptions::default()).await.unwrap_err();
    assert!(matches!(err, BleError::Unsupported { .. }));
}

// createBond needs a live link and a link loss fails it; removeBond works on
// a disconnected device and only guards the link if it was up at the start.
#[tokio::test(start_paused = true)]
async fn remove_bond_guards_link_only_when_connected_at_start() {
    let (central, bridge) = setup(Platform::Android);
    let id = device_id(1);
    let device = central.device(id.clone());

    bridge.mark_bonded(&id);
    device.remove_bond(TimeoutOptions::default()).await.unwrap();
    assert_eq!(bridge.count(Operation::RemoveBond), 1);

    device.connect(no_mtu()).await.unwrap();
    bridge.mark_bonded(&id);
    bridge.silence(Operation::RemoveBond);
    let dropper = Arc::clone(&bridge);
    let dropped = id.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        dropper.drop_link(&dropped);
    });

    let err = device.remove_bond(TimeoutOptions::default()).await.unwrap_err();
    assert!(matches!(err, BleError::DeviceIsDisconnected { .. }));
}

#[tokio::test(start_paused = true)]
async fn remove_bond_times_out_with_its_own_deadline() {
    let (central, bridge) = setup(Platform::Android);
    let id = device_id(1);
    let device = central.device(id.clone());
    bridge.mark_bonded(&id);
    bridge.silence(Operation::RemoveBond);

    let err = device
        .remove_bond(TimeoutOptions::new(Duration::from_secs(2)))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.operation(), Operation::RemoveBond);
}
