#![allow(clippy::unwrap_used, dead_code)]
// Scripted in-memory bridge shared by the integration tests.
//
// Keeps just enough link/bond state to answer like a real stack would,
// records every command it receives, and publishes its responses into the
// central's `EventSink` after a configurable delay.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures_util::future::BoxFuture;

use bluelane_core::bridge::{
    BondStateEvent, CONNECTION_CANCELED_CODE, ConnectionStateEvent, DescriptorWrittenEvent,
    DiscoveredServicesEvent, MtuEvent, RssiEvent,
};
use bluelane_core::model::{
    CLIENT_CHARACTERISTIC_CONFIG, GENERIC_ATTRIBUTE_SERVICE, SERVICES_CHANGED_CHARACTERISTIC,
    ble_uuid,
};
use bluelane_core::{
    AdapterState, BluetoothCharacteristic, BluetoothService, BondState, Bridge, BridgeCommand,
    BridgeError, BridgeEvent, Central, CharacteristicProperties, ConnectionState, DeviceId,
    DisconnectReason, EngineConfig, EventSink, NativeStatus, Operation, Platform,
};

pub const DEFAULT_DELAY: Duration = Duration::from_millis(10);
pub const HEART_RATE_SERVICE: u16 = 0x180D;
pub const BATTERY_SERVICE: u16 = 0x180F;

// ── Setup ───────────────────────────────────────────────────────────

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A central on `platform` with the adapter powered on and a mock bridge attached.
pub fn setup(platform: Platform) -> (Central, Arc<MockBridge>) {
    setup_with(EngineConfig::for_platform(platform))
}

pub fn setup_with(config: EngineConfig) -> (Central, Arc<MockBridge>) {
    init_tracing();
    let bridge = Arc::new(MockBridge::default());
    let central = Central::new(config, Arc::clone(&bridge) as Arc<dyn Bridge>);
    bridge.attach(central.event_sink());
    central.event_sink().set_adapter_state(AdapterState::On);
    (central, bridge)
}

pub fn device_id(n: u8) -> DeviceId {
    DeviceId::new(format!("AA:BB:CC:DD:EE:{n:02X}"))
}

/// GATT service with an indicatable services-changed characteristic, one
/// primary application service and one secondary service.
pub fn sample_services() -> Vec<BluetoothService> {
    vec![
        BluetoothService {
            uuid: GENERIC_ATTRIBUTE_SERVICE,
            primary: true,
            characteristics: vec![BluetoothCharacteristic {
                uuid: SERVICES_CHANGED_CHARACTERISTIC,
                properties: CharacteristicProperties {
                    indicate: true,
                    ..CharacteristicProperties::default()
                },
                descriptors: vec![CLIENT_CHARACTERISTIC_CONFIG],
            }],
            included_services: vec![],
        },
        BluetoothService {
            uuid: ble_uuid(HEART_RATE_SERVICE),
            primary: true,
            characteristics: vec![],
            included_services: vec![ble_uuid(BATTERY_SERVICE)],
        },
        BluetoothService {
            uuid: ble_uuid(BATTERY_SERVICE),
            primary: false,
            characteristics: vec![],
            included_services: vec![],
        },
    ]
}

// ── MockBridge ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockBridge {
    sink: OnceLock<EventSink>,
    state: Mutex<MockState>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

#[derive(Default)]
struct MockState {
    commands: Vec<BridgeCommand>,
    connected: HashSet<DeviceId>,
    pending_connect: HashSet<DeviceId>,
    bonded: HashSet<DeviceId>,
    services: Option<Vec<BluetoothService>>,
    silent: HashSet<Operation>,
    delays: HashMap<Operation, Duration>,
    scripted: HashMap<Operation, (bool, Vec<BridgeEvent>)>,
    failures: HashMap<Operation, BridgeError>,
    inline: bool,
}

impl MockBridge {
    pub fn attach(&self, sink: EventSink) {
        assert!(self.sink.set(sink).is_ok(), "bridge attached twice");
    }

    pub fn sink(&self) -> EventSink {
        self.sink.get().cloned().unwrap()
    }

    /// Accept `operation` but never answer it.
    pub fn silence(&self, operation: Operation) {
        self.state.lock().unwrap().silent.insert(operation);
    }

    pub fn set_delay(&self, operation: Operation, delay: Duration) {
        self.state.lock().unwrap().delays.insert(operation, delay);
    }

    /// Publish responses before `dispatch` returns.
    pub fn respond_inline(&self) {
        self.state.lock().unwrap().inline = true;
    }

    /// Answer the next `operation` with exactly these records.
    pub fn script(&self, operation: Operation, changed: bool, events: Vec<BridgeEvent>) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .insert(operation, (changed, events));
    }

    /// Refuse the next `operation` at dispatch.
    pub fn fail(&self, operation: Operation, error: BridgeError) {
        self.state.lock().unwrap().failures.insert(operation, error);
    }

    pub fn set_services(&self, services: Vec<BluetoothService>) {
        self.state.lock().unwrap().services = Some(services);
    }

    pub fn mark_bonded(&self, device: &DeviceId) {
        self.state.lock().unwrap().bonded.insert(device.clone());
    }

    /// The peer dropped the link on its own.
    pub fn drop_link(&self, device: &DeviceId) {
        self.state.lock().unwrap().connected.remove(device);
        self.sink().emit(disconnected(device, 8, "link supervision timeout"));
    }

    pub fn commands(&self) -> Vec<BridgeCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .unwrap()
            .commands
            .iter()
            .filter(|c| c.method() == operation)
            .count()
    }

    /// Highest number of commands that were awaiting their response at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Bridge for MockBridge {
    fn dispatch(&self, command: BridgeCommand) -> BoxFuture<'_, Result<bool, BridgeError>> {
        Box::pin(async move {
            let sink = self.sink();
            let method = command.method();
            let (changed, events, delay, inline) = {
                let mut state = self.state.lock().unwrap();
                state.commands.push(command.clone());
                if let Some(error) = state.failures.remove(&method) {
                    return Err(error);
                }
                let silent = state.silent.contains(&method);
                let scripted = state.scripted.remove(&method);
                let (changed, events) = match scripted {
                    Some(scripted) => scripted,
                    None => state.respond(&command, silent),
                };
                let events = if silent { Vec::new() } else { events };
                let delay = state.delays.get(&method).copied().unwrap_or(DEFAULT_DELAY);
                (changed, events, delay, state.inline)
            };

            if events.is_empty() {
                return Ok(changed);
            }

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if inline {
                for event in events {
                    sink.emit(event);
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            } else {
                let in_flight = Arc::clone(&self.in_flight);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    for event in events {
                        sink.emit(event);
                    }
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                });
            }
            Ok(changed)
        })
    }
}

impl MockState {
    fn respond(&mut self, command: &BridgeCommand, silent: bool) -> (bool, Vec<BridgeEvent>) {
        let device = command.device().clone();
        match command {
            BridgeCommand::Connect(_) => {
                if self.connected.contains(&device) {
                    (false, vec![])
                } else if silent {
                    self.pending_connect.insert(device);
                    (true, vec![])
                } else {
                    self.connected.insert(device.clone());
                    (
                        true,
                        vec![
                            connection(&device, ConnectionState::Connecting),
                            connection(&device, ConnectionState::Connected),
                        ],
                    )
                }
            }
            BridgeCommand::Disconnect(_) => {
                if self.pending_connect.remove(&device) {
                    (
                        true,
                        vec![disconnected(&device, CONNECTION_CANCELED_CODE, "connection canceled")],
                    )
                } else if self.connected.remove(&device) {
                    (true, vec![disconnected(&device, 22, "local host terminated")])
                } else {
                    (false, vec![])
                }
            }
            BridgeCommand::DiscoverServices(_) => (
                true,
                vec![BridgeEvent::DiscoveredServices(DiscoveredServicesEvent {
                    device,
                    services: self.services.clone().unwrap_or_else(sample_services),
                    status: NativeStatus::ok(),
                })],
            ),
            BridgeCommand::ReadRssi(_) => (
                true,
                vec![BridgeEvent::Rssi(RssiEvent {
                    device,
                    rssi: -60,
                    status: NativeStatus::ok(),
                })],
            ),
            BridgeCommand::RequestMtu(request) => (
                true,
                vec![BridgeEvent::Mtu(MtuEvent {
                    device,
                    mtu: request.mtu.min(517),
                    status: NativeStatus::ok(),
                })],
            ),
            BridgeCommand::RequestConnectionPriority(_)
            | BridgeCommand::SetPreferredPhy(_)
            | BridgeCommand::ClearGattCache(_) => (true, vec![]),
            BridgeCommand::CreateBond(_) => {
                if self.bonded.insert(device.clone()) {
                    (
                        true,
                        vec![
                            bond(&device, BondState::Bonding),
                            bond(&device, BondState::Bonded),
                        ],
                    )
                } else {
                    (false, vec![])
                }
            }
            BridgeCommand::RemoveBond(_) => {
                if self.bonded.remove(&device) {
                    (true, vec![bond(&device, BondState::None)])
                } else {
                    (false, vec![])
                }
            }
            BridgeCommand::SetNotifyValue(request) => (
                true,
                vec![BridgeEvent::DescriptorWritten(DescriptorWrittenEvent {
                    device,
                    service: request.service,
                    characteristic: request.characteristic,
                    descriptor: CLIENT_CHARACTERISTIC_CONFIG,
                    value: if request.enable { vec![0x02, 0x00] } else { vec![0x00, 0x00] },
                    status: NativeStatus::ok(),
                })],
            ),
        }
    }
}

// ── Record builders ─────────────────────────────────────────────────

pub fn connection(device: &DeviceId, state: ConnectionState) -> BridgeEvent {
    BridgeEvent::ConnectionState(ConnectionStateEvent {
        device: device.clone(),
        state,
        reason: None,
    })
}

pub fn disconnected(device: &DeviceId, code: i32, description: &str) -> BridgeEvent {
    BridgeEvent::ConnectionState(ConnectionStateEvent {
        device: device.clone(),
        state: ConnectionState::Disconnected,
        reason: Some(DisconnectReason::new(code, description)),
    })
}

pub fn bond(device: &DeviceId, state: BondState) -> BridgeEvent {
    BridgeEvent::BondState(BondStateEvent {
        device: device.clone(),
        state,
    })
}
