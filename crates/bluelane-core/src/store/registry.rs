// ── Device registry ──
//
// Last-known state for every peripheral the process has heard about.
// Observed state (connection, MTU, bond, services, notify flags, disconnect
// reason) is written only by `EventSink` while ingesting bridge records.
// Intent state (auto-connect set, connect timestamps) is written only by the
// operations that own it. Entries are created on first observation and never
// torn down.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bridge::{
    BondStateEvent, ConnectionStateEvent, DescriptorWrittenEvent, DiscoveredServicesEvent,
    MtuEvent,
};
use crate::model::{
    BluetoothService, BondState, CLIENT_CHARACTERISTIC_CONFIG, ConnectionState, DeviceId,
    DisconnectReason,
};

/// ATT MTU every link starts with before negotiation.
pub const DEFAULT_MTU: u16 = 23;

/// Watchable per-device values. Each sender keeps its latest value even with
/// no receivers, so late subscribers are seeded with the current state.
struct DeviceSlot {
    connection: watch::Sender<ConnectionState>,
    mtu: watch::Sender<u16>,
    bond: watch::Sender<BondState>,
}

impl DeviceSlot {
    fn new() -> Self {
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        let (mtu, _) = watch::channel(DEFAULT_MTU);
        let (bond, _) = watch::channel(BondState::None);
        Self {
            connection,
            mtu,
            bond,
        }
    }
}

/// Process-wide cache of per-device state, keyed by [`DeviceId`].
///
/// Reads never block and never create entries.
#[derive(Default)]
pub struct DeviceRegistry {
    slots: DashMap<DeviceId, Arc<DeviceSlot>>,
    disconnect_reasons: DashMap<DeviceId, DisconnectReason>,
    prev_bond_states: DashMap<DeviceId, BondState>,
    services: DashMap<DeviceId, Arc<Vec<BluetoothService>>>,
    notifying: DashSet<(DeviceId, Uuid)>,
    auto_connect: DashSet<DeviceId>,
    connect_timestamps: DashMap<DeviceId, Instant>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Snapshot reads ───────────────────────────────────────────────

    pub fn connection_state(&self, device: &DeviceId) -> ConnectionState {
        self.slots
            .get(device)
            .map_or(ConnectionState::Disconnected, |slot| *slot.connection.borrow())
    }

    pub fn mtu(&self, device: &DeviceId) -> u16 {
        self.slots
            .get(device)
            .map_or(DEFAULT_MTU, |slot| *slot.mtu.borrow())
    }

    pub fn bond_state(&self, device: &DeviceId) -> BondState {
        self.slots
            .get(device)
            .map_or(BondState::None, |slot| *slot.bond.borrow())
    }

    pub fn prev_bond_state(&self, device: &DeviceId) -> Option<BondState> {
        self.prev_bond_states.get(device).map(|r| *r.value())
    }

    pub fn disconnect_reason(&self, device: &DeviceId) -> Option<DisconnectReason> {
        self.disconnect_reasons.get(device).map(|r| r.value().clone())
    }

    /// Full service tree from the last successful discovery, secondary services included.
    pub fn services(&self, device: &DeviceId) -> Option<Arc<Vec<BluetoothService>>> {
        self.services.get(device).map(|r| Arc::clone(r.value()))
    }

    /// Primary services from the last successful discovery.
    pub fn primary_services(&self, device: &DeviceId) -> Vec<BluetoothService> {
        self.services(device)
            .map(|all| all.iter().filter(|s| s.primary).cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_notifying(&self, device: &DeviceId, characteristic: Uuid) -> bool {
        self.notifying.contains(&(device.clone(), characteristic))
    }

    pub fn is_auto_connect(&self, device: &DeviceId) -> bool {
        self.auto_connect.contains(device)
    }

    pub fn connect_timestamp(&self, device: &DeviceId) -> Option<Instant> {
        self.connect_timestamps.get(device).map(|r| *r.value())
    }

    pub fn connected_devices(&self) -> Vec<DeviceId> {
        self.slots
            .iter()
            .filter(|entry| entry.value().connection.borrow().is_connected())
            .map(|entry| entry.key().clone())
            .collect()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_connection(&self, device: &DeviceId) -> watch::Receiver<ConnectionState> {
        self.slot(device).connection.subscribe()
    }

    pub fn subscribe_mtu(&self, device: &DeviceId) -> watch::Receiver<u16> {
        self.slot(device).mtu.subscribe()
    }

    pub fn subscribe_bond(&self, device: &DeviceId) -> watch::Receiver<BondState> {
        self.slot(device).bond.subscribe()
    }

    // ── Intent state (owned by operations) ───────────────────────────

    pub(crate) fn add_auto_connect(&self, device: &DeviceId) {
        self.auto_connect.insert(device.clone());
    }

    pub(crate) fn remove_auto_connect(&self, device: &DeviceId) {
        self.auto_connect.remove(device);
    }

    pub(crate) fn record_connect(&self, device: &DeviceId) {
        self.connect_timestamps.insert(device.clone(), Instant::now());
    }

    pub(crate) fn clear_connect(&self, device: &DeviceId) {
        self.connect_timestamps.remove(device);
    }

    // ── Observed state (owned by event ingestion) ────────────────────

    pub(crate) fn apply_connection_state(&self, event: &ConnectionStateEvent) {
        let slot = self.slot(&event.device);
        let previous = slot.connection.send_replace(event.state);
        if previous != event.state {
            info!(device = %event.device, from = %previous, to = %event.state, "connection state changed");
        }

        if event.state.is_disconnected() {
            if let Some(reason) = &event.reason {
                self.disconnect_reasons
                    .insert(event.device.clone(), reason.clone());
            }
            // A new link renegotiates from scratch and its CCCDs are reset.
            slot.mtu.send_replace(DEFAULT_MTU);
            self.notifying.retain(|(device, _)| device != &event.device);
        }
    }

    pub(crate) fn apply_discovered_services(&self, event: &DiscoveredServicesEvent) {
        if !event.status.success {
            return;
        }
        debug!(device = %event.device, count = event.services.len(), "caching discovered services");
        self.services
            .insert(event.device.clone(), Arc::new(event.services.clone()));
    }

    pub(crate) fn apply_mtu(&self, event: &MtuEvent) {
        if event.status.success {
            self.slot(&event.device).mtu.send_replace(event.mtu);
        }
    }

    pub(crate) fn apply_bond_state(&self, event: &BondStateEvent) {
        let previous = self.slot(&event.device).bond.send_replace(event.state);
        if previous != event.state {
            self.prev_bond_states.insert(event.device.clone(), previous);
            debug!(device = %event.device, from = %previous, to = %event.state, "bond state changed");
        }
    }

    pub(crate) fn apply_services_reset(&self, device: &DeviceId) {
        if self.services.remove(device).is_some() {
            debug!(%device, "services reset; cached tree dropped");
        }
    }

    pub(crate) fn apply_descriptor_written(&self, event: &DescriptorWrittenEvent) {
        if !event.status.success || event.descriptor != CLIENT_CHARACTERISTIC_CONFIG {
            return;
        }
        let key = (event.device.clone(), event.characteristic);
        if event.value.iter().any(|b| *b != 0) {
            self.notifying.insert(key);
        } else {
            self.notifying.remove(&key);
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn slot(&self, device: &DeviceId) -> Arc<DeviceSlot> {
        Arc::clone(
            self.slots
                .entry(device.clone())
                .or_insert_with(|| Arc::new(DeviceSlot::new()))
                .value(),
        )
    }
}
