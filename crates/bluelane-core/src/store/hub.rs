// ── Event fan-out ──
//
// One broadcast channel per record category plus a watch channel for the
// adapter power state. Correlators and derived streams subscribe here.

use tokio::sync::{broadcast, watch};

use crate::bridge::{
    BondStateEvent, ConnectionStateEvent, DescriptorWrittenEvent, DiscoveredServicesEvent,
    MtuEvent, RssiEvent, ServicesResetEvent,
};
use crate::model::AdapterState;

/// Per-category broadcast channels for bridge records.
pub struct EventHub {
    pub(crate) connection: broadcast::Sender<ConnectionStateEvent>,
    pub(crate) services: broadcast::Sender<DiscoveredServicesEvent>,
    pub(crate) rssi: broadcast::Sender<RssiEvent>,
    pub(crate) mtu: broadcast::Sender<MtuEvent>,
    pub(crate) bond: broadcast::Sender<BondStateEvent>,
    pub(crate) services_reset: broadcast::Sender<ServicesResetEvent>,
    pub(crate) descriptor_written: broadcast::Sender<DescriptorWrittenEvent>,
    pub(crate) adapter: watch::Sender<AdapterState>,
}

impl EventHub {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (adapter, _) = watch::channel(AdapterState::Unknown);
        Self {
            connection: broadcast::channel(capacity).0,
            services: broadcast::channel(capacity).0,
            rssi: broadcast::channel(capacity).0,
            mtu: broadcast::channel(capacity).0,
            bond: broadcast::channel(capacity).0,
            services_reset: broadcast::channel(capacity).0,
            descriptor_written: broadcast::channel(capacity).0,
            adapter,
        }
    }

    // ── Raw subscriptions ────────────────────────────────────────────

    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionStateEvent> {
        self.connection.subscribe()
    }

    pub fn subscribe_services(&self) -> broadcast::Receiver<DiscoveredServicesEvent> {
        self.services.subscribe()
    }

    pub fn subscribe_rssi(&self) -> broadcast::Receiver<RssiEvent> {
        self.rssi.subscribe()
    }

    pub fn subscribe_mtu(&self) -> broadcast::Receiver<MtuEvent> {
        self.mtu.subscribe()
    }

    pub fn subscribe_bond(&self) -> broadcast::Receiver<BondStateEvent> {
        self.bond.subscribe()
    }

    pub fn subscribe_services_reset(&self) -> broadcast::Receiver<ServicesResetEvent> {
        self.services_reset.subscribe()
    }

    pub fn subscribe_descriptor_written(&self) -> broadcast::Receiver<DescriptorWrittenEvent> {
        self.descriptor_written.subscribe()
    }

    pub fn subscribe_adapter(&self) -> watch::Receiver<AdapterState> {
        self.adapter.subscribe()
    }

    pub fn adapter_state(&self) -> AdapterState {
        *self.adapter.borrow()
    }
}
