// ── Event ingestion ──
//
// The only writer of observed device state. Each record is applied to the
// registry first and broadcast second, so by the time any correlator or
// stream sees a record the caches already reflect it.

use std::sync::Arc;

use tracing::{info, trace};

use super::{DeviceRegistry, EventHub};
use crate::bridge::BridgeEvent;
use crate::model::AdapterState;

/// Handle the bridge uses to publish native records. Cheap to clone.
#[derive(Clone)]
pub struct EventSink {
    registry: Arc<DeviceRegistry>,
    hub: Arc<EventHub>,
}

impl EventSink {
    pub(crate) fn new(registry: Arc<DeviceRegistry>, hub: Arc<EventHub>) -> Self {
        Self { registry, hub }
    }

    /// Ingest one record. Never blocks; records nobody listens for are dropped.
    pub fn emit(&self, event: BridgeEvent) {
        trace!(device = %event.device(), ?event, "bridge event");

        // Send errors only mean there are no subscribers right now.
        match event {
            BridgeEvent::ConnectionState(e) => {
                self.registry.apply_connection_state(&e);
                let _ = self.hub.connection.send(e);
            }
            BridgeEvent::DiscoveredServices(e) => {
                self.registry.apply_discovered_services(&e);
                let _ = self.hub.services.send(e);
            }
            BridgeEvent::Rssi(e) => {
                let _ = self.hub.rssi.send(e);
            }
            BridgeEvent::Mtu(e) => {
                self.registry.apply_mtu(&e);
                let _ = self.hub.mtu.send(e);
            }
            BridgeEvent::BondState(e) => {
                self.registry.apply_bond_state(&e);
                let _ = self.hub.bond.send(e);
            }
            BridgeEvent::ServicesReset(e) => {
                self.registry.apply_services_reset(&e.device);
                let _ = self.hub.services_reset.send(e);
            }
            BridgeEvent::DescriptorWritten(e) => {
                self.registry.apply_descriptor_written(&e);
                let _ = self.hub.descriptor_written.send(e);
            }
        }
    }

    pub fn set_adapter_state(&self, state: AdapterState) {
        let previous = self.hub.adapter.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "adapter state changed");
        }
    }
}
