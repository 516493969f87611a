// ── Per-device operations ──
//
// Every operation follows the same template: check preconditions without
// taking a lock, acquire the lock(s), subscribe the correlator, dispatch,
// then await the correlated record under a deadline and guards when the
// bridge reports that something changed. Locks are RAII tokens, so every
// exit path releases them.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::bridge::{
    BondRequest, BondStateEvent, BridgeCommand, CONNECTION_CANCELED_CODE, ConnectRequest,
    ConnectionPriorityRequest, ConnectionStateEvent, DeviceRequest, MtuRequest,
    PreferredPhyRequest, ServicesResetEvent, SetNotifyValueRequest,
};
use crate::central::CentralInner;
use crate::config::{
    BondOptions, ConnectOptions, DisconnectOptions, DiscoverOptions, MtuOptions, TimeoutOptions,
};
use crate::correlator::Correlator;
use crate::error::BleError;
use crate::guard;
use crate::lock::{DISCONNECT_LOCK, GLOBAL_LOCK};
use crate::model::service::find_services_changed;
use crate::model::{
    BluetoothService, BondState, CLIENT_CHARACTERISTIC_CONFIG, ConnectionPriority,
    ConnectionState, DeviceId, DisconnectReason, GENERIC_ATTRIBUTE_SERVICE, Operation, PhyCoding,
    PhySet,
};
use crate::stream::{self, StateStream};

/// Handle to one peripheral. Cheap to clone; all handles share the
/// central's locks and caches.
#[derive(Clone)]
pub struct BleDevice {
    id: DeviceId,
    inner: Arc<CentralInner>,
}

impl BleDevice {
    pub(crate) fn new(id: DeviceId, inner: Arc<CentralInner>) -> Self {
        Self { id, inner }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    // ── Connection ───────────────────────────────────────────────────

    /// Connect and wait for the link, then negotiate the MTU where the
    /// stack needs an explicit request.
    ///
    /// With `auto_connect` the call returns right after dispatch; watch
    /// [`connection_state_stream`](Self::connection_state_stream) for the result.
    pub async fn connect(&self, options: ConnectOptions) -> Result<(), BleError> {
        self.connect_with(options, false).await
    }

    /// Re-issue the auto-connect after a link loss. Does nothing if the
    /// device left auto-connect or the adapter went off while this call
    /// queued for the locks.
    pub(crate) async fn reconnect(&self) -> Result<(), BleError> {
        self.connect_with(ConnectOptions::auto(), true).await
    }

    async fn connect_with(&self, options: ConnectOptions, reconnect: bool) -> Result<(), BleError> {
        let operation = Operation::Connect;
        if options.auto_connect && options.mtu.is_some() {
            return Err(BleError::InvalidArgument {
                operation,
                reason: "mtu cannot be requested together with auto_connect".into(),
            });
        }
        let platform = self.inner.config.platform;
        let timeout = options.timeout.unwrap_or(self.inner.config.timeouts.connect);

        {
            let mut disconnect_lock = self.inner.locks.acquire(DISCONNECT_LOCK).await;
            let _global = self.inner.locks.acquire(GLOBAL_LOCK).await;

            if reconnect {
                if !self.inner.registry.is_auto_connect(&self.id)
                    || !self.inner.hub.adapter_state().is_on()
                {
                    debug!(device = %self.id, "auto-connect withdrawn while queued; not reconnecting");
                    return Ok(());
                }
            } else if options.auto_connect {
                self.inner.registry.add_auto_connect(&self.id);
            }
            if platform.needs_disconnect_gap() {
                self.inner.registry.record_connect(&self.id);
            }

            let response = self.subscribe_connection_outcome(operation, ConnectionState::is_terminal);

            let changed = self
                .dispatch(BridgeCommand::Connect(ConnectRequest {
                    device: self.id.clone(),
                    auto_connect: options.auto_connect,
                }))
                .await?;

            // From here on a `disconnect(queue = false)` may cancel us.
            disconnect_lock.release();

            if changed && !options.auto_connect {
                let event = match self.await_guarded(operation, timeout, false, response.first()).await {
                    Ok(event) => event,
                    Err(e) => {
                        if e.is_timeout() {
                            self.cancel_connect().await;
                        }
                        return Err(e);
                    }
                };
                if event.state.is_disconnected() {
                    return Err(connect_failure(event.reason));
                }
            }
        }

        if !options.auto_connect && platform.negotiates_mtu_after_connect() && self.is_connected() {
            if let Some(mtu) = options.mtu {
                // Connect-time request: no unsolicited update to wait out.
                let options = MtuOptions {
                    predelay: Some(Duration::ZERO),
                    timeout: None,
                };
                self.request_mtu(mtu, options).await?;
            }
        }
        Ok(())
    }

    /// Disconnect and wait until the link is down. Also leaves auto-connect.
    pub async fn disconnect(&self, options: DisconnectOptions) -> Result<(), BleError> {
        let operation = Operation::Disconnect;
        let config = &self.inner.config;
        let timeout = options.timeout.unwrap_or(config.timeouts.disconnect);

        let _disconnect_lock = self.inner.locks.acquire(DISCONNECT_LOCK).await;
        let _global = if options.queue {
            Some(self.inner.locks.acquire(GLOBAL_LOCK).await)
        } else {
            None
        };

        self.inner.registry.remove_auto_connect(&self.id);

        if config.platform.needs_disconnect_gap() {
            if let Some(connected_at) = self.inner.registry.connect_timestamp(&self.id) {
                let min_gap = options.min_gap.unwrap_or(config.disconnect_min_gap);
                let wait = min_gap.saturating_sub(connected_at.elapsed());
                if !wait.is_zero() {
                    debug!(device = %self.id, wait_ms = wait.as_millis(), "delaying disconnect after recent connect");
                    tokio::time::sleep(wait).await;
                }
            }
        }

        let response =
            self.subscribe_connection_outcome(operation, ConnectionState::is_disconnected);

        let changed = self
            .dispatch(BridgeCommand::Disconnect(self.device_request()))
            .await?;
        if changed {
            self.await_guarded(operation, timeout, false, response.first())
                .await?;
        }

        if config.platform.needs_disconnect_gap() {
            self.inner.registry.clear_connect(&self.id);
        }
        Ok(())
    }

    // ── GATT ─────────────────────────────────────────────────────────

    /// Discover the service tree and return its primary services.
    ///
    /// Afterwards subscribes to the services-changed characteristic on
    /// stacks that do not do so themselves.
    pub async fn discover_services(
        &self,
        options: DiscoverOptions,
    ) -> Result<Vec<BluetoothService>, BleError> {
        let operation = Operation::DiscoverServices;
        self.ensure_connected(operation)?;
        let config = &self.inner.config;
        let timeout = options.timeout.unwrap_or(config.timeouts.discover_services);

        let services = {
            let _global = self.inner.locks.acquire(GLOBAL_LOCK).await;

            let id = self.id.clone();
            let response = Correlator::subscribe(operation, &self.inner.hub.services, move |e| {
                e.device == id
            });

            let changed = self
                .dispatch(BridgeCommand::DiscoverServices(self.device_request()))
                .await?;
            if changed {
                let event = self
                    .await_guarded(operation, timeout, true, response.first())
                    .await?;
                event.status.check(operation)?;
            }
            self.inner.registry.primary_services(&self.id)
        };

        let subscribe = options
            .subscribe_to_services_changed
            .unwrap_or(config.subscribe_to_services_changed);
        if subscribe && config.platform.needs_services_changed_subscription() {
            self.subscribe_to_services_changed().await?;
        }
        Ok(services)
    }

    pub async fn read_rssi(&self, options: TimeoutOptions) -> Result<i32, BleError> {
        let operation = Operation::ReadRssi;
        if !self.inner.config.platform.supports_rssi() {
            return Err(BleError::Unsupported {
                operation,
                required: "a native platform",
            });
        }
        self.ensure_connected(operation)?;
        let timeout = options.timeout.unwrap_or(self.inner.config.timeouts.read_rssi);

        let _global = self.inner.locks.acquire(GLOBAL_LOCK).await;

        let id = self.id.clone();
        let response = Correlator::subscribe(operation, &self.inner.hub.rssi, move |e| e.device == id);

        // A read always produces a record, so the change signal is not consulted.
        self.dispatch(BridgeCommand::ReadRssi(self.device_request()))
            .await?;
        let event = self
            .await_guarded(operation, timeout, true, response.first())
            .await?;
        event.status.check(operation)?;
        Ok(event.rssi)
    }

    /// Ask the peer for a larger MTU and return the negotiated value.
    pub async fn request_mtu(&self, mtu: u16, options: MtuOptions) -> Result<u16, BleError> {
        let operation = Operation::RequestMtu;
        self.ensure_android(operation)?;
        self.ensure_connected(operation)?;
        let config = &self.inner.config;
        let timeout = options.timeout.unwrap_or(config.timeouts.request_mtu);
        let predelay = options.predelay.unwrap_or(config.mtu_request_delay);

        let _global = self.inner.locks.acquire(GLOBAL_LOCK).await;

        // Let any unsolicited MTU update from the peer land before we listen.
        if !predelay.is_zero() {
            tokio::time::sleep(predelay).await;
        }

        let id = self.id.clone();
        let response = Correlator::subscribe(operation, &self.inner.hub.mtu, move |e| e.device == id);

        let changed = self
            .dispatch(BridgeCommand::RequestMtu(MtuRequest {
                device: self.id.clone(),
                mtu,
            }))
            .await?;
        if !changed {
            return Ok(self.mtu_now());
        }
        let event = self
            .await_guarded(operation, timeout, true, response.first())
            .await?;
        event.status.check(operation)?;
        Ok(event.mtu)
    }

    pub async fn request_connection_priority(
        &self,
        priority: ConnectionPriority,
    ) -> Result<(), BleError> {
        let operation = Operation::RequestConnectionPriority;
        self.ensure_android(operation)?;
        self.ensure_connected(operation)?;

        let _global = self.inner.locks.acquire(GLOBAL_LOCK).await;
        self.dispatch(BridgeCommand::RequestConnectionPriority(
            ConnectionPriorityRequest {
                device: self.id.clone(),
                priority,
            },
        ))
        .await?;
        Ok(())
    }

    /// Preferred PHYs are only a hint; the controller may ignore them.
    pub async fn set_preferred_phy(
        &self,
        tx_phy: PhySet,
        rx_phy: PhySet,
        coding: PhyCoding,
    ) -> Result<(), BleError> {
        let operation = Operation::SetPreferredPhy;
        self.ensure_android(operation)?;
        if tx_phy.is_empty() || rx_phy.is_empty() {
            return Err(BleError::InvalidArgument {
                operation,
                reason: "at least one PHY must be set in each direction".into(),
            });
        }
        self.ensure_connected(operation)?;

        let _global = self.inner.locks.acquire(GLOBAL_LOCK).await;
        self.dispatch(BridgeCommand::SetPreferredPhy(PreferredPhyRequest {
            device: self.id.clone(),
            tx_phy,
            rx_phy,
            coding,
        }))
        .await?;
        Ok(())
    }

    pub async fn clear_gatt_cache(&self) -> Result<(), BleError> {
        let operation = Operation::ClearGattCache;
        self.ensure_android(operation)?;
        self.ensure_connected(operation)?;

        let _global = self.inner.locks.acquire(GLOBAL_LOCK).await;
        self.dispatch(BridgeCommand::ClearGattCache(self.device_request()))
            .await?;
        Ok(())
    }

    // ── Bonding ──────────────────────────────────────────────────────

    /// Pair with the device. Already bonded is not an error.
    pub async fn create_bond(&self, options: BondOptions) -> Result<(), BleError> {
        let operation = Operation::CreateBond;
        self.ensure_android(operation)?;
        self.ensure_connected(operation)?;
        let timeout = options.timeout.unwrap_or(self.inner.config.timeouts.create_bond);

        let _global = self.inner.locks.acquire(GLOBAL_LOCK).await;

        let response = self.subscribe_bond_outcome(operation);
        let changed = self
            .dispatch(BridgeCommand::CreateBond(BondRequest {
                device: self.id.clone(),
                pin: options.pin,
            }))
            .await?;
        if changed {
            let event = self
                .await_guarded(operation, timeout, true, response.first())
                .await?;
            expect_bond_state(operation, &event, BondState::Bonded)?;
        }
        Ok(())
    }

    /// Forget the bond. Works on a disconnected device too, in which case
    /// a disconnect during the wait is not treated as a failure.
    pub async fn remove_bond(&self, options: TimeoutOptions) -> Result<(), BleError> {
        let operation = Operation::RemoveBond;
        self.ensure_android(operation)?;
        let timeout = options.timeout.unwrap_or(self.inner.config.timeouts.remove_bond);
        let guard_disconnect = self.is_connected();

        let _global = self.inner.locks.acquire(GLOBAL_LOCK).await;

        let response = self.subscribe_bond_outcome(operation);
        let changed = self
            .dispatch(BridgeCommand::RemoveBond(self.device_request()))
            .await?;
        if changed {
            let event = self
                .await_guarded(operation, timeout, guard_disconnect, response.first())
                .await?;
            expect_bond_state(operation, &event, BondState::None)?;
        }
        Ok(())
    }

    // ── Cached state ─────────────────────────────────────────────────

    pub fn connection_state_now(&self) -> ConnectionState {
        self.inner.registry.connection_state(&self.id)
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state_now().is_connected()
    }

    pub fn is_disconnected(&self) -> bool {
        self.connection_state_now().is_disconnected()
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.inner.registry.disconnect_reason(&self.id)
    }

    pub fn mtu_now(&self) -> u16 {
        self.inner.registry.mtu(&self.id)
    }

    pub fn bond_state_now(&self) -> BondState {
        self.inner.registry.bond_state(&self.id)
    }

    pub fn prev_bond_state(&self) -> Option<BondState> {
        self.inner.registry.prev_bond_state(&self.id)
    }

    pub fn is_auto_connect_enabled(&self) -> bool {
        self.inner.registry.is_auto_connect(&self.id)
    }

    /// Primary services from the last successful discovery; empty if none.
    pub fn services_list(&self) -> Vec<BluetoothService> {
        self.inner.registry.primary_services(&self.id)
    }

    // ── Streams ──────────────────────────────────────────────────────

    pub fn connection_state_stream(&self) -> StateStream<ConnectionState> {
        stream::replaying(self.inner.registry.subscribe_connection(&self.id))
    }

    pub fn mtu_stream(&self) -> StateStream<u16> {
        stream::replaying(self.inner.registry.subscribe_mtu(&self.id))
    }

    pub fn bond_state_stream(&self) -> StateStream<BondState> {
        stream::replaying(self.inner.registry.subscribe_bond(&self.id))
    }

    /// Fires when the peer's service tree changed; re-run discovery.
    pub fn services_reset_stream(&self) -> StateStream<ServicesResetEvent> {
        stream::device_records(
            self.inner.hub.subscribe_services_reset(),
            self.id.clone(),
            reset_device,
        )
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn subscribe_to_services_changed(&self) -> Result<(), BleError> {
        let Some(services) = self.inner.registry.services(&self.id) else {
            return Ok(());
        };
        let Some(characteristic) = find_services_changed(&services) else {
            return Ok(());
        };
        let uuid = characteristic.uuid;
        if !characteristic.properties.can_subscribe()
            || self.inner.registry.is_notifying(&self.id, uuid)
        {
            return Ok(());
        }
        debug!(device = %self.id, "subscribing to services changed");
        self.set_notify_value(GENERIC_ATTRIBUTE_SERVICE, uuid, true)
            .await
    }

    async fn set_notify_value(
        &self,
        service: Uuid,
        characteristic: Uuid,
        enable: bool,
    ) -> Result<(), BleError> {
        let operation = Operation::SetNotifyValue;
        self.ensure_connected(operation)?;
        let timeout = self.inner.config.timeouts.set_notify_value;

        let _global = self.inner.locks.acquire(GLOBAL_LOCK).await;

        let id = self.id.clone();
        let response = Correlator::subscribe(
            operation,
            &self.inner.hub.descriptor_written,
            move |e| {
                e.device == id
                    && e.characteristic == characteristic
                    && e.descriptor == CLIENT_CHARACTERISTIC_CONFIG
            },
        );

        let changed = self
            .dispatch(BridgeCommand::SetNotifyValue(SetNotifyValueRequest {
                device: self.id.clone(),
                service,
                characteristic,
                enable,
                force_indications: false,
            }))
            .await?;
        if changed {
            let event = self
                .await_guarded(operation, timeout, true, response.first())
                .await?;
            event.status.check(operation)?;
        }
        Ok(())
    }

    /// Wait for a connection record of this device whose state passes
    /// `accept`. After a lag the cached link state stands in for the
    /// dropped records.
    fn subscribe_connection_outcome(
        &self,
        operation: Operation,
        accept: fn(ConnectionState) -> bool,
    ) -> Correlator<ConnectionStateEvent> {
        let id = self.id.clone();
        let cached_id = self.id.clone();
        let registry = Arc::clone(&self.inner.registry);
        Correlator::subscribe(
            operation,
            &self.inner.hub.connection,
            move |e: &ConnectionStateEvent| e.device == id && accept(e.state),
        )
        .with_lag_fallback(move || {
            Some(ConnectionStateEvent {
                state: registry.connection_state(&cached_id),
                reason: registry.disconnect_reason(&cached_id),
                device: cached_id.clone(),
            })
        })
    }

    /// Bond correlators skip the intermediate `bonding` record.
    fn subscribe_bond_outcome(&self, operation: Operation) -> Correlator<BondStateEvent> {
        let id = self.id.clone();
        let cached_id = self.id.clone();
        let registry = Arc::clone(&self.inner.registry);
        Correlator::subscribe(operation, &self.inner.hub.bond, move |e: &BondStateEvent| {
            e.device == id && e.state.is_terminal()
        })
        .with_lag_fallback(move || {
            Some(BondStateEvent {
                state: registry.bond_state(&cached_id),
                device: cached_id.clone(),
            })
        })
    }

    /// Race `fut` against the deadline, the adapter and optionally this
    /// device's link.
    async fn await_guarded<T, F>(
        &self,
        operation: Operation,
        timeout: Duration,
        guard_disconnect: bool,
        fut: F,
    ) -> Result<T, BleError>
    where
        F: Future<Output = Result<T, BleError>> + Send,
    {
        let guarded = guard::with_adapter_guard(
            operation,
            self.inner.hub.subscribe_adapter(),
            guard::with_deadline(operation, timeout, fut),
        );
        if guard_disconnect {
            guard::with_disconnect_guard(
                operation,
                self.id.clone(),
                self.inner.registry.subscribe_connection(&self.id),
                guarded,
            )
            .await
        } else {
            guarded.await
        }
    }

    async fn dispatch(&self, command: BridgeCommand) -> Result<bool, BleError> {
        let operation = command.method();
        debug!(device = %self.id, %operation, "dispatching");
        let changed = self
            .inner
            .bridge
            .dispatch(command)
            .await
            .map_err(|source| BleError::Bridge { operation, source })?;
        debug!(device = %self.id, %operation, changed, "dispatched");
        Ok(changed)
    }

    /// Best-effort disconnect after a connect timed out.
    async fn cancel_connect(&self) {
        warn!(device = %self.id, "connect timed out; canceling the attempt");
        if let Err(e) = self
            .inner
            .bridge
            .dispatch(BridgeCommand::Disconnect(self.device_request()))
            .await
        {
            warn!(device = %self.id, error = %e, "cancel after connect timeout failed");
        }
    }

    fn ensure_connected(&self, operation: Operation) -> Result<(), BleError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BleError::NotConnected {
                operation,
                device: self.id.clone(),
            })
        }
    }

    fn ensure_android(&self, operation: Operation) -> Result<(), BleError> {
        if self.inner.config.platform.is_android() {
            Ok(())
        } else {
            Err(BleError::android_only(operation))
        }
    }

    fn device_request(&self) -> DeviceRequest {
        DeviceRequest {
            device: self.id.clone(),
        }
    }
}

impl fmt::Debug for BleDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BleDevice")
            .field("id", &self.id)
            .field("connection", &self.connection_state_now())
            .finish_non_exhaustive()
    }
}

fn connect_failure(reason: Option<DisconnectReason>) -> BleError {
    let operation = Operation::Connect;
    match reason {
        Some(reason) if reason.code == CONNECTION_CANCELED_CODE => {
            BleError::ConnectionCanceled { operation }
        }
        Some(reason) => BleError::Platform {
            operation,
            code: reason.code,
            message: reason.description,
        },
        None => BleError::Platform {
            operation,
            code: 0,
            message: "connection failed".into(),
        },
    }
}

fn expect_bond_state(
    operation: Operation,
    event: &BondStateEvent,
    expected: BondState,
) -> Result<(), BleError> {
    if event.state == expected {
        Ok(())
    } else {
        Err(BleError::BondFailed {
            operation,
            state: event.state,
        })
    }
}

fn reset_device(event: &ServicesResetEvent) -> &DeviceId {
    &event.device
}
