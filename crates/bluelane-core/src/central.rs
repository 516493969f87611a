// ── Central coordinator ──
//
// Owns the bridge, the lock registry, the event hub and the device
// registry. Every `BleDevice` handle shares them through
// `Arc<CentralInner>`. Also runs the auto-reconnect task on stacks that
// do not reconnect by themselves.

use std::sync::{Arc, Weak};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, ConnectionStateEvent};
use crate::config::EngineConfig;
use crate::device::BleDevice;
use crate::lock::LockRegistry;
use crate::model::{AdapterState, DeviceId};
use crate::store::{DeviceRegistry, EventHub, EventSink};
use crate::stream::{self, StateStream};

/// Entry point for consumers.
///
/// Cheaply cloneable via `Arc<CentralInner>`. Must be created inside a
/// Tokio runtime because it spawns a background task.
#[derive(Clone)]
pub struct Central {
    inner: Arc<CentralInner>,
}

pub(crate) struct CentralInner {
    pub(crate) config: EngineConfig,
    pub(crate) bridge: Arc<dyn Bridge>,
    pub(crate) locks: LockRegistry,
    pub(crate) registry: Arc<DeviceRegistry>,
    pub(crate) hub: Arc<EventHub>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Central {
    pub fn new(config: EngineConfig, bridge: Arc<dyn Bridge>) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let hub = Arc::new(EventHub::new(config.event_channel_capacity));
        let cancel = CancellationToken::new();

        let inner = Arc::new_cyclic(|weak: &Weak<CentralInner>| {
            let mut handles = Vec::new();
            if config.platform.reconnects_natively() {
                debug!(platform = %config.platform, "native stack handles auto-reconnect");
            } else {
                handles.push(tokio::spawn(auto_reconnect_task(
                    weak.clone(),
                    hub.subscribe_connection(),
                    cancel.clone(),
                )));
            }

            CentralInner {
                config,
                bridge,
                locks: LockRegistry::new(),
                registry,
                hub,
                cancel,
                task_handles: Mutex::new(handles),
            }
        });

        Self { inner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Handle for one peripheral. Cheap; handles for the same id share state.
    pub fn device(&self, id: impl Into<DeviceId>) -> BleDevice {
        BleDevice::new(id.into(), Arc::clone(&self.inner))
    }

    /// The sink the bridge publishes native records into.
    pub fn event_sink(&self) -> EventSink {
        EventSink::new(Arc::clone(&self.inner.registry), Arc::clone(&self.inner.hub))
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.inner.registry
    }

    /// Raw per-category event channels.
    pub fn events(&self) -> &EventHub {
        &self.inner.hub
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.inner.locks
    }

    pub fn connected_devices(&self) -> Vec<BleDevice> {
        self.inner
            .registry
            .connected_devices()
            .into_iter()
            .map(|id| self.device(id))
            .collect()
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.inner.hub.adapter_state()
    }

    /// Current adapter state, then every change.
    pub fn adapter_state_stream(&self) -> StateStream<AdapterState> {
        stream::replaying(self.inner.hub.subscribe_adapter())
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("central shut down");
    }
}

impl Drop for CentralInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Re-issue an auto-connect whenever a device in the auto-connect set
/// drops while the adapter is on.
///
/// Reconnects run in a `JoinSet` owned by this task, so cancellation
/// aborts the ones still queued and `shutdown` waits for them.
async fn auto_reconnect_task(
    inner: Weak<CentralInner>,
    mut events: broadcast::Receiver<ConnectionStateEvent>,
    cancel: CancellationToken,
) {
    let mut reconnects = JoinSet::new();
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(_) = reconnects.join_next(), if !reconnects.is_empty() => continue,
            received = events.recv() => match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auto-reconnect lagged behind connection events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };

        if !event.state.is_disconnected() {
            continue;
        }
        let Some(inner) = inner.upgrade() else {
            continue;
        };
        if !inner.registry.is_auto_connect(&event.device) || !inner.hub.adapter_state().is_on() {
            continue;
        }

        info!(device = %event.device, "auto-reconnecting");
        let device = BleDevice::new(event.device, inner);
        reconnects.spawn(async move {
            if let Err(e) = device.reconnect().await {
                warn!(device = %device.id(), error = %e, "auto-reconnect failed");
            }
        });
    }
    reconnects.shutdown().await;
    debug!("auto-reconnect task stopped");
}
