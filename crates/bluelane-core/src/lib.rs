//! Serialized, timeout-bounded BLE operations over an event-driven native bridge.
//!
//! The native radio stack is reached only through a [`Bridge`]: commands go
//! out through [`Bridge::dispatch`], results come back as records pushed into
//! an [`EventSink`]. This crate turns that fire-and-forget surface into plain
//! `async` operations:
//!
//! - **[`Central`]** — Coordinator owning the bridge, the keyed locks, the
//!   event hub and the device registry. Vends [`BleDevice`] handles and runs
//!   auto-reconnect on stacks that lack it.
//!
//! - **[`BleDevice`]** — Per-peripheral operations (`connect`, `disconnect`,
//!   `discover_services`, `read_rssi`, `request_mtu`, bonding, PHY and
//!   priority hints) plus cached-state getters and derived streams.
//!
//! - **[`LockRegistry`]** — Named FIFO mutexes. `"global"` serializes every
//!   radio operation; `"disconnect"` lets a disconnect cancel a pending connect.
//!
//! - **[`Correlator`]** — "First record matching a predicate", subscribed
//!   before dispatch so fast responses are never lost.
//!
//! - **[`guard`]** — Deadline, adapter-off and device-disconnect decorators.
//!
//! - **[`DeviceRegistry`]** — Per-device caches (`DashMap` + `tokio::sync::watch`)
//!   written only by event ingestion.
//!
//! Core never reads config files; build an [`EngineConfig`] and hand it in.

pub mod bridge;
pub mod central;
pub mod config;
pub mod correlator;
pub mod device;
pub mod error;
pub mod guard;
pub mod lock;
pub mod model;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{Bridge, BridgeCommand, BridgeError, BridgeEvent, NativeStatus};
pub use central::Central;
pub use config::{
    BondOptions, ConnectOptions, DisconnectOptions, DiscoverOptions, EngineConfig, MtuOptions,
    OperationTimeouts, TimeoutOptions,
};
pub use correlator::Correlator;
pub use device::BleDevice;
pub use error::{BleError, ErrorKind};
pub use lock::{LockRegistry, LockToken};
pub use store::{DeviceRegistry, EventHub, EventSink};
pub use stream::StateStream;

pub use model::{
    AdapterState, BluetoothCharacteristic, BluetoothService, BondState, CharacteristicProperties,
    ConnectionPriority, ConnectionState, DeviceId, DisconnectReason, Operation, PhyCoding, PhySet,
    Platform,
};
