// ── Domain model ──
//
// Identity, state and service types shared by every layer of the engine.
// Everything here is plain data: no channels, no locks.

pub mod device_id;
pub mod operation;
pub mod platform;
pub mod service;
pub mod state;

pub use device_id::DeviceId;
pub use operation::Operation;
pub use platform::Platform;
pub use service::{
    BluetoothCharacteristic, BluetoothService, CLIENT_CHARACTERISTIC_CONFIG,
    CharacteristicProperties, GENERIC_ATTRIBUTE_SERVICE, SERVICES_CHANGED_CHARACTERISTIC,
    ble_uuid,
};
pub use state::{
    AdapterState, BondState, ConnectionPriority, ConnectionState, DisconnectReason, PhyCoding,
    PhySet,
};
