// ── GATT service tree ──
//
// Only as much structure as the engine needs: enough to tell primary
// services apart and to locate the services-changed characteristic.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bluetooth base UUID: `0000xxxx-0000-1000-8000-00805f9b34fb`.
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Generic Attribute service (0x1801).
pub const GENERIC_ATTRIBUTE_SERVICE: Uuid = Uuid::from_u128(0x0000_1801_0000_1000_8000_0080_5f9b_34fb);

/// Service Changed characteristic (0x2A05).
pub const SERVICES_CHANGED_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000_2a05_0000_1000_8000_0080_5f9b_34fb);

/// Client Characteristic Configuration descriptor (0x2902).
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid =
    Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb);

/// Expand a 16-bit SIG-assigned number into a full UUID.
pub fn ble_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | (u128::from(short) << 96))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharacteristicProperties {
    pub fn can_subscribe(self) -> bool {
        self.notify || self.indicate
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    #[serde(default)]
    pub descriptors: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothService {
    pub uuid: Uuid,
    /// Secondary services are only reachable through another service's
    /// include list and are hidden from callers.
    pub primary: bool,
    #[serde(default)]
    pub characteristics: Vec<BluetoothCharacteristic>,
    #[serde(default)]
    pub included_services: Vec<Uuid>,
}

impl BluetoothService {
    pub fn characteristic(&self, uuid: Uuid) -> Option<&BluetoothCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Locate the services-changed characteristic in a discovered tree.
pub(crate) fn find_services_changed(services: &[BluetoothService]) -> Option<&BluetoothCharacteristic> {
    services
        .iter()
        .find(|s| s.uuid == GENERIC_ATTRIBUTE_SERVICE)
        .and_then(|s| s.characteristic(SERVICES_CHANGED_CHARACTERISTIC))
}
