// ── Bridge event records ──
//
// Raw records the native stack publishes. They arrive unordered on shared
// channels; the engine correlates them back to the operation that caused
// them by device identity and, where needed, sub-state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BleError;
use crate::model::{
    BluetoothService, BondState, ConnectionState, DeviceId, DisconnectReason, Operation,
};

/// Disconnect code the bridge reports when a pending connect was canceled
/// by an explicit disconnect.
pub const CONNECTION_CANCELED_CODE: i32 = 23_789_258;

/// Success flag plus native error code and text, attached to response records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeStatus {
    pub success: bool,
    pub error_code: i32,
    pub error_string: String,
}

impl NativeStatus {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_code: 0,
            error_string: String::new(),
        }
    }

    pub fn failed(error_code: i32, error_string: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code,
            error_string: error_string.into(),
        }
    }

    /// Map a failed status onto the generic platform error.
    pub(crate) fn check(&self, operation: Operation) -> Result<(), BleError> {
        if self.success {
            Ok(())
        } else {
            Err(BleError::Platform {
                operation,
                code: self.error_code,
                message: self.error_string.clone(),
            })
        }
    }
}

impl Default for NativeStatus {
    fn default() -> Self {
        Self::ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStateEvent {
    pub device: DeviceId,
    pub state: ConnectionState,
    /// Present on transitions to `disconnected`.
    pub reason: Option<DisconnectReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredServicesEvent {
    pub device: DeviceId,
    pub services: Vec<BluetoothService>,
    #[serde(default)]
    pub status: NativeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssiEvent {
    pub device: DeviceId,
    pub rssi: i32,
    #[serde(default)]
    pub status: NativeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MtuEvent {
    pub device: DeviceId,
    pub mtu: u16,
    #[serde(default)]
    pub status: NativeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondStateEvent {
    pub device: DeviceId,
    pub state: BondState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesResetEvent {
    pub device: DeviceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorWrittenEvent {
    pub device: DeviceId,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub descriptor: Uuid,
    pub value: Vec<u8>,
    #[serde(default)]
    pub status: NativeStatus,
}

/// Any record the bridge can publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "event", rename_all = "camelCase")]
pub enum BridgeEvent {
    ConnectionState(ConnectionStateEvent),
    DiscoveredServices(DiscoveredServicesEvent),
    Rssi(RssiEvent),
    Mtu(MtuEvent),
    BondState(BondStateEvent),
    ServicesReset(ServicesResetEvent),
    DescriptorWritten(DescriptorWrittenEvent),
}

impl BridgeEvent {
    pub fn device(&self) -> &DeviceId {
        match self {
            Self::ConnectionState(e) => &e.device,
            Self::DiscoveredServices(e) => &e.device,
            Self::Rssi(e) => &e.device,
            Self::Mtu(e) => &e.device,
            Self::BondState(e) => &e.device,
            Self::ServicesReset(e) => &e.device,
            Self::DescriptorWritten(e) => &e.device,
        }
    }
}
