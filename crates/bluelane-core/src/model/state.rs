// ── Observed state types ──
//
// These values are only ever learned from the bridge's event stream.
// The engine never sets them optimistically on a caller's behalf.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Link-layer connection state of one peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_disconnected(self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// `connected` and `disconnected` end a transition; the other two are in flight.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Connected | Self::Disconnected)
    }
}

/// Why the last connection ended, as reported by the native stack.
///
/// Kept until the next disconnect overwrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectReason {
    pub code: i32,
    pub description: String,
}

impl DisconnectReason {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

/// Pairing state. Orthogonal to [`ConnectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BondState {
    #[default]
    None,
    Bonding,
    Bonded,
}

impl BondState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Bonding)
    }
}

/// Power state of the local radio adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum AdapterState {
    #[default]
    Unknown,
    Unavailable,
    Unauthorized,
    TurningOn,
    On,
    TurningOff,
    Off,
}

impl AdapterState {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    pub fn is_off(self) -> bool {
        matches!(self, Self::Off)
    }
}

/// Connection interval preset (Android).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ConnectionPriority {
    #[default]
    Balanced,
    High,
    LowPower,
}

/// Set of LE PHYs a link may use, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PhySet {
    pub le_1m: bool,
    pub le_2m: bool,
    pub le_coded: bool,
}

impl PhySet {
    pub const LE_1M: Self = Self {
        le_1m: true,
        le_2m: false,
        le_coded: false,
    };
    pub const LE_2M: Self = Self {
        le_1m: false,
        le_2m: true,
        le_coded: false,
    };
    pub const LE_CODED: Self = Self {
        le_1m: false,
        le_2m: false,
        le_coded: true,
    };

    /// Android `PHY_LE_*_MASK` bit layout.
    pub fn bits(self) -> u8 {
        u8::from(self.le_1m) | (u8::from(self.le_2m) << 1) | (u8::from(self.le_coded) << 2)
    }

    pub fn is_empty(self) -> bool {
        self.bits() == 0
    }
}

/// Coding preference when [`PhySet::le_coded`] is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PhyCoding {
    #[default]
    NoPreferred,
    S2,
    S8,
}
