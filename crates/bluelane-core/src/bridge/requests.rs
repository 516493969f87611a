// ── Bridge command payloads ──
//
// One variant per operation kind, each keyed by the target device.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ConnectionPriority, DeviceId, Operation, PhyCoding, PhySet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRequest {
    pub device: DeviceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub device: DeviceId,
    pub auto_connect: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MtuRequest {
    pub device: DeviceId,
    pub mtu: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPriorityRequest {
    pub device: DeviceId,
    pub priority: ConnectionPriority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredPhyRequest {
    pub device: DeviceId,
    pub tx_phy: PhySet,
    pub rx_phy: PhySet,
    pub coding: PhyCoding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondRequest {
    pub device: DeviceId,
    /// Legacy pairing PIN, if the peripheral requires one.
    pub pin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetNotifyValueRequest {
    pub device: DeviceId,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub enable: bool,
    /// Use indications instead of notifications.
    pub force_indications: bool,
}

/// Everything the engine can ask the native stack to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "request", rename_all = "camelCase")]
pub enum BridgeCommand {
    Connect(ConnectRequest),
    Disconnect(DeviceRequest),
    DiscoverServices(DeviceRequest),
    ReadRssi(DeviceRequest),
    RequestMtu(MtuRequest),
    RequestConnectionPriority(ConnectionPriorityRequest),
    SetPreferredPhy(PreferredPhyRequest),
    CreateBond(BondRequest),
    RemoveBond(DeviceRequest),
    ClearGattCache(DeviceRequest),
    SetNotifyValue(SetNotifyValueRequest),
}

impl BridgeCommand {
    pub fn device(&self) -> &DeviceId {
        match self {
            Self::Connect(r) => &r.device,
            Self::Disconnect(r)
            | Self::DiscoverServices(r)
            | Self::ReadRssi(r)
            | Self::RemoveBond(r)
            | Self::ClearGattCache(r) => &r.device,
            Self::RequestMtu(r) => &r.device,
            Self::RequestConnectionPriority(r) => &r.device,
            Self::SetPreferredPhy(r) => &r.device,
            Self::CreateBond(r) => &r.device,
            Self::SetNotifyValue(r) => &r.device,
        }
    }

    /// The native method this command maps to.
    pub fn method(&self) -> Operation {
        match self {
            Self::Connect(_) => Operation::Connect,
            Self::Disconnect(_) => Operation::Disconnect,
            Self::DiscoverServices(_) => Operation::DiscoverServices,
            Self::ReadRssi(_) => Operation::ReadRssi,
            Self::RequestMtu(_) => Operation::RequestMtu,
            Self::RequestConnectionPriority(_) => Operation::RequestConnectionPriority,
            Self::SetPreferredPhy(_) => Operation::SetPreferredPhy,
            Self::CreateBond(_) => Operation::CreateBond,
            Self::RemoveBond(_) => Operation::RemoveBond,
            Self::ClearGattCache(_) => Operation::ClearGattCache,
            Self::SetNotifyValue(_) => Operation::SetNotifyValue,
        }
    }
}
