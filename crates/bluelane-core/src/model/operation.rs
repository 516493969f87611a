// ── Operation names ──
//
// Every error and every log line is tagged with the operation it came from,
// so a failure stays attributable while several calls queue on the radio.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Radio operations the engine serializes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Operation {
    Connect,
    Disconnect,
    DiscoverServices,
    ReadRssi,
    RequestMtu,
    RequestConnectionPriority,
    SetPreferredPhy,
    CreateBond,
    RemoveBond,
    ClearGattCache,
    SetNotifyValue,
}
