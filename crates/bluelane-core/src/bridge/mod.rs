// ── Native bridge interface ──
//
// The engine never talks to a radio directly. It hands typed commands to a
// `Bridge` implementation and learns about results only through records the
// bridge publishes into an `EventSink`.

pub mod event;
pub mod requests;

use futures_util::future::BoxFuture;
use thiserror::Error;

pub use event::{
    BondStateEvent, BridgeEvent, CONNECTION_CANCELED_CODE, ConnectionStateEvent,
    DescriptorWrittenEvent, DiscoveredServicesEvent, MtuEvent, NativeStatus, RssiEvent,
    ServicesResetEvent,
};
pub use requests::{
    BondRequest, BridgeCommand, ConnectRequest, ConnectionPriorityRequest, DeviceRequest,
    MtuRequest, PreferredPhyRequest, SetNotifyValueRequest,
};

/// A dispatch the bridge itself refused or could not deliver.
///
/// Distinct from a failure the radio reports later through an event record.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BridgeError {
    pub code: Option<i32>,
    pub message: String,
}

impl BridgeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Command side of the platform radio stack.
///
/// `dispatch` resolves once the native layer has accepted the command, not
/// when the radio has finished it. The returned flag reports whether the
/// command changes anything: `false` means the device is already in the
/// requested state and no response record will follow.
pub trait Bridge: Send + Sync + 'static {
    fn dispatch(&self, command: BridgeCommand) -> BoxFuture<'_, Result<bool, BridgeError>>;
}
