// ── Host platform ──
//
// Several operations only exist on one native stack, and a few scheduling
// workarounds only apply to one. All of those decisions key off `Platform`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The native radio stack the bridge talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    Android,
    Ios,
    MacOs,
    Linux,
    Windows,
    Web,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_family = "wasm") {
            Self::Web
        } else {
            Self::Linux
        }
    }

    pub fn is_android(self) -> bool {
        matches!(self, Self::Android)
    }

    pub fn is_apple(self) -> bool {
        matches!(self, Self::Ios | Self::MacOs)
    }

    pub fn is_web(self) -> bool {
        matches!(self, Self::Web)
    }

    /// MTU is negotiated by an explicit request after connecting.
    /// Apple stacks negotiate on their own; web has no MTU control.
    pub fn negotiates_mtu_after_connect(self) -> bool {
        self.is_android()
    }

    /// The stack needs an explicit subscription to the services-changed
    /// characteristic. Apple stacks subscribe automatically; web never exposes it.
    pub fn needs_services_changed_subscription(self) -> bool {
        matches!(self, Self::Android | Self::Linux | Self::Windows)
    }

    /// The native stack reconnects auto-connect devices by itself.
    pub fn reconnects_natively(self) -> bool {
        self.is_android()
    }

    /// Disconnecting too soon after a connect can strand an untracked
    /// connection inside the stack.
    pub fn needs_disconnect_gap(self) -> bool {
        self.is_android()
    }

    pub fn supports_rssi(self) -> bool {
        !self.is_web()
    }
}
