// ── Runtime engine configuration ──
//
// Default deadlines and scheduling workarounds. Core never reads config
// files; callers build an `EngineConfig` (directly or via bluelane-config)
// and hand it to `Central::new`. Every per-call option struct can override
// the relevant default.

use std::time::Duration;

use crate::model::Platform;

/// Default deadline for each operation that waits on a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    pub connect: Duration,
    pub disconnect: Duration,
    pub discover_services: Duration,
    pub read_rssi: Duration,
    pub request_mtu: Duration,
    pub create_bond: Duration,
    pub remove_bond: Duration,
    pub set_notify_value: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(35),
            disconnect: Duration::from_secs(35),
            discover_services: Duration::from_secs(15),
            read_rssi: Duration::from_secs(15),
            request_mtu: Duration::from_secs(15),
            create_bond: Duration::from_secs(90),
            remove_bond: Duration::from_secs(30),
            set_notify_value: Duration::from_secs(15),
        }
    }
}

/// Configuration for one [`Central`](crate::Central).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Native stack behind the bridge. Drives capability checks.
    pub platform: Platform,
    pub timeouts: OperationTimeouts,
    /// Pause before an MTU request so an unsolicited peer update is not
    /// mistaken for the response.
    pub mtu_request_delay: Duration,
    /// Minimum time between a connect and the following disconnect (Android).
    pub disconnect_min_gap: Duration,
    /// Buffer size of each event category channel.
    pub event_channel_capacity: usize,
    /// Subscribe to the services-changed characteristic after discovery.
    pub subscribe_to_services_changed: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            timeouts: OperationTimeouts::default(),
            mtu_request_delay: Duration::from_millis(350),
            disconnect_min_gap: Duration::from_millis(2000),
            event_channel_capacity: 256,
            subscribe_to_services_changed: true,
        }
    }
}

impl EngineConfig {
    /// Defaults for a specific platform.
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            ..Self::default()
        }
    }
}

// ── Per-call options ─────────────────────────────────────────────────

/// Options for [`BleDevice::connect`](crate::BleDevice::connect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub timeout: Option<Duration>,
    /// MTU to request once connected, where the stack needs an explicit request.
    /// Must be `None` when `auto_connect` is set.
    pub mtu: Option<u16>,
    /// Let the stack connect whenever the device is in range. Returns right
    /// after dispatch; observe the connection state stream for the outcome.
    pub auto_connect: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            mtu: Some(512),
            auto_connect: false,
        }
    }
}

impl ConnectOptions {
    /// Auto-connect without an MTU request.
    pub fn auto() -> Self {
        Self {
            timeout: None,
            mtu: None,
            auto_connect: true,
        }
    }
}

/// Options for [`BleDevice::disconnect`](crate::BleDevice::disconnect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectOptions {
    pub timeout: Option<Duration>,
    /// Wait behind other radio operations. `false` lets a disconnect cancel
    /// an in-flight connect.
    pub queue: bool,
    /// Overrides [`EngineConfig::disconnect_min_gap`].
    pub min_gap: Option<Duration>,
}

impl Default for DisconnectOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            queue: true,
            min_gap: None,
        }
    }
}

impl DisconnectOptions {
    /// Skip the global queue.
    pub fn immediate() -> Self {
        Self {
            queue: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverOptions {
    /// Overrides [`EngineConfig::subscribe_to_services_changed`].
    pub subscribe_to_services_changed: Option<bool>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MtuOptions {
    /// Overrides [`EngineConfig::mtu_request_delay`].
    pub predelay: Option<Duration>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondOptions {
    pub timeout: Option<Duration>,
    /// Legacy pairing PIN.
    pub pin: Option<String>,
}

/// Options for operations that only take a deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutOptions {
    pub timeout: Option<Duration>,
}

impl TimeoutOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}
