// ── Device-keyed state and event ingestion ──
//
// `DeviceRegistry` holds the process-wide caches, `EventHub` fans records
// out per category, and `EventSink` is the single ingestion path that keeps
// the two in step.

mod hub;
mod registry;
mod sink;

pub use hub::EventHub;
pub use registry::{DEFAULT_MTU, DeviceRegistry};
pub use sink::EventSink;
