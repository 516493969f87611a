// ── Derived streams ──
//
// Long-lived per-device views over the registry and the event hub.
// State streams replay the cached value first, then follow live changes;
// intermediate values may be coalesced when a consumer falls behind.

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::warn;

use crate::model::DeviceId;

/// A boxed, owned stream handed out to callers.
pub type StateStream<T> = BoxStream<'static, T>;

/// Current value first, then every change.
pub(crate) fn replaying<T>(receiver: watch::Receiver<T>) -> StateStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    WatchStream::new(receiver).boxed()
}

/// Live records for one device. Nothing is replayed.
pub(crate) fn device_records<T>(
    receiver: broadcast::Receiver<T>,
    device: DeviceId,
    device_of: fn(&T) -> &DeviceId,
) -> StateStream<T>
where
    T: Clone + Send + 'static,
{
    BroadcastStream::new(receiver)
        .filter_map(move |received| {
            let record = match received {
                Ok(record) if device_of(&record) == &device => Some(record),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(%device, skipped, "device stream lagged behind the event hub");
                    None
                }
            };
            futures_util::future::ready(record)
        })
        .boxed()
}
