// ── Deadline and guard decorators ──
//
// Each decorator races a pending operation future against one extra signal.
// They compose in any order; whichever branch settles first decides the
// outcome and the losing branches are dropped, which unsubscribes them.
// The wrapped future is always polled first, so a response that is already
// available wins a tie.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use crate::error::BleError;
use crate::model::{AdapterState, ConnectionState, DeviceId, Operation};

/// Fail with [`BleError::Timeout`] if `fut` has not settled within `timeout`.
pub async fn with_deadline<T, F>(operation: Operation, timeout: Duration, fut: F) -> Result<T, BleError>
where
    F: Future<Output = Result<T, BleError>>,
{
    if let Ok(result) = tokio::time::timeout(timeout, fut).await {
        result
    } else {
        warn!(%operation, timeout_ms = timeout.as_millis(), "operation timed out");
        Err(BleError::Timeout { operation, timeout })
    }
}

/// Fail with [`BleError::AdapterIsOff`] as soon as the adapter reports `off`,
/// including when it is already off.
pub async fn with_adapter_guard<T, F>(
    operation: Operation,
    adapter: watch::Receiver<AdapterState>,
    fut: F,
) -> Result<T, BleError>
where
    F: Future<Output = Result<T, BleError>>,
{
    tokio::select! {
        biased;
        result = fut => result,
        () = adapter_turned_off(adapter) => {
            warn!(%operation, "adapter turned off while operation was outstanding");
            Err(BleError::AdapterIsOff { operation })
        }
    }
}

/// Fail with [`BleError::DeviceIsDisconnected`] as soon as `device` reports
/// `disconnected`, including when it already is.
pub async fn with_disconnect_guard<T, F>(
    operation: Operation,
    device: DeviceId,
    connection: watch::Receiver<ConnectionState>,
    fut: F,
) -> Result<T, BleError>
where
    F: Future<Output = Result<T, BleError>>,
{
    tokio::select! {
        biased;
        result = fut => result,
        () = device_disconnected(connection) => {
            warn!(%operation, %device, "device disconnected while operation was outstanding");
            Err(BleError::DeviceIsDisconnected { operation, device })
        }
    }
}

// A closed channel never fires; the guarded future decides on its own.
async fn adapter_turned_off(mut adapter: watch::Receiver<AdapterState>) {
    let fired = adapter.wait_for(|state| state.is_off()).await.is_ok();
    if !fired {
        std::future::pending::<()>().await;
    }
}

async fn device_disconnected(mut connection: watch::Receiver<ConnectionState>) {
    let fired = connection
        .wait_for(|state| state.is_disconnected())
        .await
        .is_ok();
    if !fired {
        std::future::pending::<()>().await;
    }
}
