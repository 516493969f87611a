// ── Response correlation ──
//
// Turns a shared broadcast channel of event records into a one-shot
// "first matching record" future. The broadcast receiver is created inside
// `subscribe`, so anything published after that call is buffered for us even
// if nobody is polling yet. Callers must subscribe BEFORE dispatching the
// command whose response they want; otherwise a fast response is lost.
//
// A lagged receiver has dropped records. Categories backed by cached state
// (connection, bond) can install a fallback that answers from the cache;
// for the others a dropped match surfaces as the operation's timeout.

use std::fmt;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::error::BleError;
use crate::model::Operation;

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type Fallback<T> = Box<dyn Fn() -> Option<T> + Send + Sync>;

/// A pending "first record matching a predicate" subscription.
///
/// Dropping it unsubscribes; a late record is then simply never observed.
pub struct Correlator<T> {
    operation: Operation,
    receiver: broadcast::Receiver<T>,
    predicate: Predicate<T>,
    on_lag: Option<Fallback<T>>,
}

impl<T: Clone + Send + 'static> Correlator<T> {
    pub fn subscribe<F>(operation: Operation, sender: &broadcast::Sender<T>, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            operation,
            receiver: sender.subscribe(),
            predicate: Box::new(predicate),
            on_lag: None,
        }
    }

    /// Consult `fallback` after the receiver lagged. A `Some` record that
    /// also passes the predicate resolves the wait.
    #[must_use]
    pub fn with_lag_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn() -> Option<T> + Send + Sync + 'static,
    {
        self.on_lag = Some(Box::new(fallback));
        self
    }

    /// Resolve with the first matching record published since `subscribe`.
    pub async fn first(mut self) -> Result<T, BleError> {
        loop {
            match self.receiver.recv().await {
                Ok(record) => {
                    if (self.predicate)(&record) {
                        debug!(operation = %self.operation, "correlated response received");
                        return Ok(record);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        operation = %self.operation,
                        skipped,
                        "correlator lagged behind the event stream"
                    );
                    let recovered = self.on_lag.as_ref().and_then(|fallback| fallback());
                    if let Some(record) = recovered.filter(|r| (self.predicate)(r)) {
                        debug!(operation = %self.operation, "response recovered from cached state");
                        return Ok(record);
                    }
                }
                Err(RecvError::Closed) => {
                    return Err(BleError::EventStreamClosed {
                        operation: self.operation,
                    });
                }
            }
        }
    }
}

impl<T> fmt::Debug for Correlator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}
