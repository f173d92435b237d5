//! Correlates stack commands with the callback that completes them.
//!
//! Every request gets its own id in the pending map. The entry is removed exactly
//! once: by the registration guard when the awaiting future finishes or is dropped,
//! or by [`OperationBroker::fail_all`] when the session goes away.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

use crate::error::BleCentralError;
use crate::event_bus::{GattEvent, next_event};
use crate::session::PeripheralSession;
use crate::util::lock;


type PendingMap = Mutex<HashMap<Uuid, oneshot::Sender<BleCentralError>>>;

#[derive(Default)]
pub(crate) struct OperationBroker {
    pending: PendingMap,
}

impl OperationBroker {
    /// Subscribes to `events`, runs `side_effect` and resolves with the first `matcher` hit.
    pub async fn issue<T>(
        &self,
        session: &PeripheralSession,
        events: &broadcast::Sender<GattEvent>,
        side_effect: impl FnOnce(),
        matcher: impl FnMut(&GattEvent) -> Option<Result<T, BleCentralError>>,
    ) -> Result<T, BleCentralError> {
        self.issue_on(session, events.subscribe(), side_effect, matcher)
            .await
    }

    /// Same as [`Self::issue`] on a subscription taken earlier by the caller.
    pub async fn issue_on<T>(
        &self,
        session: &PeripheralSession,
        mut events: broadcast::Receiver<GattEvent>,
        side_effect: impl FnOnce(),
        mut matcher: impl FnMut(&GattEvent) -> Option<Result<T, BleCentralError>>,
    ) -> Result<T, BleCentralError> {
        let (registration, abort) = self.register();

        if session.is_closed() {
            return Err(session.disconnected_error());
        }

        tracing::trace!(request = %registration.request_id, "issuing BLE operation");
        side_effect();

        let peripheral = session.id();
        let completion = async {
            loop {
                let event = next_event(&mut events)
                    .await
                    .ok_or(BleCentralError::SessionClosed)?;
                if event.peripheral() != peripheral {
                    continue;
                }
                if let Some(result) = matcher(&event) {
                    return result;
                }
            }
        };

        let result = tokio::select! {
            biased;
            aborted = abort => Err(aborted.unwrap_or(BleCentralError::SessionClosed)),
            result = completion => result,
        };
        drop(registration);
        result
    }

    /// Fails every pending operation with `error`.
    pub fn fail_all(&self, error: BleCentralError) {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        for (request_id, abort) in drained {
            tracing::debug!(request = %request_id, "failing pending BLE operation: {error}");
            if abort.send(error.clone()).is_err() {
                tracing::trace!(request = %request_id, "pending operation already gone");
            }
        }
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    fn register(&self) -> (Registration<'_>, oneshot::Receiver<BleCentralError>) {
        let (tx, rx) = oneshot::channel();
        let mut pending = lock(&self.pending);
        let request_id = loop {
            let candidate = Uuid::new_v4();
            if !pending.contains_key(&candidate) {
                break candidate;
            }
        };
        pending.insert(request_id, tx);

        (
            Registration {
                pending: &self.pending,
                request_id,
            },
            rx,
        )
    }
}

struct Registration<'a> {
    pending: &'a PendingMap,
    request_id: Uuid,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.request_id);
    }
}
