use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::stream::BoxStream;
use uuid::Uuid;

use crate::cache::CharacteristicCache;
use crate::central::Inner;
use crate::error::{BleCentralError, StackError};
use crate::event_bus::{Replay, ReplayChannel};
use crate::model::identifier::PeripheralIdentifier;
use crate::model::state::{ConnectionEvent, ConnectionState};
use crate::util::lock;

#[cfg(test)]
mod test;

/// Live connection to the single active peripheral.
///
/// Dropped together with its cache and connection stream once the link goes away.
pub(crate) struct PeripheralSession {
    id: Uuid,
    generation: u64,
    name: Mutex<Option<String>>,
    state: Mutex<ConnectionState>,
    cache: Mutex<CharacteristicCache>,
    events: ReplayChannel<ConnectionEvent>,
    auto_connect: AtomicBool,
    disconnect_requested: AtomicBool,
    closed: AtomicBool,
    disconnect_cause: Mutex<Option<StackError>>,
}

impl PeripheralSession {
    pub fn new(
        identifier: PeripheralIdentifier,
        generation: u64,
        state: ConnectionState,
        capacity: usize,
    ) -> Self {
        Self {
            id: identifier.id,
            generation,
            name: Mutex::new(identifier.name),
            state: Mutex::new(state),
            cache: Mutex::new(CharacteristicCache::default()),
            events: ReplayChannel::new(capacity),
            auto_connect: AtomicBool::new(false),
            disconnect_requested: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            disconnect_cause: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn identifier(&self) -> PeripheralIdentifier {
        PeripheralIdentifier {
            id: self.id,
            name: lock(&self.name).clone(),
        }
    }

    pub fn set_name(&self, name: Option<String>) {
        *lock(&self.name) = name;
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    /// Moves to `state` and publishes `event` on the session stream as one step.
    pub fn transition(&self, state: ConnectionState, event: ConnectionEvent) {
        let mut current = lock(&self.state);
        tracing::debug!(peripheral = %self.id, from = %*current, to = %state, "session transition");
        *current = state;
        self.events.send(event);
    }

    pub fn publish(&self, event: ConnectionEvent) {
        let _state = lock(&self.state);
        self.events.send(event);
    }

    pub fn events(&self) -> Replay<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> MutexGuard<'_, CharacteristicCache> {
        lock(&self.cache)
    }

    pub fn mark_auto_connect(&self) {
        self.auto_connect.store(true, Ordering::SeqCst);
    }

    pub fn take_auto_connect(&self) -> bool {
        self.auto_connect.swap(false, Ordering::SeqCst)
    }

    pub fn request_disconnect(&self) {
        self.disconnect_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_disconnect_requested(&self) -> bool {
        self.disconnect_requested.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the session dead and drops discovered attributes.
    pub fn close(&self, cause: Option<StackError>) {
        *lock(&self.disconnect_cause) = cause;
        self.closed.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Idle);
        self.cache().clear();
    }

    pub fn disconnected_error(&self) -> BleCentralError {
        BleCentralError::PeripheralDisconnected {
            peripheral: self.id,
            cause: lock(&self.disconnect_cause).clone(),
        }
    }

    /// Fails unless the link is up, ready or not.
    pub fn ensure_connected(&self) -> Result<(), BleCentralError> {
        if self.is_closed() {
            return Err(self.disconnected_error());
        }
        match self.state() {
            ConnectionState::Connected | ConnectionState::Ready => Ok(()),
            state => Err(BleCentralError::PeripheralNotConnected { state }),
        }
    }
}

/// Public handle to a peripheral session.
#[derive(Clone)]
pub struct Peripheral {
    pub(crate) session: Arc<PeripheralSession>,
    pub(crate) central: Weak<Inner>,
}

impl Peripheral {
    pub(crate) fn new(session: Arc<PeripheralSession>, central: Weak<Inner>) -> Self {
        Self { session, central }
    }

    pub fn id(&self) -> Uuid {
        self.session.id()
    }

    pub fn identifier(&self) -> PeripheralIdentifier {
        self.session.identifier()
    }

    pub fn name(&self) -> Option<String> {
        self.session.identifier().name
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn is_ready(&self) -> bool {
        !self.session.is_closed() && self.session.state() == ConnectionState::Ready
    }

    /// Connection events of this session only, replaying the latest one.
    pub fn connection_events(&self) -> BoxStream<'static, ConnectionEvent> {
        self.session.events().into_stream()
    }

    pub fn max_write_value_length(&self, with_response: bool) -> Result<usize, BleCentralError> {
        self.session.ensure_connected()?;
        let central = self.central()?;
        Ok(central
            .stack
            .maximum_write_value_length(self.id(), with_response))
    }

    pub(crate) fn central(&self) -> Result<Arc<Inner>, BleCentralError> {
        self.central.upgrade().ok_or(BleCentralError::SessionClosed)
    }
}

impl std::fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peripheral")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
