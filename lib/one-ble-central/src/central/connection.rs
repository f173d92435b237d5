use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::Inner;
use super::dispatcher::{Inbound, SessionSignal};
use crate::error::{BleCentralError, StackError};
use crate::event_bus::{Replay, publish};
use crate::model::identifier::PeripheralIdentifier;
use crate::model::options::ConnectOptions;
use crate::model::state::{ConnectionEvent, ConnectionState};
use crate::session::{Peripheral, PeripheralSession};
use crate::util::{lock, until};

impl Inner {
    pub(crate) async fn connect_with(
        self: &Arc<Self>,
        identifier: PeripheralIdentifier,
        options: Option<ConnectOptions>,
        auto_connect: bool,
        timeout: Option<Duration>,
    ) -> Result<Peripheral, BleCentralError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        until(deadline, self.ensure_adapter_powered_on())
            .await
            .ok_or(BleCentralError::ConnectTimeout)??;

        let (session, events) = self.begin_connect(identifier, options, auto_connect)?;
        self.finish_connect(session, events, deadline).await
    }

    /// Claims the session slot and issues the stack connect.
    fn begin_connect(
        &self,
        identifier: PeripheralIdentifier,
        options: Option<ConnectOptions>,
        auto_connect: bool,
    ) -> Result<(Arc<PeripheralSession>, Replay<ConnectionEvent>), BleCentralError> {
        let session = {
            let mut slot = lock(&self.slot);
            if let Some(existing) = slot.as_ref() {
                if !existing.is_closed()
                    && matches!(
                        existing.state(),
                        ConnectionState::Connecting
                            | ConnectionState::Connected
                            | ConnectionState::Ready
                            | ConnectionState::Disconnecting
                    )
                {
                    return Err(BleCentralError::PeripheralAlreadyConnectedOrConnecting);
                }
            }

            let known = self
                .stack
                .known_peripherals(vec![identifier.id])
                .into_iter()
                .find(|known| known.id == identifier.id)
                .ok_or(BleCentralError::PeripheralNotFound {
                    peripheral: identifier.id,
                })?;

            let identifier = PeripheralIdentifier {
                id: identifier.id,
                name: known.name.or(identifier.name),
            };
            let session = Arc::new(PeripheralSession::new(
                identifier,
                self.next_sequence(),
                ConnectionState::Connecting,
                self.config.event_capacity,
            ));
            if auto_connect {
                session.mark_auto_connect();
            }
            *slot = Some(session.clone());
            session
        };

        tracing::debug!(peripheral = %session.id(), auto_connect, "connecting");
        let events = session.events();
        self.stack.connect(session.id(), options);
        Ok((session, events))
    }

    pub(crate) async fn finish_connect(
        self: &Arc<Self>,
        session: Arc<PeripheralSession>,
        events: Replay<ConnectionEvent>,
        deadline: Option<Instant>,
    ) -> Result<Peripheral, BleCentralError> {
        match until(deadline, self.await_connection(&session, events)).await {
            Some(result) => result,
            None => {
                self.abandon(&session, BleCentralError::ConnectTimeout);
                Err(BleCentralError::ConnectTimeout)
            }
        }
    }

    /// Follows a connecting session until it is ready or fails.
    async fn await_connection(
        &self,
        session: &Arc<PeripheralSession>,
        mut events: Replay<ConnectionEvent>,
    ) -> Result<Peripheral, BleCentralError> {
        let peripheral = session.id();
        loop {
            match events.recv().await? {
                ConnectionEvent::Connected | ConnectionEvent::AutoConnected => break,
                ConnectionEvent::Ready => return Ok(self.peripheral_handle(session)),
                ConnectionEvent::ConnectionFailed(error) => {
                    return Err(error.unwrap_or(BleCentralError::CouldNotConnectToPeripheral {
                        peripheral,
                        cause: None,
                    }));
                }
                ConnectionEvent::Disconnected(error) => {
                    return Err(error.unwrap_or(BleCentralError::PeripheralDisconnected {
                        peripheral,
                        cause: None,
                    }));
                }
                ConnectionEvent::NotReady(_) => continue,
            }
        }

        let handle = self.peripheral_handle(session);
        if let Some(task) = &self.connection_task {
            if let Err(error) = task.run(&handle).await {
                tracing::warn!(%peripheral, "post-connect task failed: {error}");
                self.signal(Inbound::Session(SessionSignal::NotReady {
                    generation: session.generation(),
                    error: error.clone(),
                }));
                return Err(error);
            }
        }

        self.signal(Inbound::Session(SessionSignal::Ready {
            generation: session.generation(),
        }));
        loop {
            match events.recv().await? {
                ConnectionEvent::Ready => break,
                ConnectionEvent::Disconnected(error) => {
                    return Err(error.unwrap_or(BleCentralError::PeripheralDisconnected {
                        peripheral,
                        cause: None,
                    }));
                }
                _ => continue,
            }
        }

        tokio::time::sleep(self.config.ready_delay).await;
        Ok(handle)
    }

    /// Gives up on a connect attempt that did not finish in time.
    fn abandon(&self, session: &Arc<PeripheralSession>, error: BleCentralError) {
        if session.is_closed() {
            return;
        }
        tracing::debug!(peripheral = %session.id(), "abandoning connection: {error}");
        session.request_disconnect();
        self.teardown(session, None);
        self.publish_connection(session, ConnectionEvent::ConnectionFailed(Some(error)));
        self.stack.cancel_connection(session.id());
    }

    /// Current peripheral once it is ready.
    pub(crate) async fn ensure_ready(&self) -> Result<Peripheral, BleCentralError> {
        let session = self
            .current_session()
            .ok_or(BleCentralError::PeripheralNotConnected {
                state: ConnectionState::Idle,
            })?;
        session.ensure_connected()?;

        let mut events = session.events();
        loop {
            match events.recv().await? {
                ConnectionEvent::Ready => return Ok(self.peripheral_handle(&session)),
                ConnectionEvent::Disconnected(error) => {
                    return Err(error.unwrap_or_else(|| session.disconnected_error()));
                }
                ConnectionEvent::NotReady(error) => {
                    return Err(error.unwrap_or(BleCentralError::PeripheralNotConnected {
                        state: session.state(),
                    }));
                }
                _ => continue,
            }
        }
    }

    pub(crate) async fn disconnect(&self) -> Result<Peripheral, BleCentralError> {
        let session = self
            .current_session()
            .ok_or(BleCentralError::PeripheralNotConnectedOrAlreadyDisconnected)?;
        let handle = self.peripheral_handle(&session);

        if session.state() == ConnectionState::Idle {
            self.teardown(&session, None);
            return Ok(handle);
        }

        let mut events = session.events();
        session.request_disconnect();
        self.signal(Inbound::Session(SessionSignal::Disconnecting {
            generation: session.generation(),
        }));
        self.stack.cancel_connection(session.id());

        loop {
            match events.recv().await? {
                ConnectionEvent::Disconnected(None) | ConnectionEvent::ConnectionFailed(None) => {
                    return Ok(handle);
                }
                ConnectionEvent::Disconnected(Some(error))
                | ConnectionEvent::ConnectionFailed(Some(error)) => return Err(error),
                _ => continue,
            }
        }
    }

    /// Drops `session` from the slot, closes it and fails its pending operations.
    pub(crate) fn teardown(&self, session: &Arc<PeripheralSession>, cause: Option<StackError>) {
        let was_current = {
            let mut slot = lock(&self.slot);
            let current = slot
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, session));
            if current {
                *slot = None;
            }
            current
        };

        session.close(cause);
        if was_current {
            self.broker.fail_all(session.disconnected_error());
        }
        tracing::debug!(peripheral = %session.id(), "session torn down");
    }

    pub(crate) fn handle_disconnect(
        self: &Arc<Self>,
        session: &Arc<PeripheralSession>,
        error: Option<BleCentralError>,
        cause: Option<StackError>,
    ) {
        let requested = session.is_disconnect_requested();
        self.teardown(session, cause);
        self.publish_connection(session, ConnectionEvent::Disconnected(error.clone()));

        if requested {
            return;
        }
        let (Some(error), Some(policy)) = (error, self.auto_reconnect.as_ref()) else {
            return;
        };

        let identifier = session.identifier();
        if !policy(&identifier, &error) {
            tracing::debug!(peripheral = %identifier.id, "auto reconnect declined");
            return;
        }

        tracing::info!(peripheral = %identifier.id, "auto reconnecting after: {error}");
        let central = self.clone();
        self.runtime.spawn(async move {
            let timeout = central.config.connect_timeout;
            if let Err(err) = central.connect_with(identifier, None, true, timeout).await {
                tracing::warn!("auto reconnect failed: {err}");
            }
        });
    }

    pub(crate) fn transition(
        &self,
        session: &PeripheralSession,
        state: ConnectionState,
        event: ConnectionEvent,
    ) {
        session.transition(state, event.clone());
        publish(&self.bus.connection, event);
    }

    pub(crate) fn publish_connection(&self, session: &PeripheralSession, event: ConnectionEvent) {
        session.publish(event.clone());
        publish(&self.bus.connection, event);
    }
}
