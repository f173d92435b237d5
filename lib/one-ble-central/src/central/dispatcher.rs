//! Single consumer of stack callbacks and session signals.
//!
//! Session transitions and connection events are only produced here, in the order
//! the inbound channel delivered them.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Inner;
use crate::error::BleCentralError;
use crate::event_bus::{GattEvent, Notification, publish};
use crate::model::state::{AdapterState, ConnectionEvent, ConnectionState, PeripheralChange};
use crate::stack::StackEvent;

#[derive(Debug)]
pub(crate) enum Inbound {
    Stack(StackEvent),
    Session(SessionSignal),
}

/// Transitions requested by connect and disconnect flows.
#[derive(Debug)]
pub(crate) enum SessionSignal {
    Ready { generation: u64 },
    NotReady { generation: u64, error: BleCentralError },
    Disconnecting { generation: u64 },
}

pub(crate) async fn run(
    central: Weak<Inner>,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = inbound.recv() => next,
        };
        let Some(next) = next else {
            break;
        };
        let Some(central) = central.upgrade() else {
            break;
        };
        central.dispatch(next);
    }
    tracing::debug!("BLE event dispatcher stopped");
}

impl Inner {
    pub(crate) fn dispatch(self: &Arc<Self>, inbound: Inbound) {
        match inbound {
            Inbound::Stack(event) => self.on_stack_event(event),
            Inbound::Session(signal) => self.on_session_signal(signal),
        }
    }

    fn on_stack_event(self: &Arc<Self>, event: StackEvent) {
        match event {
            StackEvent::AdapterStateChanged(state) => {
                tracing::debug!("Bluetooth adapter state: {state}");
                self.bus.adapter.send(state);
                if state == AdapterState::PoweredOff {
                    if let Some(session) = self.current_session() {
                        self.handle_disconnect(
                            &session,
                            Some(BleCentralError::AdapterPoweredOff),
                            None,
                        );
                    }
                }
            }
            StackEvent::PeripheralDiscovered(discovery) => {
                publish(&self.bus.discoveries, discovery);
            }
            StackEvent::Connected { peripheral } => {
                let Some(session) = self.session_for(peripheral) else {
                    tracing::debug!(%peripheral, "connected event without session");
                    return;
                };
                if session.state() != ConnectionState::Connecting {
                    tracing::debug!(%peripheral, state = %session.state(), "unexpected connected event");
                    return;
                }
                let event = if session.take_auto_connect() {
                    ConnectionEvent::AutoConnected
                } else {
                    ConnectionEvent::Connected
                };
                self.transition(&session, ConnectionState::Connected, event);
            }
            StackEvent::ConnectFailed { peripheral, error } => {
                let Some(session) = self.session_for(peripheral) else {
                    tracing::debug!(%peripheral, "connect failure without session");
                    return;
                };
                let error = error.map(|cause| BleCentralError::CouldNotConnectToPeripheral {
                    peripheral,
                    cause: Some(cause),
                });
                self.teardown(&session, None);
                self.publish_connection(&session, ConnectionEvent::ConnectionFailed(error));
            }
            StackEvent::Disconnected { peripheral, error } => {
                let Some(session) = self.session_for(peripheral) else {
                    tracing::debug!(%peripheral, "disconnected event without session");
                    return;
                };
                let reported = error
                    .clone()
                    .map(|cause| BleCentralError::PeripheralDisconnected {
                        peripheral,
                        cause: Some(cause),
                    });
                self.handle_disconnect(&session, reported, error);
            }
            StackEvent::ServicesDiscovered {
                peripheral,
                services,
                error,
            } => publish(
                &self.bus.gatt,
                GattEvent::ServicesDiscovered {
                    peripheral,
                    services,
                    error,
                },
            ),
            StackEvent::CharacteristicsDiscovered {
                peripheral,
                service,
                characteristics,
                error,
            } => publish(
                &self.bus.gatt,
                GattEvent::CharacteristicsDiscovered {
                    peripheral,
                    service,
                    characteristics,
                    error,
                },
            ),
            StackEvent::ValueUpdated {
                peripheral,
                characteristic,
                value,
                error,
            } => {
                let notifying = self
                    .session_for(peripheral)
                    .is_some_and(|session| session.cache().is_notifying(&characteristic));

                if notifying && error.is_none() {
                    let notification = Notification {
                        peripheral,
                        characteristic,
                        value,
                    };
                    publish(&self.bus.notifications, notification.clone());
                    publish(&self.bus.gatt, GattEvent::Notification(notification));
                } else {
                    publish(
                        &self.bus.gatt,
                        GattEvent::ValueRead {
                            peripheral,
                            characteristic,
                            value,
                            error,
                        },
                    );
                }
            }
            StackEvent::ValueWritten {
                peripheral,
                characteristic,
                error,
            } => publish(
                &self.bus.gatt,
                GattEvent::ValueWritten {
                    peripheral,
                    characteristic,
                    error,
                },
            ),
            StackEvent::NotificationStateUpdated {
                peripheral,
                characteristic,
                enabled,
                error,
            } => {
                if error.is_none() {
                    if let Some(session) = self.session_for(peripheral) {
                        session.cache().set_notifying(&characteristic, enabled);
                    }
                }
                publish(
                    &self.bus.gatt,
                    GattEvent::NotificationState {
                        peripheral,
                        characteristic,
                        enabled,
                        error,
                    },
                );
            }
            StackEvent::ReadyToSendWithoutResponse { peripheral } => {
                publish(&self.bus.gatt, GattEvent::ReadyToSend { peripheral });
            }
            StackEvent::RssiRead {
                peripheral,
                rssi,
                error,
            } => publish(
                &self.bus.gatt,
                GattEvent::Rssi {
                    peripheral,
                    rssi,
                    error,
                },
            ),
            StackEvent::NameUpdated { peripheral, name } => {
                if let Some(session) = self.session_for(peripheral) {
                    session.set_name(name.clone());
                }
                publish(&self.bus.changes, PeripheralChange::Name(name));
            }
            StackEvent::ServicesInvalidated {
                peripheral,
                services,
            } => {
                if let Some(session) = self.session_for(peripheral) {
                    session.cache().invalidate(&services);
                }
                publish(
                    &self.bus.changes,
                    PeripheralChange::InvalidatedServices(services),
                );
            }
            StackEvent::WillRestoreState(snapshot) => self.restore(snapshot),
        }
    }

    fn on_session_signal(&self, signal: SessionSignal) {
        match signal {
            SessionSignal::Ready { generation } => {
                if let Some(session) = self.session_by_generation(generation) {
                    self.transition(&session, ConnectionState::Ready, ConnectionEvent::Ready);
                }
            }
            SessionSignal::NotReady { generation, error } => {
                if let Some(session) = self.session_by_generation(generation) {
                    self.publish_connection(&session, ConnectionEvent::NotReady(Some(error)));
                }
            }
            SessionSignal::Disconnecting { generation } => {
                if let Some(session) = self.session_by_generation(generation) {
                    session.set_state(ConnectionState::Disconnecting);
                }
            }
        }
    }
}
