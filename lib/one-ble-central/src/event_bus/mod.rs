//! Typed fan-out of stack callbacks.
//!
//! Every event kind has its own broadcast channel, subscribers only see what was
//! published after they subscribed. [`ReplayChannel`] additionally keeps the last
//! published value and hands it to late subscribers first.

use std::sync::Mutex;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::central::restore::Restored;
use crate::error::{BleCentralError, StackError};
use crate::model::advertisement::PeripheralDiscovery;
use crate::model::characteristic::CharacteristicDescriptor;
use crate::model::state::{AdapterState, ConnectionEvent, PeripheralChange};
use crate::util::lock;


/// Peripheral scoped GATT callbacks, after splitting value updates into reads and notifications.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GattEvent {
    ServicesDiscovered {
        peripheral: Uuid,
        services: Vec<Uuid>,
        error: Option<StackError>,
    },
    CharacteristicsDiscovered {
        peripheral: Uuid,
        service: Uuid,
        characteristics: Vec<CharacteristicDescriptor>,
        error: Option<StackError>,
    },
    ValueRead {
        peripheral: Uuid,
        characteristic: CharacteristicDescriptor,
        value: Option<Vec<u8>>,
        error: Option<StackError>,
    },
    Notification(Notification),
    ValueWritten {
        peripheral: Uuid,
        characteristic: CharacteristicDescriptor,
        error: Option<StackError>,
    },
    NotificationState {
        peripheral: Uuid,
        characteristic: CharacteristicDescriptor,
        enabled: bool,
        error: Option<StackError>,
    },
    ReadyToSend {
        peripheral: Uuid,
    },
    Rssi {
        peripheral: Uuid,
        rssi: i16,
        error: Option<StackError>,
    },
}

impl GattEvent {
    pub(crate) fn peripheral(&self) -> Uuid {
        match self {
            GattEvent::ServicesDiscovered { peripheral, .. }
            | GattEvent::CharacteristicsDiscovered { peripheral, .. }
            | GattEvent::ValueRead { peripheral, .. }
            | GattEvent::ValueWritten { peripheral, .. }
            | GattEvent::NotificationState { peripheral, .. }
            | GattEvent::ReadyToSend { peripheral }
            | GattEvent::Rssi { peripheral, .. } => *peripheral,
            GattEvent::Notification(notification) => notification.peripheral,
        }
    }
}

/// Value pushed by a subscribed characteristic.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub peripheral: Uuid,
    pub characteristic: CharacteristicDescriptor,
    pub value: Option<Vec<u8>>,
}

pub(crate) struct EventBus {
    pub adapter: ReplayChannel<AdapterState>,
    pub discoveries: broadcast::Sender<PeripheralDiscovery>,
    pub connection: broadcast::Sender<ConnectionEvent>,
    pub gatt: broadcast::Sender<GattEvent>,
    pub notifications: broadcast::Sender<Notification>,
    pub changes: broadcast::Sender<PeripheralChange>,
    pub restore: ReplayChannel<Restored>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            adapter: ReplayChannel::new(capacity),
            discoveries: broadcast::channel(capacity).0,
            connection: broadcast::channel(capacity).0,
            gatt: broadcast::channel(capacity).0,
            notifications: broadcast::channel(capacity).0,
            changes: broadcast::channel(capacity).0,
            restore: ReplayChannel::new(capacity),
        }
    }
}

/// Publishes to every current subscriber, nobody listening is not an error.
pub(crate) fn publish<T>(tx: &broadcast::Sender<T>, value: T) {
    if tx.send(value).is_err() {
        tracing::trace!("no subscribers for published event");
    }
}

/// Waits for the next value, skipping over values lost to lagging.
pub(crate) async fn next_event<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Option<T> {
    loop {
        match rx.recv().await {
            Ok(value) => return Some(value),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("BLE event subscriber lagged, {skipped} events skipped");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

pub(crate) fn into_stream<T>(rx: broadcast::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + 'static,
{
    futures::stream::unfold(rx, |mut rx| async move {
        next_event(&mut rx).await.map(|value| (value, rx))
    })
    .boxed()
}

/// Broadcast channel paired with a single slot holding the last published value.
pub(crate) struct ReplayChannel<T> {
    tx: broadcast::Sender<T>,
    last: Mutex<Option<T>>,
}

impl<T: Clone> ReplayChannel<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
            last: Mutex::new(None),
        }
    }

    pub fn send(&self, value: T) {
        let mut last = lock(&self.last);
        *last = Some(value.clone());
        publish(&self.tx, value);
    }

    pub fn latest(&self) -> Option<T> {
        lock(&self.last).clone()
    }

    pub fn subscribe(&self) -> Replay<T> {
        let last = lock(&self.last);
        Replay {
            pending: last.clone(),
            rx: self.tx.subscribe(),
        }
    }
}

/// Subscription to a [`ReplayChannel`], yields the replayed value before live ones.
pub(crate) struct Replay<T> {
    pending: Option<T>,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone + Send + 'static> Replay<T> {
    pub async fn recv(&mut self) -> Result<T, BleCentralError> {
        if let Some(value) = self.pending.take() {
            return Ok(value);
        }
        next_event(&mut self.rx)
            .await
            .ok_or(BleCentralError::SessionClosed)
    }

    pub fn into_stream(self) -> BoxStream<'static, T> {
        futures::stream::unfold(self, |mut replay| async move {
            replay.recv().await.ok().map(|value| (value, replay))
        })
        .boxed()
    }
}
