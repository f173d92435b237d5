//! Interface of the platform Bluetooth stack.
//!
//! Commands are fire-and-forget; their outcome arrives later as a [`StackEvent`]
//! pushed into the [`StackEventSink`] handed over in [`BleStack::attach`].

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::central::dispatcher::Inbound;
use crate::error::StackError;
use crate::model::advertisement::PeripheralDiscovery;
use crate::model::characteristic::CharacteristicDescriptor;
use crate::model::identifier::PeripheralIdentifier;
use crate::model::options::{ConnectOptions, ScanOptions};
use crate::model::state::{AdapterState, PeripheralState};

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait BleStack: Send + Sync {
    /// Called once when the central session is built.
    fn attach(&self, sink: StackEventSink, restoration_id: Option<String>);

    fn scan(&self, services: Option<Vec<Uuid>>, options: Option<ScanOptions>);
    fn stop_scan(&self);

    fn known_peripherals(&self, ids: Vec<Uuid>) -> Vec<PeripheralIdentifier>;
    fn connect(&self, peripheral: Uuid, options: Option<ConnectOptions>);
    fn cancel_connection(&self, peripheral: Uuid);

    fn discover_services(&self, peripheral: Uuid, services: Option<Vec<Uuid>>);
    fn discover_characteristics(
        &self,
        peripheral: Uuid,
        service: Uuid,
        characteristics: Option<Vec<Uuid>>,
    );

    fn read_value(&self, peripheral: Uuid, characteristic: CharacteristicDescriptor);
    fn write_value(
        &self,
        peripheral: Uuid,
        characteristic: CharacteristicDescriptor,
        value: Vec<u8>,
        with_response: bool,
    );
    fn set_notify_value(
        &self,
        peripheral: Uuid,
        characteristic: CharacteristicDescriptor,
        enabled: bool,
    );
    fn read_rssi(&self, peripheral: Uuid);

    fn can_send_write_without_response(&self, peripheral: Uuid) -> bool;
    fn maximum_write_value_length(&self, peripheral: Uuid, with_response: bool) -> usize;
}

/// Callback delivered by the stack.
#[derive(Debug, Clone, PartialEq)]
pub enum StackEvent {
    AdapterStateChanged(AdapterState),
    PeripheralDiscovered(PeripheralDiscovery),
    Connected {
        peripheral: Uuid,
    },
    ConnectFailed {
        peripheral: Uuid,
        error: Option<StackError>,
    },
    Disconnected {
        peripheral: Uuid,
        error: Option<StackError>,
    },
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
    ValueUpdated {
        peripheral: Uuid,
        characteristic: CharacteristicDescriptor,
        value: Option<Vec<u8>>,
        error: Option<StackError>,
    },
    ValueWritten {
        peripheral: Uuid,
        characteristic: CharacteristicDescriptor,
        error: Option<StackError>,
    },
    NotificationStateUpdated {
        peripheral: Uuid,
        characteristic: CharacteristicDescriptor,
        enabled: bool,
        error: Option<StackError>,
    },
    ReadyToSendWithoutResponse {
        peripheral: Uuid,
    },
    RssiRead {
        peripheral: Uuid,
        rssi: i16,
        error: Option<StackError>,
    },
    NameUpdated {
        peripheral: Uuid,
        name: Option<String>,
    },
    ServicesInvalidated {
        peripheral: Uuid,
        services: Vec<Uuid>,
    },
    WillRestoreState(RestoreSnapshot),
}

/// What the stack reports was in flight before the process restarted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreSnapshot {
    pub peripherals: Vec<(PeripheralIdentifier, PeripheralState)>,
    pub scan: Option<RestoredScan>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoredScan {
    pub services: Option<Vec<Uuid>>,
    pub options: Option<ScanOptions>,
}

#[derive(Clone)]
pub struct StackEventSink {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl StackEventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: StackEvent) {
        if self.tx.send(Inbound::Stack(event)).is_err() {
            tracing::debug!("BLE central dropped, stack event discarded");
        }
    }
}

impl std::fmt::Debug for StackEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackEventSink")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
