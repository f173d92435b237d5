use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use uuid::{Uuid, uuid};

use crate::central::CentralSession;
use crate::config::CentralConfig;
use crate::error::StackError;
use crate::model::characteristic::{CharacteristicDescriptor, CharacteristicProperties};
use crate::model::identifier::PeripheralIdentifier;
use crate::model::options::{ConnectOptions, ScanOptions};
use crate::model::state::AdapterState;
use crate::stack::{BleStack, RestoreSnapshot, StackEvent, StackEventSink};
use crate::util::lock;

pub const PERIPHERAL: Uuid = uuid!("5d7a0c2e-3c1f-4f53-9a4e-2b8d6f1e0a11");
pub const ECHO_SERVICE: Uuid = uuid!("0000fff0-0000-1000-8000-00805f9b34fb");
pub const ECHO_CHARACTERISTIC: Uuid = uuid!("0000fff1-0000-1000-8000-00805f9b34fb");
pub const STATUS_CHARACTERISTIC: Uuid = uuid!("0000fff2-0000-1000-8000-00805f9b34fb");

pub fn echo() -> CharacteristicDescriptor {
    CharacteristicDescriptor::new(
        ECHO_CHARACTERISTIC,
        ECHO_SERVICE,
        CharacteristicProperties::READ
            | CharacteristicProperties::WRITE
            | CharacteristicProperties::WRITE_WITHOUT_RESPONSE
            | CharacteristicProperties::NOTIFY,
    )
}

pub fn status() -> CharacteristicDescriptor {
    CharacteristicDescriptor::new(
        STATUS_CHARACTERISTIC,
        ECHO_SERVICE,
        CharacteristicProperties::READ,
    )
}

pub fn peripheral() -> PeripheralIdentifier {
    PeripheralIdentifier::with_name(PERIPHERAL, "echo")
}

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

pub fn test_config() -> CentralConfig {
    CentralConfig {
        ready_delay: Duration::ZERO,
        ..Default::default()
    }
}

pub fn central(stack: &Arc<FakeStack>) -> CentralSession {
    init_tracing();
    CentralSession::builder()
        .config(test_config())
        .build(stack.clone())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectBehavior {
    Accept,
    Fail(Option<StackError>),
    Ignore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteBehavior {
    Accept,
    Fail(StackError),
    Ignore,
}

/// In-memory stack hosting a single echo peripheral.
///
/// Written values are echoed back as notifications while notifications are enabled.
pub struct FakeStack {
    sink: Mutex<Option<StackEventSink>>,
    adapter: Mutex<AdapterState>,
    restore: Mutex<Option<RestoreSnapshot>>,
    known: Mutex<Vec<PeripheralIdentifier>>,
    connect: Mutex<ConnectBehavior>,
    write: Mutex<WriteBehavior>,
    values: Mutex<HashMap<CharacteristicDescriptor, Vec<u8>>>,
    notifying: Mutex<HashSet<CharacteristicDescriptor>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    respond: AtomicBool,
    can_send: AtomicBool,
}

impl FakeStack {
    pub fn new(adapter: AdapterState) -> Self {
        Self {
            sink: Mutex::new(None),
            adapter: Mutex::new(adapter),
            restore: Mutex::new(None),
            known: Mutex::new(vec![peripheral()]),
            connect: Mutex::new(ConnectBehavior::Accept),
            write: Mutex::new(WriteBehavior::Accept),
            values: Mutex::new(HashMap::new()),
            notifying: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
            respond: AtomicBool::new(true),
            can_send: AtomicBool::new(true),
        }
    }

    pub fn powered_on() -> Arc<Self> {
        Arc::new(Self::new(AdapterState::PoweredOn))
    }

    pub fn with_restore(self, snapshot: RestoreSnapshot) -> Self {
        *lock(&self.restore) = Some(snapshot);
        self
    }

    pub fn with_known(self, known: Vec<PeripheralIdentifier>) -> Self {
        *lock(&self.known) = known;
        self
    }

    pub fn set_connect(&self, behavior: ConnectBehavior) {
        *lock(&self.connect) = behavior;
    }

    pub fn set_write(&self, behavior: WriteBehavior) {
        *lock(&self.write) = behavior;
    }

    pub fn is_notifying(&self, characteristic: &CharacteristicDescriptor) -> bool {
        lock(&self.notifying).contains(characteristic)
    }

    /// Reads, writes and notify toggles are swallowed while disabled.
    pub fn set_respond(&self, respond: bool) {
        self.respond.store(respond, Ordering::SeqCst);
    }

    pub fn set_can_send(&self, can_send: bool) {
        self.can_send.store(can_send, Ordering::SeqCst);
    }

    pub fn set_value(&self, characteristic: CharacteristicDescriptor, value: &[u8]) {
        lock(&self.values).insert(characteristic, value.to_vec());
    }

    pub fn value(&self, characteristic: &CharacteristicDescriptor) -> Option<Vec<u8>> {
        lock(&self.values).get(characteristic).cloned()
    }

    pub fn calls(&self, command: &str) -> usize {
        lock(&self.calls).get(command).copied().unwrap_or(0)
    }

    pub fn emit(&self, event: StackEvent) {
        let sink = lock(&self.sink).clone();
        sink.expect("stack not attached").emit(event);
    }

    fn record(&self, command: &'static str) {
        *lock(&self.calls).entry(command).or_insert(0) += 1;
    }

    fn responds(&self) -> bool {
        self.respond.load(Ordering::SeqCst)
    }
}

impl BleStack for FakeStack {
    fn attach(&self, sink: StackEventSink, _restoration_id: Option<String>) {
        self.record("attach");
        *lock(&self.sink) = Some(sink);
        self.emit(StackEvent::AdapterStateChanged(*lock(&self.adapter)));
        let restore = lock(&self.restore).take();
        if let Some(snapshot) = restore {
            self.emit(StackEvent::WillRestoreState(snapshot));
        }
    }

    fn scan(&self, _services: Option<Vec<Uuid>>, _options: Option<ScanOptions>) {
        self.record("scan");
    }

    fn stop_scan(&self) {
        self.record("stop_scan");
    }

    fn known_peripherals(&self, ids: Vec<Uuid>) -> Vec<PeripheralIdentifier> {
        lock(&self.known)
            .iter()
            .filter(|known| ids.contains(&known.id))
            .cloned()
            .collect()
    }

    fn connect(&self, peripheral: Uuid, _options: Option<ConnectOptions>) {
        self.record("connect");
        let behavior = lock(&self.connect).clone();
        match behavior {
            ConnectBehavior::Accept => self.emit(StackEvent::Connected { peripheral }),
            ConnectBehavior::Fail(error) => {
                self.emit(StackEvent::ConnectFailed { peripheral, error })
            }
            ConnectBehavior::Ignore => {}
        }
    }

    fn cancel_connection(&self, peripheral: Uuid) {
        self.record("cancel_connection");
        lock(&self.notifying).clear();
        self.emit(StackEvent::Disconnected {
            peripheral,
            error: None,
        });
    }

    fn discover_services(&self, peripheral: Uuid, services: Option<Vec<Uuid>>) {
        self.record("discover_services");
        let mut discovered = vec![ECHO_SERVICE];
        if let Some(requested) = services {
            discovered.retain(|service| requested.contains(service));
        }
        self.emit(StackEvent::ServicesDiscovered {
            peripheral,
            services: discovered,
            error: None,
        });
    }

    fn discover_characteristics(
        &self,
        peripheral: Uuid,
        service: Uuid,
        characteristics: Option<Vec<Uuid>>,
    ) {
        self.record("discover_characteristics");
        let mut discovered = if service == ECHO_SERVICE {
            vec![echo(), status()]
        } else {
            vec![]
        };
        if let Some(requested) = characteristics {
            discovered.retain(|descriptor| requested.contains(&descriptor.characteristic));
        }
        self.emit(StackEvent::CharacteristicsDiscovered {
            peripheral,
            service,
            characteristics: discovered,
            error: None,
        });
    }

    fn read_value(&self, peripheral: Uuid, characteristic: CharacteristicDescriptor) {
        self.record("read_value");
        if !self.responds() {
            return;
        }
        self.emit(StackEvent::ValueUpdated {
            peripheral,
            characteristic,
            value: self.value(&characteristic),
            error: None,
        });
    }

    fn write_value(
        &self,
        peripheral: Uuid,
        characteristic: CharacteristicDescriptor,
        value: Vec<u8>,
        with_response: bool,
    ) {
        self.record("write_value");
        if !self.responds() {
            return;
        }
        let behavior = lock(&self.write).clone();
        match behavior {
            WriteBehavior::Accept => {}
            WriteBehavior::Fail(error) => {
                return self.emit(StackEvent::ValueWritten {
                    peripheral,
                    characteristic,
                    error: Some(error),
                });
            }
            WriteBehavior::Ignore => return,
        }
        self.set_value(characteristic, &value);
        if with_response {
            self.emit(StackEvent::ValueWritten {
                peripheral,
                characteristic,
                error: None,
            });
        }
        if lock(&self.notifying).contains(&characteristic) {
            self.emit(StackEvent::ValueUpdated {
                peripheral,
                characteristic,
                value: Some(value),
                error: None,
            });
        }
    }

    fn set_notify_value(
        &self,
        peripheral: Uuid,
        characteristic: CharacteristicDescriptor,
        enabled: bool,
    ) {
        self.record("set_notify_value");
        if !self.responds() {
            return;
        }
        if enabled {
            lock(&self.notifying).insert(characteristic);
        } else {
            lock(&self.notifying).remove(&characteristic);
        }
        self.emit(StackEvent::NotificationStateUpdated {
            peripheral,
            characteristic,
            enabled,
            error: None,
        });
    }

    fn read_rssi(&self, peripheral: Uuid) {
        self.record("read_rssi");
        self.emit(StackEvent::RssiRead {
            peripheral,
            rssi: -58,
            error: None,
        });
    }

    fn can_send_write_without_response(&self, _peripheral: Uuid) -> bool {
        self.can_send.load(Ordering::SeqCst)
    }

    fn maximum_write_value_length(&self, _peripheral: Uuid, with_response: bool) -> usize {
        if with_response { 512 } else { 182 }
    }
}
