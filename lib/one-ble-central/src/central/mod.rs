//! Public surface composing discovery, connection lifecycle and GATT operations
//! around a single peripheral session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{StreamExt, future};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use self::dispatcher::Inbound;
use self::discovery::ActiveScan;
use self::restore::Restored;
use crate::broker::OperationBroker;
use crate::codec::{Readable, Writable};
use crate::config::CentralConfig;
use crate::error::BleCentralError;
use crate::event_bus::{EventBus, into_stream};
use crate::model::advertisement::PeripheralDiscovery;
use crate::model::characteristic::CharacteristicDescriptor;
use crate::model::identifier::PeripheralIdentifier;
use crate::model::options::{ConnectOptions, ScanOptions};
use crate::model::state::{AdapterState, ConnectionEvent, PeripheralChange};
use crate::session::{Peripheral, PeripheralSession};
use crate::stack::{BleStack, StackEventSink};
use crate::util::{lock, with_timeout};

pub(crate) mod connection;
pub(crate) mod discovery;
pub(crate) mod dispatcher;
pub(crate) mod gatt;
pub(crate) mod restore;


/// Decides whether an unexpected disconnect should be followed by a reconnect attempt.
pub type AutoReconnectPolicy =
    Arc<dyn Fn(&PeripheralIdentifier, &BleCentralError) -> bool + Send + Sync>;

/// Work run after every (re)connection, before the session is reported ready.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait::async_trait]
pub trait ConnectionTask: Send + Sync {
    async fn run(&self, peripheral: &Peripheral) -> Result<(), BleCentralError>;
}

pub(crate) struct Inner {
    pub stack: Arc<dyn BleStack>,
    pub bus: EventBus,
    pub broker: OperationBroker,
    pub config: CentralConfig,
    auto_reconnect: Option<AutoReconnectPolicy>,
    connection_task: Option<Arc<dyn ConnectionTask>>,
    runtime: Handle,
    inbound: mpsc::UnboundedSender<Inbound>,
    slot: Mutex<Option<Arc<PeripheralSession>>>,
    scan: Mutex<Option<ActiveScan>>,
    sequence: AtomicU64,
    shutdown: CancellationToken,
    weak: Weak<Inner>,
}

impl Inner {
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn signal(&self, inbound: Inbound) {
        if self.inbound.send(inbound).is_err() {
            tracing::warn!("BLE event dispatcher stopped, signal dropped");
        }
    }

    pub(crate) fn peripheral_handle(&self, session: &Arc<PeripheralSession>) -> Peripheral {
        Peripheral::new(session.clone(), self.weak.clone())
    }

    pub(crate) fn current_session(&self) -> Option<Arc<PeripheralSession>> {
        lock(&self.slot).clone()
    }

    pub(crate) fn session_for(&self, peripheral: Uuid) -> Option<Arc<PeripheralSession>> {
        self.current_session()
            .filter(|session| session.id() == peripheral)
    }

    pub(crate) fn session_by_generation(&self, generation: u64) -> Option<Arc<PeripheralSession>> {
        self.current_session()
            .filter(|session| session.generation() == generation)
    }

    /// Waits out transient adapter states, fails on any state other than powered on.
    pub(crate) async fn ensure_adapter_powered_on(&self) -> Result<(), BleCentralError> {
        let mut states = self.bus.adapter.subscribe();
        loop {
            let state = states.recv().await?;
            match state.readiness() {
                Some(result) => return result,
                None => tracing::debug!("waiting for Bluetooth adapter, state: {state}"),
            }
        }
    }

    async fn ready_peripheral(&self) -> Result<Peripheral, BleCentralError> {
        self.ensure_adapter_powered_on().await?;
        self.ensure_ready().await
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(scan) = lock(&self.scan).take() {
            scan.cancel();
        }
    }
}

#[derive(Default)]
pub struct CentralSessionBuilder {
    config: CentralConfig,
    auto_reconnect: Option<AutoReconnectPolicy>,
    connection_task: Option<Arc<dyn ConnectionTask>>,
    runtime: Option<Handle>,
}

impl CentralSessionBuilder {
    pub fn config(mut self, config: CentralConfig) -> Self {
        self.config = config;
        self
    }

    pub fn auto_reconnect(
        mut self,
        policy: impl Fn(&PeripheralIdentifier, &BleCentralError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.auto_reconnect = Some(Arc::new(policy));
        self
    }

    pub fn connection_task(mut self, task: Arc<dyn ConnectionTask>) -> Self {
        self.connection_task = Some(task);
        self
    }

    /// Runtime executing the event dispatcher and background reconnects.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Attaches to `stack` and starts dispatching its callbacks.
    ///
    /// # Panics
    ///
    /// When no runtime was configured and this is called outside of a tokio runtime.
    pub fn build(self, stack: Arc<dyn BleStack>) -> CentralSession {
        let runtime = self.runtime.unwrap_or_else(Handle::current);
        let (inbound, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let inner = Arc::new_cyclic(|weak| Inner {
            stack: stack.clone(),
            bus: EventBus::new(self.config.event_capacity),
            broker: OperationBroker::default(),
            auto_reconnect: self.auto_reconnect,
            connection_task: self.connection_task,
            runtime: runtime.clone(),
            inbound: inbound.clone(),
            slot: Mutex::new(None),
            scan: Mutex::new(None),
            sequence: AtomicU64::new(1),
            shutdown: shutdown.clone(),
            weak: weak.clone(),
            config: self.config,
        });

        runtime.spawn(dispatcher::run(Arc::downgrade(&inner), receiver, shutdown));
        stack.attach(
            StackEventSink::new(inbound),
            inner.config.restoration_id.clone(),
        );

        CentralSession { inner }
    }
}

/// Session facade over the platform Bluetooth stack, owning at most one peripheral session.
#[derive(Clone)]
pub struct CentralSession {
    inner: Arc<Inner>,
}

impl CentralSession {
    pub fn builder() -> CentralSessionBuilder {
        CentralSessionBuilder::default()
    }

    pub fn new(stack: Arc<dyn BleStack>) -> Self {
        Self::builder().build(stack)
    }

    pub fn config(&self) -> &CentralConfig {
        &self.inner.config
    }

    /// Adapter state changes, replaying the latest state to new subscribers.
    pub fn adapter_state(&self) -> BoxStream<'static, AdapterState> {
        self.inner.bus.adapter.subscribe().into_stream()
    }

    pub fn current_adapter_state(&self) -> AdapterState {
        self.inner.bus.adapter.latest().unwrap_or_default()
    }

    pub fn connection_events(&self) -> BoxStream<'static, ConnectionEvent> {
        into_stream(self.inner.bus.connection.subscribe())
    }

    pub fn peripheral_changes(&self) -> BoxStream<'static, PeripheralChange> {
        into_stream(self.inner.bus.changes.subscribe())
    }

    /// Outcome of state restoration, replayed to late subscribers.
    pub fn restore_events(&self) -> BoxStream<'static, Restored> {
        self.inner.bus.restore.subscribe().into_stream()
    }

    /// Every notification of the current session, payload-less ones are skipped.
    pub fn listen_stream(&self) -> BoxStream<'static, (CharacteristicDescriptor, Vec<u8>)> {
        into_stream(self.inner.bus.notifications.subscribe())
            .filter_map(|notification| {
                future::ready(
                    notification
                        .value
                        .map(|value| (notification.characteristic, value)),
                )
            })
            .boxed()
    }

    pub fn peripheral(&self) -> Option<Peripheral> {
        self.inner
            .current_session()
            .map(|session| self.inner.peripheral_handle(&session))
    }

    pub fn known_peripherals(&self, ids: &[Uuid]) -> Vec<PeripheralIdentifier> {
        self.inner.stack.known_peripherals(ids.to_vec())
    }

    pub fn is_scanning(&self) -> bool {
        lock(&self.inner.scan).is_some()
    }

    /// Starts scanning, restarting an already running scan.
    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn start_discovery(
        &self,
        services: Option<Vec<Uuid>>,
        options: Option<ScanOptions>,
        timeout: Option<Duration>,
    ) -> Result<BoxStream<'static, Result<PeripheralDiscovery, BleCentralError>>, BleCentralError>
    {
        let timeout = timeout.or(self.inner.config.scan_timeout);
        with_timeout(
            timeout,
            BleCentralError::ScanTimeout,
            self.inner.ensure_adapter_powered_on(),
        )
        .await?;
        Ok(self
            .inner
            .begin_scan(services, options, timeout)
            .into_stream())
    }

    pub fn stop_discovery(&self) {
        self.inner.stop_scan();
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn connect(
        &self,
        identifier: &PeripheralIdentifier,
        options: Option<ConnectOptions>,
        timeout: Option<Duration>,
    ) -> Result<Peripheral, BleCentralError> {
        let timeout = timeout.or(self.inner.config.connect_timeout);
        self.inner
            .connect_with(identifier.clone(), options, false, timeout)
            .await
    }

    /// Stops scanning, then connects to the discovered peripheral.
    pub async fn connect_discovery(
        &self,
        discovery: &PeripheralDiscovery,
        options: Option<ConnectOptions>,
        timeout: Option<Duration>,
    ) -> Result<Peripheral, BleCentralError> {
        self.stop_discovery();
        self.connect(&discovery.peripheral, options, timeout).await
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn disconnect(&self) -> Result<Peripheral, BleCentralError> {
        with_timeout(
            self.inner.config.operation_timeout,
            BleCentralError::OperationTimeout,
            self.inner.disconnect(),
        )
        .await
    }

    /// Current peripheral once ready, waiting while a post-connect task is running.
    ///
    /// Fails with the task's error as soon as the session reports `NotReady`
    /// instead of waiting for a later `Ready`.
    pub async fn ensure_ready(&self) -> Result<Peripheral, BleCentralError> {
        self.inner.ensure_ready().await
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn read_rssi(&self, timeout: Option<Duration>) -> Result<i16, BleCentralError> {
        with_timeout(
            timeout.or(self.inner.config.operation_timeout),
            BleCentralError::OperationTimeout,
            async { self.inner.ready_peripheral().await?.read_rssi().await },
        )
        .await
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn read(
        &self,
        characteristic: &CharacteristicDescriptor,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, BleCentralError> {
        with_timeout(
            timeout.or(self.inner.config.read_timeout),
            BleCentralError::ReadTimeout,
            async {
                self.inner
                    .ready_peripheral()
                    .await?
                    .read(characteristic)
                    .await
            },
        )
        .await
    }

    #[tracing::instrument(level = "debug", skip(self, data), fields(len = data.len()), err(Debug))]
    pub async fn write(
        &self,
        characteristic: &CharacteristicDescriptor,
        data: Vec<u8>,
        with_response: bool,
        timeout: Option<Duration>,
    ) -> Result<(), BleCentralError> {
        with_timeout(
            timeout.or(self.inner.config.write_timeout),
            BleCentralError::WriteTimeout,
            async {
                self.inner
                    .ready_peripheral()
                    .await?
                    .write(characteristic, data, with_response)
                    .await
            },
        )
        .await
    }

    #[tracing::instrument(level = "debug", skip(self, data), fields(len = data.len()), err(Debug))]
    pub async fn write_and_listen(
        &self,
        characteristic: &CharacteristicDescriptor,
        data: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, BleCentralError> {
        with_timeout(
            timeout.or(self.inner.config.write_and_listen_timeout),
            BleCentralError::WriteAndListenTimeout,
            async {
                self.inner
                    .ready_peripheral()
                    .await?
                    .write_and_listen(characteristic, data)
                    .await
            },
        )
        .await
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn enable_listen(
        &self,
        characteristic: &CharacteristicDescriptor,
        timeout: Option<Duration>,
    ) -> Result<(), BleCentralError> {
        with_timeout(
            timeout.or(self.inner.config.operation_timeout),
            BleCentralError::OperationTimeout,
            async {
                self.inner
                    .ready_peripheral()
                    .await?
                    .enable_listen(characteristic)
                    .await
            },
        )
        .await
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn disable_listen(
        &self,
        characteristic: &CharacteristicDescriptor,
        timeout: Option<Duration>,
    ) -> Result<(), BleCentralError> {
        with_timeout(
            timeout.or(self.inner.config.operation_timeout),
            BleCentralError::OperationTimeout,
            async {
                self.inner
                    .ready_peripheral()
                    .await?
                    .disable_listen(characteristic)
                    .await
            },
        )
        .await
    }

    pub async fn read_value<T: Readable>(
        &self,
        characteristic: &CharacteristicDescriptor,
        timeout: Option<Duration>,
    ) -> Result<T, BleCentralError> {
        T::from_bytes(&self.read(characteristic, timeout).await?)
    }

    pub async fn write_value<T: Writable + ?Sized>(
        &self,
        characteristic: &CharacteristicDescriptor,
        value: &T,
        with_response: bool,
        timeout: Option<Duration>,
    ) -> Result<(), BleCentralError> {
        self.write(characteristic, value.to_bytes(), with_response, timeout)
            .await
    }

    pub async fn write_and_listen_value<T: Readable, W: Writable + ?Sized>(
        &self,
        characteristic: &CharacteristicDescriptor,
        value: &W,
        timeout: Option<Duration>,
    ) -> Result<T, BleCentralError> {
        T::from_bytes(
            &self
                .write_and_listen(characteristic, value.to_bytes(), timeout)
                .await?,
        )
    }

    /// Enables notifications and streams the decoded values of `characteristic`.
    pub async fn start_listen<T: Readable + Send + 'static>(
        &self,
        characteristic: &CharacteristicDescriptor,
        timeout: Option<Duration>,
    ) -> Result<BoxStream<'static, Result<T, BleCentralError>>, BleCentralError> {
        let notifications = self.inner.bus.notifications.subscribe();
        self.enable_listen(characteristic, timeout).await?;

        let characteristic = *characteristic;
        Ok(into_stream(notifications)
            .filter(move |notification| future::ready(notification.characteristic == characteristic))
            .map(|notification| {
                notification
                    .value
                    .ok_or(BleCentralError::EmptyData)
                    .and_then(|value| T::from_bytes(&value))
            })
            .boxed())
    }
}
