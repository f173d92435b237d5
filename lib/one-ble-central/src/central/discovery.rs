use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::Inner;
use crate::error::BleCentralError;
use crate::event_bus::next_event;
use crate::model::advertisement::PeripheralDiscovery;
use crate::model::options::ScanOptions;
use crate::util::lock;

pub(crate) struct ActiveScan {
    id: u64,
    token: CancellationToken,
    timed_out: Arc<AtomicBool>,
}

impl ActiveScan {
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }
}

/// Subscription to the discoveries of one scan, ends when that scan stops.
pub struct DiscoverySubscription {
    receiver: broadcast::Receiver<PeripheralDiscovery>,
    token: CancellationToken,
    timed_out: Arc<AtomicBool>,
}

impl Clone for DiscoverySubscription {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            token: self.token.clone(),
            timed_out: self.timed_out.clone(),
        }
    }
}

impl std::fmt::Debug for DiscoverySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoverySubscription")
            .field("stopped", &self.token.is_cancelled())
            .finish()
    }
}

impl DiscoverySubscription {
    /// Discoveries until the scan stops, a timed out scan ends with [`BleCentralError::ScanTimeout`].
    pub fn into_stream(self) -> BoxStream<'static, Result<PeripheralDiscovery, BleCentralError>> {
        futures::stream::unfold(Some(self), |subscription| async move {
            let mut subscription = subscription?;
            tokio::select! {
                biased;
                _ = subscription.token.cancelled() => subscription
                    .timed_out
                    .load(Ordering::SeqCst)
                    .then_some((Err(BleCentralError::ScanTimeout), None)),
                discovery = next_event(&mut subscription.receiver) => {
                    discovery.map(|discovery| (Ok(discovery), Some(subscription)))
                }
            }
        })
        .boxed()
    }
}

impl Inner {
    /// Starts a scan, stopping the one in progress first.
    pub(crate) fn begin_scan(
        self: &Arc<Self>,
        services: Option<Vec<Uuid>>,
        options: Option<ScanOptions>,
        timeout: Option<Duration>,
    ) -> DiscoverySubscription {
        let id = self.next_sequence();
        let token = CancellationToken::new();
        let timed_out = Arc::new(AtomicBool::new(false));
        let receiver = self.bus.discoveries.subscribe();

        {
            let mut scan = lock(&self.scan);
            if let Some(previous) = scan.take() {
                tracing::debug!("restarting running scan");
                previous.cancel();
                self.stack.stop_scan();
            }
            *scan = Some(ActiveScan {
                id,
                token: token.clone(),
                timed_out: timed_out.clone(),
            });
            self.stack.scan(services, options);
        }

        if let Some(timeout) = timeout {
            let central = Arc::downgrade(self);
            let token = token.clone();
            self.runtime.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        if let Some(central) = central.upgrade() {
                            central.expire_scan(id);
                        }
                    }
                }
            });
        }

        DiscoverySubscription {
            receiver,
            token,
            timed_out,
        }
    }

    pub(crate) fn stop_scan(&self) {
        let active = lock(&self.scan).take();
        match active {
            Some(active) => {
                active.cancel();
                self.stack.stop_scan();
                tracing::debug!("scan stopped");
            }
            None => tracing::debug!("no scan to stop"),
        }
    }

    fn expire_scan(&self, id: u64) {
        let mut scan = lock(&self.scan);
        if scan.as_ref().is_some_and(|active| active.id == id) {
            if let Some(active) = scan.take() {
                active.timed_out.store(true, Ordering::SeqCst);
                active.cancel();
                self.stack.stop_scan();
                tracing::debug!("scan timed out");
            }
        }
    }
}
