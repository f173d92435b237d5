use std::sync::Arc;

use tokio::time::Instant;
use uuid::Uuid;

use super::Inner;
use super::discovery::DiscoverySubscription;
use crate::model::identifier::PeripheralIdentifier;
use crate::model::options::ScanOptions;
use crate::model::state::{ConnectionEvent, ConnectionState, PeripheralState};
use crate::session::{Peripheral, PeripheralSession};
use crate::stack::RestoreSnapshot;
use crate::util::lock;

/// What was resumed after the platform restored the session.
#[derive(Debug, Clone)]
pub enum Restored {
    Scanning {
        services: Option<Vec<Uuid>>,
        options: Option<ScanOptions>,
        discoveries: DiscoverySubscription,
    },
    Peripheral(Peripheral),
    Nothing,
}

impl Inner {
    pub(crate) fn restore(self: &Arc<Self>, snapshot: RestoreSnapshot) {
        let restored = if let Some(scan) = snapshot.scan {
            tracing::info!(services = ?scan.services, "restoring scan");
            let discoveries = self.begin_scan(
                scan.services.clone(),
                scan.options.clone(),
                self.config.scan_timeout,
            );
            Restored::Scanning {
                services: scan.services,
                options: scan.options,
                discoveries,
            }
        } else if let Some((identifier, state)) = snapshot.peripherals.into_iter().next() {
            tracing::info!(peripheral = %identifier.id, %state, "restoring peripheral");
            Restored::Peripheral(self.attach_restored(identifier, state))
        } else {
            tracing::debug!("nothing to restore");
            Restored::Nothing
        };

        self.bus.restore.send(restored);
    }

    fn attach_restored(
        self: &Arc<Self>,
        identifier: PeripheralIdentifier,
        state: PeripheralState,
    ) -> Peripheral {
        let initial = match state {
            PeripheralState::Connected | PeripheralState::Connecting => ConnectionState::Connecting,
            PeripheralState::Disconnecting => ConnectionState::Disconnecting,
            PeripheralState::Disconnected => ConnectionState::Idle,
        };
        let session = Arc::new(PeripheralSession::new(
            identifier,
            self.next_sequence(),
            initial,
            self.config.event_capacity,
        ));

        let previous = self.current_session();
        if let Some(previous) = previous {
            tracing::warn!(peripheral = %previous.id(), "restored session replaces existing one");
            self.teardown(&previous, None);
        }
        *lock(&self.slot) = Some(session.clone());

        if initial == ConnectionState::Connecting {
            let events = session.events();
            if state == PeripheralState::Connected {
                self.transition(&session, ConnectionState::Connected, ConnectionEvent::Connected);
            }

            let deadline = self
                .config
                .connect_timeout
                .map(|timeout| Instant::now() + timeout);
            let central = self.clone();
            let connecting = session.clone();
            self.runtime.spawn(async move {
                if let Err(err) = central.finish_connect(connecting, events, deadline).await {
                    tracing::warn!("restored connection failed: {err}");
                }
            });
        }

        self.peripheral_handle(&session)
    }
}
