//! GATT operations of a connected peripheral.
//!
//! Every round trip to the stack goes through the operation broker, discovered
//! attributes are served from the session cache.

use uuid::Uuid;

use crate::error::BleCentralError;
use crate::event_bus::GattEvent;
use crate::model::characteristic::CharacteristicDescriptor;
use crate::session::Peripheral;

impl Peripheral {
    /// Services of the peripheral, limited to `service` when given.
    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn services(&self, service: Option<Uuid>) -> Result<Vec<Uuid>, BleCentralError> {
        self.session.ensure_connected()?;

        let cached = self.session.cache().lookup_services(service);
        let services = match cached {
            Some(services) => services,
            None => {
                let central = self.central()?;
                let peripheral = self.id();
                let discovered = central
                    .broker
                    .issue(
                        &self.session,
                        &central.bus.gatt,
                        || {
                            central
                                .stack
                                .discover_services(peripheral, service.map(|uuid| vec![uuid]))
                        },
                        |event| match event {
                            GattEvent::ServicesDiscovered {
                                services, error, ..
                            } => Some(match error {
                                Some(cause) => Err(BleCentralError::ServiceNotFound {
                                    service,
                                    cause: Some(cause.clone()),
                                }),
                                None => Ok(services.clone()),
                            }),
                            _ => None,
                        },
                    )
                    .await?;
                self.session
                    .cache()
                    .store_services(&discovered, service.is_none());
                discovered
            }
        };

        match service {
            None => Ok(services),
            Some(uuid) if services.contains(&uuid) => Ok(vec![uuid]),
            Some(_) => Err(BleCentralError::ServiceNotFound {
                service,
                cause: None,
            }),
        }
    }

    /// Characteristics of `service`, all of them when `requested` is empty.
    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn characteristics(
        &self,
        service: Uuid,
        requested: &[Uuid],
    ) -> Result<Vec<CharacteristicDescriptor>, BleCentralError> {
        self.session.ensure_connected()?;

        let cached = self
            .session
            .cache()
            .lookup_characteristics(service, requested);
        let characteristics = match cached {
            Some(characteristics) => characteristics,
            None => {
                let central = self.central()?;
                let peripheral = self.id();
                let filter = (!requested.is_empty()).then(|| requested.to_vec());
                let first_requested = requested.first().copied();
                let discovered = central
                    .broker
                    .issue(
                        &self.session,
                        &central.bus.gatt,
                        || {
                            central
                                .stack
                                .discover_characteristics(peripheral, service, filter)
                        },
                        |event| match event {
                            GattEvent::CharacteristicsDiscovered {
                                service: discovered_service,
                                characteristics,
                                error,
                                ..
                            } if *discovered_service == service => Some(match error {
                                Some(cause) => Err(BleCentralError::CharacteristicNotFound {
                                    characteristic: first_requested,
                                    cause: Some(cause.clone()),
                                }),
                                None => Ok(characteristics.clone()),
                            }),
                            _ => None,
                        },
                    )
                    .await?;
                self.session.cache().store_characteristics(
                    service,
                    &discovered,
                    requested.is_empty(),
                );
                discovered
            }
        };

        if requested.is_empty() {
            return Ok(characteristics);
        }
        if let Some(missing) = requested.iter().find(|uuid| {
            !characteristics
                .iter()
                .any(|descriptor| descriptor.characteristic == **uuid)
        }) {
            return Err(BleCentralError::CharacteristicNotFound {
                characteristic: Some(*missing),
                cause: None,
            });
        }
        Ok(characteristics
            .into_iter()
            .filter(|descriptor| requested.contains(&descriptor.characteristic))
            .collect())
    }

    /// Resolves `service`, then the `requested` characteristics inside it.
    pub async fn discover_characteristics(
        &self,
        service: Uuid,
        requested: &[Uuid],
    ) -> Result<Vec<CharacteristicDescriptor>, BleCentralError> {
        self.services(Some(service)).await?;
        self.characteristics(service, requested).await
    }

    /// Discovered descriptor of `characteristic`, carrying the reported properties.
    async fn resolve(
        &self,
        characteristic: &CharacteristicDescriptor,
    ) -> Result<CharacteristicDescriptor, BleCentralError> {
        let cached = self.session.cache().descriptor(characteristic);
        if let Some(descriptor) = cached {
            return Ok(descriptor);
        }

        self.discover_characteristics(characteristic.service, &[characteristic.characteristic])
            .await?
            .into_iter()
            .find(|descriptor| descriptor == characteristic)
            .ok_or(BleCentralError::CharacteristicNotFound {
                characteristic: Some(characteristic.characteristic),
                cause: None,
            })
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn read(
        &self,
        characteristic: &CharacteristicDescriptor,
    ) -> Result<Vec<u8>, BleCentralError> {
        self.session.ensure_connected()?;
        let descriptor = self.resolve(characteristic).await?;
        let central = self.central()?;
        let peripheral = self.id();

        central
            .broker
            .issue(
                &self.session,
                &central.bus.gatt,
                || central.stack.read_value(peripheral, descriptor),
                |event| match event {
                    GattEvent::ValueRead {
                        characteristic,
                        value,
                        error,
                        ..
                    } if *characteristic == descriptor => Some(match error {
                        Some(cause) => Err(BleCentralError::CouldNotReadCharacteristic {
                            characteristic: descriptor.characteristic,
                            cause: Some(cause.clone()),
                        }),
                        None => value.clone().ok_or(BleCentralError::EmptyData),
                    }),
                    GattEvent::Notification(notification)
                        if notification.characteristic == descriptor =>
                    {
                        Some(notification.value.clone().ok_or(BleCentralError::EmptyData))
                    }
                    _ => None,
                },
            )
            .await
    }

    /// Writes `data`, without response only waits until the stack can take the write.
    #[tracing::instrument(level = "debug", skip(self, data), fields(len = data.len()), err(Debug))]
    pub async fn write(
        &self,
        characteristic: &CharacteristicDescriptor,
        data: Vec<u8>,
        with_response: bool,
    ) -> Result<(), BleCentralError> {
        self.session.ensure_connected()?;
        let descriptor = self.resolve(characteristic).await?;
        let central = self.central()?;
        let peripheral = self.id();

        if with_response {
            return central
                .broker
                .issue(
                    &self.session,
                    &central.bus.gatt,
                    || central.stack.write_value(peripheral, descriptor, data, true),
                    |event| match event {
                        GattEvent::ValueWritten {
                            characteristic,
                            error,
                            ..
                        } if *characteristic == descriptor => Some(match error {
                            Some(cause) => Err(BleCentralError::CouldNotWriteCharacteristic {
                                characteristic: descriptor.characteristic,
                                cause: Some(cause.clone()),
                            }),
                            None => Ok(()),
                        }),
                        _ => None,
                    },
                )
                .await;
        }

        let ready = central.bus.gatt.subscribe();
        if !central.stack.can_send_write_without_response(peripheral) {
            tracing::debug!(%peripheral, "waiting until ready to send without response");
            central
                .broker
                .issue_on(
                    &self.session,
                    ready,
                    || {},
                    |event| matches!(event, GattEvent::ReadyToSend { .. }).then_some(Ok(())),
                )
                .await?;
        }

        self.session.ensure_connected()?;
        central
            .stack
            .write_value(peripheral, descriptor, data, false);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn enable_listen(
        &self,
        characteristic: &CharacteristicDescriptor,
    ) -> Result<(), BleCentralError> {
        self.set_notify(characteristic, true).await
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn disable_listen(
        &self,
        characteristic: &CharacteristicDescriptor,
    ) -> Result<(), BleCentralError> {
        self.set_notify(characteristic, false).await
    }

    async fn set_notify(
        &self,
        characteristic: &CharacteristicDescriptor,
        enabled: bool,
    ) -> Result<(), BleCentralError> {
        self.session.ensure_connected()?;
        let descriptor = self.resolve(characteristic).await?;

        let notifying = self.session.cache().is_notifying(&descriptor);
        if notifying == enabled {
            tracing::debug!(characteristic = %descriptor.characteristic, enabled, "notification state unchanged");
            return Ok(());
        }

        let central = self.central()?;
        let peripheral = self.id();
        central
            .broker
            .issue(
                &self.session,
                &central.bus.gatt,
                || {
                    central
                        .stack
                        .set_notify_value(peripheral, descriptor, enabled)
                },
                |event| match event {
                    GattEvent::NotificationState {
                        characteristic,
                        enabled: updated,
                        error,
                        ..
                    } if *characteristic == descriptor => match error {
                        Some(cause) => Some(Err(BleCentralError::CouldNotUpdateNotificationState {
                            characteristic: descriptor.characteristic,
                            cause: Some(cause.clone()),
                        })),
                        None => (*updated == enabled).then_some(Ok(())),
                    },
                    _ => None,
                },
            )
            .await
    }

    /// Writes `data` with response and returns the next notification of the same characteristic.
    ///
    /// Notifications are turned off again afterwards, also when the write fails or the
    /// returned future is dropped.
    #[tracing::instrument(level = "debug", skip(self, data), fields(len = data.len()), err(Debug))]
    pub async fn write_and_listen(
        &self,
        characteristic: &CharacteristicDescriptor,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, BleCentralError> {
        self.enable_listen(characteristic).await?;
        let guard = ListenGuard {
            peripheral: Some(self.clone()),
            characteristic: *characteristic,
        };

        let response = self.write_for_notification(characteristic, data).await;
        let disabled = self.disable_listen(characteristic).await;
        guard.disarm();

        let response = response?;
        disabled?;
        Ok(response)
    }

    async fn write_for_notification(
        &self,
        characteristic: &CharacteristicDescriptor,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, BleCentralError> {
        let central = self.central()?;
        let notifications = central.bus.gatt.subscribe();
        self.write(characteristic, data, true).await?;

        let descriptor = *characteristic;
        central
            .broker
            .issue_on(
                &self.session,
                notifications,
                || {},
                |event| match event {
                    GattEvent::Notification(notification)
                        if notification.characteristic == descriptor =>
                    {
                        Some(notification.value.clone().ok_or(BleCentralError::EmptyData))
                    }
                    _ => None,
                },
            )
            .await
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn read_rssi(&self) -> Result<i16, BleCentralError> {
        self.session.ensure_connected()?;
        let central = self.central()?;
        let peripheral = self.id();

        central
            .broker
            .issue(
                &self.session,
                &central.bus.gatt,
                || central.stack.read_rssi(peripheral),
                |event| match event {
                    GattEvent::Rssi { rssi, error, .. } => Some(match error {
                        Some(cause) => Err(BleCentralError::CouldNotReadRssi {
                            cause: Some(cause.clone()),
                        }),
                        None => Ok(*rssi),
                    }),
                    _ => None,
                },
            )
            .await
    }
}

/// Disables notifications in the background when a listening round trip is abandoned.
struct ListenGuard {
    peripheral: Option<Peripheral>,
    characteristic: CharacteristicDescriptor,
}

impl ListenGuard {
    fn disarm(mut self) {
        self.peripheral = None;
    }
}

impl Drop for ListenGuard {
    fn drop(&mut self) {
        let Some(peripheral) = self.peripheral.take() else {
            return;
        };
        let Ok(central) = peripheral.central() else {
            return;
        };

        let characteristic = self.characteristic;
        tracing::debug!(characteristic = %characteristic.characteristic, "abandoned listen, disabling notifications");
        central.runtime.spawn(async move {
            if let Err(err) = peripheral.disable_listen(&characteristic).await {
                tracing::warn!("failed to disable notifications: {err}");
            }
        });
    }
}
