//! Services and characteristics already discovered on the current peripheral.

use uuid::Uuid;

use crate::model::characteristic::CharacteristicDescriptor;

#[cfg(test)]
mod test;

#[derive(Debug, Default)]
pub(crate) struct CharacteristicCache {
    services: Vec<CachedService>,
    all_services_discovered: bool,
}

#[derive(Debug)]
struct CachedService {
    uuid: Uuid,
    characteristics: Vec<CachedCharacteristic>,
    all_characteristics_discovered: bool,
}

#[derive(Debug)]
struct CachedCharacteristic {
    descriptor: CharacteristicDescriptor,
    notifying: bool,
}

impl CharacteristicCache {
    /// Known services if they satisfy the request, `None` when discovery is needed.
    ///
    /// An unfiltered request is only satisfied after an unfiltered discovery.
    pub fn lookup_services(&self, service: Option<Uuid>) -> Option<Vec<Uuid>> {
        let satisfied = match service {
            Some(service) => self.service(service).is_some(),
            None => self.all_services_discovered,
        };
        satisfied.then(|| self.services.iter().map(|service| service.uuid).collect())
    }

    pub fn store_services(&mut self, services: &[Uuid], complete: bool) {
        for uuid in services {
            if self.service(*uuid).is_none() {
                self.services.push(CachedService {
                    uuid: *uuid,
                    characteristics: vec![],
                    all_characteristics_discovered: false,
                });
            }
        }
        self.all_services_discovered |= complete;
    }

    /// Known characteristics of `service` if every requested one is present.
    pub fn lookup_characteristics(
        &self,
        service: Uuid,
        requested: &[Uuid],
    ) -> Option<Vec<CharacteristicDescriptor>> {
        let cached = self.service(service)?;
        let satisfied = if requested.is_empty() {
            cached.all_characteristics_discovered
        } else {
            requested.iter().all(|uuid| {
                cached
                    .characteristics
                    .iter()
                    .any(|entry| entry.descriptor.characteristic == *uuid)
            })
        };
        satisfied.then(|| {
            cached
                .characteristics
                .iter()
                .map(|entry| entry.descriptor)
                .collect()
        })
    }

    pub fn store_characteristics(
        &mut self,
        service: Uuid,
        characteristics: &[CharacteristicDescriptor],
        complete: bool,
    ) {
        let index = match self.services.iter().position(|entry| entry.uuid == service) {
            Some(index) => index,
            None => {
                self.services.push(CachedService {
                    uuid: service,
                    characteristics: vec![],
                    all_characteristics_discovered: false,
                });
                self.services.len() - 1
            }
        };
        let cached = &mut self.services[index];

        for descriptor in characteristics {
            match cached
                .characteristics
                .iter_mut()
                .find(|entry| entry.descriptor == *descriptor)
            {
                Some(entry) => entry.descriptor = *descriptor,
                None => cached.characteristics.push(CachedCharacteristic {
                    descriptor: *descriptor,
                    notifying: false,
                }),
            }
        }
        cached.all_characteristics_discovered |= complete;
    }

    /// Discovered version of `characteristic`, carrying the reported properties.
    pub fn descriptor(
        &self,
        characteristic: &CharacteristicDescriptor,
    ) -> Option<CharacteristicDescriptor> {
        self.characteristic(characteristic)
            .map(|entry| entry.descriptor)
    }

    pub fn is_notifying(&self, characteristic: &CharacteristicDescriptor) -> bool {
        self.characteristic(characteristic)
            .is_some_and(|entry| entry.notifying)
    }

    pub fn set_notifying(&mut self, characteristic: &CharacteristicDescriptor, notifying: bool) {
        let entry = self
            .services
            .iter_mut()
            .filter(|service| service.uuid == characteristic.service)
            .flat_map(|service| service.characteristics.iter_mut())
            .find(|entry| entry.descriptor == *characteristic);

        match entry {
            Some(entry) => entry.notifying = notifying,
            None => tracing::debug!(
                characteristic = %characteristic.characteristic,
                "notification state for undiscovered characteristic"
            ),
        }
    }

    /// Evicts services the peripheral reported as modified.
    pub fn invalidate(&mut self, services: &[Uuid]) {
        self.services.retain(|entry| !services.contains(&entry.uuid));
        self.all_services_discovered = false;
    }

    pub fn clear(&mut self) {
        self.services.clear();
        self.all_services_discovered = false;
    }

    fn service(&self, uuid: Uuid) -> Option<&CachedService> {
        self.services.iter().find(|entry| entry.uuid == uuid)
    }

    fn characteristic(
        &self,
        characteristic: &CharacteristicDescriptor,
    ) -> Option<&CachedCharacteristic> {
        self.service(characteristic.service)?
            .characteristics
            .iter()
            .find(|entry| entry.descriptor == *characteristic)
    }
}
