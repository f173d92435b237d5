use std::collections::HashMap;

use uuid::Uuid;

use super::identifier::PeripheralIdentifier;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementData {
    pub local_name: Option<String>,
    pub manufacturer_data: Option<Vec<u8>>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub service_uuids: Vec<Uuid>,
    pub overflow_service_uuids: Vec<Uuid>,
    pub solicited_service_uuids: Vec<Uuid>,
    pub tx_power_level: Option<i16>,
    pub is_connectable: Option<bool>,
}

impl AdvertisementData {
    pub fn advertises(&self, service: &Uuid) -> bool {
        self.service_uuids.contains(service) || self.overflow_service_uuids.contains(service)
    }
}

/// Single scan result snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralDiscovery {
    pub peripheral: PeripheralIdentifier,
    pub advertisement: AdvertisementData,
    pub rssi: i16,
}

impl PeripheralDiscovery {
    pub fn id(&self) -> Uuid {
        self.peripheral.id
    }

    /// Name reported by the stack, falling back to the advertised local name.
    pub fn name(&self) -> Option<&str> {
        self.peripheral
            .name
            .as_deref()
            .or(self.advertisement.local_name.as_deref())
    }
}
