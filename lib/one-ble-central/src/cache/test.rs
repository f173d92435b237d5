use assert2::assert;
use uuid::Uuid;

use super::CharacteristicCache;
use crate::model::characteristic::{CharacteristicDescriptor, CharacteristicProperties};

fn descriptor(service: Uuid, properties: CharacteristicProperties) -> CharacteristicDescriptor {
    CharacteristicDescriptor::new(Uuid::new_v4(), service, properties)
}

#[test]
fn test_empty_cache_requires_discovery() {
    let cache = CharacteristicCache::default();

    assert!(cache.lookup_services(None).is_none());
    assert!(cache.lookup_services(Some(Uuid::new_v4())).is_none());
    assert!(cache.lookup_characteristics(Uuid::new_v4(), &[]).is_none());
}

#[test]
fn test_filtered_service_discovery_satisfies_only_that_service() {
    // given
    let heart_rate = Uuid::new_v4();
    let mut cache = CharacteristicCache::default();

    // when
    cache.store_services(&[heart_rate], false);

    // then
    assert!(cache.lookup_services(Some(heart_rate)) == Some(vec![heart_rate]));
    assert!(cache.lookup_services(Some(Uuid::new_v4())).is_none());
    assert!(cache.lookup_services(None).is_none());
}

#[test]
fn test_full_service_discovery_satisfies_unfiltered_request() {
    let services = [Uuid::new_v4(), Uuid::new_v4()];
    let mut cache = CharacteristicCache::default();

    cache.store_services(&services, true);
    cache.store_services(&services[..1], false);

    assert!(cache.lookup_services(None) == Some(services.to_vec()));
}

#[test]
fn test_characteristics_lookup_needs_every_requested_uuid() {
    // given
    let service = Uuid::new_v4();
    let known = descriptor(service, CharacteristicProperties::READ);
    let mut cache = CharacteristicCache::default();
    cache.store_characteristics(service, &[known], false);

    // then
    assert!(cache.lookup_characteristics(service, &[known.characteristic]) == Some(vec![known]));
    assert!(
        cache
            .lookup_characteristics(service, &[known.characteristic, Uuid::new_v4()])
            .is_none()
    );
    assert!(cache.lookup_characteristics(service, &[]).is_none());
    assert!(cache.lookup_services(Some(service)).is_some());
}

#[test]
fn test_store_characteristics_keeps_notification_state() {
    // given
    let service = Uuid::new_v4();
    let notify = descriptor(service, CharacteristicProperties::NOTIFY);
    let mut cache = CharacteristicCache::default();
    cache.store_characteristics(service, &[notify], false);
    cache.set_notifying(&notify, true);

    // when
    let rediscovered = CharacteristicDescriptor::new(
        notify.characteristic,
        service,
        CharacteristicProperties::NOTIFY | CharacteristicProperties::READ,
    );
    cache.store_characteristics(service, &[rediscovered], true);

    // then
    assert!(cache.is_notifying(&notify));
    let stored = cache.descriptor(&notify).unwrap();
    assert!(stored.properties.contains(CharacteristicProperties::READ));
    assert!(cache.lookup_characteristics(service, &[]) == Some(vec![rediscovered]));
}

#[test]
fn test_notifying_flag_of_unknown_characteristic_is_ignored() {
    let mut cache = CharacteristicCache::default();
    let unknown = descriptor(Uuid::new_v4(), CharacteristicProperties::NOTIFY);

    cache.set_notifying(&unknown, true);

    assert!(!cache.is_notifying(&unknown));
}

#[test]
fn test_invalidate_evicts_services_and_their_characteristics() {
    // given
    let kept = Uuid::new_v4();
    let modified = Uuid::new_v4();
    let characteristic = descriptor(modified, CharacteristicProperties::READ);
    let mut cache = CharacteristicCache::default();
    cache.store_services(&[kept, modified], true);
    cache.store_characteristics(modified, &[characteristic], true);

    // when
    cache.invalidate(&[modified]);

    // then
    assert!(cache.lookup_services(Some(kept)).is_some());
    assert!(cache.lookup_services(Some(modified)).is_none());
    assert!(cache.lookup_services(None).is_none());
    assert!(cache.descriptor(&characteristic).is_none());
}

#[test]
fn test_clear_drops_everything() {
    let service = Uuid::new_v4();
    let mut cache = CharacteristicCache::default();
    cache.store_services(&[service], true);

    cache.clear();

    assert!(cache.lookup_services(None).is_none());
    assert!(cache.lookup_services(Some(service)).is_none());
}
