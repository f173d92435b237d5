use std::sync::Arc;

use assert2::{assert, let_assert};
use uuid::Uuid;

use super::PeripheralSession;
use crate::error::{BleCentralError, StackError};
use crate::model::characteristic::{CharacteristicDescriptor, CharacteristicProperties};
use crate::model::identifier::PeripheralIdentifier;
use crate::model::state::{ConnectionEvent, ConnectionState};

fn session(state: ConnectionState) -> PeripheralSession {
    PeripheralSession::new(
        PeripheralIdentifier::with_name(Uuid::new_v4(), "sensor"),
        3,
        state,
        8,
    )
}

#[tokio::test]
async fn test_transition_updates_state_and_replays_event() {
    // given
    let session = session(ConnectionState::Connecting);

    // when
    session.transition(ConnectionState::Connected, ConnectionEvent::AutoConnected);
    let mut events = session.events();

    // then
    assert!(session.state() == ConnectionState::Connected);
    assert!(events.recv().await.unwrap() == ConnectionEvent::AutoConnected);
}

#[test]
fn test_auto_connect_flag_is_consumed_once() {
    let session = session(ConnectionState::Connecting);
    session.mark_auto_connect();

    assert!(session.take_auto_connect());
    assert!(!session.take_auto_connect());
}

#[test]
fn test_ensure_connected_by_state() {
    assert!(session(ConnectionState::Connected).ensure_connected().is_ok());
    assert!(session(ConnectionState::Ready).ensure_connected().is_ok());

    let_assert!(
        Err(BleCentralError::PeripheralNotConnected {
            state: ConnectionState::Connecting
        }) = session(ConnectionState::Connecting).ensure_connected()
    );
}

#[test]
fn test_close_drops_cache_and_reports_cause() {
    // given
    let session = session(ConnectionState::Ready);
    let service = Uuid::new_v4();
    let characteristic =
        CharacteristicDescriptor::new(Uuid::new_v4(), service, CharacteristicProperties::READ);
    session
        .cache()
        .store_characteristics(service, &[characteristic], true);

    // when
    session.close(Some(StackError::new(6, "connection timeout")));

    // then
    assert!(session.is_closed());
    assert!(session.state() == ConnectionState::Idle);
    assert!(session.cache().descriptor(&characteristic).is_none());
    let_assert!(
        Err(BleCentralError::PeripheralDisconnected {
            peripheral,
            cause: Some(cause),
        }) = session.ensure_connected()
    );
    assert!(peripheral == session.id());
    assert!(cause.code == 6);
}

#[test]
fn test_identifier_follows_name_updates() {
    let session = Arc::new(session(ConnectionState::Ready));

    session.set_name(Some("renamed".to_owned()));

    assert!(session.identifier().name.as_deref() == Some("renamed"));
    assert!(session.generation() == 3);
}
