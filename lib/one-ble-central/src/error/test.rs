use assert2::assert;
use rstest::rstest;
use uuid::Uuid;

use super::{BleCentralError, ErrorCode, StackError};
use crate::model::state::ConnectionState;

#[rstest]
#[case(BleCentralError::AdapterPoweredOff, ErrorCode::Adapter001, "BLE_ADAPTER_001")]
#[case(BleCentralError::ConnectTimeout, ErrorCode::Timeout002, "BLE_TIMEOUT_002")]
#[case(
    BleCentralError::CouldNotReadCharacteristic { characteristic: Uuid::nil(), cause: None },
    ErrorCode::Gatt003,
    "BLE_GATT_003"
)]
#[case(
    BleCentralError::DeserializationOutOfBounds { start: 2, length: 4, count: 3 },
    ErrorCode::Data002,
    "BLE_DATA_002"
)]
#[case(
    BleCentralError::PeripheralNotConnected { state: ConnectionState::Connecting },
    ErrorCode::Peripheral002,
    "BLE_PERIPHERAL_002"
)]
fn test_error_code(
    #[case] error: BleCentralError,
    #[case] code: ErrorCode,
    #[case] serialized: &str,
) {
    assert!(error.error_code() == code);
    assert!(code.to_string() == serialized);
    assert!(!code.msg().is_empty());
}

#[test]
fn test_error_messages_carry_context() {
    let error = BleCentralError::PeripheralNotConnected {
        state: ConnectionState::Connecting,
    };
    assert!(error.to_string() == "Peripheral not connected, current state: Connecting");

    let cause = StackError::new(133, "gatt error");
    assert!(cause.to_string() == "stack error 133: gatt error");
}
