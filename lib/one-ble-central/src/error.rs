use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use uuid::Uuid;

use crate::model::state::ConnectionState;

#[cfg(test)]
mod test;

/// Error reported by the platform BLE stack inside a callback.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("stack error {code}: {reason}")]
pub struct StackError {
    pub code: i64,
    pub reason: String,
}

impl StackError {
    pub fn new(code: i64, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BleCentralError {
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,
    #[error("Application not authorized to use Bluetooth")]
    AdapterUnauthorized,
    #[error("Bluetooth not supported on this device")]
    AdapterUnsupported,

    #[error("Scan timed out")]
    ScanTimeout,
    #[error("Connection attempt timed out")]
    ConnectTimeout,
    #[error("Characteristic read timed out")]
    ReadTimeout,
    #[error("Characteristic write timed out")]
    WriteTimeout,
    #[error("Write and listen timed out")]
    WriteAndListenTimeout,
    #[error("Operation timed out")]
    OperationTimeout,

    #[error("Invalid identifier: {identifier}")]
    InvalidIdentifier { identifier: String },
    #[error("Service {service:?} not found")]
    ServiceNotFound {
        service: Option<Uuid>,
        cause: Option<StackError>,
    },
    #[error("Characteristic {characteristic:?} not found")]
    CharacteristicNotFound {
        characteristic: Option<Uuid>,
        cause: Option<StackError>,
    },

    #[error("Could not connect to peripheral {peripheral}")]
    CouldNotConnectToPeripheral {
        peripheral: Uuid,
        cause: Option<StackError>,
    },
    #[error("Could not read RSSI")]
    CouldNotReadRssi { cause: Option<StackError> },
    #[error("Could not read characteristic {characteristic}")]
    CouldNotReadCharacteristic {
        characteristic: Uuid,
        cause: Option<StackError>,
    },
    #[error("Could not write characteristic {characteristic}")]
    CouldNotWriteCharacteristic {
        characteristic: Uuid,
        cause: Option<StackError>,
    },
    #[error("Could not update notification state of characteristic {characteristic}")]
    CouldNotUpdateNotificationState {
        characteristic: Uuid,
        cause: Option<StackError>,
    },

    #[error("Characteristic value is empty")]
    EmptyData,
    #[error("Cannot extract {length} bytes at {start}, only {count} available")]
    DeserializationOutOfBounds {
        start: usize,
        length: usize,
        count: usize,
    },
    #[error("Deserialization failed: {reason}")]
    DeserializationFailed { reason: String },

    #[error("Peripheral not connected, current state: {state}")]
    PeripheralNotConnected { state: ConnectionState },
    #[error("Peripheral already connected or connecting")]
    PeripheralAlreadyConnectedOrConnecting,
    #[error("Peripheral not connected or already disconnected")]
    PeripheralNotConnectedOrAlreadyDisconnected,
    #[error("Peripheral {peripheral} not found")]
    PeripheralNotFound { peripheral: Uuid },
    #[error("Peripheral {peripheral} disconnected")]
    PeripheralDisconnected {
        peripheral: Uuid,
        cause: Option<StackError>,
    },

    #[error("Central session closed")]
    SessionClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorCode {
    #[strum(serialize = "BLE_ADAPTER_001")]
    Adapter001,
    #[strum(serialize = "BLE_ADAPTER_002")]
    Adapter002,
    #[strum(serialize = "BLE_ADAPTER_003")]
    Adapter003,

    #[strum(serialize = "BLE_TIMEOUT_001")]
    Timeout001,
    #[strum(serialize = "BLE_TIMEOUT_002")]
    Timeout002,
    #[strum(serialize = "BLE_TIMEOUT_003")]
    Timeout003,
    #[strum(serialize = "BLE_TIMEOUT_004")]
    Timeout004,
    #[strum(serialize = "BLE_TIMEOUT_005")]
    Timeout005,
    #[strum(serialize = "BLE_TIMEOUT_006")]
    Timeout006,

    #[strum(serialize = "BLE_GATT_001")]
    Gatt001,
    #[strum(serialize = "BLE_GATT_002")]
    Gatt002,
    #[strum(serialize = "BLE_GATT_003")]
    Gatt003,
    #[strum(serialize = "BLE_GATT_004")]
    Gatt004,
    #[strum(serialize = "BLE_GATT_005")]
    Gatt005,
    #[strum(serialize = "BLE_GATT_006")]
    Gatt006,

    #[strum(serialize = "BLE_DATA_001")]
    Data001,
    #[strum(serialize = "BLE_DATA_002")]
    Data002,

    #[strum(serialize = "BLE_PERIPHERAL_001")]
    Peripheral001,
    #[strum(serialize = "BLE_PERIPHERAL_002")]
    Peripheral002,
    #[strum(serialize = "BLE_PERIPHERAL_003")]
    Peripheral003,
    #[strum(serialize = "BLE_PERIPHERAL_004")]
    Peripheral004,
    #[strum(serialize = "BLE_PERIPHERAL_005")]
    Peripheral005,
    #[strum(serialize = "BLE_PERIPHERAL_006")]
    Peripheral006,

    #[strum(serialize = "BLE_GENERIC_001")]
    Generic001,
    #[strum(serialize = "BLE_GENERIC_002")]
    Generic002,
}

impl ErrorCode {
    pub const fn msg(&self) -> &'static str {
        match self {
            ErrorCode::Adapter001 => "Bluetooth adapter powered off",
            ErrorCode::Adapter002 => "Bluetooth usage not authorized",
            ErrorCode::Adapter003 => "Bluetooth not supported",

            ErrorCode::Timeout001 => "Scan timeout",
            ErrorCode::Timeout002 => "Connect timeout",
            ErrorCode::Timeout003 => "Read timeout",
            ErrorCode::Timeout004 => "Write timeout",
            ErrorCode::Timeout005 => "Write and listen timeout",
            ErrorCode::Timeout006 => "Operation timeout",

            ErrorCode::Gatt001 => "Service not found",
            ErrorCode::Gatt002 => "Characteristic not found",
            ErrorCode::Gatt003 => "Characteristic read failed",
            ErrorCode::Gatt004 => "Characteristic write failed",
            ErrorCode::Gatt005 => "Notification state update failed",
            ErrorCode::Gatt006 => "RSSI read failed",

            ErrorCode::Data001 => "Empty data",
            ErrorCode::Data002 => "Data cannot be deserialized",

            ErrorCode::Peripheral001 => "Could not connect to peripheral",
            ErrorCode::Peripheral002 => "Peripheral not connected",
            ErrorCode::Peripheral003 => "Peripheral already connected or connecting",
            ErrorCode::Peripheral004 => "Peripheral not connected or already disconnected",
            ErrorCode::Peripheral005 => "Peripheral not found",
            ErrorCode::Peripheral006 => "Peripheral disconnected",

            ErrorCode::Generic001 => "Invalid identifier",
            ErrorCode::Generic002 => "Central session closed",
        }
    }
}

impl BleCentralError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            BleCentralError::AdapterPoweredOff => ErrorCode::Adapter001,
            BleCentralError::AdapterUnauthorized => ErrorCode::Adapter002,
            BleCentralError::AdapterUnsupported => ErrorCode::Adapter003,

            BleCentralError::ScanTimeout => ErrorCode::Timeout001,
            BleCentralError::ConnectTimeout => ErrorCode::Timeout002,
            BleCentralError::ReadTimeout => ErrorCode::Timeout003,
            BleCentralError::WriteTimeout => ErrorCode::Timeout004,
            BleCentralError::WriteAndListenTimeout => ErrorCode::Timeout005,
            BleCentralError::OperationTimeout => ErrorCode::Timeout006,

            BleCentralError::ServiceNotFound { .. } => ErrorCode::Gatt001,
            BleCentralError::CharacteristicNotFound { .. } => ErrorCode::Gatt002,
            BleCentralError::CouldNotReadCharacteristic { .. } => ErrorCode::Gatt003,
            BleCentralError::CouldNotWriteCharacteristic { .. } => ErrorCode::Gatt004,
            BleCentralError::CouldNotUpdateNotificationState { .. } => ErrorCode::Gatt005,
            BleCentralError::CouldNotReadRssi { .. } => ErrorCode::Gatt006,

            BleCentralError::EmptyData => ErrorCode::Data001,
            BleCentralError::DeserializationOutOfBounds { .. }
            | BleCentralError::DeserializationFailed { .. } => ErrorCode::Data002,

            BleCentralError::CouldNotConnectToPeripheral { .. } => ErrorCode::Peripheral001,
            BleCentralError::PeripheralNotConnected { .. } => ErrorCode::Peripheral002,
            BleCentralError::PeripheralAlreadyConnectedOrConnecting => ErrorCode::Peripheral003,
            BleCentralError::PeripheralNotConnectedOrAlreadyDisconnected => {
                ErrorCode::Peripheral004
            }
            BleCentralError::PeripheralNotFound { .. } => ErrorCode::Peripheral005,
            BleCentralError::PeripheralDisconnected { .. } => ErrorCode::Peripheral006,

            BleCentralError::InvalidIdentifier { .. } => ErrorCode::Generic001,
            BleCentralError::SessionClosed => ErrorCode::Generic002,
        }
    }
}

