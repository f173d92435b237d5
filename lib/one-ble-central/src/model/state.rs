use strum::Display;
use uuid::Uuid;

use crate::error::BleCentralError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum AdapterState {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl AdapterState {
    /// `None` while the state is transient, otherwise the outcome of the power-on precondition.
    pub fn readiness(&self) -> Option<Result<(), BleCentralError>> {
        match self {
            AdapterState::Unknown | AdapterState::Resetting => None,
            AdapterState::PoweredOn => Some(Ok(())),
            AdapterState::PoweredOff => Some(Err(BleCentralError::AdapterPoweredOff)),
            AdapterState::Unauthorized => Some(Err(BleCentralError::AdapterUnauthorized)),
            AdapterState::Unsupported => Some(Err(BleCentralError::AdapterUnsupported)),
        }
    }
}

/// Physical link state as reported by the stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum PeripheralState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Ready,
    Disconnecting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    AutoConnected,
    Ready,
    NotReady(Option<BleCentralError>),
    ConnectionFailed(Option<BleCentralError>),
    Disconnected(Option<BleCentralError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralChange {
    Name(Option<String>),
    InvalidatedServices(Vec<Uuid>),
}
