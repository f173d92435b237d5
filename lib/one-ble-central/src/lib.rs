#![cfg_attr(feature = "strict", deny(warnings))]

//! Single peripheral BLE central sessions on top of a platform Bluetooth stack.

pub mod central;
pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod stack;

mod broker;
mod cache;
mod event_bus;
mod session;
mod util;

#[cfg(test)]
mod test_utilities;

pub use central::discovery::DiscoverySubscription;
pub use central::restore::Restored;
pub use central::{AutoReconnectPolicy, CentralSession, CentralSessionBuilder, ConnectionTask};
pub use error::{BleCentralError, ErrorCode, StackError};
pub use event_bus::Notification;
pub use session::Peripheral;
pub use stack::{BleStack, RestoreSnapshot, RestoredScan, StackEvent, StackEventSink};
