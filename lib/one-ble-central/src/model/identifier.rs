use std::hash::{Hash, Hasher};

use uuid::Uuid;

use crate::error::BleCentralError;

/// `0000xxxx-0000-1000-8000-00805f9b34fb`
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Parses a full 128-bit UUID or a 16/32-bit Bluetooth short form.
pub fn parse_uuid(value: &str) -> Result<Uuid, BleCentralError> {
    let invalid = || BleCentralError::InvalidIdentifier {
        identifier: value.to_owned(),
    };

    let trimmed = value.trim();
    match trimmed.len() {
        4 | 8 if trimmed.chars().all(|c| c.is_ascii_hexdigit()) => {
            let short = u32::from_str_radix(trimmed, 16).map_err(|_| invalid())?;
            Ok(Uuid::from_u128(BLUETOOTH_BASE_UUID | (u128::from(short) << 96)))
        }
        _ => Uuid::parse_str(trimmed).map_err(|_| invalid()),
    }
}

/// Stable handle to a peripheral, independent of a live connection.
///
/// Equality and hashing only consider `id`.
#[derive(Debug, Clone)]
pub struct PeripheralIdentifier {
    pub id: Uuid,
    pub name: Option<String>,
}

impl PeripheralIdentifier {
    pub fn new(id: Uuid) -> Self {
        Self { id, name: None }
    }

    pub fn with_name(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }

    pub fn parse(id: &str) -> Result<Self, BleCentralError> {
        Ok(Self::new(parse_uuid(id)?))
    }
}

impl PartialEq for PeripheralIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeripheralIdentifier {}

impl Hash for PeripheralIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
