use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitOr, BitOrAssign};

use uuid::Uuid;

use super::identifier::parse_uuid;
use crate::error::BleCentralError;

/// GATT characteristic property bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CharacteristicProperties(u16);

impl CharacteristicProperties {
    pub const BROADCAST: Self = Self(1 << 0);
    pub const READ: Self = Self(1 << 1);
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(1 << 2);
    pub const WRITE: Self = Self(1 << 3);
    pub const NOTIFY: Self = Self(1 << 4);
    pub const INDICATE: Self = Self(1 << 5);
    pub const AUTHENTICATED_SIGNED_WRITES: Self = Self(1 << 6);
    pub const EXTENDED_PROPERTIES: Self = Self(1 << 7);
    pub const NOTIFY_ENCRYPTION_REQUIRED: Self = Self(1 << 8);
    pub const INDICATE_ENCRYPTION_REQUIRED: Self = Self(1 << 9);

    const NAMES: [(Self, &'static str); 10] = [
        (Self::BROADCAST, "broadcast"),
        (Self::READ, "read"),
        (Self::WRITE_WITHOUT_RESPONSE, "writeWithoutResponse"),
        (Self::WRITE, "write"),
        (Self::NOTIFY, "notify"),
        (Self::INDICATE, "indicate"),
        (Self::AUTHENTICATED_SIGNED_WRITES, "authenticatedSignedWrites"),
        (Self::EXTENDED_PROPERTIES, "extendedProperties"),
        (Self::NOTIFY_ENCRYPTION_REQUIRED, "notifyEncryptionRequired"),
        (Self::INDICATE_ENCRYPTION_REQUIRED, "indicateEncryptionRequired"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for CharacteristicProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CharacteristicProperties {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for CharacteristicProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                Self::NAMES
                    .iter()
                    .filter(|(flag, _)| self.contains(*flag))
                    .map(|(_, name)| name),
            )
            .finish()
    }
}

/// Application-level handle to a GATT characteristic.
///
/// Identity is `(characteristic, service)`, the property flags are descriptive only.
#[derive(Debug, Clone, Copy)]
pub struct CharacteristicDescriptor {
    pub characteristic: Uuid,
    pub service: Uuid,
    pub properties: CharacteristicProperties,
}

impl CharacteristicDescriptor {
    pub fn new(characteristic: Uuid, service: Uuid, properties: CharacteristicProperties) -> Self {
        Self {
            characteristic,
            service,
            properties,
        }
    }

    pub fn parse(
        characteristic: &str,
        service: &str,
        properties: CharacteristicProperties,
    ) -> Result<Self, BleCentralError> {
        Ok(Self::new(
            parse_uuid(characteristic)?,
            parse_uuid(service)?,
            properties,
        ))
    }
}

impl PartialEq for CharacteristicDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.characteristic == other.characteristic && self.service == other.service
    }
}

impl Eq for CharacteristicDescriptor {}

impl Hash for CharacteristicDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.characteristic.hash(state);
        self.service.hash(state);
    }
}
