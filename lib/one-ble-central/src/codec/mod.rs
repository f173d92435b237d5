//! Conversions between characteristic payloads and application values.

use crate::error::BleCentralError;

#[cfg(test)]
mod test;

pub trait Readable: Sized {
    fn from_bytes(data: &[u8]) -> Result<Self, BleCentralError>;
}

pub trait Writable {
    fn to_bytes(&self) -> Vec<u8>;
}

/// Borrows `length` bytes starting at `start`.
pub fn extract(data: &[u8], start: usize, length: usize) -> Result<&[u8], BleCentralError> {
    start
        .checked_add(length)
        .and_then(|end| data.get(start..end))
        .ok_or(BleCentralError::DeserializationOutOfBounds {
            start,
            length,
            count: data.len(),
        })
}

pub fn extract_array<const N: usize>(data: &[u8], start: usize) -> Result<[u8; N], BleCentralError> {
    let mut array = [0; N];
    array.copy_from_slice(extract(data, start, N)?);
    Ok(array)
}

/// Concatenates the encoded parts.
pub fn assemble(parts: &[&dyn Writable]) -> Vec<u8> {
    parts.iter().flat_map(|part| part.to_bytes()).collect()
}

impl Readable for Vec<u8> {
    fn from_bytes(data: &[u8]) -> Result<Self, BleCentralError> {
        Ok(data.to_vec())
    }
}

impl Writable for Vec<u8> {
    fn to_bytes(&self) -> Vec<u8> {
        self.clone()
    }
}

impl Writable for [u8] {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl Readable for String {
    fn from_bytes(data: &[u8]) -> Result<Self, BleCentralError> {
        String::from_utf8(data.to_vec()).map_err(|err| BleCentralError::DeserializationFailed {
            reason: err.to_string(),
        })
    }
}

impl Writable for String {
    fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Writable for str {
    fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Readable for bool {
    fn from_bytes(data: &[u8]) -> Result<Self, BleCentralError> {
        let [value] = extract_array::<1>(data, 0)?;
        Ok(value != 0)
    }
}

impl Writable for bool {
    fn to_bytes(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }
}

macro_rules! little_endian {
    ($($int:ty),*) => {
        $(
            impl Readable for $int {
                fn from_bytes(data: &[u8]) -> Result<Self, BleCentralError> {
                    extract_array(data, 0).map(<$int>::from_le_bytes)
                }
            }

            impl Writable for $int {
                fn to_bytes(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }
        )*
    };
}

little_endian!(u8, i8, u16, i16, u32, i32);
