use assert2::{assert, let_assert};
use rstest::rstest;

use super::{Readable, Writable, assemble, extract, extract_array};
use crate::error::BleCentralError;

#[rstest]
#[case(0, 2, &[1, 2])]
#[case(2, 2, &[3, 4])]
#[case(4, 0, &[])]
fn test_extract_within_bounds(#[case] start: usize, #[case] length: usize, #[case] expected: &[u8]) {
    assert!(extract(&[1, 2, 3, 4], start, length).unwrap() == expected);
}

#[rstest]
#[case(3, 2)]
#[case(5, 0)]
#[case(1, usize::MAX)]
fn test_extract_out_of_bounds(#[case] start: usize, #[case] length: usize) {
    let_assert!(
        Err(BleCentralError::DeserializationOutOfBounds {
            start: s,
            length: l,
            count: 4,
        }) = extract(&[1, 2, 3, 4], start, length)
    );
    assert!(s == start);
    assert!(l == length);
}

#[test]
fn test_heart_rate_measurement_layout() {
    // flags, 16-bit value, energy expended
    let payload = [0x01, 0x48, 0x00, 0x10, 0x02];

    let flags = u8::from_bytes(extract(&payload, 0, 1).unwrap()).unwrap();
    let bpm = u16::from_bytes(&extract_array::<2>(&payload, 1).unwrap()).unwrap();
    let energy = u16::from_bytes(extract(&payload, 3, 2).unwrap()).unwrap();

    assert!(flags == 1);
    assert!(bpm == 72);
    assert!(energy == 528);
}

#[test]
fn test_short_payload_fails_integer_decoding() {
    let_assert!(
        Err(BleCentralError::DeserializationOutOfBounds {
            start: 0,
            length: 4,
            count: 3,
        }) = u32::from_bytes(&[1, 2, 3])
    );
}

#[test]
fn test_assemble_concatenates_parts() {
    let opcode: u8 = 0x02;
    let offset: u16 = 0x0102;
    let label = String::from("ok");

    let data = assemble(&[&opcode, &offset, &label, &true]);

    assert!(data == vec![0x02, 0x02, 0x01, b'o', b'k', 0x01]);
}

#[test]
fn test_string_requires_utf8() {
    assert!(String::from_bytes(b"wallet").unwrap() == "wallet");
    let_assert!(Err(BleCentralError::DeserializationFailed { .. }) = String::from_bytes(&[0xff]));
}

#[test]
fn test_bool_round_trip_through_bytes() {
    assert!(!bool::from_bytes(&[0]).unwrap());
    assert!(bool::from_bytes(&[7]).unwrap());
    let_assert!(Err(BleCentralError::DeserializationOutOfBounds { .. }) = bool::from_bytes(&[]));
    assert!(false.to_bytes() == vec![0]);
}
