//! Annex-B start code scanning.

/// The 3-byte Annex-B start code prefix.
pub const STARTCODE: [u8; 3] = [0x00, 0x00, 0x01];

/// Returns the offset of the first `00 00 01` at or after `from`.
///
/// The 4-byte `00 00 00 01` form is found as a 3-byte code one byte later;
/// callers that care about the long form look at the byte before the match.
pub fn find_startcode(buffer: &[u8], from: usize) -> Option<usize> {
    if from >= buffer.len() {
        return None;
    }

    buffer[from..]
        .windows(STARTCODE.len())
        .position(|window| window == STARTCODE)
        .map(|pos| pos + from)
}

/// Length of the start code at the beginning of `buffer` (4, 3, or 0).
pub fn startcode_len(buffer: &[u8]) -> usize {
    match buffer {
        [0x00, 0x00, 0x00, 0x01, ..] => 4,
        [0x00, 0x00, 0x01, ..] => 3,
        _ => 0,
    }
}

#[test]
fn find_first_startcode() {
    let data = [0xAA, 0x00, 0x00, 0x01, 0x40, 0x00, 0x00, 0x00, 0x01, 0x41];
    assert_eq!(find_startcode(&data, 0), Some(1));
    assert_eq!(find_startcode(&data, 2), Some(6));
    assert_eq!(find_startcode(&data, 7), None);
    assert_eq!(find_startcode(&data, 100), None);
    assert_eq!(find_startcode(&[0x00, 0x00], 0), None);
}

#[test]
fn detect_startcode_length() {
    assert_eq!(startcode_len(&[0, 0, 0, 1, 0x40]), 4);
    assert_eq!(startcode_len(&[0, 0, 1, 0x40]), 3);
    assert_eq!(startcode_len(&[0x40, 0x01]), 0);
    assert_eq!(startcode_len(&[]), 0);
}
