use crate::HashError;

const HEX_ENCODE: &[u8; 16] = b"0123456789abcdef";

/// Decode one ASCII hex digit, accepting both cases.
pub(crate) fn nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Hex-encode `bytes` to a new `String`.
pub fn hex_to_string(bytes: &[u8]) -> String {
    let mut buf = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        buf.push(HEX_ENCODE[(b >> 4) as usize]);
        buf.push(HEX_ENCODE[(b & 0x0f) as usize]);
    }
    // Only ASCII hex digits were pushed.
    unsafe { String::from_utf8_unchecked(buf) }
}

/// Decode a hex string into `buf`; the string must be exactly
/// `buf.len() * 2` characters.
pub fn hex_decode(hex: &str, buf: &mut [u8]) -> Result<(), HashError> {
    let hex = hex.as_bytes();
    if hex.len() != buf.len() * 2 {
        return Err(HashError::InvalidHexLength {
            expected: buf.len() * 2,
            actual: hex.len(),
        });
    }
    for (i, out) in buf.iter_mut().enumerate() {
        let hi = nibble(hex[i * 2]).ok_or(HashError::InvalidHex {
            position: i * 2,
            character: hex[i * 2] as char,
        })?;
        let lo = nibble(hex[i * 2 + 1]).ok_or(HashError::InvalidHex {
            position: i * 2 + 1,
            character: hex[i * 2 + 1] as char,
        })?;
        *out = (hi << 4) | lo;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let bytes = [0xde, 0xad, 0xbe, 0xef, 0x00, 0xff];
        let hex = hex_to_string(&bytes);
        assert_eq!(hex, "deadbeef00ff");
        let mut out = [0u8; 6];
        hex_decode(&hex, &mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn decode_mixed_case() {
        let mut out = [0u8; 4];
        hex_decode("DeAdBeEf", &mut out).unwrap();
        assert_eq!(out, [0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn decode_invalid_char() {
        let mut out = [0u8; 4];
        let err = hex_decode("deadgoof", &mut out).unwrap_err();
        match err {
            HashError::InvalidHex { position: 4, character: 'g' } => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn decode_wrong_length() {
        let mut out = [0u8; 4];
        assert!(matches!(
            hex_decode("abc", &mut out),
            Err(HashError::InvalidHexLength { .. })
        ));
    }
}
