//! Hex codecs for tag keys and UIDs.
//!
//! Key parsing mirrors the reader's historical tolerance: short or odd
//! input zero-fills the remainder, characters beyond 32 hex digits are
//! ignored, and an unparseable byte pair decodes as zero.

/// Length of an NTAG424-class key in bytes.
pub const TAG_KEY_LEN: usize = 16;

/// Parse a hex string into a 16-byte key.
pub fn key_from_hex(s: &str) -> [u8; TAG_KEY_LEN] {
    let mut out = [0u8; TAG_KEY_LEN];
    let bytes = s.as_bytes();
    for (i, slot) in out.iter_mut().enumerate() {
        let start = i * 2;
        if start + 1 >= bytes.len() {
            break;
        }
        if let Ok(pair) = std::str::from_utf8(&bytes[start..start + 2]) {
            *slot = u8::from_str_radix(pair, 16).unwrap_or(0);
        }
    }
    out
}

/// Encode a UID as lowercase hex, two digits per byte.
pub fn uid_to_hex(uid: &[u8]) -> String {
    hex::encode(uid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_key_parses() {
        let k = key_from_hex("000102030405060708090a0b0c0d0e0f");
        assert_eq!(k, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn short_input_zero_fills() {
        let k = key_from_hex("ff");
        assert_eq!(k[0], 0xff);
        assert!(k[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn excess_input_is_ignored() {
        let k = key_from_hex("000102030405060708090a0b0c0d0e0fdeadbeef");
        assert_eq!(k[15], 0x0f);
    }

    #[test]
    fn invalid_pair_decodes_as_zero() {
        let k = key_from_hex("zz01");
        assert_eq!(k[0], 0);
        assert_eq!(k[1], 1);
    }

    #[test]
    fn uid_hex_is_lowercase_padded() {
        assert_eq!(uid_to_hex(&[0x04, 0x0a, 0xff]), "040aff");
    }
}
