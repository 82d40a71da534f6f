//! Byte/hex/BCD conversion helpers shared by project persistence and the
//! monitor's data-pattern filter.

/// Converts a single BCD-encoded byte to its two-digit decimal string.
pub fn bcd_decode(input: u8) -> String {
    format!("{}{}", (input & 0xF0) >> 4, input & 0x0F)
}

/// Converts a slice of BCD-encoded bytes to a decimal string, optionally
/// joined with `sep` between each byte's digits.
pub fn bcd_decode_slice(input: &[u8], sep: Option<&str>) -> String {
    let mut res = String::new();
    for (pos, x) in input.iter().enumerate() {
        res.push_str(bcd_decode(*x).as_str());
        if let Some(separator) = sep {
            if pos != input.len() - 1 {
                res.push_str(separator);
            }
        }
    }
    res
}

/// Formats `data` as uppercase hex, one pair of digits per byte, separated
/// by single spaces. This is the byte-field format used throughout a
/// persisted [`crate::project::CommandProject`].
pub fn bytes_to_hex_string(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Error returned by [`hex_string_to_bytes`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexParseError {
    /// A non-hex-digit, non-whitespace character was encountered.
    #[error("invalid hex digit {0:?}")]
    InvalidDigit(char),
    /// The cleaned digit string has an odd length.
    #[error("hex string has an odd number of digits")]
    OddLength,
}

/// Parses a hex byte string, tolerating interior whitespace and either case.
///
/// This is the inverse of [`bytes_to_hex_string`], but accepts any amount or
/// placement of whitespace so hand-edited project files still load.
pub fn hex_string_to_bytes(s: &str) -> Result<Vec<u8>, HexParseError> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    for c in digits.chars() {
        if !c.is_ascii_hexdigit() {
            return Err(HexParseError::InvalidDigit(c));
        }
    }
    if digits.len() % 2 != 0 {
        return Err(HexParseError::OddLength);
    }
    let mut out = Vec::with_capacity(digits.len() / 2);
    let bytes = digits.as_bytes();
    for chunk in bytes.chunks_exact(2) {
        let pair = std::str::from_utf8(chunk).unwrap();
        out.push(u8::from_str_radix(pair, 16).unwrap());
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bcd_decode_reads_packed_digits() {
        assert_eq!(bcd_decode(0x42), "42");
        assert_eq!(bcd_decode_slice(&[0x12, 0x34], Some(" ")), "12 34");
        assert_eq!(bcd_decode_slice(&[0x12, 0x34], None), "1234");
    }

    #[test]
    fn hex_round_trips_through_uppercase_spaced_form() {
        let data = vec![0xDE, 0xAD, 0xBE, 0xEF];
        let s = bytes_to_hex_string(&data);
        assert_eq!(s, "DE AD BE EF");
        assert_eq!(hex_string_to_bytes(&s).unwrap(), data);
    }

    #[test]
    fn hex_parse_tolerates_lowercase_and_odd_whitespace() {
        assert_eq!(hex_string_to_bytes("de  adbe\tef").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn hex_parse_rejects_odd_length_and_bad_digits() {
        assert_eq!(hex_string_to_bytes("ABC").unwrap_err(), HexParseError::OddLength);
        assert_eq!(
            hex_string_to_bytes("ZZ").unwrap_err(),
            HexParseError::InvalidDigit('Z')
        );
    }
}
