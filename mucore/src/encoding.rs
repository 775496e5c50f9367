//! Varint and length-prefixed string helpers for the embedded binary formats.
//!
//! Integers use a forward base-128 scheme (LEB128): 7-bit chunks, least
//! significant first, every chunk but the last has its MSB set. Values are
//! decoded in the order they were appended, which lets a reader walk a stream
//! of records from the start.

/// Append `value` to `buf`, returns the number of bytes written.
pub fn encode_u64(mut value: u64, buf: &mut Vec<u8>) -> usize {
    let mut size = 1;
    while value >= 0x80 {
        buf.push(((value & 0x7F) as u8) | 0x80);
        value >>= 7;
        size += 1;
    }
    buf.push(value as u8);
    size
}

/// Decode one integer from the front of `buf` and advance it.
///
/// Returns `None` if the slice ends before the terminating byte or the value
/// does not fit in 64 bits. `buf` is left untouched on failure.
pub fn decode_u64(buf: &mut &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    for (index, &byte) in buf.iter().enumerate() {
        let shift = 7 * index as u32;
        let chunk = (byte & 0x7F) as u64;
        if shift >= 64 || (shift == 63 && chunk > 1) {
            return None;
        }
        value |= chunk << shift;

        if byte & 0x80 == 0 {
            *buf = &buf[index + 1..];
            return Some(value);
        }
    }
    None
}

/// Number of bytes [`encode_u64`] writes for `value`.
pub fn encoded_size_u64(value: u64) -> usize {
    if value == 0 {
        return 1;
    }
    let sig_bits = (64 - value.leading_zeros()) as usize;
    sig_bits.div_ceil(7)
}

/// Append a length-prefixed UTF-8 string.
pub fn encode_str(value: &str, buf: &mut Vec<u8>) {
    encode_u64(value.len() as u64, buf);
    buf.extend_from_slice(value.as_bytes());
}

/// Append a length-prefixed byte string.
pub fn encode_bytes(value: &[u8], buf: &mut Vec<u8>) {
    encode_u64(value.len() as u64, buf);
    buf.extend_from_slice(value);
}

/// Decode a length-prefixed byte string from the front of `buf`.
pub fn decode_bytes<'a>(buf: &mut &'a [u8]) -> Option<&'a [u8]> {
    let mut cursor = *buf;
    let len = usize::try_from(decode_u64(&mut cursor)?).ok()?;
    if cursor.len() < len {
        return None;
    }
    let (value, rest) = cursor.split_at(len);
    *buf = rest;
    Some(value)
}

/// Decode a length-prefixed UTF-8 string from the front of `buf`.
pub fn decode_str<'a>(buf: &mut &'a [u8]) -> Option<&'a str> {
    let mut cursor = *buf;
    let value = std::str::from_utf8(decode_bytes(&mut cursor)?).ok()?;
    *buf = cursor;
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_shape_examples() {
        let mut buf = Vec::new();
        encode_u64(0, &mut buf);
        assert_eq!(&buf[..], &[0x00]);

        buf.clear();
        encode_u64(127, &mut buf);
        assert_eq!(&buf[..], &[0x7F]);

        buf.clear();
        encode_u64(128, &mut buf);
        assert_eq!(&buf[..], &[0x80, 0x01]);

        buf.clear();
        encode_u64(300, &mut buf);
        assert_eq!(&buf[..], &[0xAC, 0x02]);

        buf.clear();
        encode_u64(u64::MAX, &mut buf);
        assert_eq!(
            &buf[..],
            &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
        );
    }

    #[test]
    fn sequential_decoding() {
        let values = [0_u64, 1, 127, 128, 16383, 16384, 1_000_000, u64::MAX];
        let mut buf = Vec::new();
        for &v in &values {
            let size = encode_u64(v, &mut buf);
            assert_eq!(size, encoded_size_u64(v), "value {v} size mismatch");
        }

        let mut s: &[u8] = &buf;
        for &v in &values {
            assert_eq!(decode_u64(&mut s), Some(v));
        }
        assert!(s.is_empty());
    }

    #[test]
    fn decode_malformed() {
        let mut s: &[u8] = &[0x80, 0x80];
        assert_eq!(decode_u64(&mut s), None);
        assert_eq!(s.len(), 2);

        let mut s: &[u8] = &[0xFF; 11];
        assert_eq!(decode_u64(&mut s), None);
    }

    #[test]
    fn strings() {
        let mut buf = Vec::new();
        encode_str("cxx_add_to_sub", &mut buf);
        encode_str("", &mut buf);

        let mut s: &[u8] = &buf;
        assert_eq!(decode_str(&mut s), Some("cxx_add_to_sub"));
        assert_eq!(decode_str(&mut s), Some(""));
        assert!(s.is_empty());

        let mut truncated: &[u8] = &buf[..5];
        assert_eq!(decode_str(&mut truncated), None);
        assert_eq!(truncated.len(), 5);
    }
}
