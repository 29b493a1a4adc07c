//! Command and response payload layouts.
//!
//! Request payloads are either empty, a little-endian `u32` index, or a
//! sequence of NUL-terminated UTF-8 names. Response payloads are a `u32`
//! count, a NUL-terminated name, or packed little-endian `f64` values.
//!
//! Decoders return `None` for short payloads: on this protocol an empty or
//! truncated response means "no data for that query", not a broken stream.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};

use crate::types::{Result, ViconError};

/// Request payload carrying a subject index.
pub fn encode_index(index: u32) -> Bytes {
    Bytes::copy_from_slice(&index.to_le_bytes())
}

/// Request payload carrying NUL-terminated names, in order.
pub fn encode_names(names: &[&str]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(names.iter().map(|n| n.len() + 1).sum());
    for name in names {
        if name.as_bytes().contains(&0) {
            return Err(ViconError::InvalidName((*name).to_string()));
        }
        buf.put_slice(name.as_bytes());
        buf.put_u8(0);
    }
    Ok(buf.freeze())
}

/// Split a request payload back into its NUL-terminated names.
///
/// A trailing fragment without a terminator is ignored.
pub fn decode_names(payload: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = payload;
    while let Some(end) = rest.iter().position(|&b| b == 0) {
        names.push(String::from_utf8_lossy(&rest[..end]).into_owned());
        rest = &rest[end + 1..];
    }
    names
}

/// Decode a request index payload.
pub fn decode_index(payload: &[u8]) -> Option<u32> {
    decode_count(payload)
}

/// Decode a `u32` count from the first four bytes.
pub fn decode_count(payload: &[u8]) -> Option<u32> {
    (payload.len() >= 4).then(|| LittleEndian::read_u32(&payload[..4]))
}

/// Decode a name up to the first NUL byte.
///
/// Invalid UTF-8 is replaced rather than rejected. Without a terminator the
/// whole payload is used.
pub fn decode_name(payload: &[u8]) -> String {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

/// Decode `N` little-endian `f64` values from the front of the payload.
pub fn decode_f64s<const N: usize>(payload: &[u8]) -> Option<[f64; N]> {
    if payload.len() < N * 8 {
        return None;
    }
    let mut values = [0f64; N];
    LittleEndian::read_f64_into(&payload[..N * 8], &mut values);
    Some(values)
}

/// Response payload carrying a count.
pub fn encode_count(count: u32) -> Bytes {
    encode_index(count)
}

/// Response payload carrying a single NUL-terminated name.
pub fn encode_name(name: &str) -> Result<Bytes> {
    encode_names(&[name])
}

/// Response payload carrying packed little-endian `f64` values.
pub fn encode_f64s(values: &[f64]) -> Bytes {
    let mut buf = vec![0u8; values.len() * 8];
    LittleEndian::write_f64_into(values, &mut buf);
    Bytes::from(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_names_null_terminates_each() {
        let payload = encode_names(&["robot_1", "robot_1"]).unwrap();
        assert_eq!(&payload[..], b"robot_1\x00robot_1\x00");
    }

    #[test]
    fn test_encode_names_rejects_interior_nul() {
        let err = encode_names(&["bad\0name"]).unwrap_err();
        assert!(matches!(err, ViconError::InvalidName(_)));
    }

    #[test]
    fn test_decode_names_ignores_unterminated_tail() {
        assert_eq!(decode_names(b"wand\x00wand\x00tail"), vec!["wand", "wand"]);
        assert!(decode_names(b"").is_empty());
    }

    #[test]
    fn test_decode_count_needs_four_bytes() {
        assert_eq!(decode_count(&[]), None);
        assert_eq!(decode_count(&[1, 0, 0]), None);
        assert_eq!(decode_count(&[3, 0, 0, 0]), Some(3));
        assert_eq!(decode_count(&[0, 1, 0, 0, 0xFF]), Some(256));
    }

    #[test]
    fn test_decode_name_stops_at_first_nul() {
        assert_eq!(decode_name(b"robot_1\x00garbage"), "robot_1");
        assert_eq!(decode_name(b"no_terminator"), "no_terminator");
        assert_eq!(decode_name(b""), "");
    }

    #[test]
    fn test_decode_name_is_lossy() {
        let name = decode_name(b"rob\xFFot\x00");
        assert!(name.starts_with("rob"));
        assert!(name.ends_with("ot"));
        assert!(name.contains('\u{FFFD}'));
    }

    #[test]
    fn test_decode_translation_triple() {
        let mut payload = Vec::new();
        for v in [1.0f64, -2.5, 3.25] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(decode_f64s::<3>(&payload), Some([1.0, -2.5, 3.25]));
        assert_eq!(decode_f64s::<3>(&payload[..23]), None);
        assert_eq!(decode_f64s::<3>(&[]), None);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut payload = encode_f64s(&[0.0, 0.0, 0.5, 0.75]).to_vec();
        payload.extend_from_slice(&[1, 2, 3]);
        let q = decode_f64s::<4>(&payload).unwrap();
        assert_eq!(q, [0.0, 0.0, 0.5, 0.75]);
        assert_eq!(decode_f64s::<4>(&payload[..31]), None);
    }
}
