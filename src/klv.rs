//! KLV (Key-Length-Value) metadata codec.
//!
//! Decodes MISB-style metadata buffers: each item is a 16-byte universal
//! label, a BER-encoded length, and a value. Parsed items borrow their value
//! bytes from the parent buffer; nothing is copied unless the caller copies
//! it. The parser is the crate's designated fuzz target and treats every
//! malformed input as a recoverable [`ParseError`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, ParseError, Result};

/// Universal label length in bytes.
pub const KLV_KEY_LEN: usize = 16;

/// Smallest encodable item: 16-byte key plus one length byte.
const MIN_ITEM_LEN: usize = KLV_KEY_LEN + 1;

/// MISB STD 0601 UAS Datalink Local Set universal label.
pub const KLV_UAS_DATALINK_LS: KlvKey = KlvKey([
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x0B, 0x01, 0x01, 0x0E, 0x01, 0x03, 0x01, 0x01, 0x00, 0x00, 0x00,
]);

/// MISB STD 0601 sensor latitude (tag 13).
pub const KLV_SENSOR_LATITUDE: KlvKey = KlvKey([
    0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x03, 0x07, 0x01, 0x02, 0x01, 0x02, 0x04, 0x02, 0x00,
]);

/// MISB STD 0601 sensor longitude (tag 14).
pub const KLV_SENSOR_LONGITUDE: KlvKey = KlvKey([
    0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x03, 0x07, 0x01, 0x02, 0x01, 0x02, 0x04, 0x04, 0x00,
]);

/// MISB STD 0601 sensor altitude (tag 15).
pub const KLV_SENSOR_ALTITUDE: KlvKey = KlvKey([
    0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x03, 0x07, 0x01, 0x02, 0x01, 0x02, 0x06, 0x02, 0x00,
]);

/// A 16-byte BER-OID universal label, compared by exact byte equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KlvKey(pub [u8; KLV_KEY_LEN]);

impl KlvKey {
    pub const fn new(bytes: [u8; KLV_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KLV_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for KlvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KlvKey({})", hex::encode(self.0))
    }
}

impl fmt::Display for KlvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// One captured metadata packet: owned bytes plus capture timestamp and
/// sequence number. Immutable after creation; items parsed from it borrow
/// its bytes and must be dropped with (or before) the buffer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KlvBuffer {
    pub data: Vec<u8>,
    pub timestamp_ns: u64,
    pub sequence: u32,
}

impl KlvBuffer {
    pub fn new(data: Vec<u8>, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            timestamp_ns,
            sequence,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A parsed item. `value` is a view into the parent buffer, never an
/// independent allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KlvItem<'a> {
    pub key: KlvKey,
    pub length: u32,
    pub value: &'a [u8],
}

/// Parse a KLV buffer into its items.
///
/// Walks from offset 0 consuming (key, BER length, value) triplets while at
/// least 17 bytes remain. The walk must land exactly on the end of the
/// buffer: leftover bytes that cannot form an item are a parse error, so a
/// buffer truncated at any interior offset is rejected rather than silently
/// shortened.
///
/// BER lengths: short form when the high bit of the first length byte is
/// clear; long form otherwise, with the low 7 bits giving the count of
/// following big-endian length bytes (1-4 accepted). Offset arithmetic is
/// checked, so a forged length near `u32::MAX` cannot wrap the bounds test.
pub fn parse_klv(buffer: &KlvBuffer) -> Result<Vec<KlvItem<'_>>> {
    let data = buffer.data.as_slice();
    if data.is_empty() {
        return Err(Error::InvalidArgument("empty KLV buffer".to_string()));
    }

    let mut items = Vec::new();
    let mut pos = 0usize;

    while data.len() - pos >= MIN_ITEM_LEN {
        let mut key = [0u8; KLV_KEY_LEN];
        key.copy_from_slice(&data[pos..pos + KLV_KEY_LEN]);
        pos += KLV_KEY_LEN;

        let length_byte = data[pos];
        pos += 1;

        let length: u32 = if length_byte & 0x80 != 0 {
            let count = (length_byte & 0x7F) as usize;
            if count == 0 || count > 4 {
                return Err(ParseError::MalformedLength { count: count as u8 }.into());
            }
            if data.len() - pos < count {
                return Err(ParseError::TruncatedLength {
                    offset: pos,
                    needed: count,
                    available: data.len() - pos,
                }
                .into());
            }
            let mut acc: u32 = 0;
            for _ in 0..count {
                acc = (acc << 8) | u32::from(data[pos]);
                pos += 1;
            }
            acc
        } else {
            u32::from(length_byte)
        };

        let end = pos
            .checked_add(length as usize)
            .filter(|&end| end <= data.len())
            .ok_or(ParseError::TruncatedValue {
                offset: pos,
                length,
                available: data.len(),
            })?;

        items.push(KlvItem {
            key: KlvKey(key),
            length,
            value: &data[pos..end],
        });
        pos = end;
    }

    if pos != data.len() {
        return Err(ParseError::TrailingBytes {
            offset: pos,
            remaining: data.len() - pos,
        }
        .into());
    }

    Ok(items)
}

/// First item whose key matches exactly, or `None`. Duplicate keys resolve
/// to the earliest occurrence.
pub fn find_item<'a, 'b>(items: &'b [KlvItem<'a>], key: &KlvKey) -> Option<&'b KlvItem<'a>> {
    items.iter().find(|item| item.key == *key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_item(buf: &mut Vec<u8>, key: &KlvKey, value: &[u8]) {
        buf.extend_from_slice(&key.0);
        assert!(value.len() < 128, "test helper only emits short form");
        buf.push(value.len() as u8);
        buf.extend_from_slice(value);
    }

    fn push_item_long_form(buf: &mut Vec<u8>, key: &KlvKey, value: &[u8], count: u8) {
        buf.extend_from_slice(&key.0);
        buf.push(0x80 | count);
        let len = value.len() as u32;
        for i in (0..count).rev() {
            buf.push((len >> (8 * i as u32)) as u8);
        }
        buf.extend_from_slice(value);
    }

    #[test]
    fn parses_short_form_items() {
        let mut data = Vec::new();
        push_item(&mut data, &KLV_UAS_DATALINK_LS, &[1, 2, 3, 4, 5, 6, 7, 8]);
        push_item(&mut data, &KLV_SENSOR_LATITUDE, &[0xAA, 0xBB, 0xCC, 0xDD]);
        let buffer = KlvBuffer::new(data, 1_000_000_000, 1);

        let items = parse_klv(&buffer).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, KLV_UAS_DATALINK_LS);
        assert_eq!(items[0].length, 8);
        assert_eq!(items[0].value, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(items[1].key, KLV_SENSOR_LATITUDE);
        assert_eq!(items[1].value, &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn round_trips_mixed_length_forms() {
        let long_value: Vec<u8> = (0..300u16).map(|i| (i % 251) as u8).collect();
        let mut data = Vec::new();
        push_item_long_form(&mut data, &KLV_SENSOR_LONGITUDE, &long_value, 2);
        push_item(&mut data, &KLV_SENSOR_ALTITUDE, &[0x42]);
        push_item_long_form(&mut data, &KLV_UAS_DATALINK_LS, &[9; 5], 4);
        let buffer = KlvBuffer::new(data, 0, 0);

        let items = parse_klv(&buffer).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].length, 300);
        assert_eq!(items[0].value, long_value.as_slice());
        assert_eq!(items[1].value, &[0x42]);
        assert_eq!(items[2].length, 5);
    }

    #[test]
    fn parses_zero_length_value_at_end() {
        // Exactly 17 bytes remain when this item starts.
        let mut data = Vec::new();
        push_item(&mut data, &KLV_SENSOR_LATITUDE, &[]);
        let buffer = KlvBuffer::new(data, 0, 0);

        let items = parse_klv(&buffer).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].length, 0);
        assert!(items[0].value.is_empty());
    }

    #[test]
    fn empty_buffer_is_invalid_argument() {
        let buffer = KlvBuffer::new(Vec::new(), 0, 0);
        assert!(matches!(
            parse_klv(&buffer),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_long_form_count_over_four() {
        let mut data = Vec::new();
        data.extend_from_slice(&KLV_UAS_DATALINK_LS.0);
        data.push(0x85);
        data.extend_from_slice(&[0, 0, 0, 0, 1]);
        let buffer = KlvBuffer::new(data, 0, 0);

        assert!(matches!(
            parse_klv(&buffer),
            Err(Error::Parse(ParseError::MalformedLength { count: 5 }))
        ));
    }

    #[test]
    fn rejects_indefinite_length_form() {
        let mut data = Vec::new();
        data.extend_from_slice(&KLV_UAS_DATALINK_LS.0);
        data.push(0x80);
        data.extend_from_slice(&[0; 4]);
        let buffer = KlvBuffer::new(data, 0, 0);

        assert!(matches!(
            parse_klv(&buffer),
            Err(Error::Parse(ParseError::MalformedLength { count: 0 }))
        ));
    }

    #[test]
    fn rejects_value_past_buffer_end() {
        let mut data = Vec::new();
        data.extend_from_slice(&KLV_SENSOR_LATITUDE.0);
        data.push(0x10); // claims 16 bytes
        data.extend_from_slice(&[0xEE; 4]); // only 4 present
        let buffer = KlvBuffer::new(data, 0, 0);

        assert!(matches!(
            parse_klv(&buffer),
            Err(Error::Parse(ParseError::TruncatedValue { .. }))
        ));
    }

    #[test]
    fn forged_length_near_u32_max_cannot_wrap_bounds_check() {
        let mut data = Vec::new();
        data.extend_from_slice(&KLV_UAS_DATALINK_LS.0);
        data.push(0x84);
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        // A few bytes of "value" so the length bytes themselves parse.
        data.extend_from_slice(&[0xAB; 8]);
        let buffer = KlvBuffer::new(data, 0, 0);

        assert!(matches!(
            parse_klv(&buffer),
            Err(Error::Parse(ParseError::TruncatedValue {
                length: 0xFFFF_FFFF,
                ..
            }))
        ));
    }

    #[test]
    fn truncation_at_every_offset_is_rejected() {
        let mut data = Vec::new();
        push_item(&mut data, &KLV_UAS_DATALINK_LS, &[1, 2, 3, 4, 5, 6, 7, 8]);
        push_item_long_form(&mut data, &KLV_SENSOR_LATITUDE, &[7; 200], 2);
        let full_len = data.len();

        for cut in 1..full_len {
            let buffer = KlvBuffer::new(data[..cut].to_vec(), 0, 0);
            let result = parse_klv(&buffer);
            // The only valid prefix is the boundary after the first item.
            if cut == 25 {
                assert_eq!(result.unwrap().len(), 1);
            } else {
                assert!(result.is_err(), "cut at {} should fail", cut);
            }
        }
    }

    #[test]
    fn find_item_returns_first_match() {
        let mut data = Vec::new();
        push_item(&mut data, &KLV_SENSOR_LATITUDE, &[0x01]);
        push_item(&mut data, &KLV_SENSOR_LATITUDE, &[0x02]);
        let buffer = KlvBuffer::new(data, 0, 0);
        let items = parse_klv(&buffer).unwrap();

        let found = find_item(&items, &KLV_SENSOR_LATITUDE).unwrap();
        assert_eq!(found.value, &[0x01]);
        assert!(find_item(&items, &KLV_SENSOR_LONGITUDE).is_none());
    }
}
