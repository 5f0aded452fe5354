use super::*;
use std::io::Cursor;

// -------------------- Helpers --------------------

fn sample() -> Record {
    Record::new(1_700_000_000, false, b"user:42".to_vec(), b"alice".to_vec())
}

fn read_all(data: &[u8]) -> Vec<Result<Option<Record>, RecordError>> {
    let mut cursor = Cursor::new(data.to_vec());
    let mut out = Vec::new();
    loop {
        let res = Record::read_from(&mut cursor);
        let stop = !matches!(res, Ok(Some(_)));
        out.push(res);
        if stop {
            break;
        }
    }
    out
}

// -------------------- Layout --------------------

#[test]
fn encoded_layout_matches_format() {
    let rec = sample();
    let bytes = rec.encode();

    assert_eq!(bytes.len(), HEADER_BYTES + 7 + 5);
    assert_eq!(bytes.len(), rec.encoded_len());
    assert_eq!(&bytes[0..4], &rec.checksum().to_le_bytes());
    assert_eq!(&bytes[4..12], &1_700_000_000i64.to_le_bytes());
    assert_eq!(bytes[12], 0);
    assert_eq!(&bytes[13..21], &7u64.to_le_bytes());
    assert_eq!(&bytes[21..29], &5u64.to_le_bytes());
    assert_eq!(&bytes[29..36], b"user:42");
    assert_eq!(&bytes[36..], b"alice");
}

#[test]
fn checksum_covers_everything_after_itself() {
    let bytes = sample().encode();
    let mut hasher = Crc32::new();
    hasher.update(&bytes[4..]);
    assert_eq!(hasher.finalize(), sample().checksum());
}

#[test]
fn sizes_follow_key_and_value() {
    let rec = sample();
    assert_eq!(rec.key_size(), 7);
    assert_eq!(rec.value_size(), 5);
}

#[test]
fn tombstone_has_empty_value() {
    let rec = Record::tombstone(b"gone".to_vec());
    assert!(rec.is_tombstone());
    assert!(rec.value().is_empty());
    assert_eq!(rec.value_size(), 0);
    assert!(rec.timestamp() > 0);
}

// -------------------- Decode --------------------

#[test]
fn decode_roundtrip_live_and_tombstone() {
    let live = sample();
    assert_eq!(Record::decode(&live.encode()).unwrap(), live);

    let dead = Record::new(-5, true, b"k".to_vec(), Vec::new());
    assert_eq!(Record::decode(&dead.encode()).unwrap(), dead);
}

#[test]
fn decode_empty_key_and_value() {
    let rec = Record::new(0, false, Vec::new(), Vec::new());
    let bytes = rec.encode();
    assert_eq!(bytes.len(), HEADER_BYTES);
    assert_eq!(Record::decode(&bytes).unwrap(), rec);
}

#[test]
fn flipping_any_non_crc_byte_is_checksum_mismatch() {
    let bytes = sample().encode();
    for i in CRC_BYTES..bytes.len() {
        let mut damaged = bytes.clone();
        damaged[i] ^= 0x5A;
        let res = Record::decode(&damaged);
        assert!(
            matches!(res, Err(RecordError::ChecksumMismatch { .. })),
            "byte {} flip should be detected, got {:?}",
            i,
            res
        );
    }
}

#[test]
fn flipping_crc_byte_is_checksum_mismatch() {
    let mut bytes = sample().encode();
    bytes[0] ^= 0xFF;
    assert!(matches!(
        Record::decode(&bytes),
        Err(RecordError::ChecksumMismatch { .. })
    ));
}

#[test]
fn decode_short_slice_is_truncated() {
    let bytes = sample().encode();
    assert!(matches!(
        Record::decode(&bytes[..HEADER_BYTES - 1]),
        Err(RecordError::Truncated)
    ));
}

#[test]
fn decode_rejects_trailing_bytes_with_valid_crc() {
    // Build a frame whose CRC covers an extra trailing byte.
    let rec = sample();
    let mut body = rec.encode()[CRC_BYTES..].to_vec();
    body.push(0xAB);
    let mut hasher = Crc32::new();
    hasher.update(&body);
    let mut bytes = hasher.finalize().to_le_bytes().to_vec();
    bytes.extend_from_slice(&body);

    assert!(matches!(
        Record::decode(&bytes),
        Err(RecordError::Malformed(_))
    ));
}

#[test]
fn decode_rejects_unknown_tombstone_flag() {
    let rec = sample();
    let mut body = rec.encode()[CRC_BYTES..].to_vec();
    body[8] = 7;
    let mut hasher = Crc32::new();
    hasher.update(&body);
    let mut bytes = hasher.finalize().to_le_bytes().to_vec();
    bytes.extend_from_slice(&body);

    let err = Record::decode(&bytes).unwrap_err();
    assert!(err.is_corruption());
}

/// `sample()` re-framed with the tombstone flag set and a valid CRC.
fn tombstone_with_value_bytes() -> Vec<u8> {
    let mut body = sample().encode()[CRC_BYTES..].to_vec();
    body[8] = 1;
    let mut hasher = Crc32::new();
    hasher.update(&body);
    let mut bytes = hasher.finalize().to_le_bytes().to_vec();
    bytes.extend_from_slice(&body);
    bytes
}

#[test]
fn new_tombstone_drops_value() {
    let rec = Record::new(5, true, b"k".to_vec(), b"stale".to_vec());
    assert!(rec.is_tombstone());
    assert!(rec.value().is_empty());
    assert_eq!(rec, Record::new(5, true, b"k".to_vec(), Vec::new()));
    assert_eq!(Record::decode(&rec.encode()).unwrap(), rec);
}

#[test]
fn decode_rejects_tombstone_with_value() {
    let err = Record::decode(&tombstone_with_value_bytes()).unwrap_err();
    assert!(matches!(err, RecordError::Malformed(_)));
    assert!(err.is_corruption());
}

// -------------------- Streaming reads --------------------

#[test]
fn read_from_sequence_then_clean_eof() {
    let a = sample();
    let b = Record::new(2, true, b"b".to_vec(), Vec::new());
    let mut data = a.encode();
    b.encode_into(&mut data);

    let results = read_all(&data);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().as_ref(), Some(&a));
    assert_eq!(results[1].as_ref().unwrap().as_ref(), Some(&b));
    assert!(matches!(results[2], Ok(None)));
}

#[test]
fn read_from_skips_past_corrupt_record() {
    let a = Record::new(1, false, b"a".to_vec(), b"1".to_vec());
    let b = Record::new(2, false, b"b".to_vec(), b"2".to_vec());
    let mut data = a.encode();
    let second = data.len();
    b.encode_into(&mut data);
    data[0] ^= 0xFF; // damage a's checksum

    let mut cursor = Cursor::new(data);
    let err = Record::read_from(&mut cursor).unwrap_err();
    assert!(matches!(err, RecordError::ChecksumMismatch { .. }));
    assert_eq!(cursor.position() as usize, second);
    assert_eq!(Record::read_from(&mut cursor).unwrap(), Some(b));
}

#[test]
fn read_from_partial_crc_is_truncated() {
    let results = read_all(&[1, 2]);
    assert!(matches!(results[0], Err(RecordError::Truncated)));
}

#[test]
fn read_from_partial_payload_is_truncated() {
    let bytes = sample().encode();
    let results = read_all(&bytes[..bytes.len() - 2]);
    assert!(matches!(results[0], Err(RecordError::Truncated)));
}

#[test]
fn read_from_huge_declared_length_is_truncated() {
    let mut bytes = sample().encode();
    bytes[13..21].copy_from_slice(&u64::MAX.to_le_bytes());
    let results = read_all(&bytes);
    assert!(matches!(results[0], Err(RecordError::Truncated)));
}

#[test]
fn truncated_is_not_skippable_corruption() {
    assert!(!RecordError::Truncated.is_corruption());
    assert!(RecordError::ChecksumMismatch {
        expected: 1,
        actual: 2
    }
    .is_corruption());
}

#[test]
fn read_from_rejects_tombstone_with_value_and_moves_on() {
    let mut data = tombstone_with_value_bytes();
    let next = Record::new(9, false, b"n".to_vec(), b"1".to_vec());
    next.encode_into(&mut data);

    let mut cur = Cursor::new(data);
    assert!(matches!(
        Record::read_from(&mut cur),
        Err(RecordError::Malformed(_))
    ));
    assert_eq!(Record::read_from(&mut cur).unwrap(), Some(next));
}
