//! Decoding of capture blobs.
//!
//! A capture blob is an Avro object container file whose entries each
//! carry the original enqueue time and an opaque body. Writers
//! sometimes close a blob right after a sync marker, leaving the first
//! bytes of a never-written block behind; that artifact loses nothing
//! and is tolerated. A cut inside a block that declares records is
//! different: those records exist and were not decoded, so the error
//! must surface and the blob stays in place for a retry.

use apache_avro::types::Value;
use apache_avro::Reader;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use crate::error::DecodeError;

pub const ENQUEUED_TIME_FIELD: &str = "EnqueuedTimeUtc";
pub const BODY_FIELD: &str = "Body";

/// Enqueue times are written as 12-hour clock strings, e.g.
/// `08/25/2026 09:15:02 AM`.
pub const ENQUEUED_TIME_FORMAT: &str = "%m/%d/%Y %r";

const CONTAINER_MAGIC: &[u8] = b"Obj\x01";
const SYNC_MARKER_LEN: usize = 16;

/// One event recovered from a capture blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRecord {
    pub enqueued_at: DateTime<Utc>,
    pub body: String,
}

/// Decode every complete record in a capture blob, in file order.
pub fn decode_capture_blob(payload: &[u8]) -> Result<Vec<CapturedRecord>, DecodeError> {
    let reader = Reader::new(payload)?;
    let mut records = Vec::new();
    for entry in reader {
        match entry {
            Ok(value) => records.push(captured_record(value)?),
            Err(err) => {
                if ends_in_empty_partial_block(payload, records.len()) {
                    warn!(
                        decoded = records.len(),
                        "capture blob ends in an empty partial block, keeping records decoded so far"
                    );
                    break;
                }
                return Err(err.into());
            }
        }
    }
    Ok(records)
}

/// Whether the container ends in a harmless partial trailing block.
///
/// The reader surfaces every truncation the same way, so this walks
/// the container framing on its own: magic, metadata map, then
/// `count`/`size`/data/sync per block. The tail is harmless only if
/// every block that declares records is whole (and was fully decoded)
/// and the leftover bytes are a block header declaring none.
fn ends_in_empty_partial_block(payload: &[u8], decoded: usize) -> bool {
    let Some(mut pos) = skip_container_header(payload) else {
        return false;
    };
    let mut complete: usize = 0;
    loop {
        if pos == payload.len() {
            // Every block is whole; the failure was not a truncation.
            return false;
        }
        let Some((count, after_count)) = read_zigzag_long(payload, pos) else {
            return complete == decoded;
        };
        let Ok(count) = usize::try_from(count) else {
            return false;
        };
        let Some((size, after_size)) = read_zigzag_long(payload, after_count) else {
            return complete == decoded;
        };
        let Ok(size) = usize::try_from(size) else {
            return false;
        };
        let Some(end) = after_size
            .checked_add(size)
            .and_then(|data_end| data_end.checked_add(SYNC_MARKER_LEN))
        else {
            return false;
        };
        if end > payload.len() {
            // Cut inside the block body: harmless only if it declared
            // no records.
            return count == 0 && complete == decoded;
        }
        complete += count;
        pos = end;
    }
}

fn skip_container_header(payload: &[u8]) -> Option<usize> {
    if !payload.starts_with(CONTAINER_MAGIC) {
        return None;
    }
    let mut pos = CONTAINER_MAGIC.len();
    // The metadata map: blocks of key/value pairs, a zero count ends it.
    loop {
        let (count, next) = read_zigzag_long(payload, pos)?;
        pos = next;
        if count == 0 {
            break;
        }
        if count < 0 {
            // A negative count carries an extra byte-size long.
            let (_, next) = read_zigzag_long(payload, pos)?;
            pos = next;
        }
        for _ in 0..count.unsigned_abs() {
            pos = skip_length_prefixed(payload, pos)?; // key
            pos = skip_length_prefixed(payload, pos)?; // value
        }
    }
    let end = pos.checked_add(SYNC_MARKER_LEN)?;
    (end <= payload.len()).then_some(end)
}

fn skip_length_prefixed(payload: &[u8], pos: usize) -> Option<usize> {
    let (len, next) = read_zigzag_long(payload, pos)?;
    let len = usize::try_from(len).ok()?;
    let end = next.checked_add(len)?;
    (end <= payload.len()).then_some(end)
}

fn read_zigzag_long(payload: &[u8], mut pos: usize) -> Option<(i64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *payload.get(pos)?;
        pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 63 {
            return None;
        }
    }
    let decoded = (value >> 1) as i64 ^ -((value & 1) as i64);
    Some((decoded, pos))
}

fn captured_record(value: Value) -> Result<CapturedRecord, DecodeError> {
    let Value::Record(fields) = value else {
        return Err(DecodeError::NotARecord);
    };
    let mut enqueued_at = None;
    let mut body = None;
    for (name, field) in fields {
        match name.as_str() {
            ENQUEUED_TIME_FIELD => {
                enqueued_at = Some(parse_enqueued_time(&text_field(
                    field,
                    ENQUEUED_TIME_FIELD,
                )?)?);
            }
            BODY_FIELD => body = Some(text_field(field, BODY_FIELD)?),
            _ => {}
        }
    }
    Ok(CapturedRecord {
        enqueued_at: enqueued_at.ok_or(DecodeError::MissingField(ENQUEUED_TIME_FIELD))?,
        body: body.ok_or(DecodeError::MissingField(BODY_FIELD))?,
    })
}

fn parse_enqueued_time(value: &str) -> Result<DateTime<Utc>, DecodeError> {
    NaiveDateTime::parse_from_str(value, ENQUEUED_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|source| DecodeError::Timestamp {
            value: value.to_string(),
            source,
        })
}

/// Capture writers emit the body as bytes and the timestamp as a
/// string, occasionally wrapped in a nullable union.
fn text_field(value: Value, field: &'static str) -> Result<String, DecodeError> {
    match value {
        Value::Union(_, inner) => text_field(*inner, field),
        Value::String(text) => Ok(text),
        Value::Bytes(raw) => match String::from_utf8(raw) {
            Ok(text) => Ok(text),
            Err(err) => {
                warn!(field, "field is not valid UTF-8, replacing invalid sequences");
                Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
            }
        },
        _ => Err(DecodeError::FieldType(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{capture_blob, capture_blob_blocks};
    use chrono::TimeZone;

    #[test]
    fn decodes_records_in_file_order() {
        let blob = capture_blob(&[
            ("08/25/2026 09:15:02 AM", b"{\"n\":1}"),
            ("08/25/2026 09:15:03 PM", b"{\"n\":2}"),
        ]);
        let records = decode_capture_blob(&blob).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].body, "{\"n\":1}");
        assert_eq!(
            records[0].enqueued_at,
            Utc.with_ymd_and_hms(2026, 8, 25, 9, 15, 2).unwrap()
        );
        assert_eq!(
            records[1].enqueued_at,
            Utc.with_ymd_and_hms(2026, 8, 25, 21, 15, 3).unwrap()
        );
    }

    #[test]
    fn empty_container_decodes_to_no_records() {
        let blob = capture_blob(&[]);
        assert!(decode_capture_blob(&blob).unwrap().is_empty());
    }

    #[test]
    fn truncated_trailing_block_header_keeps_earlier_records() {
        let mut blob = capture_blob(&[("08/25/2026 09:15:02 AM", b"{\"n\":1}")]);
        // Start of another block (object count) with nothing behind it.
        blob.push(0x02);
        let records = decode_capture_blob(&blob).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].body, "{\"n\":1}");
    }

    #[test]
    fn cut_mid_data_block_is_a_decode_error() {
        let mut blob = capture_blob(&[
            ("08/25/2026 09:15:02 AM", b"{\"n\":1}"),
            ("08/25/2026 09:15:03 AM", b"{\"n\":2}"),
        ]);
        blob.truncate(blob.len() - 10);
        assert!(matches!(
            decode_capture_blob(&blob),
            Err(DecodeError::Container(_))
        ));
    }

    #[test]
    fn cut_mid_block_fails_even_after_complete_blocks() {
        let mut blob = capture_blob_blocks(&[
            &[("08/25/2026 09:15:02 AM", b"{\"n\":1}")],
            &[
                ("08/25/2026 09:15:03 AM", b"{\"n\":2}"),
                ("08/25/2026 09:15:04 AM", b"{\"n\":3}"),
            ],
        ]);
        blob.truncate(blob.len() - 10);
        assert!(matches!(
            decode_capture_blob(&blob),
            Err(DecodeError::Container(_))
        ));
    }

    #[test]
    fn non_utf8_body_is_replaced_not_dropped() {
        let blob = capture_blob(&[("08/25/2026 09:15:02 AM", &[0xff, 0xfe, b'a'])]);
        let records = decode_capture_blob(&blob).unwrap();
        assert_eq!(records[0].body, "\u{fffd}\u{fffd}a");
    }

    #[test]
    fn unparseable_enqueue_time_is_an_error() {
        let blob = capture_blob(&[("2026-08-25T09:15:02Z", b"{}")]);
        assert!(matches!(
            decode_capture_blob(&blob),
            Err(DecodeError::Timestamp { .. })
        ));
    }

    #[test]
    fn garbage_payload_is_a_container_error() {
        assert!(matches!(
            decode_capture_blob(b"not an avro file"),
            Err(DecodeError::Container(_))
        ));
    }
}
