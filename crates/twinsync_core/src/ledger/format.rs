//! Binary layout of a persisted ledger.
//!
//! ```text
//! +--------+---------+------------------+-------------------------------+
//! | "TSLG" | version | sha256(body)     | body: CBOR { profile, records }|
//! | 4 B    | u16 LE  | 32 B             | variable                      |
//! +--------+---------+------------------+-------------------------------+
//! ```

use super::Ledger;
use crate::error::{LedgerError, LedgerResult};
use crate::relation::RelationRecord;
use crate::types::{EntityKey, VersionToken};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Magic bytes at the start of every ledger file.
pub const LEDGER_MAGIC: [u8; 4] = *b"TSLG";

/// Current ledger format version.
pub const LEDGER_FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 32;

#[derive(Serialize)]
struct BodyRef<'a, AI, AV, BI, BV> {
    profile: &'a str,
    records: Vec<&'a RelationRecord<AI, AV, BI, BV>>,
}

#[derive(Deserialize)]
struct Body<AI, AV, BI, BV> {
    profile: String,
    records: Vec<RelationRecord<AI, AV, BI, BV>>,
}

/// Encodes a ledger for the given profile.
pub fn encode_ledger<AI, AV, BI, BV>(
    profile: &str,
    ledger: &Ledger<AI, AV, BI, BV>,
) -> LedgerResult<Vec<u8>>
where
    AI: EntityKey,
    AV: VersionToken,
    BI: EntityKey,
    BV: VersionToken,
{
    let body = BodyRef {
        profile,
        records: ledger.iter().collect(),
    };

    let mut encoded = Vec::new();
    ciborium::into_writer(&body, &mut encoded).map_err(LedgerError::codec)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + encoded.len());
    buf.extend_from_slice(&LEDGER_MAGIC);
    buf.extend_from_slice(&LEDGER_FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&Sha256::digest(&encoded));
    buf.extend_from_slice(&encoded);
    Ok(buf)
}

/// Decodes a ledger, checking it belongs to `expected_profile`.
///
/// Verifies magic, version, checksum and the one-record-per-id invariants.
pub fn decode_ledger<AI, AV, BI, BV>(
    data: &[u8],
    expected_profile: &str,
) -> LedgerResult<Ledger<AI, AV, BI, BV>>
where
    AI: EntityKey,
    AV: VersionToken,
    BI: EntityKey,
    BV: VersionToken,
{
    let (_, body) = decode_body::<AI, AV, BI, BV>(data)?;

    if body.profile != expected_profile {
        return Err(LedgerError::corrupted(format!(
            "ledger belongs to profile {:?}, expected {:?}",
            body.profile, expected_profile
        )));
    }

    Ledger::from_records(body.records).map_err(|dup| {
        LedgerError::corrupted(format!(
            "duplicate correlation for a_id {:?} / b_id {:?}",
            dup.a_id, dup.b_id
        ))
    })
}

/// A relation record with every field left as a CBOR value.
pub type RawRecord =
    RelationRecord<ciborium::Value, ciborium::Value, ciborium::Value, ciborium::Value>;

/// A ledger decoded without knowing the concrete id and version types.
///
/// Used by tooling that inspects ledgers of arbitrary profiles.
#[derive(Debug, Clone)]
pub struct RawLedger {
    /// Format version found in the header.
    pub format_version: u16,
    /// Profile the ledger belongs to.
    pub profile: String,
    /// Records with every field left as a CBOR value.
    pub records: Vec<RawRecord>,
}

impl RawLedger {
    /// Decodes a ledger without type information.
    ///
    /// Magic, version and checksum are verified; uniqueness is not, so that
    /// corrupt files can still be inspected.
    pub fn decode(data: &[u8]) -> LedgerResult<Self> {
        let (format_version, body) = decode_body(data)?;
        Ok(Self {
            format_version,
            profile: body.profile,
            records: body.records,
        })
    }
}

fn decode_body<AI, AV, BI, BV>(data: &[u8]) -> LedgerResult<(u16, Body<AI, AV, BI, BV>)>
where
    Body<AI, AV, BI, BV>: for<'de> Deserialize<'de>,
{
    if data.len() < HEADER_LEN {
        return Err(LedgerError::corrupted("ledger too short"));
    }
    if data[0..4] != LEDGER_MAGIC {
        return Err(LedgerError::corrupted("invalid ledger magic"));
    }

    let version = u16::from_le_bytes([data[4], data[5]]);
    if version > LEDGER_FORMAT_VERSION {
        return Err(LedgerError::UnsupportedVersion(version));
    }

    let checksum = &data[6..HEADER_LEN];
    let encoded = &data[HEADER_LEN..];
    if Sha256::digest(encoded).as_slice() != checksum {
        return Err(LedgerError::corrupted("ledger checksum mismatch"));
    }

    let body = ciborium::from_reader(encoded).map_err(LedgerError::codec)?;
    Ok((version, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestLedger = Ledger<String, u64, u32, String>;

    fn sample() -> TestLedger {
        TestLedger::from_records(vec![
            RelationRecord::new("a1".into(), 1, 10, "etag-a".into()),
            RelationRecord::new("a2".into(), 7, 11, "etag-b".into()),
        ])
        .unwrap()
    }

    #[test]
    fn header_layout() {
        let bytes = encode_ledger("calendar", &sample()).unwrap();
        assert_eq!(&bytes[0..4], b"TSLG");
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), LEDGER_FORMAT_VERSION);
        assert!(bytes.len() > HEADER_LEN);
    }

    #[test]
    fn decode_restores_records() {
        let bytes = encode_ledger("calendar", &sample()).unwrap();
        let decoded: TestLedger = decode_ledger(&bytes, "calendar").unwrap();

        assert_eq!(decoded.into_records(), sample().into_records());
    }

    #[test]
    fn decode_rejects_other_profile() {
        let bytes = encode_ledger("calendar", &sample()).unwrap();
        let result: LedgerResult<TestLedger> = decode_ledger(&bytes, "tasks");
        assert!(matches!(result, Err(LedgerError::Corrupted(_))));
    }

    #[test]
    fn decode_detects_bit_flip() {
        let mut bytes = encode_ledger("calendar", &sample()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let result: LedgerResult<TestLedger> = decode_ledger(&bytes, "calendar");
        assert!(matches!(result, Err(LedgerError::Corrupted(msg)) if msg.contains("checksum")));
    }

    #[test]
    fn decode_rejects_bad_magic_and_future_version() {
        let mut bytes = encode_ledger("calendar", &sample()).unwrap();
        bytes[0] = b'X';
        let result: LedgerResult<TestLedger> = decode_ledger(&bytes, "calendar");
        assert!(matches!(result, Err(LedgerError::Corrupted(_))));

        let mut bytes = encode_ledger("calendar", &sample()).unwrap();
        bytes[4..6].copy_from_slice(&(LEDGER_FORMAT_VERSION + 1).to_le_bytes());
        let result: LedgerResult<TestLedger> = decode_ledger(&bytes, "calendar");
        assert!(matches!(result, Err(LedgerError::UnsupportedVersion(_))));
    }

    #[test]
    fn raw_decode_keeps_untyped_values() {
        let bytes = encode_ledger("calendar", &sample()).unwrap();
        let raw = RawLedger::decode(&bytes).unwrap();

        assert_eq!(raw.profile, "calendar");
        assert_eq!(raw.format_version, LEDGER_FORMAT_VERSION);
        assert_eq!(raw.records.len(), 2);
        assert_eq!(raw.records[0].a_id, ciborium::Value::Text("a1".into()));
    }

    #[test]
    fn empty_ledger_encodes() {
        let bytes = encode_ledger("empty", &TestLedger::new()).unwrap();
        let decoded: TestLedger = decode_ledger(&bytes, "empty").unwrap();
        assert!(decoded.is_empty());
    }
}
