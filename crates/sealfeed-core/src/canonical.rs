//! Canonical CBOR encoding for the published record shapes.
//!
//! RFC 8949 Core Deterministic Encoding: integer map keys sorted by encoded
//! byte comparison, smallest valid integer encoding, definite lengths only,
//! no floats. The same record must produce identical bytes (and thus an
//! identical [`RecordId`]) on every platform.
//!
//! Decoding is strict: unknown kinds, wrong versions, missing fields, and
//! wrong field shapes are all rejected with `MalformedRecord`. There is no
//! branching on runtime representation (hex vs base64 vs raw bytes); bytes
//! are bytes.

use bytes::Bytes;
use ciborium::value::Value;

use crate::crypto::{HybridCiphertext, Nonce24, X25519PublicKey};
use crate::error::{CoreError, Result};
use crate::records::{
    EncryptedPostRecord, FeedStateRecord, GrantRecord, RecordKind, RekeyEventRecord, RekeyPacket,
    RECORD_VERSION,
};
use crate::types::{Epoch, FeedId, FollowerId, LeafIndex, NodeId, OwnerId, RecordId};

/// Map field keys. Keys 0-23 encode as single bytes in CBOR.
///
/// Keys 0 and 1 are common to every record; the rest are per-kind.
mod keys {
    pub const VERSION: u64 = 0;
    pub const KIND: u64 = 1;

    // FeedState
    pub const OWNER: u64 = 2;
    pub const FEED_ID: u64 = 3;
    pub const TREE_CAPACITY: u64 = 4;
    pub const MAX_EPOCH: u64 = 5;
    pub const ENCRYPTED_SEED: u64 = 6;

    // Grant
    pub const GRANT_FEED_ID: u64 = 2;
    pub const FOLLOWER: u64 = 3;
    pub const LEAF_INDEX: u64 = 4;
    pub const BUNDLE: u64 = 5;

    // Rekey
    pub const REKEY_FEED_ID: u64 = 2;
    pub const NEW_EPOCH: u64 = 3;
    pub const PACKETS: u64 = 4;
    pub const CEK_NONCE: u64 = 5;
    pub const ENCRYPTED_CEK: u64 = 6;

    // Post
    pub const AUTHOR: u64 = 2;
    pub const EPOCH: u64 = 3;
    pub const NONCE: u64 = 4;
    pub const CIPHERTEXT: u64 = 5;
    pub const TEASER: u64 = 6;
}

// ---------------------------------------------------------------------------
// Canonical Value encoder
// ---------------------------------------------------------------------------

/// Encode a CBOR Value canonically.
fn encode_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    write_value(&mut buf, value);
    buf
}

fn write_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => {
            let n: i128 = (*i).into();
            if n >= 0 {
                write_uint(buf, 0, n as u64);
            } else {
                // CBOR encodes -1 as 0, -2 as 1, etc.
                write_uint(buf, 1, (-1 - n) as u64);
            }
        }
        Value::Bytes(b) => {
            write_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            write_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            write_uint(buf, 4, arr.len() as u64);
            for item in arr {
                write_value(buf, item);
            }
        }
        Value::Map(entries) => {
            write_map(buf, entries);
        }
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        _ => panic!("unsupported CBOR value in canonical encoding"),
    }
}

/// Encode an unsigned integer with the given major type, smallest form.
fn write_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a map with keys sorted by their encoded byte comparison.
fn write_map(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut encoded: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            write_value(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();
    encoded.sort_by(|a, b| a.0.cmp(&b.0));

    write_uint(buf, 5, encoded.len() as u64);
    for (key_bytes, value) in encoded {
        buf.extend_from_slice(&key_bytes);
        write_value(buf, value);
    }
}

// ---------------------------------------------------------------------------
// Shared value helpers
// ---------------------------------------------------------------------------

fn uint(key: u64) -> Value {
    Value::Integer(key.into())
}

fn bytes(b: &[u8]) -> Value {
    Value::Bytes(b.to_vec())
}

fn hybrid_to_value(ct: &HybridCiphertext) -> Value {
    Value::Array(vec![
        bytes(ct.ephemeral_public.as_bytes()),
        bytes(ct.nonce.as_bytes()),
        bytes(&ct.ciphertext),
    ])
}

fn packet_to_value(packet: &RekeyPacket) -> Value {
    Value::Array(vec![
        uint(packet.target.level as u64),
        uint(packet.target.index as u64),
        uint(packet.target_version as u64),
        uint(packet.wrap.level as u64),
        uint(packet.wrap.index as u64),
        uint(packet.wrap_version as u64),
        Value::Bool(packet.wrap_is_new),
        bytes(packet.nonce.as_bytes()),
        bytes(&packet.ciphertext),
    ])
}

fn header_entries(kind: RecordKind) -> Vec<(Value, Value)> {
    vec![
        (uint(keys::VERSION), uint(RECORD_VERSION as u64)),
        (uint(keys::KIND), uint(kind.to_u16() as u64)),
    ]
}

// ---------------------------------------------------------------------------
// Strict decoding helpers
// ---------------------------------------------------------------------------

fn malformed(what: &str) -> CoreError {
    CoreError::MalformedRecord(what.to_string())
}

fn parse_value(data: &[u8]) -> Result<Vec<(Value, Value)>> {
    let value: Value = ciborium::from_reader(std::io::Cursor::new(data))
        .map_err(|e| CoreError::MalformedRecord(e.to_string()))?;
    match value {
        Value::Map(entries) => Ok(entries),
        _ => Err(malformed("expected map")),
    }
}

fn get<'a>(map: &'a [(Value, Value)], key: u64) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| {
            matches!(k, Value::Integer(i) if i128::from(*i) == key as i128)
        })
        .map(|(_, v)| v)
}

fn expect_uint(map: &[(Value, Value)], key: u64, what: &str) -> Result<u64> {
    match get(map, key) {
        Some(Value::Integer(i)) => {
            let n: i128 = (*i).into();
            if (0..=u64::MAX as i128).contains(&n) {
                Ok(n as u64)
            } else {
                Err(malformed(what))
            }
        }
        _ => Err(malformed(what)),
    }
}

fn expect_bytes<'a>(map: &'a [(Value, Value)], key: u64, what: &str) -> Result<&'a [u8]> {
    match get(map, key) {
        Some(Value::Bytes(b)) => Ok(b),
        _ => Err(malformed(what)),
    }
}

fn array32(b: &[u8], what: &str) -> Result<[u8; 32]> {
    b.try_into().map_err(|_| malformed(what))
}

fn array24(b: &[u8], what: &str) -> Result<[u8; 24]> {
    b.try_into().map_err(|_| malformed(what))
}

fn check_header(map: &[(Value, Value)], expected: RecordKind) -> Result<()> {
    let version = expect_uint(map, keys::VERSION, "missing version")?;
    if version != RECORD_VERSION as u64 {
        return Err(CoreError::MalformedRecord(format!(
            "unsupported record version: {}",
            version
        )));
    }

    let kind = expect_uint(map, keys::KIND, "missing kind")?;
    let kind = u16::try_from(kind)
        .ok()
        .and_then(RecordKind::from_u16)
        .ok_or_else(|| malformed("unknown record kind"))?;
    if kind != expected {
        return Err(CoreError::MalformedRecord(format!(
            "expected kind {:?}, got {:?}",
            expected, kind
        )));
    }
    Ok(())
}

fn hybrid_from_value(value: &Value, what: &str) -> Result<HybridCiphertext> {
    let items = match value {
        Value::Array(items) if items.len() == 3 => items,
        _ => return Err(malformed(what)),
    };
    let ephemeral = match &items[0] {
        Value::Bytes(b) => array32(b, what)?,
        _ => return Err(malformed(what)),
    };
    let nonce = match &items[1] {
        Value::Bytes(b) => array24(b, what)?,
        _ => return Err(malformed(what)),
    };
    let ciphertext = match &items[2] {
        Value::Bytes(b) => b.clone(),
        _ => return Err(malformed(what)),
    };
    Ok(HybridCiphertext {
        ephemeral_public: X25519PublicKey::from_bytes(ephemeral),
        nonce: Nonce24::from_bytes(nonce),
        ciphertext,
    })
}

fn packet_from_value(value: &Value) -> Result<RekeyPacket> {
    let items = match value {
        Value::Array(items) if items.len() == 9 => items,
        _ => return Err(malformed("invalid rekey packet")),
    };

    let as_uint = |v: &Value| -> Result<u64> {
        match v {
            Value::Integer(i) => {
                let n: i128 = (*i).into();
                u64::try_from(n).map_err(|_| malformed("invalid rekey packet"))
            }
            _ => Err(malformed("invalid rekey packet")),
        }
    };

    let target_level = u8::try_from(as_uint(&items[0])?).map_err(|_| malformed("packet level"))?;
    let target_index = u32::try_from(as_uint(&items[1])?).map_err(|_| malformed("packet index"))?;
    let target_version =
        u32::try_from(as_uint(&items[2])?).map_err(|_| malformed("packet version"))?;
    let wrap_level = u8::try_from(as_uint(&items[3])?).map_err(|_| malformed("packet level"))?;
    let wrap_index = u32::try_from(as_uint(&items[4])?).map_err(|_| malformed("packet index"))?;
    let wrap_version =
        u32::try_from(as_uint(&items[5])?).map_err(|_| malformed("packet version"))?;
    let wrap_is_new = match &items[6] {
        Value::Bool(b) => *b,
        _ => return Err(malformed("invalid rekey packet")),
    };
    let nonce = match &items[7] {
        Value::Bytes(b) => Nonce24::from_bytes(array24(b, "packet nonce")?),
        _ => return Err(malformed("packet nonce")),
    };
    let ciphertext = match &items[8] {
        Value::Bytes(b) => b.clone(),
        _ => return Err(malformed("packet ciphertext")),
    };

    Ok(RekeyPacket {
        target: NodeId::new(target_level, target_index),
        target_version,
        wrap: NodeId::new(wrap_level, wrap_index),
        wrap_version,
        wrap_is_new,
        nonce,
        ciphertext,
    })
}

// ---------------------------------------------------------------------------
// Per-record codecs
// ---------------------------------------------------------------------------

impl FeedStateRecord {
    /// Encode to canonical bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut entries = header_entries(RecordKind::FeedState);
        entries.push((uint(keys::OWNER), bytes(self.owner.as_bytes())));
        entries.push((uint(keys::FEED_ID), bytes(self.feed_id.as_bytes())));
        entries.push((uint(keys::TREE_CAPACITY), uint(self.tree_capacity as u64)));
        entries.push((uint(keys::MAX_EPOCH), uint(self.max_epoch as u64)));
        entries.push((
            uint(keys::ENCRYPTED_SEED),
            hybrid_to_value(&self.encrypted_seed),
        ));
        encode_canonical(&Value::Map(entries))
    }

    /// Decode from canonical bytes, rejecting anything malformed.
    pub fn from_canonical_bytes(data: &[u8]) -> Result<Self> {
        let map = parse_value(data)?;
        check_header(&map, RecordKind::FeedState)?;

        let owner = array32(expect_bytes(&map, keys::OWNER, "invalid owner")?, "invalid owner")?;
        let feed_id = array32(
            expect_bytes(&map, keys::FEED_ID, "invalid feed_id")?,
            "invalid feed_id",
        )?;
        let tree_capacity = u32::try_from(expect_uint(&map, keys::TREE_CAPACITY, "invalid tree_capacity")?)
            .map_err(|_| malformed("invalid tree_capacity"))?;
        let max_epoch = u32::try_from(expect_uint(&map, keys::MAX_EPOCH, "invalid max_epoch")?)
            .map_err(|_| malformed("invalid max_epoch"))?;
        let encrypted_seed = hybrid_from_value(
            get(&map, keys::ENCRYPTED_SEED).ok_or_else(|| malformed("missing encrypted_seed"))?,
            "invalid encrypted_seed",
        )?;

        Ok(Self {
            owner: OwnerId::from_bytes(owner),
            feed_id: FeedId::from_bytes(feed_id),
            tree_capacity,
            max_epoch,
            encrypted_seed,
        })
    }
}

impl GrantRecord {
    /// Encode to canonical bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut entries = header_entries(RecordKind::Grant);
        entries.push((uint(keys::GRANT_FEED_ID), bytes(self.feed_id.as_bytes())));
        entries.push((uint(keys::FOLLOWER), bytes(self.follower.as_bytes())));
        entries.push((uint(keys::LEAF_INDEX), uint(self.leaf_index.get() as u64)));
        entries.push((uint(keys::BUNDLE), hybrid_to_value(&self.bundle)));
        encode_canonical(&Value::Map(entries))
    }

    /// Decode from canonical bytes, rejecting anything malformed.
    pub fn from_canonical_bytes(data: &[u8]) -> Result<Self> {
        let map = parse_value(data)?;
        check_header(&map, RecordKind::Grant)?;

        let feed_id = array32(
            expect_bytes(&map, keys::GRANT_FEED_ID, "invalid feed_id")?,
            "invalid feed_id",
        )?;
        let follower = array32(
            expect_bytes(&map, keys::FOLLOWER, "invalid follower")?,
            "invalid follower",
        )?;
        let leaf_index = u32::try_from(expect_uint(&map, keys::LEAF_INDEX, "invalid leaf_index")?)
            .map_err(|_| malformed("invalid leaf_index"))?;
        let bundle = hybrid_from_value(
            get(&map, keys::BUNDLE).ok_or_else(|| malformed("missing bundle"))?,
            "invalid bundle",
        )?;

        Ok(Self {
            feed_id: FeedId::from_bytes(feed_id),
            follower: FollowerId::from_bytes(follower),
            leaf_index: LeafIndex::new(leaf_index),
            bundle,
        })
    }
}

impl RekeyEventRecord {
    /// Encode to canonical bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut entries = header_entries(RecordKind::Rekey);
        entries.push((uint(keys::REKEY_FEED_ID), bytes(self.feed_id.as_bytes())));
        entries.push((uint(keys::NEW_EPOCH), uint(self.new_epoch.get() as u64)));
        entries.push((
            uint(keys::PACKETS),
            Value::Array(self.packets.iter().map(packet_to_value).collect()),
        ));
        entries.push((uint(keys::CEK_NONCE), bytes(self.cek_nonce.as_bytes())));
        entries.push((uint(keys::ENCRYPTED_CEK), bytes(&self.encrypted_cek)));
        encode_canonical(&Value::Map(entries))
    }

    /// Decode from canonical bytes, rejecting anything malformed.
    pub fn from_canonical_bytes(data: &[u8]) -> Result<Self> {
        let map = parse_value(data)?;
        check_header(&map, RecordKind::Rekey)?;

        let feed_id = array32(
            expect_bytes(&map, keys::REKEY_FEED_ID, "invalid feed_id")?,
            "invalid feed_id",
        )?;
        let new_epoch = u32::try_from(expect_uint(&map, keys::NEW_EPOCH, "invalid new_epoch")?)
            .map_err(|_| malformed("invalid new_epoch"))?;
        let packets = match get(&map, keys::PACKETS) {
            Some(Value::Array(items)) => items
                .iter()
                .map(packet_from_value)
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(malformed("invalid packets")),
        };
        let cek_nonce = array24(
            expect_bytes(&map, keys::CEK_NONCE, "invalid cek_nonce")?,
            "invalid cek_nonce",
        )?;
        let encrypted_cek =
            expect_bytes(&map, keys::ENCRYPTED_CEK, "invalid encrypted_cek")?.to_vec();

        Ok(Self {
            feed_id: FeedId::from_bytes(feed_id),
            new_epoch: Epoch::new(new_epoch),
            packets,
            cek_nonce: Nonce24::from_bytes(cek_nonce),
            encrypted_cek,
        })
    }
}

impl EncryptedPostRecord {
    /// Encode to canonical bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut entries = header_entries(RecordKind::Post);
        entries.push((uint(keys::AUTHOR), bytes(self.author.as_bytes())));
        entries.push((uint(keys::EPOCH), uint(self.epoch.get() as u64)));
        entries.push((uint(keys::NONCE), bytes(self.nonce.as_bytes())));
        entries.push((uint(keys::CIPHERTEXT), bytes(&self.ciphertext)));
        let teaser = match &self.teaser {
            Some(t) => Value::Text(t.clone()),
            None => Value::Null,
        };
        entries.push((uint(keys::TEASER), teaser));
        encode_canonical(&Value::Map(entries))
    }

    /// Decode from canonical bytes, rejecting anything malformed.
    pub fn from_canonical_bytes(data: &[u8]) -> Result<Self> {
        let map = parse_value(data)?;
        check_header(&map, RecordKind::Post)?;

        let author = array32(
            expect_bytes(&map, keys::AUTHOR, "invalid author")?,
            "invalid author",
        )?;
        let epoch = u32::try_from(expect_uint(&map, keys::EPOCH, "invalid epoch")?)
            .map_err(|_| malformed("invalid epoch"))?;
        let nonce = array24(
            expect_bytes(&map, keys::NONCE, "invalid nonce")?,
            "invalid nonce",
        )?;
        let ciphertext = expect_bytes(&map, keys::CIPHERTEXT, "invalid ciphertext")?.to_vec();
        let teaser = match get(&map, keys::TEASER) {
            Some(Value::Text(t)) => Some(t.clone()),
            Some(Value::Null) | None => None,
            _ => return Err(malformed("invalid teaser")),
        };

        Ok(Self {
            author: OwnerId::from_bytes(author),
            epoch: Epoch::new(epoch),
            nonce: Nonce24::from_bytes(nonce),
            ciphertext: Bytes::from(ciphertext),
            teaser,
        })
    }
}

/// Compute the record id of any canonical encoding.
pub fn record_id(canonical: &[u8]) -> RecordId {
    RecordId::of(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hybrid() -> HybridCiphertext {
        HybridCiphertext {
            ephemeral_public: X25519PublicKey::from_bytes([9; 32]),
            nonce: Nonce24::from_bytes([7; 24]),
            ciphertext: vec![1, 2, 3, 4],
        }
    }

    fn sample_packet() -> RekeyPacket {
        RekeyPacket {
            target: NodeId::new(9, 1),
            target_version: 2,
            wrap: NodeId::new(10, 3),
            wrap_version: 0,
            wrap_is_new: false,
            nonce: Nonce24::from_bytes([5; 24]),
            ciphertext: vec![0xaa; 48],
        }
    }

    #[test]
    fn test_feed_state_roundtrip() {
        let record = FeedStateRecord {
            owner: OwnerId::from_bytes([1; 32]),
            feed_id: FeedId::from_bytes([2; 32]),
            tree_capacity: 1024,
            max_epoch: 2000,
            encrypted_seed: sample_hybrid(),
        };

        let bytes = record.canonical_bytes();
        let recovered = FeedStateRecord::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(record, recovered);
    }

    #[test]
    fn test_grant_roundtrip() {
        let record = GrantRecord {
            feed_id: FeedId::from_bytes([2; 32]),
            follower: FollowerId::from_bytes([3; 32]),
            leaf_index: LeafIndex::new(17),
            bundle: sample_hybrid(),
        };

        let bytes = record.canonical_bytes();
        let recovered = GrantRecord::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(record, recovered);
    }

    #[test]
    fn test_rekey_roundtrip() {
        let record = RekeyEventRecord {
            feed_id: FeedId::from_bytes([2; 32]),
            new_epoch: Epoch::new(5),
            packets: vec![sample_packet(), sample_packet()],
            cek_nonce: Nonce24::from_bytes([6; 24]),
            encrypted_cek: vec![0xbb; 48],
        };

        let bytes = record.canonical_bytes();
        let recovered = RekeyEventRecord::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(record, recovered);
    }

    #[test]
    fn test_post_roundtrip_with_and_without_teaser() {
        let mut record = EncryptedPostRecord {
            author: OwnerId::from_bytes([1; 32]),
            epoch: Epoch::FIRST,
            nonce: Nonce24::from_bytes([4; 24]),
            ciphertext: Bytes::from_static(&[0xcc; 32]),
            teaser: Some("a public preview".to_string()),
        };

        let recovered =
            EncryptedPostRecord::from_canonical_bytes(&record.canonical_bytes()).unwrap();
        assert_eq!(record, recovered);

        record.teaser = None;
        let recovered =
            EncryptedPostRecord::from_canonical_bytes(&record.canonical_bytes()).unwrap();
        assert_eq!(record, recovered);
    }

    #[test]
    fn test_encoding_deterministic() {
        let record = GrantRecord {
            feed_id: FeedId::from_bytes([2; 32]),
            follower: FollowerId::from_bytes([3; 32]),
            leaf_index: LeafIndex::new(0),
            bundle: sample_hybrid(),
        };
        assert_eq!(record.canonical_bytes(), record.canonical_bytes());
        assert_eq!(record.record_id(), record.record_id());
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let record = GrantRecord {
            feed_id: FeedId::from_bytes([2; 32]),
            follower: FollowerId::from_bytes([3; 32]),
            leaf_index: LeafIndex::new(0),
            bundle: sample_hybrid(),
        };
        let bytes = record.canonical_bytes();

        // A grant is not a rekey event.
        let err = RekeyEventRecord::from_canonical_bytes(&bytes).unwrap_err();
        assert!(matches!(err, CoreError::MalformedRecord(_)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(FeedStateRecord::from_canonical_bytes(b"\xff\xff\xff").is_err());
        assert!(GrantRecord::from_canonical_bytes(&[]).is_err());
    }

    #[test]
    fn test_uint_smallest_encoding() {
        let mut buf = Vec::new();
        write_uint(&mut buf, 0, 0);
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        write_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        write_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        write_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);
    }

    #[test]
    fn test_map_keys_sorted() {
        let mut buf = Vec::new();
        let entries = vec![
            (uint(6), uint(60)),
            (uint(0), uint(0)),
            (uint(3), uint(30)),
        ];
        write_map(&mut buf, &entries);

        assert_eq!(buf[0], 0xa3); // map(3)
        assert_eq!(buf[1], 0x00); // key 0 first
        assert_eq!(buf[3], 0x03); // then key 3
    }
}
