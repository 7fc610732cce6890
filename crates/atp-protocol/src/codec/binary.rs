//! Canonical binary encoding: a fixed header (magic, format version, CRC32,
//! payload length) wrapping a `bincode`-serialized [`Frame`], modeled on the
//! integrity-checked checkpoint envelope DashFlow uses for durable state
//! (`dashflow::checkpoint::CheckpointWithIntegrity`).
//!
//! Layout (little-endian):
//! ```text
//! [0..4)   magic    b"ATPF"
//! [4..8)   version  u32  format version, independent of Frame.v
//! [8..12)  crc32    u32  CRC32C(IEEE) of the payload bytes
//! [12..20) length   u64  length of the payload in bytes
//! [20..)   payload  bincode-serialized Frame
//! ```

use crate::errors::{Error, Result};
use crate::frame::Frame;

const MAGIC: &[u8; 4] = b"ATPF";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 20;

pub fn encode(frame: &Frame, max_frame_bytes: usize) -> Result<Vec<u8>> {
    let payload = bincode::serialize(frame).map_err(Error::Binary)?;
    let total = HEADER_LEN + payload.len();
    if total > max_frame_bytes {
        return Err(Error::FrameTooBig { size: total, max: max_frame_bytes });
    }

    let crc = crc32fast::hash(&payload);
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<Frame> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Parse(format!(
            "frame shorter than header: {} bytes",
            bytes.len()
        )));
    }

    let magic: [u8; 4] = bytes[0..4].try_into().expect("slice is 4 bytes");
    if &magic != MAGIC {
        return Err(Error::Parse(format!("bad magic: {magic:?}")));
    }

    let version = u32::from_le_bytes(bytes[4..8].try_into().expect("slice is 4 bytes"));
    if version != FORMAT_VERSION {
        return Err(Error::Version { found: version, supported: FORMAT_VERSION });
    }

    let expected_crc = u32::from_le_bytes(bytes[8..12].try_into().expect("slice is 4 bytes"));
    let length = u64::from_le_bytes(bytes[12..20].try_into().expect("slice is 8 bytes")) as usize;

    let payload = bytes.get(HEADER_LEN..HEADER_LEN + length).ok_or_else(|| {
        Error::Parse(format!(
            "declared payload length {length} exceeds available {} bytes",
            bytes.len().saturating_sub(HEADER_LEN)
        ))
    })?;

    let computed_crc = crc32fast::hash(payload);
    if computed_crc != expected_crc {
        return Err(Error::Checksum { expected: expected_crc, computed: computed_crc });
    }

    bincode::deserialize(payload).map_err(Error::Binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::*;
    use std::collections::BTreeSet;

    fn sample() -> Frame {
        Frame {
            v: 1,
            frame_type: FrameType::Data,
            session_id: "sess-1".into(),
            stream_id: "stream-1".into(),
            msg_seq: 42,
            frag_seq: 1,
            flags: {
                let mut f = BTreeSet::new();
                f.insert(FrameFlag::More);
                f
            },
            qos: QosTier::Silver,
            ttl: 8,
            window: None,
            meta: FrameMeta::default(),
            payload: Payload::Data {
                content: serde_json::json!({"tokens": [1, 2, 3]}),
                tokens_in: Some(10),
                tokens_out: Some(5),
                cost_delta_micros: Some(120),
            },
            sig: None,
            nonce: Some("n-1".into()),
            checksum: None,
        }
    }

    #[test]
    fn round_trips_through_binary() {
        let frame = sample();
        let bytes = encode(&frame, 1 << 20).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn oversized_frame_is_rejected_at_encode() {
        let frame = sample();
        let err = encode(&frame, 10).unwrap_err();
        assert!(matches!(err, Error::FrameTooBig { .. }));
    }

    #[test]
    fn bit_flip_in_payload_fails_checksum() {
        let frame = sample();
        let mut bytes = encode(&frame, 1 << 20).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::Checksum { .. }));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let frame = sample();
        let bytes = encode(&frame, 1 << 20).unwrap();
        let err = decode(&bytes[..HEADER_LEN - 1]).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let frame = sample();
        let mut bytes = encode(&frame, 1 << 20).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::Version { .. }));
    }
}
