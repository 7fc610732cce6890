//! Text encoding: UTF-8 JSON, used for debugging and for handshake
//! negotiation before a session has committed to a wire encoding (spec
//! §4.1).

use crate::errors::{Error, Result};
use crate::frame::Frame;

pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    serde_json::to_vec(frame).map_err(Error::Json)
}

pub fn decode(bytes: &[u8]) -> Result<Frame> {
    serde_json::from_slice(bytes).map_err(Error::Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::*;
    use std::collections::BTreeSet;

    fn sample() -> Frame {
        Frame {
            v: 1,
            frame_type: FrameType::Ack,
            session_id: "sess-1".into(),
            stream_id: "stream-1".into(),
            msg_seq: 7,
            frag_seq: 0,
            flags: BTreeSet::new(),
            qos: QosTier::Gold,
            ttl: 8,
            window: Some(Window::new(4, 8192, 10_000)),
            meta: FrameMeta::default(),
            payload: Payload::Ack { highest_contiguous_msg_seq: 6 },
            sig: None,
            nonce: None,
            checksum: None,
        }
    }

    #[test]
    fn round_trips_through_json() {
        let frame = sample();
        let bytes = encode(&frame).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode(b"not json").is_err());
    }
}
