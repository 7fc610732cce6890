//! Dual wire encoding (spec §4.1): text JSON for debugging/negotiation, and
//! a canonical binary form for steady-state traffic. The encoding is
//! negotiated once per session at handshake and fixed for the session's
//! lifetime.

pub mod binary;
pub mod json;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::frame::Frame;

/// The wire encoding a session negotiated at handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireEncoding {
    Json,
    Binary,
}

impl WireEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            WireEncoding::Json => "json",
            WireEncoding::Binary => "binary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(WireEncoding::Json),
            "binary" => Some(WireEncoding::Binary),
            _ => None,
        }
    }
}

/// Encode `frame` per `encoding`, enforcing `max_frame_bytes` for both forms.
pub fn encode(frame: &Frame, encoding: WireEncoding, max_frame_bytes: usize) -> Result<Vec<u8>> {
    match encoding {
        WireEncoding::Json => {
            let bytes = json::encode(frame)?;
            if bytes.len() > max_frame_bytes {
                return Err(Error::FrameTooBig { size: bytes.len(), max: max_frame_bytes });
            }
            Ok(bytes)
        }
        WireEncoding::Binary => binary::encode(frame, max_frame_bytes),
    }
}

pub fn decode(bytes: &[u8], encoding: WireEncoding) -> Result<Frame> {
    match encoding {
        WireEncoding::Json => json::decode(bytes),
        WireEncoding::Binary => binary::decode(bytes),
    }
}
