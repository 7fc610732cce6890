//! Handshake negotiation (spec §4.2): client and server exchange
//! offered/accepted {encoding, features, max_frame_bytes, heartbeat_interval,
//! anti_replay_window}. Failure modes are `EHANDSHAKE` (folded into
//! [`atp_protocol::AtpErrorCode::EAuth`] in this taxonomy's collapse — see
//! [`crate::errors`]) for "no common feature set", and `EAUTH` for identity
//! rejection by the external Auth port.

use std::collections::HashSet;

use atp_protocol::codec::WireEncoding;

use crate::errors::{Error, Result};

#[derive(Debug, Clone)]
pub struct HandshakeOffer {
    pub offered_encodings: Vec<WireEncoding>,
    pub offered_features: HashSet<String>,
    pub max_frame_bytes: u32,
    pub heartbeat_interval_ms: u64,
    pub anti_replay_window_ms: u64,
}

#[derive(Debug, Clone)]
pub struct HandshakeAccept {
    pub accepted_encoding: WireEncoding,
    pub accepted_features: HashSet<String>,
    pub max_frame_bytes: u32,
    pub heartbeat_interval_ms: u64,
    pub anti_replay_window_ms: u64,
}

/// Negotiate an encoding and feature set for the session the server side of,
/// given the client's offer and the server's own supported set. `max_frame_bytes`
/// and the timers are taken as `min(offer, server default)`.
pub fn negotiate(
    offer: &HandshakeOffer,
    server_encodings: &[WireEncoding],
    server_features: &HashSet<String>,
    server_max_frame_bytes: u32,
) -> Result<HandshakeAccept> {
    let accepted_encoding = offer
        .offered_encodings
        .iter()
        .find(|e| server_encodings.contains(e))
        .copied()
        .ok_or(Error::HandshakeNoCommonFeature("encoding"))?;

    let accepted_features: HashSet<String> =
        offer.offered_features.intersection(server_features).cloned().collect();

    Ok(HandshakeAccept {
        accepted_encoding,
        accepted_features,
        max_frame_bytes: offer.max_frame_bytes.min(server_max_frame_bytes),
        heartbeat_interval_ms: offer.heartbeat_interval_ms,
        anti_replay_window_ms: offer.anti_replay_window_ms,
    })
}
