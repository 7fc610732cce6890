//! Frame signing and verification (Ed25519), following the same
//! keyring/signature shape DashFlow's package registry uses for package
//! trust (`dashflow-registry::signature`), applied here to per-session keys
//! instead of package manifests.
//!
//! Resolves the spec §9 Open Question on canonical signing order: the
//! signed/checksummed bytes are the canonical binary encoding (see
//! [`crate::codec::binary`]) of every frame field *except* `sig` and
//! `checksum` themselves, in the struct declaration order of [`crate::Frame`].
//! This order is fixed for the lifetime of the wire protocol; changing field
//! order is a major-version bump.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::frame::Frame;

/// A session's signing key pair (client or server side).
pub struct SessionKeyPair {
    signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl SessionKeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let verifying_key = signing_key.verifying_key();
        Self { signing_key, verifying_key }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&bytes);
        let verifying_key = signing_key.verifying_key();
        Self { signing_key, verifying_key }
    }

    /// Sign the canonical signable bytes of `frame` and return a base64
    /// signature suitable for `Frame::sig`.
    pub fn sign_frame(&self, frame: &Frame) -> Result<String> {
        let signable = signable_bytes(frame)?;
        let sig = self.signing_key.sign(&signable);
        Ok(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            sig.to_bytes(),
        ))
    }
}

/// Verify `frame.sig` against `verifying_key`. Returns `Error::Signature` on
/// any mismatch, missing signature, or malformed base64/signature bytes.
pub fn verify_frame(frame: &Frame, verifying_key: &VerifyingKey) -> Result<()> {
    let sig_b64 = frame.sig.as_deref().ok_or(Error::Signature)?;
    let sig_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, sig_b64)
        .map_err(|_| Error::Signature)?;
    let sig_array: [u8; 64] = sig_bytes.try_into().map_err(|_| Error::Signature)?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_array);
    let signable = signable_bytes(frame)?;
    verifying_key
        .verify(&signable, &signature)
        .map_err(|_| Error::Signature)
}

/// The struct over which signatures (and, before that, the non-cryptographic
/// checksum) are computed: every `Frame` field except `sig` and `checksum`.
#[derive(Serialize, Deserialize)]
struct Signable<'a> {
    v: u32,
    frame_type: &'a crate::frame::FrameType,
    session_id: &'a str,
    stream_id: &'a str,
    msg_seq: u64,
    frag_seq: u64,
    flags: &'a std::collections::BTreeSet<crate::frame::FrameFlag>,
    qos: &'a crate::frame::QosTier,
    ttl: u32,
    window: &'a Option<crate::frame::Window>,
    meta: &'a crate::frame::FrameMeta,
    payload: &'a crate::frame::Payload,
    nonce: &'a Option<String>,
}

pub(crate) fn signable_bytes(frame: &Frame) -> Result<Vec<u8>> {
    let signable = Signable {
        v: frame.v,
        frame_type: &frame.frame_type,
        session_id: &frame.session_id,
        stream_id: &frame.stream_id,
        msg_seq: frame.msg_seq,
        frag_seq: frame.frag_seq,
        flags: &frame.flags,
        qos: &frame.qos,
        ttl: frame.ttl,
        window: &frame.window,
        meta: &frame.meta,
        payload: &frame.payload,
        nonce: &frame.nonce,
    };
    bincode::serialize(&signable).map_err(Error::Binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::*;

    fn sample() -> Frame {
        Frame {
            v: 1,
            frame_type: FrameType::Data,
            session_id: "s1".into(),
            stream_id: "st1".into(),
            msg_seq: 3,
            frag_seq: 0,
            flags: Default::default(),
            qos: QosTier::Silver,
            ttl: 8,
            window: None,
            meta: FrameMeta::default(),
            payload: Payload::Data {
                content: serde_json::json!({"text": "hi"}),
                tokens_in: None,
                tokens_out: None,
                cost_delta_micros: None,
            },
            sig: None,
            nonce: Some("nonce-1".into()),
            checksum: None,
        }
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = SessionKeyPair::generate();
        let mut frame = sample();
        frame.sig = Some(kp.sign_frame(&frame).unwrap());
        verify_frame(&frame, &kp.verifying_key).unwrap();
    }

    #[test]
    fn tampered_frame_fails_verification() {
        let kp = SessionKeyPair::generate();
        let mut frame = sample();
        frame.sig = Some(kp.sign_frame(&frame).unwrap());
        frame.msg_seq = 99;
        assert!(verify_frame(&frame, &kp.verifying_key).is_err());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp = SessionKeyPair::generate();
        let other = SessionKeyPair::generate();
        let mut frame = sample();
        frame.sig = Some(kp.sign_frame(&frame).unwrap());
        assert!(verify_frame(&frame, &other.verifying_key).is_err());
    }
}
