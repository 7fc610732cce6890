//! Frame types: the typed record exchanged over an ATP session (spec §3, §6).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Control frame types. Names are wire contracts (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameType {
    Handshake,
    HandshakeAck,
    Data,
    Ack,
    Nack,
    WindowUpdate,
    Heartbeat,
    ControlStatus,
    Error,
    Fin,
    Capability,
    Health,
}

/// Flags carried on a frame. Serialized as an array of string names on the
/// wire (spec §6), so the in-memory representation is a small ordered set
/// rather than a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameFlag {
    More,
    Ecn,
    Capability,
    Health,
    Control,
    Heartbeat,
    Error,
    Ack,
    WindowUpdate,
    Fin,
}

/// QoS priority tier (spec §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QosTier {
    Bronze,
    Silver,
    Gold,
}

impl QosTier {
    /// Default DRR weight for this tier (spec §4.6: 8/4/1 gold/silver/bronze).
    pub const fn default_weight(self) -> u32 {
        match self {
            QosTier::Gold => 8,
            QosTier::Silver => 4,
            QosTier::Bronze => 1,
        }
    }
}

/// The triplet window controlling outstanding work for a session (spec
/// Glossary: "Triplet window").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub max_parallel: u32,
    pub max_tokens: u64,
    pub max_usd_micros: u64,
}

impl Window {
    pub const fn new(max_parallel: u32, max_tokens: u64, max_usd_micros: u64) -> Self {
        Self { max_parallel, max_tokens, max_usd_micros }
    }

    /// Component-wise minimum, used to compute the effective window as
    /// `min(router-configured W, agent-suggested W)` (spec §4.7).
    pub fn component_min(&self, other: &Window) -> Window {
        Window {
            max_parallel: self.max_parallel.min(other.max_parallel),
            max_tokens: self.max_tokens.min(other.max_tokens),
            max_usd_micros: self.max_usd_micros.min(other.max_usd_micros),
        }
    }

    /// Relative change vs. `previous`, used by WINDOW_UPDATE emission policy
    /// (spec §4.7: emit when any component changes by more than `min_delta`).
    pub fn relative_delta(&self, previous: &Window) -> f64 {
        let component = |now: f64, before: f64| -> f64 {
            if before == 0.0 {
                if now == 0.0 { 0.0 } else { 1.0 }
            } else {
                ((now - before) / before).abs()
            }
        };
        component(self.max_parallel as f64, previous.max_parallel as f64)
            .max(component(self.max_tokens as f64, previous.max_tokens as f64))
            .max(component(self.max_usd_micros as f64, previous.max_usd_micros as f64))
    }
}

/// Per-frame metadata: task classification, governance, and trace context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_scope: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
}

/// The typed payload union carried by a frame. Only the variants relevant to
/// the core are modeled in full; adapter-specific content rides inside
/// `Data`'s `content` field as an opaque JSON value, per the Adapter port
/// boundary in spec §6 (the core does not interpret model output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Handshake {
        offered_encoding: String,
        offered_features: Vec<String>,
        max_frame_bytes: u32,
        heartbeat_interval_ms: u64,
        anti_replay_window_ms: u64,
    },
    HandshakeAck {
        accepted_encoding: String,
        accepted_features: Vec<String>,
        max_frame_bytes: u32,
        heartbeat_interval_ms: u64,
        anti_replay_window_ms: u64,
    },
    Data {
        content: serde_json::Value,
        tokens_in: Option<u64>,
        tokens_out: Option<u64>,
        cost_delta_micros: Option<u64>,
    },
    Ack {
        highest_contiguous_msg_seq: u64,
    },
    Nack {
        missing_from: u64,
        missing_to: u64,
    },
    WindowUpdate {
        window: Window,
    },
    Heartbeat {
        sent_at_ms: u64,
    },
    ControlStatus {
        status: ControlStatusKind,
    },
    Error {
        code: crate::errors::AtpErrorCode,
        message: String,
        retryable: bool,
        retry_after_ms: Option<u64>,
    },
    Fin {
        code: Option<crate::errors::AtpErrorCode>,
        reason: Option<String>,
    },
    Capability {
        adapter_id: String,
        models: Vec<String>,
        max_tokens: u64,
        supported_languages: Vec<String>,
        feature_bits: Vec<String>,
        cost_per_input_token_micros: f64,
        cost_per_output_token_micros: f64,
        cost_per_request_micros: f64,
    },
    Health {
        adapter_id: String,
        p50_ms: f64,
        p95_ms: f64,
        p99_ms: f64,
        error_rate: f64,
        requests_per_second: f64,
        queue_depth: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlStatusKind {
    Ready,
    Busy,
    Pause,
    Draining,
}

/// The on-wire frame record (spec §3, §6). `checksum` is populated by the
/// codec at encode time and verified at decode time; callers never set it by
/// hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub v: u32,
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub session_id: String,
    pub stream_id: String,
    pub msg_seq: u64,
    pub frag_seq: u64,
    pub flags: BTreeSet<FrameFlag>,
    pub qos: QosTier,
    pub ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<Window>,
    #[serde(default)]
    pub meta: FrameMeta,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Checksum over the canonical encoding of every field above. Not part
    /// of the signed/checksummed content itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<u32>,
}

impl Frame {
    /// True when this frame terminates its message (spec §3 Stream
    /// invariant: "a message terminates when a frame arrives with the MORE
    /// flag unset").
    pub fn is_terminal(&self) -> bool {
        !self.flags.contains(&FrameFlag::More)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_component_min_takes_per_field_minimum() {
        let a = Window::new(4, 8192, 10_000);
        let b = Window::new(2, 16_384, 5_000);
        let m = a.component_min(&b);
        assert_eq!(m, Window::new(2, 8192, 5_000));
    }

    #[test]
    fn window_relative_delta_detects_small_and_large_changes() {
        let before = Window::new(4, 8192, 10_000);
        let after_small = Window::new(4, 8192, 10_500);
        let after_large = Window::new(2, 8192, 10_000);
        assert!(after_small.relative_delta(&before) < 0.10);
        assert!(after_large.relative_delta(&before) >= 0.10);
    }

    #[test]
    fn is_terminal_reflects_more_flag() {
        let mut flags = BTreeSet::new();
        let mut f = sample_frame(flags.clone());
        assert!(f.is_terminal());
        flags.insert(FrameFlag::More);
        f.flags = flags;
        assert!(!f.is_terminal());
    }

    fn sample_frame(flags: BTreeSet<FrameFlag>) -> Frame {
        Frame {
            v: 1,
            frame_type: FrameType::Data,
            session_id: "s1".into(),
            stream_id: "st1".into(),
            msg_seq: 0,
            frag_seq: 0,
            flags,
            qos: QosTier::Gold,
            ttl: 8,
            window: None,
            meta: FrameMeta::default(),
            payload: Payload::Data {
                content: serde_json::json!({"text": "hi"}),
                tokens_in: Some(1),
                tokens_out: None,
                cost_delta_micros: None,
            },
            sig: None,
            nonce: None,
            checksum: None,
        }
    }
}
