//! The per-session state machine (spec §3 "Session", §4.2 Session Manager).
//!
//! A `Session` owns everything scoped to one client connection: sequence
//! counters, reassembly buffers, heartbeat state, the negotiated triplet
//! window, and QoS tier. It does not know about routing, scheduling, or
//! adapters — those are separate crates that consume `Session` state through
//! narrow queries (`window()`, `qos()`, `tenant_id()`).

use std::collections::HashMap;
use std::time::Instant;

use atp_protocol::codec::WireEncoding;
use atp_protocol::{Frame, QosTier, Window};

use crate::ack::{AckPolicy, AckTracker};
use crate::errors::{Error, Result};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatPolicy};
use crate::reassembly::{ReassemblyBuffer, ReassemblyLimits, ReassemblyOutcome};
use crate::replay::{ReplayGuard, ReplayPolicy};
use crate::sequence::SequenceTracker;

/// Session lifecycle states (spec §3: "Created by handshake; destroyed on
/// FIN, idle timeout, fatal error, or shutdown drain").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Open,
    Draining,
    Closed,
}

pub struct SessionConfig {
    pub ack_policy: AckPolicy,
    pub heartbeat_policy: HeartbeatPolicy,
    pub replay_policy: ReplayPolicy,
    pub reassembly_limits: ReassemblyLimits,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ack_policy: AckPolicy::default(),
            heartbeat_policy: HeartbeatPolicy::default(),
            replay_policy: ReplayPolicy::default(),
            reassembly_limits: ReassemblyLimits::default(),
        }
    }
}

pub struct Session {
    session_id: String,
    tenant_id: String,
    qos: QosTier,
    state: SessionState,
    encoding: Option<WireEncoding>,
    window: Window,
    sequences: SequenceTracker,
    acks: AckTracker,
    heartbeats: HeartbeatMonitor,
    replay: ReplayGuard,
    streams: HashMap<String, ReassemblyBuffer>,
    reassembly_limits: ReassemblyLimits,
}

impl Session {
    pub fn new(session_id: impl Into<String>, tenant_id: impl Into<String>, qos: QosTier, window: Window) -> Self {
        Self::with_config(session_id, tenant_id, qos, window, SessionConfig::default())
    }

    pub fn with_config(
        session_id: impl Into<String>,
        tenant_id: impl Into<String>,
        qos: QosTier,
        window: Window,
        config: SessionConfig,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            tenant_id: tenant_id.into(),
            qos,
            state: SessionState::Handshaking,
            encoding: None,
            window,
            sequences: SequenceTracker::new(),
            acks: AckTracker::new(config.ack_policy),
            heartbeats: HeartbeatMonitor::new(config.heartbeat_policy),
            replay: ReplayGuard::new(config.replay_policy),
            streams: HashMap::new(),
            reassembly_limits: config.reassembly_limits,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn qos(&self) -> QosTier {
        self.qos
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn set_window(&mut self, window: Window) {
        self.window = window;
    }

    /// Complete the handshake, transitioning `Handshaking -> Open`.
    pub fn mark_open(&mut self, encoding: WireEncoding) -> Result<()> {
        if self.state != SessionState::Handshaking {
            return Err(Error::InvalidState("mark_open requires Handshaking"));
        }
        self.encoding = Some(encoding);
        self.state = SessionState::Open;
        Ok(())
    }

    /// Begin graceful shutdown, transitioning `Open -> Draining`. Per the
    /// Lifecycle Coordinator's drain sequence, a draining session still
    /// completes in-flight streams but admits no new ones.
    pub fn begin_draining(&mut self) {
        if self.state == SessionState::Open {
            self.state = SessionState::Draining;
        }
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    pub fn encoding(&self) -> Option<WireEncoding> {
        self.encoding
    }

    /// Validate and record an inbound DATA frame: sequence check, replay
    /// check, and reassembly. Returns the fully reassembled fragment set once
    /// the terminal (non-MORE) frame arrives.
    pub fn ingest_data_frame(&mut self, frame: Frame, approx_bytes: usize) -> Result<IngestOutcome> {
        if self.state != SessionState::Open && self.state != SessionState::Draining {
            return Err(Error::InvalidState("ingest_data_frame requires Open or Draining"));
        }

        if let Some(nonce) = frame.nonce.as_deref() {
            if !self.replay.check_and_record(nonce, Instant::now()) {
                return Err(Error::ReplayedNonce(nonce.to_string()));
            }
        }

        self.sequences.validate(&frame.stream_id, frame.msg_seq, frame.frag_seq)?;

        let stream_id = frame.stream_id.clone();
        let limits = self.reassembly_limits;
        let buffer = self
            .streams
            .entry(stream_id.clone())
            .or_insert_with(|| ReassemblyBuffer::new(stream_id.clone(), limits));

        let ack_due = self
            .sequences
            .highest_contiguous(&stream_id)
            .and_then(|seq| self.acks.record_frame(&stream_id, seq));

        match buffer.push(frame, approx_bytes)? {
            ReassemblyOutcome::Pending => Ok(IngestOutcome { message: None, ack_due }),
            ReassemblyOutcome::Complete(fragments) => {
                Ok(IngestOutcome { message: Some(fragments), ack_due })
            }
        }
    }

    pub fn on_heartbeat_received(&mut self) {
        self.heartbeats.on_heartbeat_received();
    }

    /// Drive the heartbeat timer forward; returns `true` if the session must
    /// be terminated with `EIDLE`.
    pub fn heartbeat_tick(&mut self, now: Instant) -> bool {
        self.heartbeats.tick(now)
    }

    pub fn due_acks(&mut self) -> Vec<(String, u64)> {
        self.acks.due_acks()
    }
}

pub struct IngestOutcome {
    /// `Some` when a full message (all fragments, in order) just completed.
    pub message: Option<Vec<Frame>>,
    /// An ACK that became due as a side effect of this frame, if any.
    pub ack_due: Option<u64>,
}
