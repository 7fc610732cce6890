//! Per-(session, stream) fragment reassembly (spec §3 `ReassemblyBuffer`).
//!
//! Buffers fragments of one logical message (same `msg_seq`, increasing
//! `frag_seq`) until the terminal non-MORE frame arrives, bounded by
//! `max_fragments`/`max_bytes`, with a gap timer that promotes a stalled
//! message to `ESEQ_RETRY`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use atp_protocol::Frame;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct ReassemblyLimits {
    pub max_fragments: usize,
    pub max_bytes: usize,
    pub gap_timer: Duration,
}

impl Default for ReassemblyLimits {
    fn default() -> Self {
        Self {
            max_fragments: 1024,
            max_bytes: 16 << 20,
            gap_timer: Duration::from_millis(200),
        }
    }
}

/// Reassembly state for a single stream. One instance per (session, stream).
///
/// Fragments are kept keyed by `frag_seq` rather than in arrival order so
/// that out-of-order fragments within the gap-timer window are healed
/// instead of completing the message with the wrong fragment set: the
/// message is only `Complete` once every `frag_seq` in `0..=terminal` has
/// actually been received (spec §3 "all prior fragments are received").
pub struct ReassemblyBuffer {
    stream_id: String,
    limits: ReassemblyLimits,
    msg_seq: Option<u64>,
    fragments: BTreeMap<u64, Frame>,
    terminal_frag_seq: Option<u64>,
    bytes_buffered: usize,
    last_fragment_at: Option<Instant>,
    duplicate_fragments: u64,
}

pub enum ReassemblyOutcome {
    /// More fragments are still expected.
    Pending,
    /// The terminal fragment arrived; the full message is ready.
    Complete(Vec<Frame>),
}

impl ReassemblyBuffer {
    pub fn new(stream_id: impl Into<String>, limits: ReassemblyLimits) -> Self {
        Self {
            stream_id: stream_id.into(),
            limits,
            msg_seq: None,
            fragments: BTreeMap::new(),
            terminal_frag_seq: None,
            bytes_buffered: 0,
            last_fragment_at: None,
            duplicate_fragments: 0,
        }
    }

    /// Feed one fragment. `approx_bytes` is the caller's estimate of the
    /// frame's wire size (used for `max_bytes` accounting without forcing a
    /// re-encode here). Duplicate `frag_seq` values are discarded (spec §8
    /// "duplicates are discarded").
    pub fn push(&mut self, frame: Frame, approx_bytes: usize) -> Result<ReassemblyOutcome> {
        if self.msg_seq.is_none() {
            self.msg_seq = Some(frame.msg_seq);
        } else if self.msg_seq != Some(frame.msg_seq) {
            // A new msg_seq while one is in flight means the previous message
            // never terminated; the caller is expected to have checked the
            // gap timer already, but defend here too.
            return Err(Error::GapTimerExpired {
                stream_id: self.stream_id.clone(),
                msg_seq: self.msg_seq.unwrap_or(frame.msg_seq),
            });
        }

        if self.fragments.contains_key(&frame.frag_seq) {
            self.duplicate_fragments += 1;
            return Ok(ReassemblyOutcome::Pending);
        }

        self.bytes_buffered += approx_bytes;
        if self.bytes_buffered > self.limits.max_bytes {
            return Err(Error::ReassemblyOverflow {
                stream_id: self.stream_id.clone(),
                what: "max_bytes",
                limit: self.limits.max_bytes,
            });
        }

        if frame.is_terminal() {
            self.terminal_frag_seq = Some(frame.frag_seq);
        }
        self.fragments.insert(frame.frag_seq, frame);
        self.last_fragment_at = Some(Instant::now());

        if self.fragments.len() > self.limits.max_fragments {
            return Err(Error::ReassemblyOverflow {
                stream_id: self.stream_id.clone(),
                what: "max_fragments",
                limit: self.limits.max_fragments,
            });
        }

        let Some(terminal) = self.terminal_frag_seq else {
            return Ok(ReassemblyOutcome::Pending);
        };

        if !(0..=terminal).all(|seq| self.fragments.contains_key(&seq)) {
            // Terminal fragment arrived but earlier ones are still missing;
            // heal via the gap timer (`is_gap_expired`) rather than
            // completing with a partial fragment set.
            return Ok(ReassemblyOutcome::Pending);
        }

        let fragments = (0..=terminal)
            .map(|seq| self.fragments.remove(&seq).expect("checked contiguous above"))
            .collect();
        self.msg_seq = None;
        self.terminal_frag_seq = None;
        self.bytes_buffered = 0;
        self.last_fragment_at = None;
        Ok(ReassemblyOutcome::Complete(fragments))
    }

    /// Whether the gap timer has expired for a message still awaiting its
    /// terminal fragment. Callers poll this on a timer tick.
    pub fn is_gap_expired(&self, now: Instant) -> bool {
        match self.last_fragment_at {
            Some(t) => now.duration_since(t) > self.limits.gap_timer,
            None => false,
        }
    }

    /// Count of fragments discarded because their `frag_seq` was already
    /// received for the in-progress message.
    pub fn duplicate_fragments(&self) -> u64 {
        self.duplicate_fragments
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
        self.msg_seq = None;
        self.terminal_frag_seq = None;
        self.bytes_buffered = 0;
        self.last_fragment_at = None;
    }
}
