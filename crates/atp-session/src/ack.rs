//! Cumulative ACK policy (spec §4.2): emit an ACK for a stream when either
//! `ack_batch_size` frames have arrived since the last ACK, or `ack_delay`
//! has elapsed, whichever comes first.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct AckPolicy {
    pub ack_batch_size: u32,
    pub ack_delay: Duration,
}

impl Default for AckPolicy {
    fn default() -> Self {
        Self { ack_batch_size: 32, ack_delay: Duration::from_millis(20) }
    }
}

struct StreamAckState {
    unacked_count: u32,
    last_ack_at: Instant,
    highest_contiguous_msg_seq: u64,
}

/// Tracks, per stream, when the next ACK is due.
pub struct AckTracker {
    policy: AckPolicy,
    streams: HashMap<String, StreamAckState>,
}

impl AckTracker {
    pub fn new(policy: AckPolicy) -> Self {
        Self { policy, streams: HashMap::new() }
    }

    /// Record that a frame advancing `highest_contiguous_msg_seq` arrived for
    /// `stream_id`. Returns `Some(msg_seq)` if an ACK should be emitted now.
    pub fn record_frame(&mut self, stream_id: &str, highest_contiguous_msg_seq: u64) -> Option<u64> {
        let now = Instant::now();
        let state = self.streams.entry(stream_id.to_string()).or_insert_with(|| StreamAckState {
            unacked_count: 0,
            last_ack_at: now,
            highest_contiguous_msg_seq,
        });
        state.unacked_count += 1;
        state.highest_contiguous_msg_seq = highest_contiguous_msg_seq;

        let batch_due = state.unacked_count >= self.policy.ack_batch_size;
        let delay_due = now.duration_since(state.last_ack_at) >= self.policy.ack_delay;

        if batch_due || delay_due {
            state.unacked_count = 0;
            state.last_ack_at = now;
            Some(state.highest_contiguous_msg_seq)
        } else {
            None
        }
    }

    /// Force an ACK check for streams whose delay timer has elapsed even
    /// without new frames arriving, called from a periodic tick.
    pub fn due_acks(&mut self) -> Vec<(String, u64)> {
        let now = Instant::now();
        let mut due = Vec::new();
        for (stream_id, state) in self.streams.iter_mut() {
            if state.unacked_count > 0 && now.duration_since(state.last_ack_at) >= self.policy.ack_delay {
                due.push((stream_id.clone(), state.highest_contiguous_msg_seq));
                state.unacked_count = 0;
                state.last_ack_at = now;
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acks_after_batch_size_reached() {
        let mut tracker = AckTracker::new(AckPolicy { ack_batch_size: 3, ack_delay: Duration::from_secs(60) });
        assert_eq!(tracker.record_frame("s1", 1), None);
        assert_eq!(tracker.record_frame("s1", 2), None);
        assert_eq!(tracker.record_frame("s1", 3), Some(3));
    }

    #[test]
    fn acks_after_delay_elapses() {
        let mut tracker = AckTracker::new(AckPolicy { ack_batch_size: 1000, ack_delay: Duration::from_millis(1) });
        tracker.record_frame("s1", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(tracker.record_frame("s1", 2), Some(2));
    }

    #[test]
    fn streams_ack_independently() {
        let mut tracker = AckTracker::new(AckPolicy { ack_batch_size: 2, ack_delay: Duration::from_secs(60) });
        assert_eq!(tracker.record_frame("a", 1), None);
        assert_eq!(tracker.record_frame("b", 1), None);
        assert_eq!(tracker.record_frame("a", 2), Some(2));
        assert_eq!(tracker.record_frame("b", 2), Some(2));
    }
}
