//! Reassembly of fragmented data frames.
//!
//! Large events are split by the server into `sum` frames sharing one
//! `message_id`, each tagged with its `seq` index.  Fragments are stored by
//! index, so arrival order does not matter, and the logical message is
//! released exactly once, when the last missing index arrives.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use lk_protocol::headers;
use lk_protocol::Frame;

/// How many completed message ids are remembered to swallow late
/// duplicates.
const COMPLETED_CAPACITY: usize = 1024;

/// One inbound piece of a logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub message_id: String,
    pub sum: usize,
    pub seq: usize,
    pub trace_id: String,
    pub payload: Vec<u8>,
}

impl Fragment {
    /// Extract the fragment fields from a data frame.  `None` when the frame
    /// carries no `message_id`.  Missing or unparsable `sum`/`seq` headers
    /// describe a single-fragment message.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let message_id = frame.header(headers::MESSAGE_ID)?.to_string();
        let sum = frame
            .header(headers::SUM)
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        let seq = frame
            .header(headers::SEQ)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Some(Self {
            message_id,
            sum,
            seq,
            trace_id: frame.header(headers::TRACE_ID).unwrap_or_default().to_string(),
            payload: frame.payload().to_vec(),
        })
    }
}

/// A fully reassembled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalMessage {
    pub message_id: String,
    pub trace_id: String,
    pub sum: usize,
    pub payload: Vec<u8>,
}

struct Pending {
    sum: usize,
    trace_id: String,
    parts: BTreeMap<usize, Vec<u8>>,
    created: Instant,
}

pub struct ReassemblyCache {
    pending: HashMap<String, Pending>,
    completed: VecDeque<String>,
    completed_ids: HashSet<String>,
    expiry: Duration,
}

impl ReassemblyCache {
    pub fn new(expiry: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            completed: VecDeque::new(),
            completed_ids: HashSet::new(),
            expiry,
        }
    }

    /// Store `fragment`; returns the assembled message once every index in
    /// `0..sum` has been seen.
    ///
    /// Duplicates, both of a still-pending index and of an already
    /// completed message, are ignored.
    pub fn merge(&mut self, fragment: Fragment) -> Option<LogicalMessage> {
        self.sweep_expired();

        let Fragment {
            message_id,
            sum,
            seq,
            trace_id,
            payload,
        } = fragment;

        if self.completed_ids.contains(&message_id) {
            tracing::debug!(message_id = %message_id, seq, "duplicate fragment for completed message");
            return None;
        }

        let sum = sum.max(1);
        if seq >= sum {
            tracing::warn!(message_id = %message_id, seq, sum, "fragment index out of range, dropping");
            return None;
        }

        let entry = self
            .pending
            .entry(message_id.clone())
            .or_insert_with(|| Pending {
                sum,
                trace_id,
                parts: BTreeMap::new(),
                created: Instant::now(),
            });

        if entry.sum != sum {
            tracing::warn!(
                message_id = %message_id,
                expected = entry.sum,
                got = sum,
                "fragment count mismatch, keeping the first declared count"
            );
            if seq >= entry.sum {
                return None;
            }
        }

        entry.parts.entry(seq).or_insert(payload);
        if entry.parts.len() < entry.sum {
            return None;
        }

        let done = self.pending.remove(&message_id)?;
        self.remember_completed(message_id.clone());

        let payload = done.parts.into_values().flatten().collect();
        Some(LogicalMessage {
            message_id,
            trace_id: done.trace_id,
            sum: done.sum,
            payload,
        })
    }

    /// Drop every pending message and forget completed ids.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.completed.clear();
        self.completed_ids.clear();
    }

    /// Number of messages still waiting for fragments.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn sweep_expired(&mut self) {
        let expiry = self.expiry;
        self.pending.retain(|id, p| {
            let keep = p.created.elapsed() < expiry;
            if !keep {
                tracing::debug!(
                    message_id = %id,
                    received = p.parts.len(),
                    sum = p.sum,
                    "discarding expired partial message"
                );
            }
            keep
        });
    }

    fn remember_completed(&mut self, message_id: String) {
        if self.completed.len() >= COMPLETED_CAPACITY {
            if let Some(old) = self.completed.pop_front() {
                self.completed_ids.remove(&old);
            }
        }
        self.completed_ids.insert(message_id.clone());
        self.completed.push_back(message_id);
    }
}

impl Default for ReassemblyCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(id: &str, sum: usize, seq: usize, payload: &[u8]) -> Fragment {
        Fragment {
            message_id: id.into(),
            sum,
            seq,
            trace_id: "trace".into(),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn single_fragment_completes_immediately() {
        let mut cache = ReassemblyCache::default();
        let msg = cache.merge(frag("m", 1, 0, b"whole")).unwrap();
        assert_eq!(msg.payload, b"whole");
        assert_eq!(msg.trace_id, "trace");
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn out_of_order_fragments_concatenate_by_index() {
        let mut cache = ReassemblyCache::default();
        assert!(cache.merge(frag("m", 3, 2, b"C")).is_none());
        assert!(cache.merge(frag("m", 3, 0, b"A")).is_none());
        let msg = cache.merge(frag("m", 3, 1, b"B")).unwrap();
        assert_eq!(msg.payload, b"ABC");
        assert_eq!(msg.sum, 3);
    }

    #[test]
    fn duplicates_never_complete_a_short_message() {
        let mut cache = ReassemblyCache::default();
        for _ in 0..5 {
            assert!(cache.merge(frag("m", 3, 0, b"A")).is_none());
            assert!(cache.merge(frag("m", 3, 1, b"B")).is_none());
        }
        assert_eq!(cache.pending_len(), 1);
        assert!(cache.merge(frag("m", 3, 2, b"C")).is_some());
    }

    #[test]
    fn duplicate_after_completion_is_ignored() {
        let mut cache = ReassemblyCache::default();
        assert!(cache.merge(frag("m", 2, 0, b"A")).is_none());
        assert!(cache.merge(frag("m", 2, 0, b"A")).is_none());
        assert!(cache.merge(frag("m", 2, 1, b"B")).is_some());

        assert!(cache.merge(frag("m", 2, 1, b"B")).is_none());
        assert!(cache.merge(frag("m", 2, 0, b"A")).is_none());
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn clear_forces_fresh_assembly() {
        let mut cache = ReassemblyCache::default();
        assert!(cache.merge(frag("m", 2, 0, b"A")).is_none());
        cache.clear();

        assert!(cache.merge(frag("m", 2, 1, b"B")).is_none());
        assert_eq!(cache.pending_len(), 1);
    }

    #[test]
    fn out_of_range_index_is_dropped() {
        let mut cache = ReassemblyCache::default();
        assert!(cache.merge(frag("m", 2, 2, b"X")).is_none());
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn zero_sum_is_treated_as_one() {
        let mut cache = ReassemblyCache::default();
        assert!(cache.merge(frag("m", 0, 0, b"A")).is_some());
    }

    #[test]
    fn expired_partials_are_swept() {
        let mut cache = ReassemblyCache::new(Duration::ZERO);
        assert!(cache.merge(frag("m", 2, 0, b"A")).is_none());
        // The first half expired, so this starts a new assembly.
        assert!(cache.merge(frag("m", 2, 1, b"B")).is_none());
        assert_eq!(cache.pending_len(), 1);
    }

    #[test]
    fn fragment_from_frame_reads_headers() {
        let frame = Frame::default()
            .with_header(headers::MESSAGE_ID, "m1")
            .with_header(headers::SUM, "3")
            .with_header(headers::SEQ, "2")
            .with_header(headers::TRACE_ID, "t1")
            .with_payload(b"xyz".to_vec());
        let f = Fragment::from_frame(&frame).unwrap();
        assert_eq!(f, frag_with_trace("m1", 3, 2, "t1", b"xyz"));

        assert!(Fragment::from_frame(&Frame::default()).is_none());
    }

    fn frag_with_trace(id: &str, sum: usize, seq: usize, trace: &str, payload: &[u8]) -> Fragment {
        Fragment {
            trace_id: trace.into(),
            ..frag(id, sum, seq, payload)
        }
    }
}
