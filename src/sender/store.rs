//! The outbound segment store.
//!
//! The byte source is partitioned up front into MSS-sized segments, each
//! assigned a sequence number and a delivery status. The store owns every
//! segment for the lifetime of the connection; the engine flips statuses as
//! segments are sent and acknowledged and looks segments up again for
//! retransmission.

use crate::core::seq::next_seq;

/// Delivery status of one stored segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    /// Not yet transmitted.
    Usable,
    /// Transmitted at least once, not yet cumulatively acknowledged.
    Sent,
    /// Covered by a cumulative ACK.
    Acked,
}

/// One transmittable unit of the byte stream.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Sequence number of the first payload byte.
    pub seq: u32,
    /// Payload bytes; may be empty for an empty source.
    pub payload: Vec<u8>,
    /// Current delivery status.
    pub status: SegmentStatus,
}

/// Ordered collection of every segment of one transfer.
#[derive(Debug)]
pub struct SegmentStore {
    segments: Vec<Segment>,
}

impl SegmentStore {
    /// Partition `source` into segments of at most `max_segment_size` bytes.
    ///
    /// Sequence numbers start at `initial_seq` and advance by each prior
    /// segment's payload length. An empty source still produces exactly one
    /// zero-length segment so the transfer machinery has something to ack.
    pub fn segment_source(source: &[u8], initial_seq: u32, max_segment_size: usize) -> Self {
        let mut segments = Vec::new();
        let mut seq = initial_seq;

        if source.is_empty() {
            segments.push(Segment {
                seq,
                payload: Vec::new(),
                status: SegmentStatus::Usable,
            });
        } else {
            for chunk in source.chunks(max_segment_size) {
                segments.push(Segment {
                    seq,
                    payload: chunk.to_vec(),
                    status: SegmentStatus::Usable,
                });
                seq = next_seq(seq, chunk.len() as u32);
            }
        }

        Self { segments }
    }

    /// Number of segments in the stream.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false`: even an empty source yields one segment.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment at `index`, in stream order.
    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// Sequence number of the segment at `index`.
    pub fn seq_at(&self, index: usize) -> Option<u32> {
        self.segments.get(index).map(|segment| segment.seq)
    }

    /// Sequence number of the final segment; used to detect completion.
    pub fn last_seq(&self) -> u32 {
        self.segments
            .last()
            .map(|segment| segment.seq)
            .unwrap_or_default()
    }

    /// Status of the segment at `index`.
    pub fn status(&self, index: usize) -> Option<SegmentStatus> {
        self.segments.get(index).map(|segment| segment.status)
    }

    /// Set the status of the segment at `index`.
    pub fn set_status(&mut self, index: usize, status: SegmentStatus) {
        if let Some(segment) = self.segments.get_mut(index) {
            segment.status = status;
        }
    }

    /// Segment whose sequence number equals `seq`, if any.
    pub fn find_by_seq(&self, seq: u32) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.seq == seq)
    }

    /// Smallest-sequence segment still in `Sent` state.
    ///
    /// Stream order is sequence order, so the first match is the oldest
    /// outstanding segment - the one the retransmission timeout resends.
    pub fn first_sent(&self) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|segment| segment.status == SegmentStatus::Sent)
    }

    /// Whether any segment is still awaiting acknowledgment.
    pub fn has_sent(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.status == SegmentStatus::Sent)
    }

    /// Mark every `Sent` segment below a cumulative ACK as `Acked`.
    pub fn mark_acked_below(&mut self, ack: u32) {
        for segment in &mut self.segments {
            if segment.status == SegmentStatus::Sent && segment.seq < ack {
                segment.status = SegmentStatus::Acked;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::MAX_SEQUENCE;

    #[test]
    fn test_segment_count_and_sizes() {
        let source = vec![1u8; 1_000];
        let store = SegmentStore::segment_source(&source, 0, 300);

        // ceil(1000 / 300) segments, the final one short.
        assert_eq!(store.len(), 4);
        assert_eq!(store.get(0).unwrap().payload.len(), 300);
        assert_eq!(store.get(3).unwrap().payload.len(), 100);
    }

    #[test]
    fn test_concatenation_reproduces_source() {
        let source: Vec<u8> = (0..=255).cycle().take(2_048).collect();
        let store = SegmentStore::segment_source(&source, 77, 500);

        let mut rebuilt = Vec::new();
        for index in 0..store.len() {
            rebuilt.extend_from_slice(&store.get(index).unwrap().payload);
        }
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_sequence_numbers_advance_by_payload_length() {
        let source = vec![0u8; 700];
        let store = SegmentStore::segment_source(&source, 1_000, 300);

        assert_eq!(store.seq_at(0), Some(1_000));
        assert_eq!(store.seq_at(1), Some(1_300));
        assert_eq!(store.seq_at(2), Some(1_600));
        assert_eq!(store.last_seq(), 1_600);
    }

    #[test]
    fn test_sequence_numbers_near_overflow() {
        // Segmentation straddling the top of the sequence space uses the
        // clamp rule, not modular wraparound.
        let source = vec![0u8; 30];
        let store = SegmentStore::segment_source(&source, MAX_SEQUENCE - 5, 10);

        assert_eq!(store.seq_at(0), Some(MAX_SEQUENCE - 5));
        assert_eq!(store.seq_at(1), Some(4));
        assert_eq!(store.seq_at(2), Some(14));
    }

    #[test]
    fn test_empty_source_yields_one_empty_segment() {
        let store = SegmentStore::segment_source(&[], 42, 512);
        assert_eq!(store.len(), 1);
        assert_eq!(store.seq_at(0), Some(42));
        assert!(store.get(0).unwrap().payload.is_empty());
        assert_eq!(store.last_seq(), 42);
    }

    #[test]
    fn test_source_smaller_than_one_segment() {
        let store = SegmentStore::segment_source(b"tiny", 0, 512);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().payload, b"tiny");
    }

    #[test]
    fn test_status_tracking() {
        let source = vec![0u8; 900];
        let mut store = SegmentStore::segment_source(&source, 0, 300);

        assert_eq!(store.status(0), Some(SegmentStatus::Usable));
        assert!(!store.has_sent());

        store.set_status(0, SegmentStatus::Sent);
        store.set_status(1, SegmentStatus::Sent);
        assert!(store.has_sent());
        assert_eq!(store.first_sent().unwrap().seq, 0);

        // Cumulative ACK for 600 covers the first two segments.
        store.mark_acked_below(600);
        assert_eq!(store.status(0), Some(SegmentStatus::Acked));
        assert_eq!(store.status(1), Some(SegmentStatus::Acked));
        assert_eq!(store.status(2), Some(SegmentStatus::Usable));
        assert!(!store.has_sent());
    }

    #[test]
    fn test_mark_acked_below_skips_usable() {
        let mut store = SegmentStore::segment_source(&[0u8; 600], 0, 300);
        store.set_status(0, SegmentStatus::Sent);

        // Segment 1 was never sent; a covering ACK must not touch it.
        store.mark_acked_below(10_000);
        assert_eq!(store.status(0), Some(SegmentStatus::Acked));
        assert_eq!(store.status(1), Some(SegmentStatus::Usable));
    }

    #[test]
    fn test_find_by_seq() {
        let store = SegmentStore::segment_source(&[0u8; 900], 100, 300);
        assert_eq!(store.find_by_seq(400).unwrap().seq, 400);
        assert!(store.find_by_seq(401).is_none());
    }
}
