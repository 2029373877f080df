// packages/engine/src/capture/capture_buffer.rs
//! Fixed-capacity ring of payload snapshots
//!
//! The cursor is advanced *before* each write, so after a call it points at
//! the slot that was just written. Before the first write it rests on the
//! last slot, which puts write `N` (1-indexed) in slot `(N - 1) % capacity`.

use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Default number of history slots
pub const DEFAULT_CAPACITY: usize = 255;

/// Default slot size in bytes (one mouse report)
pub const DEFAULT_SLOT_SIZE: usize = 8;

struct Ring {
    /// `capacity * slot_size` bytes, slot `i` at `i * slot_size`
    data: Vec<u8>,

    /// Most recently written slot
    cursor: usize,

    /// Total successful writes
    recorded: u64,
}

/// Bounded capture history shared by all concurrently classified requests
pub struct CaptureBuffer {
    capacity: usize,
    slot_size: usize,
    ring: Mutex<Ring>,
    skipped: AtomicU64,
}

impl CaptureBuffer {
    /// Create a buffer with `capacity` slots of `slot_size` bytes
    pub fn new(capacity: usize, slot_size: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EngineError::ConfigError(
                "capture capacity must be greater than 0".to_string(),
            ));
        }
        if slot_size == 0 {
            return Err(EngineError::ConfigError(
                "capture slot size must be greater than 0".to_string(),
            ));
        }

        debug!(
            "Allocating capture buffer: {} slots x {} bytes",
            capacity, slot_size
        );

        Ok(Self::allocate(capacity, slot_size))
    }

    fn allocate(capacity: usize, slot_size: usize) -> Self {
        Self {
            capacity,
            slot_size,
            ring: Mutex::new(Ring {
                data: vec![0u8; capacity * slot_size],
                cursor: capacity - 1,
                recorded: 0,
            }),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Record a payload snapshot. Mismatched lengths are skipped silently.
    pub fn record(&self, payload: &[u8]) {
        if let Err(e) = self.try_record(payload) {
            debug!("Capture skipped: {}", e);
        }
    }

    /// Record a payload snapshot, returning the slot it was written to.
    ///
    /// Payloads whose length differs from the slot size are rejected, never
    /// truncated or padded.
    pub fn try_record(&self, payload: &[u8]) -> Result<usize> {
        if payload.len() != self.slot_size {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Err(EngineError::PayloadLengthMismatch {
                expected: self.slot_size,
                actual: payload.len(),
            });
        }

        // Advance and write under one lock. Concurrent recorders always get
        // distinct slots; their order is lock acquisition order, not the
        // order in which their requests arrived.
        let mut ring = self.ring.lock();
        ring.cursor = (ring.cursor + 1) % self.capacity;
        let slot = ring.cursor;
        let start = slot * self.slot_size;
        ring.data[start..start + self.slot_size].copy_from_slice(payload);
        ring.recorded += 1;
        drop(ring);

        trace!("Captured {} bytes into slot {}", payload.len(), slot);
        Ok(slot)
    }

    /// Slot holding the most recent write
    pub fn cursor(&self) -> usize {
        self.ring.lock().cursor
    }

    pub fn total_recorded(&self) -> u64 {
        self.ring.lock().recorded
    }

    /// Payloads rejected for length mismatch
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Number of slots holding a captured payload
    pub fn len(&self) -> usize {
        let recorded = self.ring.lock().recorded;
        recorded.min(self.capacity as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw contents of one slot
    pub fn slot(&self, index: usize) -> Option<Vec<u8>> {
        if index >= self.capacity {
            return None;
        }
        let ring = self.ring.lock();
        let start = index * self.slot_size;
        Some(ring.data[start..start + self.slot_size].to_vec())
    }

    /// Most recently captured payload
    pub fn latest(&self) -> Option<Vec<u8>> {
        let ring = self.ring.lock();
        if ring.recorded == 0 {
            return None;
        }
        let start = ring.cursor * self.slot_size;
        Some(ring.data[start..start + self.slot_size].to_vec())
    }

    /// Captured payloads, oldest first
    pub fn history(&self) -> Vec<Vec<u8>> {
        self.snapshot().history()
    }

    /// Consistent copy of every slot plus the cursor, for external inspection
    pub fn snapshot(&self) -> CaptureSnapshot {
        let ring = self.ring.lock();
        CaptureSnapshot {
            taken_at: Utc::now(),
            capacity: self.capacity,
            slot_size: self.slot_size,
            cursor: ring.cursor,
            total_recorded: ring.recorded,
            slots: ring
                .data
                .chunks_exact(self.slot_size)
                .map(|chunk| chunk.to_vec())
                .collect(),
        }
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::allocate(DEFAULT_CAPACITY, DEFAULT_SLOT_SIZE)
    }
}

/// Point-in-time view of the whole ring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSnapshot {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,

    /// Number of slots
    pub capacity: usize,

    /// Bytes per slot
    pub slot_size: usize,

    /// Slot holding the most recent write
    pub cursor: usize,

    /// Total successful writes since allocation
    pub total_recorded: u64,

    /// Every slot in index order, including never-written (zeroed) ones
    pub slots: Vec<Vec<u8>>,
}

impl CaptureSnapshot {
    /// Number of slots holding a captured payload
    pub fn len(&self) -> usize {
        let ring = self.capacity.min(self.slots.len());
        self.total_recorded.min(ring as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn newest(&self) -> Option<&[u8]> {
        if self.is_empty() {
            None
        } else {
            self.slots.get(self.cursor).map(|s| s.as_slice())
        }
    }

    /// Captured payloads, oldest first. Empty if the snapshot's cursor does
    /// not point into its slots.
    pub fn history(&self) -> Vec<Vec<u8>> {
        let len = self.len();
        let ring = self.slots.len();
        if len == 0 || self.cursor >= ring {
            return Vec::new();
        }
        let oldest = (self.cursor + ring + 1 - len) % ring;
        (0..len)
            .map(|i| self.slots[(oldest + i) % ring].clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn payload(n: u32) -> Vec<u8> {
        let mut p = vec![0u8; DEFAULT_SLOT_SIZE];
        p[..4].copy_from_slice(&n.to_le_bytes());
        p
    }

    #[test]
    fn test_buffer_creation() {
        let buffer = CaptureBuffer::new(255, 8).unwrap();
        assert_eq!(buffer.capacity(), 255);
        assert_eq!(buffer.slot_size(), 8);
        assert!(buffer.is_empty());
        assert_eq!(buffer.cursor(), 254);
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(CaptureBuffer::new(0, 8).is_err());
        assert!(CaptureBuffer::new(16, 0).is_err());
    }

    #[test]
    fn test_first_record() {
        let buffer = CaptureBuffer::default();
        let slot = buffer.try_record(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        assert_eq!(slot, 0);
        assert_eq!(buffer.cursor(), 0);
        assert_eq!(buffer.slot(0).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buffer.latest().unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_cursor_advances_by_one() {
        let buffer = CaptureBuffer::default();
        buffer.record(&payload(1));
        let before = buffer.cursor();

        buffer.record(&payload(2));

        assert_eq!(buffer.cursor(), (before + 1) % buffer.capacity());
        assert_eq!(buffer.slot(buffer.cursor()).unwrap(), payload(2));
    }

    #[test]
    fn test_length_mismatch_skipped() {
        let buffer = CaptureBuffer::default();

        buffer.record(&[1, 2, 3]);
        let err = buffer.try_record(&[0u8; 9]).unwrap_err();

        assert!(matches!(
            err,
            EngineError::PayloadLengthMismatch {
                expected: 8,
                actual: 9
            }
        ));
        assert_eq!(buffer.skipped(), 2);
        assert_eq!(buffer.total_recorded(), 0);
        assert_eq!(buffer.cursor(), 254);
    }

    #[test]
    fn test_wraparound_overwrites_oldest() {
        let buffer = CaptureBuffer::default();
        for n in 1..=256u32 {
            buffer.record(&payload(n));
        }

        assert_eq!(buffer.slot(0).unwrap(), payload(256));
        assert_eq!(buffer.slot(1).unwrap(), payload(2));
        assert_eq!(buffer.cursor(), 0);
        assert_eq!(buffer.len(), 255);

        let history = buffer.history();
        assert_eq!(history.first().unwrap(), &payload(2));
        assert_eq!(history.last().unwrap(), &payload(256));
    }

    #[test]
    fn test_history_partial() {
        let buffer = CaptureBuffer::new(4, 8).unwrap();
        buffer.record(&payload(1));
        buffer.record(&payload(2));

        assert_eq!(buffer.history(), vec![payload(1), payload(2)]);
    }

    #[test]
    fn test_snapshot() {
        let buffer = CaptureBuffer::new(3, 8).unwrap();
        for n in 1..=4u32 {
            buffer.record(&payload(n));
        }

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.slots.len(), 3);
        assert_eq!(snapshot.cursor, 0);
        assert_eq!(snapshot.total_recorded, 4);
        assert_eq!(snapshot.newest().unwrap(), payload(4).as_slice());
        assert_eq!(snapshot.history(), vec![payload(2), payload(3), payload(4)]);
    }

    #[test]
    fn test_inconsistent_snapshot_reads_empty() {
        let zero_capacity: CaptureSnapshot = serde_json::from_value(serde_json::json!({
            "taken_at": "2026-01-01T00:00:00Z",
            "capacity": 0,
            "slot_size": 8,
            "cursor": 0,
            "total_recorded": 3,
            "slots": []
        }))
        .unwrap();
        assert!(zero_capacity.is_empty());
        assert!(zero_capacity.newest().is_none());
        assert!(zero_capacity.history().is_empty());

        let cursor_past_end: CaptureSnapshot = serde_json::from_value(serde_json::json!({
            "taken_at": "2026-01-01T00:00:00Z",
            "capacity": 4,
            "slot_size": 8,
            "cursor": 9,
            "total_recorded": 6,
            "slots": [[1, 1, 1, 1, 1, 1, 1, 1], [2, 2, 2, 2, 2, 2, 2, 2]]
        }))
        .unwrap();
        assert_eq!(cursor_past_end.len(), 2);
        assert!(cursor_past_end.newest().is_none());
        assert!(cursor_past_end.history().is_empty());
    }

    #[test]
    fn test_snapshot_with_fewer_slots_than_capacity() {
        let snapshot = CaptureSnapshot {
            taken_at: Utc::now(),
            capacity: 4,
            slot_size: 8,
            cursor: 1,
            total_recorded: 5,
            slots: vec![payload(2), payload(3)],
        };
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.newest().unwrap(), payload(3).as_slice());
        assert_eq!(snapshot.history(), vec![payload(2), payload(3)]);
    }

    #[test]
    fn test_slot_out_of_range() {
        let buffer = CaptureBuffer::new(2, 8).unwrap();
        assert!(buffer.slot(2).is_none());
    }

    #[test]
    fn test_concurrent_records_get_distinct_slots() {
        use std::thread;

        let buffer = Arc::new(CaptureBuffer::default());
        let mut handles = vec![];

        // 10 threads x 25 records = 250 <= capacity
        for t in 0..10u32 {
            let b = Arc::clone(&buffer);
            handles.push(thread::spawn(move || {
                (0..25u32)
                    .map(|i| b.try_record(&payload(t * 100 + i + 1)).unwrap())
                    .collect::<Vec<_>>()
            }));
        }

        let mut slots = HashSet::new();
        for handle in handles {
            for slot in handle.join().unwrap() {
                assert!(slots.insert(slot), "slot {} written twice", slot);
            }
        }

        assert_eq!(slots.len(), 250);
        assert_eq!(buffer.total_recorded(), 250);
        assert_eq!(buffer.cursor(), 249);

        let stored: HashSet<Vec<u8>> = buffer.history().into_iter().collect();
        assert_eq!(stored.len(), 250);
    }
}
