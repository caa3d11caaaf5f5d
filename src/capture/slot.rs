//! Latest-frame hand-off between the capture, compositor and stream sides
//!
//! Writers move a frame in; readers always get their own copy. Locks are
//! held only for the swap or the copy.

use parking_lot::Mutex;

use crate::frame::Frame;

/// Most recent raw frame and most recent processed frame
#[derive(Default)]
pub struct LatestFrameSlot {
    raw: Mutex<Option<Frame>>,
    processed: Mutex<Option<Frame>>,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the raw frame
    pub fn store_raw(&self, frame: Frame) {
        *self.raw.lock() = Some(frame);
    }

    /// Replace the processed frame
    pub fn store_processed(&self, frame: Frame) {
        *self.processed.lock() = Some(frame);
    }

    /// Copy of the latest raw frame
    pub fn latest_raw(&self) -> Option<Frame> {
        self.raw.lock().clone()
    }

    /// Copy of the latest processed frame, non-blocking beyond the copy
    pub fn latest_processed(&self) -> Option<Frame> {
        self.processed.lock().clone()
    }

    /// Copy of the raw frame if its sequence differs from `seen`
    pub fn raw_newer_than(&self, seen: Option<u64>) -> Option<Frame> {
        Self::newer(&self.raw, seen)
    }

    /// Copy of the processed frame if its sequence differs from `seen`
    pub fn processed_newer_than(&self, seen: Option<u64>) -> Option<Frame> {
        Self::newer(&self.processed, seen)
    }

    fn newer(slot: &Mutex<Option<Frame>>, seen: Option<u64>) -> Option<Frame> {
        let guard = slot.lock();
        match (guard.as_ref(), seen) {
            (Some(frame), Some(seq)) if frame.sequence == seq => None,
            (Some(frame), _) => Some(frame.clone()),
            (None, _) => None,
        }
    }

    /// Drop both frames
    pub fn clear(&self) {
        *self.raw.lock() = None;
        *self.processed.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot_returns_none() {
        let slot = LatestFrameSlot::new();
        assert!(slot.latest_raw().is_none());
        assert!(slot.latest_processed().is_none());
    }

    #[test]
    fn test_reader_gets_a_copy() {
        let slot = LatestFrameSlot::new();
        slot.store_processed(Frame::filled(2, 2, 3, 10).with_sequence(1));

        let mut copy = slot.latest_processed().unwrap();
        copy.data.fill(99);

        assert!(slot.latest_processed().unwrap().data.iter().all(|&v| v == 10));
    }

    #[test]
    fn test_newer_than_tracks_sequence() {
        let slot = LatestFrameSlot::new();
        slot.store_raw(Frame::filled(1, 1, 3, 0).with_sequence(5));

        assert_eq!(slot.raw_newer_than(None).unwrap().sequence, 5);
        assert!(slot.raw_newer_than(Some(5)).is_none());

        slot.store_raw(Frame::filled(1, 1, 3, 0).with_sequence(6));
        assert_eq!(slot.raw_newer_than(Some(5)).unwrap().sequence, 6);
    }

    #[test]
    fn test_concurrent_writer_and_readers() {
        use std::sync::Arc;
        use std::thread;

        let slot = Arc::new(LatestFrameSlot::new());
        let writer = {
            let slot = slot.clone();
            thread::spawn(move || {
                for seq in 0..200u64 {
                    slot.store_raw(Frame::filled(8, 8, 3, (seq % 256) as u8).with_sequence(seq));
                }
            })
        };
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let slot = slot.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        if let Some(frame) = slot.latest_raw() {
                            // Never a torn frame
                            let first = frame.data[0];
                            assert!(frame.data.iter().all(|&v| v == first));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(slot.latest_raw().unwrap().sequence, 199);
    }
}
