//! Second-chance clock replacement over the fixed frame array.

use crate::buffer::FrameId;
use parking_lot::Mutex;
use tracing::warn;

/// Tracks the unpinned frames and picks eviction victims with the
/// second-chance clock policy.
///
/// One slot per frame: a `valid` bit marks membership in the candidate set
/// and a `referenced` bit grants one more revolution before eviction. A
/// hand walks the slots circularly and keeps its position across calls.
pub struct ClockReplacer {
    inner: Mutex<ClockInner>,
}

struct ClockInner {
    slots: Vec<Slot>,
    hand: usize,
    len: usize,
}

#[derive(Clone, Copy, Default)]
struct Slot {
    valid: bool,
    referenced: bool,
}

impl ClockReplacer {
    /// Create a replacer covering `pool_size` frames, all initially absent.
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "replacer requires at least one frame");
        ClockReplacer {
            inner: Mutex::new(ClockInner {
                slots: vec![Slot::default(); pool_size],
                hand: 0,
                len: 0,
            }),
        }
    }

    /// Choose a victim frame and remove it from the candidate set.
    ///
    /// Returns `None` when no frame is evictable. A referenced candidate is
    /// spared once: its bit is cleared and the hand moves on.
    pub fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.len == 0 {
            return None;
        }
        // At least one valid slot exists, so one full revolution clears
        // every referenced bit and the next pass must evict.
        loop {
            let hand = inner.hand;
            inner.hand = (hand + 1) % inner.slots.len();
            if !inner.slots[hand].valid {
                continue;
            }
            if inner.slots[hand].referenced {
                inner.slots[hand].referenced = false;
                continue;
            }
            inner.slots[hand].valid = false;
            inner.len -= 1;
            return Some(hand);
        }
    }

    /// Remove the frame from the candidate set. Idempotent.
    pub fn pin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if frame_id >= inner.slots.len() {
            warn!(frame_id, "pin of out-of-range frame");
            return;
        }
        if inner.slots[frame_id].valid {
            inner.slots[frame_id].valid = false;
            inner.slots[frame_id].referenced = false;
            inner.len -= 1;
        }
    }

    /// Insert the frame into the candidate set with its reference bit set.
    /// Idempotent.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if frame_id >= inner.slots.len() {
            warn!(frame_id, "unpin of out-of-range frame");
            return;
        }
        if !inner.slots[frame_id].valid {
            inner.slots[frame_id].valid = true;
            inner.len += 1;
        }
        inner.slots[frame_id].referenced = true;
    }

    /// The number of evictable frames.
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    /// Whether no frame is evictable.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, frame_id: FrameId) -> bool {
        let inner = self.inner.lock();
        frame_id < inner.slots.len() && inner.slots[frame_id].valid
    }
}
