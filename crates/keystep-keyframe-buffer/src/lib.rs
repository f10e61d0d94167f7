//! Keystep Keyframe Buffer - Bounded ring indexed by keyframe id
//!
//! This crate provides the storage primitive under every keystep buffer:
//! a fixed-capacity ring whose elements are addressed by a monotonically
//! increasing keyframe id rather than by position.
//!
//! # Properties
//!
//! - **Bounded memory**: fixed-size ring, no unbounded growth
//! - **O(1) write and lookup**: keyframe ids map to slots modulo capacity
//! - **Automatic eviction**: writing past capacity drops the oldest entry
//! - **Rewindable head**: `reset_next_head_keyframe` truncates newer
//!   entries so history can be rewritten from a chosen point
//!
//! # Example
//!
//! ```rust
//! use keystep_keyframe_buffer::KeyframeRing;
//!
//! let mut ring: KeyframeRing<u64> = KeyframeRing::new(8);
//!
//! // The first write lands at keyframe 0, the next at 1, and so on.
//! *ring.write_next() = 100;
//! *ring.write_next() = 101;
//! assert_eq!(ring.find(1), Some(&101));
//!
//! // Rewind so the next write produces keyframe 1 again.
//! ring.reset_next_head_keyframe(0);
//! assert_eq!(ring.head_keyframe(), Some(0));
//! ```

use keystep_core::Keyframe;

/// A bounded ring of `T` values addressed by keyframe id.
///
/// Writing always allocates the next keyframe after the current head;
/// reads never mutate, and writes never move existing entries. An entry
/// is evicted exactly when a write lands in its slot, which happens once
/// the head has advanced `capacity` keyframes past it.
#[derive(Debug, Clone)]
pub struct KeyframeRing<T> {
    /// Slot storage: keyframe `k` lives at index `k % capacity`.
    /// `None` means the slot is empty.
    slots: Vec<Option<(Keyframe, T)>>,
    /// Keyframe the next `write_next` will produce
    next_head: Keyframe,
    /// Capacity (max entries)
    capacity: usize,
}

impl<T> KeyframeRing<T> {
    /// Create a ring with the given capacity. A zero-capacity ring is
    /// legal to hold but writing to it is a programming error.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            next_head: 0,
            capacity,
        }
    }

    /// Resize the ring. Drops all contents and restarts at keyframe 0.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.slots = (0..capacity).map(|_| None).collect();
        self.next_head = 0;
        self.capacity = capacity;
    }

    fn slot_index(&self, keyframe: Keyframe) -> usize {
        keyframe as usize % self.capacity
    }

    /// Most recently written keyframe still present, if any.
    pub fn head_keyframe(&self) -> Option<Keyframe> {
        let head = self.next_head.checked_sub(1)?;
        self.find(head).map(|_| head)
    }

    /// Oldest keyframe still present, if any.
    pub fn tail_keyframe(&self) -> Option<Keyframe> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref().map(|(k, _)| *k))
            .min()
    }

    /// Look up the entry with exactly this keyframe id.
    pub fn find(&self, keyframe: Keyframe) -> Option<&T> {
        if self.capacity == 0 {
            return None;
        }
        self.slots[self.slot_index(keyframe)]
            .as_ref()
            .filter(|(k, _)| *k == keyframe)
            .map(|(_, v)| v)
    }

    /// Mutable lookup by keyframe id.
    pub fn find_mut(&mut self, keyframe: Keyframe) -> Option<&mut T> {
        if self.capacity == 0 {
            return None;
        }
        let index = self.slot_index(keyframe);
        self.slots[index]
            .as_mut()
            .filter(|(k, _)| *k == keyframe)
            .map(|(_, v)| v)
    }

    /// Rewind the write position so the next `write_next` produces
    /// keyframe `keyframe + 1`. Entries newer than `keyframe` are
    /// cleared; entries at or before it are retained.
    pub fn reset_next_head_keyframe(&mut self, keyframe: Keyframe) {
        for slot in &mut self.slots {
            if let Some((k, _)) = slot {
                if *k > keyframe {
                    *slot = None;
                }
            }
        }
        self.next_head = keyframe + 1;
    }

    /// Number of entries currently present.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Check for an empty ring.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    /// Drop all contents and restart at keyframe 0.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.next_head = 0;
    }

    /// Iterate over stored entries, oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = (Keyframe, &T)> {
        let mut entries: Vec<_> = self
            .slots
            .iter()
            .filter_map(|s| s.as_ref().map(|(k, v)| (*k, v)))
            .collect();
        entries.sort_by_key(|(k, _)| *k);
        entries.into_iter()
    }

    /// Snapshot of the ring's occupancy.
    pub fn stats(&self) -> RingStats {
        RingStats {
            capacity: self.capacity,
            len: self.len(),
            tail: self.tail_keyframe(),
            head: self.head_keyframe(),
        }
    }
}

impl<T: Default> KeyframeRing<T> {
    /// Allocate the entry for the next keyframe after the head, evicting
    /// the tail if the ring is full, and return it for filling.
    ///
    /// The returned reference is valid until the next mutating call.
    /// The very first write after construction (or `clear`) produces
    /// keyframe 0.
    ///
    /// # Panics
    ///
    /// Panics on a zero-capacity ring; writing without storage is a
    /// programming error.
    pub fn write_next(&mut self) -> &mut T {
        assert!(self.capacity > 0, "write_next on a zero-capacity ring");
        let keyframe = self.next_head;
        let index = self.slot_index(keyframe);
        self.slots[index] = Some((keyframe, T::default()));
        self.next_head = keyframe + 1;
        match &mut self.slots[index] {
            Some((_, value)) => value,
            None => unreachable!(),
        }
    }
}

/// Occupancy statistics for a [`KeyframeRing`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingStats {
    /// Maximum capacity
    pub capacity: usize,
    /// Current number of stored entries
    pub len: usize,
    /// Oldest keyframe present
    pub tail: Option<Keyframe>,
    /// Newest keyframe present
    pub head: Option<Keyframe>,
}

impl RingStats {
    /// Keyframe distance covered, head - tail + 1 (0 when empty)
    pub fn span(&self) -> u32 {
        match (self.tail, self.head) {
            (Some(tail), Some(head)) => head - tail + 1,
            _ => 0,
        }
    }
}
