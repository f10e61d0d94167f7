//! Rolling replay window
//!
//! Keeps the last few sync states for scrubbing and replay tooling. Has
//! no effect on the live simulation; recording happens after the engine
//! advances and reads are diagnostic.

use crate::error::Result;
use crate::wire::{self, ReplayPacket};
use keystep_core::{Keyframe, Simulation};
use std::collections::VecDeque;

/// Bounded recorder of recent sync states.
pub struct ReplayRecorder<S: Simulation> {
    window: VecDeque<(Keyframe, S::Sync)>,
    capacity: usize,
    /// States recorded since the last serialize
    dirty: usize,
}

impl<S: Simulation> ReplayRecorder<S> {
    /// Default window length, in keyframes
    pub const DEFAULT_WINDOW: usize = 3;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_WINDOW)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            dirty: 0,
        }
    }

    /// Resize the window, dropping contents.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.window.clear();
        self.capacity = capacity;
        self.dirty = 0;
    }

    /// Record one newly produced sync state.
    pub fn record(&mut self, keyframe: Keyframe, state: S::Sync) {
        if self.capacity == 0 {
            return;
        }
        // A replayed keyframe replaces its previous recording
        self.window.retain(|(k, _)| *k != keyframe);
        self.window.push_back((keyframe, state));
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        self.dirty = (self.dirty + 1).min(self.capacity);
    }

    /// Emit the current window.
    pub fn serialize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let packet: ReplayPacket<S::Sync> = ReplayPacket {
            frames: self.window.iter().cloned().collect(),
        };
        wire::encode(&packet, out)?;
        self.dirty = 0;
        Ok(())
    }

    /// Replace the window with a decoded one (scrub ingestion).
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        let packet: ReplayPacket<S::Sync> = wire::decode(bytes)?;
        self.window = packet.frames.into_iter().collect();
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        self.dirty = 0;
        Ok(())
    }

    /// States recorded since the last serialize.
    pub fn dirty_count(&self) -> usize {
        self.dirty
    }

    /// The retained window, oldest first.
    pub fn frames(&self) -> impl Iterator<Item = (Keyframe, &S::Sync)> {
        self.window.iter().map(|(k, s)| (*k, s))
    }
}

impl<S: Simulation> Default for ReplayRecorder<S> {
    fn default() -> Self {
        Self::new()
    }
}
