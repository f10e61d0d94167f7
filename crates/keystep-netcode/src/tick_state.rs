//! Tick progress and time-budget accounting
//!
//! Tracks how far the engine has consumed the input stream, how much
//! simulation time that represents, and how much more it is allowed to
//! consume this tick. A parallel ring stamps the total processed time at
//! each sync keyframe so rollback can restore it exactly.

use keystep_core::{Keyframe, SimTime};
use keystep_keyframe_buffer::KeyframeRing;

/// Progress and budget state for one simulation instance.
#[derive(Debug, Clone)]
pub struct TickState {
    /// Highest input keyframe consumed so far. Equals the sync head in
    /// steady state.
    last_processed_input_keyframe: Keyframe,
    /// Ceiling on how far the consumption loop may advance this tick
    max_allowed_input_keyframe: Keyframe,
    /// Total simulation time consumed since the origin
    total_processed_sim_time: SimTime,
    /// Budget left for the current tick's consumption loop
    remaining_allowed_sim_time: SimTime,
    /// Total processed time stamped at each sync keyframe
    processed_time: KeyframeRing<SimTime>,
}

impl TickState {
    pub fn new() -> Self {
        Self {
            last_processed_input_keyframe: 0,
            max_allowed_input_keyframe: 0,
            total_processed_sim_time: SimTime::ZERO,
            remaining_allowed_sim_time: SimTime::ZERO,
            processed_time: KeyframeRing::new(0),
        }
    }

    /// Size the per-keyframe time stamp ring. Matches the sync ring's
    /// capacity so every retained sync state has a stamp.
    pub fn set_time_capacity(&mut self, capacity: usize) {
        self.processed_time.set_capacity(capacity);
    }

    pub fn last_processed_input_keyframe(&self) -> Keyframe {
        self.last_processed_input_keyframe
    }

    pub fn set_last_processed_input_keyframe(&mut self, keyframe: Keyframe) {
        self.last_processed_input_keyframe = keyframe;
    }

    pub fn max_allowed_input_keyframe(&self) -> Keyframe {
        self.max_allowed_input_keyframe
    }

    /// Bound how far the consumption loop may advance. Set by the
    /// role-specific pre-tick: the authority limits itself to what the
    /// client actually sent, the predictor to what it just produced.
    pub fn set_max_allowed_input_keyframe(&mut self, keyframe: Keyframe) {
        self.max_allowed_input_keyframe = keyframe;
    }

    pub fn total_processed_sim_time(&self) -> SimTime {
        self.total_processed_sim_time
    }

    pub fn remaining_allowed_sim_time(&self) -> SimTime {
        self.remaining_allowed_sim_time
    }

    /// Add to this tick's consumption budget.
    pub fn refill_budget(&mut self, delta: SimTime) {
        self.remaining_allowed_sim_time += delta;
    }

    /// Spend budget for one consumed input keyframe.
    pub fn consume_budget(&mut self, delta: SimTime) {
        self.remaining_allowed_sim_time = self.remaining_allowed_sim_time.saturating_sub(delta);
    }

    /// Overwrite the budget outright.
    pub fn set_budget(&mut self, budget: SimTime) {
        self.remaining_allowed_sim_time = budget;
    }

    /// Total processed time as it was when sync keyframe `k` was written,
    /// if that keyframe's stamp is still retained.
    pub fn processed_time_at(&self, keyframe: Keyframe) -> Option<SimTime> {
        self.processed_time.find(keyframe).copied()
    }

    /// Advance the clock by one consumed input keyframe: grow the total
    /// and stamp it at `keyframe`. The stamp ring advances in lockstep
    /// with the sync ring, so `keyframe` must be the next stamp slot.
    pub fn increment_processed(&mut self, delta: SimTime, keyframe: Keyframe) {
        self.total_processed_sim_time += delta;
        *self.processed_time.write_next() = self.total_processed_sim_time;
        debug_assert_eq!(self.processed_time.head_keyframe(), Some(keyframe));
    }

    /// Rollback form: move the clock to `total` as of `keyframe`,
    /// truncating newer stamps. Stamps before `keyframe` are retained.
    pub fn set_total_processed(&mut self, total: SimTime, keyframe: Keyframe) {
        self.total_processed_sim_time = total;
        self.restamp(keyframe);
    }

    /// Re-anchor the stamp ring so its head is `keyframe`, stamped with
    /// the current total. Used when the sync ring is reseeded.
    pub fn restamp(&mut self, keyframe: Keyframe) {
        match keyframe.checked_sub(1) {
            Some(previous) => self.processed_time.reset_next_head_keyframe(previous),
            None => self.processed_time.clear(),
        }
        *self.processed_time.write_next() = self.total_processed_sim_time;
        debug_assert_eq!(self.processed_time.head_keyframe(), Some(keyframe));
    }
}

impl Default for TickState {
    fn default() -> Self {
        Self::new()
    }
}
