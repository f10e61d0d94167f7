//! Per-frame diagnostic records and long-horizon historic capture
//!
//! The types here exist regardless of features so that accessor
//! signatures stay stable; only the storage and recording paths are
//! compiled out when `diagnostics` is disabled.

use keystep_core::{Keyframe, SimTime};
use keystep_keyframe_buffer::KeyframeRing;
use serde::{Deserialize, Serialize};

/// Diagnostic record for one host frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugFrame {
    /// Host frame delta, in seconds
    pub local_delta_time: f32,
    /// Monotonic frame counter of the owning simulation instance
    pub global_frame: u64,
    /// Input keyframes consumed during this frame, in order
    pub processed_keyframes: Vec<Keyframe>,
    /// Time budget left after the consumption loop
    pub remaining_budget: SimTime,
    /// Input keyframe most recently emitted by the sending proxy
    pub last_sent_input_keyframe: Option<Keyframe>,
    /// Input keyframe most recently ingested by the receiving proxy
    pub last_received_input_keyframe: Option<Keyframe>,
}

/// Long-horizon ring of finalized debug frames.
///
/// Finalized frames are merged here after each tick so diagnostics
/// outlive the short live ring. Reads are diagnostic only.
#[derive(Debug, Clone)]
pub struct HistoricBuffers {
    frames: KeyframeRing<DebugFrame>,
}

impl HistoricBuffers {
    /// Create with the given retention, in frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: KeyframeRing::new(capacity),
        }
    }

    /// Merge one finalized debug frame.
    pub fn merge(&mut self, frame: DebugFrame) {
        *self.frames.write_next() = frame;
    }

    /// The retained frames, oldest to newest.
    pub fn frames(&self) -> &KeyframeRing<DebugFrame> {
        &self.frames
    }
}
