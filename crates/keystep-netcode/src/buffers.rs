//! The typed buffer set a simulation instance owns
//!
//! Four keyframed rings travel together: input commands, sync states, aux
//! states, and (with the `diagnostics` feature) per-frame debug records.
//! Their heads are not forced to align; the tick engine is what keeps
//! input and sync in step.

use crate::config::InitParams;
use crate::debug_frame::DebugFrame;
use keystep_core::{SimTime, Simulation};
use keystep_keyframe_buffer::KeyframeRing;
use serde::{Deserialize, Serialize};

/// One frame's worth of input: the user command plus the simulation time
/// it contributes. Immutable once written into the input ring.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct InputFrame<I> {
    /// Positive sim-time contribution of this frame
    pub delta: SimTime,
    /// The user-defined command payload
    pub command: I,
}

/// The four typed rings of one simulation instance.
pub struct SimBuffers<S: Simulation> {
    /// Input commands, appended by the local predictor or received by the
    /// authority. `input[0]` is an empty sentinel that is never consumed.
    pub input: KeyframeRing<InputFrame<S::Input>>,
    /// Sync states. `sync[0]` is driver-seeded; every later entry is
    /// produced by `Simulation::update` (or adopted from the authority).
    pub sync: KeyframeRing<S::Sync>,
    /// Aux state valid at each consumed keyframe
    pub aux: KeyframeRing<S::Aux>,
    #[cfg(feature = "diagnostics")]
    debug: KeyframeRing<DebugFrame>,
}

impl<S: Simulation> SimBuffers<S> {
    /// Create an empty buffer set; size it with [`SimBuffers::resize`] or
    /// the per-buffer setters before use.
    pub fn new() -> Self {
        Self {
            input: KeyframeRing::new(0),
            sync: KeyframeRing::new(0),
            aux: KeyframeRing::new(0),
            #[cfg(feature = "diagnostics")]
            debug: KeyframeRing::new(0),
        }
    }

    /// Size every ring from the given capacities, dropping any contents.
    pub fn resize(&mut self, params: &InitParams) {
        self.input.set_capacity(params.input_buffer_size);
        self.sync.set_capacity(params.synced_buffer_size);
        self.aux.set_capacity(params.aux_buffer_size);
        #[cfg(feature = "diagnostics")]
        self.debug.set_capacity(params.debug_buffer_size);
    }

    /// Resize just the input ring.
    pub fn set_input_capacity(&mut self, capacity: usize) {
        self.input.set_capacity(capacity);
    }

    /// Resize just the sync ring.
    pub fn set_sync_capacity(&mut self, capacity: usize) {
        self.sync.set_capacity(capacity);
    }

    /// Resize just the aux ring.
    pub fn set_aux_capacity(&mut self, capacity: usize) {
        self.aux.set_capacity(capacity);
    }

    /// Resize the debug ring. A no-op without the `diagnostics` feature.
    pub fn set_debug_capacity(&mut self, capacity: usize) {
        #[cfg(feature = "diagnostics")]
        self.debug.set_capacity(capacity);
        #[cfg(not(feature = "diagnostics"))]
        let _ = capacity;
    }

    /// The debug ring, when diagnostics are compiled in.
    pub fn debug_frames(&self) -> Option<&KeyframeRing<DebugFrame>> {
        #[cfg(feature = "diagnostics")]
        {
            Some(&self.debug)
        }
        #[cfg(not(feature = "diagnostics"))]
        {
            None
        }
    }

    /// Mutable debug ring access, when diagnostics are compiled in.
    pub fn debug_frames_mut(&mut self) -> Option<&mut KeyframeRing<DebugFrame>> {
        #[cfg(feature = "diagnostics")]
        {
            Some(&mut self.debug)
        }
        #[cfg(not(feature = "diagnostics"))]
        {
            None
        }
    }
}

impl<S: Simulation> Default for SimBuffers<S> {
    fn default() -> Self {
        Self::new()
    }
}
