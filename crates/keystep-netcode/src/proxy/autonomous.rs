//! The locally controlled client's predicting proxy
//!
//! Produces an input every frame and simulates it immediately, without
//! waiting for the authority. When an authoritative sync arrives that
//! disagrees with what was predicted at that keyframe, the sync history
//! is rewound to the correction and the retained inputs replay on the
//! next tick.

use crate::buffers::SimBuffers;
use crate::error::Result;
use crate::link::{RollbackReport, RollbackStep};
use crate::proxy::adopt_authoritative;
use crate::tick_state::TickState;
use crate::wire::{self, state_checksum, InputPacket, SyncPacket};
use keystep_core::{Keyframe, SimTime, Simulation, SimulationDriver};
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Client-side predictor for one locally owned simulation.
pub struct AutonomousPredictor<S: Simulation> {
    /// Decoded authoritative sync packets awaiting reconcile
    inbox: VecDeque<SyncPacket<S::Sync, S::Aux>>,
    /// Highest input keyframe the authority has confirmed
    last_acked_input_keyframe: Keyframe,
    /// Highest input keyframe emitted on the server-RPC channel
    last_sent_input_keyframe: Option<Keyframe>,
    /// Unconfirmed window recorded at post-tick, for resend
    unacked_range: Option<(Keyframe, Keyframe)>,
}

impl<S: Simulation> AutonomousPredictor<S> {
    pub fn new() -> Self {
        Self {
            inbox: VecDeque::new(),
            last_acked_input_keyframe: 0,
            last_sent_input_keyframe: None,
            unacked_range: None,
        }
    }

    /// Produce this frame's input, append it, and open the ceiling and
    /// budget so the engine consumes it immediately.
    pub fn pre_sim_tick<D: SimulationDriver<S>>(
        &mut self,
        buffers: &mut SimBuffers<S>,
        tick_state: &mut TickState,
        driver: &mut D,
        local_delta_seconds: f32,
    ) {
        let delta = SimTime::from_seconds(local_delta_seconds);
        if delta.is_zero() {
            trace!("zero-length frame; no input produced");
        } else {
            let total = tick_state.total_processed_sim_time();
            let frame = buffers.input.write_next();
            frame.delta = delta;
            driver.produce_input(total, &mut frame.command);
            tick_state.refill_budget(delta);
        }
        tick_state.set_max_allowed_input_keyframe(buffers.input.head_keyframe().unwrap_or(0));
    }

    /// Record which input keyframes remain unconfirmed, bounding the
    /// resend window emitted by the next serialize.
    pub fn post_sim_tick(&mut self, buffers: &SimBuffers<S>) {
        let head = buffers.input.head_keyframe().unwrap_or(0);
        let tail = buffers.input.tail_keyframe().unwrap_or(0);
        let first = (self.last_acked_input_keyframe + 1).max(tail).max(1);
        self.unacked_range = (head > 0 && first <= head).then_some((first, head));
    }

    /// Decode one authoritative sync packet into the inbox.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        self.inbox.push_back(wire::decode(bytes)?);
        Ok(())
    }

    /// Compare queued authoritative states against local predictions,
    /// rewinding on divergence. Returns the rollback window to propagate
    /// to dependents when a rewind happened.
    pub fn reconcile(
        &mut self,
        buffers: &mut SimBuffers<S>,
        tick_state: &mut TickState,
    ) -> Option<RollbackReport> {
        let mut report = None;
        while let Some(packet) = self.inbox.pop_front() {
            if let Some(window) = self.apply_authoritative(buffers, tick_state, &packet) {
                report = Some(window);
            }
        }
        report
    }

    fn apply_authoritative(
        &mut self,
        buffers: &mut SimBuffers<S>,
        tick_state: &mut TickState,
        packet: &SyncPacket<S::Sync, S::Aux>,
    ) -> Option<RollbackReport> {
        let keyframe = packet.keyframe;
        if keyframe > self.last_acked_input_keyframe {
            self.last_acked_input_keyframe = keyframe;
        }

        let tail = buffers.sync.tail_keyframe();
        let head = buffers.sync.head_keyframe();
        let in_window =
            matches!((tail, head), (Some(t), Some(h)) if keyframe >= t && keyframe <= h);

        if !in_window {
            // The correction refers to history we no longer retain (or
            // have not reached). Prediction cannot bridge the gap:
            // adopt the authoritative state as a new origin.
            warn!(
                keyframe,
                sync_tail = ?tail,
                sync_head = ?head,
                "authoritative keyframe outside predicted window; abandoning prediction"
            );
            adopt_authoritative(buffers, tick_state, packet);
            // Inputs at or before the new origin are spent; local
            // production resumes from the keyframe after it.
            buffers.input.reset_next_head_keyframe(keyframe);
            return None;
        }

        let sync_matches = buffers
            .sync
            .find(keyframe)
            .is_some_and(|local| S::sync_states_match(local, &packet.sync));
        let aux_matches = buffers
            .aux
            .find(keyframe)
            .is_some_and(|local| *local == packet.aux);
        if sync_matches && aux_matches {
            trace!(keyframe, "authoritative state confirms prediction");
            return None;
        }

        debug!(
            keyframe,
            local = buffers.sync.find(keyframe).map(state_checksum),
            authoritative = state_checksum(&packet.sync),
            "prediction diverged; rolling back"
        );

        let previous_total = tick_state.total_processed_sim_time();
        adopt_authoritative(buffers, tick_state, packet);
        let rewound = previous_total.saturating_sub(packet.total_sim_time);
        // Return the rolled-back span to the budget so the retained
        // inputs can replay within the next tick.
        tick_state.refill_budget(rewound);

        let input_head = buffers.input.head_keyframe().unwrap_or(keyframe);
        let mut steps = Vec::new();
        for replay in (keyframe + 1)..=input_head {
            match buffers.input.find(replay) {
                Some(frame) => steps.push(RollbackStep {
                    step: frame.delta,
                    keyframe: replay,
                }),
                None => break,
            }
        }
        Some(RollbackReport {
            delta: rewound,
            keyframe,
            steps,
        })
    }

    /// Emit the unacknowledged input window on the server-RPC channel.
    pub fn serialize(&mut self, buffers: &SimBuffers<S>, out: &mut Vec<u8>) -> Result<()> {
        let head = buffers.input.head_keyframe().unwrap_or(0);
        let tail = buffers.input.tail_keyframe().unwrap_or(0);
        let first = (self.last_acked_input_keyframe + 1).max(tail).max(1);

        let mut frames = Vec::new();
        let mut keyframe = first;
        while keyframe <= head {
            match buffers.input.find(keyframe) {
                Some(frame) => frames.push(frame.clone()),
                None => break,
            }
            keyframe += 1;
        }

        if !frames.is_empty() {
            self.last_sent_input_keyframe = Some(first + frames.len() as Keyframe - 1);
        }
        let packet: InputPacket<S::Input> = InputPacket {
            first_keyframe: first,
            frames,
        };
        wire::encode(&packet, out)
    }

    /// Number of input keyframes awaiting acknowledgment.
    pub fn dirty_count(&self) -> usize {
        self.unacked_range
            .map(|(first, last)| (last - first + 1) as usize)
            .unwrap_or(0)
    }

    /// Highest input keyframe emitted so far.
    pub fn last_sent_input_keyframe(&self) -> Option<Keyframe> {
        self.last_sent_input_keyframe
    }

    /// Highest input keyframe the authority has confirmed.
    pub fn last_acked_input_keyframe(&self) -> Keyframe {
        self.last_acked_input_keyframe
    }
}

impl<S: Simulation> Default for AutonomousPredictor<S> {
    fn default() -> Self {
        Self::new()
    }
}
