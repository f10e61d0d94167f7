//! The authority's receiving proxy
//!
//! Ingests input windows sent by the owning client, feeds them to the
//! tick engine at the rate the client actually simulated (the received
//! deltas refill the budget), and publishes the resulting sync head to
//! both observer channels.

use crate::buffers::SimBuffers;
use crate::error::Result;
use crate::tick_state::TickState;
use crate::wire::{self, InputPacket, SyncPacket};
use keystep_core::{Keyframe, Simulation};
use std::collections::VecDeque;
use tracing::warn;

/// Which outbound sync channel a serialize call feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncChannel {
    /// The owning client, which reconciles its prediction against this
    Autonomous,
    /// Everyone else, which smooths toward it
    Simulated,
}

/// Server-side receiver for one client-owned simulation.
pub struct ServerReceiver<S: Simulation> {
    /// Decoded input windows awaiting the next pre-tick
    inbox: VecDeque<InputPacket<S::Input>>,
    /// Highest input keyframe accepted into the ring
    last_received_input_keyframe: Option<Keyframe>,
    /// Sync head as of the last post-tick
    dirty_head: Option<Keyframe>,
    /// Last head emitted to the owning client
    last_sent_to_autonomous: Option<Keyframe>,
    /// Last head emitted to observers
    last_sent_to_simulated: Option<Keyframe>,
}

impl<S: Simulation> ServerReceiver<S> {
    pub fn new() -> Self {
        Self {
            inbox: VecDeque::new(),
            last_received_input_keyframe: None,
            dirty_head: None,
            last_sent_to_autonomous: None,
            last_sent_to_simulated: None,
        }
    }

    /// Decode one client input window into the inbox.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        self.inbox.push_back(wire::decode(bytes)?);
        Ok(())
    }

    /// Drain received input windows into the input ring and open the
    /// consumption ceiling up to the newest accepted keyframe.
    ///
    /// Windows overlap because the client resends until acknowledged;
    /// already-present keyframes are skipped. A window that starts past
    /// the ring head leaves a gap the engine must not cross, so the rest
    /// of that packet is dropped and a resend will fill it.
    pub fn pre_sim_tick(&mut self, buffers: &mut SimBuffers<S>, tick_state: &mut TickState) {
        while let Some(packet) = self.inbox.pop_front() {
            for (index, frame) in packet.frames.iter().enumerate() {
                let keyframe = packet.first_keyframe + index as Keyframe;
                let head = buffers.input.head_keyframe().unwrap_or(0);
                if keyframe <= head {
                    continue;
                }
                if keyframe > head + 1 {
                    warn!(
                        head,
                        keyframe, "input window starts past the ring head; awaiting resend"
                    );
                    break;
                }
                if frame.delta.is_zero() {
                    warn!(keyframe, "rejecting input frame with zero delta");
                    break;
                }
                *buffers.input.write_next() = frame.clone();
                tick_state.refill_budget(frame.delta);
                self.last_received_input_keyframe = Some(keyframe);
            }
        }
        tick_state
            .set_max_allowed_input_keyframe(buffers.input.head_keyframe().unwrap_or(0));
    }

    /// Mark the sync head produced this tick as pending replication.
    pub fn post_sim_tick(&mut self, buffers: &SimBuffers<S>) {
        self.dirty_head = buffers.sync.head_keyframe();
    }

    /// Reconcile is a no-op on the authority: there is nothing more
    /// authoritative to correct against.
    pub fn reconcile(&mut self) {}

    /// Emit the authoritative head as a sync packet on the given channel.
    pub(crate) fn serialize_sync(
        &mut self,
        buffers: &SimBuffers<S>,
        tick_state: &TickState,
        channel: SyncChannel,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let Some(head) = buffers.sync.head_keyframe() else {
            return Ok(());
        };
        let Some(sync) = buffers.sync.find(head) else {
            return Ok(());
        };
        let packet = SyncPacket {
            keyframe: head,
            total_sim_time: tick_state
                .processed_time_at(head)
                .unwrap_or_else(|| tick_state.total_processed_sim_time()),
            sync: sync.clone(),
            aux: buffers.aux.find(head).cloned().unwrap_or_default(),
        };
        wire::encode(&packet, out)?;
        match channel {
            SyncChannel::Autonomous => self.last_sent_to_autonomous = Some(head),
            SyncChannel::Simulated => self.last_sent_to_simulated = Some(head),
        }
        Ok(())
    }

    /// 1 when the head has advanced past what the channel last saw.
    pub(crate) fn dirty_count(&self, channel: SyncChannel) -> usize {
        let sent = match channel {
            SyncChannel::Autonomous => self.last_sent_to_autonomous,
            SyncChannel::Simulated => self.last_sent_to_simulated,
        };
        match (self.dirty_head, sent) {
            (Some(head), Some(sent)) if head > sent => 1,
            (Some(_), None) => 1,
            _ => 0,
        }
    }

    /// Highest input keyframe accepted from the client so far.
    pub fn last_received_input_keyframe(&self) -> Option<Keyframe> {
        self.last_received_input_keyframe
    }
}

impl<S: Simulation> Default for ServerReceiver<S> {
    fn default() -> Self {
        Self::new()
    }
}
